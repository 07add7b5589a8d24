use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tb_types::{DataError, TbResult};

/// Dense binary-classification table: one row of features per label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    rows: Vec<Vec<f64>>,
    labels: Vec<u8>,
}

impl Dataset {
    /// Fails if shapes disagree, a label is not 0/1, or a feature is not finite.
    pub fn new(feature_names: Vec<String>, rows: Vec<Vec<f64>>, labels: Vec<u8>) -> TbResult<Self> {
        if rows.len() != labels.len() {
            return Err(DataError::InvalidFormat {
                message: format!("{} rows but {} labels", rows.len(), labels.len()),
            }
            .into());
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != feature_names.len() {
                return Err(DataError::InvalidFormat {
                    message: format!(
                        "row {i} has {} features, expected {}",
                        row.len(),
                        feature_names.len()
                    ),
                }
                .into());
            }
            if let Some(col) = row.iter().position(|v| !v.is_finite()) {
                return Err(DataError::InvalidFormat {
                    message: format!("row {i} has a non-finite value in column '{}'", feature_names[col]),
                }
                .into());
            }
        }
        if let Some(label) = labels.iter().find(|&&l| l > 1) {
            return Err(DataError::InvalidFormat {
                message: format!("label {label} is not binary"),
            }
            .into());
        }

        Ok(Self {
            feature_names,
            rows,
            labels,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Row counts for class 0 and class 1.
    pub fn class_counts(&self) -> [usize; 2] {
        let positives = self.labels.iter().filter(|&&l| l == 1).count();
        [self.labels.len() - positives, positives]
    }

    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.class_counts()[1] as f64 / self.labels.len() as f64
    }

    /// New dataset holding the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            feature_names: self.feature_names.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Split into `(train, validation)` preserving the class ratio.
    ///
    /// Each class is shuffled with a generator seeded from `seed` and
    /// `round(fraction * class_size)` of its rows (at least one, at most all
    /// but one) go to validation. Both sides keep the original row order.
    /// Every class needs at least two rows.
    pub fn stratified_split(&self, validation_fraction: f64, seed: u64) -> TbResult<(Dataset, Dataset)> {
        if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
            return Err(DataError::InvalidFormat {
                message: format!("validation fraction must be in (0, 1), got {validation_fraction}"),
            }
            .into());
        }

        let counts = self.class_counts();
        if let Some(class) = counts.iter().position(|&c| c < 2) {
            return Err(DataError::InsufficientData {
                message: format!(
                    "class {class} has {} rows; stratified splitting needs at least 2 per class",
                    counts[class]
                ),
            }
            .into());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train = Vec::with_capacity(self.len());
        let mut validation = Vec::new();

        for class in 0..=1u8 {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            members.shuffle(&mut rng);

            let n = members.len();
            let n_val = ((n as f64 * validation_fraction).round() as usize).clamp(1, n - 1);
            validation.extend_from_slice(&members[..n_val]);
            train.extend_from_slice(&members[n_val..]);
        }

        train.sort_unstable();
        validation.sort_unstable();

        tracing::debug!(
            "Stratified split: {} train rows, {} validation rows (seed {})",
            train.len(),
            validation.len(),
            seed
        );

        Ok((self.select(&train), self.select(&validation)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy(n_neg: usize, n_pos: usize) -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_neg {
            rows.push(vec![i as f64, -1.0]);
            labels.push(0);
        }
        for i in 0..n_pos {
            rows.push(vec![(n_neg + i) as f64, 1.0]);
            labels.push(1);
        }
        Dataset::new(vec!["id".into(), "side".into()], rows, labels).unwrap()
    }

    #[test]
    fn rejects_mismatched_shapes() {
        let err = Dataset::new(vec!["a".into()], vec![vec![1.0, 2.0]], vec![0]);
        assert!(err.is_err());

        let err = Dataset::new(vec!["a".into()], vec![vec![1.0]], vec![0, 1]);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_binary_labels_and_nan() {
        assert!(Dataset::new(vec!["a".into()], vec![vec![1.0]], vec![2]).is_err());
        assert!(Dataset::new(vec!["a".into()], vec![vec![f64::NAN]], vec![1]).is_err());
    }

    #[test]
    fn split_preserves_class_ratio() {
        let data = toy(60, 40);
        let (train, val) = data.stratified_split(0.2, 42).unwrap();

        assert_eq!(train.len() + val.len(), 100);
        assert_eq!(val.class_counts(), [12, 8]);
        assert_eq!(train.class_counts(), [48, 32]);
    }

    #[test]
    fn split_is_deterministic_and_disjoint() {
        let data = toy(30, 30);
        let (train_a, val_a) = data.stratified_split(0.25, 7).unwrap();
        let (train_b, val_b) = data.stratified_split(0.25, 7).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(val_a, val_b);

        let ids = |d: &Dataset| d.rows().iter().map(|r| r[0] as usize).collect::<Vec<_>>();
        let train_ids = ids(&train_a);
        for id in ids(&val_a) {
            assert!(!train_ids.contains(&id));
        }

        let (_, val_c) = data.stratified_split(0.25, 8).unwrap();
        assert_ne!(ids(&val_a), ids(&val_c));
    }

    #[test]
    fn split_keeps_both_sides_non_empty() {
        let data = toy(2, 2);
        let (train, val) = data.stratified_split(0.05, 1).unwrap();
        assert_eq!(train.class_counts(), [1, 1]);
        assert_eq!(val.class_counts(), [1, 1]);
    }

    #[test]
    fn split_needs_two_rows_per_class() {
        let data = toy(10, 1);
        assert!(data.stratified_split(0.2, 0).is_err());
        assert!(toy(10, 10).stratified_split(0.0, 0).is_err());
    }
}

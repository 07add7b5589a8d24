use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tb_types::{DataError, TbResult};

use crate::dataset::Dataset;

/// Seeded generator for a balanced binary classification problem.
///
/// Informative features are drawn around a class-dependent centroid; the
/// remaining features are pure noise. A small fraction of labels is flipped.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticClassification {
    pub n_samples: usize,
    pub n_features: usize,
    pub n_informative: usize,
    /// Distance of each informative centroid coordinate from zero.
    pub class_sep: f64,
    /// Probability of flipping a label.
    pub flip_y: f64,
    pub seed: u64,
}

impl Default for SyntheticClassification {
    fn default() -> Self {
        Self {
            n_samples: 500,
            n_features: 8,
            n_informative: 5,
            class_sep: 1.0,
            flip_y: 0.01,
            seed: 42,
        }
    }
}

impl SyntheticClassification {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_shape(mut self, n_samples: usize, n_features: usize, n_informative: usize) -> Self {
        self.n_samples = n_samples;
        self.n_features = n_features;
        self.n_informative = n_informative;
        self
    }

    pub fn generate(&self) -> TbResult<Dataset> {
        if self.n_informative > self.n_features || self.n_features == 0 {
            return Err(DataError::InvalidFormat {
                message: format!(
                    "n_informative ({}) must be between 0 and n_features ({}), n_features > 0",
                    self.n_informative, self.n_features
                ),
            }
            .into());
        }
        if self.n_samples < 4 {
            return Err(DataError::InsufficientData {
                message: format!("need at least 4 samples, got {}", self.n_samples),
            }
            .into());
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        // Per-feature sign of the positive-class centroid.
        let signs: Vec<f64> = (0..self.n_informative)
            .map(|_| if rng.gen::<bool>() { 1.0 } else { -1.0 })
            .collect();

        let mut labels: Vec<u8> = (0..self.n_samples).map(|i| (i % 2) as u8).collect();
        labels.shuffle(&mut rng);

        let mut rows = Vec::with_capacity(self.n_samples);
        for label in labels.iter_mut() {
            let centre = if *label == 1 { self.class_sep } else { -self.class_sep };
            let row: Vec<f64> = (0..self.n_features)
                .map(|j| {
                    let noise = standard_normal(&mut rng);
                    if j < self.n_informative {
                        signs[j] * centre + noise
                    } else {
                        noise
                    }
                })
                .collect();
            rows.push(row);

            if rng.gen::<f64>() < self.flip_y {
                *label = 1 - *label;
            }
        }

        let feature_names = (0..self.n_features).map(|j| format!("f{j}")).collect();
        Dataset::new(feature_names, rows, labels)
    }
}

/// Box–Muller transform over the generator's uniform stream.
fn standard_normal<R: Rng>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_shape() {
        let data = SyntheticClassification::default().generate().unwrap();
        assert_eq!(data.len(), 500);
        assert_eq!(data.n_features(), 8);
        let [neg, pos] = data.class_counts();
        assert!(neg > 200 && pos > 200);
    }

    #[test]
    fn same_seed_same_data() {
        let a = SyntheticClassification::new(3).generate().unwrap();
        let b = SyntheticClassification::new(3).generate().unwrap();
        let c = SyntheticClassification::new(4).generate().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn informative_features_separate_classes() {
        let data = SyntheticClassification::new(9)
            .with_shape(400, 3, 1)
            .generate()
            .unwrap();
        let mean = |class: u8| {
            let vals: Vec<f64> = data
                .rows()
                .iter()
                .zip(data.labels())
                .filter(|(_, l)| **l == class)
                .map(|(r, _)| r[0])
                .collect();
            vals.iter().sum::<f64>() / vals.len() as f64
        };
        assert!((mean(1) - mean(0)).abs() > 1.0);
    }

    #[test]
    fn rejects_bad_shape() {
        let gen = SyntheticClassification::new(1).with_shape(100, 2, 3);
        assert!(gen.generate().is_err());
        let gen = SyntheticClassification::new(1).with_shape(2, 2, 1);
        assert!(gen.generate().is_err());
    }
}

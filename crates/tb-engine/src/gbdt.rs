//! Gradient-boosted decision trees for binary classification.
//!
//! Trees are grown depth-first with exact greedy splits on the logistic loss.
//! Row and column subsampling draw from a `ChaCha8Rng` seeded with the trial's
//! sub-seed, so a fit is fully determined by its configuration, data and seed.
//! Split search across features runs on a dedicated rayon pool; the winning
//! split is picked in feature order, so the thread count never changes the
//! model.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use tb_data::Dataset;
use tb_optimizer::Trainer;
use tb_types::{BoxError, Configuration, ParameterValue, SearchSpace};

const MIN_SPLIT_GAIN: f64 = 1e-12;
const PROB_EPS: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum GbdtError {
    #[error("unknown hyperparameter '{name}'")]
    UnknownParameter { name: String },

    #[error("invalid value {value} for '{name}': {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: &'static str,
    },

    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("model expects {expected} features, data has {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Booster hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled (without replacement) per tree.
    pub subsample: f64,
    /// Fraction of features sampled per tree.
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights.
    pub reg_lambda: f64,
    /// Minimum hessian sum in each child of a split.
    pub min_child_weight: f64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

impl GbdtParams {
    /// Defaults overridden by every entry of `configuration`.
    pub fn from_configuration(configuration: &Configuration) -> Result<Self, GbdtError> {
        let mut params = Self::default();
        for (name, value) in configuration.iter() {
            match name {
                "n_estimators" => params.n_estimators = positive_int(name, value)?,
                "max_depth" => params.max_depth = positive_int(name, value)?,
                "learning_rate" => params.learning_rate = float_in(name, value, Bound::Positive)?,
                "subsample" => params.subsample = float_in(name, value, Bound::Fraction)?,
                "colsample_bytree" => params.colsample_bytree = float_in(name, value, Bound::Fraction)?,
                "reg_lambda" => params.reg_lambda = float_in(name, value, Bound::NonNegative)?,
                "min_child_weight" => params.min_child_weight = float_in(name, value, Bound::NonNegative)?,
                other => {
                    return Err(GbdtError::UnknownParameter {
                        name: other.to_string(),
                    })
                }
            }
        }
        Ok(params)
    }

    /// Check every field against the ranges accepted from a configuration.
    pub fn validate(&self) -> Result<(), GbdtError> {
        let count = |v: usize| ParameterValue::Int(i64::try_from(v).unwrap_or(i64::MAX));
        positive_int("n_estimators", &count(self.n_estimators))?;
        positive_int("max_depth", &count(self.max_depth))?;
        for (name, value, bound) in [
            ("learning_rate", self.learning_rate, Bound::Positive),
            ("subsample", self.subsample, Bound::Fraction),
            ("colsample_bytree", self.colsample_bytree, Bound::Fraction),
            ("reg_lambda", self.reg_lambda, Bound::NonNegative),
            ("min_child_weight", self.min_child_weight, Bound::NonNegative),
        ] {
            float_in(name, &ParameterValue::Float(value), bound)?;
        }
        Ok(())
    }
}

enum Bound {
    Positive,
    NonNegative,
    /// (0, 1]
    Fraction,
}

fn invalid(name: &str, value: &ParameterValue, reason: &'static str) -> GbdtError {
    GbdtError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason,
    }
}

fn positive_int(name: &str, value: &ParameterValue) -> Result<usize, GbdtError> {
    match value.as_i64() {
        Some(v) if v >= 1 => usize::try_from(v).map_err(|_| invalid(name, value, "out of range")),
        Some(_) => Err(invalid(name, value, "must be at least 1")),
        None => Err(invalid(name, value, "expected an integer")),
    }
}

fn float_in(name: &str, value: &ParameterValue, bound: Bound) -> Result<f64, GbdtError> {
    let v = value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(name, value, "expected a finite number"))?;
    let ok = match bound {
        Bound::Positive => v > 0.0,
        Bound::NonNegative => v >= 0.0,
        Bound::Fraction => v > 0.0 && v <= 1.0,
    };
    if ok {
        Ok(v)
    } else {
        let reason = match bound {
            Bound::Positive => "must be positive",
            Bound::NonNegative => "must not be negative",
            Bound::Fraction => "must be in (0, 1]",
        };
        Err(invalid(name, value, reason))
    }
}

/// Search space explored by `tb-search` when none is given.
pub fn default_space() -> SearchSpace {
    SearchSpace::new()
        .add_choice("n_estimators", [100, 200, 300])
        .add_choice("max_depth", [3, 4, 5])
        .add_choice("learning_rate", [0.03, 0.05, 0.1])
        .add_choice("subsample", [0.8, 0.9, 1.0])
        .add_choice("colsample_bytree", [0.8, 0.9, 1.0])
}

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Split {
        feature: usize,
        /// Rows with `value < threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree stored as an arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut id = 0;
        while let Some(node) = self.nodes.get(id) {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
        0.0
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match nodes.get(id) {
                Some(Node::Split { left, right, .. }) => 1 + walk(nodes, *left).max(walk(nodes, *right)),
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }
}

/// A fitted booster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtModel {
    pub feature_names: Vec<String>,
    pub params: GbdtParams,
    /// Initial margin (log-odds of the training positive rate).
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl GbdtModel {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn predict_margin_row(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    /// Positive-class probability for every row of `data`.
    pub fn predict_proba(&self, data: &Dataset) -> Result<Vec<f64>, GbdtError> {
        if data.n_features() != self.n_features() {
            return Err(GbdtError::FeatureMismatch {
                expected: self.n_features(),
                actual: data.n_features(),
            });
        }
        Ok(data
            .rows()
            .iter()
            .map(|row| sigmoid(self.predict_margin_row(row)))
            .collect())
    }

    /// Pretty JSON encoding, the published model format.
    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Trainer
// =============================================================================

/// Fits a [`GbdtModel`] per trial using `n_jobs` threads.
#[derive(Debug, Clone)]
pub struct GbdtTrainer {
    n_jobs: usize,
}

impl GbdtTrainer {
    pub fn new(n_jobs: usize) -> Self {
        Self { n_jobs: n_jobs.max(1) }
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    pub fn fit_params(&self, params: GbdtParams, train: &Dataset, seed: u64) -> Result<GbdtModel, GbdtError> {
        params.validate()?;
        if train.is_empty() {
            return Err(GbdtError::EmptyTrainingSet);
        }
        let pool = ThreadPoolBuilder::new().num_threads(self.n_jobs).build()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let n_rows = train.len();
        let n_features = train.n_features();
        let labels: Vec<f64> = train.labels().iter().map(|&l| f64::from(l)).collect();

        let rate = train.positive_rate().clamp(PROB_EPS, 1.0 - PROB_EPS);
        let base_score = (rate / (1.0 - rate)).ln();
        let mut margin = vec![base_score; n_rows];
        let mut grad = vec![0.0; n_rows];
        let mut hess = vec![0.0; n_rows];
        let mut trees = Vec::with_capacity(params.n_estimators);

        let row_count = sample_size(n_rows, params.subsample);
        let col_count = sample_size(n_features, params.colsample_bytree);

        for _ in 0..params.n_estimators {
            for i in 0..n_rows {
                let p = sigmoid(margin[i]);
                grad[i] = p - labels[i];
                hess[i] = (p * (1.0 - p)).max(1e-16);
            }

            let rows = draw_sorted(&mut rng, n_rows, row_count);
            let features = draw_sorted(&mut rng, n_features, col_count);

            let builder = TreeBuilder {
                data: train.rows(),
                grad: &grad,
                hess: &hess,
                features: &features,
                params: &params,
                pool: &pool,
            };
            let tree = builder.build(rows);

            for (m, row) in margin.iter_mut().zip(train.rows()) {
                *m += tree.predict(row);
            }
            trees.push(tree);
        }

        debug!(
            trees = trees.len(),
            rows = n_rows,
            features = n_features,
            n_jobs = self.n_jobs,
            "Fitted booster"
        );

        Ok(GbdtModel {
            feature_names: train.feature_names.clone(),
            params,
            base_score,
            trees,
        })
    }
}

impl Trainer for GbdtTrainer {
    type Data = Dataset;
    type Model = GbdtModel;

    fn fit(&self, configuration: &Configuration, train: &Dataset, sub_seed: u64) -> Result<GbdtModel, BoxError> {
        let params = GbdtParams::from_configuration(configuration)?;
        Ok(self.fit_params(params, train, sub_seed)?)
    }
}

fn sample_size(total: usize, fraction: f64) -> usize {
    ((total as f64 * fraction).round() as usize).clamp(1, total.max(1))
}

fn draw_sorted(rng: &mut ChaCha8Rng, total: usize, amount: usize) -> Vec<usize> {
    if amount >= total {
        return (0..total).collect();
    }
    let mut picked = index::sample(rng, total, amount).into_vec();
    picked.sort_unstable();
    picked
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'a> {
    data: &'a [Vec<f64>],
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    params: &'a GbdtParams,
    pool: &'a ThreadPool,
}

impl TreeBuilder<'_> {
    fn build(&self, rows: Vec<usize>) -> Tree {
        let mut nodes = Vec::new();
        self.grow(&mut nodes, rows, 0);
        Tree { nodes }
    }

    fn grow(&self, nodes: &mut Vec<Node>, rows: Vec<usize>, depth: usize) -> usize {
        let (g, h) = self.sums(&rows);
        let id = nodes.len();
        nodes.push(Node::Leaf {
            value: -g / (h + self.params.reg_lambda) * self.params.learning_rate,
        });

        if depth >= self.params.max_depth || rows.len() < 2 {
            return id;
        }
        let Some(split) = self.best_split(&rows, g, h) else {
            return id;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| self.data[r][split.feature] < split.threshold);
        let left = self.grow(nodes, left_rows, depth + 1);
        let right = self.grow(nodes, right_rows, depth + 1);
        nodes[id] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        id
    }

    fn sums(&self, rows: &[usize]) -> (f64, f64) {
        rows.iter()
            .fold((0.0, 0.0), |(g, h), &r| (g + self.grad[r], h + self.hess[r]))
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let per_feature: Vec<Option<SplitCandidate>> = self.pool.install(|| {
            self.features
                .par_iter()
                .map(|&f| self.best_split_for(f, rows, g, h))
                .collect()
        });

        // features are sorted, so the first maximum is the lowest index
        per_feature
            .into_iter()
            .flatten()
            .fold(None, |best: Option<SplitCandidate>, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            })
    }

    fn best_split_for(&self, feature: usize, rows: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let min_child = self.params.min_child_weight;
        let parent = g * g / (h + lambda);

        let mut sorted: Vec<(f64, usize)> = rows.iter().map(|&r| (self.data[r][feature], r)).collect();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut best: Option<SplitCandidate> = None;
        let (mut gl, mut hl) = (0.0, 0.0);
        for k in 0..sorted.len() - 1 {
            let (value, row) = sorted[k];
            gl += self.grad[row];
            hl += self.hess[row];

            let next = sorted[k + 1].0;
            if next <= value {
                continue;
            }
            let (gr, hr) = (g - gl, h - hl);
            if hl < min_child || hr < min_child {
                continue;
            }

            let gain = 0.5 * (gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent);
            if gain <= MIN_SPLIT_GAIN || best.is_some_and(|b| gain <= b.gain) {
                continue;
            }
            let mid = value + (next - value) / 2.0;
            let threshold = if mid > value { mid } else { next };
            best = Some(SplitCandidate {
                feature,
                threshold,
                gain,
            });
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tb_data::SyntheticClassification;

    fn data() -> Dataset {
        SyntheticClassification::new(7).with_shape(200, 4, 3).generate().unwrap()
    }

    #[test]
    fn params_from_configuration() {
        let cfg = Configuration::new()
            .with("n_estimators", 20)
            .with("max_depth", 4)
            .with("learning_rate", 0.05)
            .with("subsample", 0.8);
        let params = GbdtParams::from_configuration(&cfg).unwrap();
        assert_eq!(params.n_estimators, 20);
        assert_eq!(params.max_depth, 4);
        assert_eq!(params.subsample, 0.8);
        assert_eq!(params.colsample_bytree, 1.0);
    }

    #[test]
    fn rejects_unknown_and_out_of_range() {
        let unknown = Configuration::new().with("gamma", 1.0);
        assert!(matches!(
            GbdtParams::from_configuration(&unknown),
            Err(GbdtError::UnknownParameter { .. })
        ));

        for cfg in [
            Configuration::new().with("subsample", 1.5),
            Configuration::new().with("max_depth", 0),
            Configuration::new().with("n_estimators", 2.5),
            Configuration::new().with("learning_rate", "fast"),
        ] {
            assert!(
                matches!(GbdtParams::from_configuration(&cfg), Err(GbdtError::InvalidValue { .. })),
                "{cfg}"
            );
        }
    }

    #[test]
    fn fit_rejects_out_of_range_params() {
        let train = data();
        let cases = [
            GbdtParams { learning_rate: -1.0, ..GbdtParams::default() },
            GbdtParams { subsample: 0.0, ..GbdtParams::default() },
            GbdtParams { colsample_bytree: f64::NAN, ..GbdtParams::default() },
            GbdtParams { max_depth: 0, ..GbdtParams::default() },
        ];
        for params in cases {
            let err = GbdtTrainer::new(1).fit_params(params.clone(), &train, 42).unwrap_err();
            assert!(matches!(err, GbdtError::InvalidValue { .. }), "{params:?}: {err}");
        }
        GbdtParams::default().validate().unwrap();
    }

    #[test]
    fn learns_separable_signal() {
        let train = data();
        let params = GbdtParams {
            n_estimators: 30,
            ..GbdtParams::default()
        };
        let model = GbdtTrainer::new(1).fit_params(params, &train, 1).unwrap();
        let proba = model.predict_proba(&train).unwrap();
        let correct = proba
            .iter()
            .zip(train.labels())
            .filter(|(p, l)| (**p >= 0.5) == (**l == 1))
            .count();
        assert!(correct as f64 / train.len() as f64 > 0.85);
        assert!(model.trees.iter().all(|t| t.depth() <= 3));
    }

    #[test]
    fn same_seed_same_model_any_thread_count() {
        let train = data();
        let cfg = Configuration::new()
            .with("n_estimators", 10)
            .with("subsample", 0.8)
            .with("colsample_bytree", 0.5);
        let a = GbdtTrainer::new(1).fit(&cfg, &train, 43).unwrap();
        let b = GbdtTrainer::new(4).fit(&cfg, &train, 43).unwrap();
        let c = GbdtTrainer::new(1).fit(&cfg, &train, 44).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn feature_mismatch_is_reported() {
        let train = data();
        let model = GbdtTrainer::new(1)
            .fit_params(GbdtParams { n_estimators: 2, ..GbdtParams::default() }, &train, 0)
            .unwrap();
        let other = SyntheticClassification::new(1).with_shape(20, 2, 1).generate().unwrap();
        assert!(matches!(
            model.predict_proba(&other),
            Err(GbdtError::FeatureMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn model_serializes() {
        let train = data();
        let model = GbdtTrainer::new(2)
            .fit_params(GbdtParams { n_estimators: 3, ..GbdtParams::default() }, &train, 5)
            .unwrap();
        let decoded: GbdtModel = serde_json::from_slice(&model.to_json_bytes().unwrap()).unwrap();
        assert_eq!(decoded.trees.len(), 3);
        let before = model.predict_proba(&train).unwrap();
        let after = decoded.predict_proba(&train).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn default_space_has_five_parameters() {
        let space = default_space();
        assert_eq!(space.len(), 5);
        assert_eq!(space.grid_size(), Some(243));
        space.validate().unwrap();
    }
}

//! Single-trial execution against external training and scoring capabilities.

use tb_types::{BoxError, Configuration, TrialError, TrialRecord};
use tracing::debug;

/// Fits a model for one configuration.
///
/// Implementations must be deterministic for identical arguments; all
/// randomness has to come from `sub_seed`.
pub trait Trainer {
    type Data;
    type Model;

    fn fit(
        &self,
        configuration: &Configuration,
        train: &Self::Data,
        sub_seed: u64,
    ) -> Result<Self::Model, BoxError>;
}

/// Scores a fitted model on held-out data. Higher is better.
pub trait Scorer<M, D> {
    /// Metric name recorded in the run summary.
    fn name(&self) -> &str;

    fn score(&self, model: &M, validation: &D) -> Result<f64, BoxError>;
}

/// The fixed train/validation pair shared by every trial of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit<D> {
    pub train: D,
    pub validation: D,
}

impl<D> DataSplit<D> {
    pub fn new(train: D, validation: D) -> Self {
        Self { train, validation }
    }
}

impl<D> From<(D, D)> for DataSplit<D> {
    fn from((train, validation): (D, D)) -> Self {
        Self::new(train, validation)
    }
}

/// Runs one trial: fit on the training split, score on the validation split.
pub struct TrialRunner<'a, T: Trainer, S> {
    trainer: &'a T,
    scorer: &'a S,
    split: &'a DataSplit<T::Data>,
    base_seed: u64,
}

impl<'a, T, S> TrialRunner<'a, T, S>
where
    T: Trainer,
    S: Scorer<T::Model, T::Data>,
{
    pub fn new(trainer: &'a T, scorer: &'a S, split: &'a DataSplit<T::Data>, base_seed: u64) -> Self {
        Self {
            trainer,
            scorer,
            split,
            base_seed,
        }
    }

    /// Seed handed to the trainer for `trial`: the run seed offset by the index.
    pub fn sub_seed(&self, trial: u32) -> u64 {
        self.base_seed.wrapping_add(u64::from(trial))
    }

    /// Errors from the trainer or scorer are returned as-is, tagged with the
    /// trial index. A non-finite metric counts as a scorer failure.
    pub fn run(&self, trial: u32, configuration: Configuration) -> Result<TrialRecord, TrialError> {
        if trial == 0 {
            return Err(TrialError::InvalidIndex { index: trial });
        }

        let sub_seed = self.sub_seed(trial);
        debug!(trial, sub_seed, params = %configuration, "Fitting model");

        let model = self
            .trainer
            .fit(&configuration, &self.split.train, sub_seed)
            .map_err(|source| TrialError::Fit { trial, source })?;

        let metric = self
            .scorer
            .score(&model, &self.split.validation)
            .map_err(|source| TrialError::Score { trial, source })?;

        if !metric.is_finite() {
            return Err(TrialError::NonFiniteMetric {
                trial,
                value: metric,
            });
        }

        Ok(TrialRecord {
            trial,
            metric,
            params: configuration,
        })
    }
}

//! The sequential search loop.

use chrono::Utc;
use tb_types::{config_error, RunSettings, RunSummary, SearchSpace, TbResult};
use tracing::info;

use crate::runner::{DataSplit, Scorer, Trainer, TrialRunner};
use crate::sampler::ParameterSampler;
use crate::tracker::BestTracker;

/// Runs `trial_count` trials: sample, fit and score, track the best.
///
/// Any trial failure aborts the run and no summary is produced.
#[derive(Debug, Clone)]
pub struct SearchDriver {
    settings: RunSettings,
    space: SearchSpace,
}

impl SearchDriver {
    pub fn new(settings: RunSettings, space: SearchSpace) -> TbResult<Self> {
        space.validate()?;
        if settings.n_jobs == 0 {
            return Err(config_error!("n_jobs must be at least 1"));
        }
        if settings.concurrency == 0 {
            return Err(config_error!("concurrency must be at least 1"));
        }
        if !(settings.validation_fraction > 0.0 && settings.validation_fraction < 1.0) {
            return Err(config_error!(
                "validation fraction must be in (0, 1), got {}",
                settings.validation_fraction
            ));
        }
        Ok(Self { settings, space })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn run<T, S>(&self, trainer: &T, scorer: &S, split: &DataSplit<T::Data>) -> TbResult<RunSummary>
    where
        T: Trainer,
        S: Scorer<T::Model, T::Data>,
    {
        let started_at = Utc::now();
        let total = self.settings.trial_count;
        let mut sampler = ParameterSampler::new(self.space.clone(), self.settings.seed)?;
        let runner = TrialRunner::new(trainer, scorer, split, self.settings.seed);
        let mut tracker = BestTracker::new();
        let mut trials = Vec::with_capacity(total as usize);

        info!(
            project = %self.settings.project,
            seed = self.settings.seed,
            trials = total,
            metric = scorer.name(),
            "Starting random search"
        );

        for trial in 1..=total {
            let configuration = sampler.sample();
            let record = runner.run(trial, configuration)?;
            let improved = tracker.observe(&record);
            info!(
                trial,
                total,
                metric = record.metric,
                improved,
                params = %record.params,
                "[{trial}/{total}] {}={:.5}",
                scorer.name(),
                record.metric
            );
            trials.push(record);
        }

        let best = tracker.into_best();
        if let Some(best) = &best {
            info!(trial = best.trial, metric = best.metric, params = %best.params, "Best trial");
        }

        Ok(RunSummary::new(&self.settings, scorer.name(), started_at, trials, best))
    }
}

//! # tb-optimizer
//!
//! Seeded random search over a discrete hyperparameter space.
//!
//! A [`SearchDriver`] draws configurations from a [`ParameterSampler`], runs
//! each one through a [`TrialRunner`] (which calls the external [`Trainer`] and
//! [`Scorer`]), and keeps the best result in a [`BestTracker`]. Trials run
//! strictly one after another.

mod driver;
mod runner;
mod sampler;
mod tracker;

pub use driver::SearchDriver;
pub use runner::{DataSplit, Scorer, Trainer, TrialRunner};
pub use sampler::ParameterSampler;
pub use tracker::BestTracker;

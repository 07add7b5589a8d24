use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use tb_artifacts::{Payload, StorageSettings};
use tb_engine::{f1_score, init_tracing, load_dataset, open_stager, roc_auc, GbdtParams, GbdtTrainer};
use tb_types::config_error;

/// Train one booster with fixed hyperparameters and publish model and metrics.
#[derive(Parser, Debug)]
#[command(name = "tb-train")]
#[command(version)]
struct Args {
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 0.2)]
    validation_fraction: f64,

    /// Probability cut-off for F1
    #[arg(long, default_value_t = 0.5)]
    threshold: f64,

    #[arg(long, default_value_t = 200)]
    n_estimators: usize,

    #[arg(long, default_value_t = 4)]
    max_depth: usize,

    #[arg(long, default_value_t = 0.05)]
    learning_rate: f64,

    #[arg(long, default_value_t = 0.9)]
    subsample: f64,

    #[arg(long, default_value_t = 0.9)]
    colsample_bytree: f64,

    #[arg(long, default_value_t = 2)]
    n_jobs: usize,

    /// Save locally instead of uploading
    #[arg(long)]
    no_upload: bool,

    #[arg(long, default_value = "artifacts/model.json")]
    model_out: String,

    #[arg(long, default_value = "metrics/metrics.json")]
    metrics_out: String,

    /// CSV dataset with a header row
    #[arg(long)]
    data: Option<PathBuf>,

    #[arg(long, default_value = "target")]
    target: String,
}

#[derive(Debug, Serialize)]
struct TrainMetrics<'a> {
    project: &'a str,
    seed: u64,
    validation_fraction: f64,
    threshold: f64,
    roc_auc: f64,
    f1: f64,
    hyperparameters: &'a GbdtParams,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let storage = StorageSettings::from_env();
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let upload = !args.no_upload;
    let model_dest = storage.resolve(&args.model_out, upload, &cwd)?;
    let metrics_dest = storage.resolve(&args.metrics_out, upload, &cwd)?;

    let params = GbdtParams {
        n_estimators: args.n_estimators,
        max_depth: args.max_depth,
        learning_rate: args.learning_rate,
        subsample: args.subsample,
        colsample_bytree: args.colsample_bytree,
        ..GbdtParams::default()
    };
    params.validate().map_err(|e| config_error!("{e}"))?;

    let stager = open_stager(&storage, upload)?;

    let dataset = load_dataset(args.data.as_deref(), &args.target)?;
    let (train, validation) = dataset.stratified_split(args.validation_fraction, args.seed)?;
    let model = GbdtTrainer::new(args.n_jobs)
        .fit_params(params, &train, args.seed)
        .context("training failed")?;

    let proba = model.predict_proba(&validation)?;
    let metrics = TrainMetrics {
        project: &storage.project,
        seed: args.seed,
        validation_fraction: args.validation_fraction,
        threshold: args.threshold,
        roc_auc: roc_auc(&proba, validation.labels())?,
        f1: f1_score(&proba, validation.labels(), args.threshold)?,
        hyperparameters: &model.params,
    };
    info!(roc_auc = metrics.roc_auc, f1 = metrics.f1, "Validation metrics");

    let model_bytes = model.to_json_bytes().context("failed to encode model")?;
    let published = stager.publish(vec![
        (Payload::bytes("model", model_bytes), model_dest),
        (Payload::json("metrics", &metrics)?, metrics_dest),
    ])?;
    for artifact in &published {
        println!("Published {} -> {}", artifact.payload, artifact.location);
    }

    println!("Metrics: {}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

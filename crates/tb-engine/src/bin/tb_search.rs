use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use tb_artifacts::{Payload, StorageSettings};
use tb_engine::{default_space, init_tracing, load_dataset, open_stager, GbdtTrainer, RocAucScorer};
use tb_optimizer::{DataSplit, SearchDriver};
use tb_types::{RunSettings, SearchSpace};

/// Random search over booster hyperparameters, scored by validation ROC AUC.
#[derive(Parser, Debug)]
#[command(name = "tb-search")]
#[command(version)]
struct Args {
    /// Number of trials
    #[arg(long, default_value_t = 10)]
    trials: u32,

    /// Seed for sampling, the data split and per-trial fits
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Threads used inside each fit
    #[arg(long, default_value_t = 2)]
    n_jobs: usize,

    /// Recorded in the summary; trials always run one at a time
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Summary location, relative to the working directory or the bucket prefix
    #[arg(long, default_value = "metrics/hpo_summary.json")]
    out: String,

    /// Save locally instead of uploading
    #[arg(long)]
    no_upload: bool,

    /// JSON object mapping parameter names to candidate lists
    #[arg(long)]
    space: Option<PathBuf>,

    /// CSV dataset with a header row
    #[arg(long)]
    data: Option<PathBuf>,

    /// Label column of the CSV dataset
    #[arg(long, default_value = "target")]
    target: String,

    #[arg(long, default_value_t = 0.2)]
    validation_fraction: f64,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let storage = StorageSettings::from_env();
    let cwd = std::env::current_dir().context("failed to read the working directory")?;
    let destination = storage.resolve(&args.out, !args.no_upload, &cwd)?;

    let space = match &args.space {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            SearchSpace::from_json_reader(file)?
        }
        None => default_space(),
    };

    let settings = RunSettings::new(storage.project.clone(), args.seed, args.trials)
        .with_n_jobs(args.n_jobs)
        .with_concurrency(args.concurrency)
        .with_validation_fraction(args.validation_fraction);
    let driver = SearchDriver::new(settings, space)?;

    // held across the trial loop; dropping it on any error removes scratch
    let stager = open_stager(&storage, destination.is_remote())?;

    let dataset = load_dataset(args.data.as_deref(), &args.target)?;
    let (train, validation) = dataset.stratified_split(args.validation_fraction, args.seed)?;
    info!(
        train = train.len(),
        validation = validation.len(),
        positive_rate = dataset.positive_rate(),
        "Prepared data split"
    );

    let trainer = GbdtTrainer::new(args.n_jobs);
    let summary = driver.run(&trainer, &RocAucScorer, &DataSplit::new(train, validation))?;

    let payload = Payload::json("hpo_summary", &summary)?;
    for artifact in stager.publish(vec![(payload, destination)])? {
        println!("Published {} -> {}", artifact.payload, artifact.location);
    }

    println!(
        "Best trial: {}",
        serde_json::to_string_pretty(&summary.best).context("failed to render best trial")?
    );
    Ok(())
}

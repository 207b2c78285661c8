use anyhow::Result;
use clap::Parser;
use tracking_client::{init_tracing, PublishRequest, Publisher};
use tracking_re::TrackingConfig;

/// Train the iris classifier, log the run and register a new model version.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Experiment to log the run under
    #[arg(long)]
    experiment: Option<String>,

    /// Registered model name
    #[arg(long)]
    model_name: Option<String>,

    /// Run name; defaults to a timestamp
    #[arg(long)]
    run_name: Option<String>,

    /// Point this alias at the new version once registered
    #[arg(long)]
    alias: Option<String>,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut request = PublishRequest::quickstart()?;
    if let Some(experiment) = args.experiment {
        request.experiment_name = experiment;
    }
    if let Some(name) = args.model_name {
        request.registered_model_name = name;
    }
    request.run_name = args.run_name;

    let config = TrackingConfig::from_env();
    let outcome = Publisher::new(config.clone()).publish(&request)?;
    println!(
        "run {} registered {} v{} (accuracy {:.2})",
        outcome.run_id,
        outcome.model_version.name,
        outcome.version(),
        outcome.accuracy
    );

    if let Some(alias) = args.alias {
        let store = tracking_re::TrackingStore::open_existing(&config)?;
        store.set_alias(&outcome.model_version.name, &alias, outcome.version())?;
        println!("@{alias} -> v{}", outcome.version());
    }
    Ok(())
}

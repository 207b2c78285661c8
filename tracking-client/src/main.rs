use anyhow::{Context, Result};
use clap::Parser;
use tracking_client::resolver::{DEFAULT_ALIAS, DEFAULT_MODEL_NAME};
use tracking_client::{init_tracing, Resolver};
use tracking_re::TrackingConfig;
use tracing::info;

/// Load a registered model by alias and run a sample prediction.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Registered model name
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,

    /// Alias to resolve
    #[arg(long, default_value = DEFAULT_ALIAS)]
    model_alias: String,

    /// Comma separated feature values for the sample row
    #[arg(long, default_value = "5.1,3.5,1.4,0.2")]
    features: String,
}

fn parse_row(raw: &str) -> Result<Vec<f64>> {
    raw.split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid feature value '{v}'"))
        })
        .collect()
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let row = parse_row(&args.features)?;

    let resolver = Resolver::new(TrackingConfig::from_env());
    info!("Loading model {}@{}", args.model_name, args.model_alias);
    let loaded = resolver.resolve_and_load(&args.model_name, &args.model_alias)?;

    let prediction = resolver.predict(&loaded, &[row])?;
    println!("{}", loaded.metadata());
    println!("signature: {}", loaded.signature());
    println!("prediction: {prediction:?}");
    Ok(())
}

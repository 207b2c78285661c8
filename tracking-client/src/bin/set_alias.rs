use anyhow::{bail, Result};
use clap::Parser;
use tracking_client::init_tracing;
use tracking_re::{TrackingConfig, TrackingStore};

/// Point an alias of a registered model at a version, or remove it.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Registered model name
    #[arg(long)]
    model_name: String,

    /// Alias to assign or delete
    #[arg(long)]
    alias: String,

    /// Version the alias should point at
    #[arg(long, conflicts_with = "delete")]
    version: Option<i64>,

    /// Remove the alias instead
    #[arg(long)]
    delete: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let store = TrackingStore::open_existing(&TrackingConfig::from_env())?;

    match (args.version, args.delete) {
        (_, true) => {
            store.delete_alias(&args.model_name, &args.alias)?;
            println!("removed @{} from {}", args.alias, args.model_name);
        }
        (Some(version), false) => {
            store.set_alias(&args.model_name, &args.alias, version)?;
            println!("{}@{} -> v{version}", args.model_name, args.alias);
        }
        (None, false) => bail!("either --version or --delete is required"),
    }
    Ok(())
}

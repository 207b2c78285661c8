//! Publish and resolve registered models.
//!
//! [`Publisher`] trains a classifier, records the run and registers the
//! model as a new version. [`Resolver`] turns a model name and alias back
//! into a loaded model that can predict.

pub mod artifact;
pub mod publisher;
pub mod resolver;

pub use artifact::ModelArtifact;
pub use publisher::{PublishOutcome, PublishRequest, Publisher};
pub use resolver::{LoadedModel, ModelUri, Resolver};

use tracing_subscriber::EnvFilter;

/// Install the `fmt` subscriber used by the binaries. `RUST_LOG` overrides
/// the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! Tracing subscriber setup

use anyhow::{bail, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `RUST_LOG` wins over `level` when set
pub fn init(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        "plain" => registry.with(fmt::layer()).try_init()?,
        "json" => registry.with(fmt::layer().json()).try_init()?,
        other => bail!("unknown log format {:?}, expected plain or json", other),
    }
    Ok(())
}

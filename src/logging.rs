use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Default filter for a given number of `-v` flags.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,hls_archiver=info",
        _ => "info,hls_archiver=debug",
    }
}

/// Structured logs on stderr. `RUST_LOG` takes precedence over `-v`.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialised: {e}"))?;

    tracing::debug!(verbosity, "logging initialised");
    Ok(())
}

// Logging setup for the CoFrame binary and tests

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging at the default level
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with configurable verbosity.
///
/// `--quiet` wins over `RUST_LOG`; otherwise `RUST_LOG` wins over the flags.
/// Calling this more than once is harmless.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose))
    } else {
        default_filter(verbose)
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_line_number(verbose)
        .with_file(verbose)
        .with_writer(std::io::stderr);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        debug!("CoFrame logging initialized");
    }
    Ok(())
}

fn default_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("coframe=debug,info")
    } else {
        EnvFilter::new("coframe=info,warn")
    }
}

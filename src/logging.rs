//! Tracing setup for the binary. Logs go to stderr so stdout stays
//! machine-readable.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "carboncat=info";

/// `RUST_LOG` wins; `verbose` lowers the default to debug.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "carboncat=debug" } else { DEFAULT_FILTER };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

//! Tracing subscriber setup for binaries and demos.

use rt_types::{config_error, TuneResult};
use tracing_subscriber::EnvFilter;

/// Installs a formatted tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter`. Engine diagnostics are
/// emitted under the `racetune::engine` target.
pub fn init_tracing(default_filter: &str) -> TuneResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| config_error!("invalid log filter {:?}: {}", default_filter, e))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| config_error!("failed to install tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_reported() {
        let first = init_tracing("info");
        let second = init_tracing("info");
        // another test may have installed a subscriber first
        assert!(first.is_err() || second.is_err());
    }
}

//! Logging and profiling.
//!
//! Library code emits `tracing` events and spans; the binary installs the
//! subscriber with [`init_tracing`]. The filter comes from `CE_LOG` when set,
//! otherwise from the verbosity flags.

pub mod profiling;

pub use profiling::{OperationTiming, ProfileReport, ProfileSpan, Profiler};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_ENV_VAR: &str = "CE_LOG";

/// Default filter directive for a verbosity level.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn,compute_engine=info",
        1 => "info,compute_engine=debug",
        _ => "debug,compute_engine=trace",
    }
}

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_directives() {
        assert!(default_directive(0).contains("compute_engine=info"));
        assert!(default_directive(1).contains("compute_engine=debug"));
        assert!(default_directive(5).contains("trace"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_tracing(0);
        init_tracing(1);
    }
}

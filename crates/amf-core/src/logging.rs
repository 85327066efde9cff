//! `tracing` subscriber setup.
//!
//! Dispatcher call tracing is emitted on [`TRACE_TARGET`], so it can be
//! silenced on its own, e.g. `RUST_LOG=info,amf::trace=off`.

use tracing_subscriber::EnvFilter;

/// Target of the received-calls / produced-results trace lines.
pub const TRACE_TARGET: &str = "amf::trace";

/// Install the process-wide subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `level`. `json` switches from compact
/// text to one JSON object per line. Only the first call has an effect;
/// returns whether this call installed the subscriber.
pub fn init(level: &str, json: bool) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr);

    // try_init fails when a subscriber is already installed
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.with_target(true).compact().try_init()
    };
    installed.is_ok()
}

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_ignored() {
        let _ = init("warn", false);
        assert!(!init("debug", true));
        assert!(!init("warn", false));
    }
}

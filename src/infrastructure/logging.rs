//! Structured logging setup

use tracing_subscriber::EnvFilter;

/// Log level for a `-v`/`-q` combination. `quiet` wins.
pub fn level_for(verbosity: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

/// Install the global subscriber writing to stderr.
///
/// `RUST_LOG` overrides the level derived from the flags.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logging(verbosity: u8, quiet: bool) {
    let default_level = level_for(verbosity, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("scribe_queue={default_level},warn")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0, false), "warn");
        assert_eq!(level_for(1, false), "info");
        assert_eq!(level_for(2, false), "debug");
        assert_eq!(level_for(5, false), "debug");
    }

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(level_for(2, true), "error");
    }
}

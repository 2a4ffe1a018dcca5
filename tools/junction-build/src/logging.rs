//! Structured logging setup
//!
//! `RUST_LOG` takes precedence over the verbosity flag. Logs go to stderr so
//! subcommands like `plan` keep stdout for their output.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_directives(verbose: u8) -> &'static str {
    match verbose {
        0 => "info,reqwest=warn,hyper=warn",
        1 => "debug,reqwest=warn,hyper=warn",
        _ => "trace",
    }
}

/// Install the global subscriber; later calls are ignored
pub fn init_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_target(true))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}

// Logging setup for the avatalk binary

use avatalk_core::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Filter directives: `RUST_LOG` wins, then `--verbose`, then the config.
pub fn filter_directives(config: &LoggingConfig, rust_log: Option<String>, verbose: bool) -> String {
    match rust_log.filter(|v| !v.trim().is_empty()) {
        Some(directives) => directives,
        None if verbose => "debug".to_string(),
        None => config.level.clone(),
    }
}

/// Install the global subscriber. Logs go to stderr so stdout stays free for
/// command output.
pub fn init(config: &LoggingConfig, verbose: bool) {
    let directives = filter_directives(config, std::env::var("RUST_LOG").ok(), verbose);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(directives))
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    // A subscriber installed earlier (tests) is left in place.
    if config.json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

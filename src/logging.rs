use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Install the global subscriber shared by every binary.
///
/// `RUST_LOG` wins over `default_filter`. `LOG_FORMAT=json` switches to JSON
/// lines for log shipping; anything else keeps the human-readable format.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .with_file(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

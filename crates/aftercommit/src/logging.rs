use aftercommit_config::LogSettings;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::CliError;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `--verbose`, which wins over the `[log] filter` setting.
pub(crate) fn init(verbose: bool, settings: &LogSettings) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => filter_from_settings(settings)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init()
        .map_err(CliError::Logging)
}

fn filter_from_settings(settings: &LogSettings) -> Result<EnvFilter, CliError> {
    EnvFilter::try_new(settings.filter()).map_err(|source| CliError::LogFilter {
        filter: settings.filter().to_string(),
        source,
    })
}

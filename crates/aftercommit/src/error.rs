use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to determine current directory")]
    CurrentDir(#[source] std::io::Error),

    #[error("settings error")]
    Config(#[from] aftercommit_config::ConfigError),

    #[error("invalid log filter '{filter}'")]
    LogFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to install log subscriber")]
    Logging(#[source] tracing_subscriber::util::TryInitError),

    #[error("worker pool error")]
    Pool(#[from] aftercommit_pool::PoolError),

    #[error("unit of work failed")]
    Unit(#[from] aftercommit_unit::UnitError),
}

pub type Result<T> = std::result::Result<T, CliError>;

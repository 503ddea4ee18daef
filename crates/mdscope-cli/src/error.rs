use mdscope::loader::LoaderError;
use mdscope::stats::StatsError;
use mdscope::stats::persist::PersistError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("Persisted statistics error: {0}")]
    Persist(#[from] PersistError),

    #[error("Invalid analysis config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("CSV export error: {0}")]
    Csv(#[from] csv::Error),
}

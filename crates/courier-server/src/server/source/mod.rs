mod file;
mod rates;
pub use file::*;
pub use rates::*;

use super::config::SourceConfig;
use courier::{Result, Source, WorkItem};

/// The producer source selected by configuration.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
    Rates(RatesSource),
    File(FileSource),
}

impl SnapshotSource {
    /// # Errors
    ///
    /// Returns [`courier::Error::InvalidConfiguration`] if the rates endpoint
    /// is not a valid URL or its HTTP client cannot be built.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        match config {
            SourceConfig::Rates { url, timeout } => {
                RatesSource::new(url.as_str(), *timeout).map(Self::Rates)
            }
            SourceConfig::File { path } => Ok(Self::File(FileSource::new(path))),
        }
    }
}

impl Source for SnapshotSource {
    async fn fetch(&self) -> Result<Vec<WorkItem>> {
        match self {
            Self::Rates(source) => source.fetch().await,
            Self::File(source) => source.fetch().await,
        }
    }
}

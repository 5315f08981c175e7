use thiserror::Error;

use crate::StreetNodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed graph: {0}")]
    MalformedGraph(String),
    #[error("No points of interest for category '{0}'")]
    EmptyDestinationSet(String),
    #[error("Batch results disagree on origin nodes: {0}")]
    BatchMergeMismatch(String),
    #[error("Node {0} is not part of the street graph")]
    UnknownNode(StreetNodeId),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("WKT error: {0}")]
    WktError(String),
    #[error("H3 error: {0}")]
    H3Error(#[from] h3o::error::InvalidGeometry),
    #[error("Invalid H3 resolution: {0}")]
    InvalidResolution(String),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Isochrone error: {0}")]
    IsochroneError(String),
}

impl Error {
    /// Whether a pipeline run may continue with the next category after
    /// this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::EmptyDestinationSet(_)
                | Error::InvalidData(_)
                | Error::UnknownNode(_)
                | Error::IsochroneError(_)
        )
    }
}

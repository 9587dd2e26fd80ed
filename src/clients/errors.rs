use rspotify::{ClientError, model::IdError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to parse transmit data, error: {0}")]
    ParseError(String),

    #[error("Spotify error: {0}")]
    SpotifyError(#[from] ClientError),

    #[error("Invalid Spotify id: {0}")]
    SpotifyIdError(#[from] IdError),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Google Sheets API returned {status}: {message}")]
    SheetsApiError { status: u16, message: String },

    #[error("Google authorization error: {0}")]
    GoogleAuthError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::ConfigurationError(err.to_string())
    }
}

// Error taxonomy for clip loading and playback
// Inside the player every kind is logged and swallowed; only config errors reach callers

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio context could be created on this platform
    #[error("Audio output is not supported: {0}")]
    PlatformUnsupported(String),

    /// Raw clip bytes could not be retrieved
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// Bytes were retrieved but are not decodable audio
    #[error("Failed to decode audio data: {0}")]
    DecodeFailure(String),

    /// `play` was asked for a name with no registered buffer
    #[error("Audio buffer not found for key: {0}")]
    MissingBuffer(String),

    /// Building or connecting the source/gain graph failed
    #[error("Failed to start playback: {0}")]
    PlaybackConstruction(String),

    #[error("Audio context resume failed: {0}")]
    ResumeFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AudioError {
    pub(crate) fn fetch(url: &str, reason: impl ToString) -> Self {
        Self::FetchFailure {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AudioError>;

//! Error handling for VoiceFX
//!
//! Every render-path failure is a typed variant so the session layer can
//! decide what to show the user. All errors carry recovery suggestions.

use thiserror::Error;

/// Result type alias for VoiceFX operations
pub type Result<T> = std::result::Result<T, VoiceFxError>;

/// Main error type for VoiceFX operations
#[derive(Error, Debug)]
pub enum VoiceFxError {
    // Source Errors
    #[error("File not found: {path}")]
    FileNotFound {
        path: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    // Engine Errors
    #[error("Rendering engine could not start: {reason}")]
    EngineStartFailure { reason: String },

    #[error("Rendering engine failed: {reason}")]
    EngineFailure { reason: String },

    #[error("Operation '{operation}' is not valid while the engine is {state}")]
    InvalidState { operation: String, state: String },

    #[error("Invalid parameter {param}={value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    // Render Errors
    #[error("Cannot create output file {path}: {reason}")]
    OutputCreateFailure { path: String, reason: String },

    #[error("Write to {path} failed: {reason}")]
    WriteFailure { path: String, reason: String },

    #[error("Render incomplete: {rendered} of {expected} frames produced ({reason})")]
    RenderIncomplete {
        rendered: u64,
        expected: u64,
        reason: String,
    },

    #[error("A render is already in progress for this session")]
    RenderAlreadyInProgress,

    #[error("Render was cancelled")]
    RenderCancelled,

    // Collaborator Errors
    #[error("Muxing failed: {reason}")]
    MuxError { reason: String },

    #[error("Audio extraction failed: {reason}")]
    DemuxError { reason: String },

    // Session Errors
    #[error("No video has been selected")]
    NoVideoSelected,

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VoiceFxError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            VoiceFxError::FileNotFound { .. } => "FILE_NOT_FOUND",
            VoiceFxError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            VoiceFxError::EngineStartFailure { .. } => "ENGINE_START_FAILURE",
            VoiceFxError::EngineFailure { .. } => "ENGINE_FAILURE",
            VoiceFxError::InvalidState { .. } => "INVALID_STATE",
            VoiceFxError::InvalidParameter { .. } => "INVALID_PARAMETER",
            VoiceFxError::OutputCreateFailure { .. } => "OUTPUT_CREATE_FAILURE",
            VoiceFxError::WriteFailure { .. } => "WRITE_FAILURE",
            VoiceFxError::RenderIncomplete { .. } => "RENDER_INCOMPLETE",
            VoiceFxError::RenderAlreadyInProgress => "RENDER_ALREADY_IN_PROGRESS",
            VoiceFxError::RenderCancelled => "RENDER_CANCELLED",
            VoiceFxError::MuxError { .. } => "MUX_ERROR",
            VoiceFxError::DemuxError { .. } => "DEMUX_ERROR",
            VoiceFxError::NoVideoSelected => "NO_VIDEO_SELECTED",
            VoiceFxError::Io(_) => "IO_ERROR",
            VoiceFxError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if the user can retry the same request and expect it to work
    pub fn is_recoverable(&self) -> bool {
        match self {
            VoiceFxError::EngineStartFailure { .. } => true,
            VoiceFxError::RenderAlreadyInProgress => true,
            VoiceFxError::RenderCancelled => true,
            VoiceFxError::MuxError { .. } => true,
            VoiceFxError::InvalidParameter { .. } => true,
            VoiceFxError::NoVideoSelected => true,
            _ => false,
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            VoiceFxError::FileNotFound { .. } => vec![
                "Check the file path is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            VoiceFxError::UnsupportedFormat { .. } => vec![
                "Pick a different video with an audio track",
                "Supported audio: mono or stereo WAV, 8/16/24-bit integer or 32-bit float",
            ],
            VoiceFxError::EngineStartFailure { .. } => vec![
                "Try the export again",
                "Check the audio output device is available",
            ],
            VoiceFxError::OutputCreateFailure { .. } | VoiceFxError::WriteFailure { .. } => vec![
                "Free up disk space",
                "Check the working directory is writable",
            ],
            VoiceFxError::RenderIncomplete { .. } => vec![
                "The source audio ended early - it may be truncated",
                "Re-import the video and try again",
            ],
            VoiceFxError::RenderAlreadyInProgress => {
                vec!["Wait for the current export to finish"]
            }
            VoiceFxError::MuxError { .. } | VoiceFxError::DemuxError { .. } => vec![
                "Check that ffmpeg is installed and on PATH",
                "Try a different video file",
            ],
            VoiceFxError::NoVideoSelected => vec!["Select or record a video first"],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = VoiceFxError::FileNotFound {
            path: "test.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
        assert_eq!(
            VoiceFxError::RenderAlreadyInProgress.error_code(),
            "RENDER_ALREADY_IN_PROGRESS"
        );
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = VoiceFxError::WriteFailure {
            path: "out.wav".to_string(),
            reason: "disk full".to_string(),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_render_incomplete_message() {
        let err = VoiceFxError::RenderIncomplete {
            rendered: 100,
            expected: 200,
            reason: "underrun".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Render incomplete: 100 of 200 frames produced (underrun)"
        );
    }
}

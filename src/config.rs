//! Session configuration
//!
//! Stored as JSON. Missing fields fall back to their defaults, so an empty
//! object is a valid config.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::engine::buffer::{DEFAULT_BLOCK_CAPACITY, MAX_BLOCK_CAPACITY};
use crate::engine::DEFAULT_LIVE_BLOCK_FRAMES;
use crate::error::{Result, VoiceFxError};

/// Settings of one editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames per offline render block
    pub block_capacity: usize,
    /// Frames per live preview block
    pub live_block_frames: usize,
    /// Directory for extracted, rendered and muxed files
    pub work_dir: PathBuf,
    pub extracted_audio_name: String,
    pub rendered_audio_name: String,
    pub merged_video_name: String,
    /// Where `export_to_library` copies finished videos
    pub export_dir: Option<PathBuf>,
    pub ffmpeg_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
            live_block_frames: DEFAULT_LIVE_BLOCK_FRAMES,
            work_dir: std::env::temp_dir().join("voicefx"),
            extracted_audio_name: "audio.wav".to_string(),
            rendered_audio_name: "altered_audio.wav".to_string(),
            merged_video_name: "mergedVideo.mov".to_string(),
            export_dir: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl SessionConfig {
    /// Load and validate a JSON config file
    ///
    /// # Errors
    /// * `FileNotFound` - the file does not exist or cannot be read
    /// * `Serialization` - the file is not valid JSON for this struct
    /// * `InvalidParameter` - a value fails validation
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| VoiceFxError::FileNotFound {
                path: path.display().to_string(),
                source: Some(e),
            })?;
        let config: SessionConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded session config from {}", path.display());
        Ok(config)
    }

    /// Write the config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject block sizes the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        for (param, value) in [
            ("block_capacity", self.block_capacity),
            ("live_block_frames", self.live_block_frames),
        ] {
            if value == 0 || value > MAX_BLOCK_CAPACITY {
                return Err(VoiceFxError::InvalidParameter {
                    param: param.to_string(),
                    value: value.to_string(),
                    expected: format!("1 to {} frames", MAX_BLOCK_CAPACITY),
                });
            }
        }
        for (param, value) in [
            ("extracted_audio_name", &self.extracted_audio_name),
            ("rendered_audio_name", &self.rendered_audio_name),
            ("merged_video_name", &self.merged_video_name),
        ] {
            if value.is_empty() {
                return Err(VoiceFxError::InvalidParameter {
                    param: param.to_string(),
                    value: String::new(),
                    expected: "a file name".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn extracted_audio_path(&self) -> PathBuf {
        self.work_dir.join(&self.extracted_audio_name)
    }

    pub fn rendered_audio_path(&self) -> PathBuf {
        self.work_dir.join(&self.rendered_audio_name)
    }

    pub fn merged_video_path(&self) -> PathBuf {
        self.work_dir.join(&self.merged_video_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.block_capacity, 4096);
        assert_eq!(config.live_block_frames, 512);
        assert_eq!(config.merged_video_name, "mergedVideo.mov");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voicefx.json");
        std::fs::write(&path, r#"{ "block_capacity": 1024, "export_dir": "/tmp/out" }"#).unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.block_capacity, 1024);
        assert_eq!(config.export_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.rendered_audio_name, "altered_audio.wav");
    }

    #[test]
    fn test_load_rejects_zero_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voicefx.json");
        std::fs::write(&path, r#"{ "block_capacity": 0 }"#).unwrap();

        let err = SessionConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("voicefx.json");
        let config = SessionConfig {
            work_dir: dir.path().to_path_buf(),
            live_block_frames: 256,
            ..SessionConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(SessionConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        let err = SessionConfig::load(Path::new("/no/such/voicefx.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}

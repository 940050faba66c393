//! Video collaborators
//!
//! Demultiplexing the audio track out of a video and multiplexing rendered
//! audio back in are delegated to an external service. The default
//! implementations run `ffmpeg`.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::engine::io::SourceAsset;
use crate::error::{Result, VoiceFxError};

/// A video with the rendered audio track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxedAsset {
    pub path: PathBuf,
    pub muxed_at: DateTime<Utc>,
}

/// Combines a video stream with an audio asset
///
/// The result is trimmed to the shorter of the two inputs.
pub trait Muxer: Send + Sync {
    fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<MuxedAsset>> + Send;
}

/// Extracts the audio track of a video into a decodable asset
pub trait Demuxer: Send + Sync {
    fn extract_audio(
        &self,
        video: &Path,
        output: &Path,
    ) -> impl Future<Output = Result<SourceAsset>> + Send;
}

// ============================================================================
// ffmpeg
// ============================================================================

/// Muxes with `ffmpeg`, copying the video stream untouched
#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<MuxedAsset> {
        info!(
            "Muxing {} + {} -> {}",
            video.display(),
            audio.display(),
            output.display()
        );
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-map", "0:v:0", "-map", "1:a:0"])
            .args(["-c:v", "copy", "-c:a", "aac"])
            .arg("-shortest")
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        run_ffmpeg(cmd)
            .await
            .map_err(|reason| VoiceFxError::MuxError { reason })?;

        if !output.exists() {
            return Err(VoiceFxError::MuxError {
                reason: format!("ffmpeg produced no file at {}", output.display()),
            });
        }
        Ok(MuxedAsset {
            path: output.to_path_buf(),
            muxed_at: Utc::now(),
        })
    }
}

/// Extracts audio with `ffmpeg` as 16-bit PCM WAV
#[derive(Debug, Clone)]
pub struct FfmpegDemuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegDemuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl Default for FfmpegDemuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Demuxer for FfmpegDemuxer {
    async fn extract_audio(&self, video: &Path, output: &Path) -> Result<SourceAsset> {
        info!(
            "Extracting audio of {} -> {}",
            video.display(),
            output.display()
        );
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-vn")
            .args(["-acodec", "pcm_s16le", "-f", "wav"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        run_ffmpeg(cmd)
            .await
            .map_err(|reason| VoiceFxError::DemuxError { reason })?;

        let asset = SourceAsset::file(output);
        asset.probe().map_err(|e| VoiceFxError::DemuxError {
            reason: format!("extracted audio is not decodable: {}", e),
        })?;
        Ok(asset)
    }
}

/// Run an ffmpeg command, returning its stderr on failure
async fn run_ffmpeg(mut cmd: Command) -> std::result::Result<(), String> {
    debug!("Running {:?}", cmd.as_std());
    let output = cmd
        .output()
        .await
        .map_err(|e| format!("cannot run ffmpeg: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "ffmpeg exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }
    Ok(())
}

// ============================================================================
// Passthrough
// ============================================================================

/// Uses the "video" itself as the audio track; it must be a WAV file
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDemuxer;

impl Demuxer for PassthroughDemuxer {
    async fn extract_audio(&self, video: &Path, _output: &Path) -> Result<SourceAsset> {
        let asset = SourceAsset::file(video);
        let info = asset.probe().map_err(|e| VoiceFxError::DemuxError {
            reason: e.to_string(),
        })?;
        debug!(
            "Using {} directly as audio ({}, {:.2}s)",
            video.display(),
            info.format,
            info.duration_secs()
        );
        Ok(asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::io::{generate_test_tone, write_wav};
    use crate::engine::{AudioFormat, ChannelLayout};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_passthrough_accepts_wav() {
        let dir = tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        write_wav(
            &generate_test_tone(440.0, 0.1, 44100),
            &wav,
            &AudioFormat::pcm16(44100, ChannelLayout::Mono),
        )
        .unwrap();

        let asset = PassthroughDemuxer
            .extract_audio(&wav, &dir.path().join("unused.wav"))
            .await
            .unwrap();
        assert_eq!(asset.path(), Some(wav.as_path()));
    }

    #[tokio::test]
    async fn test_passthrough_rejects_non_audio() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("clip.mov");
        std::fs::write(&video, b"moov").unwrap();

        let err = PassthroughDemuxer
            .extract_audio(&video, &dir.path().join("unused.wav"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DEMUX_ERROR");
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_mux_error() {
        let dir = tempdir().unwrap();
        let muxer = FfmpegMuxer::new(dir.path().join("no-such-ffmpeg"));
        let err = muxer
            .mux(
                &dir.path().join("v.mov"),
                &dir.path().join("a.wav"),
                &dir.path().join("out.mov"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MUX_ERROR");
        assert!(err.to_string().contains("cannot run ffmpeg"));
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_demux_error() {
        let dir = tempdir().unwrap();
        let demuxer = FfmpegDemuxer::new(dir.path().join("no-such-ffmpeg"));
        let err = demuxer
            .extract_audio(&dir.path().join("v.mov"), &dir.path().join("a.wav"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DEMUX_ERROR");
    }
}

//! Offline rendering
//!
//! Drives the engine in manual-rendering mode, block by block, writing each
//! block to a new audio asset. The loop is strictly sequential and pulls
//! `min(capacity, remaining)` frames per step, so the same source and chain
//! parameters always produce the same block sequence and the same bytes.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::engine::buffer::{AudioBuffer, AudioFormat, DEFAULT_BLOCK_CAPACITY};
use crate::engine::io::{AssetInfo, OutputFactory, SourceAsset, WavOutputFactory};
use crate::engine::{AudioGraphEngine, RenderStatus};
use crate::error::{Result, VoiceFxError};

/// One offline render request
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub id: Uuid,
    pub source: SourceAsset,
    pub output_path: PathBuf,
    /// Maximum frames per block
    pub block_capacity: usize,
}

impl RenderJob {
    /// Render `source` to `output_path` with the default block capacity
    pub fn new(source: SourceAsset, output_path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            output_path: output_path.into(),
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }

    pub fn with_block_capacity(mut self, block_capacity: usize) -> Self {
        self.block_capacity = block_capacity;
        self
    }
}

/// A successfully rendered audio asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedAsset {
    pub job_id: Uuid,
    pub path: PathBuf,
    /// Inherited from the source
    pub format: AudioFormat,
    pub total_frames: u64,
    /// Frames produced by each block, in order
    pub block_frames: Vec<usize>,
    pub checksum_sha256: String,
    pub rendered_at: DateTime<Utc>,
}

impl RenderedAsset {
    pub fn duration_secs(&self) -> f64 {
        self.format.frames_to_secs(self.total_frames)
    }
}

/// Shared flag that asks a render to stop at the next block boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Renders jobs through an [`AudioGraphEngine`]
#[derive(Clone)]
pub struct OfflineRenderer {
    output_factory: Arc<dyn OutputFactory>,
}

impl OfflineRenderer {
    /// Renderer writing WAV files
    pub fn new() -> Self {
        Self::with_output_factory(Arc::new(WavOutputFactory))
    }

    /// Renderer writing through a custom output factory
    pub fn with_output_factory(output_factory: Arc<dyn OutputFactory>) -> Self {
        Self { output_factory }
    }

    /// Render `job` with the engine's current chain parameters
    ///
    /// The engine is left in `LivePrepared` if it knows a live source,
    /// `Idle` otherwise, on success and on failure alike. On failure no
    /// file is left at the output path.
    ///
    /// # Errors
    /// * `UnsupportedFormat` - the source has no decodable audio
    /// * `EngineStartFailure` - manual rendering could not be enabled
    /// * `OutputCreateFailure` - the output asset could not be created
    /// * `WriteFailure` - a block could not be written
    /// * `RenderIncomplete` - the source delivered fewer frames than declared
    /// * `EngineFailure` - the graph failed mid-render
    /// * `RenderCancelled` - `cancel` was triggered
    pub fn render(
        &self,
        engine: &mut AudioGraphEngine,
        job: &RenderJob,
        cancel: &CancelToken,
    ) -> Result<RenderedAsset> {
        info!(
            "[RENDER] Job {}: {} -> {}",
            job.id,
            job.source,
            job.output_path.display()
        );

        let outcome = self.render_blocks(engine, job, cancel);
        let finished = engine.finish_offline();

        let (info, block_frames) = match outcome {
            Ok(done) => done,
            Err(e) => {
                warn!("[RENDER] Job {} failed: {}", job.id, e);
                discard_partial(&job.output_path);
                return Err(e);
            }
        };
        if let Err(e) = finished {
            warn!("[RENDER] Live preview not restored after job {}: {}", job.id, e);
        }

        let checksum_sha256 = match checksum_file(&job.output_path) {
            Ok(checksum) => checksum,
            Err(e) => {
                discard_partial(&job.output_path);
                return Err(e);
            }
        };

        info!(
            "[RENDER] Job {} done: {} frames in {} blocks",
            job.id,
            info.total_frames,
            block_frames.len()
        );
        Ok(RenderedAsset {
            job_id: job.id,
            path: job.output_path.clone(),
            format: info.format,
            total_frames: info.total_frames,
            block_frames,
            checksum_sha256,
            rendered_at: Utc::now(),
        })
    }

    fn render_blocks(
        &self,
        engine: &mut AudioGraphEngine,
        job: &RenderJob,
        cancel: &CancelToken,
    ) -> Result<(AssetInfo, Vec<usize>)> {
        engine.prepare_offline(&job.source, job.block_capacity)?;
        let info = engine
            .offline_info()
            .ok_or_else(|| VoiceFxError::EngineStartFailure {
                reason: "offline graph missing after prepare".to_string(),
            })?;

        if job.output_path.exists() {
            fs::remove_file(&job.output_path).map_err(|e| VoiceFxError::OutputCreateFailure {
                path: job.output_path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let mut writer = self.output_factory.create(&job.output_path, &info.format)?;

        engine.start_offline()?;

        let capacity = job.block_capacity;
        let total = info.total_frames;
        let mut block = AudioBuffer::for_format(&info.format, capacity);
        let mut block_frames = Vec::with_capacity((total as usize).div_ceil(capacity));
        let mut rendered: u64 = 0;

        while rendered < total {
            if cancel.is_cancelled() {
                info!("[RENDER] Job {} cancelled at frame {}", job.id, rendered);
                return Err(VoiceFxError::RenderCancelled);
            }

            let wanted = (total - rendered).min(capacity as u64) as usize;
            match engine.render_next_block(&mut block, wanted)? {
                RenderStatus::Rendered(n) => {
                    writer.write_block(&block, n)?;
                    rendered += n as u64;
                    block_frames.push(n);
                    debug!("[RENDER] Block {}: {} frames", block_frames.len(), n);
                }
                RenderStatus::TransientUnderrun => {
                    return Err(VoiceFxError::RenderIncomplete {
                        rendered,
                        expected: total,
                        reason: "source could not deliver audio".to_string(),
                    });
                }
                RenderStatus::EndOfSource => {
                    return Err(VoiceFxError::RenderIncomplete {
                        rendered,
                        expected: total,
                        reason: "source ended early".to_string(),
                    });
                }
                RenderStatus::Fatal(reason) => {
                    return Err(VoiceFxError::EngineFailure { reason });
                }
            }
        }

        writer.finalize()?;
        Ok((info, block_frames))
    }
}

impl Default for OfflineRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OfflineRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineRenderer").finish_non_exhaustive()
    }
}

fn discard_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!("[RENDER] Could not remove partial output {}: {}", path.display(), e);
        }
    }
}

/// SHA-256 of a file as lowercase hex
pub fn checksum_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

//! Editing session
//!
//! [`SessionController`] ties the pieces together for one video: extract its
//! audio, preview it live through the chain, switch voice filters, render the
//! altered audio offline, mux it back with the video and cache the result.
//!
//! Offline renders run on a dedicated `offline-render` thread that takes the
//! engine with it and hands it back when done, so live preview and offline
//! rendering can never overlap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::dsp::EffectChain;
use crate::engine::io::SourceAsset;
use crate::engine::live::OutputDeviceFactory;
use crate::engine::{AudioGraphEngine, EngineState};
use crate::error::{Result, VoiceFxError};
use crate::filter::VoiceFilter;
use crate::media::{Demuxer, Muxer};
use crate::render::{CancelToken, OfflineRenderer, RenderJob, RenderedAsset};

/// Message shown while an export is being produced
pub const PROCESSING_MESSAGE: &str = "Video is being processed";

// ============================================================================
// View notifications
// ============================================================================

/// Notifications sent to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    VideoReadyToPlay,
    LoadingStarted(String),
    LoadingFinished,
    Restarted,
}

/// Fire-and-forget sink for session notifications
pub trait ViewInput: Send + Sync {
    fn video_ready_to_play(&self);
    fn loading_started(&self, message: &str);
    fn loading_finished(&self);
    fn restarted(&self);
}

/// Ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl ViewInput for NullView {
    fn video_ready_to_play(&self) {}
    fn loading_started(&self, _message: &str) {}
    fn loading_finished(&self) {}
    fn restarted(&self) {}
}

/// Writes notifications to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogView;

impl ViewInput for LogView {
    fn video_ready_to_play(&self) {
        info!("Video ready to play");
    }

    fn loading_started(&self, message: &str) {
        info!("{}...", message);
    }

    fn loading_finished(&self) {
        info!("Processing finished");
    }

    fn restarted(&self) {
        info!("Session restarted");
    }
}

impl ViewInput for mpsc::UnboundedSender<SessionEvent> {
    fn video_ready_to_play(&self) {
        let _ = self.send(SessionEvent::VideoReadyToPlay);
    }

    fn loading_started(&self, message: &str) {
        let _ = self.send(SessionEvent::LoadingStarted(message.to_string()));
    }

    fn loading_finished(&self) {
        let _ = self.send(SessionEvent::LoadingFinished);
    }

    fn restarted(&self) {
        let _ = self.send(SessionEvent::Restarted);
    }
}

// ============================================================================
// Render handles
// ============================================================================

/// Completion handle of a background render
///
/// Dropping the handle discards the result; the render still finishes and
/// hands the engine back.
#[derive(Debug)]
pub struct RenderHandle {
    job_id: Uuid,
    receiver: oneshot::Receiver<Result<RenderedAsset>>,
    cancel: CancelToken,
}

impl RenderHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Ask the render to stop at the next block boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the render to finish
    pub async fn wait(self) -> Result<RenderedAsset> {
        self.receiver
            .await
            .map_err(|_| VoiceFxError::EngineFailure {
                reason: "render thread exited without a result".to_string(),
            })?
    }
}

/// Render in flight; owns the engine until joined
struct PendingRender {
    handle: JoinHandle<AudioGraphEngine>,
    cancel: CancelToken,
    /// Set once the result has been produced
    done: Arc<AtomicBool>,
    /// Chain revision the render started at
    revision: u64,
}

impl PendingRender {
    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.handle.is_finished()
    }
}

/// Last exported video and the chain state it was rendered with
#[derive(Debug, Clone)]
struct CachedExport {
    video: PathBuf,
    revision: u64,
}

// ============================================================================
// Session controller
// ============================================================================

/// Orchestrates preview, filter switching, export and sharing for one video
pub struct SessionController<M: Muxer, D: Demuxer, V: ViewInput> {
    config: SessionConfig,
    chain: Arc<EffectChain>,
    devices: Arc<dyn OutputDeviceFactory>,
    /// None while a render owns it
    engine: Option<AudioGraphEngine>,
    renderer: OfflineRenderer,
    muxer: M,
    demuxer: D,
    view: V,
    video: Option<PathBuf>,
    source: Option<SourceAsset>,
    selected_filter: Option<VoiceFilter>,
    pending: Option<PendingRender>,
    cached: Option<CachedExport>,
}

impl<M: Muxer, D: Demuxer, V: ViewInput> SessionController<M, D, V> {
    /// Create a session with an idle engine and every stage bypassed
    pub fn new(
        config: SessionConfig,
        devices: Arc<dyn OutputDeviceFactory>,
        muxer: M,
        demuxer: D,
        view: V,
    ) -> Self {
        let chain = Arc::new(EffectChain::new());
        let engine = AudioGraphEngine::new(Arc::clone(&chain), Arc::clone(&devices))
            .with_live_block_frames(config.live_block_frames);
        Self {
            config,
            chain,
            devices,
            engine: Some(engine),
            renderer: OfflineRenderer::new(),
            muxer,
            demuxer,
            view,
            video: None,
            source: None,
            selected_filter: None,
            pending: None,
            cached: None,
        }
    }

    /// Render through a custom renderer (e.g. another output format)
    pub fn with_renderer(mut self, renderer: OfflineRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<EffectChain> {
        &self.chain
    }

    pub fn video(&self) -> Option<&Path> {
        self.video.as_deref()
    }

    pub fn source(&self) -> Option<&SourceAsset> {
        self.source.as_ref()
    }

    pub fn selected_filter(&self) -> Option<VoiceFilter> {
        self.selected_filter
    }

    /// Engine state, or None while a render owns the engine
    pub fn engine_state(&self) -> Option<EngineState> {
        self.engine.as_ref().map(|e| e.state())
    }

    /// Live playback position in frames
    pub fn frames_played(&self) -> u64 {
        self.engine.as_ref().map_or(0, |e| e.frames_played())
    }

    /// Edited video from the last export, if still valid
    pub fn cached_export(&self) -> Option<&Path> {
        self.cached
            .as_ref()
            .filter(|c| c.revision == self.chain.revision() && c.video.exists())
            .map(|c| c.video.as_path())
    }

    pub fn is_rendering(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_done())
    }

    /// Extract the audio of `video` and prepare live preview
    ///
    /// # Errors
    /// * `RenderAlreadyInProgress` - a render owns the engine
    /// * `DemuxError` - the audio track could not be extracted
    /// * `UnsupportedFormat` / `EngineStartFailure` - from `prepare_live`
    pub async fn select_video(&mut self, video: &Path) -> Result<()> {
        self.reclaim_engine(false)?;
        std::fs::create_dir_all(&self.config.work_dir)?;

        let source = self
            .demuxer
            .extract_audio(video, &self.config.extracted_audio_path())
            .await?;
        // A new video starts unfiltered
        self.chain.bypass_all();
        self.selected_filter = None;
        self.engine_mut()?.prepare_live(&source)?;

        info!("Selected video {}", video.display());
        self.video = Some(video.to_path_buf());
        self.source = Some(source);
        self.cached = None;
        self.view.video_ready_to_play();
        Ok(())
    }

    /// Switch to `filter`; selecting the current filter does nothing
    ///
    /// The chain is shared with the render thread, so filters cannot change
    /// while a render is in flight.
    ///
    /// # Errors
    /// * `RenderAlreadyInProgress` - a render is reading the chain
    /// * `InvalidParameter` - from the chain (not expected for built-in filters)
    pub fn apply_filter(&mut self, filter: VoiceFilter) -> Result<()> {
        self.reclaim_engine(false)?;
        let selected = match filter {
            VoiceFilter::Clear => None,
            other => Some(other),
        };
        if selected == self.selected_filter {
            debug!("Filter {} already selected", filter);
            return Ok(());
        }

        filter.apply(&self.chain)?;
        self.selected_filter = selected;
        self.cached = None;
        Ok(())
    }

    /// Start or resume live preview
    pub fn play(&mut self) -> Result<()> {
        self.engine_mut()?.start()
    }

    /// Pause live preview
    pub fn pause(&mut self) -> Result<()> {
        self.engine_mut()?.pause()
    }

    /// Render the altered audio on the `offline-render` thread
    ///
    /// # Errors
    /// * `RenderAlreadyInProgress` - another render is in flight
    /// * `NoVideoSelected` - no source audio to render
    /// * `EngineStartFailure` - the render thread could not be spawned
    pub fn begin_render(&mut self) -> Result<RenderHandle> {
        self.reclaim_engine(false)?;
        let source = self.source.clone().ok_or(VoiceFxError::NoVideoSelected)?;
        std::fs::create_dir_all(&self.config.work_dir)?;

        let mut engine = self.engine.take().ok_or_else(|| VoiceFxError::EngineFailure {
            reason: "engine unavailable".to_string(),
        })?;
        let job = RenderJob::new(source, self.config.rendered_audio_path())
            .with_block_capacity(self.config.block_capacity);
        let job_id = job.id;
        let cancel = CancelToken::new();
        let done = Arc::new(AtomicBool::new(false));
        let (tx, rx) = oneshot::channel();

        let renderer = self.renderer.clone();
        let thread_cancel = cancel.clone();
        let thread_done = Arc::clone(&done);
        let spawned = std::thread::Builder::new()
            .name("offline-render".to_string())
            .spawn(move || {
                let result = renderer.render(&mut engine, &job, &thread_cancel);
                thread_done.store(true, Ordering::Release);
                // The receiver may be gone; the result is then discarded
                let _ = tx.send(result);
                engine
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.engine = Some(self.rebuild_engine());
                return Err(VoiceFxError::EngineStartFailure {
                    reason: format!("cannot spawn render thread: {}", e),
                });
            }
        };

        info!("Render {} started", job_id);
        self.pending = Some(PendingRender {
            handle,
            cancel: cancel.clone(),
            done,
            revision: self.chain.revision(),
        });
        Ok(RenderHandle {
            job_id,
            receiver: rx,
            cancel,
        })
    }

    /// Edited video for sharing, producing it if the cache is stale
    ///
    /// # Errors
    /// * `NoVideoSelected` - nothing to export
    /// * Any render or mux error; nothing is cached then
    pub async fn share(&mut self) -> Result<PathBuf> {
        if let Some(video) = self.cached_export() {
            debug!("Sharing cached export {}", video.display());
            return Ok(video.to_path_buf());
        }
        let video = self.video.clone().ok_or(VoiceFxError::NoVideoSelected)?;

        self.view.loading_started(PROCESSING_MESSAGE);
        let result = self.render_and_mux(&video).await;
        self.view.loading_finished();

        let (merged, revision) = result?;
        if revision == self.chain.revision() {
            self.cached = Some(CachedExport {
                video: merged.clone(),
                revision,
            });
        } else {
            warn!("Chain changed during export; result not cached");
        }
        Ok(merged)
    }

    /// Share, then copy the edited video into the export directory
    ///
    /// # Errors
    /// * `InvalidParameter` - no export directory configured
    /// * Any error of [`SessionController::share`]
    pub async fn export_to_library(&mut self) -> Result<PathBuf> {
        let export_dir = self
            .config
            .export_dir
            .clone()
            .ok_or_else(|| VoiceFxError::InvalidParameter {
                param: "export_dir".to_string(),
                value: "unset".to_string(),
                expected: "a directory to export into".to_string(),
            })?;
        let edited = self.share().await?;

        std::fs::create_dir_all(&export_dir)?;
        let name = format!(
            "{}-{}",
            Utc::now().format("%Y%m%d-%H%M%S"),
            self.config.merged_video_name
        );
        let destination = export_dir.join(name);
        std::fs::copy(&edited, &destination)?;
        info!("Exported {}", destination.display());
        Ok(destination)
    }

    /// Drop the video, the filter and any cached export
    ///
    /// An in-flight render is cancelled and waited for.
    pub fn restart(&mut self) {
        if let Some(pending) = &self.pending {
            pending.cancel.cancel();
        }
        if let Err(e) = self.reclaim_engine(true) {
            warn!("Could not reclaim engine on restart: {}", e);
        }

        self.cached = None;
        self.video = None;
        self.source = None;
        self.selected_filter = None;
        self.chain.bypass_all();
        match self.engine.as_mut() {
            Some(engine) => engine.stop(),
            None => self.engine = Some(self.rebuild_engine()),
        }
        info!("Session restarted");
        self.view.restarted();
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn render_and_mux(&mut self, video: &Path) -> Result<(PathBuf, u64)> {
        let handle = self.begin_render()?;
        let revision = self.pending.as_ref().map_or(0, |p| p.revision);
        let rendered = handle.wait().await;
        self.reclaim_engine(true)?;
        let rendered = rendered?;

        let merged = self.config.merged_video_path();
        match self.muxer.mux(video, &rendered.path, &merged).await {
            Ok(asset) => Ok((asset.path, revision)),
            Err(e) => {
                if merged.exists() {
                    let _ = std::fs::remove_file(&merged);
                }
                Err(e)
            }
        }
    }

    fn engine_mut(&mut self) -> Result<&mut AudioGraphEngine> {
        self.reclaim_engine(false)?;
        self.engine.as_mut().ok_or_else(|| VoiceFxError::EngineFailure {
            reason: "engine unavailable".to_string(),
        })
    }

    /// Take the engine back from a finished render
    ///
    /// With `block` the render thread is joined even if still running.
    fn reclaim_engine(&mut self, block: bool) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        if !block && !pending.is_done() {
            self.pending = Some(pending);
            return Err(VoiceFxError::RenderAlreadyInProgress);
        }

        match pending.handle.join() {
            Ok(engine) => self.engine = Some(engine),
            Err(_) => {
                warn!("Render thread panicked; rebuilding engine");
                let mut engine = self.rebuild_engine();
                if let Some(source) = &self.source {
                    if let Err(e) = engine.prepare_live(source) {
                        warn!("Live preview not restored: {}", e);
                    }
                }
                self.engine = Some(engine);
            }
        }
        Ok(())
    }

    fn rebuild_engine(&self) -> AudioGraphEngine {
        AudioGraphEngine::new(Arc::clone(&self.chain), Arc::clone(&self.devices))
            .with_live_block_frames(self.config.live_block_frames)
    }
}

impl<M: Muxer, D: Demuxer, V: ViewInput> Drop for SessionController<M, D, V> {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            pending.cancel.cancel();
        }
    }
}

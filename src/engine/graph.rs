//! Audio graph engine
//!
//! Owns the processing graph (player node → effect chain → sink) in one of
//! two modes:
//!
//! - **Live**: a producer thread pulls fixed-size blocks through the graph
//!   and writes them to an [`OutputDevice`], which clocks it. The number of
//!   frames handed to the device is published for video sync.
//! - **Offline**: the caller pumps [`AudioGraphEngine::render_next_block`]
//!   as fast as it likes (manual rendering).
//!
//! Each graph build gets fresh DSP from [`EffectChain::build_processors`];
//! the chain's parameters are the only state shared across builds.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info, warn};

use crate::dsp::{EffectChain, ProcessorChain};
use crate::engine::buffer::{
    AudioBuffer, AudioFormat, MAX_BLOCK_CAPACITY, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE,
};
use crate::engine::io::{AssetInfo, FrameSource, SourceAsset};
use crate::engine::live::{OutputDevice, OutputDeviceFactory};
use crate::engine::state::{EngineState, RenderStatus};
use crate::error::{Result, VoiceFxError};

/// Frames per block pulled by the live producer
pub const DEFAULT_LIVE_BLOCK_FRAMES: usize = 512;

/// Back-off after a transient underrun in live mode
const UNDERRUN_BACKOFF: Duration = Duration::from_millis(2);

// ============================================================================
// Graph
// ============================================================================

/// Player node feeding the processor chain
struct RenderGraph {
    player: Box<dyn FrameSource>,
    processors: ProcessorChain,
    format: AudioFormat,
    total_frames: u64,
}

impl RenderGraph {
    fn build(player: Box<dyn FrameSource>, chain: &EffectChain, max_block: usize) -> Self {
        let format = player.format();
        let total_frames = player.total_frames();
        Self {
            processors: chain.build_processors(&format, max_block),
            player,
            format,
            total_frames,
        }
    }

    /// Pull up to `frames` frames from the player and process them in place
    fn pull(&mut self, block: &mut AudioBuffer, frames: usize) -> std::io::Result<usize> {
        let read = self.player.read_frames(block, frames)?;
        if read > 0 {
            self.processors.process(block, read);
        }
        Ok(read)
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Live graph plus its device; owned by the producer thread while running
struct LiveGraph {
    graph: RenderGraph,
    device: Box<dyn OutputDevice>,
    block: AudioBuffer,
    block_frames: usize,
}

impl LiveGraph {
    fn close(mut self) {
        self.device.close();
    }
}

struct LiveProducer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<LiveGraph>,
}

fn run_producer(
    mut live: LiveGraph,
    stop: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
) -> LiveGraph {
    let frames = live.block_frames;
    while !stop.load(Ordering::Acquire) {
        match live.graph.pull(&mut live.block, frames) {
            Ok(0) => {
                debug!("[ENGINE] Live source exhausted");
                break;
            }
            Ok(n) => {
                if let Err(e) = live.device.write(&live.block, n) {
                    warn!("[ENGINE] Output device failed: {}", e);
                    break;
                }
                frames_played.fetch_add(n as u64, Ordering::AcqRel);
            }
            Err(e) if is_transient(e.kind()) => std::thread::sleep(UNDERRUN_BACKOFF),
            Err(e) => {
                warn!("[ENGINE] Live source failed: {}", e);
                break;
            }
        }
    }
    live
}

/// Manual-rendering graph
struct OfflineGraph {
    graph: RenderGraph,
    capacity: usize,
    sample_time: u64,
}

// ============================================================================
// Engine
// ============================================================================

/// Audio graph engine with live and offline modes
pub struct AudioGraphEngine {
    chain: Arc<EffectChain>,
    devices: Arc<dyn OutputDeviceFactory>,
    live_block_frames: usize,
    state: EngineState,
    /// Source of the last live graph, rebuilt after an offline render
    live_source: Option<SourceAsset>,
    live: Option<LiveGraph>,
    producer: Option<LiveProducer>,
    offline: Option<OfflineGraph>,
    frames_played: Arc<AtomicU64>,
}

impl AudioGraphEngine {
    /// Create an idle engine rendering `chain`, playing live audio through
    /// devices from `devices`
    pub fn new(chain: Arc<EffectChain>, devices: Arc<dyn OutputDeviceFactory>) -> Self {
        Self {
            chain,
            devices,
            live_block_frames: DEFAULT_LIVE_BLOCK_FRAMES,
            state: EngineState::Idle,
            live_source: None,
            live: None,
            producer: None,
            offline: None,
            frames_played: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Set the live producer block size (applies from the next `prepare_live`)
    pub fn with_live_block_frames(mut self, frames: usize) -> Self {
        self.live_block_frames = frames.clamp(1, MAX_BLOCK_CAPACITY);
        self
    }

    /// Current state
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The chain whose parameters the graph renders with
    pub fn chain(&self) -> &Arc<EffectChain> {
        &self.chain
    }

    /// Frames handed to the live output device since `prepare_live`
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    /// Frames produced by the current offline render
    pub fn manual_rendering_sample_time(&self) -> u64 {
        self.offline.as_ref().map_or(0, |o| o.sample_time)
    }

    /// Format and length of the offline graph's source
    pub fn offline_info(&self) -> Option<AssetInfo> {
        self.offline.as_ref().map(|o| AssetInfo {
            format: o.graph.format,
            total_frames: o.graph.total_frames,
        })
    }

    /// Block capacity of the offline graph
    pub fn block_capacity(&self) -> Option<usize> {
        self.offline.as_ref().map(|o| o.capacity)
    }

    /// Source the live graph is (or will be rebuilt) from
    pub fn live_source(&self) -> Option<&SourceAsset> {
        self.live_source.as_ref()
    }

    // ------------------------------------------------------------------------
    // Live mode
    // ------------------------------------------------------------------------

    /// Build a live graph for `source`, replacing any existing graph
    ///
    /// # Errors
    /// * `UnsupportedFormat` - the source has no decodable audio
    /// * `EngineStartFailure` - no output device can play the source format
    pub fn prepare_live(&mut self, source: &SourceAsset) -> Result<()> {
        let player = open_source(source)?;
        self.release_graphs();

        let format = player.format();
        let block_frames = self.live_block_frames;
        let device = match self.devices.open(&format) {
            Ok(device) => device,
            Err(e) => {
                self.set_state(EngineState::Idle);
                return Err(e);
            }
        };

        self.live = Some(LiveGraph {
            graph: RenderGraph::build(player, &self.chain, block_frames),
            device,
            block: AudioBuffer::for_format(&format, block_frames),
            block_frames,
        });
        self.live_source = Some(source.clone());
        self.frames_played.store(0, Ordering::Release);
        info!(
            "[ENGINE] Live graph ready for {} ({}, {} device)",
            source,
            format,
            self.devices.name()
        );
        self.set_state(EngineState::LivePrepared);
        Ok(())
    }

    /// Start (or resume) live playback
    ///
    /// Calling `start` while already running does nothing.
    ///
    /// # Errors
    /// * `InvalidState` - no live graph is prepared
    /// * `EngineStartFailure` - the producer thread could not be spawned
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            EngineState::LiveRunning => {
                debug!("[ENGINE] Already running");
                Ok(())
            }
            EngineState::LivePrepared => {
                let live = self.live.take().ok_or_else(|| self.invalid_state("start"))?;
                let stop = Arc::new(AtomicBool::new(false));
                let thread_stop = Arc::clone(&stop);
                let frames_played = Arc::clone(&self.frames_played);

                // The closure owns the graph, so a failed spawn drops it
                let handle = std::thread::Builder::new()
                    .name("live-producer".to_string())
                    .spawn(move || run_producer(live, thread_stop, frames_played))
                    .map_err(|e| {
                        self.set_state(EngineState::Idle);
                        VoiceFxError::EngineStartFailure {
                            reason: format!("cannot spawn live producer: {}", e),
                        }
                    })?;

                self.producer = Some(LiveProducer { stop, handle });
                self.set_state(EngineState::LiveRunning);
                Ok(())
            }
            _ => Err(self.invalid_state("start")),
        }
    }

    /// Pause live playback, keeping the graph so `start` resumes in place
    ///
    /// # Errors
    /// * `InvalidState` - no live graph is prepared
    /// * `EngineFailure` - the producer thread panicked
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            EngineState::LivePrepared => {
                debug!("[ENGINE] Already paused");
                Ok(())
            }
            EngineState::LiveRunning => {
                match self.join_producer() {
                    Some(live) => {
                        self.live = Some(live);
                        self.set_state(EngineState::LivePrepared);
                        Ok(())
                    }
                    None => {
                        self.set_state(EngineState::Idle);
                        Err(VoiceFxError::EngineFailure {
                            reason: "live producer panicked".to_string(),
                        })
                    }
                }
            }
            _ => Err(self.invalid_state("pause")),
        }
    }

    /// Stop everything and release all graphs
    ///
    /// Always succeeds. The remembered live source is forgotten, so a later
    /// `finish_offline` leaves the engine idle.
    pub fn stop(&mut self) {
        self.release_graphs();
        self.offline = None;
        self.live_source = None;
        self.frames_played.store(0, Ordering::Release);
        self.set_state(EngineState::Idle);
    }

    // ------------------------------------------------------------------------
    // Offline mode
    // ------------------------------------------------------------------------

    /// Build a manual-rendering graph for `source`
    ///
    /// Any live graph is stopped and released first.
    ///
    /// # Errors
    /// * `UnsupportedFormat` - the source has no decodable audio
    /// * `EngineStartFailure` - manual rendering is not possible for this
    ///   block capacity or sample rate
    pub fn prepare_offline(&mut self, source: &SourceAsset, block_capacity: usize) -> Result<()> {
        self.release_graphs();
        self.set_state(EngineState::Idle);
        let player = open_source(source)?;
        self.prepare_offline_with(player, block_capacity)
    }

    /// Build a manual-rendering graph over an already opened source
    ///
    /// # Errors
    /// * `EngineStartFailure` - manual rendering is not possible for this
    ///   block capacity or sample rate
    pub fn prepare_offline_with(
        &mut self,
        player: Box<dyn FrameSource>,
        block_capacity: usize,
    ) -> Result<()> {
        self.release_graphs();
        self.set_state(EngineState::Idle);

        if block_capacity == 0 || block_capacity > MAX_BLOCK_CAPACITY {
            return Err(VoiceFxError::EngineStartFailure {
                reason: format!(
                    "block capacity {} outside 1..={}",
                    block_capacity, MAX_BLOCK_CAPACITY
                ),
            });
        }
        let format = player.format();
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&format.sample_rate) {
            return Err(VoiceFxError::EngineStartFailure {
                reason: format!(
                    "manual rendering not supported at {} Hz",
                    format.sample_rate
                ),
            });
        }

        let graph = RenderGraph::build(player, &self.chain, block_capacity);
        info!(
            "[ENGINE] Offline graph ready: {}, {} frames, capacity {}",
            format, graph.total_frames, block_capacity
        );
        self.offline = Some(OfflineGraph {
            graph,
            capacity: block_capacity,
            sample_time: 0,
        });
        self.set_state(EngineState::OfflinePrepared);
        Ok(())
    }

    /// Start the player of the prepared offline graph
    ///
    /// # Errors
    /// * `EngineStartFailure` - no offline graph is prepared
    pub fn start_offline(&mut self) -> Result<()> {
        match self.state {
            EngineState::OfflinePrepared => {
                self.set_state(EngineState::OfflineRunning);
                Ok(())
            }
            EngineState::OfflineRunning => Ok(()),
            state => Err(VoiceFxError::EngineStartFailure {
                reason: format!("cannot start manual rendering from {}", state),
            }),
        }
    }

    /// Render the next block into the start of `buffer`
    ///
    /// Renders `min(frames, capacity, remaining)` frames. A transient
    /// underrun consumes nothing and may be retried.
    ///
    /// # Errors
    /// * `InvalidState` - not in `OfflineRunning`
    /// * `InvalidParameter` - `frames` is 0 or `buffer` does not match the
    ///   graph's channel layout
    pub fn render_next_block(
        &mut self,
        buffer: &mut AudioBuffer,
        frames: usize,
    ) -> Result<RenderStatus> {
        if self.state != EngineState::OfflineRunning {
            return Err(self.invalid_state("render_next_block"));
        }
        let offline = self
            .offline
            .as_mut()
            .ok_or_else(|| VoiceFxError::EngineFailure {
                reason: "offline graph missing while running".to_string(),
            })?;

        if frames == 0 || buffer.channels() != offline.graph.format.channels() {
            return Err(VoiceFxError::InvalidParameter {
                param: "render buffer".to_string(),
                value: format!("{} frames x {} channels", frames, buffer.channels()),
                expected: format!(
                    "at least 1 frame x {} channels",
                    offline.graph.format.channels()
                ),
            });
        }

        let remaining = offline.graph.total_frames.saturating_sub(offline.sample_time);
        if remaining == 0 {
            return Ok(RenderStatus::EndOfSource);
        }
        let wanted = frames
            .min(offline.capacity)
            .min(buffer.len())
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));

        match offline.graph.pull(buffer, wanted) {
            Ok(0) => Ok(RenderStatus::EndOfSource),
            Ok(n) => {
                offline.sample_time += n as u64;
                Ok(RenderStatus::Rendered(n))
            }
            Err(e) if is_transient(e.kind()) => {
                debug!("[ENGINE] Transient underrun at {}", offline.sample_time);
                Ok(RenderStatus::TransientUnderrun)
            }
            Err(e) => Ok(RenderStatus::Fatal(e.to_string())),
        }
    }

    /// Release the offline graph and go back to live preview if possible
    ///
    /// # Errors
    /// Errors from rebuilding the live graph; the engine is then idle.
    pub fn finish_offline(&mut self) -> Result<()> {
        if let Some(offline) = self.offline.take() {
            debug!(
                "[ENGINE] Offline graph released at sample time {}",
                offline.sample_time
            );
        }
        self.set_state(EngineState::Idle);

        match self.live_source.clone() {
            Some(source) => self.prepare_live(&source).inspect_err(|e| {
                warn!("[ENGINE] Could not rebuild live graph: {}", e);
            }),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            debug!("[ENGINE] {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn invalid_state(&self, operation: &str) -> VoiceFxError {
        VoiceFxError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }

    /// Stop the producer and hand back its graph; None if it panicked
    fn join_producer(&mut self) -> Option<LiveGraph> {
        let producer = self.producer.take()?;
        producer.stop.store(true, Ordering::Release);
        match producer.handle.join() {
            Ok(live) => Some(live),
            Err(_) => {
                warn!("[ENGINE] Live producer panicked");
                None
            }
        }
    }

    /// Tear down live and offline graphs, keeping the live source
    fn release_graphs(&mut self) {
        if let Some(live) = self.join_producer() {
            live.close();
        }
        if let Some(live) = self.live.take() {
            live.close();
        }
        self.offline = None;
    }
}

impl Drop for AudioGraphEngine {
    fn drop(&mut self) {
        self.release_graphs();
    }
}

impl std::fmt::Debug for AudioGraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioGraphEngine")
            .field("state", &self.state)
            .field("live_source", &self.live_source)
            .field("frames_played", &self.frames_played())
            .field("sample_time", &self.manual_rendering_sample_time())
            .finish()
    }
}

/// Open a source, reporting a missing file as an undecodable asset
fn open_source(source: &SourceAsset) -> Result<Box<dyn FrameSource>> {
    source.open().map_err(|e| match e {
        VoiceFxError::FileNotFound { path, .. } => VoiceFxError::UnsupportedFormat {
            format: format!("{}: no such file", path),
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::StageKind;
    use crate::engine::buffer::ChannelLayout;
    use crate::engine::io::generate_test_tone;
    use crate::engine::live::{CaptureDevice, ClockedNullDevice};
    use pretty_assertions::assert_eq;

    fn tone_source(secs: f32) -> SourceAsset {
        SourceAsset::memory(generate_test_tone(440.0, secs, 44100))
    }

    fn engine_with(devices: Arc<dyn OutputDeviceFactory>) -> AudioGraphEngine {
        AudioGraphEngine::new(Arc::new(EffectChain::new()), devices)
    }

    /// Source that reports one transient underrun before every real read
    struct StutteringSource {
        inner: Box<dyn FrameSource>,
        stutter: bool,
    }

    impl FrameSource for StutteringSource {
        fn format(&self) -> AudioFormat {
            self.inner.format()
        }

        fn total_frames(&self) -> u64 {
            self.inner.total_frames()
        }

        fn read_frames(&mut self, out: &mut AudioBuffer, frames: usize) -> std::io::Result<usize> {
            self.stutter = !self.stutter;
            if self.stutter {
                return Err(std::io::Error::new(ErrorKind::WouldBlock, "not yet"));
            }
            self.inner.read_frames(out, frames)
        }
    }

    // ------------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------------

    #[test]
    fn test_new_engine_is_idle() {
        let engine = engine_with(Arc::new(ClockedNullDevice));
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.frames_played(), 0);
        assert_eq!(engine.manual_rendering_sample_time(), 0);
    }

    #[test]
    fn test_start_requires_live_graph() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let err = engine.start().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert!(engine.pause().is_err());
    }

    #[test]
    fn test_prepare_live_rejects_missing_file() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let err = engine
            .prepare_live(&SourceAsset::file("/definitely/not/here.wav"))
            .unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_live_start_pause_resume() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_live(&tone_source(5.0)).unwrap();
        assert_eq!(engine.state(), EngineState::LivePrepared);

        engine.start().unwrap();
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::LiveRunning);
        std::thread::sleep(Duration::from_millis(60));

        engine.pause().unwrap();
        assert_eq!(engine.state(), EngineState::LivePrepared);
        let paused_at = engine.frames_played();
        assert!(paused_at > 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(engine.frames_played(), paused_at);

        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(40));
        engine.stop();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(engine.frames_played(), 0);
    }

    #[test]
    fn test_live_playback_reaches_device() {
        let capture = CaptureDevice::new();
        let mut engine = engine_with(Arc::new(capture.clone()));
        engine.prepare_live(&tone_source(0.5)).unwrap();
        engine.start().unwrap();

        // The capture device is unclocked, so the source drains quickly
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.frames_played() < 22050 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        engine.pause().unwrap();

        assert_eq!(engine.frames_played(), 22050);
        assert_eq!(capture.captured_frames(), 22050);
    }

    #[test]
    fn test_prepare_offline_stops_live() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let source = tone_source(2.0);
        engine.prepare_live(&source).unwrap();
        engine.start().unwrap();

        engine.prepare_offline(&source, 4096).unwrap();
        assert_eq!(engine.state(), EngineState::OfflinePrepared);
        assert!(engine.start().is_err());

        engine.finish_offline().unwrap();
        assert_eq!(engine.state(), EngineState::LivePrepared);
    }

    #[test]
    fn test_finish_offline_without_live_source_is_idle() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_offline(&tone_source(0.1), 1024).unwrap();
        engine.finish_offline().unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_prepare_offline_rejects_bad_capacity() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        for capacity in [0, MAX_BLOCK_CAPACITY + 1] {
            let err = engine
                .prepare_offline(&tone_source(0.1), capacity)
                .unwrap_err();
            assert_eq!(err.error_code(), "ENGINE_START_FAILURE");
        }
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_prepare_offline_rejects_low_sample_rate() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let tone = generate_test_tone(100.0, 0.5, 4000);
        let err = engine
            .prepare_offline(&SourceAsset::memory(tone), 1024)
            .unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_START_FAILURE");
    }

    #[test]
    fn test_start_offline_requires_prepare() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let err = engine.start_offline().unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_START_FAILURE");
    }

    // ------------------------------------------------------------------------
    // Manual rendering
    // ------------------------------------------------------------------------

    #[test]
    fn test_render_blocks_until_end_of_source() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_offline(&tone_source(0.25), 4096).unwrap();
        engine.start_offline().unwrap();

        let mut block = AudioBuffer::new(4096, ChannelLayout::Mono, 44100);
        let mut counts = Vec::new();
        loop {
            match engine.render_next_block(&mut block, 4096).unwrap() {
                RenderStatus::Rendered(n) => counts.push(n),
                RenderStatus::EndOfSource => break,
                other => panic!("unexpected {other}"),
            }
        }

        // 11025 frames = 2 * 4096 + 2833
        assert_eq!(counts, vec![4096, 4096, 2833]);
        assert_eq!(engine.manual_rendering_sample_time(), 11025);
    }

    #[test]
    fn test_render_request_is_clamped_to_capacity() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_offline(&tone_source(0.25), 1000).unwrap();
        engine.start_offline().unwrap();

        let mut block = AudioBuffer::new(4096, ChannelLayout::Mono, 44100);
        assert_eq!(
            engine.render_next_block(&mut block, 4096).unwrap(),
            RenderStatus::Rendered(1000)
        );
    }

    #[test]
    fn test_render_requires_running_state() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_offline(&tone_source(0.1), 1024).unwrap();
        let mut block = AudioBuffer::new(1024, ChannelLayout::Mono, 44100);
        let err = engine.render_next_block(&mut block, 1024).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_render_rejects_mismatched_buffer() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        engine.prepare_offline(&tone_source(0.1), 1024).unwrap();
        engine.start_offline().unwrap();
        let mut stereo = AudioBuffer::new(1024, ChannelLayout::Stereo, 44100);
        assert!(engine.render_next_block(&mut stereo, 1024).is_err());
    }

    #[test]
    fn test_transient_underrun_consumes_nothing() {
        let mut engine = engine_with(Arc::new(ClockedNullDevice));
        let inner = tone_source(0.1).open().unwrap();
        engine
            .prepare_offline_with(
                Box::new(StutteringSource {
                    inner,
                    stutter: false,
                }),
                1024,
            )
            .unwrap();
        engine.start_offline().unwrap();

        let mut block = AudioBuffer::new(1024, ChannelLayout::Mono, 44100);
        assert_eq!(
            engine.render_next_block(&mut block, 1024).unwrap(),
            RenderStatus::TransientUnderrun
        );
        assert_eq!(engine.manual_rendering_sample_time(), 0);
        assert_eq!(
            engine.render_next_block(&mut block, 1024).unwrap(),
            RenderStatus::Rendered(1024)
        );
    }

    #[test]
    fn test_parameter_change_while_live() {
        let capture = CaptureDevice::new();
        let mut engine = engine_with(Arc::new(capture.clone()));
        engine.prepare_live(&tone_source(0.2)).unwrap();
        engine.start().unwrap();
        engine
            .chain()
            .set_parameter(StageKind::PitchShift, 700.0)
            .unwrap();
        engine.pause().unwrap();
        engine.stop();
        assert_eq!(engine.state(), EngineState::Idle);
    }
}

//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::info;

use crate::config::SessionConfig;
use crate::dsp::{DistortionPreset, EffectChain, ReverbPreset};
use crate::engine::io::read_wav;
use crate::engine::{
    calculate_peak, calculate_rms, default_device, AudioGraphEngine, ClockedNullDevice,
    SourceAsset,
};
use crate::error::VoiceFxError;
use crate::filter::VoiceFilter;
use crate::media::{FfmpegDemuxer, FfmpegMuxer};
use crate::render::{CancelToken, OfflineRenderer, RenderJob};
use crate::session::{LogView, SessionController};

/// Load the config file if given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

/// Recovery hints for a failed command
///
/// Uses the first `VoiceFxError` in the error chain; other errors get none.
pub fn failure_hints(err: &anyhow::Error) -> Vec<String> {
    let Some(error) = err.chain().find_map(|e| e.downcast_ref::<VoiceFxError>()) else {
        return Vec::new();
    };

    let mut hints: Vec<String> = error
        .recovery_suggestions()
        .into_iter()
        .map(str::to_string)
        .collect();
    if error.is_recoverable() {
        hints.push("Retrying the same command may succeed".to_string());
    }
    hints
}

/// List filters and presets.
pub fn list_filters() -> Result<()> {
    println!("Filters:");
    for filter in VoiceFilter::ALL {
        println!("  {:<12} {}", filter.to_string(), filter.description());
    }

    println!();
    println!("Distortion presets:");
    for preset in DistortionPreset::ALL {
        println!("  {}", preset.display_name());
    }
    println!("Reverb presets:");
    for preset in ReverbPreset::ALL {
        println!("  {}", preset.display_name());
    }
    Ok(())
}

/// Render a WAV file offline through `filter`.
pub fn render(
    config: &SessionConfig,
    input: &Path,
    output: &Path,
    filter: VoiceFilter,
    block_capacity: Option<usize>,
    json: bool,
) -> Result<()> {
    info!("Rendering {} with {}", input.display(), filter);

    let chain = Arc::new(EffectChain::new());
    filter.apply(&chain)?;
    let mut engine = AudioGraphEngine::new(chain, Arc::new(ClockedNullDevice));

    let job = RenderJob::new(SourceAsset::file(input), output)
        .with_block_capacity(block_capacity.unwrap_or(config.block_capacity));
    let started = Instant::now();
    let asset = OfflineRenderer::new()
        .render(&mut engine, &job, &CancelToken::new())
        .with_context(|| format!("rendering {}", input.display()))?;
    let elapsed = started.elapsed().as_secs_f64();

    if json {
        println!("{}", serde_json::to_string_pretty(&asset)?);
    } else {
        println!("Rendered: {}", asset.path.display());
        println!("Format: {}", asset.format);
        println!(
            "Frames: {} ({:.2}s) in {} blocks",
            asset.total_frames,
            asset.duration_secs(),
            asset.block_frames.len()
        );
        if elapsed > 0.0 {
            println!("Speed: {:.1}x real time", asset.duration_secs() / elapsed);
        }
        let (rendered, _) = read_wav(&asset.path)?;
        println!(
            "Levels: peak {:.1} dBFS, RMS {:.1} dBFS",
            calculate_peak(&rendered),
            calculate_rms(&rendered)
        );
        println!("SHA-256: {}", asset.checksum_sha256);
    }
    Ok(())
}

/// Play a WAV file live through `filter`.
pub fn preview(config: &SessionConfig, input: &Path, filter: VoiceFilter, seconds: f64) -> Result<()> {
    let chain = Arc::new(EffectChain::new());
    filter.apply(&chain)?;
    let mut engine = AudioGraphEngine::new(chain, default_device())
        .with_live_block_frames(config.live_block_frames);

    let source = SourceAsset::file(input);
    let info = source
        .probe()
        .with_context(|| format!("opening {}", input.display()))?;
    engine.prepare_live(&source)?;
    engine.start()?;
    println!(
        "Playing {} ({}, {:.2}s) with {}",
        input.display(),
        info.format,
        info.duration_secs(),
        filter
    );

    let limit = Duration::from_secs_f64(seconds.max(0.0).min(info.duration_secs()));
    let started = Instant::now();
    while started.elapsed() < limit {
        std::thread::sleep(Duration::from_millis(250));
        let position = info.format.frames_to_secs(engine.frames_played());
        info!("Position {:.2}s", position);
    }

    engine.stop();
    println!("Stopped");
    Ok(())
}

/// Full pipeline: extract audio, apply `filter`, render and re-mux.
pub async fn process(
    mut config: SessionConfig,
    video: &Path,
    filter: VoiceFilter,
    export_dir: Option<PathBuf>,
    work_dir: Option<PathBuf>,
) -> Result<()> {
    if let Some(dir) = export_dir {
        config.export_dir = Some(dir);
    }
    if let Some(dir) = work_dir {
        config.work_dir = dir;
    }
    config.validate()?;

    let exporting = config.export_dir.is_some();
    let muxer = FfmpegMuxer::new(&config.ffmpeg_path);
    let demuxer = FfmpegDemuxer::new(&config.ffmpeg_path);
    let mut session = SessionController::new(config, default_device(), muxer, demuxer, LogView);

    session
        .select_video(video)
        .await
        .with_context(|| format!("selecting {}", video.display()))?;
    session.apply_filter(filter)?;

    let result = if exporting {
        session.export_to_library().await
    } else {
        session.share().await
    };
    let edited = result.context("producing edited video")?;

    println!("Edited video: {}", edited.display());
    Ok(())
}

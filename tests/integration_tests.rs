//! Integration Tests
//!
//! End-to-end tests for the offline rendering pipeline.

mod common;

use std::fs;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use common::{write_tone, FaultyOutput};
use voicefx::dsp::{DistortionPreset, EffectChain, Preset, StageKind};
use voicefx::engine::io::read_wav;
use voicefx::engine::{
    calculate_rms, AudioGraphEngine, ChannelLayout, ClockedNullDevice, EngineState, SourceAsset,
};
use voicefx::render::checksum_file;
use voicefx::{CancelToken, OfflineRenderer, RenderJob, VoiceFilter};

fn engine_with(chain: Arc<EffectChain>) -> AudioGraphEngine {
    AudioGraphEngine::new(chain, Arc::new(ClockedNullDevice))
}

/// Amplitude of the `freq` component of a signal (single DFT bin)
fn tone_level(samples: &[f32], freq: f64, sample_rate: u32) -> f64 {
    let step = 2.0 * std::f64::consts::PI * freq / sample_rate as f64;
    let (re, im) = samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (i, &s)| {
            let angle = step * i as f64;
            (re + s as f64 * angle.cos(), im + s as f64 * angle.sin())
        });
    2.0 * re.hypot(im) / samples.len() as f64
}

// === Block Sequence Tests ===

#[test]
fn test_ten_second_render_block_sequence() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "ten.wav", 10.0, ChannelLayout::Mono);
    let out = dir.path().join("altered_audio.wav");

    let mut engine = engine_with(Arc::new(EffectChain::new()));
    let job = RenderJob::new(SourceAsset::file(&src), &out).with_block_capacity(4096);
    let asset = OfflineRenderer::new()
        .render(&mut engine, &job, &CancelToken::new())
        .unwrap();

    assert_eq!(asset.total_frames, 441_000);
    assert_eq!(asset.block_frames.len(), 108);
    assert!(asset.block_frames[..107].iter().all(|&n| n == 4096));
    assert_eq!(asset.block_frames[107], 441_000 - 107 * 4096);

    let (rendered, _) = read_wav(&out).unwrap();
    assert_eq!(rendered.len(), 441_000);
}

#[test]
fn test_rendered_blocks_are_within_capacity() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 1.3, ChannelLayout::Stereo);

    for capacity in [1, 333, 4096, 65536] {
        let out = dir.path().join(format!("out_{capacity}.wav"));
        let job = RenderJob::new(SourceAsset::file(&src), &out).with_block_capacity(capacity);
        let asset = OfflineRenderer::new()
            .render(
                &mut engine_with(Arc::new(EffectChain::new())),
                &job,
                &CancelToken::new(),
            )
            .unwrap();

        assert!(asset.block_frames.iter().all(|&n| n >= 1 && n <= capacity));
        assert_eq!(asset.block_frames.iter().sum::<usize>() as u64, asset.total_frames);
        assert_eq!(asset.total_frames, 57_330);
    }
}

// === Identity and Determinism Tests ===

#[test]
fn test_bypassed_render_is_identity() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 2.0, ChannelLayout::Stereo);
    let out = dir.path().join("out.wav");

    let asset = OfflineRenderer::new()
        .render(
            &mut engine_with(Arc::new(EffectChain::new())),
            &RenderJob::new(SourceAsset::file(&src), &out),
            &CancelToken::new(),
        )
        .unwrap();

    let (original, original_format) = read_wav(&src).unwrap();
    let (rendered, rendered_format) = read_wav(&out).unwrap();
    assert_eq!(rendered_format, original_format);
    assert_eq!(rendered, original);
    assert_eq!(asset.checksum_sha256, checksum_file(&src).unwrap());
}

#[test]
fn test_render_is_deterministic() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 1.5, ChannelLayout::Mono);

    let chain = Arc::new(EffectChain::new());
    VoiceFilter::Cave.apply(&chain).unwrap();

    let mut renders = Vec::new();
    for name in ["a.wav", "b.wav"] {
        let out = dir.path().join(name);
        let asset = OfflineRenderer::new()
            .render(
                &mut engine_with(Arc::clone(&chain)),
                &RenderJob::new(SourceAsset::file(&src), &out),
                &CancelToken::new(),
            )
            .unwrap();
        renders.push(asset);
    }

    assert_eq!(renders[0].block_frames, renders[1].block_frames);
    assert_eq!(renders[0].checksum_sha256, renders[1].checksum_sha256);
    assert_ne!(renders[0].checksum_sha256, checksum_file(&src).unwrap());
}

#[test]
fn test_each_filter_alters_audio() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 0.5, ChannelLayout::Mono);
    let original = checksum_file(&src).unwrap();

    for filter in [
        VoiceFilter::DarthVader,
        VoiceFilter::Alien,
        VoiceFilter::Helium,
        VoiceFilter::Cave,
    ] {
        let chain = Arc::new(EffectChain::new());
        filter.apply(&chain).unwrap();
        let out = dir.path().join(format!("{filter}.wav"));
        let asset = OfflineRenderer::new()
            .render(
                &mut engine_with(chain),
                &RenderJob::new(SourceAsset::file(&src), &out),
                &CancelToken::new(),
            )
            .unwrap();
        assert_ne!(asset.checksum_sha256, original, "{filter} left audio untouched");
        assert_eq!(asset.total_frames, 22_050);
    }
}

// === Filter Switching Tests ===

#[test]
fn test_helium_clear_alien_leaves_only_distortion() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 1.0, ChannelLayout::Mono);

    let chain = Arc::new(EffectChain::new());
    VoiceFilter::Helium.apply(&chain).unwrap();
    VoiceFilter::Clear.apply(&chain).unwrap();
    assert!(chain.active_stages().is_empty());

    VoiceFilter::Alien.apply(&chain).unwrap();
    assert_eq!(chain.active_stages(), vec![StageKind::Distortion]);
    assert_eq!(
        chain.preset(StageKind::Distortion),
        Some(Preset::Distortion(DistortionPreset::CosmicInterference))
    );
    assert_eq!(chain.parameter(StageKind::PitchShift), 0.0);

    let out = dir.path().join("alien.wav");
    let asset = OfflineRenderer::new()
        .render(
            &mut engine_with(Arc::clone(&chain)),
            &RenderJob::new(SourceAsset::file(&src), &out),
            &CancelToken::new(),
        )
        .unwrap();
    assert_ne!(asset.checksum_sha256, checksum_file(&src).unwrap());

    let (original, _) = read_wav(&src).unwrap();
    let (rendered, _) = read_wav(&out).unwrap();
    assert_eq!(rendered.len(), original.len());

    // No leftover pitch shift: 220 Hz is still there, Helium's 392 Hz is not
    let fundamental = tone_level(rendered.channel(0), 220.0, 44100);
    let helium = tone_level(rendered.channel(0), 220.0 * 2f64.powf(1000.0 / 1200.0), 44100);
    assert!(fundamental > 0.2, "220 Hz level {fundamental}");
    assert!(helium < 0.01, "392 Hz level {helium}");

    // Ring modulation reshapes the waveform and its level
    let max_diff = original
        .channel(0)
        .iter()
        .zip(rendered.channel(0))
        .map(|(a, b)| (a - b).abs())
        .fold(0.0_f32, f32::max);
    assert!(max_diff > 0.05, "max sample difference {max_diff}");
    let level_change = (calculate_rms(&rendered) - calculate_rms(&original)).abs();
    assert!(level_change > 0.5, "rms changed by {level_change} dB");
}

#[test]
fn test_any_filter_sequence_leaves_at_most_one_stage() {
    let chain = EffectChain::new();
    let sequence = [
        VoiceFilter::Cave,
        VoiceFilter::DarthVader,
        VoiceFilter::Alien,
        VoiceFilter::Clear,
        VoiceFilter::Helium,
        VoiceFilter::Cave,
    ];
    for filter in sequence {
        filter.apply(&chain).unwrap();
        assert!(chain.active_stages().len() <= 1);
    }
}

// === Failure Tests ===

#[test]
fn test_write_failure_at_block_50() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "ten.wav", 10.0, ChannelLayout::Mono);
    let out = dir.path().join("altered_audio.wav");

    let chain = Arc::new(EffectChain::new());
    let mut engine = engine_with(Arc::clone(&chain));
    engine.prepare_live(&SourceAsset::file(&src)).unwrap();

    let output = FaultyOutput::failing_at(50);
    let written = Arc::clone(&output.blocks_written);
    let renderer = OfflineRenderer::with_output_factory(Arc::new(output));
    let err = renderer
        .render(
            &mut engine,
            &RenderJob::new(SourceAsset::file(&src), &out),
            &CancelToken::new(),
        )
        .unwrap_err();

    assert_eq!(err.error_code(), "WRITE_FAILURE");
    assert_eq!(written.load(std::sync::atomic::Ordering::SeqCst), 50);
    assert!(!out.exists());
    // Live preview is restored after the failure
    assert_eq!(engine.state(), EngineState::LivePrepared);
}

#[test]
fn test_missing_source_is_unsupported() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("out.wav");
    let err = OfflineRenderer::new()
        .render(
            &mut engine_with(Arc::new(EffectChain::new())),
            &RenderJob::new(SourceAsset::file(dir.path().join("gone.wav")), &out),
            &CancelToken::new(),
        )
        .unwrap_err();
    assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    assert!(!out.exists());
}

#[test]
fn test_truncated_source_is_incomplete_render() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "cut.wav", 1.0, ChannelLayout::Mono);
    let len = fs::metadata(&src).unwrap().len();
    fs::OpenOptions::new()
        .write(true)
        .open(&src)
        .unwrap()
        .set_len(len - 10_001)
        .unwrap();
    let out = dir.path().join("out.wav");

    let mut engine = engine_with(Arc::new(EffectChain::new()));
    let err = OfflineRenderer::new()
        .render(
            &mut engine,
            &RenderJob::new(SourceAsset::file(&src), &out),
            &CancelToken::new(),
        )
        .unwrap_err();

    assert_eq!(err.error_code(), "RENDER_INCOMPLETE");
    assert!(!out.exists());
    assert_eq!(engine.state(), EngineState::Idle);
}

// === Live / Offline Interaction Tests ===

#[test]
fn test_render_during_live_playback() {
    let dir = tempdir().unwrap();
    let src = write_tone(dir.path(), "src.wav", 3.0, ChannelLayout::Stereo);
    let out = dir.path().join("out.wav");

    let chain = Arc::new(EffectChain::new());
    let mut engine = engine_with(Arc::clone(&chain));
    engine.prepare_live(&SourceAsset::file(&src)).unwrap();
    engine.start().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(30));
    assert_eq!(engine.state(), EngineState::LiveRunning);

    VoiceFilter::DarthVader.apply(&chain).unwrap();
    let asset = OfflineRenderer::new()
        .render(
            &mut engine,
            &RenderJob::new(SourceAsset::file(&src), &out),
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(asset.total_frames, 132_300);
    assert_eq!(engine.state(), EngineState::LivePrepared);
    assert_eq!(engine.frames_played(), 0);
    assert!(fs::metadata(&out).unwrap().len() > 0);
}

//! End-to-end coordinator tests driven by in-memory collaborators

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

use acap_core::audio::io::{read_audio, write_wav};
use acap_core::config::{StemBand, TranscriptionConfig};
use acap_core::services::{StemSeparator, Transcriber, VoicePitchShifter, VoiceSynthesizer};
use acap_core::synth::SynthBatch;
use acap_core::{
    AcappellaError, Acappellifier, AudioBuffer, Collaborators, Config, NoteEvent, NoteTrack,
    PipelineProgress, Result,
};
use tempfile::TempDir;

const RATE: u32 = 8000;

fn tone(duration_secs: f64, freq: f32) -> AudioBuffer {
    let frames = (duration_secs * RATE as f64).round() as usize;
    let samples = (0..frames)
        .map(|i| 0.3 * (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin())
        .collect();
    AudioBuffer::new(samples, RATE, 1)
}

/// Writes vocals, other and bass as scaled copies of the input
struct FakeSeparator {
    calls: AtomicUsize,
    fail_first: usize,
    stems: Vec<&'static str>,
    cancel_on_call: Option<Arc<AtomicBool>>,
}

impl FakeSeparator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: 0,
            stems: vec!["vocals", "other", "bass"],
            cancel_on_call: None,
        }
    }
}

impl StemSeparator for FakeSeparator {
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(flag) = &self.cancel_on_call {
            flag.store(true, Ordering::SeqCst);
        }
        if call < self.fail_first {
            return Err(AcappellaError::ExternalProcess {
                command: String::from("fake-separator"),
                status: Some(1),
                stderr: String::from("out of memory"),
            });
        }

        let audio = read_audio(input)?;
        let mut stems = BTreeMap::new();
        for (i, name) in self.stems.iter().enumerate() {
            let path = output_dir.join(format!("{}.wav", name));
            write_wav(&audio.with_gain_db(-3.0 * i as f32), &path)?;
            stems.insert(name.to_string(), path);
        }
        Ok(stems)
    }

    fn name(&self) -> &'static str {
        "fake-separator"
    }
}

/// A two-note chord in octave 4 plus a high note for "other", a short
/// bass figure in octave 2
struct FakeTranscriber;

impl Transcriber for FakeTranscriber {
    fn transcribe(&self, input: &Path, _config: &TranscriptionConfig) -> Result<NoteTrack> {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned());
        let events = match stem.as_deref() {
            Some("bass") => vec![
                NoteEvent::tone(36, 0.1, 0.5)?,
                NoteEvent::tone(43, 0.9, 1.3)?,
            ],
            _ => vec![
                NoteEvent::tone(64, 0.0, 0.8)?,
                NoteEvent::tone(67, 0.2, 0.6)?,
                NoteEvent::tone(76, 1.0, 1.4)?,
            ],
        };
        NoteTrack::new(events)
    }

    fn name(&self) -> &'static str {
        "fake-transcriber"
    }
}

/// Sings every batch as a sine exactly as long as the batch
struct FakeSynthesizer;

impl VoiceSynthesizer for FakeSynthesizer {
    fn synthesize(&self, batch: &SynthBatch) -> Result<AudioBuffer> {
        Ok(tone(batch.duration(), 220.0))
    }

    fn name(&self) -> &'static str {
        "fake-synthesizer"
    }
}

struct PassThroughShifter;

impl VoicePitchShifter for PassThroughShifter {
    fn shift(&self, audio: &AudioBuffer, _speaker: &str, _semitones: i32) -> Result<AudioBuffer> {
        Ok(audio.clone())
    }

    fn name(&self) -> &'static str {
        "pass-through"
    }
}

struct BrokenShifter;

impl VoicePitchShifter for BrokenShifter {
    fn shift(&self, _audio: &AudioBuffer, speaker: &str, _semitones: i32) -> Result<AudioBuffer> {
        Err(AcappellaError::Conversion(format!("{} checkpoint missing", speaker)))
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

/// Voice converter that never answers in time
struct StalledShifter;

impl VoicePitchShifter for StalledShifter {
    fn shift(&self, _audio: &AudioBuffer, _speaker: &str, _semitones: i32) -> Result<AudioBuffer> {
        Err(AcappellaError::Timeout {
            command: String::from("svc_inference.py"),
            seconds: 600.0,
        })
    }

    fn name(&self) -> &'static str {
        "stalled"
    }
}

struct Fixture {
    _dir: TempDir,
    song: PathBuf,
    config: Config,
}

/// A 5 s song at 8 kHz sliced into three 2 s windows
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let song = dir.path().join("demo.wav");
    write_wav(&tone(5.0, 330.0), &song).unwrap();

    let mut config = Config::default();
    config.segmentation.first_window_ms = 2000;
    config.segmentation.window_ms = 2000;
    config.segmentation.overlap_ms = 500;
    config.segmentation.min_last_window_ms = 500;
    config.segmentation.crossfade_ms = 500;
    config.mixing.sample_rate = RATE;
    config.mixing.channels = 1;
    config.pipeline.work_dir = dir.path().join("work");
    config.pipeline.output_dir = dir.path().join("out");

    Fixture {
        _dir: dir,
        song,
        config,
    }
}

fn collaborators(separator: FakeSeparator, pitch_shifter: Arc<dyn VoicePitchShifter>) -> Collaborators {
    Collaborators {
        separator: Arc::new(separator),
        transcriber: Arc::new(FakeTranscriber),
        synthesizer: Arc::new(FakeSynthesizer),
        pitch_shifter,
    }
}

fn run(
    config: Config,
    collaborators: Collaborators,
    song: &Path,
) -> (Result<PathBuf>, Vec<PipelineProgress>) {
    let (tx, rx) = mpsc::channel();
    let acappellifier = Acappellifier::new(config, collaborators).with_progress(tx);
    let result = acappellifier.acappellify(song);
    drop(acappellifier);
    (result, rx.into_iter().collect())
}

#[test]
fn test_song_end_to_end() {
    let fx = fixture();
    let (result, events) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );

    let output = result.unwrap();
    assert_eq!(output, fx.config.pipeline.output_dir.join("demo_acappella.wav"));

    // 2000 + 2000 + 2000 ms minus two 500 ms crossfades
    let audio = read_audio(&output).unwrap();
    assert_eq!(audio.sample_rate(), RATE);
    assert_eq!(audio.duration_ms(), 5000);
    assert!(audio.peak() > 0.0);

    assert!(matches!(events.first(), Some(PipelineProgress::Started { windows: 3, .. })));
    assert!(matches!(events.last(), Some(PipelineProgress::Complete { .. })));

    let completed = events
        .iter()
        .filter(|e| matches!(e, PipelineProgress::WindowCompleted { .. }))
        .count();
    assert_eq!(completed, 3);

    // Per window: two octave-4 lines and one octave-5 line from "other",
    // one octave-2 line from "bass"
    let lines: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::LineRendered {
                window: 0,
                stem,
                octave,
                fallback,
                ..
            } => Some((stem.clone(), *octave, *fallback)),
            _ => None,
        })
        .collect();
    assert_eq!(lines.len(), 4);
    assert!(lines.iter().all(|(_, _, fallback)| !fallback));
    assert_eq!(lines.iter().filter(|(s, o, _)| s == "other" && *o == 4).count(), 2);
    assert_eq!(lines.iter().filter(|(s, o, _)| s == "other" && *o == 5).count(), 1);
    assert_eq!(lines.iter().filter(|(s, o, _)| s == "bass" && *o == 2).count(), 1);
}

#[test]
fn test_intermediates_layout() {
    let fx = fixture();
    let (result, _) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );
    result.unwrap();

    let runs: Vec<_> = std::fs::read_dir(&fx.config.pipeline.work_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    let run_dir = &runs[0];
    assert!(run_dir.to_string_lossy().ends_with("_demo"));

    let window = run_dir.join("window1");
    assert!(window.join("demo_window1.wav").exists());
    assert!(window.join("mix.wav").exists());
    assert!(window.join("bass").join("octave2_mono0.wav").exists());
    assert!(window.join("bass").join("octave2_mono0_transposed-24.wav").exists());
    assert!(window.join("other").join("octave5_mono0_transposed+12.wav").exists());
    assert!(window.join("other").join("octave4_mono1_transposed+0.wav").exists());
}

#[test]
fn test_intermediates_removed_when_not_kept() {
    let mut fx = fixture();
    fx.config.pipeline.keep_intermediates = false;
    let (result, _) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );
    assert!(result.unwrap().exists());

    let leftovers = std::fs::read_dir(&fx.config.pipeline.work_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn test_pitch_shift_failure_falls_back() {
    let fx = fixture();
    let (result, events) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(BrokenShifter)),
        &fx.song,
    );

    let output = result.unwrap();
    assert_eq!(read_audio(&output).unwrap().duration_ms(), 5000);

    let fallbacks: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::LineRendered { fallback, .. } => Some(*fallback),
            _ => None,
        })
        .collect();
    assert_eq!(fallbacks.len(), 12);
    assert!(fallbacks.into_iter().all(|f| f));
}

#[test]
fn test_separator_failure_aborts_song() {
    let fx = fixture();
    let mut separator = FakeSeparator::new();
    separator.fail_first = usize::MAX;

    let (result, events) = run(
        fx.config.clone(),
        collaborators(separator, Arc::new(PassThroughShifter)),
        &fx.song,
    );

    match result {
        Err(AcappellaError::Window {
            index: 0,
            attempts: 1,
            source,
        }) => assert!(matches!(*source, AcappellaError::ExternalProcess { .. })),
        other => panic!("expected window failure, got {:?}", other),
    }
    assert!(!fx.config.pipeline.output_dir.join("demo_acappella.wav").exists());
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineProgress::Complete { .. })));
}

#[test]
fn test_missing_vocal_stem_is_integrity_error() {
    let fx = fixture();
    let mut separator = FakeSeparator::new();
    separator.stems = vec!["other", "bass"];

    let (result, _) = run(
        fx.config.clone(),
        collaborators(separator, Arc::new(PassThroughShifter)),
        &fx.song,
    );

    match result {
        Err(AcappellaError::Window { source, .. }) => {
            assert!(matches!(*source, AcappellaError::DataIntegrity(_)))
        }
        other => panic!("expected window failure, got {:?}", other),
    }
}

#[test]
fn test_window_retry_recovers() {
    let mut fx = fixture();
    fx.config.pipeline.window_attempts = 2;
    let mut separator = FakeSeparator::new();
    separator.fail_first = 1;

    let (result, events) = run(
        fx.config.clone(),
        collaborators(separator, Arc::new(PassThroughShifter)),
        &fx.song,
    );

    assert!(result.unwrap().exists());
    let failures: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::WindowFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![1]);
}

#[test]
fn test_parallel_windows_are_deterministic() {
    let fx = fixture();

    let mut sequential = fx.config.clone();
    sequential.pipeline.output_dir = fx.config.pipeline.output_dir.join("sequential");
    let mut parallel = fx.config.clone();
    parallel.pipeline.output_dir = fx.config.pipeline.output_dir.join("parallel");
    parallel.pipeline.parallel_windows = 4;
    parallel.pipeline.model_replicas = 2;

    let (a, _) = run(
        sequential,
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );
    let (b, _) = run(
        parallel,
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );

    let a = read_audio(&a.unwrap()).unwrap();
    let b = read_audio(&b.unwrap()).unwrap();
    assert_eq!(a.samples(), b.samples());
}

#[test]
fn test_cancel_stops_run() {
    let fx = fixture();
    let flag = Arc::new(AtomicBool::new(false));
    let mut separator = FakeSeparator::new();
    separator.cancel_on_call = Some(flag.clone());

    let acappellifier = Acappellifier::new(
        fx.config.clone(),
        collaborators(separator, Arc::new(PassThroughShifter)),
    )
    .with_cancel_flag(flag);

    let result = acappellifier.acappellify(&fx.song);
    assert!(matches!(result, Err(AcappellaError::Cancelled)));
    assert!(!fx.config.pipeline.output_dir.join("demo_acappella.wav").exists());
}

#[test]
fn test_silent_transcription_keeps_vocal_stem() {
    struct NothingHeard;

    impl Transcriber for NothingHeard {
        fn transcribe(&self, _input: &Path, _config: &TranscriptionConfig) -> Result<NoteTrack> {
            Ok(NoteTrack::default())
        }

        fn name(&self) -> &'static str {
            "nothing"
        }
    }

    let fx = fixture();
    let mut collaborators = collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter));
    collaborators.transcriber = Arc::new(NothingHeard);

    let (result, events) = run(fx.config.clone(), collaborators, &fx.song);
    assert_eq!(read_audio(&result.unwrap()).unwrap().duration_ms(), 5000);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineProgress::LineRendered { .. })));
}

#[test]
fn test_empty_song_produces_no_output() {
    let fx = fixture();
    let empty = fx.song.with_file_name("empty.wav");
    write_wav(&AudioBuffer::silent(0, RATE, 1), &empty).unwrap();

    let (result, events) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &empty,
    );

    assert!(matches!(result, Err(AcappellaError::NoOutput { .. })));
    assert!(!fx.config.pipeline.output_dir.join("empty_acappella.wav").exists());
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineProgress::Complete { .. })));
}

#[test]
fn test_pitch_shift_timeout_falls_back() {
    let fx = fixture();
    let (result, events) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(StalledShifter)),
        &fx.song,
    );

    assert_eq!(read_audio(&result.unwrap()).unwrap().duration_ms(), 5000);
    let rendered: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::LineRendered { fallback, .. } => Some(*fallback),
            _ => None,
        })
        .collect();
    assert_eq!(rendered.len(), 12);
    assert!(rendered.into_iter().all(|f| f));
}

#[test]
fn test_stem_without_band_uses_default_range() {
    let mut fx = fixture();
    fx.config.stems.melodic = vec![String::from("piano")];
    let mut separator = FakeSeparator::new();
    separator.stems = vec!["vocals", "piano"];

    let (result, events) = run(
        fx.config.clone(),
        collaborators(separator, Arc::new(PassThroughShifter)),
        &fx.song,
    );
    result.unwrap();

    // Octaves 4 and 5 both fall inside the default [1, 6] range
    let lines: Vec<(String, i32)> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::LineRendered {
                window: 0,
                stem,
                octave,
                ..
            } => Some((stem.clone(), *octave)),
            _ => None,
        })
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|(stem, _)| stem == "piano"));
    assert_eq!(lines.iter().filter(|(_, o)| *o == 5).count(), 1);
}

#[test]
fn test_configured_band_filters_stem() {
    let mut fx = fixture();
    fx.config.stems.bands = vec![
        StemBand::new("other", 5, 6),
        StemBand::new("bass", 1, 2),
    ];

    let (result, events) = run(
        fx.config.clone(),
        collaborators(FakeSeparator::new(), Arc::new(PassThroughShifter)),
        &fx.song,
    );
    result.unwrap();

    let other_octaves: Vec<i32> = events
        .iter()
        .filter_map(|e| match e {
            PipelineProgress::LineRendered {
                window: 0,
                stem,
                octave,
                ..
            } if stem == "other" => Some(*octave),
            _ => None,
        })
        .collect();
    assert_eq!(other_octaves, vec![5]);
}

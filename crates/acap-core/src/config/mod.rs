//! Pipeline configuration
//!
//! Every tunable constant of the pipeline lives here and is passed into the
//! component that needs it, so tests can vary each one independently.
//! Configuration is stored as YAML; missing fields take their defaults.
//!
//! Default location: `~/.config/acappella/config.yaml`

mod commands;
mod io;

pub use commands::{CommandSpec, CommandsConfig};
pub use io::{default_config_path, load_config, save_config};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{OUTPUT_CHANNELS, OUTPUT_SAMPLE_RATE};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub segmentation: SegmentationConfig,
    pub transcription: TranscriptionConfig,
    pub stems: StemsConfig,
    pub synthesis: SynthesisConfig,
    pub voices: VoiceConfig,
    pub mixing: MixingConfig,
    pub pipeline: PipelineConfig,
    pub commands: CommandsConfig,
}

impl Config {
    /// Clamp every section into its supported range
    pub fn validate(&mut self) {
        self.segmentation.validate();
        self.transcription.validate();
        self.stems.validate();
        self.synthesis.validate();
        self.mixing.validate();
        self.pipeline.validate();
    }
}

/// Time-window slicing of the input song
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Length of the first window
    pub first_window_ms: u64,
    /// Length of every later window
    pub window_ms: u64,
    /// Overlap of each window with the end of the previous one
    pub overlap_ms: u64,
    /// Shortest allowed trailing window
    pub min_last_window_ms: u64,
    /// Crossfade used when stitching window outputs
    pub crossfade_ms: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            first_window_ms: 10_500,
            window_ms: 11_000,
            overlap_ms: 1_000,
            min_last_window_ms: 4_000,
            crossfade_ms: 1_000,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&mut self) {
        self.first_window_ms = self.first_window_ms.max(1);
        // Later windows can only overlap audio the first window contains
        self.overlap_ms = self.overlap_ms.min(self.first_window_ms);
        // Windows must advance past the overlap or slicing never terminates
        self.window_ms = self.window_ms.max(self.overlap_ms + 1);
        // Stitching can only blend audio that both windows actually contain
        self.crossfade_ms = self.crossfade_ms.min(self.overlap_ms);
    }
}

/// Transcription model variants, each mapped to its model file suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranscriberModel {
    #[default]
    Onnx,
    Tensorflow,
    Tflite,
}

impl TranscriberModel {
    /// File suffix of the model artifact for this variant
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Onnx => "nmp.onnx",
            Self::Tensorflow => "nmp",
            Self::Tflite => "nmp.tflite",
        }
    }
}

/// Note transcription parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub onset_threshold: f32,
    pub frame_threshold: f32,
    pub tempo_bpm: f32,
    pub model: TranscriberModel,
    /// Notes below this pitch are discarded before octave splitting (A0)
    pub lowest_pitch: i32,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            onset_threshold: 0.7,
            frame_threshold: 0.35,
            tempo_bpm: 120.0,
            model: TranscriberModel::default(),
            lowest_pitch: crate::types::LOWEST_PITCH_A0,
        }
    }
}

impl TranscriptionConfig {
    pub fn validate(&mut self) {
        self.onset_threshold = self.onset_threshold.clamp(0.0, 1.0);
        self.frame_threshold = self.frame_threshold.clamp(0.0, 1.0);
        self.tempo_bpm = self.tempo_bpm.clamp(20.0, 300.0);
        self.lowest_pitch = self.lowest_pitch.clamp(0, 127);
    }
}

/// Stem separation model variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SeparatorModel {
    /// Fine-tuned hybrid transformer Demucs (vocals, drums, bass, other)
    #[default]
    HtdemucsFt,
    Htdemucs,
    /// Adds piano and guitar stems
    Htdemucs6s,
}

impl SeparatorModel {
    /// Model name as understood by the separator
    pub fn name(&self) -> &'static str {
        match self {
            Self::HtdemucsFt => "htdemucs_ft",
            Self::Htdemucs => "htdemucs",
            Self::Htdemucs6s => "htdemucs_6s",
        }
    }
}

/// Allowed octave range for one stem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StemBand {
    pub name: String,
    pub min_octave: i32,
    pub max_octave: i32,
}

impl StemBand {
    pub fn new(name: impl Into<String>, min_octave: i32, max_octave: i32) -> Self {
        Self {
            name: name.into(),
            min_octave,
            max_octave,
        }
    }
}

/// Which stems are used and how
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StemsConfig {
    pub separator_model: SeparatorModel,
    /// Stem mixed back unmodified under the sung lines
    pub vocal_stem: String,
    /// Stems transcribed and re-sung, in processing order
    pub melodic: Vec<String>,
    /// Per-stem octave ranges
    pub bands: Vec<StemBand>,
    /// Octave range for a melodic stem without its own band
    pub default_min_octave: i32,
    pub default_max_octave: i32,
}

impl Default for StemsConfig {
    fn default() -> Self {
        Self {
            separator_model: SeparatorModel::default(),
            vocal_stem: String::from("vocals"),
            melodic: vec![String::from("other"), String::from("bass")],
            bands: vec![StemBand::new("other", 3, 6), StemBand::new("bass", 1, 2)],
            default_min_octave: 1,
            default_max_octave: 6,
        }
    }
}

impl StemsConfig {
    pub fn validate(&mut self) {
        for band in &mut self.bands {
            if band.min_octave > band.max_octave {
                std::mem::swap(&mut band.min_octave, &mut band.max_octave);
            }
        }
        if self.default_min_octave > self.default_max_octave {
            std::mem::swap(&mut self.default_min_octave, &mut self.default_max_octave);
        }
    }

    /// Allowed `(min, max)` octave range for a stem
    pub fn band_for(&self, stem: &str) -> (i32, i32) {
        self.bands
            .iter()
            .find(|b| b.name == stem)
            .map(|b| (b.min_octave, b.max_octave))
            .unwrap_or((self.default_min_octave, self.default_max_octave))
    }
}

/// Note batching and synthesis parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Gaps shorter than this are absorbed into the preceding note
    pub min_silence_secs: f64,
    /// Octave every line is transposed into before synthesis
    pub canonical_octave: i32,
    /// Rewrite every note symbol to this octave before batching
    pub symbol_octave: Option<i32>,
    /// Fade applied when a render overruns its batch
    pub fade_secs: f64,
    pub tone_phonemes: Vec<String>,
    pub breath_phoneme: String,
    pub silence_phoneme: String,
    pub rest_symbol: String,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            min_silence_secs: 0.4,
            canonical_octave: 4,
            symbol_octave: None,
            fade_secs: 0.4,
            tone_phonemes: vec![String::from("n"), String::from("a")],
            breath_phoneme: String::from("AP"),
            silence_phoneme: String::from("SP"),
            rest_symbol: String::from("rest"),
        }
    }
}

impl SynthesisConfig {
    pub fn validate(&mut self) {
        self.min_silence_secs = self.min_silence_secs.clamp(0.01, 10.0);
        self.fade_secs = self.fade_secs.clamp(0.0, 10.0);
        self.canonical_octave = self.canonical_octave.clamp(0, 9);
        if self.tone_phonemes.is_empty() {
            self.tone_phonemes = Self::default().tone_phonemes;
        }
    }
}

/// Speaker identities of the voice converter, one per register
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub soprano: String,
    pub alto: String,
    pub tenor: String,
    pub bass: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            soprano: String::from("M4Singer-Soprano-1"),
            alto: String::from("M4Singer-Alto-1"),
            tenor: String::from("M4Singer-Tenor-1"),
            bass: String::from("M4Singer-Bass-1"),
        }
    }
}

/// Final loudness normalization targets
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Integrated loudness target in LUFS
    pub target_lufs: f32,
    /// Loudness range target in LU
    pub loudness_range: f32,
    /// Peak ceiling in dBTP
    pub peak_db: f32,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            target_lufs: -14.0,
            loudness_range: 7.0,
            peak_db: -1.0,
        }
    }
}

/// Gain applied to lines whose octave is at least `min_octave`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OctaveGain {
    pub min_octave: i32,
    pub gain_db: f32,
}

/// Mixdown implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MixdownBackend {
    /// In-process summing and normalization
    #[default]
    Native,
    /// ffmpeg `amix` + `loudnorm`
    Ffmpeg,
}

/// Mixing and gain staging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingConfig {
    /// Octave gain bands, checked from the highest threshold down
    pub octave_gains: Vec<OctaveGain>,
    /// Gain for lines below every band
    pub fallback_gain_db: f32,
    pub vocal_stem_gain_db: f32,
    pub normalization: NormalizationConfig,
    pub sample_rate: u32,
    pub channels: u16,
    pub backend: MixdownBackend,
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            octave_gains: vec![
                OctaveGain { min_octave: 3, gain_db: -3.0 },
                OctaveGain { min_octave: 2, gain_db: -6.0 },
            ],
            fallback_gain_db: -9.0,
            vocal_stem_gain_db: 0.0,
            normalization: NormalizationConfig::default(),
            sample_rate: OUTPUT_SAMPLE_RATE,
            channels: OUTPUT_CHANNELS,
            backend: MixdownBackend::default(),
        }
    }
}

impl MixingConfig {
    pub fn validate(&mut self) {
        self.octave_gains.sort_by(|a, b| b.min_octave.cmp(&a.min_octave));
        self.sample_rate = self.sample_rate.clamp(8_000, 192_000);
        self.channels = self.channels.clamp(1, 8);
    }
}

/// Coordinator scheduling, limits and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Windows processed concurrently (1-16)
    pub parallel_windows: u8,
    /// Independent replicas of each external model (1-16)
    pub model_replicas: u8,
    /// Attempts per window before the song is aborted
    pub window_attempts: u32,
    pub separation_timeout_secs: Option<u64>,
    pub transcription_timeout_secs: Option<u64>,
    pub synthesis_timeout_secs: Option<u64>,
    pub pitch_shift_timeout_secs: Option<u64>,
    pub mixdown_timeout_secs: Option<u64>,
    /// Root of the run-timestamped intermediate tree
    pub work_dir: PathBuf,
    /// Directory receiving the final `<song>_acappella.wav`
    pub output_dir: PathBuf,
    /// Persist per-line renders and per-window mixes
    pub keep_intermediates: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parallel_windows: 1,
            model_replicas: 1,
            window_attempts: 1,
            separation_timeout_secs: Some(1800),
            transcription_timeout_secs: Some(600),
            synthesis_timeout_secs: Some(600),
            pitch_shift_timeout_secs: Some(600),
            mixdown_timeout_secs: Some(300),
            work_dir: PathBuf::from("acappella-work"),
            output_dir: PathBuf::from("acappellas"),
            keep_intermediates: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&mut self) {
        self.parallel_windows = self.parallel_windows.clamp(1, 16);
        self.model_replicas = self.model_replicas.clamp(1, 16);
        self.window_attempts = self.window_attempts.clamp(1, 10);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.segmentation.first_window_ms, 10_500);
        assert_eq!(config.synthesis.canonical_octave, 4);
        assert_eq!(config.stems.band_for("other"), (3, 6));
        assert_eq!(config.stems.band_for("bass"), (1, 2));
        assert_eq!(config.stems.band_for("piano"), (1, 6));
        assert_eq!(config.mixing.normalization.target_lufs, -14.0);
    }

    #[test]
    fn test_model_lookup_tables() {
        assert_eq!(SeparatorModel::HtdemucsFt.name(), "htdemucs_ft");
        assert_eq!(TranscriberModel::Onnx.file_suffix(), "nmp.onnx");
        assert_eq!(TranscriberModel::Tflite.file_suffix(), "nmp.tflite");
    }

    #[test]
    fn test_validation_clamps_values() {
        let mut config = Config::default();
        config.pipeline.parallel_windows = 0;
        config.pipeline.model_replicas = 200;
        config.segmentation.window_ms = 500;
        config.stems.bands = vec![StemBand::new("other", 6, 3)];
        config.validate();

        assert_eq!(config.pipeline.parallel_windows, 1);
        assert_eq!(config.pipeline.model_replicas, 16);
        assert!(config.segmentation.window_ms > config.segmentation.overlap_ms);
        assert_eq!(config.stems.band_for("other"), (3, 6));
    }

    #[test]
    fn test_overlap_limited_to_first_window() {
        let mut segmentation = SegmentationConfig {
            first_window_ms: 400,
            overlap_ms: 1_000,
            crossfade_ms: 1_000,
            ..Default::default()
        };
        segmentation.validate();

        assert_eq!(segmentation.overlap_ms, 400);
        assert_eq!(segmentation.crossfade_ms, 400);
        assert!(segmentation.window_ms > segmentation.overlap_ms);
    }

    #[test]
    fn test_gain_bands_sorted_descending() {
        let mut mixing = MixingConfig {
            octave_gains: vec![
                OctaveGain { min_octave: 2, gain_db: -6.0 },
                OctaveGain { min_octave: 3, gain_db: -3.0 },
            ],
            ..Default::default()
        };
        mixing.validate();
        assert_eq!(mixing.octave_gains[0].min_octave, 3);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.mixing.backend = MixdownBackend::Ffmpeg;
        config.transcription.model = TranscriberModel::Tensorflow;
        config.synthesis.symbol_octave = Some(4);

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.mixing.backend, MixdownBackend::Ffmpeg);
        assert_eq!(parsed.transcription.model, TranscriberModel::Tensorflow);
        assert_eq!(parsed.synthesis.symbol_octave, Some(4));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("pipeline:\n  parallel_windows: 4\n").unwrap();
        assert_eq!(parsed.pipeline.parallel_windows, 4);
        assert_eq!(parsed.segmentation.overlap_ms, 1_000);
        assert_eq!(parsed.stems.vocal_stem, "vocals");
    }
}

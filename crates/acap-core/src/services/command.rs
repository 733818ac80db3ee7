//! Command-line-backed collaborators
//!
//! Each model runs as an external program (Demucs, a transcription script,
//! a singing synthesizer script, a voice conversion script) driven through
//! [`run_command`]. Audio and requests cross the process boundary as
//! temporary files; results come back as files or JSON on stdout.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::{Collaborators, StemSeparator, Transcriber, VoicePitchShifter, VoiceSynthesizer};
use crate::audio::io::{read_audio, write_wav};
use crate::audio::AudioBuffer;
use crate::config::{CommandSpec, Config, SeparatorModel, TranscriptionConfig};
use crate::error::{AcappellaError, Result};
use crate::notes::NoteTrack;
use crate::process::{command_line, run_command};
use crate::synth::SynthBatch;

fn timeout(secs: Option<u64>) -> Option<Duration> {
    secs.map(Duration::from_secs)
}

fn temp_file(prefix: &str, suffix: &str) -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .map_err(|e| AcappellaError::io(std::env::temp_dir(), e))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Stem separation through Demucs
///
/// Demucs writes `<output>/<model>/<input stem>/<stem>.wav`. When that
/// directory already exists the separator is not invoked again.
pub struct CommandSeparator {
    command: CommandSpec,
    model: SeparatorModel,
    timeout: Option<Duration>,
}

impl CommandSeparator {
    pub fn new(command: CommandSpec, model: SeparatorModel, timeout: Option<Duration>) -> Self {
        Self {
            command,
            model,
            timeout,
        }
    }

    /// Directory the separator writes stems of `input` into
    pub fn stems_dir(&self, input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        output_dir.join(self.model.name()).join(stem)
    }
}

/// Every `*.wav` in `dir`, keyed by file stem
fn list_stems(dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AcappellaError::io(dir, e))?;
    let mut stems = BTreeMap::new();
    for entry in entries {
        let path = entry.map_err(|e| AcappellaError::io(dir, e))?.path();
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if let (true, Some(name)) = (is_wav, path.file_stem()) {
            stems.insert(name.to_string_lossy().into_owned(), path.clone());
        }
    }
    Ok(stems)
}

impl StemSeparator for CommandSeparator {
    fn separate(&self, input: &Path, output_dir: &Path) -> Result<BTreeMap<String, PathBuf>> {
        let stems_dir = self.stems_dir(input, output_dir);
        if stems_dir.exists() {
            log::info!("separate: Using cached stems in {:?}", stems_dir);
        } else {
            let args = self.command.render_args(&[
                ("input", path_arg(input)),
                ("output", path_arg(output_dir)),
                ("model", self.model.name().to_string()),
            ]);
            run_command(&self.command.program, &args, self.timeout)?;
        }

        let stems = list_stems(&stems_dir)?;
        if stems.is_empty() {
            return Err(AcappellaError::ExternalProcess {
                command: command_line(&self.command.program, &self.command.args),
                status: None,
                stderr: format!("no stems found in {:?}", stems_dir),
            });
        }
        log::info!(
            "separate: {:?} -> {:?}",
            input.file_name().unwrap_or_default(),
            stems.keys().collect::<Vec<_>>()
        );
        Ok(stems)
    }

    fn name(&self) -> &'static str {
        "demucs"
    }
}

/// Note transcription through a script printing a JSON note list
pub struct CommandTranscriber {
    command: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandTranscriber {
    pub fn new(command: CommandSpec, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl Transcriber for CommandTranscriber {
    fn transcribe(&self, input: &Path, config: &TranscriptionConfig) -> Result<NoteTrack> {
        let args = self.command.render_args(&[
            ("input", path_arg(input)),
            ("onset_threshold", config.onset_threshold.to_string()),
            ("frame_threshold", config.frame_threshold.to_string()),
            ("tempo", config.tempo_bpm.to_string()),
            ("model_suffix", config.model.file_suffix().to_string()),
        ]);
        let output = run_command(&self.command.program, &args, self.timeout)?;
        let track = NoteTrack::from_json(output.stdout.trim())?;
        log::info!("transcribe: {:?} -> {} notes", input.file_name().unwrap_or_default(), track.len());
        Ok(track)
    }

    fn name(&self) -> &'static str {
        "basic-pitch"
    }
}

/// Singing synthesis of one batch per invocation
pub struct CommandSynthesizer {
    command: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandSynthesizer {
    pub fn new(command: CommandSpec, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl VoiceSynthesizer for CommandSynthesizer {
    fn synthesize(&self, batch: &SynthBatch) -> Result<AudioBuffer> {
        let request_file = temp_file("acap_request_", ".json")?;
        let request = serde_json::to_string(&batch.to_request())?;
        std::fs::write(request_file.path(), request).map_err(|e| AcappellaError::io(request_file.path(), e))?;

        let output_file = temp_file("acap_synth_", ".wav")?;
        let args = self.command.render_args(&[
            ("input", path_arg(request_file.path())),
            ("output", path_arg(output_file.path())),
        ]);
        run_command(&self.command.program, &args, self.timeout)?;
        read_audio(output_file.path())
    }

    fn name(&self) -> &'static str {
        "diffsinger"
    }
}

/// Voice conversion with pitch adjustment
pub struct CommandVoiceConverter {
    command: CommandSpec,
    timeout: Option<Duration>,
}

impl CommandVoiceConverter {
    pub fn new(command: CommandSpec, timeout: Option<Duration>) -> Self {
        Self { command, timeout }
    }
}

impl VoicePitchShifter for CommandVoiceConverter {
    fn shift(&self, audio: &AudioBuffer, speaker: &str, semitones: i32) -> Result<AudioBuffer> {
        let input_file = temp_file("acap_svc_in_", ".wav")?;
        write_wav(audio, input_file.path())?;
        let output_file = temp_file("acap_svc_out_", ".wav")?;

        let args = self.command.render_args(&[
            ("input", path_arg(input_file.path())),
            ("output", path_arg(output_file.path())),
            ("speaker", speaker.to_string()),
            ("semitones", semitones.to_string()),
        ]);
        run_command(&self.command.program, &args, self.timeout)?;
        read_audio(output_file.path())
    }

    fn name(&self) -> &'static str {
        "hifisinger-svc"
    }
}

impl Collaborators {
    /// Command-backed collaborators with the configured templates and timeouts
    pub fn from_commands(config: &Config) -> Self {
        let commands = &config.commands;
        let pipeline = &config.pipeline;
        Self {
            separator: Arc::new(CommandSeparator::new(
                commands.separator.clone(),
                config.stems.separator_model,
                timeout(pipeline.separation_timeout_secs),
            )),
            transcriber: Arc::new(CommandTranscriber::new(
                commands.transcriber.clone(),
                timeout(pipeline.transcription_timeout_secs),
            )),
            synthesizer: Arc::new(CommandSynthesizer::new(
                commands.synthesizer.clone(),
                timeout(pipeline.synthesis_timeout_secs),
            )),
            pitch_shifter: Arc::new(CommandVoiceConverter::new(
                commands.voice_converter.clone(),
                timeout(pipeline.pitch_shift_timeout_secs),
            )),
        }
    }
}

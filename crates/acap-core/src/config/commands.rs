//! Command templates for the command-line-backed collaborators
//!
//! Arguments may contain `{name}` placeholders which are substituted at
//! invocation time. Unknown placeholders are left as they are.

use serde::{Deserialize, Serialize};

/// A program plus argument template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Arguments with every `{key}` replaced by its value
    pub fn render_args(&self, values: &[(&str, String)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                values.iter().fold(arg.clone(), |acc, (key, value)| {
                    acc.replace(&format!("{{{}}}", key), value)
                })
            })
            .collect()
    }
}

/// Command templates for every external tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Stem separation. Placeholders: `{input}`, `{output}`, `{model}`
    pub separator: CommandSpec,
    /// Note transcription, JSON note list on stdout. Placeholders: `{input}`,
    /// `{onset_threshold}`, `{frame_threshold}`, `{tempo}`, `{model_suffix}`
    pub transcriber: CommandSpec,
    /// Singing synthesis of one batch. Placeholders: `{input}` (JSON request), `{output}`
    pub synthesizer: CommandSpec,
    /// Voice conversion. Placeholders: `{input}`, `{output}`, `{speaker}`, `{semitones}`
    pub voice_converter: CommandSpec,
    /// ffmpeg executable used by the ffmpeg mixdown backend
    pub ffmpeg: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            separator: CommandSpec::new(
                "python3",
                &["-m", "demucs.separate", "-o", "{output}", "-n", "{model}", "{input}"],
            ),
            transcriber: CommandSpec::new(
                "python3",
                &[
                    "scripts/transcribe.py",
                    "{input}",
                    "--onset-threshold",
                    "{onset_threshold}",
                    "--frame-threshold",
                    "{frame_threshold}",
                    "--tempo",
                    "{tempo}",
                    "--model-suffix",
                    "{model_suffix}",
                ],
            ),
            synthesizer: CommandSpec::new(
                "python3",
                &["scripts/synthesize.py", "--input", "{input}", "--output", "{output}"],
            ),
            voice_converter: CommandSpec::new(
                "python3",
                &[
                    "scripts/convert_voice.py",
                    "--input",
                    "{input}",
                    "--output",
                    "{output}",
                    "--speaker",
                    "{speaker}",
                    "--pitch-adjust",
                    "{semitones}",
                ],
            ),
            ffmpeg: String::from("ffmpeg"),
        }
    }
}

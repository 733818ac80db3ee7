//! Song-level coordination
//!
//! [`Acappellifier`] drives one song through every stage:
//!
//! ```text
//! segment → separate → transcribe → band/split/decompose → batch
//!   → transpose to canonical octave → synthesize → pitch-shift back
//!   → mix (per window) → stitch (across windows)
//! ```
//!
//! Windows are independent and run on a rayon pool of
//! `pipeline.parallel_windows` workers. Results are collected in window
//! order regardless of completion order, so stitching is deterministic.
//! Inside a window, lines render concurrently; every external model is
//! reached through a [`ReplicaPool`] so calls never exceed the number of
//! provisioned replicas.
//!
//! # On-disk layout
//!
//! ```text
//! <work_dir>/<timestamp>_<song>/window<i>/<song>_window<i>.wav
//!                                        /separated/<model>/<song>_window<i>/<stem>.wav
//!                                        /<stem>/octave<o>_mono<n>.wav
//!                                        /<stem>/octave<o>_mono<n>_transposed<±k>.wav
//!                                        /mix.wav
//! <output_dir>/<song>_acappella.wav
//! ```

pub mod progress;

pub use progress::{PipelineProgress, WindowStage};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::audio::io::{read_audio, write_wav};
use crate::audio::AudioBuffer;
use crate::config::Config;
use crate::error::{AcappellaError, Result};
use crate::mix::{stitch, MixLine, Mixer};
use crate::notes::{mono, octave, transpose, NoteTrack};
use crate::segment::{Segmenter, Window};
use crate::services::{
    Collaborators, ReplicaPool, ShiftOutcome, StemSeparator, Transcriber, VoicePitchShifter,
    VoiceSynthesizer,
};
use crate::synth::{NoteBatcher, VoiceRegister};

/// One monophonic line waiting to be sung
#[derive(Debug, Clone)]
struct LineJob {
    stem: String,
    octave: i32,
    index: usize,
    track: NoteTrack,
}

impl LineJob {
    fn file_stem(&self) -> String {
        format!("octave{}_mono{}", self.octave, self.index)
    }
}

/// File stem of a pitch-shifted render, e.g. `octave2_mono0_transposed+24`
pub fn transposed_file_stem(base: &str, semitones: i32) -> String {
    let sign = if semitones >= 0 { '+' } else { '-' };
    format!("{}_transposed{}{}", base, sign, semitones.abs())
}

/// Turns songs into a cappella renditions
pub struct Acappellifier {
    config: Config,
    segmenter: Segmenter,
    batcher: NoteBatcher,
    mixer: Mixer,
    separators: ReplicaPool<Arc<dyn StemSeparator>>,
    transcribers: ReplicaPool<Arc<dyn Transcriber>>,
    synthesizers: ReplicaPool<Arc<dyn VoiceSynthesizer>>,
    pitch_shifters: ReplicaPool<Arc<dyn VoicePitchShifter>>,
    progress_tx: Option<Sender<PipelineProgress>>,
    cancel_flag: Arc<AtomicBool>,
}

impl Acappellifier {
    pub fn new(mut config: Config, collaborators: Collaborators) -> Self {
        config.validate();
        let replicas = config.pipeline.model_replicas as usize;
        log::info!(
            "Acappellifier: separator={} transcriber={} synthesizer={} pitch_shifter={} ({} replica(s) each)",
            collaborators.separator.name(),
            collaborators.transcriber.name(),
            collaborators.synthesizer.name(),
            collaborators.pitch_shifter.name(),
            replicas
        );

        Self {
            segmenter: Segmenter::new(config.segmentation.clone()),
            batcher: NoteBatcher::new(config.synthesis.clone()),
            mixer: Mixer::from_config(&config),
            separators: ReplicaPool::replicated(collaborators.separator, replicas),
            transcribers: ReplicaPool::replicated(collaborators.transcriber, replicas),
            synthesizers: ReplicaPool::replicated(collaborators.synthesizer, replicas),
            pitch_shifters: ReplicaPool::replicated(collaborators.pitch_shifter, replicas),
            progress_tx: None,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Replace the mixer built from the configuration
    pub fn with_mixer(mut self, mixer: Mixer) -> Self {
        self.mixer = mixer;
        self
    }

    pub fn with_progress(mut self, progress_tx: Sender<PipelineProgress>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    /// Share a cancellation flag; setting it stops the run at the next
    /// stage boundary with [`AcappellaError::Cancelled`]
    pub fn with_cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = cancel_flag;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_flag.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn send(&self, event: PipelineProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(event);
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel_flag.load(Ordering::Relaxed) {
            return Err(AcappellaError::Cancelled);
        }
        Ok(())
    }

    /// Process one song and return the path of the written result.
    ///
    /// Fails with [`AcappellaError::NoOutput`] when no window produced audio
    /// and with [`AcappellaError::Window`] when a window failed every attempt.
    /// Nothing is written to the output directory on failure.
    pub fn acappellify(&self, song_path: &Path) -> Result<PathBuf> {
        let start_time = Instant::now();
        self.check_cancelled()?;

        let song_stem = song_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| String::from("song"));

        let audio = read_audio(song_path)?;
        let windows = self.segmenter.slice(&audio);
        let total = windows.len();
        log::info!(
            "acappellify: {:?} ({:.1}s, {} Hz, {} ch) -> {} window(s)",
            song_path,
            audio.duration_secs(),
            audio.sample_rate(),
            audio.channels(),
            total
        );
        drop(audio);
        self.send(PipelineProgress::Started {
            song: song_path.to_path_buf(),
            windows: total,
        });

        let run_dir = self.config.pipeline.work_dir.join(format!(
            "{}_{}",
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"),
            song_stem
        ));

        let num_workers = self.config.pipeline.parallel_windows as usize;
        log::info!("acappellify: Using {} parallel window worker(s)", num_workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| AcappellaError::InvalidConfig(format!("failed to create worker pool: {}", e)))?;

        let results: Vec<Result<AudioBuffer>> = pool.install(|| {
            windows
                .par_iter()
                .map(|(window, window_audio)| {
                    self.process_window_with_retries(&run_dir, &song_stem, window, window_audio, total)
                })
                .collect()
        });

        // First failure in window order aborts the song
        let mixes: Vec<AudioBuffer> = results
            .into_iter()
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .filter(|mix| !mix.is_empty())
            .collect();

        let stitched = stitch(&mixes, self.config.segmentation.crossfade_ms)?.ok_or_else(|| {
            AcappellaError::NoOutput {
                song: song_path.to_path_buf(),
            }
        })?;

        let output = self
            .config
            .pipeline
            .output_dir
            .join(format!("{}_acappella.wav", song_stem));
        write_wav(&stitched, &output)?;

        if !self.config.pipeline.keep_intermediates {
            if let Err(e) = std::fs::remove_dir_all(&run_dir) {
                log::warn!("acappellify: Failed to remove {:?}: {}", run_dir, e);
            }
        }

        let duration_secs = start_time.elapsed().as_secs_f64();
        log::info!(
            "acappellify: Wrote {:?} ({:.1}s of audio) in {:.1}s",
            output,
            stitched.duration_secs(),
            duration_secs
        );
        self.send(PipelineProgress::Complete {
            output: output.clone(),
            duration_secs,
        });
        Ok(output)
    }

    fn process_window_with_retries(
        &self,
        run_dir: &Path,
        song_stem: &str,
        window: &Window,
        audio: &AudioBuffer,
        total: usize,
    ) -> Result<AudioBuffer> {
        let attempts = self.config.pipeline.window_attempts;
        let mut attempt = 1;
        loop {
            self.check_cancelled()?;
            match self.process_window(run_dir, song_stem, window, audio) {
                Ok(mix) => {
                    log::info!(
                        "process_window: Window {} [{} ms, {} ms) done",
                        window.index,
                        window.start_ms,
                        window.end_ms
                    );
                    self.send(PipelineProgress::WindowCompleted {
                        window: window.index,
                        total,
                    });
                    return Ok(mix);
                }
                Err(AcappellaError::Cancelled) => return Err(AcappellaError::Cancelled),
                Err(e) => {
                    log::warn!(
                        "process_window: Window {} attempt {}/{} failed: {}",
                        window.index,
                        attempt,
                        attempts,
                        e
                    );
                    self.send(PipelineProgress::WindowFailed {
                        window: window.index,
                        attempt,
                        error: e.to_string(),
                    });
                    if attempt >= attempts {
                        return Err(AcappellaError::Window {
                            index: window.index,
                            attempts: attempt,
                            source: Box::new(e),
                        });
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn stage(&self, window: usize, stage: WindowStage) {
        log::debug!("process_window: Window {} -> {:?}", window, stage);
        self.send(PipelineProgress::Stage { window, stage });
    }

    fn process_window(
        &self,
        run_dir: &Path,
        song_stem: &str,
        window: &Window,
        audio: &AudioBuffer,
    ) -> Result<AudioBuffer> {
        let window_dir = run_dir.join(format!("window{}", window.index));
        let input = window_dir.join(format!("{}_window{}.wav", song_stem, window.index));
        write_wav(audio, &input)?;

        self.stage(window.index, WindowStage::Separating);
        let separated_dir = window_dir.join("separated");
        let stems = self.separators.with(|s| s.separate(&input, &separated_dir))?;
        self.check_cancelled()?;

        let vocal_stem = &self.config.stems.vocal_stem;
        let vocal_path = stems.get(vocal_stem).ok_or_else(|| {
            AcappellaError::DataIntegrity(format!(
                "separator produced no '{}' stem (got {:?})",
                vocal_stem,
                stems.keys().collect::<Vec<_>>()
            ))
        })?;

        self.stage(window.index, WindowStage::Transcribing);
        let jobs = self.line_jobs(window.index, &stems)?;
        self.check_cancelled()?;

        self.stage(window.index, WindowStage::Synthesizing);
        log::info!(
            "process_window: Window {} rendering {} line(s)",
            window.index,
            jobs.len()
        );
        let mut lines = jobs
            .par_iter()
            .map(|job| self.render_job(window.index, &window_dir, job))
            .collect::<Result<Vec<MixLine>>>()?;
        lines.push(self.mixer.vocal_line(read_audio(vocal_path)?));
        self.check_cancelled()?;

        // Join point: every line, vocal stem included, is complete here
        self.stage(window.index, WindowStage::Mixing);
        let mix = self.mixer.mix(&lines)?;
        if self.config.pipeline.keep_intermediates {
            write_wav(&mix, &window_dir.join("mix.wav"))?;
        }
        Ok(mix)
    }

    /// Transcribe every melodic stem and break it into monophonic lines,
    /// ordered by stem, then octave, then line index
    fn line_jobs(&self, window: usize, stems: &BTreeMap<String, PathBuf>) -> Result<Vec<LineJob>> {
        let lowest_pitch = self.config.transcription.lowest_pitch;
        let per_stem = self
            .config
            .stems
            .melodic
            .iter()
            .filter_map(|name| match stems.get(name) {
                Some(path) => Some((name, path)),
                None => {
                    log::warn!("line_jobs: Window {} has no '{}' stem, skipping", window, name);
                    None
                }
            })
            .map(|(name, path)| -> Result<Vec<LineJob>> {
                let (min_octave, max_octave) = self.config.stems.band_for(name);
                let track = self
                    .transcribers
                    .with(|t| t.transcribe(path, &self.config.transcription))?;
                let banded = octave::band(&track, min_octave, max_octave)?;
                let by_octave = octave::split_by_octave(&banded, lowest_pitch)?;
                log::debug!(
                    "line_jobs: Window {} stem '{}': {} notes, {} in band, octaves {:?}",
                    window,
                    name,
                    track.len(),
                    banded.len(),
                    by_octave.keys().collect::<Vec<_>>()
                );
                Ok(by_octave
                    .into_iter()
                    .flat_map(|(octave, track)| {
                        mono::decompose(&track)
                            .into_iter()
                            .enumerate()
                            .map(move |(index, line)| LineJob {
                                stem: name.clone(),
                                octave,
                                index,
                                track: line,
                            })
                    })
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(per_stem.into_iter().flatten().collect())
    }

    /// Sing one line in the canonical octave, then shift it back
    fn render_job(&self, window: usize, window_dir: &Path, job: &LineJob) -> Result<MixLine> {
        let keep = self.config.pipeline.keep_intermediates;
        let canonical = self.config.synthesis.canonical_octave;
        let to_canonical = transpose::octave_delta(job.octave, canonical);

        let transposed = transpose::shift(&job.track, to_canonical);
        let batches = self.batcher.batch(&transposed)?;
        let rendered = self.mixer.render_line(&batches, transposed.end(), |batch| {
            self.synthesizers.with(|s| s.synthesize(batch))
        })?;

        let line_dir = window_dir.join(&job.stem);
        let base = job.file_stem();
        if keep {
            write_wav(&rendered, &line_dir.join(format!("{}.wav", base)))?;
        }

        let back = -to_canonical;
        let speaker = VoiceRegister::for_octave(job.octave).speaker_id(&self.config.voices);
        let outcome = self
            .pitch_shifters
            .with(|p| ShiftOutcome::attempt(p.as_ref(), &rendered, speaker, back));

        match &outcome {
            ShiftOutcome::Shifted(shifted) => {
                if keep {
                    let name = transposed_file_stem(&base, back);
                    write_wav(shifted, &line_dir.join(format!("{}.wav", name)))?;
                }
            }
            ShiftOutcome::Fallback { reason, .. } => {
                log::warn!(
                    "render_job: Pitch shift to {} ({:+} semitones) failed for window {} stem '{}' octave {} line {}, keeping unshifted render: {}",
                    speaker,
                    back,
                    window,
                    job.stem,
                    job.octave,
                    job.index,
                    reason
                );
            }
        }

        self.send(PipelineProgress::LineRendered {
            window,
            stem: job.stem.clone(),
            octave: job.octave,
            line: job.index,
            fallback: outcome.is_fallback(),
        });

        Ok(self.mixer.line(outcome.into_audio(), job.octave))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transposed_file_stem() {
        assert_eq!(transposed_file_stem("octave2_mono0", 24), "octave2_mono0_transposed+24");
        assert_eq!(transposed_file_stem("octave5_mono1", -12), "octave5_mono1_transposed-12");
        assert_eq!(transposed_file_stem("octave4_mono3", 0), "octave4_mono3_transposed+0");
    }
}

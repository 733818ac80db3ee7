//! acappellify - turn songs into a cappella renditions
//!
//! ## Usage
//!
//! ```text
//! acappellify [--config <path>] [--write-default-config] <song>...
//! ```
//!
//! Songs are processed one after another; each result is written to
//! `<output_dir>/<song>_acappella.wav`. Set `RUST_LOG=debug` to see the
//! output of the external models as they run.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use acap_core::config::{default_config_path, load_config, save_config};
use acap_core::{Acappellifier, Collaborators, Config, PipelineProgress};
use anyhow::{bail, Context, Result};

struct Args {
    config_path: PathBuf,
    write_default_config: bool,
    songs: Vec<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        config_path: default_config_path(),
        write_default_config: false,
        songs: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config_path = PathBuf::from(path);
            }
            "--write-default-config" => parsed.write_default_config = true,
            "--help" | "-h" => {
                println!("usage: acappellify [--config <path>] [--write-default-config] <song>...");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown flag '{}'", flag),
            song => parsed.songs.push(PathBuf::from(song)),
        }
    }
    Ok(parsed)
}

fn log_progress(rx: mpsc::Receiver<PipelineProgress>) {
    for event in rx {
        match event {
            PipelineProgress::Started { song, windows } => {
                log::info!("{:?}: {} window(s)", song, windows)
            }
            PipelineProgress::WindowCompleted { window, total } => {
                log::info!("Window {}/{} done", window + 1, total)
            }
            PipelineProgress::LineRendered {
                window,
                stem,
                octave,
                line,
                fallback: true,
            } => log::warn!(
                "Window {} {} octave {} line {} kept its unshifted voice",
                window,
                stem,
                octave,
                line
            ),
            PipelineProgress::Complete { output, duration_secs } => {
                log::info!("Finished {:?} in {:.1}s", output, duration_secs)
            }
            other => log::debug!("{:?}", other),
        }
    }
}

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args()?;

    if args.write_default_config {
        save_config(&Config::default(), &args.config_path)?;
        log::info!("Wrote default configuration to {:?}", args.config_path);
        if args.songs.is_empty() {
            return Ok(());
        }
    }

    if args.songs.is_empty() {
        bail!("no input songs given (see --help)");
    }

    let mut config: Config = load_config(&args.config_path);
    config.validate();
    let collaborators = Collaborators::from_commands(&config);

    let (progress_tx, progress_rx) = mpsc::channel();
    let progress_thread = thread::spawn(move || log_progress(progress_rx));

    let acappellifier = Acappellifier::new(config, collaborators).with_progress(progress_tx);

    let mut failures = 0;
    for song in &args.songs {
        match acappellifier.acappellify(song) {
            Ok(output) => println!("{}", output.display()),
            Err(e) => {
                failures += 1;
                log::error!("{:?}: {:#}", song, anyhow::Error::new(e));
            }
        }
    }

    drop(acappellifier);
    let _ = progress_thread.join();

    if failures > 0 {
        bail!("{} of {} song(s) failed", failures, args.songs.len());
    }
    Ok(())
}

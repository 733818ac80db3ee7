//! Audio file decoding and WAV writing
//!
//! Decoding goes through Symphonia so any container the separator or
//! synthesizer emits can be read back. Everything the pipeline writes is
//! 32-bit float WAV.

use std::fs::File;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::AudioBuffer;
use crate::error::{AcappellaError, Result};

/// Decode an audio file into an [`AudioBuffer`]
pub fn read_audio(path: &Path) -> Result<AudioBuffer> {
    let decode_err = |reason: String| AcappellaError::AudioDecode {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| AcappellaError::io(path, e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_err("No audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_err("Unknown sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("read_audio: Error reading packet from {:?}: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("read_audio: Error decoding packet from {:?}: {}", path, e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    log::debug!(
        "read_audio: {:?} -> {} samples, {} Hz, {} ch",
        path,
        samples.len(),
        sample_rate,
        channels
    );

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Write a buffer as a 32-bit float WAV file, creating parent directories
pub fn write_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AcappellaError::io(parent, e))?;
    }

    let encode_err = |e: hound::Error| AcappellaError::AudioEncode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let spec = WavSpec {
        channels: buffer.channels(),
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(encode_err)?;
    for &sample in buffer.samples() {
        writer.write_sample(sample).map_err(encode_err)?;
    }
    writer.finalize().map_err(encode_err)?;

    log::debug!("write_wav: Wrote {:.2}s to {:?}", buffer.duration_secs(), path);
    Ok(())
}

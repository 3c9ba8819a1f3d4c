use anyhow::{bail, Context, Result};
use log::{debug, info};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

/// Decoded multi-channel recording, one sample vector per sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Trace {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f64>>,
}

pub fn load_trace<P: AsRef<Path>>(path: P) -> Result<Trace> {
    let path = path.as_ref();
    info!("Loading trace from {}", path.display());

    let file = File::open(path).with_context(|| format!("Failed to open trace file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(BufReader::new(file))), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe()
        .format(&hint, mss, &fmt_opts, &meta_opts)
        .with_context(|| "Failed to probe trace format")?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .with_context(|| "No supported tracks found")?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params.sample_rate.with_context(|| "Trace has no sample rate")?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs()
        .make(&codec_params, &dec_opts)
        .with_context(|| "Failed to create decoder")?;

    let mut channels: Vec<Vec<f64>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::ResetRequired) => {
                debug!("Decoder reset required");
                continue;
            }
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let duration = decoded.capacity() as u64;
                if duration == 0 {
                    continue;
                }
                let count = spec.channels.count();
                if channels.is_empty() {
                    channels = vec![Vec::new(); count];
                }

                let mut sample_buf = SampleBuffer::<f64>::new(duration, spec);
                sample_buf.copy_interleaved_ref(decoded);
                for frame in sample_buf.samples().chunks(count) {
                    for (ch, &x) in channels.iter_mut().zip(frame) {
                        ch.push(x);
                    }
                }
            }
            Err(symphonia::core::errors::Error::DecodeError(_)) => {
                debug!("Decode error encountered, skipping packet");
                continue;
            }
            Err(e) => bail!("Decode error: {}", e),
        }
    }

    info!(
        "Loaded {} channels x {} samples at {}Hz",
        channels.len(),
        channels.first().map_or(0, Vec::len),
        sample_rate
    );
    Ok(Trace { sample_rate, channels })
}

/// Writes one sensor as mono 16-bit PCM scaled to its own peak.
pub fn save_trace<P: AsRef<Path>>(path: P, samples: &[f64], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    if samples.is_empty() {
        bail!("Cannot write an empty trace to {}", path.display());
    }
    info!("Saving trace to {}", path.display());

    let bits_per_sample = 16u16;
    let block_align = bits_per_sample / 8;
    let byte_rate = sample_rate * block_align as u32;
    let data_size = (samples.len() * block_align as usize) as u32;
    debug!("Writing WAV: rate={}, size={}", sample_rate, data_size);

    let mut file = BufWriter::new(
        File::create(path).with_context(|| format!("Failed to create trace file: {}", path.display()))?,
    );
    file.write_all(b"RIFF")?;
    file.write_all(&(36 + data_size).to_le_bytes())?;
    file.write_all(b"WAVE")?;

    file.write_all(b"fmt ")?;
    file.write_all(&16u32.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&1u16.to_le_bytes())?;
    file.write_all(&sample_rate.to_le_bytes())?;
    file.write_all(&byte_rate.to_le_bytes())?;
    file.write_all(&block_align.to_le_bytes())?;
    file.write_all(&bits_per_sample.to_le_bytes())?;

    file.write_all(b"data")?;
    file.write_all(&data_size.to_le_bytes())?;

    let peak = samples.iter().fold(0.0f64, |m, x| m.max(x.abs()));
    let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };
    for &sample in samples {
        let v = (sample * scale).clamp(-1.0, 1.0);
        file.write_all(&((v * 32767.0) as i16).to_le_bytes())?;
    }
    file.flush()?;
    Ok(())
}

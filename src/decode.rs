use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("WAV decode error: {0}")]
    Wav(#[from] hound::Error),
    #[error("FLAC decode error: {0}")]
    Flac(#[from] claxon::Error),
    #[error("File contains no audio samples")]
    Empty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decoded mono audio at the rate the segmentation core expects.
#[derive(Debug)]
pub struct MonoBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoBuffer {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Load an audio file as a mono f32 buffer at `target_rate`.
///
/// Multi-channel input is averaged down to mono; files at a different sample
/// rate are linearly resampled. The segmentation core itself never resamples —
/// that responsibility ends here.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<MonoBuffer, DecodeError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let (interleaved, channels, file_rate) = match ext.as_str() {
        "wav" => decode_wav(path)?,
        "flac" => decode_flac(path)?,
        other => return Err(DecodeError::UnsupportedFormat(other.to_string())),
    };

    if interleaved.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mono = mix_to_mono(&interleaved, channels);
    let samples = if file_rate == target_rate {
        mono
    } else {
        log::debug!(
            "Resampling {} from {} Hz to {} Hz",
            path.display(),
            file_rate,
            target_rate
        );
        resample_linear(&mono, file_rate, target_rate)
    };

    Ok(MonoBuffer {
        samples,
        sample_rate: target_rate,
    })
}

/// Decode a WAV file to interleaved f32 samples.
fn decode_wav(path: &Path) -> Result<(Vec<f32>, u16, u32), DecodeError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?
        }
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok((samples, spec.channels, spec.sample_rate))
}

/// Decode a FLAC file to interleaved f32 samples.
fn decode_flac(path: &Path) -> Result<(Vec<f32>, u16, u32), DecodeError> {
    let mut reader = claxon::FlacReader::open(path)?;
    let info = reader.streaminfo();
    let max_val = (1i64 << (info.bits_per_sample - 1)) as f32;

    let samples: Vec<f32> = reader
        .samples()
        .map(|s| s.map(|v| v as f32 / max_val))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((samples, info.channels as u16, info.sample_rate))
}

/// Average interleaved channels down to mono.
fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let ch = channels as usize;
    interleaved
        .chunks(ch)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler. Good enough for onset timing; this is a
/// loader concern, upstream of all analysis.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() || from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx.min(input.len() - 1)];
            let b = input[(idx + 1).min(input.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::{debug, info};

use super::MediaError;

/// Decoded WAV audio. Samples are interleaved frames.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub spec: WavSpec,
    pub samples: Samples,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Int(v) => v.len(),
            Samples::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecodedAudio {
    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.samples.len() / self.spec.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.spec.sample_rate as f64
    }
}

/// Decode a WAV byte stream.
pub fn decode(bytes: &[u8]) -> Result<DecodedAudio, MediaError> {
    let reader = WavReader::new(Cursor::new(bytes))
        .map_err(|e| MediaError::AudioFormat(format!("not a WAV stream: {e}")))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Int => Samples::Int(
            reader
                .into_samples::<i32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MediaError::AudioFormat(format!("corrupt samples: {e}")))?,
        ),
        SampleFormat::Float => Samples::Float(
            reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| MediaError::AudioFormat(format!("corrupt samples: {e}")))?,
        ),
    };

    Ok(DecodedAudio { spec, samples })
}

/// Encode interleaved samples as a WAV byte stream.
pub fn encode(audio: &DecodedAudio) -> Result<Vec<u8>, MediaError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, audio.spec)
            .map_err(|e| MediaError::AudioFormat(format!("cannot write WAV: {e}")))?;
        let res = match &audio.samples {
            Samples::Int(v) => v.iter().try_for_each(|s| writer.write_sample(*s)),
            Samples::Float(v) => v.iter().try_for_each(|s| writer.write_sample(*s)),
        };
        res.map_err(|e| MediaError::AudioFormat(format!("cannot write sample: {e}")))?;
        writer
            .finalize()
            .map_err(|e| MediaError::AudioFormat(format!("cannot finalize WAV: {e}")))?;
    }
    Ok(cursor.into_inner())
}

/// Wrap headerless 16-bit little-endian PCM in a WAV container.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Vec<u8>, MediaError> {
    if pcm.len() % 2 != 0 {
        return Err(MediaError::AudioFormat(format!(
            "PCM payload has odd length {}",
            pcm.len()
        )));
    }
    let samples = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32)
        .collect();
    encode(&DecodedAudio {
        spec: WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
        samples: Samples::Int(samples),
    })
}

/// Concatenate WAV buffers in the given order.
///
/// Every input must share channel count, sample rate, bit depth and sample
/// format with the first one; a mismatch is reported rather than resampled.
pub fn concatenate_audio<B: AsRef<[u8]>>(buffers: &[B]) -> Result<Vec<u8>, MediaError> {
    if buffers.is_empty() {
        return Err(MediaError::NoInput);
    }

    let decoded = buffers
        .iter()
        .enumerate()
        .map(|(i, b)| {
            decode(b.as_ref()).map_err(|e| match e {
                MediaError::AudioFormat(msg) => MediaError::AudioFormat(format!("input {}: {msg}", i + 1)),
                other => other,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let spec = decoded[0].spec;
    for (i, a) in decoded.iter().enumerate().skip(1) {
        if a.spec != spec {
            return Err(MediaError::AudioFormat(format!(
                "input {} is {} ch / {} Hz / {}-bit {:?}, expected {} ch / {} Hz / {}-bit {:?}",
                i + 1,
                a.spec.channels,
                a.spec.sample_rate,
                a.spec.bits_per_sample,
                a.spec.sample_format,
                spec.channels,
                spec.sample_rate,
                spec.bits_per_sample,
                spec.sample_format,
            )));
        }
    }

    let total: usize = decoded.iter().map(|a| a.samples.len()).sum();
    debug!(inputs = decoded.len(), total_samples = total, "concatenating audio");

    let samples = match spec.sample_format {
        SampleFormat::Int => {
            let mut out = Vec::with_capacity(total);
            for a in &decoded {
                if let Samples::Int(v) = &a.samples {
                    out.extend_from_slice(v);
                }
            }
            Samples::Int(out)
        }
        SampleFormat::Float => {
            let mut out = Vec::with_capacity(total);
            for a in &decoded {
                if let Samples::Float(v) = &a.samples {
                    out.extend_from_slice(v);
                }
            }
            Samples::Float(out)
        }
    };

    let combined = DecodedAudio { spec, samples };
    info!(
        "Combined {} audio segments ({:.2}s)",
        decoded.len(),
        combined.duration_secs()
    );
    encode(&combined)
}

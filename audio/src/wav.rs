use crate::{layout, Decoded, Spec};
use anyhow::Context;
use asset::Handle;
use hound::{SampleFormat, WavReader};

/// `RIFF`, four bytes of chunk size, `WAVE`.
pub const MAGIC: &str = "RIFF????WAVE";

/// Decodes RIFF WAVE files. Integer PCM is scaled to `[-1, 1)`.
pub fn decode(handle: &Handle) -> anyhow::Result<Decoded> {
    decode_wav(handle).context("failed to decode WAV")
}

fn decode_wav(handle: &Handle) -> anyhow::Result<Decoded> {
    let reader = WavReader::new(handle.reader())?;
    let wav = reader.spec();

    let channels = layout::from_channel_count(usize::from(wav.channels))?;
    let interleaved = match wav.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (wav.bits_per_sample.saturating_sub(1) as u32)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Decoded {
        spec: Spec {
            channels,
            frequency: wav.sample_rate,
        },
        samples: interleaved.len(),
        interleaved,
    })
}

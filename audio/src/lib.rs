//! Audio assets.
//!
//! Decoders registered for the audio media kind turn a mapped file into an
//! interleaved `f32` buffer. [`planarize`] then splits that buffer into one
//! plane per channel.

use asset::format::{self, Registry};
use asset::{Cache, Handle};
use log::{trace, warn};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

mod channel;
pub mod layout;
mod wav;

pub use channel::Channel;

use channel::format_channels;

/// Media kind name used in error messages.
pub const KIND: &str = "audio";

/// Formats known to [`load`].
static REGISTRY: Lazy<Registry<Decoded>> = Lazy::new(|| {
    let registry = Registry::new();
    registry.register(wav::MAGIC, wav::decode);
    registry
});

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] format::Error),
    #[error("invalid audio spec: {0}")]
    InvalidSpec(&'static str),
    #[error("unsupported channel count {0}")]
    UnsupportedChannelCount(usize),
    #[error("unsupported channels {}", format_channels(.0))]
    UnsupportedChannels(Vec<Channel>),
}

/// Channel order and sample rate of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spec {
    pub channels: Vec<Channel>,
    pub frequency: u32,
}

/// One dense buffer of samples per channel.
pub type Track = HashMap<Channel, Vec<f32>>;

/// Output of an audio decoder.
///
/// `interleaved` holds `samples` values; value `i` belongs to channel
/// `spec.channels[i % spec.channels.len()]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub spec: Spec,
    pub samples: usize,
    pub interleaved: Vec<f32>,
}

/// Decoded audio in planar form.
#[derive(Debug, Clone)]
pub struct AudioAsset {
    track: Track,
    spec: Spec,
    duration_seconds: f64,
    duration_samples: usize,
}

impl AudioAsset {
    #[inline]
    pub fn track(&self) -> &Track {
        &self.track
    }

    #[inline]
    pub fn spec(&self) -> &Spec {
        &self.spec
    }

    /// Computed as `samples / frequency / channels`.
    #[inline]
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Number of samples in each channel plane.
    #[inline]
    pub fn duration_samples(&self) -> usize {
        self.duration_samples
    }
}

/// Splits an interleaved buffer into one plane per channel.
///
/// Only the first `samples` values of `interleaved` are used. Any values
/// past that are dropped (with a warning), and a shorter buffer yields
/// shorter planes. Durations are always computed from `samples`.
pub fn planarize(spec: Spec, samples: usize, interleaved: &[f32]) -> Result<AudioAsset, Error> {
    if spec.channels.is_empty() {
        return Err(Error::InvalidSpec("no channels"));
    }
    if spec.frequency == 0 {
        return Err(Error::InvalidSpec("zero frequency"));
    }
    if samples != interleaved.len() {
        warn!(
            "Decoder reported {} samples but produced {}",
            samples,
            interleaved.len()
        );
    }

    let count = spec.channels.len();
    let per_channel = samples / count;

    let mut track: Track = spec
        .channels
        .iter()
        .map(|c| (*c, Vec::with_capacity(per_channel)))
        .collect();

    for (i, sample) in interleaved.iter().take(samples).enumerate() {
        if let Some(plane) = track.get_mut(&spec.channels[i % count]) {
            plane.push(*sample);
        }
    }

    let duration_seconds = samples as f64 / f64::from(spec.frequency) / count as f64;

    Ok(AudioAsset {
        track,
        spec,
        duration_seconds,
        duration_samples: per_channel,
    })
}

/// Registers a new audio format. `magic` may contain `?` wildcards.
pub fn register_format<F>(magic: &str, decoder: F)
where
    F: Fn(&Handle) -> anyhow::Result<Decoded> + Send + Sync + 'static,
{
    REGISTRY.register(magic, decoder);
}

/// Loads the audio file at `path` through the global cache.
pub fn load<P: AsRef<Path>>(path: P) -> Result<AudioAsset, Error> {
    load_with(Cache::global(), &REGISTRY, path)
}

/// Loads the audio file at `path` through `cache` using formats of `registry`.
pub fn load_with<P: AsRef<Path>>(
    cache: &Arc<Cache>,
    registry: &Registry<Decoded>,
    path: P,
) -> Result<AudioAsset, Error> {
    let handle = cache.load(path).map_err(|source| format::Error::Asset {
        kind: KIND,
        source,
    })?;

    decode_with(&handle, registry)
}

/// Decodes an already loaded file with the formats known to [`load`].
pub fn decode(handle: &Handle) -> Result<AudioAsset, Error> {
    decode_with(handle, &REGISTRY)
}

/// Decodes an already loaded file.
pub fn decode_with(handle: &Handle, registry: &Registry<Decoded>) -> Result<AudioAsset, Error> {
    let decoded = format::decode(handle, registry, KIND)?;

    trace!(
        "Decoded [{}]: {} samples, channels {}, {} Hz",
        handle.filename(),
        decoded.samples,
        format_channels(&decoded.spec.channels),
        decoded.spec.frequency
    );

    planarize(decoded.spec, decoded.samples, &decoded.interleaved)
}

#[cfg(test)]
mod tests {
    use crate::{planarize, Channel, Error, Spec};
    use matches::assert_matches;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;

    #[test]
    fn stereo_is_split() {
        let spec = Spec {
            channels: vec![Channel::Left, Channel::Right],
            frequency: 48000,
        };
        let interleaved = [0.0, 1.0, 0.1, 1.1, 0.2, 1.2];

        let asset = planarize(spec, interleaved.len(), &interleaved).unwrap();

        assert_eq!(asset.track()[&Channel::Left], vec![0.0, 0.1, 0.2]);
        assert_eq!(asset.track()[&Channel::Right], vec![1.0, 1.1, 1.2]);
        assert_eq!(asset.duration_samples(), 3);
        assert_eq!(asset.spec().frequency, 48000);
    }

    #[test]
    fn duration_divides_by_channels() {
        let spec = Spec {
            channels: vec![Channel::Left, Channel::Right],
            frequency: 4,
        };
        let interleaved = vec![0.0; 16];

        let asset = planarize(spec, 16, &interleaved).unwrap();

        assert!((asset.duration_seconds() - 2.0).abs() < f64::EPSILON);
        assert_eq!(asset.duration_samples(), 8);
    }

    #[test]
    fn values_past_sample_count_are_dropped() {
        let spec = Spec {
            channels: vec![Channel::Left, Channel::Right],
            frequency: 48000,
        };
        let interleaved = [0.0, 1.0, 0.1, 1.1, 0.2, 1.2];

        let asset = planarize(spec, 4, &interleaved).unwrap();

        assert_eq!(asset.track()[&Channel::Left], vec![0.0, 0.1]);
        assert_eq!(asset.track()[&Channel::Right], vec![1.0, 1.1]);
        assert_eq!(asset.duration_samples(), 2);
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let empty = Spec {
            channels: vec![],
            frequency: 44100,
        };
        let silent = Spec {
            channels: vec![Channel::Left],
            frequency: 0,
        };

        assert_matches!(planarize(empty, 0, &[]), Err(Error::InvalidSpec(_)));
        assert_matches!(planarize(silent, 1, &[0.5]), Err(Error::InvalidSpec(_)));
    }

    #[quickcheck]
    fn planes_hold_interleaved_samples(channels: u8, source: Vec<f32>) -> TestResult {
        let count = usize::from(channels % 8) + 1;
        let source = source
            .into_iter()
            .filter(|s| s.is_finite())
            .collect::<Vec<_>>();
        let channels = (0..count as u32)
            .map(Channel::from_ordinal)
            .collect::<Vec<_>>();
        let spec = Spec {
            channels: channels.clone(),
            frequency: 44100,
        };

        let asset = match planarize(spec, source.len(), &source) {
            Ok(asset) => asset,
            Err(_) => return TestResult::failed(),
        };

        let matches = source
            .iter()
            .enumerate()
            .all(|(i, s)| asset.track()[&channels[i % count]][i / count] == *s);

        TestResult::from_bool(matches && asset.duration_samples() == source.len() / count)
    }
}

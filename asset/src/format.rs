//! Registries of file formats and selection of a decoder by magic bytes.
//!
//! Each media kind (audio, voxel, ...) owns one [`Registry`] of formats.
//! A format is a magic byte pattern and a decoder. Loading an asset peeks
//! at the start of the file and runs the decoder of the first registered
//! format whose magic matches.

use crate::Handle;
use log::trace;
use parking_lot::RwLock;
use std::io::{BufRead, BufReader};
use std::sync::Arc;

/// Byte that matches any single byte in a magic pattern.
pub const WILDCARD: u8 = b'?';

/// Function that decodes a `T` from the bytes of an asset.
///
/// Decoders attach their own context to errors they return (eg.
/// "failed to decode as qbt format") so the chain reads from the most
/// general failure down to the root cause.
pub type Decoder<T> = Arc<dyn Fn(&Handle) -> anyhow::Result<T> + Send + Sync>;

/// Registered file format.
pub struct Format<T> {
    magic: Vec<u8>,
    decoder: Decoder<T>,
}

impl<T> Format<T> {
    #[inline]
    pub fn magic(&self) -> &[u8] {
        &self.magic
    }

    #[inline]
    pub fn decode(&self, handle: &Handle) -> anyhow::Result<T> {
        (self.decoder)(handle)
    }
}

impl<T> Clone for Format<T> {
    fn clone(&self) -> Self {
        Self {
            magic: self.magic.clone(),
            decoder: self.decoder.clone(),
        }
    }
}

/// Append-only list of formats.
///
/// Readers take an immutable snapshot of the list, registration copies
/// the list, appends and publishes the new one. Registration order is
/// preserved and decides which format wins when multiple magics match.
pub struct Registry<T> {
    formats: RwLock<Arc<[Format<T>]>>,
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            formats: RwLock::new(Arc::from(Vec::new())),
        }
    }

    /// Registers a new format. `magic` may contain `?` which matches
    /// any byte at that position.
    pub fn register<F>(&self, magic: &str, decoder: F)
    where
        F: Fn(&Handle) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let mut formats = self.formats.write();
        let mut next = formats.to_vec();

        next.push(Format {
            magic: magic.as_bytes().to_vec(),
            decoder: Arc::new(decoder),
        });

        *formats = Arc::from(next);
    }

    /// Returns the formats registered at the time of the call.
    pub fn snapshot(&self) -> Arc<[Format<T>]> {
        self.formats.read().clone()
    }

    pub fn len(&self) -> usize {
        self.formats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.read().is_empty()
    }
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors of [`decode`]. `kind` names the media kind, eg. `"audio"`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load {kind}")]
    Asset {
        kind: &'static str,
        #[source]
        source: crate::Error,
    },
    #[error("failed to load {kind}")]
    Peek {
        kind: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to load {kind}, unknown format")]
    UnknownFormat { kind: &'static str },
    #[error("failed to load {kind}")]
    Decode {
        kind: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Returns whether `prefix` matches the `magic` pattern. Both must have the
/// same length.
pub fn magic_matches(magic: &[u8], prefix: &[u8]) -> bool {
    magic.len() == prefix.len()
        && magic
            .iter()
            .zip(prefix)
            .all(|(m, b)| *m == WILDCARD || m == b)
}

/// Decodes the asset with the first format in `registry` whose magic
/// matches the beginning of the file.
pub fn decode<T>(handle: &Handle, registry: &Registry<T>, kind: &'static str) -> Result<T, Error> {
    let formats = registry.snapshot();
    let mut reader = BufReader::new(handle.reader());

    for format in formats.iter() {
        let magic = format.magic();

        if handle.size() < magic.len() {
            continue;
        }

        let prefix = peek(&mut reader, magic.len()).map_err(|source| Error::Peek { kind, source })?;

        if !magic_matches(magic, prefix) {
            continue;
        }

        trace!(
            "Decoding [{}] as {} with magic {:?}",
            handle.filename(),
            kind,
            String::from_utf8_lossy(magic)
        );

        return format
            .decode(handle)
            .map_err(|source| Error::Decode { kind, source });
    }

    Err(Error::UnknownFormat { kind })
}

/// Returns the next `n` bytes of `reader` without consuming them.
fn peek<R: BufRead>(reader: &mut R, n: usize) -> std::io::Result<&[u8]> {
    let buf = reader.fill_buf()?;
    if buf.len() < n {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(&buf[..n])
}

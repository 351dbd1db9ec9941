//! Voxel model collections.
//!
//! A collection maps model names to dense RGBA voxel grids. Decoders are
//! picked by magic bytes from the voxel [`Registry`]; the QB 2 tree format
//! is registered by default.

use asset::format::{self, Registry};
use asset::{Cache, Handle};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::Arc;

pub mod qbt;

/// Media kind name used in error messages.
pub const KIND: &str = "voxel";

/// What a voxel decoder produces: models by name.
pub type Models = HashMap<String, Model>;

static REGISTRY: Lazy<Registry<Models>> = Lazy::new(|| {
    let registry = Registry::new();
    registry.register(qbt::MAGIC, qbt::decode);
    registry
});

/// Size of a voxel grid in voxels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Extent {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Extent {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// Number of bytes of an RGBA grid of this size, `None` on overflow.
    pub fn rgba_len(&self) -> Option<usize> {
        (self.x as usize)
            .checked_mul(self.y as usize)?
            .checked_mul(self.z as usize)?
            .checked_mul(4)
    }
}

impl Display for Extent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}x{}", self.x, self.y, self.z)
    }
}

/// Dense RGBA voxel grid.
///
/// Voxel `(x, y, z)` starts at byte `(x + X*y + X*Y*z) * 4`. Empty voxels
/// are all zeros.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub data: Vec<u8>,
    pub size: Extent,
}

impl Model {
    /// Returns the RGBA value of the voxel at `(x, y, z)`.
    pub fn voxel(&self, x: u32, y: u32, z: u32) -> Option<[u8; 4]> {
        if x >= self.size.x || y >= self.size.y || z >= self.size.z {
            return None;
        }
        let (sx, sy) = (self.size.x as usize, self.size.y as usize);
        let index = (x as usize + sx * y as usize + sx * sy * z as usize) * 4;
        let mut rgba = [0u8; 4];
        rgba.copy_from_slice(self.data.get(index..index + 4)?);
        Some(rgba)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Collection {
    models: Models,
}

impl Collection {
    pub fn new(models: Models) -> Self {
        Self { models }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.get(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model names in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Model)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Registers a new voxel format. `magic` may contain `?` wildcards.
pub fn register_format<F>(magic: &str, decoder: F)
where
    F: Fn(&Handle) -> anyhow::Result<Models> + Send + Sync + 'static,
{
    REGISTRY.register(magic, decoder);
}

/// Loads the voxel collection at `path` through the global cache.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Collection, format::Error> {
    load_with(Cache::global(), &REGISTRY, path)
}

/// Loads the voxel collection at `path` through `cache` using formats of
/// `registry`.
pub fn load_with<P: AsRef<Path>>(
    cache: &Arc<Cache>,
    registry: &Registry<Models>,
    path: P,
) -> Result<Collection, format::Error> {
    let handle = cache.load(path).map_err(|source| format::Error::Asset {
        kind: KIND,
        source,
    })?;

    decode_with(&handle, registry)
}

/// Decodes an already loaded file with the formats known to [`load`].
pub fn decode(handle: &Handle) -> Result<Collection, format::Error> {
    decode_with(handle, &REGISTRY)
}

pub fn decode_with(
    handle: &Handle,
    registry: &Registry<Models>,
) -> Result<Collection, format::Error> {
    let models = format::decode(handle, registry, KIND)?;
    debug!("Loaded {} voxel models from [{}]", models.len(), handle.filename());

    Ok(Collection::new(models))
}

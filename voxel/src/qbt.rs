//! Qubicle Binary Tree (`.qbt`) decoder.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! "QB 2" version:[u8; 2] reserved:[u8; 12]
//! "COLORMAP" count:u32 (must be 0)
//! "DATATREE" node
//!
//! node   = type:u32 size:u32 (matrix | model)
//! matrix = name_len:u32 name position:[u8; 12] scale:[u8; 12] pivot:[u8; 12]
//!          x:u32 y:u32 z:u32 data_len:u32 zlib(data)
//! model  = children:u32 node*
//! ```
//!
//! The matrix data is RGBA per voxel with `x` outermost, then `z`, with `y`
//! innermost.

use crate::{Extent, Model, Models};
use anyhow::Context;
use asset::Handle;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;
use log::{debug, trace};
use std::io::{BufRead, BufReader, Read};

pub const MAGIC: &str = "QB 2";

const VERSION: [u8; 2] = [1, 0];
const COLORMAP: &[u8; 8] = b"COLORMAP";
const DATATREE: &[u8; 8] = b"DATATREE";

/// Upper bound of the zlib expansion ratio. A payload can never inflate
/// to more than this many bytes per compressed byte.
const MAX_INFLATE_RATIO: usize = 1032;

const NODE_MATRIX: u32 = 0;
const NODE_MODEL: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unsupported version 0x{:02x}{:02x}", .0[0], .0[1])]
    UnsupportedVersion([u8; 2]),
    #[error("bad file structure")]
    BadStructure,
    #[error("colormap is unsupported")]
    ColormapUnsupported,
    #[error("bad node size 0 (node type {0})")]
    BadNodeSize(u32),
    #[error("bad name size 0")]
    BadNameSize,
    #[error("bad data size 0")]
    BadDataSize,
    #[error("invalid number of children 0")]
    BadChildCount,
    #[error("unknown node type {0}")]
    UnknownNodeType(u32),
    #[error("matrix of size {0} is too large")]
    TooLarge(Extent),
}

/// Decodes all matrices of a QB 2 file, keyed by matrix name.
pub fn decode(handle: &Handle) -> anyhow::Result<Models> {
    let mut reader = BufReader::new(handle.reader());
    let mut models = Models::new();

    read_tree(&mut reader, &mut models).context("failed to decode as qbt format")?;

    Ok(models)
}

fn read_tree<R: BufRead>(r: &mut R, models: &mut Models) -> anyhow::Result<()> {
    skip(r, MAGIC.len())?;

    let mut version = [0u8; 2];
    r.read_exact(&mut version)?;
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version).into());
    }

    skip(r, 12)?;

    expect_section(r, COLORMAP)?;
    if r.read_u32::<LittleEndian>()? != 0 {
        return Err(Error::ColormapUnsupported.into());
    }

    expect_section(r, DATATREE)?;
    read_node(r, models)
}

fn expect_section<R: Read>(r: &mut R, tag: &[u8; 8]) -> anyhow::Result<()> {
    let mut section = [0u8; 8];
    r.read_exact(&mut section)?;
    if &section != tag {
        return Err(Error::BadStructure.into());
    }
    Ok(())
}

fn read_node<R: BufRead>(r: &mut R, models: &mut Models) -> anyhow::Result<()> {
    let node_type = r.read_u32::<LittleEndian>()?;
    let size = r.read_u32::<LittleEndian>()?;

    if size == 0 {
        return Err(Error::BadNodeSize(node_type).into());
    }

    match node_type {
        NODE_MATRIX => read_matrix(r, models).context("failed to load matrix"),
        NODE_MODEL => read_model(r, models).context("failed to load model"),
        t => Err(Error::UnknownNodeType(t).into()),
    }
}

fn read_model<R: BufRead>(r: &mut R, models: &mut Models) -> anyhow::Result<()> {
    let children = r.read_u32::<LittleEndian>()?;
    if children == 0 {
        return Err(Error::BadChildCount.into());
    }

    for _ in 0..children {
        read_node(r, models)?;
    }
    Ok(())
}

fn read_matrix<R: BufRead>(r: &mut R, models: &mut Models) -> anyhow::Result<()> {
    let name_size = r.read_u32::<LittleEndian>()?;
    if name_size == 0 {
        return Err(Error::BadNameSize.into());
    }

    let mut name = Vec::new();
    r.by_ref().take(u64::from(name_size)).read_to_end(&mut name)?;
    if name.len() != name_size as usize {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    let name = String::from_utf8_lossy(&name).into_owned();

    // position, local scale and pivot
    skip(r, 3 * 12)?;

    let size = Extent {
        x: r.read_u32::<LittleEndian>()?,
        y: r.read_u32::<LittleEndian>()?,
        z: r.read_u32::<LittleEndian>()?,
    };

    let data_size = r.read_u32::<LittleEndian>()?;
    if data_size == 0 {
        return Err(Error::BadDataSize.into());
    }

    let mut compressed = Vec::new();
    r.by_ref()
        .take(u64::from(data_size))
        .read_to_end(&mut compressed)?;
    if compressed.len() != data_size as usize {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }

    let len = size
        .rgba_len()
        .filter(|len| *len <= compressed.len().saturating_mul(MAX_INFLATE_RATIO))
        .ok_or(Error::TooLarge(size))?;
    let mut data = vec![0u8; len];
    let mut voxels = ZlibDecoder::new(compressed.as_slice());

    let (sx, sy) = (size.x as usize, size.y as usize);
    for x in 0..size.x {
        for z in 0..size.z {
            for y in 0..size.y {
                let mut voxel = [0u8; 4];
                voxels
                    .read_exact(&mut voxel)
                    .context("failed to decode voxels")
                    .with_context(|| format!("failed to load voxel {} {} {}", x, y, z))?;

                if voxel[3] == 0 {
                    continue;
                }

                voxel[3] = 255;
                let index = (size.x - 1 - x) as usize * 4
                    + sx * y as usize * 4
                    + sx * sy * z as usize * 4;
                data[index..index + 4].copy_from_slice(&voxel);
            }
        }
    }

    trace!("Decoded matrix {:?} of size {}", name, size);
    if models.contains_key(&name) {
        debug!("Matrix {:?} appears more than once, keeping the last one", name);
    }
    models.insert(name, Model { data, size });

    Ok(())
}

fn skip<R: Read>(r: &mut R, n: usize) -> std::io::Result<()> {
    let skipped = std::io::copy(&mut r.by_ref().take(n as u64), &mut std::io::sink())?;
    if skipped != n as u64 {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

//! Read-only memory mapping of files on disk.
//!
//! The cache never touches the file system directly. It asks a [`Mapper`]
//! for a [`Region`] and keeps that region alive for as long as some handle
//! references it. Dropping the region is what releases the mapping.

use log::debug;
use memmap2::Mmap;
use std::fs::File;
use std::io;
use std::path::Path;

/// An immutable view of the bytes of one mapped file.
///
/// The bytes must stay at the same address and must not change for the
/// whole lifetime of the region.
pub trait Region: Send + Sync + 'static {
    fn as_bytes(&self) -> &[u8];
}

impl Region for Mmap {
    fn as_bytes(&self) -> &[u8] {
        self
    }
}

/// Region of a zero-length file. Mapping zero bytes is rejected by
/// some platforms, so empty files never reach `mmap`.
struct EmptyRegion;

impl Region for EmptyRegion {
    fn as_bytes(&self) -> &[u8] {
        &[]
    }
}

/// Something that can turn a path into a mapped [`Region`].
pub trait Mapper: Send + Sync + 'static {
    fn map(&self, path: &Path) -> io::Result<Box<dyn Region>>;
}

/// The default [`Mapper`] backed by `memmap2`.
///
/// On unix this is `mmap(PROT_READ, MAP_SHARED)`, on windows a
/// read-only file mapping view. The file handle is closed before `map`
/// returns in both the success and the error path; the mapping itself
/// does not need it.
#[derive(Debug, Default, Copy, Clone)]
pub struct MmapMapper;

impl Mapper for MmapMapper {
    fn map(&self, path: &Path) -> io::Result<Box<dyn Region>> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        if len == 0 {
            debug!("Mapping {:?} as empty region", path);
            return Ok(Box::new(EmptyRegion));
        }

        // the mapping is read-only. other processes modifying the file
        // while it is mapped is outside of what we can guard against.
        let mmap = unsafe { Mmap::map(&file)? };
        debug!("Mapped {:?} ({} bytes)", path, len);

        Ok(Box::new(mmap))
    }
}

/// A mapped file together with the name it was requested under.
pub struct MappedFile {
    name: String,
    region: Box<dyn Region>,
}

impl MappedFile {
    pub fn new(name: String, region: Box<dyn Region>) -> Self {
        Self { name, region }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.region.as_bytes()
    }

    /// Address of the first byte of the mapping.
    #[inline]
    pub fn base_address(&self) -> *const u8 {
        self.region.as_bytes().as_ptr()
    }
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("name", &self.name)
            .field("size", &self.bytes().len())
            .finish()
    }
}

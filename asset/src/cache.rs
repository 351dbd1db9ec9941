//! Process-wide cache of mapped files and handles to them.
//!
//! The cache is a `HashMap` from path to a shared entry protected by
//! `RwLock`. Lookups take the read lock only, inserts and evictions take
//! the write lock. Every entry carries an atomic count of live handles;
//! the entry (and its mapping) is dropped when the last handle is dropped.

use crate::mapper::{MappedFile, Mapper, MmapMapper};
use crate::Error;
use log::{error, trace};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The cache used by [`crate::load`] and the default file systems.
static GLOBAL: Lazy<Arc<Cache>> = Lazy::new(|| Cache::new(MmapMapper));

struct Entry {
    file: MappedFile,
    refs: Arc<Refs>,
}

/// Number of live `Handle`s of one entry.
///
/// Handles keep the counter in a separate allocation so they can let go
/// of the entry itself before giving back their reference. Whoever evicts
/// the entry then owns the last reference to it.
struct Refs {
    path: PathBuf,
    count: AtomicUsize,
}

impl Refs {
    /// Increments the count unless it already dropped to zero.
    ///
    /// A zero count means some handle is about to evict the entry and
    /// is waiting for the write lock. Such entry must not be handed out
    /// from the read-locked path.
    fn acquire(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| match n {
                0 => None,
                n => Some(n + 1),
            })
            .is_ok()
    }
}

/// Thread-safe cache of mapped files keyed by the path they were loaded from.
///
/// Paths are compared as given, without any conversion to UTF-8. At most
/// one mapping exists for each path. Loading a path that is already
/// mapped only increments a counter.
pub struct Cache {
    entries: RwLock<HashMap<PathBuf, Arc<Entry>>>,
    mapper: Box<dyn Mapper>,
}

impl Cache {
    /// Creates a new empty cache that maps files with the specified `Mapper`.
    pub fn new<M: Mapper>(mapper: M) -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            mapper: Box::new(mapper),
        })
    }

    /// Returns the process-wide cache.
    pub fn global() -> &'static Arc<Cache> {
        &GLOBAL
    }

    /// Returns a handle to the file at `path`, mapping it if no other
    /// handle to it is currently alive.
    ///
    /// Errors are never cached. A failed load is retried by the next call.
    ///
    /// Note: this function may block on the write lock while another thread
    /// maps a file.
    pub fn load<P: AsRef<Path>>(self: &Arc<Self>, path: P) -> Result<Handle, Error> {
        let path = path.as_ref();
        let name = path.to_string_lossy();

        // first we try to resolve the request only with read lock.
        if let Some(entry) = self.entries.read().get(path) {
            if entry.refs.acquire() {
                trace!("Loading [{}] from cache", name);
                return Ok(Handle::new(self.clone(), entry.clone()));
            }
        }

        let mut entries = self.entries.write();

        // be sure it wasn't added between dropping the read lock and
        // acquiring the write lock.
        if let Some(entry) = entries.get(path) {
            trace!("Loading [{}] from cache", name);
            // eviction needs this lock and re-checks the count, so bumping
            // a zero count here cancels the pending eviction.
            entry.refs.count.fetch_add(1, Ordering::AcqRel);
            return Ok(Handle::new(self.clone(), entry.clone()));
        }

        trace!("Loading [{}] from disk", name);

        let region = self.mapper.map(path).map_err(|source| {
            error!("Cannot map [{}]: {}", name, source);
            Error::Load {
                path: name.to_string(),
                source,
            }
        })?;

        let entry = Arc::new(Entry {
            file: MappedFile::new(name.into_owned(), region),
            refs: Arc::new(Refs {
                path: path.to_path_buf(),
                count: AtomicUsize::new(1),
            }),
        });
        entries.insert(path.to_path_buf(), entry.clone());

        Ok(Handle::new(self.clone(), entry))
    }

    /// Number of files currently mapped by this cache.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns whether the file at `path` is currently mapped.
    pub fn contains<P: AsRef<Path>>(&self, path: P) -> bool {
        self.entries.read().contains_key(path.as_ref())
    }

    /// Returns the number of live handles to the file at `path` or `None`
    /// if the file is not mapped.
    pub fn ref_count<P: AsRef<Path>>(&self, path: P) -> Option<usize> {
        self.entries
            .read()
            .get(path.as_ref())
            .map(|e| e.refs.count.load(Ordering::Acquire))
    }

    /// Gives back one reference. Called exactly once per handle, after the
    /// handle dropped its `Arc<Entry>`.
    fn release(&self, refs: &Refs) {
        if refs.count.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }

        let mut entries = self.entries.write();

        // the entry might have been revived (or evicted and replaced) by
        // a `load` that won the write lock before us.
        let evict = match entries.get(&refs.path) {
            Some(current) => {
                std::ptr::eq(&*current.refs, refs) && refs.count.load(Ordering::Acquire) == 0
            }
            None => false,
        };

        if evict {
            trace!("Removing [{}] from cache", refs.path.display());
            // no handle holds the entry anymore, so this unmaps the file
            // while the write lock is still held.
            drop(entries.remove(&refs.path));
        }
    }
}

/// A counted reference to a mapped file.
///
/// The bytes of the file stay mapped at least as long as the handle lives.
/// Cloning the handle registers another reference; each clone is dropped
/// independently.
pub struct Handle {
    cache: Arc<Cache>,
    entry: ManuallyDrop<Arc<Entry>>,
}

impl Handle {
    fn new(cache: Arc<Cache>, entry: Arc<Entry>) -> Self {
        Self {
            cache,
            entry: ManuallyDrop::new(entry),
        }
    }

    /// Length of the mapped file in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.entry.file.bytes().len()
    }

    /// The path this handle was loaded with. Parts of the path that are
    /// not valid UTF-8 are replaced with U+FFFD.
    #[inline]
    pub fn filename(&self) -> &str {
        self.entry.file.name()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        self.entry.file.bytes()
    }

    /// Returns a new reader positioned at the start of the file. Readers
    /// do not share their position.
    #[inline]
    pub fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(self.bytes())
    }

    /// Calls `f` with the address of the first byte and the length of the
    /// mapping.
    ///
    /// The pointer is only valid inside `f`. Native code that needs the
    /// memory for longer must keep a clone of this handle alive for as long
    /// as it uses the pointer.
    pub fn with_base_address<R, F>(&self, f: F) -> R
    where
        F: FnOnce(*const u8, usize) -> R,
    {
        f(self.entry.file.base_address(), self.size())
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        // we hold a reference so the count can't be zero here.
        self.entry.refs.count.fetch_add(1, Ordering::AcqRel);
        Self::new(self.cache.clone(), Arc::clone(&*self.entry))
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        // SAFETY: `entry` is not accessed after this point.
        let entry = unsafe { ManuallyDrop::take(&mut self.entry) };
        let refs = entry.refs.clone();

        // the cache still holds the entry while our reference is counted,
        // so this never unmaps.
        drop(entry);
        self.cache.release(&refs);
    }
}

impl AsRef<[u8]> for Handle {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("filename", &self.filename())
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::Cache;
    use crate::mapper::MmapMapper;
    use crate::Error;
    use matches::assert_matches;
    use std::io::{Read, Write};

    fn fixture(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn handle_exposes_file() {
        let file = fixture(b"hello world");
        let path = file.path().to_str().unwrap();
        let cache = Cache::new(MmapMapper);

        let handle = cache.load(path).unwrap();

        assert_eq!(handle.size(), 11);
        assert_eq!(handle.filename(), path);
        assert_eq!(handle.bytes(), b"hello world");
    }

    #[test]
    fn readers_are_independent() {
        let file = fixture(b"abcdef");
        let cache = Cache::new(MmapMapper);
        let handle = cache.load(file.path()).unwrap();

        let mut first = handle.reader();
        let mut second = handle.reader();
        let mut buf = [0u8; 3];

        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn second_load_shares_mapping() {
        let file = fixture(b"0123456789");
        let cache = Cache::new(MmapMapper);

        let a = cache.load(file.path()).unwrap();
        let b = cache.load(file.path()).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.ref_count(file.path()), Some(2));
        assert_eq!(
            a.with_base_address(|ptr, _| ptr as usize),
            b.with_base_address(|ptr, _| ptr as usize)
        );
    }

    #[test]
    fn last_drop_evicts() {
        let file = fixture(b"0123456789");
        let cache = Cache::new(MmapMapper);

        let a = cache.load(file.path()).unwrap();
        let b = a.clone();
        assert_eq!(cache.ref_count(file.path()), Some(2));

        drop(a);
        assert!(cache.contains(file.path()));
        assert_eq!(b.bytes(), b"0123456789");

        drop(b);
        assert!(!cache.contains(file.path()));
        assert!(cache.is_empty());
    }

    #[test]
    fn empty_file_has_zero_size() {
        let file = fixture(b"");
        let cache = Cache::new(MmapMapper);

        let handle = cache.load(file.path()).unwrap();
        let mut buf = Vec::new();

        assert_eq!(handle.size(), 0);
        assert_eq!(handle.reader().read_to_end(&mut buf).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_distinct() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join(OsStr::from_bytes(b"a\xff"));
        let b = dir.path().join(OsStr::from_bytes(b"a\xfe"));
        std::fs::write(&a, b"AAAA").unwrap();
        std::fs::write(&b, b"BBBBBBBB").unwrap();
        let cache = Cache::new(MmapMapper);

        let first = cache.load(&a).unwrap();
        let second = cache.load(&b).unwrap();

        assert_eq!(first.bytes(), b"AAAA");
        assert_eq!(second.bytes(), b"BBBBBBBB");
        assert_eq!(second.size(), 8);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.ref_count(&a), Some(1));
        assert_eq!(cache.ref_count(&b), Some(1));
    }

    #[test]
    fn failed_load_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.bin");
        let cache = Cache::new(MmapMapper);

        assert_matches!(cache.load(&path), Err(Error::Load { .. }));
        assert!(cache.is_empty());

        std::fs::write(&path, b"now it exists").unwrap();
        let handle = cache.load(&path).unwrap();

        assert_eq!(handle.bytes(), b"now it exists");
    }
}

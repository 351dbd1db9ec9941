use asset::mapper::{Mapper, Region};
use asset::{Cache, Error, FileSystem};
use matches::assert_matches;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

/// Counts map and release calls and the number of regions alive per path.
#[derive(Default)]
struct Stats {
    maps: AtomicUsize,
    releases: AtomicUsize,
    live: parking_lot::Mutex<HashMap<String, usize>>,
    max_live: AtomicUsize,
}

struct CountingRegion {
    name: String,
    bytes: Vec<u8>,
    stats: Arc<Stats>,
}

impl Region for CountingRegion {
    fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Drop for CountingRegion {
    fn drop(&mut self) {
        self.stats.releases.fetch_add(1, Ordering::SeqCst);
        *self.stats.live.lock().get_mut(&self.name).unwrap() -= 1;
    }
}

/// Serves files from memory instead of the disk.
struct MemoryMapper {
    files: HashMap<String, Vec<u8>>,
    stats: Arc<Stats>,
}

impl Mapper for MemoryMapper {
    fn map(&self, path: &Path) -> io::Result<Box<dyn Region>> {
        let name = path.to_string_lossy().into_owned();
        let bytes = self
            .files
            .get(&name)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        self.stats.maps.fetch_add(1, Ordering::SeqCst);
        {
            let mut live = self.stats.live.lock();
            let count = live.entry(name.clone()).or_insert(0);
            *count += 1;
            self.stats.max_live.fetch_max(*count, Ordering::SeqCst);
        }

        Ok(Box::new(CountingRegion {
            name,
            bytes,
            stats: self.stats.clone(),
        }))
    }
}

fn memory_cache(files: &[(&str, &[u8])]) -> (Arc<Cache>, Arc<Stats>) {
    let stats = Arc::new(Stats::default());
    let mapper = MemoryMapper {
        files: files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_vec()))
            .collect(),
        stats: stats.clone(),
    };
    (Cache::new(mapper), stats)
}

#[test]
fn concurrent_loads_map_once() {
    let (cache, stats) = memory_cache(&[("a.bin", b"0123456789")]);
    let barrier = Arc::new(Barrier::new(2));

    let threads = (0..2)
        .map(|_| {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                cache.load("a.bin").unwrap()
            })
        })
        .collect::<Vec<_>>();

    let handles = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .collect::<Vec<_>>();

    assert_eq!(stats.maps.load(Ordering::SeqCst), 1);
    assert_eq!(
        handles[0].with_base_address(|ptr, _| ptr as usize),
        handles[1].with_base_address(|ptr, _| ptr as usize)
    );

    drop(handles);

    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);
    assert!(cache.is_empty());
}

#[test]
fn reload_after_eviction_maps_again() {
    let (cache, stats) = memory_cache(&[("a.bin", b"abc")]);

    drop(cache.load("a.bin").unwrap());
    drop(cache.load("a.bin").unwrap());

    assert_eq!(stats.maps.load(Ordering::SeqCst), 2);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 2);
}

#[test]
fn clone_keeps_mapping_alive() {
    let (cache, stats) = memory_cache(&[("a.bin", b"abc")]);

    let handle = cache.load("a.bin").unwrap();
    let copy = handle.clone();
    drop(handle);

    assert_eq!(stats.releases.load(Ordering::SeqCst), 0);
    assert_eq!(copy.bytes(), b"abc");
    assert_eq!(cache.ref_count("a.bin"), Some(1));

    drop(copy);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);
}

#[test]
fn drop_races_with_load() {
    let (cache, stats) = memory_cache(&[("a.bin", b"0123456789")]);

    for _ in 0..200 {
        let handle = cache.load("a.bin").unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let dropper = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                drop(handle);
            })
        };

        let loader = {
            let cache = cache.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                let handle = cache.load("a.bin").unwrap();
                // the mapping must stay readable while we hold the handle
                let mut content = Vec::new();
                handle.reader().read_to_end(&mut content).unwrap();
                content
            })
        };

        dropper.join().unwrap();
        assert_eq!(loader.join().unwrap(), b"0123456789");
        assert!(cache.is_empty());
    }

    assert_eq!(
        stats.maps.load(Ordering::SeqCst),
        stats.releases.load(Ordering::SeqCst)
    );
}

#[test]
fn many_threads_never_map_twice() {
    let (cache, stats) = memory_cache(&[("a.bin", b"a"), ("b.bin", b"bb")]);

    let threads = (0..8)
        .map(|i| {
            let cache = cache.clone();
            thread::spawn(move || {
                let name = if i % 2 == 0 { "a.bin" } else { "b.bin" };
                for _ in 0..500 {
                    let handle = cache.load(name).unwrap();
                    let copy = handle.clone();
                    assert_eq!(copy.filename(), name);
                    assert_eq!(copy.size(), if name == "a.bin" { 1 } else { 2 });
                }
            })
        })
        .collect::<Vec<_>>();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(stats.max_live.load(Ordering::SeqCst), 1);
    assert_eq!(
        stats.maps.load(Ordering::SeqCst),
        stats.releases.load(Ordering::SeqCst)
    );
    assert!(cache.is_empty());
}

#[test]
fn missing_file_is_wrapped() {
    let (cache, stats) = memory_cache(&[]);

    let err = cache.load("missing.bin").err().unwrap();

    assert_eq!(err.to_string(), "failed to load asset \"missing.bin\"");
    assert_matches!(err, Error::Load { ref source, .. } if source.kind() == io::ErrorKind::NotFound);
    assert_eq!(stats.maps.load(Ordering::SeqCst), 0);
}

#[test]
fn file_system_shares_cache() {
    let (cache, stats) = memory_cache(&[("root/a.bin", b"abc")]);
    let fs = FileSystem::with_cache("root", cache.clone());

    let a = fs.open("a.bin").unwrap();
    let b = cache.load("root/a.bin").unwrap();

    assert_eq!(a.filename(), "root/a.bin");
    assert_eq!(b.filename(), "root/a.bin");
    assert_eq!(stats.maps.load(Ordering::SeqCst), 1);
}

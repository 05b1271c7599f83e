use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use constants::{events, keys, LFC_RECORD_SIZE};
use tracing::{instrument, trace, warn};

use crate::errors::CacheError;
use crate::index::{self, Record};

#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    size: u64,
}

struct State {
    index_file: File,
    /// slot offset, keyed by cache key.
    slots: HashMap<u64, Slot>,
    /// LRU order, least-recently-used first.
    order: Vec<u64>,
    free_slots: Vec<u64>,
    max_position: u64,
    current_size: u64,
}

/// A durable, bounded, least-recently-used cache over `(data file, sidecar
/// file)` pairs keyed by a 64-bit URL hash.
///
/// Every method that touches shared state acquires `inner` for its whole
/// body; the `*_locked` helpers assume the lock is already held and must
/// never be called without it, so there is no reentrancy to reason about.
pub struct Lfc {
    root: PathBuf,
    max_size: u64,
    inner: Mutex<State>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn mtime_millis(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or_else(now_millis)
}

impl Lfc {
    /// Opens (creating if necessary) the cache rooted at `root`, scanning its
    /// index file and rebuilding in-memory LRU order from the stored
    /// timestamps.
    #[instrument(skip(root), fields(root = %root.as_ref().display()))]
    pub fn open(root: impl AsRef<Path>, max_size: u64) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let index_path = root.join("index");
        let mut index_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)?;

        let records = index::scan_records(&mut index_file)?;

        let mut slots = HashMap::new();
        let mut free_slots = Vec::new();
        let mut current_size = 0u64;
        let mut live: Vec<(u64, u64, u64)> = Vec::new(); // (key, offset, time)

        for (offset, record) in &records {
            if record.is_tombstone() {
                free_slots.push(*offset);
            } else {
                slots.insert(
                    record.key,
                    Slot {
                        offset: *offset,
                        size: record.size,
                    },
                );
                current_size += record.size;
                live.push((record.key, *offset, record.time));
            }
        }

        live.sort_by_key(|(_, _, time)| *time);
        let order = live.into_iter().map(|(key, _, _)| key).collect();

        let max_position = records.len() as u64 * LFC_RECORD_SIZE;

        trace!({ keys::EVENT } = events::EVENT_LFC_OPEN, entries = slots.len());

        Ok(Lfc {
            root,
            max_size,
            inner: Mutex::new(State {
                index_file,
                slots,
                order,
                free_slots,
                max_position,
                current_size,
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Total bytes accounted for by currently resident entries.
    pub fn current_size(&self) -> u64 {
        self.inner.lock().unwrap().current_size
    }

    pub fn data_path(&self, key: u64) -> PathBuf {
        self.root.join(format!("{key:x}"))
    }

    pub fn sidecar_path(&self, key: u64) -> PathBuf {
        self.root.join(format!("{key:x}.i"))
    }

    /// Flushes and drops the in-memory state. The cache may be reopened with
    /// [`Lfc::open`] afterward.
    pub fn close(self) {
        trace!({ keys::EVENT } = events::EVENT_LFC_CLOSE);
        // `inner`'s File is dropped (and thus flushed/closed) along with self.
    }

    /// Deletes every entry and the index file, then reopens an empty cache
    /// at the same root.
    #[instrument(skip(self))]
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut state = self.inner.lock().unwrap();

        for key in state.slots.keys().copied().collect::<Vec<_>>() {
            let _ = std::fs::remove_file(self.data_path(key));
            let _ = std::fs::remove_file(self.sidecar_path(key));
        }

        state.slots.clear();
        state.order.clear();
        state.free_slots.clear();
        state.current_size = 0;
        state.max_position = 0;
        state.index_file.set_len(0)?;

        trace!({ keys::EVENT } = events::EVENT_LFC_CLEAR);
        Ok(())
    }

    /// Returns the data-file path for `key`, marking it most-recently-used
    /// if it is currently resident.
    #[instrument(skip(self), fields(key = key))]
    pub fn get_file(&self, key: u64) -> PathBuf {
        let mut state = self.inner.lock().unwrap();

        if let Some(slot) = state.slots.get(&key).copied() {
            let time = now_millis();
            if let Err(err) = index::write_record_at(
                &mut state.index_file,
                slot.offset,
                Record {
                    key,
                    size: slot.size,
                    time,
                },
            ) {
                warn!("failed to update LRU timestamp for {key:x}: {err}");
            }
            touch_locked(&mut state.order, key);
            trace!({ keys::EVENT } = events::EVENT_LFC_GET_FILE, resident = true);
        } else {
            trace!({ keys::EVENT } = events::EVENT_LFC_GET_FILE, resident = false);
        }

        self.data_path(key)
    }

    /// Recomputes `key`'s size from its data and sidecar files on disk
    /// (either may be absent), evicting least-recently-used entries until the
    /// result fits under `max_size`, then records the new entry.
    #[instrument(skip(self), fields(key = key))]
    pub fn update(&self, key: u64) -> Result<(), CacheError> {
        let data_path = self.data_path(key);
        let sidecar_path = self.sidecar_path(key);

        let data_len = std::fs::metadata(&data_path).map(|m| m.len()).unwrap_or(0);
        let sidecar_len = std::fs::metadata(&sidecar_path)
            .map(|m| m.len())
            .unwrap_or(0);
        let incoming_size = data_len + sidecar_len;
        let time = mtime_millis(&data_path);

        let mut state = self.inner.lock().unwrap();

        let prior_offset = state.slots.get(&key).copied().map(|prior| {
            state.current_size -= prior.size;
            remove_locked(&mut state.order, key);
            prior.offset
        });

        evict_locked(self, &mut state, incoming_size)?;

        let offset = match prior_offset {
            Some(offset) => offset,
            None => match state.free_slots.pop() {
                Some(offset) => offset,
                None => {
                    let offset = state.max_position;
                    state.max_position += LFC_RECORD_SIZE;
                    offset
                }
            },
        };

        index::write_record_at(
            &mut state.index_file,
            offset,
            Record {
                key,
                size: incoming_size,
                time,
            },
        )?;

        state.slots.insert(
            key,
            Slot {
                offset,
                size: incoming_size,
            },
        );
        state.current_size += incoming_size;
        state.order.push(key);

        trace!(
            { keys::EVENT } = events::EVENT_LFC_UPDATE,
            { keys::SIZE } = incoming_size
        );

        Ok(())
    }
}

fn touch_locked(order: &mut Vec<u64>, key: u64) {
    remove_locked(order, key);
    order.push(key);
}

fn remove_locked(order: &mut Vec<u64>, key: u64) {
    if let Some(pos) = order.iter().position(|&k| k == key) {
        order.remove(pos);
    }
}

fn evict_locked(lfc: &Lfc, state: &mut State, incoming_size: u64) -> Result<(), CacheError> {
    while state.current_size + incoming_size > lfc.max_size && !state.order.is_empty() {
        let victim = state.order.remove(0);
        let Some(slot) = state.slots.remove(&victim) else {
            continue;
        };

        index::tombstone_at(&mut state.index_file, slot.offset)?;
        state.free_slots.push(slot.offset);
        state.current_size -= slot.size;

        let _ = std::fs::remove_file(lfc.data_path(victim));
        let _ = std::fs::remove_file(lfc.sidecar_path(victim));

        trace!(
            { keys::EVENT } = events::EVENT_LFC_EVICT,
            { keys::KEY } = victim
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread::sleep;
    use std::time::Duration;

    fn scratch_dir(name: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("lfc-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn write_entry(lfc: &Lfc, key: u64, size: usize) {
        std::fs::write(lfc.data_path(key), vec![0u8; size]).unwrap();
        lfc.update(key).unwrap();
        sleep(Duration::from_millis(2));
    }

    #[test]
    #[serial]
    fn evicts_least_recently_used_under_budget() {
        let dir = scratch_dir("s1");
        let lfc = Lfc::open(&dir, 300).unwrap();

        write_entry(&lfc, 1, 100);
        write_entry(&lfc, 2, 100);
        write_entry(&lfc, 3, 100);
        let _ = lfc.get_file(1);
        sleep(Duration::from_millis(2));
        write_entry(&lfc, 4, 150);

        assert!(lfc.data_path(1).exists());
        assert!(lfc.data_path(4).exists());
        assert!(!lfc.data_path(2).exists());
        assert!(!lfc.data_path(3).exists());
        assert_eq!(lfc.current_size(), 250);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    #[serial]
    fn get_file_marks_most_recently_used() {
        let dir = scratch_dir("s2");
        let lfc = Lfc::open(&dir, 1_000_000).unwrap();

        write_entry(&lfc, 1, 10);
        write_entry(&lfc, 2, 10);
        let _ = lfc.get_file(1);

        let state = lfc.inner.lock().unwrap();
        assert_eq!(state.order.last().copied(), Some(1));

        drop(state);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    #[serial]
    fn reopen_restores_lru_order_from_timestamps() {
        let dir = scratch_dir("s3");
        {
            let lfc = Lfc::open(&dir, 1_000_000).unwrap();
            write_entry(&lfc, 1, 10);
            write_entry(&lfc, 2, 10);
        }

        let reopened = Lfc::open(&dir, 1_000_000).unwrap();
        let state = reopened.inner.lock().unwrap();
        assert_eq!(state.order, vec![1, 2]);

        drop(state);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    #[serial]
    fn trailing_partial_record_is_ignored() {
        let dir = scratch_dir("s4");
        let lfc = Lfc::open(&dir, 1_000_000).unwrap();
        write_entry(&lfc, 1, 10);
        drop(lfc);

        let index_path = dir.join("index");
        let mut bytes = std::fs::read(&index_path).unwrap();
        bytes.push(0xAB);
        std::fs::write(&index_path, &bytes).unwrap();

        let reopened = Lfc::open(&dir, 1_000_000).unwrap();
        let state = reopened.inner.lock().unwrap();
        assert_eq!(state.order, vec![1]);

        drop(state);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    #[serial]
    fn updating_a_resident_key_reuses_its_slot() {
        let dir = scratch_dir("s5");
        let lfc = Lfc::open(&dir, 1_000_000).unwrap();

        write_entry(&lfc, 1, 10);
        let reused_offset = lfc.inner.lock().unwrap().slots.get(&1).unwrap().offset;

        write_entry(&lfc, 1, 20);

        {
            let state = lfc.inner.lock().unwrap();
            assert_eq!(state.slots.get(&1).unwrap().offset, reused_offset);
            assert_eq!(state.order, vec![1]);
            assert_eq!(state.current_size, 20);
            assert!(state.free_slots.is_empty());
        }
        drop(lfc);

        let reopened = Lfc::open(&dir, 1_000_000).unwrap();
        let state = reopened.inner.lock().unwrap();
        assert_eq!(state.order, vec![1]);
        assert_eq!(state.current_size, 20);

        drop(state);
        std::fs::remove_dir_all(&dir).ok();
    }
}

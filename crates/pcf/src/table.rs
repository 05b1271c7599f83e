//! Process-wide table deduplicating [`PcfShared`] instances by URL, so at
//! most one backs a given URL at a time regardless of how many [`Pcf`]
//! handles are open on it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{Mutex as AsyncMutex, OnceCell};

use crate::pcf::PcfShared;

type Table = Mutex<HashMap<String, Arc<PcfShared>>>;

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Finds or creates the shared entry for `url`, incrementing its reference
/// count.
pub(crate) fn accrue(url: &str, key: u64, data_path: PathBuf, sidecar_path: PathBuf) -> Arc<PcfShared> {
    let mut table = table().lock().unwrap();

    let shared = table
        .entry(url.to_string())
        .or_insert_with(|| {
            Arc::new(PcfShared {
                url: url.to_string(),
                key,
                data_path,
                sidecar_path,
                ref_count: AtomicUsize::new(0),
                init: OnceCell::new(),
                state: AsyncMutex::new(None),
            })
        })
        .clone();

    shared.ref_count.fetch_add(1, Ordering::SeqCst);
    shared
}

/// Decrements `shared`'s reference count. Returns `true` if this was the
/// last reference, in which case the entry has been removed from the table.
pub(crate) fn release(shared: &Arc<PcfShared>) -> bool {
    if shared.ref_count.fetch_sub(1, Ordering::SeqCst) != 1 {
        return false;
    }

    let mut table = table().lock().unwrap();
    table.remove(&shared.url);
    true
}

/// Clears every live entry, used when the range proxy shuts down.
pub fn clear_all() {
    table().lock().unwrap().clear();
}

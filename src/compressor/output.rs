use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Fresh `compressed_<unix millis>_<sequence>.mp4` path under `dir`, which
/// is created if missing. The sequence keeps names unique within a process
/// even when two runs start in the same millisecond.
pub fn allocate_output_path(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let name = format!(
        "compressed_{}_{}.mp4",
        Utc::now().timestamp_millis(),
        sequence
    );
    Ok(dir.join(name))
}

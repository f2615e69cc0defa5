//! Atomic per-thread snapshot persistence: write to a sibling `.tmp` file,
//! fsync, then rename over the destination (§4.8). Same idiom as the
//! registry's snapshot persistence, applied to one file per thread.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::ConversationError;

pub fn thread_path(data_dir: &Path, thread_id: &str) -> PathBuf {
    data_dir.join(format!("{thread_id}.json"))
}

pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), ConversationError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        let bytes = serde_json::to_vec_pretty(value)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
    }
    Ok(())
}

pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, ConversationError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2a_types::ThreadState;

    #[test]
    fn round_trips_a_thread_through_atomic_rename() {
        let dir = tempfile::tempdir().unwrap();
        let path = thread_path(dir.path(), "thread-1");
        let state = ThreadState::new("thread-1");

        save_snapshot(&path, &state).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded: ThreadState = load_snapshot(&path).unwrap();
        assert_eq!(loaded.thread_id, "thread-1");
    }
}

//! Atomic snapshot persistence: write to a sibling `.tmp` file, fsync, then
//! rename over the destination (§4.5). Grounded on the teacher's
//! write-temp-then-rename blob persistence in its recovery WAL.

use std::io::Write;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::RegistryError;

pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), RegistryError> {
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

pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

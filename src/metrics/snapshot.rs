//! Snapshot file writer. The collector rewrites each file wholesale on
//! every poll cycle; readers only ever see a complete document.

use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to write snapshot file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn write_snapshot<T: Serialize>(path: &Path, snapshot: &T) -> Result<(), SnapshotError> {
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, json)?;
    log::debug!("snapshot written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn rewrites_the_file_wholesale() {
        let path = std::env::temp_dir().join(format!(
            "review_benchmark_snapshot_{}.json",
            std::process::id()
        ));

        let mut metrics = BTreeMap::new();
        metrics.insert("xact_commit", 100i64);
        metrics.insert("deadlocks", 0);
        write_snapshot(&path, &metrics).unwrap();

        let mut smaller = BTreeMap::new();
        smaller.insert("xact_commit", 150i64);
        write_snapshot(&path, &smaller).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, i64> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["xact_commit"], 150);

        let _ = fs::remove_file(&path);
    }
}

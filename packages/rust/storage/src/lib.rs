//! File-backed persistence for citegraph.
//!
//! Two JSON files make up the persisted state of a run:
//! - the change cache ([`ChangeCache`]): document file name → last parsed mtime
//! - the graph artifact ([`load_artifact`], [`write_artifact`])
//!
//! **Write rules:** both files are only ever replaced atomically (temp file +
//! rename), and the pipeline writes the cache strictly after the artifact.

mod artifact;
mod cache;

use std::path::Path;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use sha2::{Digest, Sha256};
use tracing::debug;

use citegraph_shared::{CitegraphError, Result};

pub use artifact::{ArtifactMeta, LoadedArtifact, load_artifact, write_artifact};
pub use cache::ChangeCache;

/// Indentation used for every JSON file we write.
const JSON_INDENT: &[u8] = b"    ";

/// Serialize `data` as pretty JSON with four-space indentation.
pub(crate) fn to_json_bytes<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(JSON_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    data.serialize(&mut serializer)
        .map_err(|e| CitegraphError::Storage(format!("JSON serialization failed: {e}")))?;
    Ok(out)
}

/// Write `bytes` to `path` atomically (write to a sibling temp file, then rename).
///
/// Returns the hex SHA-256 of the written bytes.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<String> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| CitegraphError::io(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CitegraphError::Storage(format!("invalid file path {}", path.display())))?;
    let temp = parent.join(format!("{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| CitegraphError::io(&temp, e))?;

    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(CitegraphError::io(path, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = format!("{:x}", hasher.finalize());

    debug!(path = %path.display(), size = bytes.len(), "wrote JSON file");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_uses_four_space_indent_and_raw_unicode() {
        let bytes = to_json_bytes(&serde_json::json!({"title": "Réseau"})).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\n    \"title\": \"Réseau\"\n}");
    }

    #[test]
    fn write_atomic_creates_parents_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        let hash = write_atomic(&path, b"hello world").unwrap();
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
        assert!(!dir.path().join("nested").join("out.json.tmp").exists());
    }

    #[test]
    fn write_atomic_fails_when_target_is_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("taken");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        assert!(write_atomic(&target, b"{}").is_err());
        assert!(!dir.path().join("taken.tmp").exists());
    }

    #[test]
    fn temp_file_is_named_after_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.json");
        std::fs::write(&target, b"old").unwrap();

        let blocked = dir.path().join("out.json.tmp");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();

        assert!(write_atomic(&target, b"new").is_err());
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }
}

//! Graph artifact persistence.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use citegraph_shared::{Artifact, CitegraphError, Node, Result};

use crate::{to_json_bytes, write_atomic};

/// Nodes recovered from a previously written artifact.
#[derive(Debug, Clone, Default)]
pub struct LoadedArtifact {
    /// Stored nodes in file order.
    pub nodes: Vec<Node>,
    /// Descriptions of stored entries that could not be used.
    pub dropped: Vec<String>,
}

/// Metadata about a written artifact file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Load the node list of an existing artifact.
///
/// Links are not read back; they are always rebuilt. A missing file gives an
/// empty node set, as does content that is not a JSON object with `nodes`
/// (logged). Any other read failure is an error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_artifact(path: &Path) -> Result<LoadedArtifact> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no artifact yet, starting from an empty graph");
            return Ok(LoadedArtifact::default());
        }
        Err(e) => return Err(CitegraphError::io(path, e)),
    };

    let stored_nodes = match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(mut root)) => match root.remove("nodes") {
            Some(Value::Array(nodes)) => nodes,
            _ => {
                warn!("artifact has no `nodes` list, starting from an empty graph");
                return Ok(LoadedArtifact::default());
            }
        },
        Ok(_) => {
            warn!("artifact is not a JSON object, starting from an empty graph");
            return Ok(LoadedArtifact::default());
        }
        Err(e) => {
            warn!(error = %e, "artifact is not valid JSON, starting from an empty graph");
            return Ok(LoadedArtifact::default());
        }
    };

    let mut loaded = LoadedArtifact::default();
    for (index, value) in stored_nodes.into_iter().enumerate() {
        let result = match value {
            Value::Object(map) => Node::from_metadata(map),
            other => Err(CitegraphError::validation(format!(
                "stored node is not an object: {other}"
            ))),
        };

        match result {
            Ok(node) => loaded.nodes.push(node),
            Err(e) => {
                warn!(index, error = %e, "dropping unusable stored node");
                loaded.dropped.push(format!("nodes[{index}]: {e}"));
            }
        }
    }

    debug!(nodes = loaded.nodes.len(), dropped = loaded.dropped.len(), "artifact loaded");
    Ok(loaded)
}

/// Write the artifact atomically and report its checksum.
#[instrument(skip_all, fields(path = %path.display(), nodes = artifact.nodes.len(), links = artifact.links.len()))]
pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<ArtifactMeta> {
    let bytes = to_json_bytes(artifact)?;
    let sha256 = write_atomic(path, &bytes)?;

    info!(size = bytes.len(), %sha256, "artifact written");

    Ok(ArtifactMeta {
        path: path.to_path_buf(),
        sha256,
        size_bytes: bytes.len(),
    })
}

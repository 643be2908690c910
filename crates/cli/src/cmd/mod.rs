pub mod inspect;
pub mod verify;

use anyhow::Context;
use std::path::Path;

/// Read a JSON document from `path`.
pub fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

//! Persistent agent identity.
//!
//! An agent is identified by a UUID v4 generated on first start and kept in
//! `<state_dir>/id`, so records from the same host stay attributable across
//! restarts.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uuid::Uuid;

use crate::settings::AgentSettings;

/// File name of the persisted identity.
pub const ID_FILE: &str = "id";

/// Resolve the agent id: the configured one if set, else the persisted one.
pub fn resolve(agent: &AgentSettings) -> Result<String> {
    match agent.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => load_or_create(&agent.state_dir()),
    }
}

/// Read the identity stored in `state_dir`, creating it if missing.
///
/// A file that does not hold a valid UUID is replaced.
pub fn load_or_create(state_dir: &Path) -> Result<String> {
    let path = state_dir.join(ID_FILE);

    match fs::read_to_string(&path) {
        Ok(contents) => match Uuid::parse_str(contents.trim()) {
            Ok(id) => return Ok(id.to_string()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "stored agent id is invalid, generating a new one");
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    }

    fs::create_dir_all(state_dir)
        .with_context(|| format!("failed to create state directory {}", state_dir.display()))?;
    let id = Uuid::new_v4().to_string();
    fs::write(&path, format!("{id}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(agent_id = %id, path = %path.display(), "generated agent id");
    Ok(id)
}

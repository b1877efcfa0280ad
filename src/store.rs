//! JSON state file used by the binary between runs.
//!
//! Holds History, the section cache and the last cycle's stats. The engine
//! itself knows nothing about files; this is the local stand-in for whatever
//! persistence a host application provides.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use crate::engine::CycleStats;
use crate::history::History;
use crate::scrapers::sections::SectionCache;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Everything that survives between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct State {
    pub history: History,
    pub sections: SectionCache,
    pub last_stats: Option<CycleStats>,
    pub saved_at: Option<DateTime<Utc>>,
}

/// Load state from `path`. A missing file is an empty state.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_state(path: impl AsRef<Path>) -> Result<State, StoreError> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No state file yet; starting empty");
            return Ok(State::default());
        }
        Err(e) => return Err(StoreError::io("reading", path, e)),
    };
    let state: State = serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;
    debug!(history = state.history.len(), sections = state.sections.len(), "Loaded state");
    Ok(state)
}

/// Write `state` to a sibling temp file, then rename it over `path`.
#[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
pub async fn save_state(path: impl AsRef<Path>, state: &State) -> Result<(), StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io("creating directory", parent, e))?;
    }

    let json = serde_json::to_vec_pretty(state).map_err(|source| StoreError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;
    let tmp = temp_path(path);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| StoreError::io("creating", &tmp, e))?;
    file.write_all(&json)
        .await
        .map_err(|e| StoreError::io("writing", &tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::io("syncing", &tmp, e))?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(StoreError::io("renaming into", path, e));
    }
    debug!(bytes = json.len(), "Saved state");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".into());
    path.with_file_name(format!(".{name}.tmp"))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::actions::Action;
use crate::{RecorderError, Result};

pub const SESSION_FORMAT_VERSION: u32 = 1;

/// On-disk session: pretty JSON, images inline as base64 PNG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub version: u32,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub actions: Vec<Action>,
}

impl SessionFile {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            version: SESSION_FORMAT_VERSION,
            name: name.into(),
            created_at: Utc::now(),
            actions,
        }
    }

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self
            .to_json()
            .map_err(|e| RecorderError::persistence(path, e))?;
        fs::write(path, json).map_err(|e| RecorderError::persistence(path, e))?;
        info!(path = %path.display(), actions = self.actions.len(), "Saved session");
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| RecorderError::persistence(path, e))?;
        let session: SessionFile =
            serde_json::from_str(&json).map_err(|e| RecorderError::persistence(path, e))?;
        if session.version > SESSION_FORMAT_VERSION {
            return Err(RecorderError::persistence(
                path,
                format!(
                    "session format version {} is newer than supported version {SESSION_FORMAT_VERSION}",
                    session.version
                ),
            ));
        }
        info!(path = %path.display(), actions = session.actions.len(), "Loaded session");
        Ok(session)
    }
}

pub fn save_actions(path: impl AsRef<Path>, name: &str, actions: &[Action]) -> Result<()> {
    SessionFile::new(name, actions.to_vec()).save_to_file(path)
}

pub fn load_actions(path: impl AsRef<Path>) -> Result<Vec<Action>> {
    Ok(SessionFile::load_from_file(path)?.actions)
}

//! Group blacklist, optionally persisted as a YAML list

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::application::errors::{BotError, ConfigError};

pub struct GroupBlacklist {
    groups: Mutex<Vec<String>>,
    file: Option<PathBuf>,
}

impl GroupBlacklist {
    pub fn new(groups: Vec<String>, file: Option<PathBuf>) -> Self {
        Self {
            groups: Mutex::new(groups),
            file,
        }
    }

    fn groups(&self) -> MutexGuard<'_, Vec<String>> {
        self.groups.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Merge the persisted list into the configured one
    pub async fn load(&self) -> Result<usize, BotError> {
        let Some(path) = &self.file else {
            return Ok(0);
        };
        if !tokio::fs::try_exists(path).await? {
            return Ok(0);
        }
        let content = tokio::fs::read_to_string(path).await?;
        let stored: Vec<String> = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

        let mut groups = self.groups();
        let mut added = 0;
        for group_id in stored {
            if !groups.contains(&group_id) {
                groups.push(group_id);
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.groups().iter().any(|g| g == group_id)
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.groups().clone()
    }

    /// Returns false when the group was already listed
    pub async fn insert(&self, group_id: &str) -> Result<bool, BotError> {
        {
            let mut groups = self.groups();
            if groups.iter().any(|g| g == group_id) {
                return Ok(false);
            }
            groups.push(group_id.to_string());
        }
        self.persist().await?;
        Ok(true)
    }

    /// Returns false when the group was not listed
    pub async fn remove(&self, group_id: &str) -> Result<bool, BotError> {
        {
            let mut groups = self.groups();
            let before = groups.len();
            groups.retain(|g| g != group_id);
            if groups.len() == before {
                return Ok(false);
            }
        }
        self.persist().await?;
        Ok(true)
    }

    async fn persist(&self) -> Result<(), BotError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&self.snapshot())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        tokio::fs::write(path, yaml).await?;
        tracing::debug!(path = %path.display(), "group blacklist saved");
        Ok(())
    }
}

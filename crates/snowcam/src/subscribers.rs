//! Chat ids that receive scheduled updates, persisted as a JSON array.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context as _, Result};

/// Ordered, deduplicated list of subscribed chat ids.
///
/// Read once at startup; every mutation rewrites the whole file.
pub struct SubscriberStore {
    path: PathBuf,
    ids: Vec<String>,
}

impl SubscriberStore {
    /// Loads the store. A missing or unreadable file yields an empty store.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = match read_ids(&path) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "Starting with no subscribers");
                Vec::new()
            }
        };
        Self { path, ids }
    }

    /// Writes the full list to disk.
    pub fn save(&self) -> Result<()> {
        let content =
            serde_json::to_string_pretty(&self.ids).context("Failed to serialize subscribers")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write subscriber store {}", self.path.display()))?;
        Ok(())
    }

    /// Adds `id`. Returns `false` without touching the file if it is already present.
    pub fn add(&mut self, id: &str) -> Result<bool> {
        if self.contains(id) {
            return Ok(false);
        }

        self.ids.push(id.to_string());
        if let Err(e) = self.save() {
            self.ids.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Removes `id`. Returns `false` without touching the file if it is absent.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        let Some(index) = self.ids.iter().position(|s| s == id) else {
            return Ok(false);
        };

        let removed = self.ids.remove(index);
        if let Err(e) = self.save() {
            self.ids.insert(index, removed);
            return Err(e);
        }
        Ok(true)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    pub fn list(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Adds configured ids that are not stored yet, saving once if anything changed.
    pub fn merge(&mut self, ids: &[String]) -> Result<()> {
        let before = self.ids.len();
        for id in ids {
            let id = id.trim();
            if !id.is_empty() && !self.contains(id) {
                self.ids.push(id.to_string());
            }
        }
        if self.ids.len() != before {
            self.save()?;
        }
        Ok(())
    }
}

fn read_ids(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path).context("Failed to read subscriber store")?;
    let ids: Vec<String> =
        serde_json::from_str(&content).context("Failed to parse subscriber store")?;

    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    Ok(unique)
}

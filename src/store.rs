use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::warn;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use crate::{settings::Settings, stats::Stats};

const SETTINGS_FILE: &str = "settings.json";
const STATS_FILE: &str = "stats.json";

/// File-backed accessor for the two persisted records.
///
/// Each record sits behind its own mutex, so every mutation is a serialized
/// read-modify-write transaction. Mutations persist to disk before the
/// in-memory record is committed; a failed write leaves memory untouched.
pub struct StateStore {
    settings_path: PathBuf,
    stats_path: PathBuf,
    settings: Mutex<Settings>,
    stats: Mutex<Stats>,
}

impl StateStore {
    /// Opens the store rooted at `dir`, seeding missing records with defaults.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;

        let settings_path = dir.join(SETTINGS_FILE);
        let stats_path = dir.join(STATS_FILE);
        let settings: Settings = load_or_seed(&settings_path)?;
        let stats: Stats = load_or_seed(&stats_path)?;

        Ok(Self {
            settings_path,
            stats_path,
            settings: Mutex::new(settings),
            stats: Mutex::new(stats),
        })
    }

    pub async fn settings(&self) -> Settings {
        self.settings.lock().await.clone()
    }

    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Mutates the settings record. The closure runs on a scratch copy that
    /// only replaces the live record once it has been written out.
    pub async fn update_settings<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Settings) -> T,
    {
        let mut guard = self.settings.lock().await;
        let mut next = guard.clone();
        let out = mutate(&mut next);
        persist(&self.settings_path, &next)?;
        *guard = next;
        Ok(out)
    }

    /// Mutates the stats record, with the same commit discipline as
    /// [`StateStore::update_settings`].
    pub async fn update_stats<F, T>(&self, mutate: F) -> Result<T>
    where
        F: FnOnce(&mut Stats) -> T,
    {
        let mut guard = self.stats.lock().await;
        let mut next = guard.clone();
        let out = mutate(&mut next);
        persist(&self.stats_path, &next)?;
        *guard = next;
        Ok(out)
    }
}

fn load_or_seed<T: Serialize + DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        let record = T::default();
        persist(path, &record)?;
        return Ok(record);
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    match serde_json::from_str(&contents) {
        Ok(record) => Ok(record),
        Err(err) => {
            warn!("{} is unreadable ({err}), falling back to defaults", path.display());
            Ok(T::default())
        }
    }
}

fn persist<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let serialized = serde_json::to_string_pretty(record)?;
    fs::write(path, serialized).with_context(|| format!("failed to write {}", path.display()))
}

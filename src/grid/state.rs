//! Grid lifecycle state and checkpoint persistence

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::errors::GridResult;
use super::ladder::Grid;
use super::types::GridProfitStats;

/// Lifecycle of a grid instance
///
/// `Closed` keeps the ladder it was built with; an `open` from `Closed` does
/// nothing.
#[derive(Debug, Clone, Default)]
pub enum GridState {
    #[default]
    Unopened,
    Open(Grid),
    Closed(Grid),
}

impl GridState {
    pub fn grid(&self) -> Option<&Grid> {
        match self {
            GridState::Unopened => None,
            GridState::Open(grid) | GridState::Closed(grid) => Some(grid),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, GridState::Open(_))
    }

    pub fn kind(&self) -> GridStateKind {
        match self {
            GridState::Unopened => GridStateKind::Unopened,
            GridState::Open(_) => GridStateKind::Open,
            GridState::Closed(_) => GridStateKind::Closed,
        }
    }
}

/// Serializable tag of [`GridState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GridStateKind {
    #[default]
    Unopened,
    Open,
    Closed,
}

/// Checkpoint written through the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub instance_id: String,
    pub state: GridStateKind,
    /// Ladder prices at checkpoint time, empty before the grid opens
    #[serde(default)]
    pub pins: Vec<Decimal>,
    pub profit_stats: GridProfitStats,
    /// Timestamp of last update, unix millis
    pub last_updated: u64,
}

impl GridSnapshot {
    pub fn new(
        instance_id: impl Into<String>,
        state: &GridState,
        profit_stats: &GridProfitStats,
    ) -> Self {
        let mut snapshot = Self {
            instance_id: instance_id.into(),
            state: state.kind(),
            pins: state
                .grid()
                .map(|grid| grid.pins().iter().map(|pin| pin.price()).collect())
                .unwrap_or_default(),
            profit_stats: profit_stats.clone(),
            last_updated: 0,
        };
        snapshot.touch();
        snapshot
    }

    /// Update timestamp
    pub fn touch(&mut self) {
        self.last_updated = chrono::Utc::now().timestamp_millis() as u64;
    }

    /// Load snapshot from file
    pub fn load_from_file(path: impl AsRef<Path>) -> GridResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content)?;
        Ok(snapshot)
    }

    /// Save snapshot to file atomically (write to temp, then rename)
    pub fn save_to_file_atomic(&self, path: impl AsRef<Path>) -> GridResult<()> {
        let path = path.as_ref();
        let temp_path = path.with_extension("tmp");

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;

        Ok(())
    }
}

/// Checkpoint collaborator keyed by instance id
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Write the latest snapshot for `snapshot.instance_id`
    async fn sync(&self, snapshot: &GridSnapshot) -> GridResult<()>;

    /// Last snapshot written for an instance
    async fn load(&self, instance_id: &str) -> GridResult<Option<GridSnapshot>>;
}

/// One JSON file per instance under a state directory
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> GridResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!("Grid state directory: {:?}", dir);
        Ok(Self { dir })
    }

    pub fn path_for(&self, instance_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", instance_id))
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn sync(&self, snapshot: &GridSnapshot) -> GridResult<()> {
        let path = self.path_for(&snapshot.instance_id);
        snapshot.save_to_file_atomic(&path)?;
        debug!("State saved to {:?}", path);
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> GridResult<Option<GridSnapshot>> {
        let path = self.path_for(instance_id);
        if !path.exists() {
            return Ok(None);
        }
        info!("Loading existing state from {:?}", path);
        GridSnapshot::load_from_file(&path).map(Some)
    }
}

/// In-process store for sessions without a state directory
#[derive(Default)]
pub struct MemoryStore {
    snapshots: RwLock<HashMap<String, GridSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn sync(&self, snapshot: &GridSnapshot) -> GridResult<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.instance_id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, instance_id: &str) -> GridResult<Option<GridSnapshot>> {
        Ok(self.snapshots.read().await.get(instance_id).cloned())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use crate::models::{RunConfig, TaskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Paused => "paused",
            RunPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Everything the orchestrator owns about the current run. This is also the
/// persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub phase: RunPhase,
    pub queue: Vec<String>,
    pub cursor: usize,
    pub config: RunConfig,
    pub results: BTreeMap<String, TaskResult>,
    pub original_items: Vec<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn idle(config: RunConfig) -> Self {
        Self {
            phase: RunPhase::Idle,
            queue: Vec::new(),
            cursor: 0,
            config,
            results: BTreeMap::new(),
            original_items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> usize {
        if self.queue.is_empty() {
            self.original_items.len()
        } else {
            self.queue.len()
        }
    }

    pub fn current_task(&self) -> Option<&str> {
        self.queue.get(self.cursor).map(String::as_str)
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    /// Repairs a record read back from storage so the run invariants hold.
    pub fn sanitized(mut self) -> Self {
        if self.cursor > self.queue.len() {
            self.cursor = self.queue.len();
        }
        let known: HashSet<&str> = self
            .original_items
            .iter()
            .chain(self.queue.iter())
            .map(String::as_str)
            .collect();
        self.results.retain(|task, _| known.contains(task.as_str()));
        self
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            phase: self.phase,
            cursor: self.cursor,
            total: self.total(),
            results: self.results.clone(),
            config: self.config.clone(),
            original_items: self.original_items.clone(),
        }
    }
}

/// Read-only view answered to status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub phase: RunPhase,
    pub cursor: usize,
    pub total: usize,
    pub results: BTreeMap<String, TaskResult>,
    pub config: RunConfig,
    pub original_items: Vec<String>,
}

//! Run statistics tracking.
//!
//! Counts what each handler did to the target during an apply run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;
use std::time::Instant;

/// Kind of object a handler acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    AssociatedGroup,
    Group,
    Member,
    Administrator,
    RoleDefinition,
    RoleAssignment,
    ListItem,
    ItemSecurity,
    CustomAction,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::AssociatedGroup => "associated_group",
            EntityKind::Group => "group",
            EntityKind::Member => "member",
            EntityKind::Administrator => "administrator",
            EntityKind::RoleDefinition => "role_definition",
            EntityKind::RoleAssignment => "role_assignment",
            EntityKind::ListItem => "list_item",
            EntityKind::ItemSecurity => "item_security",
            EntityKind::CustomAction => "custom_action",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of reconciling one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Created,
    Updated,
    Removed,
    /// Already in the desired state, or skipped by policy.
    Skipped,
    /// Skipped after a recoverable failure.
    FailedSkipped,
}

impl ActionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Created => "created",
            ActionType::Updated => "updated",
            ActionType::Removed => "removed",
            ActionType::Skipped => "skipped",
            ActionType::FailedSkipped => "failed_skipped",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Statistics for a provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Objects the handlers looked at.
    #[serde(default)]
    pub objects_processed: u32,
    /// Action counts keyed `<entity>.<action>`, e.g. `group.created`.
    #[serde(default)]
    pub actions_taken: BTreeMap<String, u32>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// Total duration in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

impl RunStatistics {
    /// Create new empty statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for one entity/action pair.
    #[must_use]
    pub fn action_count(&self, entity: EntityKind, action: ActionType) -> u32 {
        self.actions_taken
            .get(&action_key(entity, action))
            .copied()
            .unwrap_or(0)
    }

    /// Number of objects written (created, updated or removed).
    #[must_use]
    pub fn changes(&self) -> u32 {
        self.actions_taken
            .iter()
            .filter(|(key, _)| {
                key.ends_with(".created") || key.ends_with(".updated") || key.ends_with(".removed")
            })
            .map(|(_, count)| *count)
            .sum()
    }

    /// Merge with another statistics instance.
    pub fn merge(&mut self, other: &RunStatistics) {
        self.objects_processed += other.objects_processed;
        for (key, value) in &other.actions_taken {
            *self.actions_taken.entry(key.clone()).or_insert(0) += value;
        }
    }
}

fn action_key(entity: EntityKind, action: ActionType) -> String {
    format!("{entity}.{action}")
}

/// Thread-safe tracker for accumulating statistics during a run.
pub struct StatisticsTracker {
    objects_processed: AtomicU32,
    actions_taken: RwLock<HashMap<(EntityKind, ActionType), u32>>,
    started_at: DateTime<Utc>,
    start_time: Instant,
}

impl StatisticsTracker {
    /// Create a new tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects_processed: AtomicU32::new(0),
            actions_taken: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome for one object.
    pub fn record(&self, entity: EntityKind, action: ActionType) {
        self.objects_processed.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut map) = self.actions_taken.write() {
            *map.entry((entity, action)).or_insert(0) += 1;
        }
    }

    /// Get current processed count.
    pub fn processed_count(&self) -> u32 {
        self.objects_processed.load(Ordering::SeqCst)
    }

    /// Snapshot current statistics.
    pub fn snapshot(&self) -> RunStatistics {
        let actions_taken = self
            .actions_taken
            .read()
            .map(|map| {
                map.iter()
                    .map(|((entity, action), count)| (action_key(*entity, *action), *count))
                    .collect()
            })
            .unwrap_or_default();

        RunStatistics {
            objects_processed: self.objects_processed.load(Ordering::SeqCst),
            actions_taken,
            started_at: Some(self.started_at),
            finished_at: Some(Utc::now()),
            duration_ms: u64::try_from(self.start_time.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for StatisticsTracker {
    fn default() -> Self {
        Self::new()
    }
}

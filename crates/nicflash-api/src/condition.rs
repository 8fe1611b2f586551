//! Status conditions

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type describing the firmware update
pub const FLASH_CONDITION: &str = "Flashed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Why the `Flashed` condition has its status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum FlashReason {
    Unknown,
    InProgress,
    Failed,
    NotRequested,
    Succeeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: FlashReason,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// A `Flashed` condition stamped now
    pub fn flashed(
        status: ConditionStatus,
        reason: FlashReason,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: FLASH_CONDITION.to_string(),
            status,
            reason,
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Find a condition by type
#[must_use]
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Insert or replace a condition of the same type
///
/// The transition time is carried over when the status does not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

//! Collaborative plan update events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::foundation::{RoomId, Timestamp, UserId};

/// Operations a client may apply to a plan target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanOperation {
    Create,
    Update,
    Delete,
    Move,
    Reorder,
}

/// One collaborative edit to a lesson plan, fanned out to the room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdate {
    pub id: Uuid,
    pub room_id: RoomId,
    pub user_id: UserId,
    pub operation: PlanOperation,
    /// Target kind: `plan`, `activity`, `lesson`, ...
    pub target_type: String,
    pub target_id: String,
    pub changes: serde_json::Value,
    pub timestamp: Timestamp,
}

impl PlanUpdate {
    /// Creates a plan update with a fresh id and current timestamp.
    pub fn new(
        room_id: RoomId,
        user_id: UserId,
        operation: PlanOperation,
        target_type: impl Into<String>,
        target_id: impl Into<String>,
        changes: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            user_id,
            operation,
            target_type: target_type.into(),
            target_id: target_id.into(),
            changes,
            timestamp: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_deserializes_from_lowercase() {
        let op: PlanOperation = serde_json::from_str(r#""reorder""#).unwrap();
        assert_eq!(op, PlanOperation::Reorder);
        assert!(serde_json::from_str::<PlanOperation>(r#""rename""#).is_err());
    }

    #[test]
    fn plan_update_serializes_camel_case() {
        let update = PlanUpdate::new(
            RoomId::new("planning_1").unwrap(),
            UserId::new("alice").unwrap(),
            PlanOperation::Move,
            "activity",
            "42",
            serde_json::json!({"position": 3}),
        );
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains(r#""targetType":"activity""#));
        assert!(json.contains(r#""operation":"move""#));
    }
}

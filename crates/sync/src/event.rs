use serde::{Deserialize, Serialize};

/// What a reconciliation pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    TeamUpdate,
    MessageNew,
    TaskUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeData {
    pub team: String,
}

/// Wire shape: `{"type": "message_new", "data": {"team": "alpha"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub data: ChangeData,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, team: impl Into<String>) -> Self {
        Self {
            kind,
            data: ChangeData { team: team.into() },
        }
    }

    pub fn team(&self) -> &str {
        &self.data.team
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_wire_shape() {
        let event = ChangeEvent::new(ChangeKind::MessageNew, "alpha");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "message_new", "data": {"team": "alpha"}})
        );

        let back: ChangeEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.team(), "alpha");
    }
}

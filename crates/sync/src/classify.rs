use serde_json::Value;
use teamdeck_store::MessageType;

/// Substring rules applied to a structured payload's `type` field, first
/// match wins.  Producers emit suffixed variants (`shutdown_request`,
/// `shutdown_response`, ...) that must land in one bucket.
const TYPE_RULES: &[(&str, MessageType)] = &[
    ("idle", MessageType::Idle),
    ("shutdown", MessageType::Shutdown),
    ("task_assignment", MessageType::TaskAssignment),
    ("plan_approval", MessageType::PlanApproval),
];

/// Assign a semantic type to a raw message body.  Never fails: anything that
/// is not a JSON object with a recognised `type` is [`MessageType::Normal`].
pub fn classify(raw: &str) -> MessageType {
    if !raw.trim_start().starts_with('{') {
        return MessageType::Normal;
    }
    let Ok(payload) = serde_json::from_str::<Value>(raw) else {
        return MessageType::Normal;
    };
    let Some(kind) = payload.get("type").and_then(Value::as_str) else {
        return MessageType::Normal;
    };

    TYPE_RULES
        .iter()
        .find(|(needle, _)| kind.contains(needle))
        .map(|(_, ty)| *ty)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_payloads_map_by_substring() {
        assert_eq!(classify(r#"{"type":"shutdown_request"}"#), MessageType::Shutdown);
        assert_eq!(classify(r#"{"type":"shutdown_response"}"#), MessageType::Shutdown);
        assert_eq!(classify(r#"{"type":"idle_notification"}"#), MessageType::Idle);
        assert_eq!(
            classify(r#"{"type":"task_assignment","taskId":"3"}"#),
            MessageType::TaskAssignment
        );
        assert_eq!(
            classify(r#"{"type":"plan_approval_request"}"#),
            MessageType::PlanApproval
        );
    }

    #[test]
    fn plain_or_broken_text_is_normal() {
        assert_eq!(classify(""), MessageType::Normal);
        assert_eq!(classify("not json"), MessageType::Normal);
        assert_eq!(classify("{broken"), MessageType::Normal);
        assert_eq!(classify("[1, 2, 3]"), MessageType::Normal);
        assert_eq!(classify(r#"{"type":"status_update"}"#), MessageType::Normal);
        assert_eq!(classify(r#"{"kind":"idle"}"#), MessageType::Normal);
        assert_eq!(classify(r#"{"type":42}"#), MessageType::Normal);
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        assert_eq!(classify("  \n{\"type\":\"idle\"}"), MessageType::Idle);
    }

    #[test]
    fn earlier_rules_win() {
        // Matches both "idle" and "shutdown"; idle is checked first.
        assert_eq!(
            classify(r#"{"type":"idle_shutdown_hint"}"#),
            MessageType::Idle
        );
    }
}

//! Shared types used across the CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

/// Condition represents an observation of an object's state
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., ROSAControlPlaneReady)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(type_: impl Into<String>, status: ConditionStatus) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Create a True condition
    pub fn true_condition(type_: impl Into<String>) -> Self {
        Self::new(type_, ConditionStatus::True)
    }

    /// Create a False condition with a reason and message
    pub fn false_condition(
        type_: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(type_, ConditionStatus::False)
            .with_reason(reason)
            .with_message(message)
    }

    /// Set the reason and return self for chaining
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Set the message and return self for chaining
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// True if the two conditions differ in anything but their timestamp
    pub fn differs_from(&self, other: &Condition) -> bool {
        self.type_ != other.type_
            || self.status != other.status
            || self.reason != other.reason
            || self.message != other.message
    }
}

/// Insert or replace a condition by type
///
/// The transition time is kept when the status did not change, so repeated
/// reconciles that observe the same state don't churn the object.
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

/// Find a condition by type
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Check whether a condition of the given type is present and True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    get_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Endpoint used to reach a Kubernetes API server
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ApiEndpoint {
    /// Hostname on which the API server is serving
    pub host: String,
    /// Port on which the API server is serving
    pub port: i32,
}

impl ApiEndpoint {
    /// True if neither host nor port is set
    pub fn is_zero(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn set_condition_appends_new_types() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::true_condition("A"));
        set_condition(&mut conditions, Condition::true_condition("B"));
        assert_eq!(conditions.len(), 2);
    }

    #[test]
    fn set_condition_keeps_transition_time_when_status_unchanged() {
        let mut original = Condition::true_condition("Ready");
        original.last_transition_time = Utc::now() - Duration::hours(1);
        let first_seen = original.last_transition_time;
        let mut conditions = vec![original];

        set_condition(
            &mut conditions,
            Condition::true_condition("Ready").with_message("still ready"),
        );

        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].last_transition_time, first_seen);
        assert_eq!(conditions[0].message.as_deref(), Some("still ready"));
    }

    #[test]
    fn set_condition_bumps_transition_time_on_status_change() {
        let mut original = Condition::true_condition("Ready");
        original.last_transition_time = Utc::now() - Duration::hours(1);
        let first_seen = original.last_transition_time;
        let mut conditions = vec![original];

        set_condition(
            &mut conditions,
            Condition::false_condition("Ready", "Failed", "boom"),
        );

        assert!(conditions[0].last_transition_time > first_seen);
        assert_eq!(conditions[0].status, ConditionStatus::False);
    }

    #[test]
    fn condition_serializes_with_kubernetes_field_names() {
        let json = serde_json::to_value(Condition::true_condition("Ready")).unwrap();
        assert_eq!(json["type"], "Ready");
        assert_eq!(json["status"], "True");
        assert!(json.get("lastTransitionTime").is_some());
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn is_condition_true_requires_true_status() {
        let conditions = vec![
            Condition::true_condition("A"),
            Condition::false_condition("B", "No", "not yet"),
        ];
        assert!(is_condition_true(&conditions, "A"));
        assert!(!is_condition_true(&conditions, "B"));
        assert!(!is_condition_true(&conditions, "C"));
    }

    #[test]
    fn differs_from_ignores_timestamp() {
        let a = Condition::true_condition("Ready");
        let mut b = a.clone();
        b.last_transition_time = a.last_transition_time - Duration::minutes(5);
        assert!(!a.differs_from(&b));
        assert!(a.differs_from(&b.with_message("changed")));
    }
}

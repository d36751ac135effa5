use chrono::Utc;
use kube::core::DynamicObject;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(
        rename = "lastTransitionTime",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_transition_time: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    Ready,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

pub fn ready_true(reason: &str, message: impl Into<String>) -> Condition {
    ready(ConditionStatus::True, reason, message)
}

pub fn ready_false(reason: &str, message: impl Into<String>) -> Condition {
    ready(ConditionStatus::False, reason, message)
}

fn ready(
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) -> Condition {
    Condition {
        type_: ConditionType::Ready,
        status,
        reason: Some(reason.to_string()),
        message: Some(message.into()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Set a condition on the composite's status, replacing any existing
/// condition of the same type. Conditions of other types are left alone.
pub fn upsert_condition(composite: &mut DynamicObject, condition: Condition) {
    if !composite.data.is_object() {
        composite.data = json!({});
    }
    let root = composite.data.as_object_mut().unwrap();
    let status = root
        .entry("status")
        .or_insert_with(|| json!({}));
    if !status.is_object() {
        *status = json!({});
    }
    let conditions = status
        .as_object_mut()
        .unwrap()
        .entry("conditions")
        .or_insert_with(|| json!([]));
    if !conditions.is_array() {
        *conditions = json!([]);
    }
    let new_type = json!(&condition.type_);
    let list = conditions.as_array_mut().unwrap();
    list.retain(|c| c.get("type") != Some(&new_type));
    list.push(serde_json::to_value(&condition).unwrap_or(Value::Null));
}

/// Read the conditions list back off the composite; entries that do not
/// parse as conditions are skipped.
pub fn conditions(composite: &DynamicObject) -> Vec<Condition> {
    composite
        .data
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
        .map(|list| {
            list.iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

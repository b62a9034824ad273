use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// --- Storage rows ---

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub token: String,
    pub organization_id: i64,
    pub device_token: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct RoomSummary {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub last_message_seen: i64,
    pub owner_id: i64,
    pub silent_notifications: i64,
}

#[derive(Debug, Clone)]
pub struct RoomMember {
    pub id: i64,
    pub username: String,
}

/// A message as returned by the history queries (author username joined in).
#[derive(Debug, Serialize, Clone)]
pub struct ChatMessage {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub room_id: i64,
    pub message: String,
    pub message_information: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Entries of the serialized device-token list stored on a user row.
#[derive(Debug, Deserialize)]
pub struct DeviceToken {
    pub token: String,
}

// --- Event payloads ---
//
// Clients are loose about id types (numbers and digit strings both occur in
// the wild), so every id field goes through a lenient deserializer.

pub(crate) fn id_from_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn de_id<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    let v = Value::deserialize(de)?;
    id_from_value(&v).ok_or_else(|| serde::de::Error::custom("expected a numeric id"))
}

fn de_opt_id<'de, D: Deserializer<'de>>(de: D) -> Result<Option<i64>, D::Error> {
    let v = Value::deserialize(de)?;
    if v.is_null() {
        return Ok(None);
    }
    id_from_value(&v)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom("expected a numeric id"))
}

/// Member identifiers in `UpdateOrMakeRoom` are username-or-numeric-id
/// strings; bare numbers are tolerated, anything else is dropped.
fn de_members<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    let vals = Vec::<Value>::deserialize(de)?;
    Ok(vals
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
pub struct RoomTarget {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoomPage {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
    #[serde(deserialize_with = "de_id")]
    pub last_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct LastSeenUpdate {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
    #[serde(deserialize_with = "de_id")]
    pub msg_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RoomUpsert {
    pub name: String,
    #[serde(deserialize_with = "de_members")]
    pub users: Vec<String>,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageBroadcast {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
    pub message: String,
    pub msginfo: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageEdit {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
    #[serde(deserialize_with = "de_id")]
    pub msg_id: i64,
    pub message: String,
    pub msginfo: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageDelete {
    #[serde(deserialize_with = "de_id")]
    pub room: i64,
    #[serde(deserialize_with = "de_id")]
    pub msg_id: i64,
}

/// The `notification` event carries its routing fields at the top level of
/// the frame rather than inside `data`.
#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    #[serde(default, deserialize_with = "de_opt_id")]
    pub organization_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    pub data: NotificationPayload,
}

#[derive(Debug, Deserialize)]
pub struct NotificationPayload {
    pub notification: Value,
}

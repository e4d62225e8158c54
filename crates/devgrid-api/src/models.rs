// Wire models for the device registry endpoints
//
// These mirror the backend's JSON exactly. Identifiers arrive as either
// strings or integers and states as any JSON scalar, so both are kept in
// loosely-typed wrappers here; `devgrid-core` converts them to text.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// A device identifier as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Integer(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A device state as it appears on the wire.
///
/// The protocol treats state as free-form text, but backends are known to
/// send bare numbers (dimmer levels) and booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireState {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for WireState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: WireId,
    pub name: String,
    pub type_name: String,
    pub state: WireState,
    /// Absent and `null` both mean "no commands offered".
    #[serde(default, deserialize_with = "null_as_empty")]
    pub commands: Vec<String>,
}

/// Body of `POST /api/device/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
}

/// Raw response of `POST /api/device/{id}` before validation.
///
/// Both fields are optional here so a missing field surfaces as
/// [`Error::MalformedResponse`](crate::Error::MalformedResponse) instead of
/// a generic decode failure.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawCommandResponse {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub state: Option<WireState>,
}

/// Validated command response: the device the backend acted on and the
/// state it now reports.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    pub id: WireId,
    pub state: WireState,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_with_integer_id_and_commands() {
        let rec: DeviceRecord = serde_json::from_value(json!({
            "id": 1,
            "name": "Lamp",
            "type_name": "Light",
            "state": "off",
            "commands": ["on", "off"]
        }))
        .unwrap();
        assert_eq!(rec.id, WireId::Integer(1));
        assert_eq!(rec.id.to_string(), "1");
        assert_eq!(rec.commands, vec!["on", "off"]);
    }

    #[test]
    fn missing_and_null_commands_are_empty() {
        let absent: DeviceRecord = serde_json::from_value(json!({
            "id": "a", "name": "Bulb", "type_name": "Light", "state": "on"
        }))
        .unwrap();
        let null: DeviceRecord = serde_json::from_value(json!({
            "id": "b", "name": "Bulb", "type_name": "Light", "state": "on", "commands": null
        }))
        .unwrap();
        assert!(absent.commands.is_empty());
        assert!(null.commands.is_empty());
    }

    #[test]
    fn scalar_states_render_as_text() {
        let cases = [
            (json!("on"), "on"),
            (json!(42), "42"),
            (json!(true), "true"),
            (json!(0.5), "0.5"),
        ];
        for (raw, expected) in cases {
            let state: WireState = serde_json::from_value(raw).unwrap();
            assert_eq!(state.to_string(), expected);
        }
    }

    #[test]
    fn record_without_state_is_rejected() {
        let res: Result<DeviceRecord, _> = serde_json::from_value(json!({
            "id": 3, "name": "Fan", "type_name": "Switch"
        }));
        assert!(res.is_err());
    }
}

// ── API-to-domain type conversions ──
//
// Bridges raw `devgrid_api` wire types into canonical `devgrid_core`
// domain types. Ids and states are normalized to text here so nothing
// downstream needs to know what JSON type the backend used.

use devgrid_api::{CommandAck, DeviceRecord, WireId};

use crate::model::{Device, DeviceId, StateUpdate};

impl From<WireId> for DeviceId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Integer(n) => DeviceId::new(n.to_string()),
            WireId::Text(s) => DeviceId::new(s),
        }
    }
}

impl From<DeviceRecord> for Device {
    fn from(r: DeviceRecord) -> Self {
        Device {
            id: r.id.into(),
            name: r.name,
            type_name: r.type_name,
            state: r.state.to_string(),
            commands: r.commands,
        }
    }
}

impl From<CommandAck> for StateUpdate {
    fn from(ack: CommandAck) -> Self {
        StateUpdate {
            id: ack.id.into(),
            state: ack.state.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use devgrid_api::WireState;
    use pretty_assertions::assert_eq;

    #[test]
    fn integer_and_string_ids_coincide() {
        assert_eq!(
            DeviceId::from(WireId::Integer(7)),
            DeviceId::from(WireId::Text("7".into()))
        );
    }

    #[test]
    fn record_converts_with_text_state() {
        let record: DeviceRecord = serde_json::from_value(serde_json::json!({
            "id": 4, "name": "Dimmer", "type_name": "Light", "state": 55, "commands": ["up", "down"]
        }))
        .unwrap();

        let device = Device::from(record);
        assert_eq!(
            device,
            Device {
                id: DeviceId::new("4"),
                name: "Dimmer".into(),
                type_name: "Light".into(),
                state: "55".into(),
                commands: vec!["up".into(), "down".into()],
            }
        );
    }

    #[test]
    fn ack_converts_to_state_update() {
        let update = StateUpdate::from(CommandAck {
            id: WireId::Integer(1),
            state: WireState::Bool(true),
        });
        assert_eq!(update.id.as_str(), "1");
        assert_eq!(update.state, "true");
    }
}

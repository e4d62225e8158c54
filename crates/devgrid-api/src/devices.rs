// Device endpoints
//
// Listing via `GET /api/devices` and command execution via
// `POST /api/device/{id}`. The command name travels only in the body.

use tracing::debug;

use crate::client::DeviceApiClient;
use crate::error::Error;
use crate::models::{CommandAck, CommandRequest, DeviceRecord, RawCommandResponse};

impl DeviceApiClient {
    /// List the full device collection, in backend order.
    ///
    /// `GET /api/devices`
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.api_url(&["devices"])?;
        debug!("listing devices");
        self.get(url).await
    }

    /// Execute a named command on one device.
    ///
    /// `POST /api/device/{id}` with `{"command": "..."}`. The response must
    /// carry both `id` and `state`; anything less is a malformed response.
    pub async fn send_command(&self, device_id: &str, command: &str) -> Result<CommandAck, Error> {
        let url = self.api_url(&["device", device_id])?;
        debug!(device_id, command, "sending device command");

        let body = CommandRequest {
            command: command.to_owned(),
        };
        let raw: RawCommandResponse = self.post(url, &body).await?;

        match (raw.id, raw.state) {
            (Some(id), Some(state)) => Ok(CommandAck { id, state }),
            (None, _) => Err(Error::MalformedResponse {
                reason: "command response is missing `id`".into(),
            }),
            (Some(_), None) => Err(Error::MalformedResponse {
                reason: "command response is missing `state`".into(),
            }),
        }
    }
}

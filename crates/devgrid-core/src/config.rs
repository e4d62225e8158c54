// ── Runtime connection configuration ──
//
// These types describe how to reach a device backend and how dispatches
// behave. They never touch disk: the CLI/TUI builds a `ControllerConfig`
// (usually via `devgrid-config`) and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use devgrid_api::{BodyEncoding, DeviceApiClient, TlsMode, TransportConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use crate::error::FetchError;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed hubs).
    DangerAcceptInvalid,
}

/// What happens when a device is dispatched to while an earlier command
/// for it is still in flight.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum DispatchPolicy {
    /// Cancel the earlier command; only the newest one can patch the row.
    #[default]
    Supersede,
    /// Let every command run; whichever response arrives last wins.
    LastResponseWins,
}

/// Configuration for one device backend.
///
/// Built by CLI/TUI, passed to the fetcher and controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Backend root URL (e.g., `http://hub.local:8080`).
    pub url: Url,
    /// Optional bearer token, sent verbatim.
    pub token: Option<SecretString>,
    /// TLS verification strategy.
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Upper bound on a single command dispatch, end to end.
    pub dispatch_timeout: Duration,
    pub dispatch_policy: DispatchPolicy,
    /// Command body encoding for `POST /api/device/{id}`.
    pub body_encoding: BodyEncoding,
}

impl ControllerConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Config for `url` with every other setting at its default.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            token: None,
            tls: TlsVerification::default(),
            timeout: Self::DEFAULT_TIMEOUT,
            dispatch_timeout: Self::DEFAULT_DISPATCH_TIMEOUT,
            dispatch_policy: DispatchPolicy::default(),
            body_encoding: BodyEncoding::default(),
        }
    }

    /// Build the transport settings for `devgrid-api`.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: tls_to_transport(&self.tls),
            timeout: self.timeout,
            bearer_token: self.token.clone(),
        }
    }

    /// Build an API client that serves as both device source and dispatcher.
    pub fn api_client(&self) -> Result<DeviceApiClient, FetchError> {
        let client = DeviceApiClient::new(self.url.clone(), &self.transport())?;
        Ok(client.with_body_encoding(self.body_encoding))
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

// Device registry HTTP client
//
// Wraps `reqwest::Client` with base-URL handling, status checking, and
// body decoding. Endpoint methods live in `devices.rs` as inherent
// methods to keep this module focused on transport mechanics.

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// How the command body of `POST /api/device/{id}` is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BodyEncoding {
    /// `{"command": "<name>"}` with `Content-Type: application/json`.
    #[default]
    Json,
    /// `command=<name>` with `Content-Type: application/x-www-form-urlencoded`.
    Form,
}

/// Raw HTTP client for a device registry backend.
///
/// All methods return decoded payloads; non-success statuses become
/// [`Error::Status`] before the caller sees anything.
#[derive(Debug, Clone)]
pub struct DeviceApiClient {
    http: reqwest::Client,
    base_url: Url,
    encoding: BodyEncoding,
}

impl DeviceApiClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the backend root (e.g. `http://hub.local:8080`); any
    /// path it carries is treated as a prefix for `/api/...`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Self::with_client(http, base_url)
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Result<Self, Error> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url,
            encoding: BodyEncoding::default(),
        })
    }

    /// Select the command body encoding.
    pub fn with_body_encoding(mut self, encoding: BodyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The command body encoding in use.
    pub fn body_encoding(&self) -> BodyEncoding {
        self.encoding
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/api/{segments...}`, percent-encoding each segment.
    pub(crate) fn api_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::InvalidBaseUrl(self.base_url.to_string()))?;
            path.pop_if_empty().push("api").extend(segments);
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        Self::decode(resp).await
    }

    /// Send a POST request with the body in the configured encoding.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!(encoding = ?self.encoding, "POST {}", url);

        let request = self.http.post(url);
        let request = match self.encoding {
            BodyEncoding::Json => request.json(body),
            BodyEncoding::Form => request.form(body),
        };
        let resp = request.send().await.map_err(Error::Transport)?;

        Self::decode(resp).await
    }

    /// Check the status and decode the body, keeping the raw text on failure.
    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

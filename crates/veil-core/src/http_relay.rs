#![cfg(feature = "http-relay")]

//! Direct HTTP sender for relay requests.
//!
//! Posts JSON straight to the destination without an onion path. Suitable
//! for local relays and testing against a push server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::errors::NetworkError;
use crate::network::{OnionRequestSender, RelayRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct DirectRelaySender {
    client: reqwest::Client,
}

impl DirectRelaySender {
    pub fn new() -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OnionRequestSender for DirectRelaySender {
    async fn send_onion_request(
        &self,
        request: RelayRequest,
        destination_host: &str,
        _destination_public_key: &str,
    ) -> Result<Value, NetworkError> {
        debug!(url = %request.url, host = %destination_host, "Sending relay request");
        let resp = self
            .client
            .post(&request.url)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NetworkError::Timeout
                } else {
                    NetworkError::Transport(e.to_string())
                }
            })?;

        match resp.status() {
            StatusCode::OK => resp
                .json::<Value>()
                .await
                .map_err(|e| NetworkError::BadResponse(e.to_string())),
            other => Err(NetworkError::HttpStatus(other.as_u16())),
        }
    }
}

// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! REST client for the cloud services.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{
    device_id_from_mac, CertificateBundle, CloudSession, CommandApi, ProvisioningApi, RelayParams,
    ServerReply,
};
use crate::config::CloudConfig;
use crate::error::CloudApiError;

/// Client for the provisioning and command endpoints.
#[derive(Clone)]
pub struct RestCloudClient {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    request_command_path: String,
    forward_response_path: String,
}

impl RestCloudClient {
    pub fn new(config: &CloudConfig) -> Result<Self, CloudApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            request_command_path: config.request_command_path.clone(),
            forward_response_path: config.forward_response_path.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Check the HTTP status and the `success` flag of a JSON envelope.
async fn envelope(response: reqwest::Response) -> Result<Value, CloudApiError> {
    let body: Value = response.error_for_status()?.json().await?;
    let success = body.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(CloudApiError::Rejected(message.to_string()));
    }
    Ok(body)
}

fn access_token(body: &Value) -> Result<String, CloudApiError> {
    body.pointer("/token/accessToken")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CloudApiError::Decode("missing token.accessToken".to_string()))
}

#[async_trait]
impl ProvisioningApi for RestCloudClient {
    async fn login(&self) -> Result<String, CloudApiError> {
        let response = self
            .client
            .post(self.url("/token/login"))
            .json(&json!({
                "clientId": self.client_id,
                "clientSecret": self.client_secret,
            }))
            .send()
            .await?;

        let token = access_token(&envelope(response).await?)?;
        info!("Cloud login succeeded");
        Ok(token)
    }

    async fn upload_csr(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        imei: &str,
        csr: &str,
    ) -> Result<CertificateBundle, CloudApiError> {
        let form = Form::new().part("file", Part::text(csr.to_string()).file_name("client.csr"));
        let device_id = device_id_from_mac(lock_mac);

        let response = self
            .client
            .post(self.url("/device/addLockToDMS"))
            .query(&[
                ("deviceId", device_id.as_str()),
                ("deviceMac", lock_mac),
                ("imei", imei),
            ])
            .bearer_auth(&session.access_token)
            .multipart(form)
            .send()
            .await?;

        let body = envelope(response).await?;
        debug!("Certificate bundle received for {}", lock_mac);
        serde_json::from_value(body).map_err(|e| CloudApiError::Decode(e.to_string()))
    }

    async fn get_device_token(
        &self,
        session: &CloudSession,
        lock_mac: &str,
    ) -> Result<String, CloudApiError> {
        let response = self
            .client
            .get(self.url("/token/getDeviceJwtToken"))
            .query(&[("deviceMac", lock_mac), ("role", "ADMIN")])
            .bearer_auth(&session.access_token)
            .send()
            .await?;

        access_token(&envelope(response).await?)
    }
}

#[async_trait]
impl CommandApi for RestCloudClient {
    async fn request_server_command(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        workflow: &str,
        last_ble_response: &str,
        params: &RelayParams,
    ) -> Result<ServerReply, CloudApiError> {
        let response = self
            .client
            .post(self.url(&self.request_command_path))
            .bearer_auth(session.command_token())
            .json(&json!({
                "lockMac": lock_mac,
                "workflow": workflow,
                "bleResponse": last_ble_response,
                "params": params,
            }))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }

    async fn forward_response_to_server(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        ble_response: &str,
        params: Option<&RelayParams>,
    ) -> Result<ServerReply, CloudApiError> {
        let response = self
            .client
            .post(self.url(&self.forward_response_path))
            .bearer_auth(session.command_token())
            .json(&json!({
                "lockMac": lock_mac,
                "bleResponse": ble_response,
                "params": params,
            }))
            .send()
            .await?;

        Ok(response.error_for_status()?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_extraction() {
        let body = json!({ "success": true, "token": { "accessToken": "abc" } });
        assert_eq!(access_token(&body).unwrap(), "abc");

        let body = json!({ "success": true });
        assert!(matches!(access_token(&body), Err(CloudApiError::Decode(_))));
    }

    #[test]
    fn test_url_joins_base() {
        let config = CloudConfig {
            base_url: "https://cloud.example/api/".to_string(),
            ..CloudConfig::default()
        };
        let client = RestCloudClient::new(&config).unwrap();
        assert_eq!(client.url("/token/login"), "https://cloud.example/api/token/login");
    }
}

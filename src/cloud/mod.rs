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

//! Cloud provisioning and command services.
//!
//! The workflow only talks to the traits below; [`http::RestCloudClient`]
//! implements both against the REST API.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CloudApiError;

pub use http::RestCloudClient;

/// Parameters sent alongside relay requests.
pub type RelayParams = serde_json::Map<String, serde_json::Value>;

/// Credentials for one provisioning run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudSession {
    pub access_token: String,
    pub device_token: Option<String>,
}

impl CloudSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            device_token: None,
        }
    }

    /// Token for device-scoped calls: the device token once known.
    pub fn command_token(&self) -> &str {
        self.device_token.as_deref().unwrap_or(&self.access_token)
    }
}

/// Key material issued for a CSR. Never persisted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateBundle {
    pub certificate: String,
    #[serde(alias = "privateKey")]
    pub device_private_key: String,
    #[serde(alias = "ca")]
    pub device_ca: String,
    #[serde(alias = "rootCA")]
    pub root_ca: String,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("device_private_key", &"<redacted>")
            .field("device_ca", &format_args!("{} bytes", self.device_ca.len()))
            .field("root_ca", &format_args!("{} bytes", self.root_ca.len()))
            .finish()
    }
}

/// Reply from the command service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerReply {
    /// Turn `success == false` into an error.
    pub fn into_result(self) -> Result<Self, CloudApiError> {
        if self.success {
            Ok(self)
        } else {
            Err(CloudApiError::Rejected(
                self.message.unwrap_or_else(|| "no message".to_string()),
            ))
        }
    }
}

/// Certificate issuance and tokens.
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    /// Obtain an access token for the station.
    async fn login(&self) -> Result<String, CloudApiError>;

    async fn upload_csr(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        imei: &str,
        csr: &str,
    ) -> Result<CertificateBundle, CloudApiError>;

    /// Obtain a device-scoped token.
    async fn get_device_token(
        &self,
        session: &CloudSession,
        lock_mac: &str,
    ) -> Result<String, CloudApiError>;
}

/// BLE command brokering.
#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn request_server_command(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        workflow: &str,
        last_ble_response: &str,
        params: &RelayParams,
    ) -> Result<ServerReply, CloudApiError>;

    async fn forward_response_to_server(
        &self,
        session: &CloudSession,
        lock_mac: &str,
        ble_response: &str,
        params: Option<&RelayParams>,
    ) -> Result<ServerReply, CloudApiError>;
}

/// The device id the cloud uses: MAC octets 3..6, no separators.
pub fn device_id_from_mac(lock_mac: &str) -> String {
    lock_mac
        .split(':')
        .skip(2)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_from_mac() {
        assert_eq!(device_id_from_mac("EF:4A:F9:38:A9:3E"), "F938A93E");
        assert_eq!(device_id_from_mac("ef:4a:f9:38:a9:3e"), "F938A93E");
    }

    #[test]
    fn test_reply_rejection() {
        let reply = ServerReply {
            success: false,
            command: None,
            message: Some("lock unknown".to_string()),
        };
        match reply.into_result() {
            Err(CloudApiError::Rejected(msg)) => assert_eq!(msg, "lock unknown"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bundle_accepts_service_field_names() {
        let json = r#"{"certificate":"C","privateKey":"K","ca":"D","rootCA":"R"}"#;
        let bundle: CertificateBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.device_private_key, "K");
        assert_eq!(bundle.device_ca, "D");
        assert_eq!(bundle.root_ca, "R");
        assert!(format!("{:?}", bundle).contains("<redacted>"));
    }

    #[test]
    fn test_command_token_prefers_device_token() {
        let mut session = CloudSession::new("access");
        assert_eq!(session.command_token(), "access");
        session.device_token = Some("device".to_string());
        assert_eq!(session.command_token(), "device");
    }
}

use serde::{Deserialize, Serialize};

use rlock_core::types::{ClientId, LockId, LockStatus, Xid};

// ─── Validation Helpers ─────────────────────────────────────────────────────

/// Client IDs double as callback addresses, so they must at least look like
/// `host:port`.
pub fn validate_client_id(client_id: &str) -> Result<(), String> {
    if client_id.is_empty() {
        return Err("client_id is required".to_string());
    }
    match client_id.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(format!(
            "Invalid client_id '{}'. Must be a callback address of the form host:port",
            client_id
        )),
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

/// Body of `POST /acquire` and `POST /release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRequest {
    pub lid: LockId,
    pub client_id: ClientId,
    /// Ignored by the basic server
    #[serde(default)]
    pub xid: Xid,
}

impl LockRequest {
    pub fn validate(&self) -> Result<(), String> {
        validate_client_id(self.client_id.as_str())
    }
}

/// Body of the client-side `POST /revoke` and `POST /retry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRequest {
    pub lid: LockId,
    #[serde(default)]
    pub xid: Xid,
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: LockStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatResponse {
    pub lid: LockId,
    /// Grants made by this server across all locks
    pub acquires: u64,
}

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub mode: String,
    pub primary: bool,
    pub version: String,
}

#[derive(Serialize)]
pub struct RoleResponse {
    pub primary: bool,
}

#[derive(Serialize)]
pub struct RestoreResponse {
    pub restored_bytes: usize,
}

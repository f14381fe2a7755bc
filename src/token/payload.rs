use crate::token::{TOKEN_TTL_MS, TokenError};
use serde::{Deserialize, Serialize};

/// Claims carried inside an audio access token.
///
/// Field order is the wire order: the signature covers the exact bytes
/// produced by [`TokenPayload::serialize_to_bytes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    /// Storage object key of the audio file
    pub filename: String,

    /// Logical resource the audio belongs to (audit only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Principal the token was issued to (audit only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Expiry in Unix epoch milliseconds
    pub expires_at: u64,
}

impl TokenPayload {
    pub fn new(
        filename: impl Into<String>,
        resource_id: Option<&str>,
        user_id: Option<&str>,
        issued_at_ms: u64,
    ) -> Self {
        Self {
            filename: filename.into(),
            resource_id: resource_id.map(str::to_owned),
            user_id: user_id.map(str::to_owned),
            expires_at: issued_at_ms.saturating_add(TOKEN_TTL_MS),
        }
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }

    pub fn serialize_to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn deserialize_from_bytes(data: &[u8]) -> Result<Self, TokenError> {
        serde_json::from_slice(data).map_err(|_| TokenError::ValidationFailed)
    }
}

use serde::{Deserialize, Serialize};

/// Request structure for minting an audio token
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenRequest {
    /// Public storage URL of the audio file (required)
    #[serde(default)]
    pub audio_url: Option<String>,

    /// Resource the audio belongs to (optional, audit only)
    #[serde(default)]
    pub resource_id: Option<String>,

    /// Requesting user (optional, audit only)
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response structure for token creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTokenResponse {
    pub streaming_url: String,
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

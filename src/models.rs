use serde::{Deserialize, Serialize};

// ─── Token API ───

/// Serialized form of a token, as returned by every token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenData {
    pub token: String,
    pub create_dm: bool,
    /// Count of Accepted rows referencing the token (computed, not stored)
    pub accepted_count: u64,
    pub rooms: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertTokenRequest {
    pub token: Option<String>,
    #[serde(default)]
    pub create_dm: bool,
    #[serde(default)]
    pub rooms: Vec<String>,
    #[serde(default = "default_true")]
    pub as_registration_token: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct UpsertTokenResponse {
    pub token: TokenData,
    pub registration_token: RegistrationTokenInfo,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationTokenInfo {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl RegistrationTokenInfo {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: &'static str) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// `?token=` query parameter shared by GET/DELETE /tokens, /info and /redeem.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// ─── Redemption / preview ───

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub rooms: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InviterInfo {
    pub user_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenInfoResponse {
    pub rooms_count: u64,
    pub has_redeemed: bool,
    pub create_dm: bool,
    pub inviter: InviterInfo,
}

// ─── Share links ───

#[derive(Debug, Serialize)]
pub struct ShareLinkResponse {
    pub url: String,
    #[serde(rename = "targetUri")]
    pub target_uri: String,
}

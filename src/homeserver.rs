use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// DM rooms rotate their megolm session after 7 days or 100 messages.
const DM_ROTATION_PERIOD_MS: u64 = 7 * 24 * 60 * 60 * 1000;
const DM_ROTATION_PERIOD_MSGS: u32 = 100;

#[derive(Debug, Error)]
pub enum HomeserverError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("homeserver returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Authenticated caller as resolved by the homeserver.
#[derive(Debug, Clone)]
pub struct Requester {
    pub user_id: String,
    pub is_guest: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileInfo {
    #[serde(rename = "displayname")]
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Everything this service needs from the host homeserver: requester
/// resolution, room membership mutation, profiles and the
/// registration-token store.
#[async_trait]
pub trait HomeserverApi: Send + Sync {
    async fn whoami(&self, access_token: &str) -> Result<Requester, HomeserverError>;

    /// Invite `target` into `room_id`, sent on behalf of `sender`.
    async fn invite_user(
        &self,
        sender: &str,
        target: &str,
        room_id: &str,
    ) -> Result<(), HomeserverError>;

    async fn join_room(&self, user_id: &str, room_id: &str) -> Result<(), HomeserverError>;

    /// Create an encrypted direct-message room between `creator` and
    /// `invitee`, returning the new room id.
    async fn create_dm_room(
        &self,
        creator: &str,
        invitee: &str,
    ) -> Result<String, HomeserverError>;

    async fn get_profile(&self, user_id: &str) -> Result<ProfileInfo, HomeserverError>;

    async fn registration_token_exists(&self, token: &str) -> Result<bool, HomeserverError>;

    /// Unlimited uses, no expiry.
    async fn create_registration_token(&self, token: &str) -> Result<(), HomeserverError>;
}

/// Production implementation talking to a Matrix homeserver. Calls are
/// authenticated with an application-service token; owner-as-sender
/// operations use `?user_id=` impersonation.
pub struct MatrixHomeserver {
    http: reqwest::Client,
    base_url: String,
    as_token: String,
}

impl MatrixHomeserver {
    pub fn new(base_url: String, as_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            as_token,
        }
    }

    fn cs_url(&self, path: &str) -> String {
        format!("{}/_matrix/client/v3/{}", self.base_url, path)
    }

    fn admin_url(&self, path: &str) -> String {
        format!("{}/_synapse/admin/v1/{}", self.base_url, path)
    }

    async fn ok_or_api_error(
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, HomeserverError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(HomeserverError::Api { status, body })
    }
}

/// Percent-encode a path segment (room ids and user ids carry `!`, `:` etc).
fn seg(raw: &str) -> String {
    utf8_percent_encode(raw, NON_ALPHANUMERIC).to_string()
}

#[async_trait]
impl HomeserverApi for MatrixHomeserver {
    async fn whoami(&self, access_token: &str) -> Result<Requester, HomeserverError> {
        #[derive(Deserialize)]
        struct WhoamiResponse {
            user_id: String,
            #[serde(default)]
            is_guest: bool,
        }

        let resp = self
            .http
            .get(self.cs_url("account/whoami"))
            .bearer_auth(access_token)
            .send()
            .await?;
        let body: WhoamiResponse = Self::ok_or_api_error(resp).await?.json().await?;
        Ok(Requester {
            user_id: body.user_id,
            is_guest: body.is_guest,
        })
    }

    async fn invite_user(
        &self,
        sender: &str,
        target: &str,
        room_id: &str,
    ) -> Result<(), HomeserverError> {
        let url = self.cs_url(&format!("rooms/{}/invite", seg(room_id)));
        let resp = self
            .http
            .post(url)
            .query(&[("user_id", sender)])
            .bearer_auth(&self.as_token)
            .json(&json!({ "user_id": target }))
            .send()
            .await?;
        Self::ok_or_api_error(resp).await?;
        Ok(())
    }

    async fn join_room(&self, user_id: &str, room_id: &str) -> Result<(), HomeserverError> {
        let url = self.cs_url(&format!("rooms/{}/join", seg(room_id)));
        let resp = self
            .http
            .post(url)
            .query(&[("user_id", user_id)])
            .bearer_auth(&self.as_token)
            .json(&json!({}))
            .send()
            .await?;
        Self::ok_or_api_error(resp).await?;
        Ok(())
    }

    async fn create_dm_room(
        &self,
        creator: &str,
        invitee: &str,
    ) -> Result<String, HomeserverError> {
        #[derive(Deserialize)]
        struct CreateRoomResponse {
            room_id: String,
        }

        let body = json!({
            "preset": "trusted_private_chat",
            "is_direct": true,
            "invite": [invitee],
            "initial_state": [{
                "type": "m.room.encryption",
                "state_key": "",
                "content": {
                    "algorithm": "m.megolm.v1.aes-sha2",
                    "rotation_period_ms": DM_ROTATION_PERIOD_MS,
                    "rotation_period_msgs": DM_ROTATION_PERIOD_MSGS,
                },
            }],
        });
        let resp = self
            .http
            .post(self.cs_url("createRoom"))
            .query(&[("user_id", creator)])
            .bearer_auth(&self.as_token)
            .json(&body)
            .send()
            .await?;
        let body: CreateRoomResponse = Self::ok_or_api_error(resp).await?.json().await?;
        Ok(body.room_id)
    }

    async fn get_profile(&self, user_id: &str) -> Result<ProfileInfo, HomeserverError> {
        let url = self.cs_url(&format!("profile/{}", seg(user_id)));
        let resp = self.http.get(url).bearer_auth(&self.as_token).send().await?;
        let profile = Self::ok_or_api_error(resp).await?.json().await?;
        Ok(profile)
    }

    async fn registration_token_exists(&self, token: &str) -> Result<bool, HomeserverError> {
        let url = self.admin_url(&format!("registration_tokens/{}", seg(token)));
        let resp = self.http.get(url).bearer_auth(&self.as_token).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::ok_or_api_error(resp).await?;
        Ok(true)
    }

    async fn create_registration_token(&self, token: &str) -> Result<(), HomeserverError> {
        let resp = self
            .http
            .post(self.admin_url("registration_tokens/new"))
            .bearer_auth(&self.as_token)
            .json(&json!({
                "token": token,
                "uses_allowed": null,
                "expiry_time": null,
            }))
            .send()
            .await?;
        Self::ok_or_api_error(resp).await?;
        Ok(())
    }
}

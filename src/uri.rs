use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use sha1::{Digest, Sha1};

use crate::error::ApiError;

/// Closed set of shareable object kinds. The wire payload carries a
/// `type` tag plus kind-specific fields; unknown tags are rejected as
/// `NOT_SUPPORTED` before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ShareTarget {
    #[serde(rename_all = "camelCase")]
    SpaceObject {
        room_id: String,
        object_type: String,
        object_id: String,
    },
    /// Normalized object reference as emitted by clients: kebab-case
    /// subtype and sigil-prefixed ids.
    #[serde(rename_all = "camelCase")]
    Ref {
        ref_type: String,
        room_id: String,
        object_id: String,
    },
    #[serde(rename_all = "camelCase")]
    SuperInvite { server: String, invite_code: String },
    #[serde(rename_all = "camelCase")]
    RoomId { room_id: String },
    #[serde(rename_all = "camelCase")]
    RoomAlias { room_alias: String },
    #[serde(rename_all = "camelCase")]
    UserId { user_id: String },
}

impl ShareTarget {
    pub fn from_payload(payload: &Value) -> Result<Self, ApiError> {
        match serde_json::from_value::<ShareTarget>(payload.clone()) {
            Ok(target) => Ok(target),
            Err(err) => {
                let msg = err.to_string();
                if msg.starts_with("unknown variant") || msg.starts_with("missing field `type`") {
                    let kind = payload
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("<missing>");
                    Err(ApiError::NotSupported(kind.to_string()))
                } else {
                    Err(ApiError::BadRequest(msg))
                }
            }
        }
    }

    /// App-relative path for this target; exhaustive over all kinds.
    pub fn path(&self) -> String {
        match self {
            ShareTarget::SpaceObject {
                room_id,
                object_type,
                object_id,
            } => format!("o/{room_id}/{object_type}/{object_id}"),
            ShareTarget::Ref {
                ref_type,
                room_id,
                object_id,
            } => format!(
                "o/{}/{}/{}",
                strip_sigil(room_id, '!'),
                normalize_ref_type(ref_type),
                strip_sigil(object_id, '$'),
            ),
            ShareTarget::SuperInvite {
                server,
                invite_code,
            } => format!("i/{server}/{invite_code}"),
            ShareTarget::RoomId { room_id } => format!("roomid/{room_id}"),
            ShareTarget::RoomAlias { room_alias } => {
                // a literal '#' would terminate the URL fragment early
                format!("r/{}", strip_sigil(room_alias, '#'))
            }
            ShareTarget::UserId { user_id } => format!("u/{}", strip_sigil(user_id, '@')),
        }
    }

    /// Emoji shown on the preview page, picked by object subtype.
    pub fn icon(&self) -> &'static str {
        match self {
            ShareTarget::SpaceObject { object_type, .. } => object_icon(object_type),
            ShareTarget::Ref { ref_type, .. } => object_icon(&normalize_ref_type(ref_type)),
            _ => "\u{1F4D7}", // 📗
        }
    }
}

fn object_icon(object_type: &str) -> &'static str {
    match object_type {
        "pin" => "\u{1F4CC}",           // 📌
        "boost" => "\u{1F680}",         // 🚀
        "calendarEvent" => "\u{1F5D3}\u{FE0F}", // 🗓️
        "taskList" => "\u{1F4CB}",      // 📋
        _ => "\u{1F4D7}",               // 📗
    }
}

fn normalize_ref_type(ref_type: &str) -> String {
    match ref_type {
        "task-list" => "taskList".to_string(),
        "calendar-event" => "calendarEvent".to_string(),
        other => other.to_string(),
    }
}

fn strip_sigil<'a>(raw: &'a str, sigil: char) -> &'a str {
    raw.strip_prefix(sigil).unwrap_or(raw)
}

/// `@alice:example.org` → `alice`
pub fn localpart(user_id: &str) -> String {
    let stripped = user_id.strip_prefix('@').unwrap_or(user_id);
    stripped.split(':').next().unwrap_or(stripped).to_string()
}

/// Deterministic addressing for one share link: the content hash, the
/// published URL and the app-internal deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUri {
    pub target_hash: String,
    pub url: String,
    pub target_uri: String,
}

/// Build the canonical URI triple for `(url_prefix, path, query, requester)`.
///
/// Caller-supplied query keys are sorted and percent-encoded; any supplied
/// `userId` is dropped and the server-attributed one (requester localpart)
/// is appended last. The hash input always uses an empty hash slot:
/// `SHA1(prefix + "?" + query + "#" + path)`.
pub fn canonicalize(
    url_prefix: &str,
    path: &str,
    query: Option<&Value>,
    requester: &str,
) -> Result<CanonicalUri, ApiError> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if let Some(query) = query {
        let map = query
            .as_object()
            .ok_or_else(|| ApiError::BadRequest("query must be an object".into()))?;
        for (key, value) in map {
            if key == "userId" {
                continue;
            }
            let values = params.entry(key.clone()).or_default();
            match value {
                Value::Array(items) => {
                    for item in items {
                        values.push(scalar_to_string(item)?);
                    }
                }
                other => values.push(scalar_to_string(other)?),
            }
        }
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, values) in &params {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    serializer.append_pair("userId", &localpart(requester));
    let canonical_query = serializer.finish();

    let hash_input = format!("{url_prefix}?{canonical_query}#{path}");
    let target_hash = hex::encode(Sha1::digest(hash_input.as_bytes()));
    let url = format!("{url_prefix}{target_hash}?{canonical_query}#{path}");
    let target_uri = format!("acter:{path}?{canonical_query}");

    Ok(CanonicalUri {
        target_hash,
        url,
        target_uri,
    })
}

fn scalar_to_string(value: &Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(ApiError::BadRequest(
            "query values must be scalars or lists of scalars".into(),
        )),
    }
}

use crate::entities::token;

/// Generate a short random token identifier (first segment of a UUIDv4).
pub fn generate_token_id() -> String {
    let id = uuid::Uuid::new_v4().to_string();
    id.split('-').next().unwrap_or(&id).to_string()
}

/// Whether `requester` may read or mutate `token`.
// kept as a free function so the policy can grow later
pub fn can_edit(token: &token::Model, requester: &str) -> bool {
    token.owner == requester
}

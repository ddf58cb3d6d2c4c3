use serde::{Deserialize, Serialize};

/// Profile fields any user may see about another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: i64,
    pub full_name: String,
    pub schat_id: String,
    pub profile_image_url: Option<String>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

impl Presence {
    pub fn online(at: DateTime<Utc>) -> Self {
        Self {
            is_online: true,
            last_seen: at,
        }
    }

    pub fn offline(at: DateTime<Utc>) -> Self {
        Self {
            is_online: false,
            last_seen: at,
        }
    }
}

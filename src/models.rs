//! Typed models for Roblox user-profile API payloads
//!
//! The wire format is camelCase JSON; serde handles the field mapping. The
//! count fields are not part of the profile payload itself, they are filled
//! in by the client from the dedicated count endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A Roblox user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: u64,
    #[serde(rename = "name")]
    pub username: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// Account creation time; absent in the shallow payloads returned by the
    /// batch and social-list endpoints.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub friend_count: u64,
    #[serde(rename = "hasVerifiedBadge", default)]
    pub is_verified: bool,
}

impl UserProfile {
    /// Public profile page URL for this user.
    pub fn profile_url(&self) -> String {
        format!("https://www.roblox.com/users/{}/profile", self.id)
    }
}

/// Requested thumbnail dimensions for the three avatar image kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarSizes {
    pub headshot: String,
    pub bust: String,
    pub full_body: String,
}

impl Default for AvatarSizes {
    fn default() -> Self {
        Self {
            headshot: "48x48".to_string(),
            bust: "48x48".to_string(),
            full_body: "150x150".to_string(),
        }
    }
}

/// A user's avatar image URLs. A URL is empty when the corresponding
/// thumbnail endpoint failed; avatar fetches degrade instead of erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAvatar {
    pub user_id: u64,
    pub headshot_url: String,
    pub bust_url: String,
    pub full_body_url: String,
}

/// Standard `{"data": [...]}` envelope used by list-shaped endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Payload of the follower/following/friend count endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct CountPayload {
    #[serde(default)]
    pub count: u64,
}

/// One entry of a thumbnail endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct ThumbnailPayload {
    #[serde(rename = "imageUrl", default)]
    pub image_url: String,
}

/// One entry of the username resolution endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct UsernameMatch {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn profile_deserializes_full_payload() {
        let payload = json!({
            "id": 1,
            "name": "Roblox",
            "displayName": "Roblox",
            "description": "official",
            "created": "2006-02-27T21:06:40.300Z",
            "hasVerifiedBadge": true,
        });

        let profile: UserProfile = serde_json::from_value(payload).unwrap();
        assert_eq!(profile.id, 1);
        assert_eq!(profile.username, "Roblox");
        assert!(profile.is_verified);
        assert!(profile.created.is_some());
        // Counts come from separate endpoints and default to zero here.
        assert_eq!(profile.follower_count, 0);
    }

    #[test]
    fn profile_deserializes_shallow_payload() {
        let payload = json!({ "id": 2, "name": "builderman", "displayName": "builderman" });
        let profile: UserProfile = serde_json::from_value(payload).unwrap();
        assert_eq!(profile.username, "builderman");
        assert!(profile.created.is_none());
        assert!(!profile.is_verified);
    }

    #[test]
    fn envelope_defaults_to_empty_data() {
        let envelope: DataEnvelope<CountPayload> = serde_json::from_value(json!({})).unwrap();
        assert!(envelope.data.is_empty());
    }

    #[test]
    fn avatar_sizes_defaults() {
        let sizes = AvatarSizes::default();
        assert_eq!(sizes.headshot, "48x48");
        assert_eq!(sizes.full_body, "150x150");
    }
}

//! Staged registration payload, held in the cache until the confirmation
//! link is followed or the entry expires.

use serde::{Deserialize, Serialize};

use crate::models::Role;

/// Everything needed to commit a registration once the email is confirmed.
///
/// The raw credential is never part of this payload; it is reserved under a
/// separate cache key with the same TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSignup {
    pub email: String,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
}

impl PendingSignup {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_survives_the_cache_round_trip() {
        let pending = PendingSignup {
            email: "worker@example.com".to_string(),
            phone_number: Some("+15550100".to_string()),
            display_name: Some("Worker".to_string()),
            role: Role::User,
        };

        let staged = pending.to_json().unwrap();
        assert!(!staged.contains("password"));

        let restored = PendingSignup::from_json(&staged).unwrap();
        assert_eq!(restored.email, pending.email);
        assert_eq!(restored.phone_number, pending.phone_number);
    }
}

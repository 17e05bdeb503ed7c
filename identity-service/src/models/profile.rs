//! User-facing platform documents created alongside the security record in
//! the registration commit. The wider job-platform CRUD owns them afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core user document for the job platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub join_date: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(
        user_id: String,
        email: String,
        phone_number: Option<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            user_id,
            email,
            phone_number,
            display_name,
            join_date: Utc::now(),
        }
    }
}

/// Default candidate profile, filled in later by the profile CRUD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub headline: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            headline: String::new(),
            summary: String::new(),
            created_at: Utc::now(),
        }
    }
}

/// Job categories the user follows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestRecord {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub categories: Vec<String>,
}

impl InterestRecord {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            categories: Vec::new(),
        }
    }
}

/// Activity counters for the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub applications_submitted: i64,
    pub jobs_viewed: i64,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl ActivityRecord {
    pub fn default_for(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            applications_submitted: 0,
            jobs_viewed: 0,
            last_login_at: None,
        }
    }
}

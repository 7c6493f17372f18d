//! Profile document written for every registered account

use crate::registration::identity::IdentityAccount;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub uid: String,
    pub email: String,
    pub username: String,
    /// ISO 8601 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.000Z`
    pub created_at: String,
}

impl ProfileRecord {
    pub fn new(account: &IdentityAccount, username: impl Into<String>) -> Self {
        Self::created_at(account, username, Utc::now())
    }

    pub fn created_at(
        account: &IdentityAccount,
        username: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: account.uid.clone(),
            email: account.email.clone(),
            username: username.into(),
            created_at: iso_timestamp(now),
        }
    }

    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    #[cfg(test)]
    pub fn created_at_time(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(&self.created_at).map(|t| t.with_timezone(&Utc))
    }
}

pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    Read,
    Write,
    Exclusive,
}

impl LockType {
    pub fn as_str(&self) -> &str {
        match self {
            LockType::Read => "read",
            LockType::Write => "write",
            LockType::Exclusive => "exclusive",
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, LockType::Read)
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(LockType::Read),
            "write" => Ok(LockType::Write),
            "exclusive" => Ok(LockType::Exclusive),
            other => Err(format!("unknown lock type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLock {
    pub path: String,
    pub lock_type: LockType,
    pub owner: AgentId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl FileLock {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|expiry| now > expiry).unwrap_or(false)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

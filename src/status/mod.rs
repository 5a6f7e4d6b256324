//! User application status: the record types, the in-memory directory served
//! by the mock service, and the HTTP client the agent tool uses.

mod client;
mod service;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use client::{STATUS_UNKNOWN, StatusClient, UserStatus};
pub use service::{router, serve};

#[cfg(test)]
pub(crate) use service::spawn_local;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppStatus {
    Active,
    Inactive,
    #[serde(rename = "Pending_Approval")]
    PendingApproval,
    Suspended,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::PendingApproval => "Pending_Approval",
            Self::Suspended => "Suspended",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserStatusRecord {
    pub user_id: i64,
    pub app_status: AppStatus,
}

/// Body of a successful `GET /users/{user_id}/status`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub user_id: i64,
    pub app_status: AppStatus,
    pub message: String,
}

/// Body of a failed lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Read-only id to status table. Built once, never mutated.
#[derive(Clone, Debug)]
pub struct StatusDirectory {
    records: HashMap<i64, AppStatus>,
}

impl StatusDirectory {
    pub fn new(records: impl IntoIterator<Item = UserStatusRecord>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.user_id, record.app_status))
                .collect(),
        }
    }

    /// The demo data set: 101 through 104.
    pub fn seeded() -> Self {
        Self::new([
            UserStatusRecord {
                user_id: 101,
                app_status: AppStatus::Active,
            },
            UserStatusRecord {
                user_id: 102,
                app_status: AppStatus::Inactive,
            },
            UserStatusRecord {
                user_id: 103,
                app_status: AppStatus::PendingApproval,
            },
            UserStatusRecord {
                user_id: 104,
                app_status: AppStatus::Suspended,
            },
        ])
    }

    pub fn lookup(&self, user_id: i64) -> Option<AppStatus> {
        self.records.get(&user_id).copied()
    }

    pub fn records(&self) -> impl Iterator<Item = UserStatusRecord> + '_ {
        self.records
            .iter()
            .map(|(user_id, app_status)| UserStatusRecord {
                user_id: *user_id,
                app_status: *app_status,
            })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for StatusDirectory {
    fn default() -> Self {
        Self::seeded()
    }
}

#![forbid(unsafe_code)]

use std::time::SystemTime;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ReferralSnapshot {
    pub meta: SnapshotMeta,
    pub referrers: Vec<ReferrerRecord>,
}

impl ReferralSnapshot {
    /// Wrap `referrers` in a snapshot stamped with the current time.
    pub fn new(referrers: Vec<ReferrerRecord>) -> Self {
        Self {
            meta: SnapshotMeta {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                app_version: None,
                created_at: Some(SystemTime::now()),
            },
            referrers,
        }
    }

    pub fn empty() -> Self {
        Self {
            meta: SnapshotMeta {
                schema_version: SNAPSHOT_SCHEMA_VERSION,
                app_version: None,
                created_at: None,
            },
            referrers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMeta {
    pub schema_version: u32,
    pub app_version: Option<String>,
    pub created_at: Option<SystemTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerRecord {
    pub referrer: String,
    pub subresources: Vec<SubresourceRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubresourceRecord {
    pub host: String,
    pub latency_ms: u64,
}

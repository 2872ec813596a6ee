#![forbid(unsafe_code)]

mod repo;
mod snapshot;

pub use repo::{NoopRepository, ReferralRepository, SqliteRepository};
pub use snapshot::{
    ReferralSnapshot, ReferrerRecord, SNAPSHOT_SCHEMA_VERSION, SnapshotMeta, SubresourceRecord,
};

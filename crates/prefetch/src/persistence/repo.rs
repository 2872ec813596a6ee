#![forbid(unsafe_code)]

use crate::error::Error;
use crate::persistence::{
    ReferralSnapshot, ReferrerRecord, SNAPSHOT_SCHEMA_VERSION, SnapshotMeta, SubresourceRecord,
};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tracing::debug;

#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Load the learned referrals from persistence.
    async fn load(&self) -> Result<ReferralSnapshot, Error>;
    /// Persist learned referrals, replacing what was stored before.
    async fn save(&self, snapshot: &ReferralSnapshot) -> Result<(), Error>;
}

#[derive(Debug, Default)]
pub struct NoopRepository;

#[async_trait]
impl ReferralRepository for NoopRepository {
    async fn load(&self) -> Result<ReferralSnapshot, Error> {
        Ok(ReferralSnapshot::empty())
    }

    async fn save(&self, _snapshot: &ReferralSnapshot) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Create a repository backed by a SQLite database file.
    pub async fn new(path: PathBuf) -> Result<Self, Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(sqlx::Error::from)?;

        Ok(Self { path, pool })
    }

    async fn save_snapshot(&self, snapshot: &ReferralSnapshot) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM state").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM referrals")
            .execute(&mut *tx)
            .await?;

        let meta = &snapshot.meta;
        let created_at = meta
            .created_at
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs().to_string());

        sqlx::query(
            "INSERT INTO state (id, schema_version, app_version, created_at) VALUES (1, ?, ?, ?)",
        )
        .bind(meta.schema_version as i64)
        .bind(meta.app_version.as_deref())
        .bind(created_at.as_deref())
        .execute(&mut *tx)
        .await?;

        let mut rows = 0usize;
        for record in &snapshot.referrers {
            for sub in &record.subresources {
                sqlx::query(
                    "INSERT INTO referrals (referrer, host, latency_ms) VALUES (?, ?, ?) \
                     ON CONFLICT(referrer, host) DO UPDATE SET latency_ms = excluded.latency_ms",
                )
                .bind(&record.referrer)
                .bind(&sub.host)
                .bind(i64::try_from(sub.latency_ms).unwrap_or(i64::MAX))
                .execute(&mut *tx)
                .await?;
                rows += 1;
            }
        }

        tx.commit().await?;
        debug!(path = %self.path.display(), rows, "referrals persisted");
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<ReferralSnapshot, Error> {
        let mut meta = SnapshotMeta {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            app_version: None,
            created_at: None,
        };

        let row = sqlx::query("SELECT schema_version, app_version, created_at FROM state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            let schema_version: i64 = row.try_get("schema_version")?;
            let app_version: Option<String> = row.try_get("app_version")?;
            let created_at: Option<String> = row.try_get("created_at")?;

            meta.schema_version = schema_version as u32;
            meta.app_version = app_version;
            meta.created_at = created_at
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
        }

        let rows = sqlx::query(
            "SELECT referrer, host, latency_ms FROM referrals ORDER BY referrer, host",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut referrers: Vec<ReferrerRecord> = Vec::new();
        for row in rows {
            let referrer: String = row.try_get("referrer")?;
            let host: String = row.try_get("host")?;
            let latency_ms: i64 = row.try_get("latency_ms")?;
            let sub = SubresourceRecord {
                host,
                latency_ms: latency_ms.max(0) as u64,
            };

            match referrers.last_mut() {
                Some(last) if last.referrer == referrer => last.subresources.push(sub),
                _ => referrers.push(ReferrerRecord {
                    referrer,
                    subresources: vec![sub],
                }),
            }
        }

        Ok(ReferralSnapshot { meta, referrers })
    }
}

#[async_trait]
impl ReferralRepository for SqliteRepository {
    async fn load(&self) -> Result<ReferralSnapshot, Error> {
        self.load_snapshot().await
    }

    async fn save(&self, snapshot: &ReferralSnapshot) -> Result<(), Error> {
        self.save_snapshot(snapshot).await
    }
}

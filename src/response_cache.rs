use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use std::path::PathBuf;
use std::fs;
use std::time::Duration;
use anyhow::Result;
use chrono::Utc;
use tracing::{info, debug};

/// Response bodies (degree cells, geocoder answers) stored in SQLite with a fixed TTL
/// and a total size bound.
pub struct ResponseCache {
    pool: SqlitePool,
    max_size_bytes: u64,
    ttl: Duration,
}

impl ResponseCache {
    pub async fn new(cache_dir: PathBuf, max_size_bytes: u64, ttl: Duration) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)?;
        }

        let db_path = cache_dir.join("responses.db");
        let opts = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                body BLOB NOT NULL,
                size_bytes INTEGER NOT NULL,
                hit_count INTEGER DEFAULT 0,
                last_access_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )"
        ).execute(&pool).await?;

        Ok(Self { pool, max_size_bytes, ttl })
    }

    /// Expired entries count as misses and are dropped on the way.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Utc::now().timestamp();
        let row: Option<(Vec<u8>, i64)> = sqlx::query_as(
            "SELECT body, expires_at FROM responses WHERE key = ?"
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((body, expires_at)) if expires_at > now => {
                sqlx::query(
                    "UPDATE responses SET hit_count = hit_count + 1, last_access_at = ? WHERE key = ?"
                )
                .bind(now)
                .bind(key)
                .execute(&self.pool)
                .await?;

                debug!("cache hit: {}", key);
                Ok(Some(body))
            }
            Some(_) => {
                sqlx::query("DELETE FROM responses WHERE key = ?").bind(key).execute(&self.pool).await?;
                debug!("cache expired: {}", key);
                Ok(None)
            }
            None => {
                debug!("cache miss: {}", key);
                Ok(None)
            }
        }
    }

    /// Like `get` but without counting a hit.
    pub async fn contains(&self, key: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM responses WHERE key = ? AND expires_at > ?"
        )
        .bind(key)
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    pub async fn insert(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.insert_with_ttl(key, data, self.ttl).await
    }

    /// Stores `data` with its own lifetime instead of the cache-wide TTL.
    pub async fn insert_with_ttl(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let now = Utc::now().timestamp();
        let size = data.len() as i64;

        sqlx::query(
            "INSERT OR REPLACE INTO responses (key, body, size_bytes, last_access_at, expires_at)
             VALUES (?, ?, ?, ?, ?)"
        )
        .bind(key)
        .bind(data)
        .bind(size)
        .bind(now)
        .bind(now + ttl.as_secs() as i64)
        .execute(&self.pool)
        .await?;

        self.evict_if_needed().await?;
        Ok(())
    }

    pub async fn total_size(&self) -> Result<u64> {
        let size = sqlx::query_scalar::<_, i64>("SELECT COALESCE(SUM(size_bytes), 0) FROM responses")
            .fetch_one(&self.pool)
            .await?;
        Ok(size as u64)
    }

    async fn evict_if_needed(&self) -> Result<()> {
        let current_size = self.total_size().await?;
        if current_size <= self.max_size_bytes {
            return Ok(());
        }

        info!("cache limit reached, evicting...");
        let candidates: Vec<(String, i64)> = sqlx::query_as(
            "SELECT key, size_bytes FROM responses
             ORDER BY expires_at <= ? DESC, hit_count ASC, last_access_at ASC"
        )
        .bind(Utc::now().timestamp())
        .fetch_all(&self.pool)
        .await?;

        let mut remaining = current_size;
        for (key, size) in candidates {
            if remaining <= self.max_size_bytes {
                break;
            }
            sqlx::query("DELETE FROM responses WHERE key = ?").bind(&key).execute(&self.pool).await?;
            remaining = remaining.saturating_sub(size as u64);
            debug!("evicted: {}", key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn insert_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), 1 << 20, HOUR).await.unwrap();

        assert_eq!(cache.get("cell:12:41").await.unwrap(), None);
        cache.insert("cell:12:41", b"{\"elements\":[]}".to_vec()).await.unwrap();
        assert_eq!(
            cache.get("cell:12:41").await.unwrap().as_deref(),
            Some(&b"{\"elements\":[]}"[..])
        );
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), 1 << 20, Duration::ZERO).await.unwrap();

        cache.insert("cell:0:0", vec![1, 2, 3]).await.unwrap();
        assert_eq!(cache.get("cell:0:0").await.unwrap(), None);
        assert_eq!(cache.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn per_entry_ttl_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), 1 << 20, Duration::ZERO).await.unwrap();

        cache.insert_with_ttl("osm:roma", b"[]".to_vec(), HOUR).await.unwrap();
        cache.insert("cell:0:0", vec![1]).await.unwrap();
        assert!(cache.contains("osm:roma").await.unwrap());
        assert!(!cache.contains("cell:0:0").await.unwrap());
    }

    #[tokio::test]
    async fn size_limit_evicts_least_used_first() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), 250, HOUR).await.unwrap();

        cache.insert("a", vec![0; 100]).await.unwrap();
        cache.get("a").await.unwrap();
        cache.insert("b", vec![0; 100]).await.unwrap();
        cache.insert("c", vec![0; 100]).await.unwrap();

        assert!(cache.total_size().await.unwrap() <= 250);
        assert!(cache.get("a").await.unwrap().is_some());
        let mut survivors = 0;
        for key in ["b", "c"] {
            if cache.get(key).await.unwrap().is_some() {
                survivors += 1;
            }
        }
        assert_eq!(survivors, 1);
    }
}

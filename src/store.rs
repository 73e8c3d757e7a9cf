//! The single source of truth for channels, candidates, rules, decisions and
//! uploads (§3, §4.1).
//!
//! The backing engine is `libsql`'s local SQLite-compatible backend. Per
//! §5's single-writer model, every operation takes the one connection
//! through a `tokio::sync::Mutex`, the "pool size 1 / equivalent lock"
//! approach in place of replicating SQLite's own single-writer behavior.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Row, params};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::{
    Channel, FilterRule, RejectedSummary, RuleDecision, RuleType, Upload, VideoCandidate,
};
use crate::error::{Result, SyncError};

async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;
        "#,
    )
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            subscriber_count INTEGER NOT NULL DEFAULT 0,
            video_count INTEGER NOT NULL DEFAULT 0,
            last_scanned_at TEXT,
            scan_frequency_hours INTEGER NOT NULL DEFAULT 6,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS video_candidates (
            video_id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL REFERENCES channels(channel_id),
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            view_count INTEGER NOT NULL DEFAULT 0,
            like_count INTEGER NOT NULL DEFAULT 0,
            comment_count INTEGER NOT NULL DEFAULT 0,
            published_at TEXT,
            discovered_at TEXT NOT NULL,
            thumbnail_url TEXT NOT NULL DEFAULT '',
            tags_json TEXT NOT NULL DEFAULT '[]',
            category TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT '',
            view_velocity REAL NOT NULL DEFAULT 0,
            engagement_rate REAL NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS filter_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_name TEXT NOT NULL UNIQUE,
            rule_type TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            priority INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rule_decisions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_id TEXT NOT NULL REFERENCES video_candidates(video_id),
            rule_passed INTEGER NOT NULL,
            reject_rule_name TEXT,
            reject_reason TEXT,
            evaluated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_rule_decisions_video ON rule_decisions(video_id);

        CREATE TABLE IF NOT EXISTS uploads (
            video_id TEXT PRIMARY KEY REFERENCES video_candidates(video_id),
            channel_id TEXT NOT NULL,
            platform_video_id TEXT,
            uploaded_at TEXT NOT NULL
        );
        "#,
    )
    .await
    .map_err(SyncError::from)?;
    Ok(())
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| SyncError::StoreFailure(anyhow::anyhow!("bad timestamp {value}: {err}")))
}

fn instant_str(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn opt_instant_str(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(instant_str)
}

/// Durable state for the whole pipeline. Single-writer, per §5.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (creating if necessary) the backing database and ensures the
    /// schema of §3/§6 exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|err| SyncError::StoreFailure(err.into()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(SyncError::from)?;
        let conn = db.connect().map_err(SyncError::from)?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---------------------------------------------------------------- channels

    /// Upserts by `channel_id`: preserves an existing non-empty `name` when
    /// the incoming one is empty, always refreshes `url`, refreshes counts
    /// only when the incoming values are non-zero, sets `is_active=true`,
    /// and never touches `created_at`/`last_scanned_at` here.
    #[instrument(skip(self, channel))]
    pub async fn add_channel(&self, channel: &Channel) -> Result<()> {
        let conn = self.conn.lock().await;
        let existing = fetch_channel(&conn, &channel.channel_id).await?;

        let (name, created_at) = match &existing {
            Some(row) if channel.name.trim().is_empty() => (row.name.clone(), row.created_at),
            Some(row) => (channel.name.clone(), row.created_at),
            None => (channel.name.clone(), channel.created_at),
        };
        let subscriber_count = if channel.subscriber_count != 0 || existing.is_none() {
            channel.subscriber_count
        } else {
            existing.as_ref().unwrap().subscriber_count
        };
        let video_count = if channel.video_count != 0 || existing.is_none() {
            channel.video_count
        } else {
            existing.as_ref().unwrap().video_count
        };
        let last_scanned_at = existing.as_ref().and_then(|row| row.last_scanned_at);
        let scan_frequency_hours = existing
            .as_ref()
            .map(|row| row.scan_frequency_hours)
            .unwrap_or(channel.scan_frequency_hours);

        conn.execute(
            r#"
            INSERT INTO channels (
                channel_id, name, url, subscriber_count, video_count,
                last_scanned_at, scan_frequency_hours, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
            ON CONFLICT(channel_id) DO UPDATE SET
                name = excluded.name,
                url = excluded.url,
                subscriber_count = excluded.subscriber_count,
                video_count = excluded.video_count,
                is_active = 1
            "#,
            params![
                channel.channel_id.as_str(),
                name,
                channel.url.as_str(),
                subscriber_count,
                video_count,
                opt_instant_str(last_scanned_at),
                scan_frequency_hours,
                instant_str(created_at),
            ],
        )
        .await
        .map_err(SyncError::from)?;
        debug!(channel_id = %channel.channel_id, "channel upserted");
        Ok(())
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Option<Channel>> {
        let conn = self.conn.lock().await;
        fetch_channel(&conn, channel_id).await
    }

    pub async fn list_active_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(
                "SELECT channel_id, name, url, subscriber_count, video_count, last_scanned_at, \
                 scan_frequency_hours, is_active, created_at \
                 FROM channels WHERE is_active = 1 ORDER BY created_at ASC",
            )
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_channel(&row)?);
        }
        Ok(result)
    }

    pub async fn update_channel_scanned(&self, channel_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE channels SET last_scanned_at = ?1 WHERE channel_id = ?2",
            params![instant_str(Utc::now()), channel_id],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    pub async fn deactivate_channel(&self, channel_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE channels SET is_active = 0 WHERE channel_id = ?1",
            params![channel_id],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    // ------------------------------------------------------------- candidates

    #[instrument(skip(self, candidate))]
    pub async fn upsert_candidate(&self, candidate: &VideoCandidate) -> Result<()> {
        let conn = self.conn.lock().await;
        let existing_discovered_at = fetch_discovered_at(&conn, &candidate.video_id).await?;
        let discovered_at = existing_discovered_at.unwrap_or(candidate.discovered_at);
        let tags_json = serde_json::to_string(&candidate.tags)
            .map_err(|err| SyncError::StoreFailure(err.into()))?;

        conn.execute(
            r#"
            INSERT INTO video_candidates (
                video_id, channel_id, title, description, duration_seconds,
                view_count, like_count, comment_count, published_at, discovered_at,
                thumbnail_url, tags_json, category, language, view_velocity, engagement_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(video_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                title = excluded.title,
                description = excluded.description,
                duration_seconds = excluded.duration_seconds,
                view_count = excluded.view_count,
                like_count = excluded.like_count,
                comment_count = excluded.comment_count,
                published_at = excluded.published_at,
                thumbnail_url = excluded.thumbnail_url,
                tags_json = excluded.tags_json,
                category = excluded.category,
                language = excluded.language,
                view_velocity = excluded.view_velocity,
                engagement_rate = excluded.engagement_rate
            "#,
            params![
                candidate.video_id.as_str(),
                candidate.channel_id.as_str(),
                candidate.title.as_str(),
                candidate.description.as_str(),
                candidate.duration_seconds,
                candidate.view_count,
                candidate.like_count,
                candidate.comment_count,
                opt_instant_str(candidate.published_at),
                instant_str(discovered_at),
                candidate.thumbnail_url.as_str(),
                tags_json,
                candidate.category.as_str(),
                candidate.language.as_str(),
                candidate.view_velocity,
                candidate.engagement_rate,
            ],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    pub async fn get_candidate(&self, video_id: &str) -> Result<Option<VideoCandidate>> {
        let conn = self.conn.lock().await;
        fetch_candidate(&conn, video_id).await
    }

    pub async fn list_candidates_by_channel(
        &self,
        channel_id: &str,
        limit: u32,
    ) -> Result<Vec<VideoCandidate>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                "{} WHERE channel_id = ?1 \
                 ORDER BY published_at IS NULL, published_at DESC LIMIT {limit}",
                CANDIDATE_SELECT
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![channel_id]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_candidate(&row)?);
        }
        Ok(result)
    }

    pub async fn list_pending_candidates(&self, limit: u32) -> Result<Vec<VideoCandidate>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                "{} WHERE video_id NOT IN (SELECT video_id FROM uploads) \
                 ORDER BY view_velocity DESC, engagement_rate DESC LIMIT {limit}",
                CANDIDATE_SELECT
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_candidate(&row)?);
        }
        Ok(result)
    }

    pub async fn list_unevaluated_candidates(&self, limit: u32) -> Result<Vec<VideoCandidate>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                "{} WHERE video_id NOT IN (SELECT video_id FROM uploads) \
                 AND video_id NOT IN (SELECT video_id FROM rule_decisions) \
                 ORDER BY view_velocity DESC, engagement_rate DESC LIMIT {limit}",
                CANDIDATE_SELECT
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_candidate(&row)?);
        }
        Ok(result)
    }

    pub async fn list_filtered_candidates(&self, limit: u32) -> Result<Vec<VideoCandidate>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                "{} WHERE video_id NOT IN (SELECT video_id FROM uploads) \
                 AND video_id IN ({LATEST_PASSING_DECISION}) \
                 ORDER BY view_velocity DESC, engagement_rate DESC LIMIT {limit}",
                CANDIDATE_SELECT
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_candidate(&row)?);
        }
        Ok(result)
    }

    pub async fn list_rejected_candidates(&self, limit: u32) -> Result<Vec<RejectedSummary>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                r#"
                SELECT c.video_id, c.channel_id, c.title, d.reject_rule_name, d.reject_reason, d.evaluated_at
                FROM video_candidates c
                JOIN rule_decisions d ON d.video_id = c.video_id
                WHERE d.id = (SELECT MAX(id) FROM rule_decisions WHERE video_id = c.video_id)
                  AND d.rule_passed = 0
                ORDER BY d.evaluated_at DESC
                LIMIT {limit}
                "#
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(RejectedSummary {
                video_id: row.get(0).map_err(SyncError::from)?,
                channel_id: row.get(1).map_err(SyncError::from)?,
                title: row.get(2).map_err(SyncError::from)?,
                reject_rule_name: row
                    .get::<Option<String>>(3)
                    .map_err(SyncError::from)?
                    .unwrap_or_default(),
                reject_reason: row
                    .get::<Option<String>>(4)
                    .map_err(SyncError::from)?
                    .unwrap_or_default(),
                evaluated_at: parse_instant(&row.get::<String>(5).map_err(SyncError::from)?)?,
            });
        }
        Ok(result)
    }

    pub async fn update_candidate_metrics(
        &self,
        video_id: &str,
        views: i64,
        likes: i64,
        comments: i64,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE video_candidates SET view_count = ?1, like_count = ?2, comment_count = ?3 \
             WHERE video_id = ?4",
            params![views, likes, comments, video_id],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    // ------------------------------------------------------------------ rules

    #[instrument(skip(self, rule))]
    pub async fn add_rule(&self, rule: &FilterRule) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO filter_rules (rule_name, rule_type, field, value, is_active, priority, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(rule_name) DO UPDATE SET
                rule_type = excluded.rule_type,
                field = excluded.field,
                value = excluded.value,
                is_active = excluded.is_active,
                priority = excluded.priority
            "#,
            params![
                rule.rule_name.as_str(),
                rule.rule_type.as_str(),
                rule.field.as_str(),
                rule.value.as_str(),
                rule.is_active as i64,
                rule.priority,
                instant_str(rule.created_at),
            ],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    pub async fn get_rule(&self, rule_name: &str) -> Result<Option<FilterRule>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!("{RULE_SELECT} WHERE rule_name = ?1"))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![rule_name]).await.map_err(SyncError::from)?;
        match rows.next().await.map_err(SyncError::from)? {
            Some(row) => Ok(Some(row_to_rule(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_active_rules(&self) -> Result<Vec<FilterRule>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!(
                "{RULE_SELECT} WHERE is_active = 1 ORDER BY priority DESC, rule_name ASC"
            ))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_rule(&row)?);
        }
        Ok(result)
    }

    pub async fn list_all_rules(&self) -> Result<Vec<FilterRule>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(&format!("{RULE_SELECT} ORDER BY priority DESC, rule_name ASC"))
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![]).await.map_err(SyncError::from)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().await.map_err(SyncError::from)? {
            result.push(row_to_rule(&row)?);
        }
        Ok(result)
    }

    pub async fn update_rule(&self, rule_name: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE filter_rules SET value = ?1 WHERE rule_name = ?2",
            params![value, rule_name],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    pub async fn delete_rule(&self, rule_name: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM filter_rules WHERE rule_name = ?1",
            params![rule_name],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }

    // -------------------------------------------------------------- decisions

    #[instrument(skip(self, decision))]
    pub async fn record_rule_decision(&self, decision: &RuleDecision) -> Result<i64> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO rule_decisions (video_id, rule_passed, reject_rule_name, reject_reason, evaluated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                decision.video_id.as_str(),
                decision.rule_passed as i64,
                decision.reject_rule_name.as_deref(),
                decision.reject_reason.as_deref(),
                instant_str(decision.evaluated_at),
            ],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(conn.last_insert_rowid())
    }

    /// Returns the decision with the largest `id` for this candidate, so the
    /// tie-break stays deterministic even when two decisions share a timestamp.
    pub async fn get_rule_decision(&self, video_id: &str) -> Result<Option<RuleDecision>> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare(
                "SELECT id, video_id, rule_passed, reject_rule_name, reject_reason, evaluated_at \
                 FROM rule_decisions WHERE video_id = ?1 ORDER BY id DESC LIMIT 1",
            )
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![video_id]).await.map_err(SyncError::from)?;
        match rows.next().await.map_err(SyncError::from)? {
            Some(row) => Ok(Some(row_to_decision(&row)?)),
            None => Ok(None),
        }
    }

    // ---------------------------------------------------------------- uploads

    pub async fn is_uploaded(&self, video_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let stmt = conn
            .prepare("SELECT 1 FROM uploads WHERE video_id = ?1")
            .await
            .map_err(SyncError::from)?;
        let mut rows = stmt.query(params![video_id]).await.map_err(SyncError::from)?;
        Ok(rows.next().await.map_err(SyncError::from)?.is_some())
    }

    #[instrument(skip(self))]
    pub async fn mark_uploaded(
        &self,
        video_id: &str,
        channel_id: Option<&str>,
        platform_video_id: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let channel_id = channel_id.filter(|v| !v.is_empty()).unwrap_or("unknown");
        conn.execute(
            r#"
            INSERT INTO uploads (video_id, channel_id, platform_video_id, uploaded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(video_id) DO UPDATE SET
                channel_id = excluded.channel_id,
                platform_video_id = CASE
                    WHEN excluded.platform_video_id IS NOT NULL
                         AND excluded.platform_video_id != ''
                    THEN excluded.platform_video_id
                    ELSE uploads.platform_video_id
                END
            "#,
            params![
                video_id,
                channel_id,
                platform_video_id.filter(|v| !v.is_empty()),
                instant_str(Utc::now()),
            ],
        )
        .await
        .map_err(SyncError::from)?;
        Ok(())
    }
}

const CANDIDATE_SELECT: &str = "SELECT video_id, channel_id, title, description, duration_seconds, \
     view_count, like_count, comment_count, published_at, discovered_at, thumbnail_url, \
     tags_json, category, language, view_velocity, engagement_rate FROM video_candidates";

const RULE_SELECT: &str =
    "SELECT id, rule_name, rule_type, field, value, is_active, priority, created_at FROM filter_rules";

const LATEST_PASSING_DECISION: &str = "SELECT video_id FROM rule_decisions d \
     WHERE d.id = (SELECT MAX(id) FROM rule_decisions WHERE video_id = d.video_id) AND d.rule_passed = 1";

async fn fetch_channel(conn: &Connection, channel_id: &str) -> Result<Option<Channel>> {
    let stmt = conn
        .prepare(
            "SELECT channel_id, name, url, subscriber_count, video_count, last_scanned_at, \
             scan_frequency_hours, is_active, created_at FROM channels WHERE channel_id = ?1",
        )
        .await
        .map_err(SyncError::from)?;
    let mut rows = stmt.query(params![channel_id]).await.map_err(SyncError::from)?;
    match rows.next().await.map_err(SyncError::from)? {
        Some(row) => Ok(Some(row_to_channel(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_discovered_at(conn: &Connection, video_id: &str) -> Result<Option<DateTime<Utc>>> {
    let stmt = conn
        .prepare("SELECT discovered_at FROM video_candidates WHERE video_id = ?1")
        .await
        .map_err(SyncError::from)?;
    let mut rows = stmt.query(params![video_id]).await.map_err(SyncError::from)?;
    match rows.next().await.map_err(SyncError::from)? {
        Some(row) => Ok(Some(parse_instant(&row.get::<String>(0).map_err(SyncError::from)?)?)),
        None => Ok(None),
    }
}

async fn fetch_candidate(conn: &Connection, video_id: &str) -> Result<Option<VideoCandidate>> {
    let stmt = conn
        .prepare(&format!("{CANDIDATE_SELECT} WHERE video_id = ?1"))
        .await
        .map_err(SyncError::from)?;
    let mut rows = stmt.query(params![video_id]).await.map_err(SyncError::from)?;
    match rows.next().await.map_err(SyncError::from)? {
        Some(row) => Ok(Some(row_to_candidate(&row)?)),
        None => Ok(None),
    }
}

fn row_to_channel(row: &Row) -> Result<Channel> {
    Ok(Channel {
        channel_id: row.get(0).map_err(SyncError::from)?,
        name: row.get(1).map_err(SyncError::from)?,
        url: row.get(2).map_err(SyncError::from)?,
        subscriber_count: row.get(3).map_err(SyncError::from)?,
        video_count: row.get(4).map_err(SyncError::from)?,
        last_scanned_at: row
            .get::<Option<String>>(5)
            .map_err(SyncError::from)?
            .map(|v| parse_instant(&v))
            .transpose()?,
        scan_frequency_hours: row.get(6).map_err(SyncError::from)?,
        is_active: row.get::<i64>(7).map_err(SyncError::from)? != 0,
        created_at: parse_instant(&row.get::<String>(8).map_err(SyncError::from)?)?,
    })
}

fn row_to_candidate(row: &Row) -> Result<VideoCandidate> {
    let tags_json: String = row.get(11).map_err(SyncError::from)?;
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).map_err(|err| SyncError::StoreFailure(err.into()))?;
    Ok(VideoCandidate {
        video_id: row.get(0).map_err(SyncError::from)?,
        channel_id: row.get(1).map_err(SyncError::from)?,
        title: row.get(2).map_err(SyncError::from)?,
        description: row.get(3).map_err(SyncError::from)?,
        duration_seconds: row.get(4).map_err(SyncError::from)?,
        view_count: row.get(5).map_err(SyncError::from)?,
        like_count: row.get(6).map_err(SyncError::from)?,
        comment_count: row.get(7).map_err(SyncError::from)?,
        published_at: row
            .get::<Option<String>>(8)
            .map_err(SyncError::from)?
            .map(|v| parse_instant(&v))
            .transpose()?,
        discovered_at: parse_instant(&row.get::<String>(9).map_err(SyncError::from)?)?,
        thumbnail_url: row.get(10).map_err(SyncError::from)?,
        tags,
        category: row.get(12).map_err(SyncError::from)?,
        language: row.get(13).map_err(SyncError::from)?,
        view_velocity: row.get(14).map_err(SyncError::from)?,
        engagement_rate: row.get(15).map_err(SyncError::from)?,
    })
}

fn row_to_rule(row: &Row) -> Result<FilterRule> {
    let rule_type_str: String = row.get(2).map_err(SyncError::from)?;
    let rule_type: RuleType = rule_type_str.parse()?;
    Ok(FilterRule {
        id: row.get(0).map_err(SyncError::from)?,
        rule_name: row.get(1).map_err(SyncError::from)?,
        rule_type,
        field: row.get(3).map_err(SyncError::from)?,
        value: row.get(4).map_err(SyncError::from)?,
        is_active: row.get::<i64>(5).map_err(SyncError::from)? != 0,
        priority: row.get(6).map_err(SyncError::from)?,
        created_at: parse_instant(&row.get::<String>(7).map_err(SyncError::from)?)?,
    })
}

fn row_to_decision(row: &Row) -> Result<RuleDecision> {
    Ok(RuleDecision {
        id: row.get(0).map_err(SyncError::from)?,
        video_id: row.get(1).map_err(SyncError::from)?,
        rule_passed: row.get::<i64>(2).map_err(SyncError::from)? != 0,
        reject_rule_name: row.get(3).map_err(SyncError::from)?,
        reject_reason: row.get(4).map_err(SyncError::from)?,
        evaluated_at: parse_instant(&row.get::<String>(5).map_err(SyncError::from)?)?,
    })
}

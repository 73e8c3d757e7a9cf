//! Scanner (§4.3): brings remote channel state into the candidate table and
//! optionally triggers filtering for the just-discovered batch.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::fetcher::Fetcher;
use crate::rules::RuleEngine;
use crate::store::Store;

pub struct Scanner<F: Fetcher> {
    store: Store,
    fetcher: F,
    auto_filter: bool,
}

impl<F: Fetcher> Scanner<F> {
    pub fn new(store: Store, fetcher: F, auto_filter: bool) -> Self {
        Self {
            store,
            fetcher,
            auto_filter,
        }
    }

    /// Returns the number of candidates upserted. `0` with no error means
    /// the channel was absent, inactive, or the fetcher returned nothing.
    #[instrument(skip(self, token), fields(channel_id = %channel_id))]
    pub async fn scan_channel(
        &self,
        channel_id: &str,
        limit: u32,
        token: &CancellationToken,
    ) -> Result<u32> {
        let Some(channel) = self.store.get_channel(channel_id).await? else {
            return Ok(0);
        };
        if !channel.is_active {
            return Ok(0);
        }
        if limit == 0 {
            return Ok(0);
        }

        let candidates = run_cancellable(
            token,
            self.fetcher.get_channel_videos_metadata(&channel.url, limit),
        )
        .await?;

        let mut written = 0u32;
        for mut candidate in candidates {
            if token.is_cancelled() {
                break;
            }
            // The Fetcher's self-reported channel id can diverge from the id
            // the channel was added under; the known id is the foreign key
            // this scan is scoped by, so it always wins.
            candidate.channel_id = channel_id.to_string();
            match self.store.upsert_candidate(&candidate).await {
                Ok(()) => written += 1,
                Err(err) => warn!(
                    video_id = %candidate.video_id,
                    error = %err,
                    "failed to upsert candidate, continuing"
                ),
            }
        }

        self.store.update_channel_scanned(channel_id).await?;

        if token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        if self.auto_filter && written > 0 {
            let engine = RuleEngine::new(self.store.clone());
            if let Err(err) = engine.filter_pending_candidates(written).await {
                warn!(channel_id, error = %err, "auto-filter pass failed");
            }
        }

        info!(channel_id, written, "channel scanned");
        Ok(written)
    }

    /// Iterates every active channel; a per-channel failure is logged and
    /// does not abort the sweep.
    #[instrument(skip(self, token))]
    pub async fn scan_all_active(&self, limit: u32, token: &CancellationToken) -> Result<u32> {
        let channels = self.store.list_active_channels().await?;
        let mut total = 0u32;
        for channel in channels {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match self.scan_channel(&channel.channel_id, limit, token).await {
                Ok(count) => total += count,
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => warn!(
                    channel_id = %channel.channel_id,
                    error = %err,
                    "failed to scan channel, continuing sweep"
                ),
            }
        }
        Ok(total)
    }
}

/// Races a future against the token, turning cancellation into
/// [`SyncError::Cancelled`] instead of letting the future run to completion.
pub(crate) async fn run_cancellable<T>(
    token: &CancellationToken,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(SyncError::Cancelled),
        result = future => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, VideoCandidate};
    use crate::fetcher::FakeFetcher;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn candidate(id: &str, channel_id: &str, views: i64, category: &str, days_old: i64) -> VideoCandidate {
        let mut c = VideoCandidate {
            video_id: id.into(),
            channel_id: channel_id.into(),
            title: format!("video {id}"),
            description: String::new(),
            duration_seconds: 300,
            view_count: views,
            like_count: 10,
            comment_count: 2,
            published_at: Some(Utc::now() - Duration::days(days_old)),
            discovered_at: Utc::now(),
            thumbnail_url: String::new(),
            tags: vec![],
            category: category.into(),
            language: "en".into(),
            view_velocity: 0.0,
            engagement_rate: 0.0,
        };
        c.recompute_metrics(Utc::now());
        c
    }

    async fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("sync.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn scan_channel_returns_zero_for_absent_channel() {
        let (_dir, store) = open_store().await;
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::new(),
            candidates_by_id: HashMap::new(),
            fail_download: false,
        };
        let scanner = Scanner::new(store, fetcher, false);
        let count = scanner
            .scan_channel("missing", 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn scan_channel_zero_limit_is_a_no_op() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["v1".into()])]),
            candidates_by_id: HashMap::from([("v1".to_string(), candidate("v1", "c1", 5000, "Gaming", 1))]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, false);
        let count = scanner
            .scan_channel("c1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(store.list_pending_candidates(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scan_channel_upserts_and_stamps_last_scanned() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([(
                "https://example.com/c1".to_string(),
                vec!["v1".into(), "v2".into()],
            )]),
            candidates_by_id: HashMap::from([
                ("v1".to_string(), candidate("v1", "c1", 5000, "Gaming", 1)),
                ("v2".to_string(), candidate("v2", "c1", 100, "Music", 1)),
            ]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, false);
        let count = scanner
            .scan_channel("c1", 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 2);
        let channel = store.get_channel("c1").await.unwrap().unwrap();
        assert!(channel.last_scanned_at.is_some());
    }

    #[tokio::test]
    async fn scan_channel_overrides_a_mismatched_self_reported_channel_id() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        // The fetcher's own metadata reports a different channel id than the
        // one the channel was added under (a real yt-dlp quirk); the upsert
        // must still succeed against the `channels` foreign key.
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["v1".into()])]),
            candidates_by_id: HashMap::from([(
                "v1".to_string(),
                candidate("v1", "UCSomeOtherReportedId", 5000, "Gaming", 1),
            )]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, false);
        let count = scanner
            .scan_channel("c1", 10, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(count, 1);
        let candidates = store.list_candidates_by_channel("c1", 10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].channel_id, "c1");
    }

    #[tokio::test]
    async fn scanning_twice_is_idempotent_on_candidate_ids() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["v1".into()])]),
            candidates_by_id: HashMap::from([("v1".to_string(), candidate("v1", "c1", 5000, "Gaming", 1))]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, false);
        scanner.scan_channel("c1", 10, &CancellationToken::new()).await.unwrap();
        let first_scanned = store.get_channel("c1").await.unwrap().unwrap().last_scanned_at;
        scanner.scan_channel("c1", 10, &CancellationToken::new()).await.unwrap();
        let second_scanned = store.get_channel("c1").await.unwrap().unwrap().last_scanned_at;

        let candidates = store.list_candidates_by_channel("c1", 10).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(second_scanned >= first_scanned);
    }

    #[tokio::test]
    async fn deactivated_channel_is_skipped_by_sweep() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        store.deactivate_channel("c1").await.unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["v1".into()])]),
            candidates_by_id: HashMap::from([("v1".to_string(), candidate("v1", "c1", 5000, "Gaming", 1))]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, false);
        let total = scanner.scan_all_active(10, &CancellationToken::new()).await.unwrap();
        assert_eq!(total, 0);
        assert!(store.list_candidates_by_channel("c1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn auto_filter_evaluates_freshly_scanned_candidates() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let engine = RuleEngine::new(store.clone());
        engine.seed_default_rules().await.unwrap();

        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["v1".into()])]),
            candidates_by_id: HashMap::from([("v1".to_string(), candidate("v1", "c1", 5000, "Gaming", 1))]),
            fail_download: false,
        };
        let scanner = Scanner::new(store.clone(), fetcher, true);
        scanner.scan_channel("c1", 10, &CancellationToken::new()).await.unwrap();

        let decision = store.get_rule_decision("v1").await.unwrap().unwrap();
        assert!(decision.rule_passed);
    }
}

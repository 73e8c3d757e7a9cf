//! Controller (§4.4): walks from a source identifier to a finished upload,
//! skipping work that is already done.

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::error::{Result, SyncError};
use crate::fetcher::Fetcher;
use crate::publisher::Publisher;
use crate::scanner::run_cancellable;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub considered: u32,
    pub skipped: u32,
    pub downloaded: u32,
    pub uploaded: u32,
}

/// On error the counts accumulated before the failure are returned alongside
/// it, per §5's "abort the whole sync, return counts so far with the error".
pub type SyncOutcome = std::result::Result<SyncCounts, (SyncCounts, SyncError)>;

pub struct Controller<F: Fetcher, P: Publisher> {
    store: Store,
    fetcher: F,
    publisher: P,
    output_dir: PathBuf,
}

impl<F: Fetcher, P: Publisher> Controller<F, P> {
    /// Ensures the output directory exists at construction, per §5's
    /// resource-lifecycle contract.
    pub fn new(store: Store, fetcher: F, publisher: P, output_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).map_err(crate::error::SyncError::store)?;
        Ok(Self {
            store,
            fetcher,
            publisher,
            output_dir,
        })
    }

    #[instrument(skip(self, token), fields(channel_id = %channel_id))]
    pub async fn sync_channel(&self, channel_id: &str, limit: u32, token: &CancellationToken) -> SyncOutcome {
        if limit == 0 {
            return Ok(SyncCounts::default());
        }

        let channel = self
            .store
            .get_channel(channel_id)
            .await
            .map_err(|err| (SyncCounts::default(), err))?;
        let channel_url = channel
            .as_ref()
            .map(|c| c.url.clone())
            .unwrap_or_else(|| channel_id.to_string());

        let ids = run_cancellable(token, self.fetcher.list_channel_video_ids(&channel_url, limit))
            .await
            .map_err(|err| (SyncCounts::default(), err))?;

        let mut counts = SyncCounts {
            considered: ids.len() as u32,
            ..SyncCounts::default()
        };

        for video_id in &ids {
            if token.is_cancelled() {
                return Err((counts, SyncError::Cancelled));
            }
            match self.store.is_uploaded(video_id).await {
                Ok(true) => {
                    counts.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => return Err((counts, err)),
            }
            if let Err(err) = self
                .sync_one(channel_id, &channel_url, video_id, token, &mut counts)
                .await
            {
                return Err((counts, err));
            }
        }

        info!(
            channel_id,
            considered = counts.considered,
            skipped = counts.skipped,
            downloaded = counts.downloaded,
            uploaded = counts.uploaded,
            "channel sync complete"
        );
        Ok(counts)
    }

    #[instrument(skip(self, token))]
    pub async fn sync_video(&self, video_id: &str, token: &CancellationToken) -> SyncOutcome {
        let mut counts = SyncCounts {
            considered: 1,
            ..SyncCounts::default()
        };
        match self.store.is_uploaded(video_id).await {
            Ok(true) => {
                counts.skipped = 1;
                return Ok(counts);
            }
            Ok(false) => {}
            Err(err) => return Err((counts, err)),
        }
        let candidate = self
            .store
            .get_candidate(video_id)
            .await
            .map_err(|err| (counts, err))?;
        let channel_id = candidate
            .as_ref()
            .map(|c| c.channel_id.clone())
            .unwrap_or_default();
        let channel = self
            .store
            .get_channel(&channel_id)
            .await
            .map_err(|err| (counts, err))?;
        let video_url = channel
            .as_ref()
            .map(|c| c.url.clone())
            .unwrap_or_else(|| video_id.to_string());

        if let Err(err) = self
            .sync_one(&channel_id, &video_url, video_id, token, &mut counts)
            .await
        {
            return Err((counts, err));
        }
        Ok(counts)
    }

    /// Download → publish → mark_uploaded for exactly one video. Aborts
    /// without writing an uploads row if either adapter call fails.
    async fn sync_one(
        &self,
        channel_id: &str,
        video_url: &str,
        video_id: &str,
        token: &CancellationToken,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        let files = run_cancellable(
            token,
            self.fetcher.download_video(video_id, video_url, &self.output_dir),
        )
        .await?;
        counts.downloaded += 1;

        let mut platform_video_id = None;
        for file in &files {
            if let Some(id) = run_cancellable(token, self.publisher.upload(video_id, file)).await? {
                platform_video_id = Some(id);
            }
        }

        self.store
            .mark_uploaded(video_id, Some(channel_id), platform_video_id.as_deref())
            .await?;
        counts.uploaded += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Channel, VideoCandidate};
    use crate::fetcher::FakeFetcher;
    use crate::publisher::FakePublisher;
    use chrono::Utc;
    use std::collections::HashMap;

    fn candidate(id: &str, channel_id: &str) -> VideoCandidate {
        VideoCandidate {
            video_id: id.into(),
            channel_id: channel_id.into(),
            title: "t".into(),
            description: String::new(),
            duration_seconds: 100,
            view_count: 1000,
            like_count: 10,
            comment_count: 1,
            published_at: Some(Utc::now()),
            discovered_at: Utc::now(),
            thumbnail_url: String::new(),
            tags: vec![],
            category: String::new(),
            language: String::new(),
            view_velocity: 0.0,
            engagement_rate: 0.0,
        }
    }

    async fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("sync.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn zero_limit_produces_all_zeros_and_no_side_effects() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["vA".into()])]),
            candidates_by_id: HashMap::new(),
            fail_download: false,
        };
        let publisher = FakePublisher {
            responses: HashMap::new(),
            fail_for: vec![],
        };
        let controller = Controller::new(store, fetcher, publisher, PathBuf::from("/tmp")).unwrap();
        let counts = controller
            .sync_channel("c1", 0, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(counts, SyncCounts::default());
    }

    #[tokio::test]
    async fn idempotent_sync_second_call_skips() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        store.upsert_candidate(&candidate("vA", "c1")).await.unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["vA".into()])]),
            candidates_by_id: HashMap::new(),
            fail_download: false,
        };
        let publisher = FakePublisher {
            responses: HashMap::from([("vA".to_string(), Some("bvid-a".to_string()))]),
            fail_for: vec![],
        };
        let controller = Controller::new(store, fetcher, publisher, PathBuf::from("/tmp")).unwrap();
        let token = CancellationToken::new();

        let first = controller.sync_channel("c1", 1, &token).await.unwrap();
        assert_eq!(
            first,
            SyncCounts {
                considered: 1,
                skipped: 0,
                downloaded: 1,
                uploaded: 1
            }
        );

        let second = controller.sync_channel("c1", 1, &token).await.unwrap();
        assert_eq!(
            second,
            SyncCounts {
                considered: 1,
                skipped: 1,
                downloaded: 0,
                uploaded: 0
            }
        );
    }

    #[tokio::test]
    async fn publish_failure_leaves_no_uploads_row() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        store.upsert_candidate(&candidate("vA", "c1")).await.unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["vA".into()])]),
            candidates_by_id: HashMap::new(),
            fail_download: false,
        };
        let publisher = FakePublisher {
            responses: HashMap::new(),
            fail_for: vec!["vA".to_string()],
        };
        let controller = Controller::new(store.clone(), fetcher, publisher, PathBuf::from("/tmp")).unwrap();
        let (counts, err) = controller
            .sync_channel("c1", 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());
        assert_eq!(
            counts,
            SyncCounts {
                considered: 1,
                skipped: 0,
                downloaded: 1,
                uploaded: 0
            }
        );
        assert!(!store.is_uploaded("vA").await.unwrap());
    }

    #[tokio::test]
    async fn download_failure_aborts_with_partial_counts() {
        let (_dir, store) = open_store().await;
        store
            .add_channel(&Channel::new("c1", "Chan", "https://example.com/c1"))
            .await
            .unwrap();
        let fetcher = FakeFetcher {
            video_ids_by_channel: HashMap::from([("https://example.com/c1".to_string(), vec!["vA".into()])]),
            candidates_by_id: HashMap::new(),
            fail_download: true,
        };
        let publisher = FakePublisher {
            responses: HashMap::new(),
            fail_for: vec![],
        };
        let controller = Controller::new(store, fetcher, publisher, PathBuf::from("/tmp")).unwrap();
        let (counts, err) = controller
            .sync_channel("c1", 1, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_cancelled());
        assert_eq!(
            counts,
            SyncCounts {
                considered: 1,
                skipped: 0,
                downloaded: 0,
                uploaded: 0
            }
        );
    }
}

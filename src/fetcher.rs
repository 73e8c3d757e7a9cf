//! The Fetcher adapter contract (§4.3): pulls channel/video metadata and
//! media from the source platform. One concrete implementation shells out
//! to `yt-dlp`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::domain::VideoCandidate;
use crate::error::{Result, SyncError};

/// Everything the sync core needs to pull from the source platform (§6).
/// Kept dyn-compatible so Scanner/Controller can be generic over it in
/// production and take a literal fake in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Ordered, finite, may be empty.
    async fn list_channel_video_ids(&self, channel_url: &str, limit: u32) -> Result<Vec<String>>;
    /// Full metadata for the first `limit` videos on the channel.
    async fn get_channel_videos_metadata(
        &self,
        channel_url: &str,
        limit: u32,
    ) -> Result<Vec<VideoCandidate>>;
    /// One or more local files in `output_dir`; an empty list is an error
    /// from the caller's perspective (the core treats it as such).
    async fn download_video(
        &self,
        video_id: &str,
        video_url: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// Shells out to `yt-dlp` for listing, metadata and download, parsing its
/// `--dump-single-json` output.
pub struct YtDlpFetcher {
    binary: String,
    cookies_path: Option<PathBuf>,
}

impl YtDlpFetcher {
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            cookies_path: None,
        }
    }

    pub fn with_cookies(mut self, path: PathBuf) -> Self {
        self.cookies_path = Some(path);
        self
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    #[instrument(skip(self))]
    async fn list_channel_video_ids(&self, channel_url: &str, limit: u32) -> Result<Vec<String>> {
        let mut command = self.command();
        command
            .arg("--flat-playlist")
            .arg("--playlist-end")
            .arg(limit.to_string())
            .arg("--print")
            .arg("%(id)s")
            .arg("--no-warnings")
            .arg(channel_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let output = command
            .output()
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("spawning yt-dlp: {err}")))?;
        if !output.status.success() {
            return Err(SyncError::adapter(anyhow::anyhow!(
                "listing channel videos failed for {channel_url} (status {})",
                output.status
            )));
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        Ok(raw
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .take(limit as usize)
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_channel_videos_metadata(
        &self,
        channel_url: &str,
        limit: u32,
    ) -> Result<Vec<VideoCandidate>> {
        let video_ids = self.list_channel_video_ids(channel_url, limit).await?;
        let mut candidates = Vec::with_capacity(video_ids.len());
        for video_id in &video_ids {
            let video_url = format!("https://www.youtube.com/watch?v={video_id}");
            let info = self.fetch_video_info(&video_url).await?;
            candidates.push(info_to_candidate(video_id, &info));
        }
        Ok(candidates)
    }

    #[instrument(skip(self))]
    async fn download_video(
        &self,
        video_id: &str,
        video_url: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let dest_dir = output_dir.join(video_id);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("creating {dest_dir:?}: {err}")))?;
        let dest_template = dest_dir.join("%(id)s.%(ext)s");

        let mut command = self.command();
        command
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg("-o")
            .arg(dest_template.to_string_lossy().to_string())
            .arg(video_url);
        if let Some(cookies) = &self.cookies_path
            && cookies.exists()
        {
            command.arg("--cookies").arg(cookies);
        }

        let status = command
            .status()
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("spawning yt-dlp: {err}")))?;
        if !status.success() {
            return Err(SyncError::adapter(anyhow::anyhow!(
                "download failed for {video_id} (status {status})"
            )));
        }
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&dest_dir)
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("reading {dest_dir:?}: {err}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("reading {dest_dir:?}: {err}")))?
        {
            files.push(entry.path());
        }
        if files.is_empty() {
            return Err(SyncError::adapter(anyhow::anyhow!(
                "download produced no files for {video_id}"
            )));
        }
        debug!(video_id, file_count = files.len(), "video downloaded");
        Ok(files)
    }
}

impl YtDlpFetcher {
    async fn fetch_video_info(&self, video_url: &str) -> Result<VideoInfo> {
        let mut command = self.command();
        command
            .arg("--dump-single-json")
            .arg("--skip-download")
            .arg("--no-warnings")
            .arg("--no-progress")
            .arg(video_url)
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(cookies) = &self.cookies_path
            && cookies.exists()
        {
            command.arg("--cookies").arg(cookies);
        }

        let output = command
            .output()
            .await
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("spawning yt-dlp: {err}")))?;
        if !output.status.success() {
            return Err(SyncError::adapter(anyhow::anyhow!(
                "metadata command failed for {video_url} (status {})",
                output.status
            )));
        }
        let raw_json = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&raw_json)
            .map_err(|err| SyncError::adapter(anyhow::anyhow!("deserializing metadata JSON: {err}")))
    }
}

/// Minimal subset of `yt-dlp --dump-single-json`'s payload. Everything is
/// optional: older videos routinely lack one field or another.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<String>,
    fulltitle: Option<String>,
    description: Option<String>,
    like_count: Option<i64>,
    view_count: Option<i64>,
    comment_count: Option<i64>,
    upload_date: Option<String>,
    #[serde(default)]
    release_timestamp: Option<i64>,
    duration: Option<i64>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
}

fn upload_date_to_instant(value: &str) -> Option<DateTime<Utc>> {
    if value.len() != 8 {
        return None;
    }
    let year = value[0..4].parse().ok()?;
    let month = value[4..6].parse().ok()?;
    let day = value[6..8].parse().ok()?;
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

fn info_to_candidate(video_id: &str, info: &VideoInfo) -> VideoCandidate {
    let title = info
        .fulltitle
        .clone()
        .or_else(|| info.title.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| video_id.to_string());

    let published_at = info
        .upload_date
        .as_deref()
        .and_then(upload_date_to_instant)
        .or_else(|| {
            info.release_timestamp
                .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
        });

    let category = info
        .categories
        .as_ref()
        .and_then(|categories| categories.first())
        .cloned()
        .unwrap_or_default();

    let mut candidate = VideoCandidate {
        video_id: video_id.to_string(),
        channel_id: info.channel_id.clone().unwrap_or_default(),
        title,
        description: info.description.clone().unwrap_or_default(),
        duration_seconds: info.duration.unwrap_or(0),
        view_count: info.view_count.unwrap_or(0),
        like_count: info.like_count.unwrap_or(0),
        comment_count: info.comment_count.unwrap_or(0),
        published_at,
        discovered_at: Utc::now(),
        thumbnail_url: info.thumbnail.clone().unwrap_or_default(),
        tags: info.tags.clone().unwrap_or_default(),
        category,
        language: info.language.clone().unwrap_or_default(),
        view_velocity: 0.0,
        engagement_rate: 0.0,
    };
    let now = candidate.discovered_at;
    candidate.recompute_metrics(now);
    candidate
}

/// A literal, in-memory `Fetcher` for tests, no process spawned.
#[cfg(any(test, feature = "test-support"))]
pub struct FakeFetcher {
    pub video_ids_by_channel: HashMap<String, Vec<String>>,
    pub candidates_by_id: HashMap<String, VideoCandidate>,
    pub fail_download: bool,
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl Fetcher for FakeFetcher {
    async fn list_channel_video_ids(&self, channel_url: &str, limit: u32) -> Result<Vec<String>> {
        Ok(self
            .video_ids_by_channel
            .get(channel_url)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn get_channel_videos_metadata(
        &self,
        channel_url: &str,
        limit: u32,
    ) -> Result<Vec<VideoCandidate>> {
        let ids = self.list_channel_video_ids(channel_url, limit).await?;
        Ok(ids
            .iter()
            .filter_map(|id| self.candidates_by_id.get(id).cloned())
            .collect())
    }

    async fn download_video(
        &self,
        video_id: &str,
        _video_url: &str,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        if self.fail_download {
            return Err(SyncError::adapter(anyhow::anyhow!("download failed for {video_id}")));
        }
        Ok(vec![output_dir.join(format!("{video_id}.mp4"))])
    }
}

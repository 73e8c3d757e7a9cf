//! Core entities of the discovery/filtering/sync pipeline.
//!
//! These mirror exactly what is persisted: field names line up with the
//! `snake_case` table/column names in [`crate::store`], which form the
//! stable external contract exposed to the CLI and adapter boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monitored source channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: String,
    pub name: String,
    pub url: String,
    pub subscriber_count: i64,
    pub video_count: i64,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub scan_frequency_hours: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub const DEFAULT_SCAN_FREQUENCY_HOURS: i64 = 6;

    /// A channel as freshly discovered by an operator, not yet persisted.
    pub fn new(channel_id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            name: name.into(),
            url: url.into(),
            subscriber_count: 0,
            video_count: 0,
            last_scanned_at: None,
            scan_frequency_hours: Self::DEFAULT_SCAN_FREQUENCY_HOURS,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// A discovered video, with write-time derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCandidate {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub duration_seconds: i64,
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub view_velocity: f64,
    #[serde(default)]
    pub engagement_rate: f64,
}

impl VideoCandidate {
    /// Recomputes `view_velocity` and `engagement_rate` from the raw fields,
    /// per the derivations in the data model: both are write-time, not
    /// view-time, so callers must invoke this before persisting.
    pub fn recompute_metrics(&mut self, now: DateTime<Utc>) {
        self.view_velocity = match self.published_at {
            Some(published) if self.view_count > 0 => {
                let hours = (now - published).num_seconds() as f64 / 3600.0;
                self.view_count as f64 / hours.max(1.0)
            }
            _ => 0.0,
        };
        self.engagement_rate = if self.view_count > 0 {
            (self.like_count + self.comment_count) as f64 / self.view_count as f64
        } else {
            0.0
        };
    }
}

/// The six rule types a [`FilterRule`] can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Min,
    Max,
    Blocklist,
    Allowlist,
    Regex,
    AgeDays,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Min => "min",
            RuleType::Max => "max",
            RuleType::Blocklist => "blocklist",
            RuleType::Allowlist => "allowlist",
            RuleType::Regex => "regex",
            RuleType::AgeDays => "age_days",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RuleType {
    type Err = crate::error::SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "min" => Ok(RuleType::Min),
            "max" => Ok(RuleType::Max),
            "blocklist" => Ok(RuleType::Blocklist),
            "allowlist" => Ok(RuleType::Allowlist),
            "regex" => Ok(RuleType::Regex),
            "age_days" => Ok(RuleType::AgeDays),
            other => Err(crate::error::SyncError::Malformed(format!(
                "unknown rule type: {other}"
            ))),
        }
    }
}

/// A filtering constraint, upserted by `rule_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub id: i64,
    pub rule_name: String,
    pub rule_type: RuleType,
    pub field: String,
    pub value: String,
    pub is_active: bool,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
}

/// The external (operator-facing) JSON form of a rule, per §6's "Rule
/// definition external form".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleImport {
    pub name: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub field: String,
    pub value: String,
    #[serde(default)]
    pub priority: Option<i64>,
}

/// One rule-engine verdict about a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecision {
    pub id: i64,
    pub video_id: String,
    pub rule_passed: bool,
    pub reject_rule_name: Option<String>,
    pub reject_reason: Option<String>,
    pub evaluated_at: DateTime<Utc>,
}

/// Proof that a candidate has been published to the destination platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub video_id: String,
    pub channel_id: String,
    pub platform_video_id: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// Summary row returned by `list_rejected_candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedSummary {
    pub video_id: String,
    pub channel_id: String,
    pub title: String,
    pub reject_rule_name: String,
    pub reject_reason: String,
    pub evaluated_at: DateTime<Utc>,
}

//! Rule engine (§4.2): evaluates a candidate against the ordered active
//! ruleset and records the decision.

use chrono::Utc;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::domain::{FilterRule, RuleDecision, RuleType, VideoCandidate};
use crate::error::{Result, SyncError};
use crate::store::Store;

/// The built-in rules seeded by [`RuleEngine::seed_default_rules`].
const DEFAULT_RULES: &[(&str, RuleType, &str, &str, i64)] = &[
    ("min_views", RuleType::Min, "view_count", "1000", 100),
    ("max_age_days", RuleType::AgeDays, "published_at", "30", 90),
    ("min_duration", RuleType::Min, "duration_seconds", "60", 80),
    ("max_duration", RuleType::Max, "duration_seconds", "3600", 80),
    (
        "blocked_categories",
        RuleType::Blocklist,
        "category",
        r#"["News & Politics"]"#,
        70,
    ),
];

/// The outcome of evaluating one rule against one candidate.
enum RuleOutcome {
    Pass,
    Fail { reason: String },
}

pub struct RuleEngine {
    store: Store,
}

impl RuleEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Idempotent: adds each default rule only if a rule of that name is
    /// absent. Re-running leaves the active rule count unchanged.
    #[instrument(skip(self))]
    pub async fn seed_default_rules(&self) -> Result<()> {
        for (name, rule_type, field, value, priority) in DEFAULT_RULES {
            if self.store.get_rule(name).await?.is_some() {
                continue;
            }
            self.store
                .add_rule(&FilterRule {
                    id: 0,
                    rule_name: (*name).to_string(),
                    rule_type: *rule_type,
                    field: (*field).to_string(),
                    value: (*value).to_string(),
                    is_active: true,
                    priority: *priority,
                    created_at: Utc::now(),
                })
                .await?;
        }
        Ok(())
    }

    /// Fetches the active ruleset (already priority-ordered by the store),
    /// applies it in order, short-circuiting on first failure, and always
    /// records exactly one decision row.
    #[instrument(skip(self, candidate), fields(video_id = %candidate.video_id))]
    pub async fn evaluate(&self, candidate: &VideoCandidate) -> Result<RuleDecision> {
        let rules = self.store.list_active_rules().await?;
        let decision = evaluate_against(candidate, &rules);
        let id = self.store.record_rule_decision(&decision).await?;
        if !decision.rule_passed {
            warn!(
                video_id = %candidate.video_id,
                rule = ?decision.reject_rule_name,
                "candidate rejected"
            );
        }
        Ok(RuleDecision { id, ..decision })
    }

    /// Serial evaluation of a batch, same ordering semantics as `evaluate`.
    /// Errors abort the batch (only store I/O can fail here).
    pub async fn evaluate_batch(
        &self,
        candidates: &[VideoCandidate],
    ) -> Result<(Vec<VideoCandidate>, Vec<VideoCandidate>)> {
        let mut passed = Vec::new();
        let mut rejected = Vec::new();
        for candidate in candidates {
            let decision = self.evaluate(candidate).await?;
            if decision.rule_passed {
                passed.push(candidate.clone());
            } else {
                rejected.push(candidate.clone());
            }
        }
        Ok((passed, rejected))
    }

    /// Fetches unevaluated pending candidates and runs them through
    /// `evaluate_batch`. A second call with no new candidates is a no-op.
    #[instrument(skip(self))]
    pub async fn filter_pending_candidates(
        &self,
        limit: u32,
    ) -> Result<(Vec<VideoCandidate>, Vec<VideoCandidate>)> {
        let pending = self.store.list_unevaluated_candidates(limit).await?;
        info!(count = pending.len(), "evaluating unfiltered candidates");
        self.evaluate_batch(&pending).await
    }
}

/// Applies the ordered ruleset to one candidate without touching storage,
/// kept as a pure function so it is unit-testable independent of the store.
fn evaluate_against(candidate: &VideoCandidate, rules: &[FilterRule]) -> RuleDecision {
    for rule in rules {
        if !rule.is_active {
            continue;
        }
        if let RuleOutcome::Fail { reason } = evaluate_rule(rule, candidate) {
            return RuleDecision {
                id: 0,
                video_id: candidate.video_id.clone(),
                rule_passed: false,
                reject_rule_name: Some(rule.rule_name.clone()),
                reject_reason: Some(reason),
                evaluated_at: Utc::now(),
            };
        }
    }
    RuleDecision {
        id: 0,
        video_id: candidate.video_id.clone(),
        rule_passed: true,
        reject_rule_name: None,
        reject_reason: None,
        evaluated_at: Utc::now(),
    }
}

fn numeric_field(candidate: &VideoCandidate, field: &str) -> Option<f64> {
    match field {
        "view_count" => Some(candidate.view_count as f64),
        "like_count" => Some(candidate.like_count as f64),
        "comment_count" => Some(candidate.comment_count as f64),
        "duration_seconds" => Some(candidate.duration_seconds as f64),
        "view_velocity" => Some(candidate.view_velocity),
        "engagement_rate" => Some(candidate.engagement_rate),
        _ => None,
    }
}

fn string_field<'a>(candidate: &'a VideoCandidate, field: &str) -> Option<&'a str> {
    match field {
        "category" => Some(candidate.category.as_str()),
        "language" => Some(candidate.language.as_str()),
        "channel_id" => Some(candidate.channel_id.as_str()),
        _ => None,
    }
}

fn regex_field<'a>(candidate: &'a VideoCandidate, field: &str) -> Option<&'a str> {
    match field {
        "title" => Some(candidate.title.as_str()),
        "description" => Some(candidate.description.as_str()),
        "category" => Some(candidate.category.as_str()),
        _ => None,
    }
}

/// Evaluates exactly one rule against one candidate. Unknown fields and
/// malformed values are lenient (they pass), per §4.2's table.
fn evaluate_rule(rule: &FilterRule, candidate: &VideoCandidate) -> RuleOutcome {
    match rule.rule_type {
        RuleType::Min => match (numeric_field(candidate, &rule.field), rule.value.parse::<f64>()) {
            (Some(actual), Ok(threshold)) if actual < threshold => RuleOutcome::Fail {
                reason: format!(
                    "{} {} is below minimum {}",
                    rule.field, actual, threshold
                ),
            },
            _ => RuleOutcome::Pass,
        },
        RuleType::Max => match (numeric_field(candidate, &rule.field), rule.value.parse::<f64>()) {
            (Some(actual), Ok(threshold)) if actual > threshold => RuleOutcome::Fail {
                reason: format!(
                    "{} {} is above maximum {}",
                    rule.field, actual, threshold
                ),
            },
            _ => RuleOutcome::Pass,
        },
        RuleType::Blocklist => match (
            string_field(candidate, &rule.field),
            serde_json::from_str::<Vec<String>>(&rule.value),
        ) {
            (Some(actual), Ok(list)) => {
                if list.iter().any(|v| v.eq_ignore_ascii_case(actual)) {
                    RuleOutcome::Fail {
                        reason: format!("{} {} is blocklisted", rule.field, actual),
                    }
                } else {
                    RuleOutcome::Pass
                }
            }
            _ => RuleOutcome::Pass,
        },
        RuleType::Allowlist => match (
            string_field(candidate, &rule.field),
            serde_json::from_str::<Vec<String>>(&rule.value),
        ) {
            (Some(actual), Ok(list)) => {
                if list.is_empty() || list.iter().any(|v| v.eq_ignore_ascii_case(actual)) {
                    RuleOutcome::Pass
                } else {
                    RuleOutcome::Fail {
                        reason: format!("{} {} is not allowlisted", rule.field, actual),
                    }
                }
            }
            _ => RuleOutcome::Pass,
        },
        RuleType::Regex => match (regex_field(candidate, &rule.field), Regex::new(&rule.value)) {
            (Some(actual), Ok(pattern)) => {
                if pattern.is_match(actual) {
                    RuleOutcome::Fail {
                        reason: format!("{} matches blocked pattern {}", rule.field, rule.value),
                    }
                } else {
                    RuleOutcome::Pass
                }
            }
            _ => RuleOutcome::Pass,
        },
        RuleType::AgeDays => match (candidate.published_at, rule.value.parse::<i64>()) {
            (Some(published), Ok(max_days)) => {
                let age_days = (Utc::now() - published).num_days();
                if age_days > max_days {
                    RuleOutcome::Fail {
                        reason: format!("published {} days ago, older than {}", age_days, max_days),
                    }
                } else {
                    RuleOutcome::Pass
                }
            }
            _ => RuleOutcome::Pass,
        },
    }
}

/// Parses the operator-facing JSON rule form (§6) into [`FilterRule`]s ready
/// to be upserted. Unlike rule *evaluation*, malformed import input is a
/// hard error, since there is no candidate to be lenient towards.
pub fn import_rules_from_json(json: &str) -> Result<Vec<FilterRule>> {
    let imports: Vec<crate::domain::RuleImport> =
        serde_json::from_str(json).map_err(|err| SyncError::Malformed(err.to_string()))?;
    Ok(imports
        .into_iter()
        .map(|import| FilterRule {
            id: 0,
            rule_name: import.name,
            rule_type: import.rule_type,
            field: import.field,
            value: import.value,
            is_active: true,
            priority: import.priority.unwrap_or(0),
            created_at: Utc::now(),
        })
        .collect())
}

pub fn export_rules_to_json(rules: &[FilterRule]) -> Result<String> {
    let imports: Vec<crate::domain::RuleImport> = rules
        .iter()
        .map(|rule| crate::domain::RuleImport {
            name: rule.rule_name.clone(),
            rule_type: rule.rule_type,
            field: rule.field.clone(),
            value: rule.value.clone(),
            priority: Some(rule.priority),
        })
        .collect();
    serde_json::to_string_pretty(&imports).map_err(|err| SyncError::Malformed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate() -> VideoCandidate {
        VideoCandidate {
            video_id: "v1".into(),
            channel_id: "c1".into(),
            title: "A normal title".into(),
            description: String::new(),
            duration_seconds: 300,
            view_count: 5000,
            like_count: 50,
            comment_count: 10,
            published_at: Some(Utc::now() - Duration::days(1)),
            discovered_at: Utc::now(),
            thumbnail_url: String::new(),
            tags: vec![],
            category: "Entertainment".into(),
            language: "en".into(),
            view_velocity: 0.0,
            engagement_rate: 0.0,
        }
    }

    fn rule(name: &str, rule_type: RuleType, field: &str, value: &str, priority: i64) -> FilterRule {
        FilterRule {
            id: 0,
            rule_name: name.into(),
            rule_type,
            field: field.into(),
            value: value.into(),
            is_active: true,
            priority,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn min_rule_passes_exactly_at_threshold() {
        let r = rule("min_views", RuleType::Min, "view_count", "5000", 100);
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn max_rule_passes_exactly_at_threshold() {
        let r = rule("max_duration", RuleType::Max, "duration_seconds", "300", 100);
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn age_days_passes_exactly_at_threshold() {
        let mut c = candidate();
        c.published_at = Some(Utc::now() - Duration::days(30));
        let r = rule("max_age", RuleType::AgeDays, "published_at", "30", 100);
        let decision = evaluate_against(&c, &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn age_days_passes_when_published_at_missing() {
        let mut c = candidate();
        c.published_at = None;
        let r = rule("max_age", RuleType::AgeDays, "published_at", "30", 100);
        let decision = evaluate_against(&c, &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn blocklist_is_case_insensitive() {
        let mut c = candidate();
        c.category = "news & politics".into();
        let r = rule(
            "blocked",
            RuleType::Blocklist,
            "category",
            r#"["News & Politics"]"#,
            100,
        );
        let decision = evaluate_against(&c, &[r]);
        assert!(!decision.rule_passed);
        assert_eq!(decision.reject_rule_name.as_deref(), Some("blocked"));
    }

    #[test]
    fn allowlist_empty_list_passes_everything() {
        let r = rule("allow", RuleType::Allowlist, "category", "[]", 100);
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn allowlist_rejects_categories_not_listed() {
        let mut c = candidate();
        c.category = "Education".into();
        let r = rule("allow", RuleType::Allowlist, "category", r#"["Gaming","Music"]"#, 100);
        let decision = evaluate_against(&c, &[r]);
        assert!(!decision.rule_passed);
    }

    #[test]
    fn regex_rule_rejects_matching_title() {
        let mut c = candidate();
        c.title = "Sponsored Low Views".into();
        let r = rule("block_sponsored", RuleType::Regex, "title", "(?i)sponsored", 50);
        let decision = evaluate_against(&c, &[r]);
        assert!(!decision.rule_passed);
    }

    #[test]
    fn priority_tie_break_prefers_higher_priority_rule() {
        let mut c = candidate();
        c.title = "Sponsored Low Views".into();
        c.view_count = 100;
        let min_views = rule("min_views", RuleType::Min, "view_count", "1000", 100);
        let block_sponsored = rule("block_sponsored", RuleType::Regex, "title", "(?i)sponsored", 50);
        // Store returns rules already ordered by priority desc; simulate that here.
        let decision = evaluate_against(&c, &[min_views, block_sponsored]);
        assert!(!decision.rule_passed);
        assert_eq!(decision.reject_rule_name.as_deref(), Some("min_views"));
    }

    #[test]
    fn unknown_field_passes_leniently() {
        let r = rule("weird", RuleType::Min, "not_a_real_field", "1000", 100);
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn malformed_value_passes_leniently() {
        let r = rule("weird", RuleType::Min, "view_count", "not-a-number", 100);
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn inactive_rules_are_skipped() {
        let mut r = rule("min_views", RuleType::Min, "view_count", "999999", 100);
        r.is_active = false;
        let decision = evaluate_against(&candidate(), &[r]);
        assert!(decision.rule_passed);
    }

    #[test]
    fn import_rejects_malformed_json() {
        assert!(import_rules_from_json("not json").is_err());
    }

    #[test]
    fn import_export_round_trips() {
        let json = r#"[{"name":"min_views","type":"min","field":"view_count","value":"1000","priority":100}]"#;
        let rules = import_rules_from_json(json).unwrap();
        assert_eq!(rules.len(), 1);
        let exported = export_rules_to_json(&rules).unwrap();
        let reimported = import_rules_from_json(&exported).unwrap();
        assert_eq!(reimported[0].rule_name, "min_views");
    }
}

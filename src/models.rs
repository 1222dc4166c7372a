use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{NudgeError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub resume_uploaded: bool,
    #[serde(default)]
    pub goal_tags: Vec<String>,
    pub karma: i64,
    pub projects_added: i64,
    #[serde(default)]
    pub quiz_history: Vec<String>,
    #[serde(default)]
    pub clubs_joined: Vec<String>,
    pub buddy_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    #[serde(default)]
    pub login_streak: i64,
    #[serde(default)]
    pub posts_created: i64,
    #[serde(default)]
    pub buddies_interacted: i64,
    /// `YYYY-MM-DD`; parsed lazily so a bad value surfaces as `InvalidInput`.
    pub last_event_attended: Option<String>,
    #[serde(default)]
    pub last_quiz_taken: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSnapshot {
    #[serde(default)]
    pub batch_avg_projects: i64,
    pub batch_resume_uploaded_pct: i64,
    #[serde(default)]
    pub batch_event_attendance: BTreeMap<String, i64>,
    /// Kept exactly as received: duplicates count towards the buddy factor.
    #[serde(default)]
    pub buddies_attending_events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub user_id: String,
    pub profile: UserProfile,
    pub activity: UserActivity,
    pub peer_snapshot: PeerSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NudgeKind {
    Profile,
    Event,
    Quiz,
}

impl NudgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeKind::Profile => "profile",
            NudgeKind::Event => "event",
            NudgeKind::Quiz => "quiz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nudge {
    #[serde(rename = "type")]
    pub kind: NudgeKind,
    pub title: String,
    pub action: String,
    pub priority: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub user_id: String,
    pub nudges: Vec<Nudge>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FomoFactors {
    pub buddy_attendance: usize,
    pub total_buddies: i64,
    pub days_since_last_event: i64,
    pub batch_attendance: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FomoInsights {
    pub score: f64,
    pub level: &'static str,
    pub factors: FomoFactors,
    pub recommendations: Vec<String>,
}

/// One labelled row of the offline training dataset.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureRow {
    pub resume_uploaded: u8,
    pub karma: i64,
    pub projects_added: i64,
    pub login_streak: i64,
    pub posts_created: i64,
    pub quizzes_taken: usize,
    pub clubs_joined: usize,
    pub buddies_interacted: i64,
    pub batch_resume_uploaded_pct: i64,
    pub event_fomo_score: f64,
    pub should_nudge_resume: u8,
    pub should_nudge_event: u8,
    pub should_nudge_quiz: u8,
}

#[derive(Debug, Clone)]
pub struct NudgeHistoryEntry {
    pub decided_on: NaiveDate,
    pub fomo_score: f64,
    pub kind: String,
    pub title: String,
    pub priority: String,
}

fn non_negative(field: &str, value: i64) -> Result<()> {
    if value < 0 {
        return Err(NudgeError::InvalidInput(format!(
            "{field} must be non-negative, got {value}"
        )));
    }
    Ok(())
}

impl UserProfile {
    pub fn validate(&self) -> Result<()> {
        non_negative("karma", self.karma)?;
        non_negative("projects_added", self.projects_added)?;
        non_negative("buddy_count", self.buddy_count)
    }
}

impl UserActivity {
    pub fn validate(&self) -> Result<()> {
        non_negative("login_streak", self.login_streak)?;
        non_negative("posts_created", self.posts_created)?;
        non_negative("buddies_interacted", self.buddies_interacted)
    }

    pub fn last_event_date(&self) -> Result<NaiveDate> {
        let raw = self.last_event_attended.as_deref().ok_or_else(|| {
            NudgeError::InvalidInput("last_event_attended is required".to_string())
        })?;
        parse_date(raw).ok_or_else(|| {
            NudgeError::InvalidInput(format!(
                "last_event_attended must be YYYY-MM-DD, got {raw:?}"
            ))
        })
    }
}

impl PeerSnapshot {
    pub fn validate(&self) -> Result<()> {
        non_negative("batch_avg_projects", self.batch_avg_projects)?;
        if !(0..=100).contains(&self.batch_resume_uploaded_pct) {
            return Err(NudgeError::InvalidInput(format!(
                "batch_resume_uploaded_pct must be within 0..=100, got {}",
                self.batch_resume_uploaded_pct
            )));
        }
        self.validate_attendance()
    }

    pub fn validate_attendance(&self) -> Result<()> {
        for (event, count) in &self.batch_event_attendance {
            non_negative(&format!("batch_event_attendance[{event}]"), *count)?;
        }
        Ok(())
    }

    /// Saturates at `i64::MAX` instead of overflowing.
    pub fn total_batch_attendance(&self) -> i64 {
        self.batch_event_attendance
            .values()
            .fold(0i64, |total, count| total.saturating_add(*count))
    }

    pub fn lead_buddy_event(&self) -> Result<&str> {
        self.buddies_attending_events
            .first()
            .map(String::as_str)
            .ok_or(NudgeError::EmptyListAccess)
    }
}

impl AnalyzeRequest {
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(NudgeError::InvalidInput("user_id is required".to_string()));
        }
        self.profile.validate()?;
        self.activity.validate()?;
        self.peer_snapshot.validate()
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

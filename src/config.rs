use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

use crate::models::NudgeKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRules {
    /// Fraction of the batch (0.0..=1.0) that must have uploaded a resume.
    pub resume_threshold: f64,
    pub projects_avg_threshold: i64,
    pub quiz_idle_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRules {
    pub buddy_attendance_trigger: i64,
    pub batch_attendance_trigger: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityLabels {
    pub resume: String,
    pub event_fomo: String,
    pub quiz: String,
    /// Labels for nudge types this engine does not emit, kept so files round-trip.
    #[serde(flatten)]
    pub other: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    pub profile_rules: ProfileRules,
    pub event_rules: EventRules,
    pub priority_labels: PriorityLabels,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            profile_rules: ProfileRules {
                resume_threshold: 0.7,
                projects_avg_threshold: 2,
                quiz_idle_days: 7,
            },
            event_rules: EventRules {
                buddy_attendance_trigger: 2,
                batch_attendance_trigger: 10,
            },
            priority_labels: PriorityLabels {
                resume: "high".to_string(),
                event_fomo: "medium".to_string(),
                quiz: "low".to_string(),
                other: BTreeMap::from([("project".to_string(), "medium".to_string())]),
            },
        }
    }
}

impl RuleConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rules from {}", path.display()))?;
        let config: RuleConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse rules in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let threshold = self.profile_rules.resume_threshold;
        ensure!(
            (0.0..=1.0).contains(&threshold),
            "resume_threshold must be a fraction between 0 and 1, got {threshold}"
        );
        Ok(())
    }

    pub fn priority_for(&self, kind: NudgeKind) -> &str {
        match kind {
            NudgeKind::Profile => &self.priority_labels.resume,
            NudgeKind::Event => &self.priority_labels.event_fomo,
            NudgeKind::Quiz => &self.priority_labels.quiz,
        }
    }

    /// Percentage (0..=100) the batch must reach for the resume rule.
    pub fn resume_pct_threshold(&self) -> f64 {
        self.profile_rules.resume_threshold * 100.0
    }
}

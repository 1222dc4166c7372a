use std::sync::Arc;

use chrono::NaiveDate;

use crate::config::RuleConfig;
use crate::error::{NudgeError, Result};
use crate::fomo;
use crate::models::{
    AnalyzeRequest, AnalyzeResponse, Nudge, NudgeKind, PeerSnapshot, UserActivity, UserProfile,
};
use crate::oracle::{Oracle, OracleSet};

pub const MAX_NUDGES: usize = 3;
pub const STATUS_SUCCESS: &str = "success";
const QUIZ_DAYS_DISPLAY_CAP: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OraclePolicy {
    /// Reject the request with `ModelUnavailable`.
    #[default]
    Strict,
    /// Evaluate rules only; the missing oracle never triggers.
    RuleOnly,
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub response: AnalyzeResponse,
    pub fomo_score: f64,
}

pub struct NudgeDecider {
    rules: Arc<RuleConfig>,
    oracles: OracleSet,
    policy: OraclePolicy,
}

impl NudgeDecider {
    pub fn new(rules: Arc<RuleConfig>, oracles: OracleSet, policy: OraclePolicy) -> Self {
        Self {
            rules,
            oracles,
            policy,
        }
    }

    pub fn analyze(&self, request: &AnalyzeRequest, today: NaiveDate) -> Result<Decision> {
        request.validate()?;
        self.decide(
            &request.user_id,
            &request.profile,
            &request.activity,
            &request.peer_snapshot,
            today,
        )
    }

    pub fn decide(
        &self,
        user_id: &str,
        profile: &UserProfile,
        activity: &UserActivity,
        peer: &PeerSnapshot,
        today: NaiveDate,
    ) -> Result<Decision> {
        profile.validate()?;
        activity.validate()?;
        peer.validate()?;

        if self.policy == OraclePolicy::Strict {
            if self.oracles.resume.is_none() {
                return Err(NudgeError::ModelUnavailable("resume"));
            }
            if self.oracles.event.is_none() {
                return Err(NudgeError::ModelUnavailable("event"));
            }
        }

        let parts = fomo::breakdown(profile, activity, peer, today)?;
        let fomo_score = parts.score;
        tracing::debug!(
            user_id,
            buddy = parts.buddy_score,
            batch = parts.batch_score,
            time = parts.time_score,
            raw = parts.raw,
            fomo_score,
            "fomo scored"
        );
        let mut nudges = Vec::with_capacity(MAX_NUDGES);

        let resume_rule = self.resume_rule(profile, peer);
        let resume_model = self.consult(
            "resume",
            self.oracles.resume.as_deref(),
            &[
                f64::from(u8::from(profile.resume_uploaded)),
                peer.batch_resume_uploaded_pct as f64 / 100.0,
            ],
        )?;
        if resume_rule || resume_model {
            tracing::debug!(user_id, resume_rule, resume_model, "profile nudge triggered");
            nudges.push(self.nudge(
                NudgeKind::Profile,
                format!(
                    "{}% of your batch has uploaded a resume. Upload yours to stay visible to recruiters",
                    peer.batch_resume_uploaded_pct
                ),
                "Upload Resume",
            ));
        }

        let event_rule = self.event_rule(peer);
        let event_model = self.consult(
            "event",
            self.oracles.event.as_deref(),
            &[profile.karma as f64, fomo_score],
        )?;
        if event_rule || event_model {
            tracing::debug!(user_id, event_rule, event_model, fomo_score, "event nudge triggered");
            nudges.push(self.nudge(NudgeKind::Event, event_title(peer), "View Events"));
        }

        if let Ok(last_event) = activity.last_event_date() {
            let idle_days = fomo::days_since(last_event, today);
            if idle_days >= self.rules.profile_rules.quiz_idle_days {
                tracing::debug!(user_id, idle_days, "quiz nudge triggered");
                nudges.push(self.nudge(
                    NudgeKind::Quiz,
                    format!(
                        "It's been {} days since your last event. Take a quick quiz to stay sharp",
                        display_days(idle_days)
                    ),
                    "Take Quiz",
                ));
            }
        }

        nudges.truncate(MAX_NUDGES);

        Ok(Decision {
            response: AnalyzeResponse {
                user_id: user_id.to_string(),
                nudges,
                status: STATUS_SUCCESS.to_string(),
            },
            fomo_score,
        })
    }

    fn resume_rule(&self, profile: &UserProfile, peer: &PeerSnapshot) -> bool {
        !profile.resume_uploaded
            && peer.batch_resume_uploaded_pct as f64 >= self.rules.resume_pct_threshold()
            && profile.projects_added >= self.rules.profile_rules.projects_avg_threshold
    }

    fn event_rule(&self, peer: &PeerSnapshot) -> bool {
        let rules = &self.rules.event_rules;
        peer.buddies_attending_events.len() as i64 > rules.buddy_attendance_trigger
            && peer.total_batch_attendance() > rules.batch_attendance_trigger
    }

    fn consult(
        &self,
        name: &'static str,
        oracle: Option<&dyn Oracle>,
        features: &[f64],
    ) -> Result<bool> {
        match oracle {
            Some(oracle) => Ok(oracle.predict(features)? == 1),
            None if self.policy == OraclePolicy::RuleOnly => {
                tracing::warn!(model = name, "model not loaded, using rules only");
                Ok(false)
            }
            None => Err(NudgeError::ModelUnavailable(name)),
        }
    }

    fn nudge(&self, kind: NudgeKind, title: String, action: &str) -> Nudge {
        Nudge {
            kind,
            title,
            action: action.to_string(),
            priority: self.rules.priority_for(kind).to_string(),
        }
    }
}

fn event_title(peer: &PeerSnapshot) -> String {
    match peer.lead_buddy_event() {
        Ok(event) => format!(
            "{} of your buddies are heading to events. Join them at {}",
            peer.buddies_attending_events.len(),
            event
        ),
        Err(_) => "Your batch is heading to events. Don't miss the next one".to_string(),
    }
}

fn display_days(days: i64) -> String {
    if days > QUIZ_DAYS_DISPLAY_CAP {
        format!("{QUIZ_DAYS_DISPLAY_CAP}+")
    } else {
        days.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::testing::fixed;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn days_ago(days: i64) -> Option<String> {
        Some((today() - Duration::days(days)).format("%Y-%m-%d").to_string())
    }

    fn request() -> AnalyzeRequest {
        AnalyzeRequest {
            user_id: "stu_7023".to_string(),
            profile: UserProfile {
                resume_uploaded: true,
                goal_tags: vec!["AI".to_string()],
                karma: 386,
                projects_added: 0,
                quiz_history: vec!["sql".to_string()],
                clubs_joined: vec![],
                buddy_count: 0,
            },
            activity: UserActivity {
                login_streak: 1,
                posts_created: 0,
                buddies_interacted: 3,
                last_event_attended: days_ago(0),
                last_quiz_taken: None,
            },
            peer_snapshot: PeerSnapshot {
                batch_avg_projects: 3,
                batch_resume_uploaded_pct: 40,
                batch_event_attendance: [("tech-talk".to_string(), 1)].into_iter().collect(),
                buddies_attending_events: vec!["tech-talk".to_string()],
            },
        }
    }

    fn decider(resume: u8, event: u8) -> NudgeDecider {
        NudgeDecider::new(
            Arc::new(RuleConfig::default()),
            OracleSet {
                resume: fixed(resume),
                event: fixed(event),
            },
            OraclePolicy::Strict,
        )
    }

    fn kinds(decision: &Decision) -> Vec<NudgeKind> {
        decision.response.nudges.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn resume_rule_fires_for_lagging_user() {
        let mut request = request();
        request.profile.resume_uploaded = false;
        request.profile.projects_added = 3;
        request.peer_snapshot.batch_resume_uploaded_pct = 80;

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        let nudge = &decision.response.nudges[0];
        assert_eq!(nudge.kind, NudgeKind::Profile);
        assert_eq!(nudge.priority, "high");
        assert!(nudge.title.contains("80%"));
        assert!(nudge.title.to_lowercase().contains("resume"));
    }

    #[test]
    fn resume_rule_needs_enough_projects() {
        let mut request = request();
        request.profile.resume_uploaded = false;
        request.profile.projects_added = 1;
        request.peer_snapshot.batch_resume_uploaded_pct = 80;

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert!(decision.response.nudges.is_empty());
    }

    #[test]
    fn resume_threshold_is_inclusive() {
        let mut request = request();
        request.profile.resume_uploaded = false;
        request.profile.projects_added = 2;
        request.peer_snapshot.batch_resume_uploaded_pct = 70;

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Profile]);
    }

    #[test]
    fn resume_oracle_alone_triggers_profile_nudge() {
        let decision = decider(1, 0).analyze(&request(), today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Profile]);
    }

    #[test]
    fn event_rule_fires_and_names_first_event() {
        let mut request = request();
        request.peer_snapshot.buddies_attending_events = vec![
            "coding-contest".to_string(),
            "tech-talk".to_string(),
            "startup-meetup".to_string(),
        ];
        request.peer_snapshot.batch_event_attendance = [
            ("coding-contest".to_string(), 12),
            ("tech-talk".to_string(), 8),
        ]
        .into_iter()
        .collect();

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Event]);
        let nudge = &decision.response.nudges[0];
        assert!(nudge.title.contains("coding-contest"));
        assert!(nudge.title.starts_with("3 of your buddies"));
        assert_eq!(nudge.priority, "medium");
    }

    #[test]
    fn event_rule_uses_strict_comparisons() {
        let mut request = request();
        request.peer_snapshot.buddies_attending_events =
            vec!["a".to_string(), "b".to_string()];
        request.peer_snapshot.batch_event_attendance =
            [("a".to_string(), 30)].into_iter().collect();

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert!(decision.response.nudges.is_empty());

        request.peer_snapshot.buddies_attending_events.push("c".to_string());
        request.peer_snapshot.batch_event_attendance =
            [("a".to_string(), 10)].into_iter().collect();
        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert!(decision.response.nudges.is_empty());
    }

    #[test]
    fn event_oracle_with_no_buddy_events_uses_fallback_title() {
        let mut request = request();
        request.peer_snapshot.buddies_attending_events.clear();

        let decision = decider(0, 1).analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Event]);
        assert!(decision.response.nudges[0].title.contains("events"));
    }

    struct RecordingOracle(std::sync::Mutex<Vec<Vec<f64>>>);

    impl Oracle for RecordingOracle {
        fn predict(&self, features: &[f64]) -> Result<u8> {
            self.0.lock().unwrap().push(features.to_vec());
            Ok(0)
        }
    }

    #[test]
    fn oracles_receive_derived_features() {
        let resume = Arc::new(RecordingOracle(Default::default()));
        let event = Arc::new(RecordingOracle(Default::default()));
        let decider = NudgeDecider::new(
            Arc::new(RuleConfig::default()),
            OracleSet {
                resume: Some(resume.clone() as Arc<dyn Oracle>),
                event: Some(event.clone() as Arc<dyn Oracle>),
            },
            OraclePolicy::Strict,
        );

        let mut request = request();
        request.activity.last_event_attended = days_ago(120);
        let decision = decider.analyze(&request, today()).unwrap();

        assert_eq!(resume.0.lock().unwrap()[0], vec![1.0, 0.4]);
        assert_eq!(event.0.lock().unwrap()[0], vec![386.0, decision.fomo_score]);
    }

    #[test]
    fn quiz_nudge_waits_for_idle_days() {
        let decision = decider(0, 0).analyze(&request(), today()).unwrap();
        assert!(decision.response.nudges.is_empty());

        let mut request = request();
        request.activity.last_event_attended = days_ago(7);
        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Quiz]);
        let nudge = &decision.response.nudges[0];
        assert_eq!(nudge.priority, "low");
        assert!(nudge.title.contains("5+ days"));
        assert!(nudge.title.to_lowercase().contains("quiz"));
    }

    #[test]
    fn quiz_title_shows_exact_days_up_to_cap() {
        let mut rules = RuleConfig::default();
        rules.profile_rules.quiz_idle_days = 3;
        let decider = NudgeDecider::new(
            Arc::new(rules),
            OracleSet {
                resume: fixed(0),
                event: fixed(0),
            },
            OraclePolicy::Strict,
        );
        let mut request = request();
        request.activity.last_event_attended = days_ago(4);

        let decision = decider.analyze(&request, today()).unwrap();
        assert!(decision.response.nudges[0].title.contains("been 4 days"));
        assert_eq!(display_days(5), "5");
        assert_eq!(display_days(6), "5+");
    }

    #[test]
    fn all_triggers_keep_fixed_order_and_cap() {
        let mut request = request();
        request.profile.resume_uploaded = false;
        request.activity.last_event_attended = days_ago(400);

        let decision = decider(1, 1).analyze(&request, today()).unwrap();
        assert_eq!(
            kinds(&decision),
            vec![NudgeKind::Profile, NudgeKind::Event, NudgeKind::Quiz]
        );
        assert!(decision.response.nudges.len() <= MAX_NUDGES);
        assert_eq!(decision.response.user_id, "stu_7023");
    }

    #[test]
    fn engaged_user_gets_no_nudges_but_success() {
        let mut request = request();
        request.profile.buddy_count = 5;
        request.profile.projects_added = 3;

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert!(decision.response.nudges.is_empty());
        assert_eq!(decision.response.status, STATUS_SUCCESS);
    }

    #[test]
    fn strict_policy_rejects_missing_model() {
        let decider = NudgeDecider::new(
            Arc::new(RuleConfig::default()),
            OracleSet {
                resume: fixed(0),
                event: None,
            },
            OraclePolicy::Strict,
        );
        let result = decider.analyze(&request(), today());
        assert!(matches!(result, Err(NudgeError::ModelUnavailable("event"))));
    }

    #[test]
    fn rule_only_policy_keeps_rule_triggers() {
        let decider = NudgeDecider::new(
            Arc::new(RuleConfig::default()),
            OracleSet::default(),
            OraclePolicy::RuleOnly,
        );
        let mut request = request();
        request.profile.resume_uploaded = false;
        request.profile.projects_added = 4;
        request.peer_snapshot.batch_resume_uploaded_pct = 90;
        request.activity.last_event_attended = days_ago(30);

        let decision = decider.analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Profile, NudgeKind::Quiz]);
    }

    #[test]
    fn huge_attendance_counts_still_trigger_event_rule() {
        let mut request = request();
        request.peer_snapshot.buddies_attending_events =
            vec!["a".to_string(), "b".to_string(), "c".to_string()];
        request.peer_snapshot.batch_event_attendance = [
            ("a".to_string(), 5_000_000_000_000_000_000),
            ("b".to_string(), 5_000_000_000_000_000_000),
        ]
        .into_iter()
        .collect();

        let decision = decider(0, 0).analyze(&request, today()).unwrap();
        assert_eq!(kinds(&decision), vec![NudgeKind::Event]);
    }

    #[test]
    fn decide_validates_its_inputs() {
        let mut request = request();
        request.profile.karma = -50;
        let result = decider(1, 1).decide(
            &request.user_id,
            &request.profile,
            &request.activity,
            &request.peer_snapshot,
            today(),
        );
        assert!(matches!(result, Err(NudgeError::InvalidInput(_))));

        let mut request = self::request();
        request.peer_snapshot.batch_resume_uploaded_pct = 250;
        let result = decider(1, 1).decide(
            &request.user_id,
            &request.profile,
            &request.activity,
            &request.peer_snapshot,
            today(),
        );
        assert!(matches!(result, Err(NudgeError::InvalidInput(_))));
    }

    #[test]
    fn missing_event_date_rejects_request() {
        let mut request = request();
        request.activity.last_event_attended = None;
        let result = decider(1, 1).analyze(&request, today());
        assert!(matches!(result, Err(NudgeError::InvalidInput(_))));
    }
}

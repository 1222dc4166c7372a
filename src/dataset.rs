use std::io::Write;

use chrono::NaiveDate;

use crate::error::Result;
use crate::fomo;
use crate::models::{parse_date, AnalyzeRequest, FeatureRow};

/// Batch resume share (percent) above which a lagging user is labelled for a resume nudge.
const RESUME_LABEL_PCT: i64 = 80;
const EVENT_LABEL_SCORE: f64 = 0.5;
const QUIZ_OVERDUE_DAYS: i64 = 30;

pub fn feature_row(request: &AnalyzeRequest, today: NaiveDate) -> Result<FeatureRow> {
    let profile = &request.profile;
    let activity = &request.activity;
    let peer = &request.peer_snapshot;

    let fomo_score = fomo::score(profile, activity, peer, today)?;

    // A missing or malformed quiz date counts as overdue.
    let quiz_overdue = activity
        .last_quiz_taken
        .as_deref()
        .and_then(parse_date)
        .map(|taken| fomo::days_since(taken, today) > QUIZ_OVERDUE_DAYS)
        .unwrap_or(true);

    Ok(FeatureRow {
        resume_uploaded: u8::from(profile.resume_uploaded),
        karma: profile.karma,
        projects_added: profile.projects_added,
        login_streak: activity.login_streak,
        posts_created: activity.posts_created,
        quizzes_taken: profile.quiz_history.len(),
        clubs_joined: profile.clubs_joined.len(),
        buddies_interacted: activity.buddies_interacted,
        batch_resume_uploaded_pct: peer.batch_resume_uploaded_pct,
        event_fomo_score: fomo_score,
        should_nudge_resume: u8::from(
            !profile.resume_uploaded && peer.batch_resume_uploaded_pct > RESUME_LABEL_PCT,
        ),
        should_nudge_event: u8::from(fomo_score >= EVENT_LABEL_SCORE),
        should_nudge_quiz: u8::from(quiz_overdue),
    })
}

/// Builds rows for every request that can be scored; the rest are logged and skipped.
pub fn build_rows(requests: &[AnalyzeRequest], today: NaiveDate) -> Vec<FeatureRow> {
    requests
        .iter()
        .filter_map(|request| match feature_row(request, today) {
            Ok(row) => Some(row),
            Err(err) => {
                tracing::warn!(user_id = %request.user_id, error = %err, "skipping entry");
                None
            }
        })
        .collect()
}

pub fn write_features<W: Write>(rows: &[FeatureRow], writer: W) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

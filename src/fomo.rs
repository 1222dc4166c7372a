use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{NudgeError, Result};
use crate::models::{FomoFactors, FomoInsights, PeerSnapshot, UserActivity, UserProfile};

pub const BUDDY_WEIGHT: f64 = 0.4;
pub const BATCH_WEIGHT: f64 = 0.3;
pub const TIME_WEIGHT: f64 = 0.3;
pub const MAX_DAYS_SINCE_EVENT: f64 = 90.0;
// Not read from the rules file.
pub const BATCH_ATTENDANCE_SATURATION: f64 = 10.0;
const SIGMOID_STEEPNESS: f64 = 5.0;
const SIGMOID_MIDPOINT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FomoBreakdown {
    pub buddy_score: f64,
    pub batch_score: f64,
    pub time_score: f64,
    pub days_since_event: i64,
    pub raw: f64,
    pub score: f64,
}

pub fn score(
    profile: &UserProfile,
    activity: &UserActivity,
    peer: &PeerSnapshot,
    today: NaiveDate,
) -> Result<f64> {
    Ok(breakdown(profile, activity, peer, today)?.score)
}

pub fn breakdown(
    profile: &UserProfile,
    activity: &UserActivity,
    peer: &PeerSnapshot,
    today: NaiveDate,
) -> Result<FomoBreakdown> {
    if profile.buddy_count < 0 {
        return Err(NudgeError::InvalidInput(format!(
            "buddy_count must be non-negative, got {}",
            profile.buddy_count
        )));
    }
    peer.validate_attendance()?;
    let last_event = activity.last_event_date()?;

    let buddy = buddy_score(profile.buddy_count, peer.buddies_attending_events.len());
    let batch = batch_score(&peer.batch_event_attendance);
    let days_since_event = days_since(last_event, today);
    let time = time_score(days_since_event);
    let raw = weighted_sum(buddy, batch, time);

    Ok(FomoBreakdown {
        buddy_score: buddy,
        batch_score: batch,
        time_score: time,
        days_since_event,
        raw,
        score: round2(sigmoid(raw)),
    })
}

pub fn buddy_score(buddy_count: i64, buddies_attending: usize) -> f64 {
    if buddy_count <= 0 {
        return 0.0;
    }
    (buddies_attending as f64 / buddy_count as f64).min(1.0)
}

pub fn batch_score(attendance: &BTreeMap<String, i64>) -> f64 {
    if attendance.is_empty() {
        return 0.0;
    }
    let total: f64 = attendance
        .values()
        .map(|count| (*count as f64 / BATCH_ATTENDANCE_SATURATION).min(1.0))
        .sum();
    total / attendance.len() as f64
}

/// Capped at 1.0 but not floored: a future-dated event yields a negative factor.
pub fn time_score(days_since_event: i64) -> f64 {
    (days_since_event as f64 / MAX_DAYS_SINCE_EVENT).min(1.0)
}

pub fn days_since(date: NaiveDate, today: NaiveDate) -> i64 {
    (today - date).num_days()
}

pub fn weighted_sum(buddy: f64, batch: f64, time: f64) -> f64 {
    BUDDY_WEIGHT * buddy + BATCH_WEIGHT * batch + TIME_WEIGHT * time
}

pub fn sigmoid(raw: f64) -> f64 {
    1.0 / (1.0 + (-SIGMOID_STEEPNESS * (raw - SIGMOID_MIDPOINT)).exp())
}

/// Two decimals, ties rounded away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn level(score: f64) -> &'static str {
    if score < 0.3 {
        "low"
    } else if score < 0.7 {
        "medium"
    } else {
        "high"
    }
}

pub fn insights(
    profile: &UserProfile,
    activity: &UserActivity,
    peer: &PeerSnapshot,
    today: NaiveDate,
) -> Result<FomoInsights> {
    let parts = breakdown(profile, activity, peer, today)?;
    let mut recommendations = Vec::new();

    if parts.score > 0.7 {
        recommendations.push(
            "High FOMO detected! Consider attending upcoming events to stay connected with your peers."
                .to_string(),
        );
    } else if parts.score > 0.3 {
        recommendations.push(
            "Moderate FOMO level. Keep an eye on event announcements to maintain engagement."
                .to_string(),
        );
    }

    if !peer.buddies_attending_events.is_empty() {
        recommendations.push(format!(
            "Your buddies are attending: {}",
            peer.buddies_attending_events.join(", ")
        ));
    }

    Ok(FomoInsights {
        score: parts.score,
        level: level(parts.score),
        factors: FomoFactors {
            buddy_attendance: peer.buddies_attending_events.len(),
            total_buddies: profile.buddy_count,
            days_since_last_event: parts.days_since_event,
            batch_attendance: peer.batch_event_attendance.clone(),
        },
        recommendations,
    })
}

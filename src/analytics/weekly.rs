use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const WINDOW_DAYS: u64 = 7;

/// One persisted score as read back for analytics. `score` is optional
/// because older rows may lack it; such rows still count toward
/// `total_samples`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSample {
    pub uid: String,
    pub score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyScore {
    pub date: NaiveDate,
    pub score: Option<u32>,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub daily: Vec<DailyScore>,
    pub week_average: Option<u32>,
    pub total_samples: u32,
}

impl AnalyticsSummary {
    /// Seven empty days ending on `now`'s UTC date.
    pub fn empty(now: DateTime<Utc>) -> Self {
        aggregate_week(&[], now)
    }
}

#[derive(Default)]
struct Aggregate {
    sum: f64,
    count: u32,
}

/// Midnight UTC six days before `now`'s date.
pub fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let first_day = today
        .checked_sub_days(Days::new(WINDOW_DAYS - 1))
        .unwrap_or(today);
    first_day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Bucket samples into the trailing seven UTC days.
///
/// Always returns exactly seven `daily` entries, oldest first. Samples
/// outside `[window_start(now), now]` are ignored.
pub fn aggregate_week(samples: &[ScoreSample], now: DateTime<Utc>) -> AnalyticsSummary {
    let start = window_start(now);
    let mut buckets: BTreeMap<NaiveDate, Aggregate> = BTreeMap::new();
    let mut total_samples = 0u32;

    for sample in samples {
        if sample.created_at < start || sample.created_at > now {
            continue;
        }
        total_samples += 1;

        let Some(score) = sample.score.filter(|score| score.is_finite()) else {
            continue;
        };
        let bucket = buckets.entry(sample.created_at.date_naive()).or_default();
        bucket.sum += score;
        bucket.count += 1;
    }

    let first_day = start.date_naive();
    let daily: Vec<DailyScore> = (0..WINDOW_DAYS)
        .map(|offset| {
            let date = first_day
                .checked_add_days(Days::new(offset))
                .unwrap_or(first_day);
            match buckets.get(&date) {
                Some(bucket) if bucket.count > 0 => DailyScore {
                    date,
                    score: Some(round_score(bucket.sum / bucket.count as f64)),
                    count: bucket.count,
                },
                _ => DailyScore {
                    date,
                    score: None,
                    count: 0,
                },
            }
        })
        .collect();

    let scored: Vec<u32> = daily.iter().filter_map(|day| day.score).collect();
    let week_average = if scored.is_empty() {
        None
    } else {
        let sum: u32 = scored.iter().sum();
        Some(round_score(sum as f64 / scored.len() as f64))
    };

    AnalyticsSummary {
        daily,
        week_average,
        total_samples,
    }
}

fn round_score(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

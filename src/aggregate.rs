use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::cancel::CancelToken;
use crate::error::ApiError;
use crate::models::{AttendanceRecord, ChartPoint, Emotion, Granularity, Kind};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardQuery {
    /// `None` means every class.
    pub class: Option<String>,
    /// `None` means both check-ins and check-outs.
    pub kind: Option<Kind>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipTally {
    pub malformed_timestamp: usize,
    pub unknown_emotion: usize,
}

impl SkipTally {
    pub fn total(&self) -> usize {
        self.malformed_timestamp + self.unknown_emotion
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Aggregation {
    pub points: Vec<ChartPoint>,
    /// Records that passed the class and kind filters.
    pub matched: usize,
    pub skipped: SkipTally,
}

pub fn matches_filters(record: &AttendanceRecord, query: &DashboardQuery) -> bool {
    if let Some(class) = &query.class {
        if &record.class_label != class {
            return false;
        }
    }
    if let Some(kind) = query.kind {
        if record.kind != kind.as_str() {
            return false;
        }
    }
    true
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

/// Week of the year with weeks starting on Sunday and Jan 1 always in week 1.
pub fn week_number(date: NaiveDate) -> u32 {
    let days_since_jan1 = date.ordinal0();
    let weekday = date.weekday().num_days_from_sunday();
    let jan1_weekday = (weekday + 7 - days_since_jan1 % 7) % 7;
    // ceil((days + jan1_weekday + 1) / 7)
    (days_since_jan1 + jan1_weekday + 7) / 7
}

pub fn bucket_label(at: NaiveDateTime, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => at.format("%d/%m").to_string(),
        Granularity::Month => at.format("%m/%Y").to_string(),
        Granularity::Week | Granularity::All => format!("Week {}", week_number(at.date())),
    }
}

/// Chronological key of a bucket label; unrecognized labels sort as 0.
pub fn sort_key(label: &str) -> i64 {
    if let Some(rest) = label.strip_prefix("Week") {
        return rest.trim().parse().unwrap_or(0);
    }

    let Some((left, right)) = label.split_once('/') else {
        return 0;
    };
    let digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !digits(left) || !digits(right) || left.len() != 2 {
        return 0;
    }

    match (left.parse::<i64>(), right.parse::<i64>(), right.len()) {
        // mm/yyyy
        (Ok(month), Ok(year), 4) => year * 100 + month,
        // dd/mm
        (Ok(day), Ok(month), 2) => month * 100 + day,
        _ => 0,
    }
}

pub fn aggregate(records: &[AttendanceRecord], query: &DashboardQuery) -> Aggregation {
    let mut points: Vec<ChartPoint> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut skipped = SkipTally::default();
    let mut matched = 0usize;

    for record in records.iter().filter(|record| matches_filters(record, query)) {
        matched += 1;

        let Some(at) = parse_timestamp(&record.timestamp) else {
            skipped.malformed_timestamp += 1;
            continue;
        };
        let Some(emotion) = Emotion::from_code(record.emotion_code) else {
            skipped.unknown_emotion += 1;
            continue;
        };

        let label = bucket_label(at, query.granularity);
        let position = *positions.entry(label.clone()).or_insert_with(|| {
            points.push(ChartPoint::new(label));
            points.len() - 1
        });
        points[position].add(emotion, 1);
    }

    points.sort_by_key(|point| sort_key(&point.bucket));

    if skipped.total() > 0 {
        tracing::warn!(
            malformed_timestamp = skipped.malformed_timestamp,
            unknown_emotion = skipped.unknown_emotion,
            "records left out of the dashboard"
        );
    }

    Aggregation {
        points,
        matched,
        skipped,
    }
}

/// Same as [`aggregate`], but refuses to start once the command was cancelled.
pub fn aggregate_checked(
    records: &[AttendanceRecord],
    query: &DashboardQuery,
    cancel: &CancelToken,
) -> Result<Aggregation, ApiError> {
    cancel.check()?;
    Ok(aggregate(records, query))
}

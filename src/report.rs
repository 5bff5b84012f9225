use std::fmt::Write;

use crate::aggregate::{Aggregation, DashboardQuery};
use crate::models::{ChartPoint, Emotion};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no data to export")]
    Empty,
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to finish csv output: {0}")]
    Buffer(String),
}

/// Totals per emotion across every bucket, most frequent first.
pub fn summarize_by_emotion(points: &[ChartPoint]) -> Vec<(Emotion, usize)> {
    let mut totals: std::collections::BTreeMap<Emotion, usize> = std::collections::BTreeMap::new();

    for point in points {
        for (emotion, count) in &point.counts {
            *totals.entry(*emotion).or_insert(0) += *count;
        }
    }

    let mut summary: Vec<(Emotion, usize)> = totals.into_iter().collect();
    summary.sort_by(|a, b| b.1.cmp(&a.1));
    summary
}

/// Emotions present in at least one bucket, in survey order.
pub fn present_emotions(points: &[ChartPoint]) -> Vec<Emotion> {
    Emotion::ALL
        .into_iter()
        .filter(|emotion| points.iter().any(|point| point.count(*emotion) > 0))
        .collect()
}

/// Plain-text dump: one block per bucket, one indented line per emotion.
pub fn render_txt(points: &[ChartPoint]) -> Result<String, ExportError> {
    if points.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut output = String::new();
    for point in points {
        let _ = writeln!(output, "{}:", point.bucket);
        for (emotion, count) in &point.counts {
            let _ = writeln!(output, "  {}: {}", emotion.label(), count);
        }
        let _ = writeln!(output);
    }
    Ok(output)
}

pub fn render_csv(points: &[ChartPoint]) -> Result<String, ExportError> {
    if points.is_empty() {
        return Err(ExportError::Empty);
    }

    let emotions = present_emotions(points);
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["bucket".to_string()];
    header.extend(emotions.iter().map(|emotion| emotion.label().to_string()));
    writer.write_record(&header)?;

    for point in points {
        let mut row = vec![point.bucket.clone()];
        row.extend(emotions.iter().map(|emotion| point.count(*emotion).to_string()));
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ExportError::Buffer(err.to_string()))
}

pub fn render_table(points: &[ChartPoint]) -> String {
    let mut output = String::new();
    if points.is_empty() {
        let _ = writeln!(output, "No data available.");
        return output;
    }

    let emotions = present_emotions(points);
    let width = points
        .iter()
        .map(|point| point.bucket.len())
        .max()
        .unwrap_or(0)
        .max("bucket".len());

    let _ = write!(output, "{:<width$}", "bucket");
    for emotion in &emotions {
        let _ = write!(output, "  {}", emotion.label());
    }
    let _ = writeln!(output);

    for point in points {
        let _ = write!(output, "{:<width$}", point.bucket);
        for emotion in &emotions {
            let _ = write!(
                output,
                "  {:>w$}",
                point.count(*emotion),
                w = emotion.label().chars().count()
            );
        }
        let _ = writeln!(output);
    }
    output
}

pub fn build_report(query: &DashboardQuery, aggregation: &Aggregation, rejected: usize) -> String {
    let mut output = String::new();
    let class_label = query.class.as_deref().unwrap_or("all classes");
    let kind_label = query.kind.map(|kind| kind.as_str()).unwrap_or("check-ins and check-outs");

    let _ = writeln!(output, "# Vibe Check Report");
    let _ = writeln!(
        output,
        "Generated for {} ({}), grouped by {}",
        class_label, kind_label, query.granularity
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Emotion Mix");

    let summary = summarize_by_emotion(&aggregation.points);
    if summary.is_empty() {
        let _ = writeln!(output, "No answers recorded for this selection.");
    } else {
        let total: usize = summary.iter().map(|(_, count)| count).sum();
        for (emotion, count) in summary.iter() {
            let share = *count as f64 * 100.0 / total as f64;
            let _ = writeln!(output, "- {}: {} answers ({:.1}%)", emotion.label(), count, share);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Period");

    if aggregation.points.is_empty() {
        let _ = writeln!(output, "No periods to show.");
    } else {
        for point in aggregation.points.iter() {
            let parts: Vec<String> = point
                .counts
                .iter()
                .map(|(emotion, count)| format!("{} {}", emotion.label(), count))
                .collect();
            let _ = writeln!(output, "- {}: {}", point.bucket, parts.join(", "));
        }
    }

    let dropped = aggregation.skipped.total() + rejected;
    if dropped > 0 {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Left Out");
        if rejected > 0 {
            let _ = writeln!(output, "- {} rows failed validation", rejected);
        }
        if aggregation.skipped.malformed_timestamp > 0 {
            let _ = writeln!(
                output,
                "- {} rows had an unreadable date",
                aggregation.skipped.malformed_timestamp
            );
        }
        if aggregation.skipped.unknown_emotion > 0 {
            let _ = writeln!(
                output,
                "- {} rows had an unknown emotion code",
                aggregation.skipped.unknown_emotion
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SkipTally;
    use crate::models::{Granularity, Kind};

    fn point(bucket: &str, counts: &[(Emotion, usize)]) -> ChartPoint {
        let mut point = ChartPoint::new(bucket.to_string());
        for (emotion, count) in counts {
            point.add(*emotion, *count);
        }
        point
    }

    fn sample() -> Vec<ChartPoint> {
        vec![
            point("Week 1", &[(Emotion::VeryHappy, 2), (Emotion::Sad, 1)]),
            point("Week 2", &[(Emotion::VeryHappy, 1), (Emotion::Anxious, 3)]),
        ]
    }

    #[test]
    fn txt_export_matches_block_layout() {
        let text = render_txt(&sample()).unwrap();
        assert_eq!(
            text,
            "Week 1:\n  Muito Feliz: 2\n  Triste: 1\n\nWeek 2:\n  Muito Feliz: 1\n  Ansioso: 3\n\n"
        );
    }

    #[test]
    fn txt_export_lists_emotions_as_first_seen() {
        let text = render_txt(&[point("05/01", &[(Emotion::Sad, 1), (Emotion::VeryHappy, 4)])])
            .unwrap();
        assert_eq!(text, "05/01:\n  Triste: 1\n  Muito Feliz: 4\n\n");
    }

    #[test]
    fn empty_exports_are_refused() {
        assert!(matches!(render_txt(&[]), Err(ExportError::Empty)));
        assert!(matches!(render_csv(&[]), Err(ExportError::Empty)));
    }

    #[test]
    fn csv_has_one_column_per_present_emotion() {
        let text = render_csv(&sample()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "bucket,Muito Feliz,Triste,Ansioso");
        assert_eq!(lines[1], "Week 1,2,1,0");
        assert_eq!(lines[2], "Week 2,1,0,3");
    }

    #[test]
    fn summary_orders_by_total() {
        let summary = summarize_by_emotion(&sample());
        assert_eq!(summary[0], (Emotion::VeryHappy, 3));
        assert_eq!(summary[1], (Emotion::Anxious, 3));
        assert_eq!(summary[2], (Emotion::Sad, 1));
    }

    #[test]
    fn report_mentions_filters_and_dropped_rows() {
        let query = DashboardQuery {
            class: Some("3A".to_string()),
            kind: Some(Kind::CheckIn),
            granularity: Granularity::Week,
        };
        let aggregation = Aggregation {
            points: sample(),
            matched: 9,
            skipped: SkipTally {
                malformed_timestamp: 1,
                unknown_emotion: 0,
            },
        };
        let report = build_report(&query, &aggregation, 2);
        assert!(report.contains("Generated for 3A (CHECKIN), grouped by week"));
        assert!(report.contains("- Muito Feliz: 3 answers (42.9%)"));
        assert!(report.contains("- Week 2: Muito Feliz 1, Ansioso 3"));
        assert!(report.contains("- 2 rows failed validation"));
        assert!(report.contains("- 1 rows had an unreadable date"));
        assert!(!report.contains("unknown emotion"));
    }

    #[test]
    fn table_lists_each_bucket() {
        let table = render_table(&sample());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("bucket"));
        assert!(lines[2].starts_with("Week 2"));
        assert_eq!(render_table(&[]), "No data available.\n");
    }
}

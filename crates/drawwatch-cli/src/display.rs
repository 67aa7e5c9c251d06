//! Terminal output for cycle reports, stored documents, and alerts.

use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;

use drawwatch_core::{Alert, DayStatus, ResultDocument};

use crate::pipeline::{CycleOutcome, SourceReport};

const MAX_METADATA_WIDTH: usize = 80;

// ── Cycle reports ──

pub fn status_line(status: &Option<DayStatus>) -> String {
    match status {
        None => "unchecked".to_string(),
        Some(DayStatus::Complete) => "complete".to_string(),
        Some(DayStatus::NoData { missing }) if missing.is_empty() => "no data yet".to_string(),
        Some(DayStatus::NoData { missing }) => format!("no data, missing {}", join(missing)),
        Some(DayStatus::Partial { missing }) => format!("partial, missing {}", join(missing)),
    }
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn report_line(report: &SourceReport) -> String {
    let secs = report.elapsed.as_secs_f64();
    match &report.outcome {
        CycleOutcome::Completed {
            date,
            written,
            status,
        } => format!(
            "  {:<32} {date}  {written:>3} draws  {}  ({secs:.1}s)",
            report.source_id,
            status_line(status)
        ),
        CycleOutcome::Failed { stage, error } => format!(
            "  {:<32} FAILED at {stage}: {error}  ({secs:.1}s)",
            report.source_id
        ),
    }
}

pub fn print_reports(reports: &[SourceReport]) {
    for report in reports {
        println!("{}", report_line(report));
    }
    let failed = reports.iter().filter(|r| r.failed()).count();
    println!("{} sources, {} failed", reports.len(), failed);
}

// ── Result documents ──

/// Print one stored document as a card, most recent draw first.
pub fn print_document(doc: &ResultDocument) {
    println!("=== {} {} ===", doc.source_id, doc.draw_date);
    println!("{} / {} ({})", doc.lottery_name, doc.draw_name, doc.country);
    println!("  scraped {}", doc.scraped_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if doc.draws.is_empty() {
        println!("  (no draws)");
    }
    for record in &doc.draws {
        let games: Vec<String> = record
            .payload
            .iter()
            .map(|(game, digits)| format!("{game}: {digits}"))
            .collect();
        println!("  {:>8}  {}", record.time.to_string(), games.join("  "));
    }
    println!();
}

// ── Alerts ──

pub fn alert_line(alert: &Alert) -> String {
    let id = alert.id.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
    let mut metadata = alert.metadata.to_string();
    if metadata.len() > MAX_METADATA_WIDTH {
        let cut = metadata
            .char_indices()
            .map(|(i, _)| i)
            .take_while(|&i| i <= MAX_METADATA_WIDTH - 3)
            .last()
            .unwrap_or(0);
        metadata.truncate(cut);
        metadata.push_str("...");
    }
    format!(
        "#{id:<5} {:<8} {:<16} {}  {}\n       {}",
        alert.severity.as_str(),
        alert.kind.as_str(),
        alert.created_at.format("%Y-%m-%d %H:%M"),
        alert.message,
        metadata
    )
}

pub fn print_alerts(alerts: &[Alert]) {
    if alerts.is_empty() {
        println!("No active alerts.");
        return;
    }
    for alert in alerts {
        println!("{}", alert_line(alert));
    }
}

// ── Arrow tables ──

pub fn print_batches(batches: &[RecordBatch]) -> anyhow::Result<()> {
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    if rows == 0 {
        println!("(no rows)");
        return Ok(());
    }
    println!("{}", pretty_format_batches(batches)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone, Utc};
    use drawwatch_core::{AlertType, Severity, TimeLabel};

    fn t(s: &str) -> TimeLabel {
        TimeLabel::parse(s).unwrap()
    }

    #[test]
    fn status_lines() {
        assert_eq!(status_line(&None), "unchecked");
        assert_eq!(status_line(&Some(DayStatus::Complete)), "complete");
        assert_eq!(
            status_line(&Some(DayStatus::NoData { missing: vec![] })),
            "no data yet"
        );
        assert_eq!(
            status_line(&Some(DayStatus::Partial {
                missing: vec![t("11:00 AM"), t("12:00 PM")]
            })),
            "partial, missing 11:00 AM, 12:00 PM"
        );
    }

    #[test]
    fn failed_report_names_stage() {
        let report = SourceReport {
            source_id: "us/fl/pick3".into(),
            outcome: CycleOutcome::Failed {
                stage: "fetch",
                error: "timed out".into(),
            },
            elapsed: Duration::from_millis(1500),
        };
        let line = report_line(&report);
        assert!(line.contains("FAILED at fetch: timed out"));
        assert!(line.contains("(1.5s)"));

        let ok = SourceReport {
            source_id: "us/fl/pick3".into(),
            outcome: CycleOutcome::Completed {
                date: NaiveDate::from_ymd_opt(2026, 1, 8).unwrap(),
                written: 2,
                status: Some(DayStatus::Complete),
            },
            elapsed: Duration::ZERO,
        };
        assert!(report_line(&ok).contains("2026-01-08    2 draws  complete"));
    }

    #[test]
    fn long_alert_metadata_is_truncated() {
        let mut alert = Alert::new(
            AlertType::MissingData,
            Severity::High,
            "Missing 1 draws for s on 2026-01-08: 10:00 AM",
            serde_json::json!({"missingDraws": vec!["10:00 AM"; 20]}),
        );
        alert.id = Some(7);
        alert.created_at = Utc.with_ymd_and_hms(2026, 1, 8, 17, 10, 0).unwrap();
        let line = alert_line(&alert);
        assert!(line.starts_with("#7     HIGH     MISSING_DATA     2026-01-08 17:10"));
        let metadata = line.lines().nth(1).unwrap().trim();
        assert!(metadata.ends_with("..."));
        assert!(metadata.len() <= MAX_METADATA_WIDTH);
    }
}

//! CSV export of the event history.

use chrono::{DateTime, NaiveDate, Utc};
use std::borrow::Cow;

use crate::detect::aggregator::format_timestamp;
use crate::detect::{DetectionEvent, EventFilter};

pub const CSV_HEADER: &str = "Timestamp,Confidence,Model,Note";

/// One row per event passing `filter`. False positives never pass. Rows are
/// joined with `\n` and there is no trailing newline.
pub fn events_csv<'a>(
    events: impl IntoIterator<Item = &'a DetectionEvent>,
    filter: &EventFilter,
) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for event in events.into_iter().filter(|event| filter.matches(event)) {
        let confidence = format!("{:.1}", event.confidence);
        let note = event.note.as_deref().unwrap_or("");
        let fields = [
            csv_field(&event.timestamp_string()).into_owned(),
            confidence,
            csv_field(&event.model).into_owned(),
            csv_field(note).into_owned(),
        ];
        lines.push(fields.join(","));
    }
    lines.join("\n")
}

/// Quote only when the value contains a comma, quote or line break.
pub fn csv_field(value: &str) -> Cow<'_, str> {
    if value.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(value)
    }
}

pub fn csv_filename(date: NaiveDate) -> String {
    format!("detection-events-{}.csv", date.format("%Y-%m-%d"))
}

pub fn snapshot_filename(taken_at: &DateTime<Utc>) -> String {
    format!("snapshot-{}.jpg", format_timestamp(taken_at))
}

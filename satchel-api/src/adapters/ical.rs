//! RFC 5545 calendar feed rendering
//!
//! Events whose start and end are plain dates (`YYYY-MM-DD`) are written as
//! all-day `VALUE=DATE` entries; `YYYY-MM-DDTHH:MM:SS` values become floating
//! local date-times. Events with unparseable dates are skipped.

use chrono::{NaiveDate, NaiveDateTime, Utc};
use satchel_common::models::EventRecord;
use satchel_common::ports::CalendarFeedRenderer;
use tracing::{info, warn};

const PRODID: &str = "-//Satchel//Satchel Calendar//EN";
/// Content lines longer than this many octets are folded
const MAX_LINE_OCTETS: usize = 75;

enum CalendarValue {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CalendarValue {
    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.contains('T') {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
                .ok()
                .map(CalendarValue::DateTime)
        } else {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(CalendarValue::Date)
        }
    }

    fn property(&self, name: &str) -> String {
        match self {
            CalendarValue::Date(d) => format!("{};VALUE=DATE:{}", name, d.format("%Y%m%d")),
            CalendarValue::DateTime(dt) => format!("{}:{}", name, dt.format("%Y%m%dT%H%M%S")),
        }
    }
}

/// Escape a TEXT property value
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

/// Fold a content line at 75 octets without splitting a UTF-8 sequence
fn fold_line(line: &str, out: &mut String) {
    let mut width = 0;
    for ch in line.chars() {
        let len = ch.len_utf8();
        if width + len > MAX_LINE_OCTETS {
            out.push_str("\r\n ");
            // Continuation lines start with the space
            width = 1;
        }
        out.push(ch);
        width += len;
    }
    out.push_str("\r\n");
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IcalRenderer;

impl CalendarFeedRenderer for IcalRenderer {
    fn render(&self, calendar_name: &str, events: &[EventRecord]) -> String {
        let stamp = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let mut lines = vec![
            "BEGIN:VCALENDAR".to_string(),
            format!("PRODID:{}", PRODID),
            "VERSION:2.0".to_string(),
            "CALSCALE:GREGORIAN".to_string(),
            "METHOD:PUBLISH".to_string(),
            format!("X-WR-CALNAME:{}", escape_text(calendar_name)),
        ];

        let mut rendered = 0;
        for event in events {
            let start = CalendarValue::parse(&event.data.start);
            let end = CalendarValue::parse(&event.data.end);
            let (Some(start), Some(end)) = (start, end) else {
                warn!(event_id = %event.id, start = %event.data.start, "Skipping event with unparseable dates");
                continue;
            };

            lines.push("BEGIN:VEVENT".to_string());
            lines.push(format!("UID:{}@satchel", event.id));
            lines.push(format!("DTSTAMP:{}", stamp));
            lines.push(start.property("DTSTART"));
            lines.push(end.property("DTEND"));
            lines.push(format!("SUMMARY:{}", escape_text(&event.data.summary)));
            if !event.data.location.is_empty() {
                lines.push(format!("LOCATION:{}", escape_text(&event.data.location)));
            }
            if !event.data.description.is_empty() {
                lines.push(format!("DESCRIPTION:{}", escape_text(&event.data.description)));
            }
            lines.push("END:VEVENT".to_string());
            rendered += 1;
        }

        lines.push("END:VCALENDAR".to_string());

        let mut out = String::new();
        for line in &lines {
            fold_line(line, &mut out);
        }

        info!(events = rendered, bytes = out.len(), "Rendered calendar feed");
        out
    }
}

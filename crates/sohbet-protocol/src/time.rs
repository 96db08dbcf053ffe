//! Display-timezone timestamp formatting.
//!
//! Timestamps are stored in UTC and rendered in a fixed display offset
//! (+03:00 by default). The offset is configuration, not part of the stored
//! record.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// Default display offset east of UTC, in minutes (+03:00).
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

/// Build a display offset from minutes east of UTC.
///
/// Returns `None` when the offset is out of range (±24h).
#[must_use]
pub fn display_offset(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

/// Format a timestamp as ISO-8601 in the display timezone (`zaman`).
#[must_use]
pub fn format_iso(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    timestamp
        .with_timezone(&offset)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Format a timestamp as the locale label `DD.MM.YYYY HH:MM:SS`
/// (`zaman_etiketi`).
#[must_use]
pub fn format_label(timestamp: DateTime<Utc>, offset: FixedOffset) -> String {
    timestamp
        .with_timezone(&offset)
        .format("%d.%m.%Y %H:%M:%S")
        .to_string()
}

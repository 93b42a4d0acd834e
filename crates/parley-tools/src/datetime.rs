//! Current date and time in Indian Standard Time.
//!
//! Pure, no external call. IST has no daylight saving, so a fixed offset
//! is sufficient.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 1800;

/// The four rendered forms of the current instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateTimeInfo {
    pub iso: String,
    pub pretty: String,
    pub date_only: String,
    pub time_only: String,
}

fn ist_offset() -> FixedOffset {
    // +05:30 is always representable.
    FixedOffset::east_opt(IST_OFFSET_SECS).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
}

/// Render an instant in IST.
pub fn render_ist(instant: DateTime<Utc>) -> DateTimeInfo {
    let ist = instant.with_timezone(&ist_offset());
    DateTimeInfo {
        iso: ist.to_rfc3339(),
        pretty: ist.format("%A, %B %d, %Y at %I:%M %p IST").to_string(),
        date_only: ist.format("%A, %B %d, %Y").to_string(),
        time_only: ist.format("%I:%M %p IST").to_string(),
    }
}

/// Current date and time in IST.
pub fn now_ist() -> DateTimeInfo {
    render_ist(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_applies_ist_offset() {
        // 12:00 UTC is 17:30 IST.
        let instant = Utc.with_ymd_and_hms(2026, 8, 27, 12, 0, 0).unwrap();
        let info = render_ist(instant);
        assert_eq!(info.iso, "2026-08-27T17:30:00+05:30");
        assert_eq!(info.pretty, "Thursday, August 27, 2026 at 05:30 PM IST");
        assert_eq!(info.date_only, "Thursday, August 27, 2026");
        assert_eq!(info.time_only, "05:30 PM IST");
    }

    #[test]
    fn test_date_rolls_over_at_offset_boundary() {
        // 20:00 UTC is 01:30 IST the next day.
        let instant = Utc.with_ymd_and_hms(2026, 8, 27, 20, 0, 0).unwrap();
        let info = render_ist(instant);
        assert_eq!(info.date_only, "Friday, August 28, 2026");
    }
}

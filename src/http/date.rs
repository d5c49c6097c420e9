//! HTTP-date handling for `Last-Modified` and `If-Modified-Since`

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::SystemTime;

/// IMF-fixdate, the preferred HTTP-date format
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Obsolete formats recipients must still accept
const OBSOLETE_FORMATS: [&str; 2] = [
    // RFC 850
    "%A, %d-%b-%y %H:%M:%S GMT",
    // ANSI C asctime()
    "%a %b %e %H:%M:%S %Y",
];

/// Format a timestamp as an IMF-fixdate, truncated to whole seconds
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(IMF_FIXDATE).to_string()
}

/// Parse any of the three HTTP-date formats; `None` if the value is not a date
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    std::iter::once(IMF_FIXDATE)
        .chain(OBSOLETE_FORMATS)
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_rfc2822(value)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
}

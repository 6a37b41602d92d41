//! Publish-date normalization.
//!
//! Feeds put almost anything in `pubDate`. [`normalize_published`] tries a
//! fixed list of layouts in order and returns the first match in UTC, or
//! `None` when nothing matches. It never fails: an unreadable date must not
//! keep an otherwise valid item out of the store.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// How the zone is written at the end of a layout
#[derive(Debug, Clone, Copy)]
enum Zone {
    /// `-0700`
    Numeric,
    /// `MST`
    Named,
}

/// Width of the day-of-month field
#[derive(Debug, Clone, Copy)]
enum Day {
    /// `02`
    TwoDigit,
    /// `2` or `02`
    OneOrTwo,
}

#[derive(Debug)]
enum Layout {
    /// Full RFC 3339, handed to chrono as is
    Rfc3339,
    Pattern(Pattern),
}

impl Layout {
    fn name(&self) -> &'static str {
        match self {
            Layout::Rfc3339 => "RFC3339",
            Layout::Pattern(pattern) => pattern.name,
        }
    }
}

/// A chrono format wrapped in optional weekday and zone handling
#[derive(Debug)]
struct Pattern {
    name: &'static str,
    /// Leading `Mon, ` weekday token
    weekday: bool,
    day: Day,
    /// chrono format of the date/time part, without weekday or zone
    format: &'static str,
    zone: Zone,
}

/// Tried in order; the first successful parse wins.
const LAYOUTS: &[Layout] = &[
    Layout::Pattern(Pattern {
        name: "RFC1123Z",
        weekday: true,
        day: Day::TwoDigit,
        format: "%d %b %Y %H:%M:%S",
        zone: Zone::Numeric,
    }),
    Layout::Pattern(Pattern {
        name: "RFC1123",
        weekday: true,
        day: Day::TwoDigit,
        format: "%d %b %Y %H:%M:%S",
        zone: Zone::Named,
    }),
    Layout::Pattern(Pattern {
        name: "RFC822Z",
        weekday: false,
        day: Day::TwoDigit,
        format: "%d %b %y %H:%M",
        zone: Zone::Numeric,
    }),
    Layout::Pattern(Pattern {
        name: "RFC822",
        weekday: false,
        day: Day::TwoDigit,
        format: "%d %b %y %H:%M",
        zone: Zone::Named,
    }),
    Layout::Rfc3339,
    Layout::Pattern(Pattern {
        name: "RFC1123Z single-digit day",
        weekday: true,
        day: Day::OneOrTwo,
        format: "%d %b %Y %H:%M:%S",
        zone: Zone::Numeric,
    }),
];

const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Parse a raw publish date into a UTC instant.
///
/// Surrounding whitespace is ignored. Returns `None` when no known layout
/// matches; this is the expected result for free-form dates, not an error.
pub fn normalize_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    LAYOUTS.iter().find_map(|layout| {
        let parsed = parse_with(layout, raw)?;
        tracing::trace!(layout = layout.name(), raw = %raw, "Parsed publish date");
        Some(parsed)
    })
}

fn parse_with(layout: &Layout, raw: &str) -> Option<DateTime<Utc>> {
    match layout {
        Layout::Rfc3339 => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Layout::Pattern(pattern) => parse_pattern(pattern, raw),
    }
}

fn parse_pattern(pattern: &Pattern, raw: &str) -> Option<DateTime<Utc>> {
    let rest = if pattern.weekday {
        strip_weekday(raw)?
    } else {
        raw
    };

    if let Day::TwoDigit = pattern.day {
        let day = rest.split_whitespace().next()?;
        if day.len() != 2 {
            return None;
        }
    }

    match pattern.zone {
        Zone::Numeric => {
            let format = format!("{} %z", pattern.format);
            DateTime::parse_from_str(rest, &format)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        Zone::Named => {
            let (datetime, zone) = rest.rsplit_once(' ')?;
            let offset = named_zone_offset(zone)?;
            let naive = NaiveDateTime::parse_from_str(datetime.trim_end(), pattern.format).ok()?;
            offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Strip a leading `Mon, ` token. The weekday must be a real day name, but
/// it is not checked against the date: feeds get it wrong often enough.
fn strip_weekday(raw: &str) -> Option<&str> {
    let (weekday, rest) = raw.split_once(',')?;
    let weekday = weekday.to_ascii_lowercase();
    if !WEEKDAYS.contains(&weekday.as_str()) {
        return None;
    }
    Some(rest.trim_start())
}

/// Offset of a zone abbreviation.
///
/// RFC 822 zone names map to their defined offsets. Any other abbreviation
/// of 3-5 uppercase letters is accepted at UTC.
fn named_zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        other if (3..=5).contains(&other.len()) && other.bytes().all(|b| b.is_ascii_uppercase()) => 0,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

//! Deterministic schedule parsing for PARSER-routed rules.
//!
//! Meter and sweeping feeds publish their schedules as separate day/start/end
//! fields with a small, enumerable vocabulary. Whitelisted GENERAL texts carry
//! a single time window. Both end up as a [`Schedule`].

use crate::ScheduleError;
use crate::config::ScheduleFields;
use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Days plus an optional time-of-day window.
///
/// Empty `days` means every day; `window: None` means all day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub days: Vec<Weekday>,
    pub window: Option<TimeWindow>,
}

const ALL_DAYS: [Weekday; 7] =
    [Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri, Weekday::Sat, Weekday::Sun];

fn day_name(token: &str) -> Option<Weekday> {
    match token {
        "m" | "mo" | "mon" | "monday" => Some(Weekday::Mon),
        "tu" | "tue" | "tues" | "tuesday" => Some(Weekday::Tue),
        "w" | "we" | "wed" | "weds" | "wednesday" => Some(Weekday::Wed),
        "th" | "thu" | "thur" | "thurs" | "thursday" => Some(Weekday::Thu),
        "f" | "fr" | "fri" | "friday" => Some(Weekday::Fri),
        "sa" | "sat" | "saturday" => Some(Weekday::Sat),
        "su" | "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Inclusive weekday range, wrapping past Sunday.
fn day_range(from: Weekday, to: Weekday) -> Vec<Weekday> {
    let mut out = vec![from];
    let mut day = from;
    while day != to {
        day = day.succ();
        out.push(day);
    }
    out
}

/// Parse day expressions such as `"Mon-Fri"`, `"M,W,F"`, `"Tues"`, `"daily"`.
pub fn parse_days(text: &str) -> Result<Vec<Weekday>, ScheduleError> {
    let lower = text.trim().to_ascii_lowercase();
    let mut days: Vec<Weekday> = Vec::new();

    for token in regex!(r"[,;/&]|\s+and\s+|\s+").split(&lower).map(str::trim).filter(|t| !t.is_empty()) {
        let token = token.trim_end_matches('.');
        match token {
            "daily" | "everyday" | "all" => days.extend(ALL_DAYS),
            "weekdays" | "weekday" => days.extend(day_range(Weekday::Mon, Weekday::Fri)),
            "weekends" | "weekend" => days.extend([Weekday::Sat, Weekday::Sun]),
            _ => match token.split_once('-') {
                Some((a, b)) => match (day_name(a.trim()), day_name(b.trim())) {
                    (Some(a), Some(b)) => days.extend(day_range(a, b)),
                    _ => return Err(ScheduleError::Days(text.to_string())),
                },
                None => days.push(day_name(token).ok_or_else(|| ScheduleError::Days(text.to_string()))?),
            },
        }
    }

    if days.is_empty() {
        return Err(ScheduleError::Days(text.to_string()));
    }
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    Ok(days)
}

/// Parse a time of day: `8`, `0800`, `8:30`, `8AM`, `8:30 p.m.`, `noon`, `midnight`, `24`.
pub fn parse_time(text: &str) -> Result<NaiveTime, ScheduleError> {
    let lower = text.trim().to_ascii_lowercase();
    match lower.as_str() {
        "noon" => return NaiveTime::from_hms_opt(12, 0, 0).ok_or_else(|| ScheduleError::Time(text.into())),
        "midnight" => return Ok(NaiveTime::MIN),
        _ => {}
    }

    let caps = regex!(r"^(\d{1,2})(?::?(\d{2}))?\s*(a\.?m\.?|p\.?m\.?)?$")
        .captures(&lower)
        .ok_or_else(|| ScheduleError::Time(text.to_string()))?;
    let mut hour: u32 = caps[1].parse().map_err(|_| ScheduleError::Time(text.to_string()))?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| ScheduleError::Time(text.to_string()))?,
        None => 0,
    };

    match caps.get(3).map(|m| m.as_str().starts_with('p')) {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return Err(ScheduleError::Time(text.to_string()));
            }
            hour = match (pm, hour) {
                (false, 12) => 0,
                (true, 12) => 12,
                (true, h) => h + 12,
                (false, h) => h,
            };
        }
        // 24-hour clock; "24" and "24:00" close the day.
        None if hour == 24 && minute == 0 => return Ok(end_of_day()),
        None => {}
    }

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| ScheduleError::Time(text.to_string()))
}

/// Find a single `start - end` window anywhere in `text`.
pub fn parse_window_text(text: &str) -> Result<TimeWindow, ScheduleError> {
    let lower = text.to_ascii_lowercase();
    if regex!(r"\bany\s*time\b").is_match(&lower) {
        return Ok(TimeWindow { start: NaiveTime::MIN, end: end_of_day() });
    }
    let caps = regex!(r"(\d{1,2}(?::\d{2})?\s*(?:am|pm))\s*(?:-|to)\s*(\d{1,2}(?::\d{2})?\s*(?:am|pm))")
        .captures(&lower)
        .ok_or_else(|| ScheduleError::Window(text.to_string()))?;
    Ok(TimeWindow { start: parse_time(&caps[1])?, end: parse_time(&caps[2])? })
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn field<'a>(payload: &'a BTreeMap<String, String>, name: Option<&String>) -> Option<&'a str> {
    name.and_then(|n| payload.get(n)).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Build a schedule from the configured payload fields.
pub fn schedule_from_fields(
    payload: &BTreeMap<String, String>,
    fields: &ScheduleFields,
) -> Result<Schedule, ScheduleError> {
    let days_text = field(payload, fields.days.as_ref());
    let start_text = field(payload, fields.start.as_ref());
    let end_text = field(payload, fields.end.as_ref());
    if days_text.is_none() && start_text.is_none() && end_text.is_none() {
        return Err(ScheduleError::Missing);
    }

    let days = days_text.map(parse_days).transpose()?.unwrap_or_default();
    let window = match (start_text, end_text) {
        (Some(start), Some(end)) => Some(TimeWindow { start: parse_time(start)?, end: parse_time(end)? }),
        (None, None) => None,
        (Some(t), None) | (None, Some(t)) => return Err(ScheduleError::Window(t.to_string())),
    };
    Ok(Schedule { days, window })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn day_expressions() {
        assert_eq!(parse_days("Tues").unwrap(), vec![Weekday::Tue]);
        assert_eq!(parse_days("Mon-Fri").unwrap(), day_range(Weekday::Mon, Weekday::Fri));
        assert_eq!(parse_days("M-F").unwrap().len(), 5);
        assert_eq!(parse_days("Mo,We,Fr").unwrap(), vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]);
        assert_eq!(parse_days("Sat and Sun").unwrap(), vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(parse_days("Daily").unwrap().len(), 7);
        assert_eq!(parse_days("weekends").unwrap(), vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn wrapping_range_is_sorted() {
        assert_eq!(parse_days("Fri-Mon").unwrap(), vec![Weekday::Mon, Weekday::Fri, Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn unknown_day_is_rejected() {
        assert_eq!(parse_days("Holiday"), Err(ScheduleError::Days("Holiday".into())));
        assert!(parse_days("   ").is_err());
    }

    #[test]
    fn time_formats() {
        assert_eq!(parse_time("8").unwrap(), t(8, 0));
        assert_eq!(parse_time("0800").unwrap(), t(8, 0));
        assert_eq!(parse_time("18:30").unwrap(), t(18, 30));
        assert_eq!(parse_time("8AM").unwrap(), t(8, 0));
        assert_eq!(parse_time("6:15 pm").unwrap(), t(18, 15));
        assert_eq!(parse_time("12 am").unwrap(), t(0, 0));
        assert_eq!(parse_time("12pm").unwrap(), t(12, 0));
        assert_eq!(parse_time("noon").unwrap(), t(12, 0));
        assert_eq!(parse_time("midnight").unwrap(), t(0, 0));
        assert_eq!(parse_time("24").unwrap(), NaiveTime::from_hms_opt(23, 59, 59).unwrap());
    }

    #[test]
    fn bad_times_are_rejected() {
        assert!(parse_time("25").is_err());
        assert!(parse_time("13pm").is_err());
        assert!(parse_time("8:75").is_err());
        assert!(parse_time("soon").is_err());
    }

    #[test]
    fn window_from_text() {
        let w = parse_window_text("No Parking 7AM-9AM").unwrap();
        assert_eq!(w, TimeWindow { start: t(7, 0), end: t(9, 0) });
        let anytime = parse_window_text("NO PARKING ANYTIME").unwrap();
        assert_eq!(anytime.start, NaiveTime::MIN);
        assert!(parse_window_text("2 HR LIMIT").is_err());
    }

    #[test]
    fn schedule_from_sweeping_fields() {
        let fields = ScheduleFields {
            days: Some("weekday".into()),
            start: Some("fromhour".into()),
            end: Some("tohour".into()),
        };
        let payload: BTreeMap<String, String> = [("weekday", "Tues"), ("fromhour", "2"), ("tohour", "6")]
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let schedule = schedule_from_fields(&payload, &fields).unwrap();
        assert_eq!(schedule.days, vec![Weekday::Tue]);
        assert_eq!(schedule.window, Some(TimeWindow { start: t(2, 0), end: t(6, 0) }));
    }

    #[test]
    fn missing_or_half_windows_fail() {
        let fields = ScheduleFields { days: Some("d".into()), start: Some("s".into()), end: Some("e".into()) };
        assert_eq!(schedule_from_fields(&BTreeMap::new(), &fields), Err(ScheduleError::Missing));
        let half: BTreeMap<String, String> = [("s".to_string(), "8".to_string())].into_iter().collect();
        assert!(matches!(schedule_from_fields(&half, &fields), Err(ScheduleError::Window(_))));
    }
}

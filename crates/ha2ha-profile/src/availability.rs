//! Availability judgement for the three profile modes.
//!
//! `always` is trivially available. `waking_hours` is a soft judgement in
//! the profile's timezone. `scheduled` is strict: outside the declared
//! windows the decision refuses and computes the next available instant.
//! Overnight windows (end < start) wrap across midnight.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::profile::{Availability, ScheduleWindow};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDecision {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_available: Option<DateTime<Utc>>,
}

impl AvailabilityDecision {
    fn yes() -> Self {
        Self {
            available: true,
            warning: None,
            next_available: None,
        }
    }
}

/// Whether `time` falls inside [start, end), wrapping overnight when
/// `end < start`.
fn time_in_window(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        time >= start && time < end
    } else {
        time >= start || time < end
    }
}

fn window_covers(window: &ScheduleWindow, day: Weekday, time: NaiveTime) -> bool {
    if window.start <= window.end {
        window.days.contains(&day) && time_in_window(time, window.start, window.end)
    } else {
        // Overnight: the tail before `end` belongs to the previous day's
        // window.
        (window.days.contains(&day) && time >= window.start)
            || (window.days.contains(&day.pred()) && time < window.end)
    }
}

/// Evaluate `availability` at the instant `now`.
pub fn check_availability(availability: &Availability, now: DateTime<Utc>) -> AvailabilityDecision {
    match availability {
        Availability::Always => AvailabilityDecision::yes(),

        Availability::WakingHours {
            timezone,
            wake,
            sleep,
        } => {
            let local = now.with_timezone(timezone);
            if time_in_window(local.time(), *wake, *sleep) {
                AvailabilityDecision::yes()
            } else {
                AvailabilityDecision {
                    available: false,
                    warning: Some(format!(
                        "outside waking hours ({wake}–{sleep} {timezone}); approval discouraged"
                    )),
                    next_available: next_time_at(timezone, now, *wake),
                }
            }
        }

        Availability::Scheduled { timezone, windows } => {
            let local = now.with_timezone(timezone);
            if windows
                .iter()
                .any(|w| window_covers(w, local.weekday(), local.time()))
            {
                AvailabilityDecision::yes()
            } else {
                AvailabilityDecision {
                    available: false,
                    warning: Some("outside the scheduled availability windows".into()),
                    next_available: next_window_start(timezone, windows, now),
                }
            }
        }
    }
}

/// The next occurrence of `time` in `tz`, strictly after `now`.
fn next_time_at(tz: &Tz, now: DateTime<Utc>, time: NaiveTime) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(tz);
    for offset in 0..2 {
        let date = local.date_naive() + Duration::days(offset);
        if let Some(candidate) = tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
        {
            if candidate > now {
                return Some(candidate);
            }
        }
    }
    None
}

/// The earliest window start strictly after `now`.
fn next_window_start(
    tz: &Tz,
    windows: &[ScheduleWindow],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let local = now.with_timezone(tz);
    let mut best: Option<DateTime<Utc>> = None;
    // Eight days covers a full week plus today's already-passed windows.
    for offset in 0..8 {
        let date = local.date_naive() + Duration::days(offset);
        let weekday = date.weekday();
        for window in windows {
            if !window.days.contains(&weekday) {
                continue;
            }
            let Some(candidate) = tz
                .from_local_datetime(&date.and_time(window.start))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
            else {
                continue;
            };
            if candidate > now && best.map(|b| candidate < b).unwrap_or(true) {
                best = Some(candidate);
            }
        }
    }
    best
}

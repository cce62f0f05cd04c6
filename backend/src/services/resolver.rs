//! Desired-state resolution.
//!
//! Pure functions over override rows and schedule rows; all store reads
//! happen in [`desired_state`]. Precedence, first match wins:
//! punishment mode disables, temporary access enables, otherwise the
//! weekly schedule decides (and a device with no enabled schedules is
//! unrestricted).

use crate::error::ControlError;
use crate::models::{PunishmentMode, Schedule, TemporaryAccess};
use crate::services::store::Store;
use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Weekday as stored in schedule rows: Monday = 0 .. Sunday = 6.
fn weekday_index(now: &DateTime<Tz>) -> i32 {
    now.weekday().num_days_from_monday() as i32
}

/// Wall time as a zero-padded "HH:MM" string, the schedule comparison key.
fn wall_time(now: &DateTime<Tz>) -> String {
    now.format("%H:%M").to_string()
}

/// Parse and re-render an "HH:MM" input zero-padded, so stored values
/// compare lexicographically the same as numerically.
pub fn normalize_hhmm(value: &str) -> Option<String> {
    let time = NaiveTime::parse_from_str(value, "%H:%M").ok()?;
    Some(format!("{:02}:{:02}", time.hour(), time.minute()))
}

/// Whether the port should be enabled at `now`.
///
/// The `active` flag on override rows lags reality (cleanup is lazy), so
/// expiry is re-checked against `now` here regardless of the flag.
pub fn should_be_enabled(
    punishment: Option<&PunishmentMode>,
    temporary_access: Option<&TemporaryAccess>,
    schedules: &[Schedule],
    now: DateTime<Tz>,
) -> bool {
    let now_utc = now.with_timezone(&Utc);

    if punishment.is_some_and(|p| p.active && p.expires_at > now_utc) {
        return false;
    }

    if temporary_access.is_some_and(|t| t.active && t.expires_at > now_utc) {
        return true;
    }

    let enabled: Vec<&Schedule> = schedules.iter().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        // No schedules means unrestricted
        return true;
    }

    let day = weekday_index(&now);
    let time = wall_time(&now);
    enabled
        .iter()
        .any(|s| s.day_of_week == day && s.start_time <= time && time <= s.end_time)
}

/// The next upcoming schedule-window start strictly after `now`, or None
/// when the device has no enabled schedules.
///
/// A window already open (or already over) today does not count as "next":
/// its next start is the same weekday a week out. Punishment mode inherits
/// this deliberately, so punishing during an open window lasts until that
/// window's next weekly occurrence rather than ending with the current one.
pub fn next_schedule_start(schedules: &[Schedule], now: DateTime<Tz>) -> Option<DateTime<Tz>> {
    let enabled: Vec<&Schedule> = schedules.iter().filter(|s| s.enabled).collect();
    if enabled.is_empty() {
        return None;
    }

    let today = weekday_index(&now);
    let current_time = wall_time(&now);
    let tz = now.timezone();

    // Offset 7 wraps back to today's weekday and picks up the starts
    // skipped at offset 0.
    for offset in 0..8 {
        let day = (today + offset) % 7;
        let mut candidates: Vec<&Schedule> = enabled
            .iter()
            .copied()
            .filter(|s| s.day_of_week == day)
            .collect();
        candidates.sort_by(|a, b| a.start_time.cmp(&b.start_time));

        for schedule in candidates {
            if offset == 0 && schedule.start_time <= current_time {
                continue;
            }

            let time = match NaiveTime::parse_from_str(&schedule.start_time, "%H:%M") {
                Ok(t) => t,
                // Rows are normalized at insert; skip anything unparseable
                Err(_) => continue,
            };
            let date = now.date_naive() + chrono::Duration::days(offset as i64);
            match tz.from_local_datetime(&date.and_time(time)) {
                chrono::LocalResult::Single(dt) => return Some(dt),
                // DST fold: take the earlier instant
                chrono::LocalResult::Ambiguous(dt, _) => return Some(dt),
                // DST gap: this wall time does not exist on that date
                chrono::LocalResult::None => continue,
            }
        }
    }

    None
}

/// Resolve the desired port state for one device from live store contents.
pub fn desired_state(
    store: &dyn Store,
    device_id: i32,
    now: DateTime<Tz>,
) -> Result<bool, ControlError> {
    let now_utc = now.with_timezone(&Utc);
    let punishment = store.active_punishment(device_id, now_utc)?;
    let temporary = store.active_temporary_access(device_id, now_utc)?;
    let schedules = store.schedules_for_device(device_id)?;
    Ok(should_be_enabled(
        punishment.as_ref(),
        temporary.as_ref(),
        &schedules,
        now,
    ))
}

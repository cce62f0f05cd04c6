//! Mutation semantics for the two manual overrides.
//!
//! Temporary access stacks onto an existing grant instead of replacing
//! it, and punishment mode is bounded by the next schedule window so a
//! forgotten activation can never outlive the week. Both read the clock
//! through [`Clock`] so the arithmetic is testable at fixed instants.

use crate::error::ControlError;
use crate::models::{NewPunishmentMode, NewTemporaryAccess, PunishmentMode, TemporaryAccess};
use crate::services::clock::Clock;
use crate::services::resolver;
use crate::services::store::Store;
use chrono::{Duration, Utc};

/// Outcome of a grant request: the row now in force, and whether it was
/// an extension of an existing grant or a fresh window.
#[derive(Debug)]
pub struct GrantResult {
    pub grant: TemporaryAccess,
    pub extended: bool,
}

/// Grant (or extend) temporary access for `duration_minutes`.
///
/// With an active grant in place the new minutes are added to its
/// current expiry, not to now, so repeated grants accumulate. Without
/// one, a fresh window `[now, now + duration]` is created.
pub fn grant_temporary_access(
    store: &dyn Store,
    clock: &dyn Clock,
    device_id: i32,
    duration_minutes: i64,
) -> Result<GrantResult, ControlError> {
    if duration_minutes <= 0 {
        return Err(ControlError::Validation(
            "duration_minutes must be positive".to_string(),
        ));
    }

    let now = clock.now().with_timezone(&Utc);
    // Duration construction and the expiry adds both have hard upper
    // limits; a request past either is a validation error, not a panic.
    let duration = Duration::try_minutes(duration_minutes).ok_or_else(|| {
        ControlError::Validation("duration_minutes is too large".to_string())
    })?;

    match store.active_temporary_access(device_id, now)? {
        Some(mut grant) => {
            let expires_at = grant.expires_at.checked_add_signed(duration).ok_or_else(|| {
                ControlError::Validation("duration_minutes is too large".to_string())
            })?;
            store.extend_temporary_access(grant.id, expires_at)?;
            grant.expires_at = expires_at;
            log::info!(
                "Extended temporary access for device {} until {}",
                device_id,
                expires_at
            );
            Ok(GrantResult {
                grant,
                extended: true,
            })
        }
        None => {
            let expires_at = now.checked_add_signed(duration).ok_or_else(|| {
                ControlError::Validation("duration_minutes is too large".to_string())
            })?;
            let grant = store.insert_temporary_access(NewTemporaryAccess {
                device_id,
                granted_at: now,
                expires_at,
                active: true,
            })?;
            log::info!(
                "Granted temporary access for device {} until {}",
                device_id,
                grant.expires_at
            );
            Ok(GrantResult {
                grant,
                extended: false,
            })
        }
    }
}

/// Deactivate every active grant for the device. Returns how many rows
/// were revoked.
pub fn revoke_temporary_access(
    store: &dyn Store,
    device_id: i32,
) -> Result<usize, ControlError> {
    let revoked = store.revoke_temporary_access(device_id)?;
    if revoked > 0 {
        log::info!(
            "Revoked {} temporary access grant(s) for device {}",
            revoked,
            device_id
        );
    }
    Ok(revoked)
}

/// Activate punishment mode, expiring at the start of the next schedule
/// window. A device with no enabled schedules has nothing to bound the
/// punishment, so nothing is written and [`ControlError::NoSchedules`]
/// comes back.
pub fn activate_punishment(
    store: &dyn Store,
    clock: &dyn Clock,
    device_id: i32,
) -> Result<PunishmentMode, ControlError> {
    let schedules = store.schedules_for_device(device_id)?;
    let now = clock.now();

    let next_start = match resolver::next_schedule_start(&schedules, now) {
        Some(start) => start,
        None => return Err(ControlError::NoSchedules),
    };

    let punishment = store.insert_punishment(NewPunishmentMode {
        device_id,
        activated_at: now.with_timezone(&Utc),
        expires_at: next_start.with_timezone(&Utc),
        active: true,
    })?;
    log::info!(
        "Punishment mode active for device {} until {}",
        device_id,
        punishment.expires_at
    );
    Ok(punishment)
}

/// Deactivate every active punishment row for the device.
pub fn revoke_punishment(store: &dyn Store, device_id: i32) -> Result<usize, ControlError> {
    let revoked = store.revoke_punishment(device_id)?;
    if revoked > 0 {
        log::info!(
            "Lifted punishment mode for device {} ({} row(s))",
            device_id,
            revoked
        );
    }
    Ok(revoked)
}

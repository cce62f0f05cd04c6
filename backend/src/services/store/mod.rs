//! Persistent records behind the access-control operations.
//!
//! The store sits behind a trait so the reconciliation loop and the
//! mutation semantics can be exercised against [`MemoryStore`] in tests;
//! production wiring uses [`PgStore`] over the diesel pool. Writes are
//! low-volume and treated as serialized; referential integrity (device
//! deletion cascades to schedules and overrides) is the store's job.

use crate::error::ControlError;
use crate::models::{
    Device, DeviceChanges, NewDevice, NewPunishmentMode, NewSchedule, NewTemporaryAccess,
    PunishmentMode, Schedule, TemporaryAccess,
};
use chrono::{DateTime, Utc};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub trait Store: Send + Sync {
    fn list_devices(&self) -> Result<Vec<Device>, ControlError>;

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, ControlError>;

    fn default_device(&self) -> Result<Option<Device>, ControlError>;

    /// The first device ever registered becomes the default regardless of
    /// the requested flag; a later device registered as default displaces
    /// the current one.
    fn add_device(&self, new_device: NewDevice) -> Result<Device, ControlError>;

    /// Partial update. Setting `is_default = true` moves the flag; there
    /// is never more than one default device.
    fn update_device(
        &self,
        device_id: i32,
        changes: DeviceChanges,
    ) -> Result<Device, ControlError>;

    /// Deletes a device and everything attached to it. Deleting the
    /// default promotes the lowest-id remaining device, if any.
    /// Returns false when the id did not exist.
    fn delete_device(&self, device_id: i32) -> Result<bool, ControlError>;

    /// Enabled schedule rows for a device, ordered by weekday then start.
    fn schedules_for_device(&self, device_id: i32) -> Result<Vec<Schedule>, ControlError>;

    /// Upsert on `(device_id, day_of_week, start_time, end_time)`:
    /// re-adding an identical window re-enables it instead of duplicating.
    fn add_schedule(&self, new_schedule: NewSchedule) -> Result<Schedule, ControlError>;

    fn delete_schedule(&self, schedule_id: i32) -> Result<bool, ControlError>;

    /// The currently-active unexpired grant, ties broken by greatest
    /// expiry. `active` alone is not trusted; expiry is part of the query.
    fn active_temporary_access(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TemporaryAccess>, ControlError>;

    fn insert_temporary_access(
        &self,
        grant: NewTemporaryAccess,
    ) -> Result<TemporaryAccess, ControlError>;

    fn extend_temporary_access(
        &self,
        grant_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ControlError>;

    /// Deactivates every active grant for the device, expired or not.
    /// Returns how many rows were flipped.
    fn revoke_temporary_access(&self, device_id: i32) -> Result<usize, ControlError>;

    fn active_punishment(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<PunishmentMode>, ControlError>;

    fn insert_punishment(
        &self,
        punishment: NewPunishmentMode,
    ) -> Result<PunishmentMode, ControlError>;

    fn revoke_punishment(&self, device_id: i32) -> Result<usize, ControlError>;

    /// Lazy cleanup: flip `active` off on every override row, store-wide,
    /// whose expiry has passed. Returns how many rows were flipped.
    fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, ControlError>;

    fn get_setting(&self, key: &str) -> Result<Option<String>, ControlError>;

    fn set_setting(&self, key: &str, value: &str) -> Result<(), ControlError>;

    /// Device-scoping rule shared by every operation taking an optional
    /// device id: an explicit id must exist, a missing id means the
    /// default device.
    fn resolve_device(&self, device_id: Option<i32>) -> Result<Device, ControlError> {
        match device_id {
            Some(id) => self
                .get_device(id)?
                .ok_or_else(|| ControlError::NotFound(format!("device {} not found", id))),
            None => self.default_device()?.ok_or_else(|| {
                ControlError::NotFound("no default device configured".to_string())
            }),
        }
    }
}

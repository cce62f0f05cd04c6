use crate::error::ControlError;
use crate::models::{
    Device, DeviceChanges, NewDevice, NewPunishmentMode, NewSchedule, NewTemporaryAccess,
    PunishmentMode, Schedule, TemporaryAccess,
};
use crate::services::store::Store;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// In-memory store with the same observable behavior as [`PgStore`]:
/// sequential ids from 1, delete cascades, single-default bookkeeping,
/// unique device aliases. Used by unit tests and kept in lockstep with
/// the SQL implementation.
///
/// [`PgStore`]: crate::services::store::PgStore
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    devices: Vec<Device>,
    schedules: Vec<Schedule>,
    grants: Vec<TemporaryAccess>,
    punishments: Vec<PunishmentMode>,
    settings: HashMap<String, String>,
    next_device_id: i32,
    next_schedule_id: i32,
    next_grant_id: i32,
    next_punishment_id: i32,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn device_exists(&self, device_id: i32) -> Result<(), ControlError> {
        if self.devices.iter().any(|d| d.id == device_id) {
            Ok(())
        } else {
            Err(ControlError::NotFound(format!(
                "missing parent row: device {}",
                device_id
            )))
        }
    }
}

impl Store for MemoryStore {
    fn list_devices(&self) -> Result<Vec<Device>, ControlError> {
        Ok(self.lock().devices.clone())
    }

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, ControlError> {
        Ok(self
            .lock()
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned())
    }

    fn default_device(&self) -> Result<Option<Device>, ControlError> {
        Ok(self.lock().devices.iter().find(|d| d.is_default).cloned())
    }

    fn add_device(&self, new_device: NewDevice) -> Result<Device, ControlError> {
        let mut inner = self.lock();
        if inner.devices.iter().any(|d| d.alias == new_device.alias) {
            return Err(ControlError::Validation(format!(
                "already exists: device alias '{}'",
                new_device.alias
            )));
        }

        let is_default = new_device.is_default || inner.devices.is_empty();
        if is_default {
            for device in inner.devices.iter_mut() {
                device.is_default = false;
            }
        }

        inner.next_device_id += 1;
        let device = Device {
            id: inner.next_device_id,
            alias: new_device.alias,
            host: new_device.host,
            username: new_device.username,
            password: new_device.password,
            port_index: new_device.port_index,
            is_default,
            created_at: Utc::now(),
        };
        inner.devices.push(device.clone());
        Ok(device)
    }

    fn update_device(
        &self,
        device_id: i32,
        changes: DeviceChanges,
    ) -> Result<Device, ControlError> {
        let mut inner = self.lock();
        let index = inner
            .devices
            .iter()
            .position(|d| d.id == device_id)
            .ok_or_else(|| ControlError::NotFound(format!("device {} not found", device_id)))?;

        // Reject before touching anything, like the SQL transaction would.
        if let Some(alias) = changes.alias.as_deref() {
            if inner
                .devices
                .iter()
                .any(|d| d.id != device_id && d.alias == alias)
            {
                return Err(ControlError::Validation(format!(
                    "already exists: device alias '{}'",
                    alias
                )));
            }
        }

        if changes.is_default == Some(true) {
            for device in inner.devices.iter_mut() {
                if device.id != device_id {
                    device.is_default = false;
                }
            }
        }

        let device = &mut inner.devices[index];
        if let Some(alias) = changes.alias {
            device.alias = alias;
        }
        if let Some(host) = changes.host {
            device.host = host;
        }
        if let Some(username) = changes.username {
            device.username = username;
        }
        if let Some(password) = changes.password {
            device.password = password;
        }
        if let Some(port_index) = changes.port_index {
            device.port_index = port_index;
        }
        if let Some(is_default) = changes.is_default {
            device.is_default = is_default;
        }
        Ok(device.clone())
    }

    fn delete_device(&self, device_id: i32) -> Result<bool, ControlError> {
        let mut inner = self.lock();
        let index = match inner.devices.iter().position(|d| d.id == device_id) {
            Some(i) => i,
            None => return Ok(false),
        };
        let removed = inner.devices.remove(index);

        inner.schedules.retain(|s| s.device_id != device_id);
        inner.grants.retain(|g| g.device_id != device_id);
        inner.punishments.retain(|p| p.device_id != device_id);

        if removed.is_default {
            if let Some(successor) = inner.devices.iter_mut().min_by_key(|d| d.id) {
                successor.is_default = true;
            }
        }
        Ok(true)
    }

    fn schedules_for_device(&self, device_id: i32) -> Result<Vec<Schedule>, ControlError> {
        let mut rows: Vec<Schedule> = self
            .lock()
            .schedules
            .iter()
            .filter(|s| s.device_id == device_id && s.enabled)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.day_of_week, &a.start_time).cmp(&(b.day_of_week, &b.start_time))
        });
        Ok(rows)
    }

    fn add_schedule(&self, new_schedule: NewSchedule) -> Result<Schedule, ControlError> {
        let mut inner = self.lock();
        inner.device_exists(new_schedule.device_id)?;

        let existing = inner.schedules.iter_mut().find(|s| {
            s.device_id == new_schedule.device_id
                && s.day_of_week == new_schedule.day_of_week
                && s.start_time == new_schedule.start_time
                && s.end_time == new_schedule.end_time
        });
        if let Some(row) = existing {
            row.enabled = true;
            return Ok(row.clone());
        }

        inner.next_schedule_id += 1;
        let row = Schedule {
            id: inner.next_schedule_id,
            device_id: new_schedule.device_id,
            day_of_week: new_schedule.day_of_week,
            start_time: new_schedule.start_time,
            end_time: new_schedule.end_time,
            enabled: new_schedule.enabled,
        };
        inner.schedules.push(row.clone());
        Ok(row)
    }

    fn delete_schedule(&self, schedule_id: i32) -> Result<bool, ControlError> {
        let mut inner = self.lock();
        let before = inner.schedules.len();
        inner.schedules.retain(|s| s.id != schedule_id);
        Ok(inner.schedules.len() < before)
    }

    fn active_temporary_access(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TemporaryAccess>, ControlError> {
        Ok(self
            .lock()
            .grants
            .iter()
            .filter(|g| g.device_id == device_id && g.active && g.expires_at > now)
            .max_by_key(|g| g.expires_at)
            .cloned())
    }

    fn insert_temporary_access(
        &self,
        grant: NewTemporaryAccess,
    ) -> Result<TemporaryAccess, ControlError> {
        let mut inner = self.lock();
        inner.device_exists(grant.device_id)?;

        inner.next_grant_id += 1;
        let row = TemporaryAccess {
            id: inner.next_grant_id,
            device_id: grant.device_id,
            granted_at: grant.granted_at,
            expires_at: grant.expires_at,
            active: grant.active,
        };
        inner.grants.push(row.clone());
        Ok(row)
    }

    fn extend_temporary_access(
        &self,
        grant_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ControlError> {
        let mut inner = self.lock();
        match inner.grants.iter_mut().find(|g| g.id == grant_id) {
            Some(grant) => {
                grant.expires_at = expires_at;
                Ok(())
            }
            None => Err(ControlError::NotFound(format!(
                "temporary access grant {} not found",
                grant_id
            ))),
        }
    }

    fn revoke_temporary_access(&self, device_id: i32) -> Result<usize, ControlError> {
        let mut inner = self.lock();
        let mut flipped = 0;
        for grant in inner.grants.iter_mut() {
            if grant.device_id == device_id && grant.active {
                grant.active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn active_punishment(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<PunishmentMode>, ControlError> {
        Ok(self
            .lock()
            .punishments
            .iter()
            .filter(|p| p.device_id == device_id && p.active && p.expires_at > now)
            .max_by_key(|p| p.expires_at)
            .cloned())
    }

    fn insert_punishment(
        &self,
        punishment: NewPunishmentMode,
    ) -> Result<PunishmentMode, ControlError> {
        let mut inner = self.lock();
        inner.device_exists(punishment.device_id)?;

        inner.next_punishment_id += 1;
        let row = PunishmentMode {
            id: inner.next_punishment_id,
            device_id: punishment.device_id,
            activated_at: punishment.activated_at,
            expires_at: punishment.expires_at,
            active: punishment.active,
        };
        inner.punishments.push(row.clone());
        Ok(row)
    }

    fn revoke_punishment(&self, device_id: i32) -> Result<usize, ControlError> {
        let mut inner = self.lock();
        let mut flipped = 0;
        for punishment in inner.punishments.iter_mut() {
            if punishment.device_id == device_id && punishment.active {
                punishment.active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, ControlError> {
        let mut inner = self.lock();
        let mut flipped = 0;
        for grant in inner.grants.iter_mut() {
            if grant.active && grant.expires_at <= now {
                grant.active = false;
                flipped += 1;
            }
        }
        for punishment in inner.punishments.iter_mut() {
            if punishment.active && punishment.expires_at <= now {
                punishment.active = false;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, ControlError> {
        Ok(self.lock().settings.get(key).cloned())
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), ControlError> {
        self.lock()
            .settings
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

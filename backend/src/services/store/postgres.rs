use crate::db::DbPool;
use crate::error::ControlError;
use crate::models::{
    Device, DeviceChanges, NewDevice, NewPunishmentMode, NewSchedule, NewTemporaryAccess,
    PunishmentMode, Schedule, Setting, TemporaryAccess,
};
use crate::schema::{devices, punishment_mode, schedules, settings, temporary_access};
use crate::services::store::Store;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

type PgConn = PooledConnection<ConnectionManager<PgConnection>>;

/// Diesel-backed store over the r2d2 pool. Default-device bookkeeping
/// runs inside transactions so a crash can never leave two defaults.
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    fn conn(&self) -> Result<PgConn, ControlError> {
        Ok(self.pool.get()?)
    }
}

impl Store for PgStore {
    fn list_devices(&self) -> Result<Vec<Device>, ControlError> {
        let mut conn = self.conn()?;
        let rows = devices::table
            .order(devices::id.asc())
            .select(Device::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, ControlError> {
        let mut conn = self.conn()?;
        let row = devices::table
            .find(device_id)
            .select(Device::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn default_device(&self) -> Result<Option<Device>, ControlError> {
        let mut conn = self.conn()?;
        let row = devices::table
            .filter(devices::is_default.eq(true))
            .select(Device::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn add_device(&self, mut new_device: NewDevice) -> Result<Device, ControlError> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let device_count: i64 = devices::table.count().get_result(conn)?;
            if device_count == 0 {
                new_device.is_default = true;
            }
            if new_device.is_default {
                diesel::update(devices::table.filter(devices::is_default.eq(true)))
                    .set(devices::is_default.eq(false))
                    .execute(conn)?;
            }

            let device = diesel::insert_into(devices::table)
                .values(&new_device)
                .returning(Device::as_returning())
                .get_result(conn)?;
            Ok(device)
        })
    }

    fn update_device(
        &self,
        device_id: i32,
        changes: DeviceChanges,
    ) -> Result<Device, ControlError> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            if changes.is_default == Some(true) {
                diesel::update(devices::table.filter(devices::id.ne(device_id)))
                    .set(devices::is_default.eq(false))
                    .execute(conn)?;
            }

            // Diesel rejects an all-None changeset, so hand back the row as-is.
            if changes.is_empty() {
                return devices::table
                    .find(device_id)
                    .select(Device::as_select())
                    .first(conn)
                    .optional()?
                    .ok_or_else(|| {
                        ControlError::NotFound(format!("device {} not found", device_id))
                    });
            }

            diesel::update(devices::table.find(device_id))
                .set(&changes)
                .returning(Device::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| ControlError::NotFound(format!("device {} not found", device_id)))
        })
    }

    fn delete_device(&self, device_id: i32) -> Result<bool, ControlError> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            let target = devices::table
                .find(device_id)
                .select(Device::as_select())
                .first::<Device>(conn)
                .optional()?;
            let device = match target {
                Some(d) => d,
                None => return Ok(false),
            };

            // Schedules and overrides go with it via ON DELETE CASCADE.
            diesel::delete(devices::table.find(device_id)).execute(conn)?;

            if device.is_default {
                let successor = devices::table
                    .order(devices::id.asc())
                    .select(devices::id)
                    .first::<i32>(conn)
                    .optional()?;
                if let Some(next_id) = successor {
                    diesel::update(devices::table.find(next_id))
                        .set(devices::is_default.eq(true))
                        .execute(conn)?;
                }
            }

            Ok(true)
        })
    }

    fn schedules_for_device(&self, device_id: i32) -> Result<Vec<Schedule>, ControlError> {
        let mut conn = self.conn()?;
        let rows = schedules::table
            .filter(schedules::device_id.eq(device_id))
            .filter(schedules::enabled.eq(true))
            .order((schedules::day_of_week.asc(), schedules::start_time.asc()))
            .select(Schedule::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn add_schedule(&self, new_schedule: NewSchedule) -> Result<Schedule, ControlError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(schedules::table)
            .values(&new_schedule)
            .on_conflict((
                schedules::device_id,
                schedules::day_of_week,
                schedules::start_time,
                schedules::end_time,
            ))
            .do_update()
            .set(schedules::enabled.eq(true))
            .returning(Schedule::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn delete_schedule(&self, schedule_id: i32) -> Result<bool, ControlError> {
        let mut conn = self.conn()?;
        let deleted =
            diesel::delete(schedules::table.find(schedule_id)).execute(&mut conn)?;
        Ok(deleted > 0)
    }

    fn active_temporary_access(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<TemporaryAccess>, ControlError> {
        let mut conn = self.conn()?;
        let row = temporary_access::table
            .filter(temporary_access::device_id.eq(device_id))
            .filter(temporary_access::active.eq(true))
            .filter(temporary_access::expires_at.gt(now))
            .order(temporary_access::expires_at.desc())
            .select(TemporaryAccess::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn insert_temporary_access(
        &self,
        grant: NewTemporaryAccess,
    ) -> Result<TemporaryAccess, ControlError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(temporary_access::table)
            .values(&grant)
            .returning(TemporaryAccess::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn extend_temporary_access(
        &self,
        grant_id: i32,
        expires_at: DateTime<Utc>,
    ) -> Result<(), ControlError> {
        let mut conn = self.conn()?;
        let updated = diesel::update(temporary_access::table.find(grant_id))
            .set(temporary_access::expires_at.eq(expires_at))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(ControlError::NotFound(format!(
                "temporary access grant {} not found",
                grant_id
            )));
        }
        Ok(())
    }

    fn revoke_temporary_access(&self, device_id: i32) -> Result<usize, ControlError> {
        let mut conn = self.conn()?;
        let flipped = diesel::update(
            temporary_access::table
                .filter(temporary_access::device_id.eq(device_id))
                .filter(temporary_access::active.eq(true)),
        )
        .set(temporary_access::active.eq(false))
        .execute(&mut conn)?;
        Ok(flipped)
    }

    fn active_punishment(
        &self,
        device_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<PunishmentMode>, ControlError> {
        let mut conn = self.conn()?;
        let row = punishment_mode::table
            .filter(punishment_mode::device_id.eq(device_id))
            .filter(punishment_mode::active.eq(true))
            .filter(punishment_mode::expires_at.gt(now))
            .order(punishment_mode::expires_at.desc())
            .select(PunishmentMode::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    fn insert_punishment(
        &self,
        punishment: NewPunishmentMode,
    ) -> Result<PunishmentMode, ControlError> {
        let mut conn = self.conn()?;
        let row = diesel::insert_into(punishment_mode::table)
            .values(&punishment)
            .returning(PunishmentMode::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn revoke_punishment(&self, device_id: i32) -> Result<usize, ControlError> {
        let mut conn = self.conn()?;
        let flipped = diesel::update(
            punishment_mode::table
                .filter(punishment_mode::device_id.eq(device_id))
                .filter(punishment_mode::active.eq(true)),
        )
        .set(punishment_mode::active.eq(false))
        .execute(&mut conn)?;
        Ok(flipped)
    }

    fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<usize, ControlError> {
        let mut conn = self.conn()?;
        let grants = diesel::update(
            temporary_access::table
                .filter(temporary_access::active.eq(true))
                .filter(temporary_access::expires_at.le(now)),
        )
        .set(temporary_access::active.eq(false))
        .execute(&mut conn)?;

        let punishments = diesel::update(
            punishment_mode::table
                .filter(punishment_mode::active.eq(true))
                .filter(punishment_mode::expires_at.le(now)),
        )
        .set(punishment_mode::active.eq(false))
        .execute(&mut conn)?;

        Ok(grants + punishments)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>, ControlError> {
        let mut conn = self.conn()?;
        let value = settings::table
            .find(key)
            .select(settings::value)
            .first::<String>(&mut conn)
            .optional()?;
        Ok(value)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<(), ControlError> {
        let mut conn = self.conn()?;
        diesel::insert_into(settings::table)
            .values(&Setting {
                key: key.to_string(),
                value: value.to_string(),
            })
            .on_conflict(settings::key)
            .do_update()
            .set(settings::value.eq(value))
            .execute(&mut conn)?;
        Ok(())
    }
}

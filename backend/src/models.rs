use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A managed switch device. Exactly one device may carry `is_default`,
/// which is the target of every operation that omits a device id.
#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
pub struct Device {
    pub id: i32,
    pub alias: String,
    pub host: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub port_index: i32,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::devices)]
pub struct NewDevice {
    pub alias: String,
    pub host: String,
    pub username: String,
    pub password: String,
    pub port_index: i32,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(AsChangeset, Deserialize, Debug, Clone, Default)]
#[diesel(table_name = crate::schema::devices)]
pub struct DeviceChanges {
    pub alias: Option<String>,
    pub host: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub port_index: Option<i32>,
    pub is_default: Option<bool>,
}

impl DeviceChanges {
    pub fn is_empty(&self) -> bool {
        self.alias.is_none()
            && self.host.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.port_index.is_none()
            && self.is_default.is_none()
    }
}

/// Weekly recurring enable window. `day_of_week` counts Monday as 0;
/// `start_time`/`end_time` are zero-padded "HH:MM" strings compared
/// lexicographically, and the window is closed on both ends.
#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::schedules)]
pub struct Schedule {
    pub id: i32,
    pub device_id: i32,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::schedules)]
pub struct NewSchedule {
    pub device_id: i32,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

/// Timed force-enable override. `active` lags reality: expired rows are
/// flipped lazily by the sweep, so readers re-check `expires_at`.
#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::temporary_access)]
pub struct TemporaryAccess {
    pub id: i32,
    pub device_id: i32,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::temporary_access)]
pub struct NewTemporaryAccess {
    pub device_id: i32,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

/// Forced-disable override lasting until the next schedule start.
#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::punishment_mode)]
pub struct PunishmentMode {
    pub id: i32,
    pub device_id: i32,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::punishment_mode)]
pub struct NewPunishmentMode {
    pub device_id: i32,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

#[derive(Queryable, Selectable, Insertable, Serialize, Deserialize, Debug, Clone)]
#[diesel(table_name = crate::schema::settings)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

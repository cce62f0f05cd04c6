//! Recording driver for tests. Commands land in a vector instead of on
//! hardware, and failures can be injected per device.

use super::{DriverError, SwitchDriver, SwitchSession};
use crate::models::Device;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct MockSwitch {
    commands: Mutex<Vec<(i32, bool)>>,
    auth_failures: Mutex<HashSet<i32>>,
    command_failures: Mutex<HashSet<i32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockSwitch {
    pub fn new() -> Self {
        MockSwitch::default()
    }

    /// Every `(device_id, enabled)` command issued so far, in order.
    pub fn commands(&self) -> Vec<(i32, bool)> {
        lock(&self.commands).clone()
    }

    pub fn fail_auth_for(&self, device_id: i32) {
        lock(&self.auth_failures).insert(device_id);
    }

    pub fn fail_commands_for(&self, device_id: i32) {
        lock(&self.command_failures).insert(device_id);
    }

    pub fn clear_failures(&self, device_id: i32) {
        lock(&self.auth_failures).remove(&device_id);
        lock(&self.command_failures).remove(&device_id);
    }
}

#[async_trait]
impl SwitchDriver for MockSwitch {
    fn driver_name(&self) -> &'static str {
        "mock"
    }

    async fn authenticate(&self, device: &Device) -> Result<SwitchSession, DriverError> {
        if lock(&self.auth_failures).contains(&device.id) {
            return Err(DriverError::AuthenticationFailed(
                "injected auth failure".to_string(),
            ));
        }
        Ok(SwitchSession {
            token: format!("mock-token-{}", device.id),
        })
    }

    async fn set_port_state(
        &self,
        _session: &SwitchSession,
        device: &Device,
        enabled: bool,
    ) -> Result<(), DriverError> {
        if lock(&self.command_failures).contains(&device.id) {
            return Err(DriverError::CommandRejected(
                "injected command failure".to_string(),
            ));
        }
        lock(&self.commands).push((device.id, enabled));
        Ok(())
    }
}

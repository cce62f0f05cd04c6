//! Convergence loop between stored policy and switch port state.
//!
//! Every pass computes the desired state per device from the resolver
//! and only talks to the switch when that differs from the last state
//! this process successfully commanded. The observed map is process
//! memory, not hardware truth: a forced sweep (startup, or an explicit
//! reconcile request) ignores it and always issues commands, which is
//! how drift from reboots or manual switch edits gets repaired.

use crate::error::ControlError;
use crate::integrations::SwitchDriver;
use crate::models::Device;
use crate::services::clock::Clock;
use crate::services::resolver;
use crate::services::store::Store;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// What converging a single device did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Observed state already matched; no command sent.
    Unchanged { enabled: bool },
    /// A command went out and the observed state was updated.
    Converged { enabled: bool },
}

impl ReconcileOutcome {
    pub fn enabled(&self) -> bool {
        match self {
            ReconcileOutcome::Unchanged { enabled } => *enabled,
            ReconcileOutcome::Converged { enabled } => *enabled,
        }
    }
}

/// Totals for one sweep over every device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub checked: usize,
    pub converged: usize,
    pub unchanged: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn Store>,
    driver: Arc<dyn SwitchDriver>,
    clock: Arc<dyn Clock>,
    /// Last state successfully commanded, per device id. Devices this
    /// process has never commanded count as disabled, so the first
    /// enable always goes out.
    observed: Mutex<HashMap<i32, bool>>,
    /// Per-device async locks so overlapping reconciles (minute tick
    /// racing a mutation endpoint) serialize per device only.
    locks: Mutex<HashMap<i32, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        driver: Arc<dyn SwitchDriver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Reconciler {
            store,
            driver,
            clock,
            observed: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn device_lock(&self, device_id: i32) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(device_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Last state this process successfully commanded, if any.
    pub fn observed_state(&self, device_id: i32) -> Option<bool> {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device_id)
            .copied()
    }

    fn last_observed(&self, device_id: i32) -> bool {
        self.observed_state(device_id).unwrap_or(false)
    }

    fn record_observed(&self, device_id: i32, enabled: bool) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device_id, enabled);
    }

    /// Drop all loop state for a device, for use after deletion. The
    /// next reconcile of a reused id starts from scratch.
    pub fn forget(&self, device_id: i32) {
        self.observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device_id);
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&device_id);
    }

    async fn converge(
        &self,
        device: &Device,
        forced: bool,
    ) -> Result<ReconcileOutcome, ControlError> {
        let lock = self.device_lock(device.id);
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let desired = resolver::desired_state(self.store.as_ref(), device.id, now)?;

        if !forced && self.last_observed(device.id) == desired {
            log::debug!(
                "Device {} ({}) already {}",
                device.id,
                device.alias,
                if desired { "enabled" } else { "disabled" }
            );
            return Ok(ReconcileOutcome::Unchanged { enabled: desired });
        }

        let session = self
            .driver
            .authenticate(device)
            .await
            .map_err(|e| ControlError::DeviceAuth(e.to_string()))?;
        self.driver
            .set_port_state(&session, device, desired)
            .await
            .map_err(|e| ControlError::DeviceCommand(e.to_string()))?;

        self.record_observed(device.id, desired);
        log::info!(
            "Device {} ({}) port {} {}",
            device.id,
            device.alias,
            device.port_index,
            if desired { "enabled" } else { "disabled" }
        );
        Ok(ReconcileOutcome::Converged { enabled: desired })
    }

    fn cleanup_expired(&self) {
        let now = self.clock.now().with_timezone(&Utc);
        match self.store.deactivate_expired(now) {
            Ok(0) => {}
            Ok(flipped) => log::info!("Deactivated {} expired override(s)", flipped),
            Err(e) => log::warn!("Expired-override cleanup failed: {}", e),
        }
    }

    /// Converge one device, cleaning up expired overrides first.
    pub async fn reconcile_device(
        &self,
        device_id: i32,
        forced: bool,
    ) -> Result<ReconcileOutcome, ControlError> {
        self.cleanup_expired();
        let device = self.store.resolve_device(Some(device_id))?;
        self.converge(&device, forced).await
    }

    /// One sweep over every device. Failures are counted and logged,
    /// never propagated, so one unreachable switch cannot stall the rest.
    pub async fn reconcile_all(&self, forced: bool) -> SweepSummary {
        self.cleanup_expired();

        let devices = match self.store.list_devices() {
            Ok(devices) => devices,
            Err(e) => {
                log::error!("Sweep aborted, could not list devices: {}", e);
                return SweepSummary::default();
            }
        };

        let mut summary = SweepSummary {
            checked: devices.len(),
            ..SweepSummary::default()
        };
        for device in &devices {
            match self.converge(device, forced).await {
                Ok(ReconcileOutcome::Converged { .. }) => summary.converged += 1,
                Ok(ReconcileOutcome::Unchanged { .. }) => summary.unchanged += 1,
                Err(e) => {
                    summary.failed += 1;
                    log::error!(
                        "Reconcile failed for device {} ({}): {}",
                        device.id,
                        device.alias,
                        e
                    );
                }
            }
        }

        log::info!(
            "Sweep complete: {} checked, {} converged, {} unchanged, {} failed",
            summary.checked,
            summary.converged,
            summary.unchanged,
            summary.failed
        );
        summary
    }

    /// Forced sweep for process start: command every device regardless
    /// of (empty) observed state, so reality matches policy from boot.
    pub async fn startup_sync(&self) -> SweepSummary {
        log::info!("Startup sync: forcing port state for all devices");
        self.reconcile_all(true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::mock::MockSwitch;
    use crate::models::{NewDevice, NewPunishmentMode, NewSchedule};
    use crate::services::clock::FixedClock;
    use crate::services::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone};
    use chrono_tz::America::New_York;
    use chrono_tz::Tz;

    fn ny(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        New_York.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        driver: Arc<MockSwitch>,
        clock: Arc<FixedClock>,
        reconciler: Reconciler,
    }

    fn fixture(now: DateTime<Tz>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let driver = Arc::new(MockSwitch::new());
        let clock = Arc::new(FixedClock::new(now));
        let reconciler = Reconciler::new(store.clone(), driver.clone(), clock.clone());
        Fixture {
            store,
            driver,
            clock,
            reconciler,
        }
    }

    fn add_device(store: &MemoryStore, alias: &str) -> i32 {
        store
            .add_device(NewDevice {
                alias: alias.to_string(),
                host: format!("10.0.0.{}", alias.len()),
                username: "admin".to_string(),
                password: "pw".to_string(),
                port_index: 4,
                is_default: false,
            })
            .unwrap()
            .id
    }

    fn add_monday_nine_to_five(store: &MemoryStore, device_id: i32) {
        store
            .add_schedule(NewSchedule {
                device_id,
                day_of_week: 0,
                start_time: "09:00".to_string(),
                end_time: "17:00".to_string(),
                enabled: true,
            })
            .unwrap();
    }

    #[actix_rt::test]
    async fn test_startup_sync_commands_every_device() {
        // Monday 10:00
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let open = add_device(&f.store, "open");
        let punished = add_device(&f.store, "punished");
        let now_utc = f.clock.now().with_timezone(&Utc);
        f.store
            .insert_punishment(NewPunishmentMode {
                device_id: punished,
                activated_at: now_utc,
                expires_at: now_utc + Duration::hours(2),
                active: true,
            })
            .unwrap();

        let summary = f.reconciler.startup_sync().await;

        assert_eq!(summary.checked, 2);
        assert_eq!(summary.converged, 2);
        assert_eq!(summary.failed, 0);
        // No schedules fails open; punishment forces off.
        assert_eq!(f.driver.commands(), vec![(open, true), (punished, false)]);
    }

    #[actix_rt::test]
    async fn test_unforced_tick_after_sync_sends_nothing() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        add_device(&f.store, "open");
        f.reconciler.startup_sync().await;
        let issued = f.driver.commands().len();

        let summary = f.reconciler.reconcile_all(false).await;

        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.converged, 0);
        assert_eq!(f.driver.commands().len(), issued);
    }

    #[actix_rt::test]
    async fn test_desired_change_triggers_one_command() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "laptop");
        add_monday_nine_to_five(&f.store, device_id);
        f.reconciler.startup_sync().await;
        assert_eq!(f.driver.commands(), vec![(device_id, true)]);

        // Window closes at 17:00; the next tick turns the port off.
        f.clock.set(ny(2025, 6, 2, 18, 0));
        let summary = f.reconciler.reconcile_all(false).await;

        assert_eq!(summary.converged, 1);
        assert_eq!(
            f.driver.commands(),
            vec![(device_id, true), (device_id, false)]
        );
    }

    #[actix_rt::test]
    async fn test_command_failure_leaves_observed_untouched() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "flaky");
        f.driver.fail_commands_for(device_id);

        let summary = f.reconciler.startup_sync().await;
        assert_eq!(summary.failed, 1);
        assert!(f.driver.commands().is_empty());

        // Switch comes back; the unforced tick retries because nothing
        // was recorded as observed.
        f.driver.clear_failures(device_id);
        let summary = f.reconciler.reconcile_all(false).await;

        assert_eq!(summary.converged, 1);
        assert_eq!(f.driver.commands(), vec![(device_id, true)]);
    }

    #[actix_rt::test]
    async fn test_one_failing_device_does_not_stall_the_rest() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let healthy = add_device(&f.store, "healthy");
        let broken = add_device(&f.store, "broken-device");
        f.driver.fail_auth_for(broken);

        let summary = f.reconciler.startup_sync().await;

        assert_eq!(summary.checked, 2);
        assert_eq!(summary.converged, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(f.driver.commands(), vec![(healthy, true)]);
    }

    #[actix_rt::test]
    async fn test_reconcile_device_error_kinds() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "laptop");

        let err = f.reconciler.reconcile_device(999, false).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");

        f.driver.fail_auth_for(device_id);
        let err = f
            .reconciler
            .reconcile_device(device_id, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "device_auth");

        f.driver.clear_failures(device_id);
        f.driver.fail_commands_for(device_id);
        let err = f
            .reconciler
            .reconcile_device(device_id, false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "device_command");
    }

    #[actix_rt::test]
    async fn test_forget_resets_observed_state() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "laptop");
        f.reconciler.startup_sync().await;
        assert_eq!(f.driver.commands().len(), 1);

        f.reconciler.forget(device_id);
        let summary = f.reconciler.reconcile_all(false).await;

        // Back to the never-commanded default, so the enable goes out again.
        assert_eq!(summary.converged, 1);
        assert_eq!(f.driver.commands().len(), 2);
    }

    #[actix_rt::test]
    async fn test_expired_punishment_cleaned_up_on_tick() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "laptop");
        let now_utc = f.clock.now().with_timezone(&Utc);
        f.store
            .insert_punishment(NewPunishmentMode {
                device_id,
                activated_at: now_utc,
                expires_at: now_utc + Duration::minutes(30),
                active: true,
            })
            .unwrap();

        f.reconciler.startup_sync().await;
        assert_eq!(f.driver.commands(), vec![(device_id, false)]);

        // Past the expiry the row is deactivated and the port re-enabled.
        f.clock.set(ny(2025, 6, 2, 10, 31));
        f.reconciler.reconcile_all(false).await;

        assert_eq!(
            f.driver.commands(),
            vec![(device_id, false), (device_id, true)]
        );
        let later_utc = f.clock.now().with_timezone(&Utc);
        assert!(f
            .store
            .active_punishment(device_id, later_utc)
            .unwrap()
            .is_none());
    }

    #[actix_rt::test]
    async fn test_forced_reconcile_reissues_matching_state() {
        let f = fixture(ny(2025, 6, 2, 10, 0));
        let device_id = add_device(&f.store, "laptop");
        f.reconciler.startup_sync().await;

        let outcome = f.reconciler.reconcile_device(device_id, true).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Converged { enabled: true });
        assert_eq!(
            f.driver.commands(),
            vec![(device_id, true), (device_id, true)]
        );
    }
}

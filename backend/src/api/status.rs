use crate::{
    error::ControlError,
    models::{Device, PunishmentMode, TemporaryAccess},
    services::auth::Claims,
    services::clock::Clock,
    services::reconciler::{ReconcileOutcome, Reconciler},
    services::resolver,
    services::store::Store,
};
use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct DeviceSelector {
    pub device_id: Option<i32>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub device_id: i32,
    pub alias: String,
    pub desired_enabled: bool,
    /// Last state this process commanded; null before the first command.
    pub observed_enabled: Option<bool>,
    pub temporary_access: Option<TemporaryAccess>,
    pub punishment: Option<PunishmentMode>,
    /// Next window opening, rendered in the process time zone.
    pub next_schedule_start: Option<String>,
}

fn device_status(
    store: &dyn Store,
    clock: &dyn Clock,
    reconciler: &Reconciler,
    device: &Device,
) -> Result<StatusResponse, ControlError> {
    let now = clock.now();
    let now_utc = now.with_timezone(&Utc);

    let schedules = store.schedules_for_device(device.id)?;
    let punishment = store.active_punishment(device.id, now_utc)?;
    let temporary_access = store.active_temporary_access(device.id, now_utc)?;
    let desired_enabled = resolver::should_be_enabled(
        punishment.as_ref(),
        temporary_access.as_ref(),
        &schedules,
        now,
    );
    let next_schedule_start = resolver::next_schedule_start(&schedules, now);

    Ok(StatusResponse {
        device_id: device.id,
        alias: device.alias.clone(),
        desired_enabled,
        observed_enabled: reconciler.observed_state(device.id),
        temporary_access,
        punishment,
        next_schedule_start: next_schedule_start.map(|t| t.to_rfc3339()),
    })
}

/// Resolved state for one device.
#[get("")]
pub async fn get_status(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    reconciler: web::Data<Reconciler>,
    query: web::Query<DeviceQuery>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(query.device_id)?;
    let status = device_status(
        store.get_ref(),
        clock.get_ref(),
        reconciler.get_ref(),
        &device,
    )?;
    Ok(HttpResponse::Ok().json(status))
}

/// Resolved state for every device.
#[get("/all")]
pub async fn all_statuses(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    reconciler: web::Data<Reconciler>,
) -> Result<HttpResponse, ControlError> {
    let devices = store.list_devices()?;
    let mut statuses = Vec::with_capacity(devices.len());
    for device in &devices {
        statuses.push(device_status(
            store.get_ref(),
            clock.get_ref(),
            reconciler.get_ref(),
            device,
        )?);
    }
    Ok(HttpResponse::Ok().json(statuses))
}

/// Force a reconciliation pass: one device when `device_id` is given,
/// otherwise a full sweep.
#[post("")]
pub async fn reconcile(
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<DeviceSelector>,
) -> Result<HttpResponse, ControlError> {
    match item.device_id {
        Some(device_id) => {
            let outcome = reconciler.reconcile_device(device_id, true).await?;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "device_id": device_id,
                "enabled": outcome.enabled(),
                "converged": matches!(outcome, ReconcileOutcome::Converged { .. }),
            })))
        }
        None => {
            let summary = reconciler.reconcile_all(true).await;
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "checked": summary.checked,
                "converged": summary.converged,
                "unchanged": summary.unchanged,
                "failed": summary.failed,
            })))
        }
    }
}

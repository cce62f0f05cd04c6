use crate::{
    error::ControlError,
    models::NewSchedule,
    services::auth::Claims,
    services::reconciler::Reconciler,
    services::resolver,
    services::store::Store,
};
use actix_web::{HttpResponse, delete, get, post, web};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub device_id: Option<i32>,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
}

/// Check a requested window and return the zero-padded times.
fn validate_window(
    day_of_week: i32,
    start_time: &str,
    end_time: &str,
) -> Result<(String, String), ControlError> {
    if !(0..=6).contains(&day_of_week) {
        return Err(ControlError::Validation(
            "day_of_week must be between 0 (Monday) and 6 (Sunday)".to_string(),
        ));
    }
    let start = resolver::normalize_hhmm(start_time).ok_or_else(|| {
        ControlError::Validation(format!("invalid start_time '{}', expected HH:MM", start_time))
    })?;
    let end = resolver::normalize_hhmm(end_time).ok_or_else(|| {
        ControlError::Validation(format!("invalid end_time '{}', expected HH:MM", end_time))
    })?;
    if start > end {
        return Err(ControlError::Validation(
            "start_time must not be after end_time".to_string(),
        ));
    }
    Ok((start, end))
}

/// List the enabled windows for a device (default device when no id given)
#[get("")]
pub async fn list_schedules(
    store: web::Data<dyn Store>,
    query: web::Query<DeviceQuery>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(query.device_id)?;
    let rows = store.schedules_for_device(device.id)?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Add a weekly window; re-adding an identical one re-enables it.
#[post("")]
pub async fn add_schedule(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<CreateScheduleRequest>,
) -> Result<HttpResponse, ControlError> {
    let request = item.into_inner();
    let (start_time, end_time) =
        validate_window(request.day_of_week, &request.start_time, &request.end_time)?;

    let device = store.resolve_device(request.device_id)?;
    let schedule = store.add_schedule(NewSchedule {
        device_id: device.id,
        day_of_week: request.day_of_week,
        start_time,
        end_time,
        enabled: true,
    })?;
    log::info!(
        "Schedule {} for device {}: day {} {}-{}",
        schedule.id,
        device.id,
        schedule.day_of_week,
        schedule.start_time,
        schedule.end_time
    );

    if let Err(e) = reconciler.reconcile_device(device.id, false).await {
        log::warn!(
            "Post-mutation reconcile failed for device {}: {}",
            device.id,
            e
        );
    }

    Ok(HttpResponse::Created().json(schedule))
}

/// Remove a window.
#[delete("/{schedule_id}")]
pub async fn delete_schedule(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    path: web::Path<i32>,
) -> Result<HttpResponse, ControlError> {
    let schedule_id = path.into_inner();
    if !store.delete_schedule(schedule_id)? {
        return Err(ControlError::NotFound(format!(
            "schedule {} not found",
            schedule_id
        )));
    }

    // The row is gone; a sweep converges whichever device it bounded.
    reconciler.reconcile_all(false).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
}

use crate::{
    error::ControlError,
    services::auth::Claims,
    services::clock::Clock,
    services::overrides,
    services::reconciler::Reconciler,
    services::store::Store,
};
use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;
use serde::Deserialize;

#[derive(Deserialize)]
pub struct DeviceQuery {
    pub device_id: Option<i32>,
}

#[derive(Deserialize)]
pub struct DeviceSelector {
    pub device_id: Option<i32>,
}

/// Currently-active punishment for the device, or JSON null.
#[get("")]
pub async fn get_punishment(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    query: web::Query<DeviceQuery>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(query.device_id)?;
    let now = clock.now().with_timezone(&Utc);
    let punishment = store.active_punishment(device.id, now)?;
    Ok(HttpResponse::Ok().json(punishment))
}

/// Cut access until the next schedule window opens. Fails with 409 when
/// the device has no enabled schedules to bound the punishment.
#[post("/activate")]
pub async fn activate_punishment(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<DeviceSelector>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(item.device_id)?;
    let punishment =
        overrides::activate_punishment(store.get_ref(), clock.get_ref(), device.id)?;

    if let Err(e) = reconciler.reconcile_device(device.id, false).await {
        log::warn!(
            "Post-mutation reconcile failed for device {}: {}",
            device.id,
            e
        );
    }

    Ok(HttpResponse::Ok().json(punishment))
}

/// Lift punishment mode early.
#[post("/revoke")]
pub async fn revoke_punishment(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<DeviceSelector>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(item.device_id)?;
    let revoked = overrides::revoke_punishment(store.get_ref(), device.id)?;

    if let Err(e) = reconciler.reconcile_device(device.id, false).await {
        log::warn!(
            "Post-mutation reconcile failed for device {}: {}",
            device.id,
            e
        );
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({"revoked": revoked})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_selector_deserialization() {
        let request: DeviceSelector = serde_json::from_str(r#"{"device_id": 7}"#).unwrap();
        assert_eq!(request.device_id, Some(7));
    }

    #[test]
    fn test_device_selector_defaults_to_default_device() {
        let request: DeviceSelector = serde_json::from_str("{}").unwrap();
        assert!(request.device_id.is_none());
    }
}

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

#[derive(Deserialize)]
pub struct GrantRequest {
    pub device_id: Option<i32>,
    pub duration_minutes: i64,
}

/// Currently-active grant for the device, or JSON null.
#[get("")]
pub async fn get_access(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    query: web::Query<DeviceQuery>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(query.device_id)?;
    let now = clock.now().with_timezone(&Utc);
    let grant = store.active_temporary_access(device.id, now)?;
    Ok(HttpResponse::Ok().json(grant))
}

/// Grant temporary access, stacking onto an active grant if one exists.
#[post("/grant")]
pub async fn grant_access(
    store: web::Data<dyn Store>,
    clock: web::Data<dyn Clock>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<GrantRequest>,
) -> Result<HttpResponse, ControlError> {
    let request = item.into_inner();
    let device = store.resolve_device(request.device_id)?;
    let result = overrides::grant_temporary_access(
        store.get_ref(),
        clock.get_ref(),
        device.id,
        request.duration_minutes,
    )?;

    if let Err(e) = reconciler.reconcile_device(device.id, false).await {
        log::warn!(
            "Post-mutation reconcile failed for device {}: {}",
            device.id,
            e
        );
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "extended": result.extended,
        "grant": result.grant,
    })))
}

/// Revoke all active grants for the device.
#[post("/revoke")]
pub async fn revoke_access(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    item: web::Json<DeviceSelector>,
) -> Result<HttpResponse, ControlError> {
    let device = store.resolve_device(item.device_id)?;
    let revoked = overrides::revoke_temporary_access(store.get_ref(), device.id)?;

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
    fn test_grant_request_deserialization() {
        let json = r#"{"device_id": 3, "duration_minutes": 45}"#;
        let request: GrantRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.device_id, Some(3));
        assert_eq!(request.duration_minutes, 45);
    }

    #[test]
    fn test_grant_request_defaults_to_default_device() {
        let json = r#"{"duration_minutes": 10}"#;
        let request: GrantRequest = serde_json::from_str(json).unwrap();

        assert!(request.device_id.is_none());
    }

    #[test]
    fn test_grant_request_requires_duration() {
        let json = r#"{"device_id": 3}"#;
        let result: Result<GrantRequest, _> = serde_json::from_str(json);

        assert!(result.is_err());
    }

    #[test]
    fn test_device_selector_accepts_empty_body() {
        let request: DeviceSelector = serde_json::from_str("{}").unwrap();
        assert!(request.device_id.is_none());
    }
}

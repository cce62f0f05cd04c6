use crate::{
    error::ControlError,
    models::{DeviceChanges, NewDevice},
    services::auth::Claims,
    services::reconciler::Reconciler,
    services::store::Store,
};
use actix_web::{HttpResponse, delete, get, post, put, web};

fn validate_new_device(device: &NewDevice) -> Result<(), ControlError> {
    if device.alias.trim().is_empty() {
        return Err(ControlError::Validation(
            "alias must not be empty".to_string(),
        ));
    }
    if device.host.trim().is_empty() {
        return Err(ControlError::Validation(
            "host must not be empty".to_string(),
        ));
    }
    if device.port_index < 0 {
        return Err(ControlError::Validation(
            "port_index must not be negative".to_string(),
        ));
    }
    Ok(())
}

/// List all registered devices (passwords are never serialized)
#[get("")]
pub async fn list_devices(store: web::Data<dyn Store>) -> Result<HttpResponse, ControlError> {
    let devices = store.list_devices()?;
    Ok(HttpResponse::Ok().json(devices))
}

/// Register a device. The first one registered becomes the default.
#[post("")]
pub async fn add_device(
    store: web::Data<dyn Store>,
    _claims: Claims, // Requires authentication
    item: web::Json<NewDevice>,
) -> Result<HttpResponse, ControlError> {
    let new_device = item.into_inner();
    validate_new_device(&new_device)?;

    let device = store.add_device(new_device)?;
    log::info!("Registered device {} ({})", device.id, device.alias);
    Ok(HttpResponse::Created().json(device))
}

/// Partial update; setting `is_default` moves the default flag.
#[put("/{device_id}")]
pub async fn update_device(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    path: web::Path<i32>,
    item: web::Json<DeviceChanges>,
) -> Result<HttpResponse, ControlError> {
    let device_id = path.into_inner();
    let device = store.update_device(device_id, item.into_inner())?;

    // Observed state may describe the old host or port, so force a pass.
    if let Err(e) = reconciler.reconcile_device(device.id, true).await {
        log::warn!(
            "Post-update reconcile failed for device {}: {}",
            device.id,
            e
        );
    }

    Ok(HttpResponse::Ok().json(device))
}

/// Delete a device, promoting a new default if needed.
#[delete("/{device_id}")]
pub async fn delete_device(
    store: web::Data<dyn Store>,
    reconciler: web::Data<Reconciler>,
    _claims: Claims, // Requires authentication
    path: web::Path<i32>,
) -> Result<HttpResponse, ControlError> {
    let device_id = path.into_inner();
    if !store.delete_device(device_id)? {
        return Err(ControlError::NotFound(format!(
            "device {} not found",
            device_id
        )));
    }

    reconciler.forget(device_id);
    log::info!("Deleted device {}", device_id);
    Ok(HttpResponse::Ok().json(serde_json::json!({"deleted": true})))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(alias: &str, host: &str, port_index: i32) -> NewDevice {
        NewDevice {
            alias: alias.to_string(),
            host: host.to_string(),
            username: "admin".to_string(),
            password: "pw".to_string(),
            port_index,
            is_default: false,
        }
    }

    #[test]
    fn test_validate_new_device_accepts_plain_device() {
        assert!(validate_new_device(&device("laptop", "192.168.1.20", 4)).is_ok());
    }

    #[test]
    fn test_validate_new_device_rejects_blank_alias() {
        let err = validate_new_device(&device("  ", "192.168.1.20", 4)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_validate_new_device_rejects_blank_host() {
        let err = validate_new_device(&device("laptop", "", 4)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_validate_new_device_rejects_negative_port() {
        let err = validate_new_device(&device("laptop", "192.168.1.20", -1)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}

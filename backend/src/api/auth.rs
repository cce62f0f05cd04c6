use crate::{error::ControlError, services::auth, services::store::Store};
use actix_web::{HttpResponse, post, web};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub password: String,
}

/// Single-admin login: the only account is the operator, whose password
/// hash lives in the settings table.
#[post("/login")]
pub async fn login(
    store: web::Data<dyn Store>,
    item: web::Json<LoginRequest>,
) -> Result<HttpResponse, ControlError> {
    if !auth::verify_admin(store.get_ref(), &item.password)? {
        return Ok(HttpResponse::Unauthorized().body("Invalid credentials"));
    }

    match auth::create_admin_jwt() {
        Ok(token) => Ok(HttpResponse::Ok().json(serde_json::json!({"token": token}))),
        Err(_) => Ok(HttpResponse::InternalServerError().body("Error creating token")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_request_deserialization() {
        let json = r#"{"password": "testpass"}"#;
        let request: LoginRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.password, "testpass");
    }

    #[test]
    fn test_login_request_with_special_characters() {
        let json = r#"{"password": "p@ss!w0rd#123"}"#;
        let request: LoginRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.password, "p@ss!w0rd#123");
    }

    #[test]
    fn test_login_request_missing_field_fails() {
        let json = r#"{}"#;
        let result: Result<LoginRequest, _> = serde_json::from_str(json);

        assert!(result.is_err());
    }
}

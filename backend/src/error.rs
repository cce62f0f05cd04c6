use actix_web::{HttpResponse, ResponseError, http::StatusCode};

/// Error kinds for access-control operations
#[derive(Debug, Clone)]
pub enum ControlError {
    /// Bad caller input (non-positive duration, malformed time, bad weekday)
    Validation(String),
    /// Unknown device/schedule id, or no default device configured
    NotFound(String),
    /// Punishment mode requested for a device with no enabled schedules
    NoSchedules,
    /// Driver could not open an authenticated session on the device
    DeviceAuth(String),
    /// Driver session established but the port command failed
    DeviceCommand(String),
    /// Database-layer failure; fatal to the single operation only
    Store(String),
}

impl ControlError {
    /// Stable machine-readable discriminant for API clients
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Validation(_) => "validation",
            ControlError::NotFound(_) => "not_found",
            ControlError::NoSchedules => "no_schedules",
            ControlError::DeviceAuth(_) => "device_auth",
            ControlError::DeviceCommand(_) => "device_command",
            ControlError::Store(_) => "store",
        }
    }
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::Validation(msg) => write!(f, "{}", msg),
            ControlError::NotFound(msg) => write!(f, "{}", msg),
            ControlError::NoSchedules => {
                write!(f, "device has no schedules to bound punishment mode")
            }
            ControlError::DeviceAuth(msg) => write!(f, "device authentication failed: {}", msg),
            ControlError::DeviceCommand(msg) => write!(f, "device command failed: {}", msg),
            ControlError::Store(msg) => write!(f, "store error: {}", msg),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<diesel::result::Error> for ControlError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ControlError::Validation(format!("already exists: {}", info.message()))
            }
            Error::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                ControlError::NotFound(format!("missing parent row: {}", info.message()))
            }
            other => ControlError::Store(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for ControlError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        ControlError::Store(format!("connection pool error: {}", err))
    }
}

impl ResponseError for ControlError {
    fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Validation(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::NoSchedules => StatusCode::CONFLICT,
            ControlError::DeviceAuth(_) | ControlError::DeviceCommand(_) => StatusCode::BAD_GATEWAY,
            ControlError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }))
    }
}

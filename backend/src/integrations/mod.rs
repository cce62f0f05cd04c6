use crate::models::Device;
use async_trait::async_trait;

pub mod websmart;

// Re-export the production driver
pub use websmart::WebSmartClient;

#[cfg(test)]
pub mod mock;

/// Authenticated session against a switch management interface
#[derive(Debug, Clone)]
pub struct SwitchSession {
    pub token: String,
}

/// Error types for switch driver operations
#[derive(Debug, Clone)]
pub enum DriverError {
    AuthenticationFailed(String),
    InvalidCredentials,
    CommandRejected(String),
    ConnectionFailed(String),
    Timeout,
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::AuthenticationFailed(msg) => write!(f, "Authentication failed: {}", msg),
            DriverError::InvalidCredentials => write!(f, "Invalid credentials"),
            DriverError::CommandRejected(msg) => write!(f, "Command rejected: {}", msg),
            DriverError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            DriverError::Timeout => write!(f, "Request timeout"),
        }
    }
}

impl std::error::Error for DriverError {}

/// Transport abstraction over the managed switch. The reconciliation
/// loop only ever talks to hardware through this trait.
#[async_trait]
pub trait SwitchDriver: Send + Sync {
    /// Short identifier for logs (e.g. "websmart")
    fn driver_name(&self) -> &'static str;

    /// Open an authenticated session on the switch carrying the device's port
    async fn authenticate(&self, device: &Device) -> Result<SwitchSession, DriverError>;

    /// Enable or disable the device's port
    async fn set_port_state(
        &self,
        session: &SwitchSession,
        device: &Device,
        enabled: bool,
    ) -> Result<(), DriverError>;
}

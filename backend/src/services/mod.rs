pub mod auth;
pub mod clock;
pub mod overrides;
pub mod reconciler;
pub mod resolver;
pub mod store;

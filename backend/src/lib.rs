//! Killswitch Backend Library
//!
//! This library provides the core functionality for the killswitch
//! access-control service, including:
//! - Device registry for the switch ports under management
//! - Weekly schedules, temporary access grants, and punishment mode
//! - Desired-state resolution and the switch reconciliation loop
//! - Single-admin authentication

pub mod api;
pub mod db;
pub mod error;
pub mod integrations;
pub mod models;
pub mod schema;
pub mod services;

//! # presenze
//!
//! Backend for employee leave and attendance: vacation and permission
//! requests, business trips, sick leave and daily attendance, all checked
//! against each other before they are written.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server and routing
//! - **SQLx**: asynchronous SQLite access
//! - **Tokio**: runtime, broadcast channel for live events, background tasks
//! - **Serde**: JSON request and response bodies
//!
//! ## Core Components
//!
//! - [`leave`]: the domain. Work calendars, the conflict validator, the
//!   balance reconciler and the transactional [`leave::LeaveService`]
//! - [`config`]: layered configuration
//! - [`db`]: schema initialization
//! - [`error`]: HTTP error envelope and input validation
//! - [`metrics`]: workflow counters
//! - [`middleware`]: auth, rate limiting, security headers, request checks
//! - [`notify`]: leave events and the broadcast notifier behind `/events`
//! - [`routes`]: HTTP handlers and the router
//! - [`state`]: shared application state
//! - [`types`]: employees and request/response DTOs

pub mod config;
pub mod db;
pub mod error;
pub mod leave;
pub mod metrics;
pub mod middleware;
pub mod notify;
pub mod routes;
pub mod state;
pub mod types;

#[cfg(test)]
mod tests;

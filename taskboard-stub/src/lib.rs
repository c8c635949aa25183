//! In-memory backend speaking the taskboard REST and WebSocket protocol.
//!
//! Serves `/api/projects/{project}/...` REST routes and the
//! `/ws/projects/{project}/tasks/` and `/ws/chat/{project}/` channels. Data
//! lives only in memory; the integration tests drive real clients against it.

pub mod api;
pub mod config;
pub mod hub;
pub mod server;
pub mod store;

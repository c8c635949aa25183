//! Shared protocol definitions for the `taskboard` wire format.

pub mod activity;
pub mod chat;
pub mod event;
pub mod frame;
pub mod task;

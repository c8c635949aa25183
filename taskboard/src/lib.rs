//! `taskboard`: real-time Kanban board client library.

pub mod activity;
pub mod board;
pub mod chat;
pub mod command;
pub mod config;
pub mod connection;
pub mod members;
pub mod session;
pub mod store;

#[cfg(test)]
mod test_support;

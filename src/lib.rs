// MeetPing - event digests, reminders and feedback prompts over a chat bot

// Domain types and pure logic
pub mod models;
pub mod ranking;
pub mod commands;
pub mod conversation;
pub mod updates;

// Services
pub mod digest;
pub mod scheduler;
pub mod handler;

// Storage, messaging and logging
pub mod infrastructure;

// HTTP surface and wiring
pub mod web;
pub mod app_state;

// Common utilities
pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};

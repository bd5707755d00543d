//! # Todo Reminder Bot
//!
//! A Telegram bot that keeps a personal to-do list per user, with deadlines
//! and one-shot reminders.
//!
//! ## Features
//! - Add, complete and clear tasks from chat or inline buttons
//! - Natural time phrases for deadlines and reminders ("tomorrow at 15:30", "in 2 hours")
//! - Reminders that survive restarts and fire once
//! - Persistent storage with SQLite

/// Bot command handlers, dialogue and message processing
pub mod bot;
/// Configuration management and environment variables
pub mod config;
/// Database models, connections, and migrations
pub mod database;
/// Error taxonomy shared by the task store and the scheduler
pub mod error;
/// Task store, reminder scheduler and health endpoints
pub mod services;
/// Utility functions for datetime, validation, and formatting
pub mod utils;

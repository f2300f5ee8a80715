//! Resilient client and CLI plumbing for the Zhipu (bigmodel) REST API.

pub mod commands;
pub mod config;
pub mod error;
pub mod record;
pub mod relay;
pub mod zhipu;

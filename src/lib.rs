//! Portal engine — conversational session orchestration.

pub mod analytics;
pub mod config;
pub mod error;
pub mod intelligence;
pub mod orchestrator;
pub mod pdf;
pub mod portal;
pub mod session;
pub mod speech;

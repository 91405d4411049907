//! College Intake: conversational intake agent for US college applicants.

pub mod config;
pub mod driver;
pub mod error;
pub mod intake;
pub mod llm;
pub mod store;

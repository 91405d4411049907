//! Conversational intake for US college applicants.
//!
//! Each turn the model sees the current profile and the applicant's last
//! answer, returns a partial profile patch plus one question, and the agent
//! deep-merges the patch:
//!
//! ```text
//! profile + answer ──▶ prompts ──▶ LlmProvider ──▶ NextTurn::parse
//!                                                      │
//!        TurnOutcome ◀── finish guard ◀── apply_patch ◀┘
//! ```

pub mod agent;
pub mod merge;
pub mod profile;
pub mod progress;
pub mod prompts;
pub mod schema;

pub use agent::{IntakeAgent, TurnOutcome};
pub use merge::{Map, PatchOp, deep_merge};
pub use profile::{ActScores, Answer, ClassRank, Group, IntakeOutcome, Profile, ProfileMeta, SatScores};
pub use progress::Progress;
pub use schema::{Action, Directive, NextTurn, ProfilePatch, Question};

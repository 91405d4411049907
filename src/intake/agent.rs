//! One intake turn: prompt, model call, parse, merge.
//!
//! The agent holds no session state. The caller passes the current profile and
//! the applicant's last answer in, and gets the updated profile and the next
//! directive back. Persisting the profile is the caller's job.

use std::sync::Arc;

use chrono::Utc;

use super::profile::{IntakeOutcome, Profile};
use super::progress::Progress;
use super::prompts::{forced_next_message, turn_messages};
use super::schema::{self, Action, Directive, NextTurn};
use crate::config::{CompletionMode, IntakeConfig};
use crate::error::IntakeError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Result of one intake turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Profile after merging this turn's patch.
    pub profile: Profile,
    pub directive: Directive,
    /// Optional note the model wants shown before the question.
    pub note: Option<String>,
    /// Patch keys that could not be represented in the profile.
    pub skipped_keys: Vec<String>,
}

/// Runs intake turns against an LLM provider.
pub struct IntakeAgent {
    llm: Arc<dyn LlmProvider>,
    config: IntakeConfig,
}

impl IntakeAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, config: IntakeConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    /// Run one turn.
    ///
    /// `last_user_answer` is `None` on the opening turn; a blank answer is
    /// treated the same way. `last_question_id` is the field path the previous
    /// question targeted and is recorded in `_meta.asked_paths` once answered.
    ///
    /// Provider failures and unparseable output fail the turn as-is.
    pub async fn next_turn(
        &self,
        profile: &Profile,
        last_user_answer: Option<&str>,
        last_question_id: Option<&str>,
    ) -> Result<TurnOutcome, IntakeError> {
        let answer = last_user_answer.map(str::trim).filter(|a| !a.is_empty());
        let mode = self.config.completion_mode;

        let progress = Progress::compute(profile, mode)?;
        let profile_json = serde_json::to_string(profile)?;
        let messages = turn_messages(&profile_json, &progress, last_question_id, answer);

        let mut turn = self.request_turn(messages.clone()).await?;

        let mut updated = profile.clone();
        let mut skipped_keys = updated.apply_patch(&turn.profile_patch.to_map())?;

        if let (Some(question_id), Some(_)) = (last_question_id, answer) {
            updated.meta.mark_asked(question_id);
        }

        if turn.action == Action::Finish && self.config.finish_guard && mode == CompletionMode::Deep {
            let remaining = Progress::compute(&updated, mode)?;
            if let Some(path) = remaining.next_deep_path() {
                tracing::warn!(
                    next_path = path,
                    remaining = remaining.unfilled_deep_paths.len(),
                    "Model tried to finish early; asking once more"
                );
                let forced = with_forced_path(messages, path);
                turn = self.request_turn(forced).await?;
                skipped_keys.extend(updated.apply_patch(&turn.profile_patch.to_map())?);
            }
        }

        let directive = turn.directive();
        match directive {
            Directive::Finish => stamp_outcome(&mut updated, IntakeOutcome::Finished),
            Directive::NotUs => stamp_outcome(&mut updated, IntakeOutcome::NotUs),
            Directive::Ask(_) => {}
        }

        tracing::info!(action = %turn.action, skipped = skipped_keys.len(), "Intake turn complete");

        Ok(TurnOutcome {
            profile: updated,
            directive,
            note: turn
                .note_to_user
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            skipped_keys,
        })
    }

    async fn request_turn(&self, messages: Vec<ChatMessage>) -> Result<NextTurn, IntakeError> {
        let request = CompletionRequest::new(messages)
            .with_max_tokens(self.config.max_output_tokens)
            .with_response_format(schema::response_format());

        let response = self.llm.complete(request).await?;
        tracing::debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Received next-turn output"
        );
        NextTurn::parse(&response.content)
    }
}

/// Insert the forced-path instruction just before the user message.
fn with_forced_path(mut messages: Vec<ChatMessage>, path: &str) -> Vec<ChatMessage> {
    let at = messages.len().saturating_sub(1);
    messages.insert(at, forced_next_message(path));
    messages
}

fn stamp_outcome(profile: &mut Profile, outcome: IntakeOutcome) {
    profile.meta.outcome = Some(outcome);
    profile.meta.completed_at = Some(Utc::now());
}

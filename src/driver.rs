//! Demo driver: runs one intake session over a line-oriented terminal.
//!
//! Generic over the reader and writer so the binary can hand it stdin/stdout
//! and tests can hand it byte buffers.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::IntakeError;
use crate::intake::{Directive, IntakeAgent, Profile, Question};
use crate::store::ProfileStore;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Finished,
    NotUs,
    /// The applicant typed `exit`/`quit`, or input ran out.
    Cancelled,
}

/// Run the interview for `client_id` until it finishes or is cancelled.
///
/// The profile is saved after every turn, so a cancelled session resumes
/// where it left off.
pub async fn run_session<R, W>(
    agent: &IntakeAgent,
    store: &dyn ProfileStore,
    client_id: &str,
    input: R,
    output: &mut W,
) -> Result<SessionEnd, IntakeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut profile = store.get(client_id).await?;
    let mut answer: Option<String> = None;
    let mut question_id: Option<String> = None;

    tracing::info!(
        client_id,
        mode = %agent.config().completion_mode,
        already_asked = profile.meta.asked_paths.len(),
        "Starting intake session"
    );
    output
        .write_all(format!("Starting intake for client_id={client_id}\n").as_bytes())
        .await?;

    loop {
        let outcome = agent
            .next_turn(&profile, answer.as_deref(), question_id.as_deref())
            .await?;
        store.save(client_id, &outcome.profile).await?;
        profile = outcome.profile;

        if let Some(note) = &outcome.note {
            output.write_all(format!("[Note] {note}\n").as_bytes()).await?;
        }

        match outcome.directive {
            Directive::Finish => {
                output
                    .write_all(format!("\nIntake finished. Final profile:\n{}\n", render(&profile)?).as_bytes())
                    .await?;
                output.flush().await?;
                tracing::info!(client_id, "Intake finished");
                return Ok(SessionEnd::Finished);
            }
            Directive::NotUs => {
                output
                    .write_all(b"\nYou indicated you are not applying to US colleges. Ending intake.\n")
                    .await?;
                output.flush().await?;
                tracing::info!(client_id, "Intake ended: not applying to US colleges");
                return Ok(SessionEnd::NotUs);
            }
            Directive::Ask(question) => {
                output.write_all(render_question(&question).as_bytes()).await?;
                question_id = question.id;
            }
        }

        match read_answer(&mut lines, output).await? {
            Some(line) => answer = Some(line),
            None => {
                tracing::info!(client_id, "Intake cancelled");
                return Ok(SessionEnd::Cancelled);
            }
        }
    }
}

/// Prompt until a non-blank line arrives. `None` on `exit`, `quit`, or EOF.
async fn read_answer<R, W>(
    lines: &mut tokio::io::Lines<R>,
    output: &mut W,
) -> Result<Option<String>, IntakeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Ok(None);
        }
        return Ok(Some(line.to_string()));
    }
}

fn render_question(question: &Question) -> String {
    let mut text = format!("\n{}\n", question.text);
    if !question.options.is_empty() {
        text.push_str(&format!("Options: {}\n", question.options.join(", ")));
    }
    text
}

fn render(profile: &Profile) -> Result<String, IntakeError> {
    Ok(serde_json::to_string_pretty(&serde_json::Value::Object(profile.to_map()?))?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{CompletionMode, IntakeConfig};
    use crate::intake::{Answer, IntakeOutcome};
    use crate::llm::scripted::ScriptedLlm;
    use crate::store::InMemoryProfileStore;

    const ASK_US_ONLY: &str = r#"{"profile_patch": {}, "action": "CONTINUE",
        "next_question": "Are you applying only to US colleges?", "question_id": "us_only",
        "options": ["Yes", "No"]}"#;

    fn core_agent(llm: Arc<ScriptedLlm>) -> IntakeAgent {
        IntakeAgent::new(
            llm,
            IntakeConfig {
                completion_mode: CompletionMode::Core,
                ..IntakeConfig::default()
            },
        )
    }

    async fn run(agent: &IntakeAgent, store: &InMemoryProfileStore, input: &str) -> (SessionEnd, String) {
        let mut output = Vec::new();
        let end = run_session(agent, store, "s1", input.as_bytes(), &mut output)
            .await
            .unwrap();
        (end, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn not_us_ends_without_another_question() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            ASK_US_ONLY,
            r#"{"profile_patch": {"us_only": false}, "action": "END_NOT_US",
                "next_question": "Which country instead?"}"#,
        ]));
        let store = InMemoryProfileStore::new();
        let (end, output) = run(&core_agent(llm.clone()), &store, "No, Canada\nmore\n").await;

        assert_eq!(end, SessionEnd::NotUs);
        assert!(output.contains("Options: Yes, No"));
        assert!(output.contains("not applying to US colleges"));
        assert!(!output.contains("Which country instead?"));
        assert_eq!(llm.call_count(), 2);

        let stored = store.get("s1").await.unwrap();
        assert_eq!(stored.us_only, Some(Answer::Flag(false)));
        assert_eq!(stored.meta.outcome, Some(IntakeOutcome::NotUs));
    }

    #[tokio::test]
    async fn finish_prints_final_profile() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            ASK_US_ONLY,
            r#"{"profile_patch": {"us_only": true}, "action": "FINISH", "next_question": null,
                "note_to_user": "Thanks!"}"#,
        ]));
        let store = InMemoryProfileStore::new();
        let (end, output) = run(&core_agent(llm.clone()), &store, "\n   \nyes\n").await;

        assert_eq!(end, SessionEnd::Finished);
        assert!(output.contains("[Note] Thanks!"));
        assert!(output.contains("Intake finished. Final profile:"));
        assert!(output.contains("\"us_only\": true"));
        assert_eq!(
            llm.requests()[1].messages.last().unwrap().content,
            "User answered: yes"
        );
    }

    #[tokio::test]
    async fn quit_cancels_and_keeps_progress() {
        let llm = Arc::new(ScriptedLlm::replying(&[
            ASK_US_ONLY,
            r#"{"profile_patch": {"us_only": true}, "action": "CONTINUE",
                "next_question": "Which state do you live in?", "question_id": "state_of_residence"}"#,
        ]));
        let store = InMemoryProfileStore::new();
        let (end, output) = run(&core_agent(llm.clone()), &store, "yes\nQUIT\n").await;

        assert_eq!(end, SessionEnd::Cancelled);
        assert!(output.contains("Which state do you live in?"));
        assert_eq!(llm.call_count(), 2);

        let stored = store.get("s1").await.unwrap();
        assert_eq!(stored.us_only, Some(Answer::Flag(true)));
        assert!(stored.meta.was_asked("us_only"));
        assert!(stored.meta.outcome.is_none());
    }

    #[tokio::test]
    async fn end_of_input_cancels() {
        let llm = Arc::new(ScriptedLlm::replying(&[ASK_US_ONLY]));
        let store = InMemoryProfileStore::new();
        let (end, _) = run(&core_agent(llm.clone()), &store, "").await;

        assert_eq!(end, SessionEnd::Cancelled);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn turn_errors_end_the_session() {
        let llm = Arc::new(ScriptedLlm::replying(&["{}"]));
        let store = InMemoryProfileStore::new();
        let mut output = Vec::new();
        let err = run_session(&core_agent(llm), &store, "s1", "yes\n".as_bytes(), &mut output)
            .await
            .unwrap_err();

        assert!(matches!(err, IntakeError::InvalidResponse { .. }));
    }

    #[test]
    fn question_without_options_has_no_options_line() {
        let text = render_question(&Question {
            id: None,
            text: "What do you want to study?".to_string(),
            options: vec![],
        });
        assert_eq!(text, "\nWhat do you want to study?\n");
    }
}

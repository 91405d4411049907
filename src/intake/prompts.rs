//! System instructions and per-turn messages for the intake interview.

use serde_json::json;

use super::progress::Progress;
use crate::llm::ChatMessage;

/// Standing instructions sent with every intake turn.
pub const SYSTEM_INSTRUCTIONS: &str = "\
You are a US-college intake interviewer for US-based students ONLY.

Hard rules:
- Ask EXACTLY ONE question per turn (single sentence preferred).
- If the user is NOT applying to US colleges only -> action=END_NOT_US and next_question=null.
- Accept \"Not sure\", \"Skip\", \"Prefer not to say\" for any question.
- Use ranges for money; never ask exact household income.
- Return ONLY JSON matching the provided schema.

Output format rules:
- `profile_patch` is a PARTIAL profile object holding only the fields the user
  just answered, e.g. {\"state_of_residence\": \"CA\"} or {\"sat\": {\"math\": 720}}.
- Use the exact field names from the current profile JSON. Never output the
  entire profile. If this is the first turn, profile_patch MUST be {}.
- `next_question` is required when action=CONTINUE and must be null otherwise.
- `question_id` is the field path you are trying to fill next
  (e.g. \"state_of_residence\" or \"sat.math\").
- `options` may list short suggested answers; use [] when free text fits better.

State and slot-filling rules:
- You are given the current profile JSON on every turn.
- Treat any field that is not null/empty as ALREADY ANSWERED.
- NEVER re-ask about a field that is already answered in the profile, unless
  you are clarifying the immediately previous answer about that same field.
- If you are given `last_question_id`, update that field from the user's answer
  (or ask one clarifying question about it) rather than starting over.
- Choose the earliest unfilled priority slot as the topic of your next question.
- After all priority slots are filled, move on to the remaining unfilled fields
  in a logical order (academics, testing, preferences, dealbreakers, activities).
- Do NOT loop on eligibility or residency questions once they have been answered.

Completion rules:
- You will be given `unfilled_deep_paths` and `completion_mode`.
- If `completion_mode` is \"deep\", do NOT return action=FINISH until
  `unfilled_deep_paths` is empty.
- Otherwise return action=FINISH once enough fields are populated to build a
  college list.
- If you are unsure what to ask next, ask about the FIRST element of
  `unfilled_deep_paths`.

Interview strategy (priority order):
1) Confirm US-only eligibility.
2) Residency status + state of residence (for tuition/aid).
3) Applicant type (first-year/transfer).
4) Intended major or interest area.
5) Budget range (all-in) + loan tolerance.
6) Location preferences (region/distance/setting).
7) Academics snapshot (GPA/rigor), then testing, then vibe.
8) Dealbreakers, then extracurricular depth if needed.";

/// User message for the opening turn, when there is no answer yet.
pub const START_MESSAGE: &str = "Start the intake interview. Ask the first question.";

/// Build the conversation for one turn.
///
/// Order: instructions, current profile, progress and finish policy, then the
/// user's last answer (or the start message).
pub fn turn_messages(
    profile_json: &str,
    progress: &Progress,
    last_question_id: Option<&str>,
    last_user_answer: Option<&str>,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_INSTRUCTIONS),
        ChatMessage::developer(format!("Current profile JSON:\n{profile_json}")),
        ChatMessage::developer(progress_context(progress, last_question_id)),
        user_message(last_user_answer),
    ]
}

/// Extra instruction inserted before the user message when the model tried to
/// finish with deep paths remaining.
pub fn forced_next_message(path: &str) -> ChatMessage {
    ChatMessage::developer(format!(
        "DO NOT FINISH. Ask about this exact field path next: {path}. Set question_id to that path."
    ))
}

fn progress_context(progress: &Progress, last_question_id: Option<&str>) -> String {
    let finish_policy = if progress.allow_finish() {
        "FINISH is allowed."
    } else {
        "Do NOT FINISH yet; ask the next unfilled_deep_paths item."
    };
    json!({
        "filled_priority_slots": progress.filled_priority_slots,
        "unfilled_priority_slots": progress.unfilled_priority_slots,
        "completion_mode": progress.completion_mode,
        "unfilled_deep_paths": progress.unfilled_deep_paths,
        "last_question_id": last_question_id,
        "instruction": "Ask the earliest unfilled_priority_slot next. \
                        Do NOT re-ask filled fields unless clarifying the immediately previous answer.",
        "finish_policy": finish_policy,
    })
    .to_string()
}

fn user_message(last_user_answer: Option<&str>) -> ChatMessage {
    match last_user_answer {
        Some(answer) => ChatMessage::user(format!("User answered: {answer}")),
        None => ChatMessage::user(START_MESSAGE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompletionMode;
    use crate::intake::profile::Profile;
    use crate::llm::Role;

    fn fresh_progress(mode: CompletionMode) -> Progress {
        Progress::compute(&Profile::new(), mode).unwrap()
    }

    #[test]
    fn instructions_carry_hard_rules() {
        assert!(SYSTEM_INSTRUCTIONS.contains("EXACTLY ONE question"));
        assert!(SYSTEM_INSTRUCTIONS.contains("END_NOT_US"));
        assert!(SYSTEM_INSTRUCTIONS.contains("NEVER re-ask"));
        assert!(SYSTEM_INSTRUCTIONS.contains("action=FINISH"));
    }

    #[test]
    fn first_turn_uses_start_message() {
        let messages = turn_messages("{}", &fresh_progress(CompletionMode::Deep), None, None);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "Current profile JSON:\n{}");
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, START_MESSAGE);
    }

    #[test]
    fn answer_and_question_id_are_embedded() {
        let messages = turn_messages(
            r#"{"us_only": true}"#,
            &fresh_progress(CompletionMode::Deep),
            Some("state_of_residence"),
            Some("California"),
        );
        assert!(messages[1].content.contains(r#""us_only": true"#));
        assert!(messages[2].content.contains(r#""last_question_id":"state_of_residence""#));
        assert_eq!(messages[3].content, "User answered: California");
    }

    #[test]
    fn finish_policy_follows_progress() {
        let deep = turn_messages("{}", &fresh_progress(CompletionMode::Deep), None, None);
        assert!(deep[2].content.contains("Do NOT FINISH yet"));

        let core = turn_messages("{}", &fresh_progress(CompletionMode::Core), None, None);
        assert!(core[2].content.contains("FINISH is allowed."));
        assert!(core[2].content.contains(r#""completion_mode":"core""#));
    }

    #[test]
    fn forced_message_names_the_path() {
        let message = forced_next_message("sat.math");
        assert_eq!(message.role, Role::Developer);
        assert!(message.content.contains("sat.math"));
        assert!(message.content.starts_with("DO NOT FINISH"));
    }
}

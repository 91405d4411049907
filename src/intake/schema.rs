//! The next-turn object the model returns each turn, and its JSON schema.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};

use super::merge::{Map, PatchOp, ops_to_patch};
use super::profile::Profile;
use crate::error::IntakeError;
use crate::llm::ResponseFormat;

/// Schema name reported to the provider.
pub const NEXT_TURN_SCHEMA_NAME: &str = "college_intake_next_turn";

/// How much raw model output is quoted back in a parse error.
const RAW_SNIPPET_CHARS: usize = 1200;

/// Continuation signal returned each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Continue,
    Finish,
    EndNotUs,
}

impl Action {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::EndNotUs)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Continue => "CONTINUE",
            Self::Finish => "FINISH",
            Self::EndNotUs => "END_NOT_US",
        };
        write!(f, "{s}")
    }
}

/// The profile update for one turn.
///
/// Either a partial profile mapping, or `{path, value}` set-operations which
/// are converted to the equivalent mapping before merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfilePatch {
    Fields(Map),
    Ops(Vec<PatchOp>),
}

impl Default for ProfilePatch {
    fn default() -> Self {
        Self::Fields(Map::new())
    }
}

impl ProfilePatch {
    /// The patch as a nested mapping, ready for `deep_merge`.
    pub fn to_map(&self) -> Map {
        match self {
            Self::Fields(map) => map.clone(),
            Self::Ops(ops) => ops_to_patch(ops),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Fields(map) => map.is_empty(),
            Self::Ops(ops) => ops.is_empty(),
        }
    }
}

/// Structured model output for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NextTurn {
    #[serde(default, deserialize_with = "null_as_default")]
    pub profile_patch: ProfilePatch,
    pub action: Action,
    #[serde(default)]
    pub next_question: Option<String>,
    /// Field path the question targets, e.g. `sat.math`.
    #[serde(default)]
    pub question_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    #[serde(default)]
    pub note_to_user: Option<String>,
}

impl NextTurn {
    /// Parse and validate raw model output.
    ///
    /// Prose or code fences around the JSON object are tolerated. Anything
    /// that does not deserialize, or a CONTINUE without a question, is an
    /// [`IntakeError::InvalidResponse`].
    pub fn parse(raw: &str) -> Result<Self, IntakeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty model output (expected JSON)", raw));
        }

        let turn = parse_lenient(trimmed)
            .map_err(|e| invalid(&format!("failed to parse model JSON: {e}"), raw))?;

        if turn.action == Action::Continue && turn.question_text().is_none() {
            return Err(invalid("action CONTINUE requires a non-empty next_question", raw));
        }
        Ok(turn)
    }

    fn question_text(&self) -> Option<&str> {
        self.next_question
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// What the driver should do next. Terminal actions ignore any question text.
    pub fn directive(&self) -> Directive {
        match self.action {
            Action::Finish => Directive::Finish,
            Action::EndNotUs => Directive::NotUs,
            Action::Continue => Directive::Ask(Question {
                id: self
                    .question_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from),
                text: self.question_text().unwrap_or_default().to_string(),
                options: self.options.clone(),
            }),
        }
    }
}

/// A question to put to the applicant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: Option<String>,
    pub text: String,
    pub options: Vec<String>,
}

/// Next-turn directive handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Ask another question.
    Ask(Question),
    /// Enough has been gathered.
    Finish,
    /// The applicant is not applying to US colleges.
    NotUs,
}

impl Directive {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ask(_))
    }
}

fn invalid(reason: &str, raw: &str) -> IntakeError {
    IntakeError::InvalidResponse {
        reason: reason.to_string(),
        raw: raw
            .chars()
            .take(RAW_SNIPPET_CHARS)
            .collect::<String>()
            .replace('\n', "\\n"),
    }
}

/// Parse the text as-is, then fall back to the JSON object embedded in it.
///
/// The error reported is the one from the last attempt.
fn parse_lenient(text: &str) -> Result<NextTurn, serde_json::Error> {
    let mut last_err = match serde_json::from_str(text) {
        Ok(turn) => return Ok(turn),
        Err(e) => e,
    };
    for candidate in embedded_json_candidates(text) {
        match serde_json::from_str(candidate) {
            Ok(turn) => return Ok(turn),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

/// Slices of model text that may hold the JSON object: a ```json fence body,
/// then everything from the first `{` to the last `}`.
fn embedded_json_candidates(text: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            candidates.push(after[..end].trim());
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}'))
        && end > start
    {
        candidates.push(&text[start..=end]);
    }

    candidates
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// JSON schema for [`NextTurn`].
///
/// `profile_patch` is described from the template itself: known top-level
/// fields (nested groups with their sub-keys) are listed as optional
/// properties so the model patches only what changed.
pub fn next_turn_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "profile_patch": profile_patch_schema(),
            "action": {
                "type": "string",
                "enum": ["CONTINUE", "FINISH", "END_NOT_US"]
            },
            "next_question": {"type": ["string", "null"]},
            "question_id": {"type": ["string", "null"]},
            "options": {"type": "array", "items": {"type": "string"}},
            "note_to_user": {"type": ["string", "null"]}
        },
        "required": ["profile_patch", "action", "next_question"]
    })
}

fn profile_patch_schema() -> Value {
    let mut properties = Map::new();
    if let Ok(template) = Profile::new().to_map() {
        for (key, default) in template.into_iter().filter(|(k, _)| k != "_meta") {
            let field = match default {
                Value::Object(nested) => {
                    let sub: Map = nested.keys().map(|k| (k.clone(), json!({}))).collect();
                    json!({"type": ["object", "string", "number", "boolean", "null"], "properties": sub})
                }
                Value::Array(_) => json!({"type": ["array", "string", "null"]}),
                _ => json!({"type": ["string", "number", "boolean", "null"]}),
            };
            properties.insert(key, field);
        }
    }
    json!({
        "type": "object",
        "description": "Only the fields the user just answered. Never the whole profile.",
        "properties": properties
    })
}

/// Structured-output request for one intake turn.
///
/// Not strict: a free-form partial object cannot be expressed in strict mode.
/// Responses are validated by [`NextTurn::parse`] instead.
pub fn response_format() -> ResponseFormat {
    ResponseFormat {
        name: NEXT_TURN_SCHEMA_NAME.to_string(),
        schema: next_turn_schema(),
        strict: false,
    }
}

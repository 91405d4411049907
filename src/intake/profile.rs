//! Applicant profile: the typed template every intake fills in.
//!
//! Each template field is a named struct field so shape drift shows up at
//! compile time. Leaves are `Option<Answer>` (`None` = unanswered, written as
//! `null`), lists default to empty, and nested groups are sub-structs. Keys the
//! model invents land in [`Profile::extra`] and are carried along untouched.

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::merge::{Map, deep_merge};

/// Every top-level key a serialized profile carries, in template order.
pub const TEMPLATE_FIELDS: &[&str] = &[
    "_meta",
    "us_only",
    "residency_status",
    "state_of_residence",
    "applicant_type",
    "entry_term",
    "hs_grad_year",
    "college_gpa",
    "gpa_unweighted",
    "gpa_weighted",
    "class_rank",
    "highest_math",
    "highest_science",
    "rigor_tags",
    "sat",
    "act",
    "test_strategy",
    "intended_major_primary",
    "intended_major_alternates",
    "major_certainty",
    "career_goal",
    "grad_school_plan",
    "regions_open_to",
    "distance_preference",
    "setting_preference",
    "campus_size_pref",
    "vibe_pref",
    "budget_range_all_in",
    "loan_tolerance",
    "in_state_importance",
    "fafsa_intent",
    "css_profile_willing",
    "hard_dealbreakers",
    "soft_preferences",
    "top_activities",
    "want_reach_match_safety",
    "list_size_target",
];

/// A single answered value.
///
/// "Not sure", "Skip" and friends are stored as text and count as answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Flag(bool),
    Number(serde_json::Number),
    Text(String),
}

impl From<bool> for Answer {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Answer {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u32> for Answer {
    fn from(value: u32) -> Self {
        Self::Number(value.into())
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// How an intake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeOutcome {
    Finished,
    NotUs,
}

/// Bookkeeping stored alongside the answers under `_meta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileMeta {
    /// Field paths already asked, so "Skip" answers are not asked again.
    #[serde(deserialize_with = "one_or_many")]
    pub asked_paths: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: Option<IntakeOutcome>,
}

impl ProfileMeta {
    /// Record a path as asked. Returns false if it was already recorded.
    pub fn mark_asked(&mut self, path: &str) -> bool {
        let path = path.trim();
        if path.is_empty() || self.asked_paths.iter().any(|p| p == path) {
            return false;
        }
        self.asked_paths.push(path.to_string());
        true
    }

    pub fn was_asked(&self, path: &str) -> bool {
        self.asked_paths.iter().any(|p| p == path)
    }
}

/// A nested template group, or a plain answer given for the whole group.
///
/// "Not taking it" for `sat` is a valid answer and is kept as text rather
/// than forced into the sub-fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Group<T> {
    Fields(T),
    Answer(Answer),
}

impl<T: Default> Default for Group<T> {
    fn default() -> Self {
        Self::Fields(T::default())
    }
}

impl<T> Group<T> {
    /// The sub-fields, unless the group was answered as a whole.
    pub fn fields(&self) -> Option<&T> {
        match self {
            Self::Fields(fields) => Some(fields),
            Self::Answer(_) => None,
        }
    }

    pub fn answer(&self) -> Option<&Answer> {
        match self {
            Self::Answer(answer) => Some(answer),
            Self::Fields(_) => None,
        }
    }
}

impl<T> From<Answer> for Group<T> {
    fn from(answer: Answer) -> Self {
        Self::Answer(answer)
    }
}

impl<'de, T> Deserialize<'de> for Group<T>
where
    T: DeserializeOwned + Default,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => serde_json::from_value(Value::Object(map))
                .map(Self::Fields)
                .map_err(D::Error::custom),
            other => serde_json::from_value(other)
                .map(Self::Answer)
                .map_err(D::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassRank {
    pub has_rank: Option<Answer>,
    pub rank: Option<Answer>,
    pub class_size: Option<Answer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatScores {
    pub status: Option<Answer>,
    pub best_total: Option<Answer>,
    pub ebrw: Option<Answer>,
    pub math: Option<Answer>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActScores {
    pub status: Option<Answer>,
    pub best_composite: Option<Answer>,
}

/// Structured applicant data accumulated across turns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "_meta", default, deserialize_with = "null_as_default")]
    pub meta: ProfileMeta,

    // Gatekeeping
    #[serde(default)]
    pub us_only: Option<Answer>,
    #[serde(default)]
    pub residency_status: Option<Answer>,
    #[serde(default)]
    pub state_of_residence: Option<Answer>,

    // Applicant type
    #[serde(default)]
    pub applicant_type: Option<Answer>,
    #[serde(default)]
    pub entry_term: Option<Answer>,
    #[serde(default)]
    pub hs_grad_year: Option<Answer>,
    #[serde(default)]
    pub college_gpa: Option<Answer>,

    // Academics
    #[serde(default)]
    pub gpa_unweighted: Option<Answer>,
    #[serde(default)]
    pub gpa_weighted: Option<Answer>,
    #[serde(default)]
    pub class_rank: Group<ClassRank>,
    #[serde(default)]
    pub highest_math: Option<Answer>,
    #[serde(default)]
    pub highest_science: Option<Answer>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub rigor_tags: Vec<Answer>,

    // Testing
    #[serde(default)]
    pub sat: Group<SatScores>,
    #[serde(default)]
    pub act: Group<ActScores>,
    #[serde(default)]
    pub test_strategy: Option<Answer>,

    // Major & goals
    #[serde(default)]
    pub intended_major_primary: Option<Answer>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub intended_major_alternates: Vec<Answer>,
    #[serde(default)]
    pub major_certainty: Option<Answer>,
    #[serde(default)]
    pub career_goal: Option<Answer>,
    #[serde(default)]
    pub grad_school_plan: Option<Answer>,

    // Preferences
    #[serde(default, deserialize_with = "one_or_many")]
    pub regions_open_to: Vec<Answer>,
    #[serde(default)]
    pub distance_preference: Option<Answer>,
    #[serde(default)]
    pub setting_preference: Option<Answer>,
    #[serde(default)]
    pub campus_size_pref: Option<Answer>,
    #[serde(default)]
    pub vibe_pref: Option<Answer>,

    // Budget & aid, ranges only
    #[serde(default)]
    pub budget_range_all_in: Option<Answer>,
    #[serde(default)]
    pub loan_tolerance: Option<Answer>,
    #[serde(default)]
    pub in_state_importance: Option<Answer>,
    #[serde(default)]
    pub fafsa_intent: Option<Answer>,
    #[serde(default)]
    pub css_profile_willing: Option<Answer>,

    // Constraints & activities
    #[serde(default, deserialize_with = "one_or_many")]
    pub hard_dealbreakers: Vec<Answer>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub soft_preferences: Vec<Answer>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub top_activities: Vec<Value>,

    // Output preference
    #[serde(default)]
    pub want_reach_match_safety: Option<Answer>,
    #[serde(default)]
    pub list_size_target: Option<Answer>,

    /// Keys outside the template, kept as the model wrote them.
    #[serde(flatten)]
    pub extra: Map,
}

impl Profile {
    /// A fresh profile with every field unanswered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The profile as a JSON object (every template key present).
    pub fn to_map(&self) -> Result<Map, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "profile serialized to non-object {other}"
            ))),
        }
    }

    pub fn from_map(map: Map) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// Deep-merge `patch` into this profile.
    ///
    /// The patch wins wherever it can be represented, including a plain answer
    /// written over a nested group. When the merged document still does not
    /// fit (say a list written over `sat.math`), the patch is applied leaf by
    /// leaf and only the leaves that cannot be represented are skipped.
    /// Returns the skipped dotted paths.
    pub fn apply_patch(&mut self, patch: &Map) -> Result<Vec<String>, serde_json::Error> {
        if patch.is_empty() {
            return Ok(Vec::new());
        }

        let mut skipped = Vec::new();
        if !self.try_merge(patch)? {
            self.merge_each(&[], patch, &mut skipped)?;
        }
        Ok(skipped)
    }

    fn merge_each(
        &mut self,
        prefix: &[&str],
        patch: &Map,
        skipped: &mut Vec<String>,
    ) -> Result<(), serde_json::Error> {
        for (key, value) in patch {
            let mut path = prefix.to_vec();
            path.push(key.as_str());
            if self.try_merge(&nested(&path, value.clone()))? {
                continue;
            }
            match value {
                Value::Object(inner) if !inner.is_empty() => self.merge_each(&path, inner, skipped)?,
                _ => {
                    let path = path.join(".");
                    tracing::warn!(path = %path, "Skipping patch value that does not fit the profile template");
                    skipped.push(path);
                }
            }
        }
        Ok(())
    }

    /// Merge `patch` if the result still fits the template.
    fn try_merge(&mut self, patch: &Map) -> Result<bool, serde_json::Error> {
        let mut doc = self.to_map()?;
        deep_merge(&mut doc, patch);
        match Self::from_map(doc) {
            Ok(merged) => {
                *self = merged;
                Ok(true)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Merged profile does not fit the template");
                Ok(false)
            }
        }
    }

    /// Keys that are not part of the template.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.extra.keys().map(String::as_str)
    }
}

/// `{"a": {"b": value}}` for the path `["a", "b"]`.
fn nested(path: &[&str], value: Value) -> Map {
    let mut map = Map::new();
    if let Some((leaf, parents)) = path.split_last() {
        map.insert(leaf.to_string(), value);
        for key in parents.iter().rev() {
            let mut outer = Map::new();
            outer.insert(key.to_string(), Value::Object(map));
            map = outer;
        }
    }
    map
}

/// Treat an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept `null`, a single item, or a list of items.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

//! Which fields are filled, and whether the interview may finish.

use serde::Serialize;
use serde_json::Value;

use super::merge::get_by_path;
use super::profile::Profile;
use crate::config::CompletionMode;

/// Fields the interview fills first, in order.
pub const PRIORITY_SLOTS: &[&str] = &[
    "us_only",
    "residency_status",
    "state_of_residence",
    "applicant_type",
    "intended_major_primary",
    "budget_range_all_in",
    "regions_open_to",
    "distance_preference",
];

/// Full-depth interview order. Paths double as question ids.
pub const DEEP_PATHS_ORDER: &[&str] = &[
    // Gatekeeping + type
    "us_only",
    "residency_status",
    "state_of_residence",
    "applicant_type",
    "entry_term",
    "hs_grad_year",
    "college_gpa",
    // Major & goals
    "intended_major_primary",
    "intended_major_alternates",
    "major_certainty",
    "career_goal",
    "grad_school_plan",
    // Budget & aid
    "budget_range_all_in",
    "loan_tolerance",
    "in_state_importance",
    "fafsa_intent",
    "css_profile_willing",
    // Preferences
    "regions_open_to",
    "distance_preference",
    "setting_preference",
    "campus_size_pref",
    "vibe_pref",
    // Academics
    "gpa_unweighted",
    "gpa_weighted",
    "class_rank",
    "highest_math",
    "highest_science",
    "rigor_tags",
    // Testing
    "test_strategy",
    "sat.status",
    "sat.best_total",
    "sat.ebrw",
    "sat.math",
    "act.status",
    "act.best_composite",
    // Constraints & activities
    "hard_dealbreakers",
    "soft_preferences",
    "top_activities",
    // Output preference
    "want_reach_match_safety",
    "list_size_target",
];

/// Whether a JSON value counts as an answer.
///
/// Blank strings, empty lists, and objects with no answered member do not.
/// Any other non-null value does, including "Not sure".
pub fn is_answered(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => map.values().any(is_answered),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Whether `path` holds an answer. A parent group answered as a whole
/// ("Not taking it" for `sat`) covers every path beneath it.
fn path_answered(doc: &Value, path: &str) -> bool {
    let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
    (1..=parts.len()).any(|n| match get_by_path(doc, &parts[..n].join(".")) {
        Some(value) if n == parts.len() => is_answered(value),
        Some(value) => !value.is_object() && is_answered(value),
        None => false,
    })
}

/// Snapshot of interview progress, embedded in each prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub filled_priority_slots: Vec<String>,
    pub unfilled_priority_slots: Vec<String>,
    pub completion_mode: String,
    /// Deep paths neither answered nor already asked. Empty in core mode.
    pub unfilled_deep_paths: Vec<String>,
}

impl Progress {
    pub fn compute(profile: &Profile, mode: CompletionMode) -> Result<Self, serde_json::Error> {
        let doc = Value::Object(profile.to_map()?);
        let answered = |path: &str| path_answered(&doc, path);

        let (filled, unfilled): (Vec<&str>, Vec<&str>) =
            PRIORITY_SLOTS.iter().copied().partition(|p| answered(*p));

        let unfilled_deep_paths = match mode {
            CompletionMode::Core => Vec::new(),
            CompletionMode::Deep => DEEP_PATHS_ORDER
                .iter()
                .copied()
                .filter(|p| !profile.meta.was_asked(p) && !answered(*p))
                .map(String::from)
                .collect(),
        };

        Ok(Self {
            filled_priority_slots: filled.into_iter().map(String::from).collect(),
            unfilled_priority_slots: unfilled.into_iter().map(String::from).collect(),
            completion_mode: mode.to_string(),
            unfilled_deep_paths,
        })
    }

    /// FINISH is only allowed once no deep path remains.
    pub fn allow_finish(&self) -> bool {
        self.unfilled_deep_paths.is_empty()
    }

    pub fn next_deep_path(&self) -> Option<&str> {
        self.unfilled_deep_paths.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::intake::profile::{Answer, Group, SatScores, TEMPLATE_FIELDS};

    #[test]
    fn answered_rules() {
        assert!(!is_answered(&json!(null)));
        assert!(!is_answered(&json!("  ")));
        assert!(!is_answered(&json!([])));
        assert!(!is_answered(&json!({"status": null, "math": null})));
        assert!(is_answered(&json!("Not sure")));
        assert!(is_answered(&json!(false)));
        assert!(is_answered(&json!(0)));
        assert!(is_answered(&json!({"status": null, "math": 700})));
    }

    #[test]
    fn deep_paths_exist_in_template() {
        let template = Value::Object(Profile::new().to_map().unwrap());
        for path in DEEP_PATHS_ORDER.iter().chain(PRIORITY_SLOTS) {
            let top = path.split('.').next().unwrap();
            assert!(TEMPLATE_FIELDS.contains(&top), "{path} not in template");
            assert!(get_by_path(&template, path).is_some(), "{path} not reachable");
        }
    }

    #[test]
    fn fresh_profile_has_everything_unfilled() {
        let progress = Progress::compute(&Profile::new(), CompletionMode::Deep).unwrap();
        assert!(progress.filled_priority_slots.is_empty());
        assert_eq!(progress.unfilled_priority_slots.len(), PRIORITY_SLOTS.len());
        assert_eq!(progress.unfilled_deep_paths.len(), DEEP_PATHS_ORDER.len());
        assert_eq!(progress.next_deep_path(), Some("us_only"));
        assert!(!progress.allow_finish());
    }

    #[test]
    fn answered_and_asked_paths_drop_out() {
        let mut profile = Profile::new();
        profile.us_only = Some(Answer::Flag(true));
        profile.sat = Group::Fields(SatScores {
            math: Some(Answer::from(700u32)),
            ..SatScores::default()
        });
        profile.meta.mark_asked("residency_status");

        let progress = Progress::compute(&profile, CompletionMode::Deep).unwrap();
        assert_eq!(progress.filled_priority_slots, vec!["us_only".to_string()]);
        assert!(
            progress
                .unfilled_priority_slots
                .contains(&"residency_status".to_string()),
            "asked-but-unanswered priority slots stay unfilled"
        );
        assert!(!progress.unfilled_deep_paths.contains(&"us_only".to_string()));
        assert!(!progress.unfilled_deep_paths.contains(&"residency_status".to_string()));
        assert!(!progress.unfilled_deep_paths.contains(&"sat.math".to_string()));
        assert!(progress.unfilled_deep_paths.contains(&"sat.ebrw".to_string()));
        assert_eq!(progress.next_deep_path(), Some("state_of_residence"));
    }

    #[test]
    fn group_answered_as_a_whole_covers_its_paths() {
        let mut profile = Profile::new();
        profile.sat = Group::from(Answer::from("Not taking it"));

        let progress = Progress::compute(&profile, CompletionMode::Deep).unwrap();
        assert!(!progress.unfilled_deep_paths.iter().any(|p| p.starts_with("sat.")));
        assert!(progress.unfilled_deep_paths.contains(&"act.status".to_string()));
    }

    #[test]
    fn core_mode_always_allows_finish() {
        let progress = Progress::compute(&Profile::new(), CompletionMode::Core).unwrap();
        assert!(progress.unfilled_deep_paths.is_empty());
        assert!(progress.allow_finish());
        assert_eq!(progress.completion_mode, "core");
    }
}

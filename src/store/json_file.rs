//! Profile store backed by a single JSON file.
//!
//! The file holds one object keyed by client id. Every access reads the whole
//! file, and every write replaces it through a temp file and a rename so a
//! crash never leaves a half-written document behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use super::traits::ProfileStore;
use crate::error::StoreError;
use crate::intake::{Map, Profile};

#[derive(Debug, Clone)]
pub struct JsonFileProfileStore {
    path: PathBuf,
}

impl JsonFileProfileStore {
    /// Open a store at `path`, creating its parent directory if needed.
    /// The file itself is created on first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(records)) => Ok(records),
            Ok(other) => Err(self.corrupt(format!("expected a JSON object, found {}", kind(&other)))),
            Err(e) => Err(self.corrupt(e.to_string())),
        }
    }

    async fn write_all(&self, records: Map) -> Result<(), StoreError> {
        // serde_json keeps object keys sorted, nested profiles included.
        let body = serde_json::to_string_pretty(&Value::Object(records))?;

        let tmp = self.tmp_path();
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn corrupt(&self, reason: String) -> StoreError {
        StoreError::Corrupt {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

#[async_trait]
impl ProfileStore for JsonFileProfileStore {
    async fn get(&self, client_id: &str) -> Result<Profile, StoreError> {
        let mut records = self.load().await?;
        match records.get(client_id) {
            Some(Value::Object(record)) => Profile::from_map(record.clone())
                .map_err(|e| self.corrupt(format!("record {client_id:?}: {e}"))),
            Some(other) => Err(self.corrupt(format!(
                "record {client_id:?} is {}, expected an object",
                kind(other)
            ))),
            None => {
                let profile = Profile::new();
                records.insert(client_id.to_string(), Value::Object(profile.to_map()?));
                self.write_all(records).await?;
                tracing::debug!(client_id, path = %self.path.display(), "Recorded new intake profile");
                Ok(profile)
            }
        }
    }

    async fn save(&self, client_id: &str, profile: &Profile) -> Result<(), StoreError> {
        let mut records = self.load().await?;
        records.insert(client_id.to_string(), Value::Object(profile.to_map()?));
        self.write_all(records).await
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::intake::{Answer, Group, IntakeOutcome, SatScores};

    async fn test_store() -> (JsonFileProfileStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = JsonFileProfileStore::open(dir.path().join("profiles.json"))
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn open_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("nested").join("profiles.json");
        let store = JsonFileProfileStore::open(&path).await.unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn unknown_id_returns_fresh_profile_and_records_it() {
        let (store, _dir) = test_store().await;
        let profile = store.get("demo-user").await.unwrap();
        assert_eq!(profile, Profile::new());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert!(doc["demo-user"].is_object());
        assert!(doc["demo-user"]["sat"].is_object());
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let (store, _dir) = test_store().await;
        let mut profile = Profile::new();
        profile.intended_major_primary = Some(Answer::from("Computer Science"));
        profile.sat = Group::Fields(SatScores {
            best_total: Some(Answer::from(1450u32)),
            ..SatScores::default()
        });
        profile.class_rank = Group::from(Answer::from("Skip"));
        profile.meta.mark_asked("sat.best_total");
        profile.meta.outcome = Some(IntakeOutcome::Finished);
        profile.meta.completed_at = Some(chrono::Utc::now());
        profile
            .extra
            .insert("pets".to_string(), Value::String("dog".to_string()));

        store.save("s1", &profile).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), profile);

        let reopened = JsonFileProfileStore::open(store.path()).await.unwrap();
        assert_eq!(reopened.get("s1").await.unwrap(), profile);
    }

    #[tokio::test]
    async fn save_keeps_other_clients() {
        let (store, _dir) = test_store().await;
        let mut a = Profile::new();
        a.state_of_residence = Some(Answer::from("CA"));
        let mut b = Profile::new();
        b.state_of_residence = Some(Answer::from("NY"));

        store.save("a", &a).await.unwrap();
        store.save("b", &b).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), a);
        assert_eq!(store.get("b").await.unwrap(), b);
    }

    #[tokio::test]
    async fn file_is_pretty_with_sorted_keys() {
        let (store, _dir) = test_store().await;
        store.save("zeta", &Profile::new()).await.unwrap();
        store.save("alpha", &Profile::new()).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains('\n'));
        assert!(raw.find("\"alpha\"").unwrap() < raw.find("\"zeta\"").unwrap());
        assert!(raw.find("\"_meta\"").unwrap() < raw.find("\"act\"").unwrap());
        assert!(!store.tmp_path().exists());
    }

    #[tokio::test]
    async fn update_merges_into_stored_profile() {
        let (store, _dir) = test_store().await;
        let mut profile = Profile::new();
        profile.us_only = Some(Answer::Flag(true));
        store.save("s1", &profile).await.unwrap();

        let patch = serde_json::json!({"act": {"best_composite": 33}});
        let updated = store.update("s1", patch.as_object().unwrap()).await.unwrap();

        assert_eq!(updated.us_only, Some(Answer::Flag(true)));
        assert_eq!(updated.act.fields().unwrap().best_composite, Some(Answer::from(33u32)));
        assert_eq!(store.get("s1").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn whole_group_answer_survives_the_file() {
        let (store, _dir) = test_store().await;
        let patch = serde_json::json!({"sat": "Not taking it", "class_rank": "Skip"});
        let updated = store.update("s1", patch.as_object().unwrap()).await.unwrap();
        assert_eq!(updated.sat.answer(), Some(&Answer::from("Not taking it")));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["s1"]["sat"], "Not taking it");
        assert_eq!(doc["s1"]["class_rank"], "Skip");

        let reopened = JsonFileProfileStore::open(store.path()).await.unwrap();
        assert_eq!(reopened.get("s1").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let (store, _dir) = test_store().await;
        std::fs::write(store.path(), "{not json").unwrap();
        let err = store.get("s1").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));

        std::fs::write(store.path(), "[1, 2]").unwrap();
        let err = store.get("s1").await.unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn empty_file_reads_as_no_records() {
        let (store, _dir) = test_store().await;
        std::fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Profile::new());
    }
}

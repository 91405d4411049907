//! In-process profile store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::traits::ProfileStore;
use crate::error::StoreError;
use crate::intake::Profile;

/// Profiles held in a map for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<String, Profile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, client_id: &str) -> Result<Profile, StoreError> {
        if let Some(profile) = self.profiles.read().await.get(client_id) {
            return Ok(profile.clone());
        }
        let mut profiles = self.profiles.write().await;
        Ok(profiles.entry(client_id.to_string()).or_default().clone())
    }

    async fn save(&self, client_id: &str, profile: &Profile) -> Result<(), StoreError> {
        self.profiles
            .write()
            .await
            .insert(client_id.to_string(), profile.clone());
        Ok(())
    }
}

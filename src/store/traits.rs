//! `ProfileStore` trait: the async persistence seam for intake profiles.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::intake::{Map, Profile};

/// Latest profile per client. No turn history is kept.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Stored profile for `client_id`, or a fresh one.
    ///
    /// An unknown id is not an error: the fresh profile is recorded and returned.
    async fn get(&self, client_id: &str) -> Result<Profile, StoreError>;

    /// Overwrite the whole record for `client_id`.
    async fn save(&self, client_id: &str, profile: &Profile) -> Result<(), StoreError>;

    /// Merge `patch` into the stored profile and save the result.
    async fn update(&self, client_id: &str, patch: &Map) -> Result<Profile, StoreError> {
        let mut profile = self.get(client_id).await?;
        profile.apply_patch(patch)?;
        self.save(client_id, &profile).await?;
        Ok(profile)
    }
}

//! `ProfileStore` trait — the record store seam used by the gate and the
//! leaf screens.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::identity::IdentityId;
use crate::onboarding::model::{NewProfile, ProfilePatch, ProfileRecord};

/// One profile row per identity. Access control is the store's concern.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Read the profile. A missing row is `Ok(None)`, not an error.
    async fn get_profile(&self, identity_id: &IdentityId) -> Result<Option<ProfileRecord>, DatabaseError>;

    /// Create the profile at the first step unless one exists, then return
    /// the stored row. Safe under concurrent calls for the same identity.
    async fn create_profile_if_absent(
        &self,
        identity_id: &IdentityId,
        defaults: &NewProfile,
    ) -> Result<ProfileRecord, DatabaseError>;

    /// Write only the fields set in `patch`. Fails with `NotFound` when no
    /// row exists.
    async fn update_profile(&self, identity_id: &IdentityId, patch: &ProfilePatch) -> Result<(), DatabaseError>;
}

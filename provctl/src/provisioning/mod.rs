//! The provisioning sequence: create an auth identity, then fill in its profile row.
//!
//! The two external calls are strictly ordered because the profile update is keyed by the id
//! the identity service generates. Neither step is retried and the identity is never rolled back:
//! when the profile update fails, the caller receives a profile-step error carrying the orphaned
//! identity id instead.

use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::api::models::users::{ProfileStatus, ProvisionPayload, ProvisionRequest};
use crate::backend::{IdentityError, IdentityService, NewIdentity, ProfileStore, ProfileStoreError, ProfileUpdate};
use crate::errors::{Error, Result};

pub mod classify;

pub use classify::ClassifierConfig;
use classify::{classify_identity_error, classify_profile_error};

/// A user whose identity and profile were both written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    pub user_id: String,
}

pub struct UserProvisioner {
    identity: Arc<dyn IdentityService>,
    profiles: Arc<dyn ProfileStore>,
    classifier: ClassifierConfig,
}

impl UserProvisioner {
    pub fn new(identity: Arc<dyn IdentityService>, profiles: Arc<dyn ProfileStore>, classifier: ClassifierConfig) -> Self {
        Self {
            identity,
            profiles,
            classifier,
        }
    }

    /// Validate `payload` and provision the user it describes.
    ///
    /// Validation failures return before either external service is contacted.
    pub async fn provision(&self, payload: ProvisionPayload) -> Result<ProvisionedUser> {
        let request = payload.validate()?;
        self.create_user(&request).await
    }

    #[instrument(skip_all, fields(email = %request.email, username = %request.username, role = %request.role))]
    async fn create_user(&self, request: &ProvisionRequest) -> Result<ProvisionedUser> {
        info!("Attempting to create user in auth");
        let new_identity = NewIdentity {
            email: request.email.clone(),
            password: request.password.clone(),
            email_confirm: false,
        };

        let identity = match self.identity.create_identity(&new_identity).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                error!("User creation did not return a user object");
                return Err(Error::InternalInconsistency);
            }
            Err(IdentityError::Api(err)) => {
                error!(status = ?err.status, code = ?err.code, raw = %err.raw, "Identity service rejected user creation");
                return Err(classify_identity_error(&err, &self.classifier));
            }
            Err(IdentityError::Transport(err)) => {
                return Err(Error::Internal(err.context("creating auth identity")));
            }
        };

        let user_id = identity.id;
        info!("User {} created in auth, updating profile", user_id);

        let update = ProfileUpdate {
            full_name: request.full_name.clone(),
            username: request.username.clone(),
            role: request.role,
            status: ProfileStatus::Approved,
        };

        match self.profiles.update_profile(&user_id, &update).await {
            Ok(()) => {
                info!("Profile for user {} updated successfully", user_id);
                Ok(ProvisionedUser { user_id })
            }
            Err(ProfileStoreError::Api(err)) => {
                error!(
                    code = ?err.code,
                    details = ?err.details,
                    hint = ?err.hint,
                    raw = %err.raw,
                    "Profile update failed for user {}",
                    user_id
                );
                Err(classify_profile_error(&err, &user_id, &self.classifier))
            }
            Err(ProfileStoreError::Transport(err)) => {
                error!("Profile update for user {} could not be completed: {:#}", user_id, err);
                Err(Error::ProfileTransport { user_id, error: err })
            }
        }
    }
}

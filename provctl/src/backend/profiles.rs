//! Profile row updates through PostgREST.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, instrument};
use url::Url;

use super::{PostgrestError, ProfileStore, ProfileStoreError, ProfileUpdate, build_client, ensure_slash};
use crate::config::Credentials;

/// Ask PostgREST for single-object semantics: zero (or several) matched rows is an error
/// rather than a silent no-op.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct SupabaseProfileStore {
    client: Client,
    base_url: Url,
    service_role_key: String,
    table: String,
}

impl SupabaseProfileStore {
    pub fn new(credentials: &Credentials, table: &str) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(credentials.request_timeout)?,
            base_url: credentials.url.clone(),
            service_role_key: credentials.service_role_key.clone(),
            table: table.to_string(),
        })
    }

    fn row_url(&self, id: &str) -> anyhow::Result<Url> {
        let mut url = ensure_slash(&self.base_url)
            .join("rest/v1/")
            .and_then(|rest| rest.join(&self.table))
            .context("Failed to construct profile table URL")?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{id}"));
        Ok(url)
    }
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    #[instrument(skip(self, update))]
    async fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<(), ProfileStoreError> {
        let url = self.row_url(id)?;
        debug!("Updating profile row via {}", url);

        let response = self
            .client
            .patch(url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(update)
            .send()
            .await
            .context("Failed to send profile update request")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.context("Failed to read profile update error response")?;
        Err(PostgrestError::from_response(status.as_u16(), &body).into())
    }
}

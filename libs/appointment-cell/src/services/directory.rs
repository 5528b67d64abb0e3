use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::error;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, DirectoryEntry};

/// Read-only lookup of users and providers.
#[async_trait]
pub trait ProviderDirectory: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<DirectoryEntry>, AppointmentError>;

    /// Unknown ids are left out of the result.
    async fn find_many(&self, ids: &[i64]) -> Result<Vec<DirectoryEntry>, AppointmentError>;
}

#[derive(Debug, Deserialize)]
struct UserRow {
    id: i64,
    name: String,
    email: String,
    #[serde(default)]
    provider: bool,
    avatar_url: Option<String>,
}

impl From<UserRow> for DirectoryEntry {
    fn from(row: UserRow) -> Self {
        DirectoryEntry {
            id: row.id,
            display_name: row.name,
            email: row.email,
            is_provider: row.provider,
            avatar_url: row.avatar_url,
        }
    }
}

/// Reads the `users` table through PostgREST.
pub struct SupabaseProviderDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseProviderDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select(&self, filter: &str) -> Result<Vec<DirectoryEntry>, AppointmentError> {
        let path = format!("/rest/v1/users?{}&select=id,name,email,provider,avatar_url", filter);

        let rows: Vec<UserRow> = self.supabase.request(Method::GET, &path, None).await.map_err(|e| {
            error!("User directory lookup failed: {}", e);
            AppointmentError::DirectoryError(e.to_string())
        })?;

        Ok(rows.into_iter().map(DirectoryEntry::from).collect())
    }
}

#[async_trait]
impl ProviderDirectory for SupabaseProviderDirectory {
    async fn find(&self, id: i64) -> Result<Option<DirectoryEntry>, AppointmentError> {
        Ok(self.select(&format!("id=eq.{}", id)).await?.into_iter().next())
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<DirectoryEntry>, AppointmentError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        self.select(&format!("id=in.({})", list)).await
    }
}

#[derive(Default)]
pub struct InMemoryProviderDirectory {
    entries: RwLock<HashMap<i64, DirectoryEntry>>,
}

impl InMemoryProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = DirectoryEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().map(|e| (e.id, e)).collect()),
        }
    }
}

#[async_trait]
impl ProviderDirectory for InMemoryProviderDirectory {
    async fn find(&self, id: i64) -> Result<Option<DirectoryEntry>, AppointmentError> {
        Ok(self.entries.read().await.get(&id).cloned())
    }

    async fn find_many(&self, ids: &[i64]) -> Result<Vec<DirectoryEntry>, AppointmentError> {
        let entries = self.entries.read().await;
        Ok(ids.iter().filter_map(|id| entries.get(id).cloned()).collect())
    }
}

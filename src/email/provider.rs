use async_trait::async_trait;

use crate::email::model::{Email, EmailId, EmailPatch, FolderView, NewEmail};
use crate::error::Result;
use crate::folder::Folder;

/// Maximum number of records a remote provider returns for one listing.
pub const PAGE_SIZE: usize = 50;

/// Filter handed to `EmailProvider::list`.
///
/// Providers may push it down to their backend; the repository re-applies it
/// locally either way, so a provider that ignores it is still correct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub view: Option<FolderView>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn view(view: FolderView) -> Self {
        Self {
            view: Some(view),
            search: None,
        }
    }

    pub fn search(term: &str) -> Self {
        Self {
            view: None,
            search: Some(term.to_string()),
        }
    }
}

/// Data-access contract every backend (in-memory, record API, mail API) implements.
/// Implementations translate their own record shape to and from [`Email`].
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn list(&self, query: &ListQuery) -> Result<Vec<Email>>;

    /// Fails with `MailError::NotFound` when the id is unknown.
    async fn get(&self, id: EmailId) -> Result<Email>;

    async fn create(&self, email: NewEmail) -> Result<Email>;

    async fn update(&self, id: EmailId, patch: &EmailPatch) -> Result<Email>;

    /// Permanent removal.
    async fn remove(&self, id: EmailId) -> Result<()>;

    /// Folders defined by the backend. Empty means "system folders only".
    async fn list_folders(&self) -> Result<Vec<Folder>> {
        Ok(Vec::new())
    }

    /// Check connectivity / health
    async fn health_check(&self) -> Result<()>;
}

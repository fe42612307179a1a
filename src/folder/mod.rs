use serde::{Deserialize, Serialize};

use crate::email::model::{Email, FolderView, Mailbox};
use crate::email::repository::EmailRepository;
use crate::error::{MailError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FolderKind {
    System,
    Custom,
}

/// A named view over the email collection. `count` is derived on every read
/// and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: FolderKind,
    pub slug: String,
    #[serde(default)]
    pub count: usize,
}

impl Folder {
    pub fn custom(id: i64, name: &str, slug: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            icon: "Folder".to_string(),
            kind: FolderKind::Custom,
            slug: slug.to_string(),
            count: 0,
        }
    }

    fn system(id: i64, name: &str, icon: &str, slug: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            icon: icon.to_string(),
            kind: FolderKind::System,
            slug: slug.to_string(),
            count: 0,
        }
    }

    fn with_count(mut self, emails: &[Email]) -> Self {
        self.count = count_for(&self.slug, emails);
        self
    }
}

/// The folders that exist no matter what the backend reports.
pub fn system_folders() -> Vec<Folder> {
    vec![
        Folder::system(1, "Inbox", "Inbox", "inbox"),
        Folder::system(2, "Sent", "Send", "sent"),
        Folder::system(3, "Drafts", "FileText", "drafts"),
        Folder::system(4, "Starred", "Star", "starred"),
        Folder::system(5, "Trash", "Trash2", "trash"),
    ]
}

/// Badge count for `slug`: unread mail for inbox, starred mail outside trash
/// for starred, total mail for everything else.
pub fn count_for(slug: &str, emails: &[Email]) -> usize {
    match FolderView::from_slug(slug) {
        FolderView::Mailbox(Mailbox::Inbox) => emails
            .iter()
            .filter(|e| e.folder == Mailbox::Inbox && !e.is_read)
            .count(),
        view => emails.iter().filter(|e| view.matches(e)).count(),
    }
}

/// Backend folders plus any system folder the backend did not report.
/// System folders come first in their fixed order, then custom folders by id.
fn merge_with_system(backend: Vec<Folder>) -> Vec<Folder> {
    let (mut system, mut custom): (Vec<Folder>, Vec<Folder>) = (Vec::new(), Vec::new());
    for fallback in system_folders() {
        match backend.iter().find(|f| f.slug == fallback.slug) {
            Some(found) => system.push(found.clone()),
            None => system.push(fallback),
        }
    }
    for folder in backend {
        if !system.iter().any(|f| f.slug == folder.slug)
            && !custom.iter().any(|f: &Folder| f.slug == folder.slug)
        {
            custom.push(folder);
        }
    }
    custom.sort_by_key(|f| f.id);
    system.extend(custom);
    system
}

/// Folder listing with counts derived from the repository's current data.
#[derive(Clone)]
pub struct FolderService {
    repo: EmailRepository,
}

impl FolderService {
    pub fn new(repo: EmailRepository) -> Self {
        Self { repo }
    }

    /// Every folder with a fresh count. Falls back to the system folders with
    /// zero counts if the backend cannot be reached.
    pub async fn list_all(&self) -> Vec<Folder> {
        let backend = match self.repo.provider().list_folders().await {
            Ok(folders) => {
                if folders.is_empty() {
                    tracing::debug!("No folders from backend, using system folders");
                }
                folders
            }
            Err(e) => {
                tracing::error!("Error fetching folders: {}", e);
                return system_folders();
            }
        };

        let emails = self.repo.list_all().await;
        merge_with_system(backend)
            .into_iter()
            .map(|f| f.with_count(&emails))
            .collect()
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Folder> {
        let slug = slug.trim().to_lowercase();
        let folder = self
            .lookup(|f| f.slug == slug)
            .await
            .ok_or_else(|| MailError::folder_not_found(&slug))?;
        Ok(self.counted(folder).await)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Folder> {
        let folder = self
            .lookup(|f| f.id == id)
            .await
            .ok_or_else(|| MailError::folder_not_found(id))?;
        Ok(self.counted(folder).await)
    }

    async fn lookup<P>(&self, predicate: P) -> Option<Folder>
    where
        P: Fn(&Folder) -> bool,
    {
        let backend = self
            .repo
            .provider()
            .list_folders()
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Folder lookup falling back to system folders: {}", e);
                Vec::new()
            });

        merge_with_system(backend).into_iter().find(|f| predicate(f))
    }

    async fn counted(&self, folder: Folder) -> Folder {
        let emails = self.repo.list_all().await;
        folder.with_count(&emails)
    }
}

pub mod api;
pub mod config;
pub mod email;
pub mod error;
pub mod folder;

#[cfg(test)]
mod testing;

use email::repository::EmailRepository;
use folder::FolderService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub repo: EmailRepository,
    pub folders: FolderService,
}

impl AppState {
    pub fn new(repo: EmailRepository) -> Self {
        Self {
            folders: FolderService::new(repo.clone()),
            repo,
        }
    }
}

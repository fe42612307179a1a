use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::sync::RwLock;

use super::model::{Email, EmailId, EmailPatch, NewEmail};
use super::provider::{EmailProvider, ListQuery};
use crate::error::{MailError, Result};

const SEED_EMAILS: &str = include_str!("../../data/seed_emails.json");

struct MemoryState {
    emails: Vec<Email>,
    /// Only ever grows, so an id is never handed out twice.
    next_id: EmailId,
}

/// Process-local provider backed by a vector, used when no remote backend is
/// configured. Every read returns clones; callers never see the stored records.
pub struct MemoryProvider {
    state: RwLock<MemoryState>,
    latency: Duration,
}

impl MemoryProvider {
    pub fn new(emails: Vec<Email>) -> Result<Self> {
        let mut seen = HashSet::new();
        for email in &emails {
            if !seen.insert(email.id) {
                return Err(MailError::Validation(format!(
                    "duplicate email id {} in seed data",
                    email.id
                )));
            }
        }
        let next_id = emails.iter().map(|e| e.id).max().unwrap_or(0) + 1;

        Ok(Self {
            state: RwLock::new(MemoryState { emails, next_id }),
            latency: Duration::ZERO,
        })
    }

    /// The built-in demo mailbox.
    pub fn seeded() -> Result<Self> {
        Self::from_json(SEED_EMAILS)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let emails: Vec<Email> = serde_json::from_str(json)?;
        Self::new(emails)
    }

    pub async fn from_seed_file(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            MailError::BackendUnavailable(format!(
                "cannot read seed file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    /// Simulated round-trip delay applied before every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl EmailProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Email>> {
        self.delay().await;
        let state = self.state.read().await;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());

        Ok(state
            .emails
            .iter()
            .filter(|e| query.view.as_ref().map_or(true, |v| v.matches(e)))
            .filter(|e| needle.as_deref().map_or(true, |n| e.matches_query(n)))
            .cloned()
            .collect())
    }

    async fn get(&self, id: EmailId) -> Result<Email> {
        self.delay().await;
        let state = self.state.read().await;
        state
            .emails
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| MailError::email_not_found(id))
    }

    async fn create(&self, email: NewEmail) -> Result<Email> {
        self.delay().await;
        let mut state = self.state.write().await;
        let id = state.next_id;
        state.next_id += 1;

        let email = email.into_email(id);
        state.emails.push(email.clone());
        Ok(email)
    }

    async fn update(&self, id: EmailId, patch: &EmailPatch) -> Result<Email> {
        self.delay().await;
        let mut state = self.state.write().await;
        let email = state
            .emails
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| MailError::email_not_found(id))?;

        patch.apply(email);
        Ok(email.clone())
    }

    async fn remove(&self, id: EmailId) -> Result<()> {
        self.delay().await;
        let mut state = self.state.write().await;
        let index = state
            .emails
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| MailError::email_not_found(id))?;

        state.emails.remove(index);
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

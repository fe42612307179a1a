use chrono::Utc;
use std::sync::Arc;

use crate::email::hub::ChangeHub;
use crate::email::model::{
    sort_newest_first, Compose, DeleteOutcome, DraftRequest, Email, EmailId, EmailPatch,
    FolderView, Identity, Mailbox, NewEmail,
};
use crate::email::provider::{EmailProvider, ListQuery};
use crate::error::{MailError, Result};

/// Mediates between UI-facing callers and whichever provider is configured.
///
/// Every mutation goes through `commit`, which is the only
/// place the change hub is notified.
#[derive(Clone)]
pub struct EmailRepository {
    provider: Arc<dyn EmailProvider>,
    hub: ChangeHub,
    identity: Identity,
}

impl EmailRepository {
    pub fn new(provider: Arc<dyn EmailProvider>, hub: ChangeHub, identity: Identity) -> Self {
        Self {
            provider,
            hub,
            identity,
        }
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub(crate) fn provider(&self) -> &Arc<dyn EmailProvider> {
        &self.provider
    }

    pub async fn health_check(&self) -> Result<()> {
        self.provider.health_check().await
    }

    // ========== Reads ==========

    /// All emails, newest first. Degrades to an empty list if the backend fails.
    pub async fn list_all(&self) -> Vec<Email> {
        self.read_list("list all", ListQuery::all()).await
    }

    /// Emails in `slug`, or every starred email outside trash for "starred".
    pub async fn list_by_folder(&self, slug: &str) -> Vec<Email> {
        let view = FolderView::from_slug(slug);
        self.read_list(&format!("list folder {}", view.slug()), ListQuery::view(view))
            .await
    }

    /// Case-insensitive substring search. An empty query lists everything.
    pub async fn search(&self, query: &str) -> Vec<Email> {
        let term = query.trim();
        if term.is_empty() {
            return self.list_all().await;
        }
        self.read_list(&format!("search '{}'", term), ListQuery::search(term))
            .await
    }

    pub async fn get(&self, id: EmailId) -> Result<Email> {
        self.provider.get(id).await.map_err(|e| {
            tracing::error!("Failed to fetch email {}: {}", id, e);
            e
        })
    }

    async fn read_list(&self, what: &str, query: ListQuery) -> Vec<Email> {
        match self.provider.list(&query).await {
            Ok(emails) => {
                let needle = query.search.as_ref().map(|s| s.to_lowercase());
                let mut emails: Vec<Email> = emails
                    .into_iter()
                    .filter(|e| query.view.as_ref().map_or(true, |v| v.matches(e)))
                    .filter(|e| needle.as_deref().map_or(true, |n| e.matches_query(n)))
                    .collect();
                sort_newest_first(&mut emails);
                tracing::debug!("{}: {} emails", what, emails.len());
                emails
            }
            Err(e) => {
                tracing::error!("Failed to {} via {}: {}", what, self.provider.name(), e);
                Vec::new()
            }
        }
    }

    // ========== Mutations ==========

    /// Create an email stamped with the current user as sender.
    /// Recipients are not validated here; sending without any is a UI concern.
    pub async fn create(&self, compose: Compose) -> Result<Email> {
        let new_email = self.stamp(compose);
        let result = self.provider.create(new_email).await;
        self.commit("create", result)
    }

    pub async fn update(&self, id: EmailId, patch: EmailPatch) -> Result<Email> {
        let result = self.provider.update(id, &patch).await;
        self.commit(&format!("update email {}", id), result)
    }

    /// First call moves the email to trash; a call on an email already in
    /// trash removes it permanently.
    pub async fn delete(&self, id: EmailId) -> Result<DeleteOutcome> {
        let current = self.get(id).await?;

        let result = if current.folder == Mailbox::Trash {
            self.provider
                .remove(id)
                .await
                .map(|()| DeleteOutcome::Removed {
                    id,
                    message: "Email permanently deleted".to_string(),
                })
        } else {
            self.provider
                .update(id, &EmailPatch::folder(Mailbox::Trash))
                .await
                .map(DeleteOutcome::Trashed)
        };

        self.commit(&format!("delete email {}", id), result)
    }

    pub async fn toggle_star(&self, id: EmailId) -> Result<Email> {
        let current = self.get(id).await?;
        self.update(id, EmailPatch::starred(!current.is_starred)).await
    }

    pub async fn mark_read(&self, id: EmailId) -> Result<Email> {
        self.update(id, EmailPatch::read(true)).await
    }

    pub async fn mark_unread(&self, id: EmailId) -> Result<Email> {
        self.update(id, EmailPatch::read(false)).await
    }

    pub async fn move_to(&self, id: EmailId, folder: Mailbox) -> Result<Email> {
        self.update(id, EmailPatch::folder(folder)).await
    }

    /// Save a draft, updating an existing one instead of duplicating it.
    ///
    /// The draft to update is the one named by `draft_id`, or failing that the
    /// first draft whose subject equals the request's non-empty subject.
    pub async fn save_draft(&self, draft: DraftRequest) -> Result<Email> {
        let existing = match draft.draft_id {
            Some(id) => {
                let email = self.get(id).await?;
                if !email.is_draft() {
                    return Err(MailError::Validation(format!(
                        "Email {} is not a draft",
                        id
                    )));
                }
                Some(email)
            }
            None => self.find_draft_by_subject(&draft.subject).await?,
        };

        match existing {
            Some(email) => {
                tracing::info!("Updating draft {} in place", email.id);
                let patch = EmailPatch {
                    to: Some(draft.to),
                    cc: Some(draft.cc),
                    bcc: Some(draft.bcc),
                    subject: Some(draft.subject),
                    body: Some(draft.body),
                    timestamp: Some(Utc::now()),
                    ..Default::default()
                };
                self.update(email.id, patch).await
            }
            None => {
                self.create(Compose {
                    to: draft.to,
                    cc: draft.cc,
                    bcc: draft.bcc,
                    subject: draft.subject,
                    body: draft.body,
                    folder: Some(Mailbox::Drafts),
                })
                .await
            }
        }
    }

    /// Send `compose` and discard the draft it was written from, if any.
    /// `from_draft` must name a draft; losing the draft cleanup does not
    /// fail the send.
    pub async fn send(&self, compose: Compose, from_draft: Option<EmailId>) -> Result<Email> {
        if let Some(draft_id) = from_draft {
            let source = self.get(draft_id).await?;
            if !source.is_draft() {
                return Err(MailError::Validation(format!(
                    "Email {} is not a draft",
                    draft_id
                )));
            }
        }

        let sent = self
            .create(Compose {
                folder: Some(Mailbox::Sent),
                ..compose
            })
            .await?;

        if let Some(draft_id) = from_draft {
            if let Err(e) = self.delete(draft_id).await {
                tracing::warn!(
                    "Sent email {} but failed to delete draft {}: {}",
                    sent.id,
                    draft_id,
                    e
                );
            }
        }

        Ok(sent)
    }

    async fn find_draft_by_subject(&self, subject: &str) -> Result<Option<Email>> {
        if subject.trim().is_empty() {
            return Ok(None);
        }
        let drafts = self
            .provider
            .list(&ListQuery::view(FolderView::Mailbox(Mailbox::Drafts)))
            .await?;

        Ok(drafts
            .into_iter()
            .find(|e| e.is_draft() && e.subject == subject))
    }

    fn stamp(&self, compose: Compose) -> NewEmail {
        NewEmail {
            from: self.identity.address.clone(),
            from_name: self.identity.name.clone(),
            to: compose.to,
            cc: compose.cc,
            bcc: compose.bcc,
            subject: compose.subject,
            body: compose.body,
            timestamp: Utc::now(),
            is_read: true,
            is_starred: false,
            folder: compose.folder.unwrap_or(Mailbox::Sent),
            thread_id: None,
            has_attachments: false,
        }
    }

    /// Notify listeners once the backend has confirmed `result`; failures are
    /// logged and handed back untouched.
    fn commit<T>(&self, what: &str, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                tracing::info!("{} succeeded via {}", what, self.provider.name());
                self.hub.notify();
                Ok(value)
            }
            Err(e) => {
                tracing::error!("Failed to {}: {}", what, e);
                Err(e)
            }
        }
    }
}

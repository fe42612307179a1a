use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{MailError, Result};

pub type EmailId = i64;

const STARRED_SLUG: &str = "starred";

/// Folder value stored on an email.
///
/// "starred" is deliberately absent: it is a view over the starred flag,
/// never a place an email can live.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mailbox {
    Inbox,
    Sent,
    Drafts,
    Trash,
    Custom(String),
}

impl Mailbox {
    pub fn parse(slug: &str) -> Result<Self> {
        let slug = slug.trim().to_lowercase();
        match slug.as_str() {
            "inbox" => Ok(Mailbox::Inbox),
            "sent" => Ok(Mailbox::Sent),
            "drafts" => Ok(Mailbox::Drafts),
            "trash" => Ok(Mailbox::Trash),
            STARRED_SLUG => Err(MailError::Validation(
                "starred is a view, not a folder an email can be filed in".to_string(),
            )),
            "" => Err(MailError::Validation("folder must not be empty".to_string())),
            _ => Ok(Mailbox::Custom(slug)),
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Mailbox::Inbox => "inbox",
            Mailbox::Sent => "sent",
            Mailbox::Drafts => "drafts",
            Mailbox::Trash => "trash",
            Mailbox::Custom(slug) => slug,
        }
    }
}

impl TryFrom<String> for Mailbox {
    type Error = MailError;

    fn try_from(value: String) -> Result<Self> {
        Mailbox::parse(&value)
    }
}

impl From<Mailbox> for String {
    fn from(value: Mailbox) -> Self {
        value.slug().to_string()
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// What a folder-scoped listing selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderView {
    Starred,
    Mailbox(Mailbox),
}

impl FolderView {
    /// Never fails: unknown slugs become custom folders, which simply match nothing
    /// unless some email was filed there.
    pub fn from_slug(slug: &str) -> Self {
        let normalized = slug.trim().to_lowercase();
        if normalized == STARRED_SLUG {
            return FolderView::Starred;
        }
        match Mailbox::parse(&normalized) {
            Ok(mailbox) => FolderView::Mailbox(mailbox),
            Err(_) => FolderView::Mailbox(Mailbox::Custom(normalized)),
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            FolderView::Starred => STARRED_SLUG,
            FolderView::Mailbox(mailbox) => mailbox.slug(),
        }
    }

    pub fn matches(&self, email: &Email) -> bool {
        match self {
            FolderView::Starred => email.is_starred && email.folder != Mailbox::Trash,
            FolderView::Mailbox(mailbox) => &email.folder == mailbox,
        }
    }
}

/// The canonical email record every backend adapter produces and consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: EmailId,
    pub from: String,
    pub from_name: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub is_starred: bool,
    pub folder: Mailbox,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub has_attachments: bool,
}

impl Email {
    /// Case-insensitive substring match over subject, body, sender and recipients.
    /// `needle` must already be lowercased.
    pub fn matches_query(&self, needle: &str) -> bool {
        let contains = |s: &str| s.to_lowercase().contains(needle);
        contains(&self.subject)
            || contains(&self.body)
            || contains(&self.from)
            || contains(&self.from_name)
            || self.to.iter().any(|addr| contains(addr))
    }

    pub fn is_draft(&self) -> bool {
        self.folder == Mailbox::Drafts
    }
}

/// Newest first; ties broken by the higher id so ordering is stable.
pub fn sort_newest_first(emails: &mut [Email]) {
    emails.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

/// Partial field set merged into an existing email by `update`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmailPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<Mailbox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments: Option<bool>,
}

impl EmailPatch {
    pub fn read(is_read: bool) -> Self {
        Self {
            is_read: Some(is_read),
            ..Default::default()
        }
    }

    pub fn starred(is_starred: bool) -> Self {
        Self {
            is_starred: Some(is_starred),
            ..Default::default()
        }
    }

    pub fn folder(folder: Mailbox) -> Self {
        Self {
            folder: Some(folder),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when the patch rewrites message content rather than flags or filing.
    pub fn touches_content(&self) -> bool {
        self.from.is_some()
            || self.from_name.is_some()
            || self.to.is_some()
            || self.cc.is_some()
            || self.bcc.is_some()
            || self.subject.is_some()
            || self.body.is_some()
            || self.timestamp.is_some()
            || self.thread_id.is_some()
            || self.has_attachments.is_some()
    }

    pub fn apply(&self, email: &mut Email) {
        if let Some(v) = &self.from {
            email.from = v.clone();
        }
        if let Some(v) = &self.from_name {
            email.from_name = v.clone();
        }
        if let Some(v) = &self.to {
            email.to = v.clone();
        }
        if let Some(v) = &self.cc {
            email.cc = v.clone();
        }
        if let Some(v) = &self.bcc {
            email.bcc = v.clone();
        }
        if let Some(v) = &self.subject {
            email.subject = v.clone();
        }
        if let Some(v) = &self.body {
            email.body = v.clone();
        }
        if let Some(v) = self.timestamp {
            email.timestamp = v;
        }
        if let Some(v) = self.is_read {
            email.is_read = v;
        }
        if let Some(v) = self.is_starred {
            email.is_starred = v;
        }
        if let Some(v) = &self.folder {
            email.folder = v.clone();
        }
        if let Some(v) = &self.thread_id {
            email.thread_id = v.clone();
        }
        if let Some(v) = self.has_attachments {
            email.has_attachments = v;
        }
    }
}

/// An email as handed to a backend for creation; the backend assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmail {
    pub from: String,
    pub from_name: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub is_starred: bool,
    pub folder: Mailbox,
    pub thread_id: Option<String>,
    pub has_attachments: bool,
}

impl NewEmail {
    pub fn into_email(self, id: EmailId) -> Email {
        Email {
            id,
            from: self.from,
            from_name: self.from_name,
            to: self.to,
            cc: self.cc,
            bcc: self.bcc,
            subject: self.subject,
            body: self.body,
            timestamp: self.timestamp,
            is_read: self.is_read,
            is_starred: self.is_starred,
            folder: self.folder,
            thread_id: self.thread_id.unwrap_or_else(|| format!("thread_{}", id)),
            has_attachments: self.has_attachments,
        }
    }
}

/// Input of the compose/send path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compose {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub folder: Option<Mailbox>,
}

impl Compose {
    /// A reply addressed to the sender, quoting the original message.
    pub fn reply_to(email: &Email) -> Self {
        Self {
            to: vec![email.from.clone()],
            subject: with_prefix("Re:", &email.subject),
            body: quote("Original Message", email),
            ..Default::default()
        }
    }

    /// A forward with no recipients yet, carrying the original message.
    pub fn forward(email: &Email) -> Self {
        Self {
            subject: with_prefix("Fwd:", &email.subject),
            body: quote("Forwarded Message", email),
            ..Default::default()
        }
    }
}

fn with_prefix(prefix: &str, subject: &str) -> String {
    if subject.starts_with(prefix) {
        subject.to_string()
    } else {
        format!("{} {}", prefix, subject)
    }
}

fn quote(heading: &str, email: &Email) -> String {
    format!(
        "\n\n--- {} ---\nFrom: {} <{}>\nDate: {}\nSubject: {}\n\n{}",
        heading,
        email.from_name,
        email.from,
        email.timestamp.format("%Y-%m-%d %H:%M UTC"),
        email.subject,
        email.body
    )
}

/// Input of `save_draft`. `draft_id` pins the draft to update explicitly;
/// without it, a draft with the same non-empty subject is updated instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftRequest {
    #[serde(default)]
    pub draft_id: Option<EmailId>,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// Soft delete: the email now lives in trash.
    Trashed(Email),
    /// Hard delete from trash.
    Removed { id: EmailId, message: String },
}

/// The signed-in user, as stamped on outgoing mail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub address: String,
    pub name: String,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            address: "me@mailflow.com".to_string(),
            name: "Me".to_string(),
        }
    }
}

/// Split a comma separated address field, dropping blanks.
pub fn parse_address_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
pub(crate) fn sample(id: EmailId, folder: Mailbox) -> Email {
    Email {
        id,
        from: format!("sender{}@company.com", id),
        from_name: format!("Sender {}", id),
        to: vec!["me@mailflow.com".to_string()],
        cc: vec![],
        bcc: vec![],
        subject: format!("Subject {}", id),
        body: "Hello\nWorld".to_string(),
        timestamp: DateTime::parse_from_rfc3339("2024-01-15T10:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default()
            + chrono::Duration::minutes(id),
        is_read: false,
        is_starred: false,
        folder,
        thread_id: format!("thread_{}", id),
        has_attachments: false,
    }
}

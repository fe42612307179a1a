use async_trait::async_trait;
use base64::alphabet::URL_SAFE;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use mail_builder::MessageBuilder;
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::model::{Email, EmailId, EmailPatch, FolderView, Mailbox, NewEmail};
use super::provider::{EmailProvider, ListQuery, PAGE_SIZE};
use crate::error::{MailError, Result};
use crate::folder::Folder;

pub const DEFAULT_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Accepts both padded and unpadded input; the API emits either.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Messages fetched concurrently when materializing a listing.
const FETCH_CONCURRENCY: usize = 8;

const INBOX: &str = "INBOX";
const SENT: &str = "SENT";
const DRAFT: &str = "DRAFT";
const TRASH: &str = "TRASH";
const UNREAD: &str = "UNREAD";
const STARRED: &str = "STARRED";
const ARCHIVE_SLUG: &str = "archive";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRef {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

/// A message as returned with `format=raw`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub raw: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    message: MessageRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Label {
    id: String,
    name: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<Label>,
}

/// Gmail message ids are hexadecimal u64 strings; they are carried as the
/// two's-complement `i64` of that value.
pub fn email_id_from_remote(id: &str) -> Result<EmailId> {
    u64::from_str_radix(id, 16)
        .map(|v| v as i64)
        .map_err(|_| MailError::Unknown(format!("unexpected message id '{}'", id)))
}

pub fn remote_id(id: EmailId) -> String {
    format!("{:x}", id as u64)
}

fn label_for(mailbox: &Mailbox) -> Option<String> {
    match mailbox {
        Mailbox::Inbox => Some(INBOX.to_string()),
        Mailbox::Sent => Some(SENT.to_string()),
        Mailbox::Drafts => Some(DRAFT.to_string()),
        Mailbox::Trash => Some(TRASH.to_string()),
        Mailbox::Custom(slug) if slug == ARCHIVE_SLUG => None,
        Mailbox::Custom(slug) => Some(custom_label_id(slug)),
    }
}

/// User label ids look like `Label_12`; slugs are their lowercase form.
fn custom_label_id(slug: &str) -> String {
    match slug.strip_prefix("label_") {
        Some(rest) => format!("Label_{}", rest),
        None => slug.to_string(),
    }
}

fn is_folder_label(label: &str) -> bool {
    matches!(label, INBOX | SENT | DRAFT | TRASH) || label.starts_with("Label_")
}

/// Folder from labels, by precedence: trash, drafts, sent, inbox, user label.
/// A message with none of them has been archived.
pub fn mailbox_from_labels(labels: &[String]) -> Mailbox {
    let has = |l: &str| labels.iter().any(|x| x == l);
    if has(TRASH) {
        Mailbox::Trash
    } else if has(DRAFT) {
        Mailbox::Drafts
    } else if has(SENT) {
        Mailbox::Sent
    } else if has(INBOX) {
        Mailbox::Inbox
    } else if let Some(user) = labels.iter().find(|l| l.starts_with("Label_")) {
        Mailbox::Custom(user.to_lowercase())
    } else {
        Mailbox::Custom(ARCHIVE_SLUG.to_string())
    }
}

fn addresses(parsed: &ParsedMail<'_>, header: &str) -> Vec<(Option<String>, String)> {
    let Some(header) = parsed.headers.get_first_header(header) else {
        return Vec::new();
    };
    let Ok(list) = mailparse::addrparse_header(header) else {
        return Vec::new();
    };

    list.iter()
        .flat_map(|addr| match addr {
            MailAddr::Single(single) => {
                vec![(single.display_name.clone(), single.addr.clone())]
            }
            MailAddr::Group(group) => group
                .addrs
                .iter()
                .map(|s| (s.display_name.clone(), s.addr.clone()))
                .collect(),
        })
        .collect()
}

fn plain_body(part: &ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        let attachment =
            part.get_content_disposition().disposition == DispositionType::Attachment;
        if part.ctype.mimetype == "text/plain" && !attachment {
            return part.get_body().ok();
        }
        return None;
    }
    part.subparts.iter().find_map(plain_body)
}

fn has_attachment(part: &ParsedMail<'_>) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
        || part.subparts.iter().any(has_attachment)
}

/// Map a raw-format message into the canonical email shape.
pub fn email_from_message(message: RawMessage) -> Result<Email> {
    let id = email_id_from_remote(&message.id)?;
    let raw = message
        .raw
        .as_deref()
        .ok_or_else(|| MailError::Unknown(format!("message {} has no raw body", message.id)))?;
    let bytes = BASE64_URL
        .decode(raw.trim())
        .map_err(|e| MailError::Unknown(format!("Failed to base64-decode message: {}", e)))?;
    let parsed = mailparse::parse_mail(&bytes)
        .map_err(|e| MailError::Unknown(format!("Failed to parse MIME message: {}", e)))?;

    let (from_name, from) = addresses(&parsed, "From")
        .into_iter()
        .next()
        .map(|(name, addr)| (name.unwrap_or_else(|| addr.clone()), addr))
        .unwrap_or_default();
    let only_addr = |header: &str| -> Vec<String> {
        addresses(&parsed, header)
            .into_iter()
            .map(|(_, addr)| addr)
            .collect()
    };

    let timestamp = message
        .internal_date
        .as_deref()
        .and_then(|ms| ms.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .or_else(|| {
            parsed
                .headers
                .get_first_value("Date")
                .and_then(|d| mailparse::dateparse(&d).ok())
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let labels = &message.label_ids;
    Ok(Email {
        id,
        from,
        from_name,
        to: only_addr("To"),
        cc: only_addr("Cc"),
        bcc: only_addr("Bcc"),
        subject: parsed.headers.get_first_value("Subject").unwrap_or_default(),
        body: plain_body(&parsed)
            .map(|b| b.replace("\r\n", "\n"))
            .unwrap_or_default(),
        timestamp,
        is_read: !labels.iter().any(|l| l == UNREAD),
        is_starred: labels.iter().any(|l| l == STARRED),
        folder: mailbox_from_labels(labels),
        thread_id: message.thread_id.clone(),
        has_attachments: has_attachment(&parsed),
    })
}

/// Build the RFC 2822 message for a new email, base64url encoded.
pub fn encode_message(email: &NewEmail) -> Result<String> {
    let mut builder = MessageBuilder::new()
        .from((email.from_name.as_str(), email.from.as_str()))
        .subject(email.subject.as_str())
        .text_body(email.body.as_str());

    fn list(v: &[String]) -> Vec<&str> {
        v.iter().map(String::as_str).collect()
    }
    if !email.to.is_empty() {
        builder = builder.to(list(&email.to));
    }
    if !email.cc.is_empty() {
        builder = builder.cc(list(&email.cc));
    }
    if !email.bcc.is_empty() {
        builder = builder.bcc(list(&email.bcc));
    }

    let bytes = builder
        .write_to_vec()
        .map_err(|e| MailError::Unknown(format!("Failed to build MIME message: {}", e)))?;
    Ok(BASE64_URL.encode(bytes))
}

/// Label changes that express `patch`, given the message's current labels.
fn label_changes(patch: &EmailPatch, current: &[String]) -> (Vec<String>, Vec<String>) {
    let mut add = Vec::new();
    let mut remove = Vec::new();

    match patch.is_read {
        Some(true) => remove.push(UNREAD.to_string()),
        Some(false) => add.push(UNREAD.to_string()),
        None => {}
    }
    match patch.is_starred {
        Some(true) => add.push(STARRED.to_string()),
        Some(false) => remove.push(STARRED.to_string()),
        None => {}
    }
    if let Some(folder) = &patch.folder {
        let target = label_for(folder);
        for label in current.iter().filter(|l| is_folder_label(l)) {
            if Some(label) != target.as_ref() {
                remove.push(label.clone());
            }
        }
        if let Some(target) = target {
            add.push(target);
        }
    }

    (add, remove)
}

/// Provider for a Gmail-style REST API authenticated with a bearer token.
pub struct GmailProvider {
    client: Client,
    base_url: String,
    access_token: String,
}

impl GmailProvider {
    pub fn new(base_url: &str, access_token: String) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| {
            MailError::Validation(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .build()
            .map_err(|e| MailError::Unknown(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<()> {
        request
            .bearer_auth(&self.access_token)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Map a 404 from the API to this message's NotFound.
    fn not_found_as(id: EmailId) -> impl Fn(MailError) -> MailError {
        move |e| match e {
            MailError::NotFound(_) => MailError::email_not_found(id),
            other => other,
        }
    }

    async fn fetch_raw(&self, remote: &str) -> Result<RawMessage> {
        let request = self
            .client
            .get(self.url(&format!("messages/{}", remote)))
            .query(&[("format", "raw")]);
        self.send(request).await
    }
}

#[async_trait]
impl EmailProvider for GmailProvider {
    fn name(&self) -> &'static str {
        "gmail"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Email>> {
        let mut params = vec![("maxResults".to_string(), PAGE_SIZE.to_string())];
        match &query.view {
            Some(FolderView::Starred) => params.push(("labelIds".into(), STARRED.into())),
            Some(FolderView::Mailbox(mailbox)) => {
                if let Some(label) = label_for(mailbox) {
                    params.push(("labelIds".into(), label));
                }
                if *mailbox == Mailbox::Trash {
                    params.push(("includeSpamTrash".into(), "true".into()));
                }
            }
            None => params.push(("includeSpamTrash".into(), "true".into())),
        }
        if let Some(term) = &query.search {
            params.push(("q".into(), term.clone()));
        }

        let listing: MessageList = self
            .send(self.client.get(self.url("messages")).query(&params))
            .await?;
        tracing::debug!("Listing returned {} message ids", listing.messages.len());

        futures::stream::iter(listing.messages)
            .map(|m| async move { self.fetch_raw(&m.id).await.and_then(email_from_message) })
            .buffered(FETCH_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn get(&self, id: EmailId) -> Result<Email> {
        let message = self
            .fetch_raw(&remote_id(id))
            .await
            .map_err(Self::not_found_as(id))?;
        email_from_message(message)
    }

    async fn create(&self, email: NewEmail) -> Result<Email> {
        let raw = encode_message(&email)?;

        let created_id = match &email.folder {
            Mailbox::Sent => {
                let mut body = json!({ "raw": raw });
                if let Some(thread) = &email.thread_id {
                    body["threadId"] = json!(thread);
                }
                let sent: MessageRef = self
                    .send(self.client.post(self.url("messages/send")).json(&body))
                    .await?;
                sent.id
            }
            Mailbox::Drafts => {
                let body = json!({ "message": { "raw": raw } });
                let draft: DraftResponse =
                    self.send(self.client.post(self.url("drafts")).json(&body)).await?;
                draft.message.id
            }
            other => {
                let mut labels: Vec<String> = label_for(other).into_iter().collect();
                if !email.is_read {
                    labels.push(UNREAD.to_string());
                }
                let body = json!({ "raw": raw, "labelIds": labels });
                let inserted: MessageRef = self
                    .send(self.client.post(self.url("messages")).json(&body))
                    .await?;
                inserted.id
            }
        };

        let id = email_id_from_remote(&created_id)?;
        if email.is_starred {
            return self.update(id, &EmailPatch::starred(true)).await;
        }
        self.get(id).await
    }

    async fn update(&self, id: EmailId, patch: &EmailPatch) -> Result<Email> {
        if patch.touches_content() {
            return Err(MailError::Validation(
                "message content cannot be changed on this backend".to_string(),
            ));
        }
        let remote = remote_id(id);
        let current = self.fetch_raw(&remote).await.map_err(Self::not_found_as(id))?;

        if patch.folder == Some(Mailbox::Trash) {
            let request = self
                .client
                .post(self.url(&format!("messages/{}/trash", remote)));
            self.send_empty(request)
                .await
                .map_err(Self::not_found_as(id))?;
        }

        let flags_only = EmailPatch {
            folder: patch.folder.clone().filter(|f| *f != Mailbox::Trash),
            ..patch.clone()
        };
        let (add, remove) = label_changes(&flags_only, &current.label_ids);
        if !add.is_empty() || !remove.is_empty() {
            let body = json!({ "addLabelIds": add, "removeLabelIds": remove });
            let request = self
                .client
                .post(self.url(&format!("messages/{}/modify", remote)))
                .json(&body);
            self.send_empty(request)
                .await
                .map_err(Self::not_found_as(id))?;
        }

        self.get(id).await
    }

    async fn remove(&self, id: EmailId) -> Result<()> {
        let request = self
            .client
            .delete(self.url(&format!("messages/{}", remote_id(id))));
        self.send_empty(request)
            .await
            .map_err(Self::not_found_as(id))
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let labels: LabelList = self.send(self.client.get(self.url("labels"))).await?;

        let mut folders: Vec<Folder> = labels
            .labels
            .into_iter()
            .filter(|l| l.kind.as_deref() == Some("user"))
            .enumerate()
            .map(|(i, l)| Folder::custom(100 + i as i64, &l.name, &l.id.to_lowercase()))
            .collect();
        folders.push(Folder::custom(99, "Archive", ARCHIVE_SLUG));
        Ok(folders)
    }

    async fn health_check(&self) -> Result<()> {
        self.send::<serde_json::Value>(self.client.get(self.url("profile")))
            .await?;
        Ok(())
    }
}

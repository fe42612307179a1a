//! Provider for a low-code platform's structured-record REST API.
//!
//! Emails live in the `email_c` table and folders in `folder_c`; every custom
//! column carries the platform's `_c` suffix and recipient lists are stored as
//! comma-joined strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::model::{
    parse_address_list, Email, EmailId, EmailPatch, FolderView, Mailbox, NewEmail,
};
use super::provider::{EmailProvider, ListQuery, PAGE_SIZE};
use crate::error::{MailError, Result};
use crate::folder::{Folder, FolderKind};

const EMAIL_TABLE: &str = "email_c";
const FOLDER_TABLE: &str = "folder_c";

const EMAIL_FIELDS: &[&str] = &[
    "Id",
    "from_c",
    "from_name_c",
    "to_c",
    "cc_c",
    "bcc_c",
    "subject_c",
    "body_c",
    "timestamp_c",
    "is_read_c",
    "is_starred_c",
    "folder_c",
    "thread_id_c",
    "has_attachments_c",
];

const FOLDER_FIELDS: &[&str] = &[
    "Id",
    "name_c",
    "folder_name_c",
    "icon_c",
    "type_c",
    "slug_c",
    "folder_slug_c",
];

/// Row of the `email_c` table. Every column is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_read_c: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_starred_c: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id_c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_attachments_c: Option<bool>,
}

/// Row of the `folder_c` table. Older schemas used the `folder_*` column names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FolderRecord {
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(default)]
    pub name_c: Option<String>,
    #[serde(default)]
    pub folder_name_c: Option<String>,
    #[serde(default)]
    pub icon_c: Option<String>,
    #[serde(default)]
    pub type_c: Option<String>,
    #[serde(default)]
    pub slug_c: Option<String>,
    #[serde(default)]
    pub folder_slug_c: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BulkEnvelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    results: Vec<Envelope<EmailRecord>>,
}

fn join_addresses(list: &[String]) -> String {
    list.join(",")
}

/// Map a platform record into the canonical email shape.
pub fn email_from_record(record: EmailRecord) -> Result<Email> {
    let id = record
        .id
        .ok_or_else(|| MailError::Unknown("record without Id".to_string()))?;

    let timestamp = match record.timestamp_c.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|e| {
                tracing::warn!("Record {} has unparseable timestamp '{}': {}", id, raw, e);
                DateTime::<Utc>::UNIX_EPOCH
            }),
        None => DateTime::<Utc>::UNIX_EPOCH,
    };

    let folder = record
        .folder_c
        .as_deref()
        .map(Mailbox::parse)
        .transpose()
        .unwrap_or_else(|e| {
            tracing::warn!("Record {} has invalid folder: {}; filing in inbox", id, e);
            None
        })
        .unwrap_or(Mailbox::Inbox);

    Ok(Email {
        id,
        from: record.from_c.unwrap_or_default(),
        from_name: record.from_name_c.unwrap_or_default(),
        to: parse_address_list(record.to_c.as_deref().unwrap_or("")),
        cc: parse_address_list(record.cc_c.as_deref().unwrap_or("")),
        bcc: parse_address_list(record.bcc_c.as_deref().unwrap_or("")),
        subject: record.subject_c.unwrap_or_default(),
        body: record.body_c.unwrap_or_default(),
        timestamp,
        is_read: record.is_read_c.unwrap_or(false),
        is_starred: record.is_starred_c.unwrap_or(false),
        folder,
        thread_id: record
            .thread_id_c
            .unwrap_or_else(|| format!("thread_{}", id)),
        has_attachments: record.has_attachments_c.unwrap_or(false),
    })
}

/// Record for a create call. The platform assigns `Id`; the thread id is
/// filled in afterwards if the caller did not provide one.
pub fn record_from_new(email: &NewEmail) -> EmailRecord {
    EmailRecord {
        id: None,
        from_c: Some(email.from.clone()),
        from_name_c: Some(email.from_name.clone()),
        to_c: Some(join_addresses(&email.to)),
        cc_c: Some(join_addresses(&email.cc)),
        bcc_c: Some(join_addresses(&email.bcc)),
        subject_c: Some(email.subject.clone()),
        body_c: Some(email.body.clone()),
        timestamp_c: Some(email.timestamp.to_rfc3339()),
        is_read_c: Some(email.is_read),
        is_starred_c: Some(email.is_starred),
        folder_c: Some(email.folder.slug().to_string()),
        thread_id_c: email.thread_id.clone(),
        has_attachments_c: Some(email.has_attachments),
    }
}

/// Field-level update record: only the columns the patch names are sent.
pub fn record_from_patch(id: EmailId, patch: &EmailPatch) -> EmailRecord {
    EmailRecord {
        id: Some(id),
        from_c: patch.from.clone(),
        from_name_c: patch.from_name.clone(),
        to_c: patch.to.as_deref().map(join_addresses),
        cc_c: patch.cc.as_deref().map(join_addresses),
        bcc_c: patch.bcc.as_deref().map(join_addresses),
        subject_c: patch.subject.clone(),
        body_c: patch.body.clone(),
        timestamp_c: patch.timestamp.map(|t| t.to_rfc3339()),
        is_read_c: patch.is_read,
        is_starred_c: patch.is_starred,
        folder_c: patch.folder.as_ref().map(|f| f.slug().to_string()),
        thread_id_c: patch.thread_id.clone(),
        has_attachments_c: patch.has_attachments,
    }
}

pub fn folder_from_record(record: FolderRecord) -> Folder {
    let name = record
        .name_c
        .or(record.folder_name_c)
        .unwrap_or_else(|| "Unknown".to_string());
    let slug = record
        .slug_c
        .or(record.folder_slug_c)
        .unwrap_or_else(|| name.clone())
        .trim()
        .to_lowercase();
    let kind = match record.type_c.as_deref() {
        Some("system") => FolderKind::System,
        _ => FolderKind::Custom,
    };

    Folder {
        id: record.id,
        name,
        icon: record.icon_c.unwrap_or_else(|| "Folder".to_string()),
        kind,
        slug,
        count: 0,
    }
}

fn fields(names: &[&str]) -> Vec<serde_json::Value> {
    names.iter().map(|n| json!({ "field": { "Name": n } })).collect()
}

/// The platform reports row-level failures as free text.
fn classify_failure(message: Option<String>, id: Option<EmailId>) -> MailError {
    let message = message.unwrap_or_else(|| "request rejected".to_string());
    match id {
        Some(id) if message.to_lowercase().contains("not found") => {
            MailError::email_not_found(id)
        }
        _ => MailError::Validation(message),
    }
}

pub struct RecordsProvider {
    client: Client,
    base_url: String,
    project_id: String,
    public_key: String,
}

impl RecordsProvider {
    pub fn new(base_url: &str, project_id: String, public_key: String) -> Result<Self> {
        url::Url::parse(base_url).map_err(|e| {
            MailError::Validation(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        let client = Client::builder()
            .build()
            .map_err(|e| MailError::Unknown(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            public_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/records/{}", self.base_url, table)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-Project-Id", &self.project_id)
            .header("X-Public-Key", &self.public_key)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.authed(request).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        params: serde_json::Value,
    ) -> Result<Vec<T>> {
        let url = format!("{}/fetch", self.table_url(table));
        let envelope: Envelope<Vec<T>> = self.send(self.client.post(&url).json(&params)).await?;

        if !envelope.success {
            return Err(classify_failure(envelope.message, None));
        }
        Ok(envelope.data.unwrap_or_default())
    }

    /// Run a bulk call that carries a single record and return that record's result.
    async fn single_result(
        &self,
        request: RequestBuilder,
        id: Option<EmailId>,
    ) -> Result<Option<EmailRecord>> {
        let envelope: BulkEnvelope = self.send(request).await?;
        if !envelope.success {
            return Err(classify_failure(envelope.message, id));
        }

        let result = envelope
            .results
            .into_iter()
            .next()
            .ok_or_else(|| MailError::Unknown("empty bulk response".to_string()))?;
        if !result.success {
            return Err(classify_failure(result.message, id));
        }
        Ok(result.data)
    }
}

#[async_trait]
impl EmailProvider for RecordsProvider {
    fn name(&self) -> &'static str {
        "records"
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Email>> {
        let filters = match &query.view {
            Some(FolderView::Mailbox(mailbox)) => vec![json!({
                "FieldName": "folder_c",
                "Operator": "ExactMatch",
                "Values": [mailbox.slug()],
            })],
            _ => Vec::new(),
        };
        let params = json!({
            "fields": fields(EMAIL_FIELDS),
            "where": filters,
            "orderBy": [{ "fieldName": "timestamp_c", "sorttype": "DESC" }],
            "pagingInfo": { "limit": PAGE_SIZE, "offset": 0 },
        });

        let records: Vec<EmailRecord> = self.fetch(EMAIL_TABLE, params).await?;
        tracing::debug!("Fetched {} email records", records.len());
        records.into_iter().map(email_from_record).collect()
    }

    async fn get(&self, id: EmailId) -> Result<Email> {
        let url = format!("{}/{}", self.table_url(EMAIL_TABLE), id);
        let envelope: Envelope<EmailRecord> = match self.send(self.client.get(&url)).await {
            Ok(envelope) => envelope,
            Err(MailError::NotFound(_)) => return Err(MailError::email_not_found(id)),
            Err(e) => return Err(e),
        };

        match envelope.data {
            Some(record) if envelope.success => email_from_record(record),
            _ => Err(MailError::email_not_found(id)),
        }
    }

    async fn create(&self, email: NewEmail) -> Result<Email> {
        let has_thread = email.thread_id.is_some();
        let body = json!({ "records": [record_from_new(&email)] });
        let request = self.client.post(self.table_url(EMAIL_TABLE)).json(&body);
        let created = self
            .single_result(request, None)
            .await?
            .ok_or_else(|| MailError::Unknown("create returned no record".to_string()))?;

        let created = email_from_record(created)?;
        if has_thread {
            return Ok(created);
        }

        // Thread ids derive from the platform-assigned id, so they need a second write.
        let thread_id = format!("thread_{}", created.id);
        let thread = EmailPatch {
            thread_id: Some(thread_id.clone()),
            ..Default::default()
        };
        match self.update(created.id, &thread).await {
            Ok(email) => Ok(email),
            Err(e) => {
                tracing::warn!(
                    "Record {} created but its thread id was not stored: {}",
                    created.id,
                    e
                );
                Ok(Email {
                    thread_id,
                    ..created
                })
            }
        }
    }

    async fn update(&self, id: EmailId, patch: &EmailPatch) -> Result<Email> {
        let body = json!({ "records": [record_from_patch(id, patch)] });
        let request = self.client.patch(self.table_url(EMAIL_TABLE)).json(&body);
        let updated = self.single_result(request, Some(id)).await?;

        match updated {
            Some(record) => email_from_record(record),
            None => self.get(id).await,
        }
    }

    async fn remove(&self, id: EmailId) -> Result<()> {
        let body = json!({ "RecordIds": [id] });
        let request = self.client.delete(self.table_url(EMAIL_TABLE)).json(&body);
        self.single_result(request, Some(id)).await?;
        Ok(())
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let params = json!({
            "fields": fields(FOLDER_FIELDS),
            "orderBy": [{ "fieldName": "Id", "sorttype": "ASC" }],
            "pagingInfo": { "limit": PAGE_SIZE, "offset": 0 },
        });
        let records: Vec<FolderRecord> = self.fetch(FOLDER_TABLE, params).await?;
        Ok(records.into_iter().map(folder_from_record).collect())
    }

    async fn health_check(&self) -> Result<()> {
        let params = json!({
            "fields": fields(&["Id"]),
            "pagingInfo": { "limit": 1, "offset": 0 },
        });
        self.fetch::<serde_json::Value>(EMAIL_TABLE, params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_stub;
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Table = Arc<Mutex<Vec<Value>>>;

    fn row(id: i64, folder: &str, subject: &str) -> Value {
        json!({
            "Id": id,
            "from_c": "sarah.johnson@company.com",
            "from_name_c": "Sarah Johnson",
            "to_c": "me@mailflow.com, team@company.com",
            "subject_c": subject,
            "body_c": "Hello",
            "timestamp_c": "2024-01-15T09:30:00Z",
            "is_read_c": false,
            "is_starred_c": false,
            "folder_c": folder,
        })
    }

    async fn fetch(
        State(table): State<Table>,
        Path(name): Path<String>,
        Json(params): Json<Value>,
    ) -> Json<Value> {
        if name == FOLDER_TABLE {
            return Json(json!({
                "success": true,
                "data": [{ "Id": 10, "folder_name_c": "Receipts", "type_c": "custom" }],
            }));
        }
        let wanted = params["where"][0]["Values"][0].as_str().map(str::to_string);
        let rows: Vec<Value> = table
            .lock()
            .unwrap()
            .iter()
            .filter(|r| wanted.as_deref().map_or(true, |w| r["folder_c"] == w))
            .cloned()
            .collect();
        Json(json!({ "success": true, "data": rows }))
    }

    async fn get_one(
        State(table): State<Table>,
        Path((_, id)): Path<(String, i64)>,
    ) -> Json<Value> {
        let found = table.lock().unwrap().iter().find(|r| r["Id"] == id).cloned();
        match found {
            Some(r) => Json(json!({ "success": true, "data": r })),
            None => Json(json!({ "success": false, "message": "Record not found" })),
        }
    }

    async fn create(State(table): State<Table>, Json(body): Json<Value>) -> Json<Value> {
        let mut rows = table.lock().unwrap();
        let mut record = body["records"][0].clone();
        let id = rows.iter().filter_map(|r| r["Id"].as_i64()).max().unwrap_or(0) + 1;
        record["Id"] = json!(id);
        rows.push(record.clone());
        Json(json!({
            "success": true,
            "results": [{ "success": true, "data": record }],
        }))
    }

    async fn update(State(table): State<Table>, Json(body): Json<Value>) -> Json<Value> {
        let mut rows = table.lock().unwrap();
        let patch = body["records"][0].as_object().cloned().unwrap_or_default();
        let Some(row) = rows.iter_mut().find(|r| r["Id"] == patch["Id"]) else {
            return Json(json!({
                "success": true,
                "results": [{ "success": false, "message": "Record not found" }],
            }));
        };
        for (k, v) in patch {
            row[k] = v;
        }
        Json(json!({
            "success": true,
            "results": [{ "success": true, "data": row.clone() }],
        }))
    }

    async fn delete(State(table): State<Table>, Json(body): Json<Value>) -> Json<Value> {
        let mut rows = table.lock().unwrap();
        let id = body["RecordIds"][0].clone();
        let before = rows.len();
        rows.retain(|r| r["Id"] != id);
        let success = rows.len() < before;
        let message = if success { "ok" } else { "Record not found" };
        Json(json!({
            "success": true,
            "results": [{ "success": success, "message": message }],
        }))
    }

    async fn stub(rows: Vec<Value>) -> RecordsProvider {
        let table: Table = Arc::new(Mutex::new(rows));
        let router = Router::new()
            .route("/records/:table/fetch", post(fetch))
            .route("/records/:table/:id", get(get_one))
            .route("/records/:table", post(create).patch(update).delete(delete))
            .with_state(table);
        let base = spawn_stub(router).await;
        RecordsProvider::new(&base, "proj".to_string(), "key".to_string()).unwrap()
    }

    #[test]
    fn test_record_mapping_with_defaults() {
        let record: EmailRecord = serde_json::from_value(json!({
            "Id": 4,
            "to_c": "a@x.com,b@y.com",
            "folder_c": "starred",
            "timestamp_c": "not a date",
        }))
        .unwrap();
        let email = email_from_record(record).unwrap();

        assert_eq!(email.to, vec!["a@x.com".to_string(), "b@y.com".to_string()]);
        assert_eq!(email.folder, Mailbox::Inbox);
        assert_eq!(email.thread_id, "thread_4");
        assert_eq!(email.timestamp, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_patch_record_only_sends_named_columns() {
        let record = record_from_patch(3, &EmailPatch::starred(true));
        let value = serde_json::to_value(record).unwrap();
        assert_eq!(value, json!({ "Id": 3, "is_starred_c": true }));
    }

    #[test]
    fn test_folder_mapping_fallbacks() {
        let folder = folder_from_record(FolderRecord {
            id: 8,
            folder_name_c: Some("Receipts".to_string()),
            ..Default::default()
        });
        assert_eq!(folder.name, "Receipts");
        assert_eq!(folder.slug, "receipts");
        assert_eq!(folder.icon, "Folder");
        assert_eq!(folder.kind, FolderKind::Custom);
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let provider = stub(vec![row(1, "inbox", "Hi"), row(2, "sent", "Re: Hi")]).await;

        let inbox = provider
            .list(&ListQuery::view(FolderView::from_slug("inbox")))
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].to.len(), 2);

        let starred = provider.update(1, &EmailPatch::starred(true)).await.unwrap();
        assert!(starred.is_starred);
        assert_eq!(starred.subject, "Hi");

        let created = provider
            .create(NewEmail {
                from: "me@mailflow.com".to_string(),
                from_name: "Me".to_string(),
                to: vec!["bob@example.com".to_string()],
                cc: vec![],
                bcc: vec![],
                subject: "New".to_string(),
                body: String::new(),
                timestamp: Utc::now(),
                is_read: true,
                is_starred: false,
                folder: Mailbox::Drafts,
                thread_id: None,
                has_attachments: false,
            })
            .await
            .unwrap();
        assert_eq!(created.id, 3);
        assert_eq!(created.thread_id, "thread_3");
        assert_eq!(created.folder, Mailbox::Drafts);

        provider.remove(2).await.unwrap();
        assert!(provider.get(2).await.unwrap_err().is_not_found());
    }

    #[test]
    fn test_folder_slugs_are_lowercased() {
        let folder = folder_from_record(FolderRecord {
            id: 12,
            name_c: Some("Work".to_string()),
            slug_c: Some("Work ".to_string()),
            ..Default::default()
        });
        assert_eq!(folder.slug, "work");
        assert_eq!(folder.name, "Work");
    }

    #[tokio::test]
    async fn test_create_survives_rejected_thread_write() {
        async fn reject_patch() -> Json<Value> {
            Json(json!({
                "success": true,
                "results": [{
                    "success": false,
                    "message": "field thread_id_c is read-only",
                }],
            }))
        }

        let table: Table = Arc::new(Mutex::new(vec![row(76, "inbox", "Earlier")]));
        let router = Router::new()
            .route("/records/:table", post(create).patch(reject_patch))
            .with_state(table.clone());
        let base = spawn_stub(router).await;
        let provider =
            RecordsProvider::new(&base, "proj".to_string(), "key".to_string()).unwrap();

        let created = provider
            .create(NewEmail {
                from: "me@mailflow.com".to_string(),
                from_name: "Me".to_string(),
                to: vec!["bob@example.com".to_string()],
                cc: vec![],
                bcc: vec![],
                subject: "Kept".to_string(),
                body: String::new(),
                timestamp: Utc::now(),
                is_read: true,
                is_starred: false,
                folder: Mailbox::Sent,
                thread_id: None,
                has_attachments: false,
            })
            .await
            .unwrap();

        assert_eq!(created.id, 77);
        assert_eq!(created.thread_id, "thread_77");
        assert_eq!(created.subject, "Kept");
        assert_eq!(table.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let provider = stub(vec![]).await;
        assert!(provider.get(5).await.unwrap_err().is_not_found());
        assert!(provider
            .update(5, &EmailPatch::read(true))
            .await
            .unwrap_err()
            .is_not_found());
        assert!(provider.remove(5).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_folders() {
        let provider = stub(vec![]).await;
        let folders = provider.list_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].slug, "receipts");
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let provider =
            RecordsProvider::new("http://127.0.0.1:9", "p".to_string(), "k".to_string()).unwrap();
        let err = provider.list(&ListQuery::all()).await.unwrap_err();
        assert!(matches!(err, MailError::BackendUnavailable(_)));
    }
}

use async_trait::async_trait;
use axum::Router;

use crate::email::model::{Email, EmailId, EmailPatch, NewEmail};
use crate::email::provider::{EmailProvider, ListQuery};
use crate::error::{MailError, Result};

/// Serve `router` on an ephemeral localhost port and return its base URL.
pub(crate) async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    format!("http://{}", addr)
}

/// A backend that refuses every call.
pub(crate) struct DownProvider;

fn refused<T>() -> Result<T> {
    Err(MailError::BackendUnavailable("connection refused".into()))
}

#[async_trait]
impl EmailProvider for DownProvider {
    fn name(&self) -> &'static str {
        "down"
    }
    async fn list(&self, _: &ListQuery) -> Result<Vec<Email>> {
        refused()
    }
    async fn get(&self, _: EmailId) -> Result<Email> {
        refused()
    }
    async fn create(&self, _: NewEmail) -> Result<Email> {
        refused()
    }
    async fn update(&self, _: EmailId, _: &EmailPatch) -> Result<Email> {
        refused()
    }
    async fn remove(&self, _: EmailId) -> Result<()> {
        refused()
    }
    async fn list_folders(&self) -> Result<Vec<crate::folder::Folder>> {
        refused()
    }
    async fn health_check(&self) -> Result<()> {
        refused()
    }
}

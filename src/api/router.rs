use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{emails, folders};
use crate::AppState;

/// Simple request logger middleware
async fn log_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    tracing::info!(">>> {} {}", method, uri);
    let res = next.run(req).await;
    tracing::info!("<<< {} {} -> {}", method, uri, res.status());
    res
}

/// Build the JSON API consumed by the browser client
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(emails::health))
        // Emails
        .route(
            "/api/emails",
            get(emails::list_emails).post(emails::create_email),
        )
        .route("/api/emails/send", post(emails::send_email))
        .route(
            "/api/emails/:id",
            get(emails::get_email)
                .patch(emails::update_email)
                .delete(emails::delete_email),
        )
        .route("/api/emails/:id/star", post(emails::toggle_star))
        .route("/api/emails/:id/read", post(emails::mark_read))
        .route("/api/emails/:id/unread", post(emails::mark_unread))
        .route("/api/emails/:id/move", post(emails::move_email))
        .route("/api/emails/:id/reply", get(emails::reply_template))
        .route("/api/emails/:id/forward", get(emails::forward_template))
        .route("/api/drafts", post(emails::save_draft))
        // Folders
        .route("/api/folders", get(folders::list_folders))
        .route("/api/folders/:slug", get(folders::get_folder))
        .route("/api/folders/:slug/emails", get(folders::folder_emails))
        .layer(middleware::from_fn(log_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::hub::ChangeHub;
    use crate::email::memory::MemoryProvider;
    use crate::email::model::Identity;
    use crate::email::repository::EmailRepository;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, EmailRepository) {
        let provider = Arc::new(MemoryProvider::seeded().unwrap());
        let repo = EmailRepository::new(provider, ChangeHub::new(), Identity::default());
        (build_router(AppState::new(repo.clone())), repo)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn ids(value: &Value) -> Vec<i64> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app();
        let (status, body) = call(&app, Method::GET, "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["backend"], "memory");
    }

    #[tokio::test]
    async fn test_search_and_list() {
        let (app, _) = app();
        let (status, all) = call(&app, Method::GET, "/api/emails", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 12);

        let (_, found) = call(&app, Method::GET, "/api/emails?q=SARAH", None).await;
        assert_eq!(ids(&found), vec![6, 1, 4]);

        let (_, blank) = call(&app, Method::GET, "/api/emails?q=%20", None).await;
        assert_eq!(blank.as_array().unwrap().len(), 12);
    }

    #[tokio::test]
    async fn test_missing_email_renders_error_body() {
        let (app, _) = app();
        let (status, body) = call(&app, Method::GET, "/api/emails/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NotFound");
        assert_eq!(body["error"]["message"], "Email 999 was not found");
        assert!(body["error"]["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let (app, _) = app();
        let (status, first) = call(&app, Method::DELETE, "/api/emails/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["folder"], "trash");

        let (status, second) = call(&app, Method::DELETE, "/api/emails/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["success"], true);
        assert_eq!(second["id"], 2);

        let (status, _) = call(&app, Method::GET, "/api/emails/2", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_flag_routes_notify_once_each() {
        let (app, repo) = app();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = repo.hub().subscribe(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let (_, starred) = call(&app, Method::POST, "/api/emails/2/star", None).await;
        assert_eq!(starred["isStarred"], true);
        let (_, read) = call(&app, Method::POST, "/api/emails/2/read", None).await;
        assert_eq!(read["isRead"], true);
        let (_, unread) = call(&app, Method::POST, "/api/emails/2/unread", None).await;
        assert_eq!(unread["isRead"], false);

        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_move_rejects_starred() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/emails/3/move",
            Some(json!({ "folder": "starred" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "ValidationFailure");

        let (status, moved) = call(
            &app,
            Method::POST,
            "/api/emails/3/move",
            Some(json!({ "folder": "Receipts" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(moved["folder"], "receipts");
    }

    #[tokio::test]
    async fn test_patch_updates_fields() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            Method::PATCH,
            "/api/emails/5",
            Some(json!({ "isRead": true, "isStarred": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isRead"], true);
        assert_eq!(body["isStarred"], true);
        assert_eq!(body["folder"], "inbox");
    }

    #[tokio::test]
    async fn test_draft_then_send() {
        let (app, _) = app();
        let (status, draft) = call(
            &app,
            Method::POST,
            "/api/drafts",
            Some(json!({
                "to": ["team@company.com"],
                "subject": "Weekly Update",
                "body": "v2"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(draft["id"], 8);
        assert_eq!(draft["body"], "v2");

        let (status, sent) = call(
            &app,
            Method::POST,
            "/api/emails/send",
            Some(json!({
                "to": ["team@company.com"],
                "subject": "Weekly Update",
                "body": "v2",
                "fromDraft": 8
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(sent["folder"], "sent");
        assert_eq!(sent["from"], "me@mailflow.com");

        let (_, drafts) = call(&app, Method::GET, "/api/folders/drafts/emails", None).await;
        assert_eq!(ids(&drafts), vec![9]);
    }

    #[tokio::test]
    async fn test_send_requires_a_recipient() {
        let (app, repo) = app();
        for to in [json!([]), json!(["  "])] {
            let (status, body) = call(
                &app,
                Method::POST,
                "/api/emails/send",
                Some(json!({ "to": to, "subject": "no one" })),
            )
            .await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(body["error"]["code"], "ValidationFailure");
        }
        assert_eq!(repo.list_by_folder("sent").await.len(), 2);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/emails",
            Some(json!({ "subject": "saved for later" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_reply_and_forward_templates() {
        let (app, _) = app();
        let (status, reply) = call(&app, Method::GET, "/api/emails/1/reply", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["to"], json!(["sarah.johnson@company.com"]));
        assert_eq!(reply["subject"], "Re: Q4 Marketing Strategy Review");

        let (_, forward) = call(&app, Method::GET, "/api/emails/6/forward", None).await;
        assert_eq!(forward["to"], json!([]));
        assert_eq!(forward["subject"], "Fwd: Re: Q4 Marketing Strategy Review");
        assert!(forward["body"]
            .as_str()
            .unwrap()
            .contains("--- Forwarded Message ---"));

        let (status, _) = call(&app, Method::GET, "/api/emails/999/reply", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_returns_created() {
        let (app, _) = app();
        let (status, email) = call(
            &app,
            Method::POST,
            "/api/emails",
            Some(json!({ "to": ["a@b.com"], "subject": "Hi", "body": "there" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(email["isRead"], true);
        assert_eq!(email["isStarred"], false);
    }

    #[tokio::test]
    async fn test_folders() {
        let (app, _) = app();
        let (status, folders) = call(&app, Method::GET, "/api/folders", None).await;
        assert_eq!(status, StatusCode::OK);
        let inbox = &folders.as_array().unwrap()[0];
        assert_eq!(inbox["slug"], "inbox");
        assert_eq!(inbox["type"], "system");
        assert_eq!(inbox["count"], 3);

        let (_, starred) = call(&app, Method::GET, "/api/folders/starred", None).await;
        assert_eq!(starred["count"], 3);

        let (_, emails) = call(&app, Method::GET, "/api/folders/starred/emails", None).await;
        assert_eq!(ids(&emails), vec![1, 4, 7]);

        let (status, _) = call(&app, Method::GET, "/api/folders/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

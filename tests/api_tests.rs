mod common;

use article_portal::{AppConfig, AppState, MockStorageService, create_router};
use common::{InMemoryRepository, STRONG_PASSWORD};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct SpawnedApp {
    pub address: String,
    pub storage: MockStorageService,
}

async fn spawn_app() -> SpawnedApp {
    let storage = MockStorageService::new();
    let state = AppState {
        repo: Arc::new(InMemoryRepository::seeded()),
        storage: Arc::new(storage.clone()),
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    SpawnedApp { address, storage }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_register_then_manage_own_articles() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let registered: Value = client
        .post(format!("{}/register", app.address))
        .json(&json!({ "name": "Self Served", "email": "self@example.com", "password": STRONG_PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = registered["access_token"].as_str().unwrap().to_string();

    // Self-registered accounts hold the `user` role and may not publish.
    let response = client
        .post(format!("{}/articles", app.address))
        .bearer_auth(&token)
        .json(&json!({ "title": "Nope", "content": "Nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let page: Value = client
        .get(format!("{}/articles", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["meta"]["total"], 0);

    let response = client
        .post(format!("{}/logout", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let response = client
        .get(format!("{}/articles", app.address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_multipart_upload_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/register", app.address))
        .json(&json!({ "name": "Uploader", "email": "up@example.com", "password": STRONG_PASSWORD }))
        .send()
        .await
        .unwrap();
    let login: Value = client
        .post(format!("{}/login", app.address))
        .json(&json!({ "email": "up@example.com", "password": STRONG_PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = login["accessToken"].as_str().unwrap().to_string();

    // A user-role caller is refused before the upload is stored.
    let cover = reqwest::multipart::Part::bytes(b"fake-png".to_vec())
        .file_name("cover.png")
        .mime_str("image/png")
        .unwrap();
    let form = reqwest::multipart::Form::new()
        .text("title", "Upload")
        .text("content", "<p>x</p>")
        .part("cover", cover);
    let response = client
        .post(format!("{}/articles", app.address))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    assert!(app.storage.keys().is_empty());
}

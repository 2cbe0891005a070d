//! Integration tests for the chat history and contact REST endpoints.

use chrono::{Duration, Utc};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::net::TcpListener;

use courier_server::auth::jwt::{issue_access_token, load_or_generate_jwt_secret, JwtIdentity};
use courier_server::chat::RoutingSettings;
use courier_server::db::models::{ChatId, User, UserId};
use courier_server::db::{init_db, ChatStore, SqliteStore};
use courier_server::state::AppState;
use courier_server::ws::new_connection_registry;

struct TestServer {
    base_url: String,
    secret: Vec<u8>,
    store: Arc<SqliteStore>,
    client: reqwest::Client,
    _tmp_dir: tempfile::TempDir,
}

impl TestServer {
    fn token(&self, user: UserId) -> String {
        issue_access_token(&self.secret, user, Duration::hours(1)).unwrap()
    }

    async fn get(&self, path: &str, user: UserId) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(self.token(user))
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, user: UserId) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(self.token(user))
            .send()
            .await
            .unwrap()
    }
}

/// Helper: start the server on a random port with a fresh data dir.
async fn start_test_server() -> TestServer {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = init_db(&data_dir).expect("Failed to init DB");
    let secret = load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");
    let store = Arc::new(SqliteStore::new(db));

    let state = AppState::new(
        store.clone(),
        Arc::new(JwtIdentity::new(secret.clone())),
        new_connection_registry(),
        RoutingSettings::default(),
    );

    let app = courier_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        secret,
        store,
        client: reqwest::Client::new(),
        _tmp_dir: tmp_dir,
    }
}

/// Alice and Bob with one chat holding two messages from Alice and one from Bob.
fn seed_conversation(server: &TestServer) -> (User, User, ChatId) {
    let alice = server.store.insert_user("alice").unwrap();
    let bob = server.store.insert_user("bob").unwrap();
    let chat = server.store.find_or_create_chat(alice.id, bob.id).unwrap();
    for (sender, text) in [(alice.id, "hi"), (alice.id, "you there?"), (bob.id, "yes")] {
        server
            .store
            .save_message(chat.id, sender, text, false, Utc::now())
            .unwrap();
    }
    (alice, bob, chat.id)
}

#[tokio::test]
async fn test_health_check() {
    let server = start_test_server().await;
    let resp = reqwest::get(format!("{}/health", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_chats_require_bearer_token() {
    let server = start_test_server().await;

    let resp = server
        .client
        .get(format!("{}/api/chats", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .get(format!("{}/api/chats", server.base_url))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_list_chats_names_the_other_user() {
    let server = start_test_server().await;
    let (alice, bob, chat_id) = seed_conversation(&server);

    let resp = server.get("/api/chats", alice.id).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let chats = body.as_array().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0]["id"], chat_id.0);
    assert_eq!(chats[0]["target_user_id"], bob.id.0);
    assert_eq!(chats[0]["target_username"], "bob");

    let body: Value = server.get("/api/chats", bob.id).await.json().await.unwrap();
    assert_eq!(body[0]["target_username"], "alice");
}

#[tokio::test]
async fn test_chat_messages_for_participant() {
    let server = start_test_server().await;
    let (alice, _bob, chat_id) = seed_conversation(&server);

    let resp = server
        .get(&format!("/api/chats/{}/messages", chat_id), alice.id)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let texts: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["hi", "you there?", "yes"]);
}

#[tokio::test]
async fn test_chat_messages_forbidden_for_outsider() {
    let server = start_test_server().await;
    let (_alice, _bob, chat_id) = seed_conversation(&server);
    let carol = server.store.insert_user("carol").unwrap();

    let resp = server
        .get(&format!("/api/chats/{}/messages", chat_id), carol.id)
        .await;
    assert_eq!(resp.status(), 403);

    let resp = server.get("/api/chats/999/messages", carol.id).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_mark_seen_flips_only_peer_messages_once() {
    let server = start_test_server().await;
    let (alice, bob, chat_id) = seed_conversation(&server);

    let resp = server
        .post(&format!("/api/chats/{}/seen", chat_id), bob.id)
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["updated"], 2);

    // Monotonic: a second call finds nothing left to flip
    let body: Value = server
        .post(&format!("/api/chats/{}/seen", chat_id), bob.id)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["updated"], 0);

    let messages = server.store.get_chat_messages(chat_id).unwrap();
    for message in messages {
        assert_eq!(message.seen, message.sender_id == alice.id);
    }

    let carol = server.store.insert_user("carol").unwrap();
    let resp = server
        .post(&format!("/api/chats/{}/seen", chat_id), carol.id)
        .await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_add_and_list_contacts() {
    let server = start_test_server().await;
    let alice = server.store.insert_user("alice").unwrap();
    let bob = server.store.insert_user("bob").unwrap();

    let resp = server
        .post(&format!("/api/contacts/{}", bob.id), alice.id)
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], bob.id.0);
    assert_eq!(body["username"], "bob");
    assert!(body["last_online"].is_null());

    let resp = server
        .post(&format!("/api/contacts/{}", bob.id), alice.id)
        .await;
    assert_eq!(resp.status(), 409);

    let resp = server.post("/api/contacts/999", alice.id).await;
    assert_eq!(resp.status(), 404);

    let resp = server
        .post(&format!("/api/contacts/{}", alice.id), alice.id)
        .await;
    assert_eq!(resp.status(), 400);

    let body: Value = server.get("/api/contacts", alice.id).await.json().await.unwrap();
    let contacts = body.as_array().unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0]["username"], "bob");

    let body: Value = server.get("/api/contacts", bob.id).await.json().await.unwrap();
    assert!(body.as_array().unwrap().is_empty());

    let resp = server
        .client
        .get(format!("{}/api/contacts", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_contact_last_online_set_after_socket_closes() {
    let server = start_test_server().await;
    let alice = server.store.insert_user("alice").unwrap();
    let bob = server.store.insert_user("bob").unwrap();
    server
        .post(&format!("/api/contacts/{}", bob.id), alice.id)
        .await;

    let url = format!(
        "{}/ws/notifications?token={}",
        server.base_url.replacen("http", "ws", 1),
        server.token(bob.id)
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to WebSocket");

    let body: Value = server.get("/api/contacts", alice.id).await.json().await.unwrap();
    assert!(body[0]["last_online"].is_null());

    ws.close(None).await.unwrap();
    drop(ws);

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(2);
    loop {
        let body: Value = server.get("/api/contacts", alice.id).await.json().await.unwrap();
        if body[0]["last_online"].is_string() {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "last_online never set: {body}"
        );
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
}

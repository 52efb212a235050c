//! HTTP platform clients against a mock server

use libsocialcast::error::PlatformError;
use libsocialcast::platforms::telegram::TelegramClient;
use libsocialcast::platforms::whatsapp::WhatsAppCloudClient;
use libsocialcast::platforms::{Connection, MediaFile, MediaKind, PlatformClient, SessionEvent};
use libsocialcast::{PlatformAccount, PlatformKind, SocialcastError};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn account(platform: PlatformKind, credentials: serde_json::Value) -> PlatformAccount {
    PlatformAccount::new(
        "user-1".to_string(),
        platform,
        "test".to_string(),
        Some(credentials.to_string()),
        0,
    )
}

async fn mount_get_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/botTOKEN/getMe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "id": 42, "is_bot": true, "username": "shop_bot" }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_telegram_connect_and_send_text() {
    let server = MockServer::start().await;
    mount_get_me(&server).await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .and(body_partial_json(json!({
            "chat_id": "-1001",
            "text": "<b>Sale</b> today",
            "parse_mode": "HTML"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 7 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = TelegramClient::new(&server.uri()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(PlatformKind::Telegram, json!({ "bot_token": "TOKEN" })),
            tx,
        )
        .await
        .unwrap();
    assert_eq!(rx.recv().await, Some(SessionEvent::Ready));

    connection
        .send_text("-1001", "<b>Sale</b> today")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_telegram_rejected_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/botBAD/getMe"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "ok": false,
            "error_code": 401,
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let client = TelegramClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = client
        .connect(&account(PlatformKind::Telegram, json!({ "bot_token": "BAD" })), tx)
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        SocialcastError::Platform(PlatformError::Authentication(_))
    ));
}

#[tokio::test]
async fn test_telegram_send_error_carries_description() {
    let server = MockServer::start().await;
    mount_get_me(&server).await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendMessage"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: chat not found"
        })))
        .mount(&server)
        .await;

    let client = TelegramClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(PlatformKind::Telegram, json!({ "bot_token": "TOKEN" })),
            tx,
        )
        .await
        .unwrap();

    let err = connection.send_text("nope", "hello").await.unwrap_err();
    match err {
        SocialcastError::Platform(PlatformError::Send(msg)) => {
            assert!(msg.contains("chat not found"))
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_telegram_send_photo_uploads_file() {
    let server = MockServer::start().await;
    mount_get_me(&server).await;
    Mock::given(method("POST"))
        .and(path("/botTOKEN/sendPhoto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "message_id": 8 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let file = dir.path().join("flyer.jpg");
    std::fs::write(&file, b"\xff\xd8\xff").unwrap();

    let client = TelegramClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(PlatformKind::Telegram, json!({ "bot_token": "TOKEN" })),
            tx,
        )
        .await
        .unwrap();

    connection
        .send_media(
            "-1001",
            &MediaFile {
                path: file,
                kind: MediaKind::Image,
            },
            "New flyer",
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_telegram_missing_media_file_is_validation_error() {
    let server = MockServer::start().await;
    mount_get_me(&server).await;

    let client = TelegramClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(PlatformKind::Telegram, json!({ "bot_token": "TOKEN" })),
            tx,
        )
        .await
        .unwrap();

    let err = connection
        .send_media(
            "-1001",
            &MediaFile {
                path: "/nonexistent/clip.mp4".into(),
                kind: MediaKind::Video,
            },
            "",
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SocialcastError::Platform(PlatformError::Validation(_))
    ));
}

#[tokio::test]
async fn test_whatsapp_connect_and_send_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/PHONE1"))
        .and(header("authorization", "Bearer SECRET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "PHONE1",
            "display_phone_number": "+1 555 0100"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/PHONE1/messages"))
        .and(header("authorization", "Bearer SECRET"))
        .and(body_partial_json(json!({
            "messaging_product": "whatsapp",
            "to": "15550002",
            "type": "text",
            "text": { "body": "Spring sale" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "wamid.1" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = WhatsAppCloudClient::new(&server.uri()).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(
                PlatformKind::WhatsApp,
                json!({ "phone_number_id": "PHONE1", "access_token": "SECRET" }),
            ),
            tx,
        )
        .await
        .unwrap();
    assert_eq!(rx.recv().await, Some(SessionEvent::Ready));

    connection
        .send_text("+15550002@c.us", "Spring sale")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_whatsapp_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/PHONE1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "PHONE1" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/PHONE1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many"))
        .mount(&server)
        .await;

    let client = WhatsAppCloudClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let connection = client
        .connect(
            &account(
                PlatformKind::WhatsApp,
                json!({ "phone_number_id": "PHONE1", "access_token": "SECRET" }),
            ),
            tx,
        )
        .await
        .unwrap();

    let err = connection.send_text("15550002", "hi").await.unwrap_err();
    assert!(matches!(
        err,
        SocialcastError::Platform(PlatformError::RateLimit(_))
    ));
}

#[tokio::test]
async fn test_whatsapp_unknown_phone_id_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/MISSING"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "Unsupported get request" }
        })))
        .mount(&server)
        .await;

    let client = WhatsAppCloudClient::new(&server.uri()).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = client
        .connect(
            &account(
                PlatformKind::WhatsApp,
                json!({ "phone_number_id": "MISSING", "access_token": "SECRET" }),
            ),
            tx,
        )
        .await
        .err()
        .unwrap();

    assert!(matches!(
        err,
        SocialcastError::Platform(PlatformError::Authentication(_))
    ));
}

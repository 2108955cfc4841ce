//! Yandex Cloud adapter against a mock HTTP server

mod common;

use ai_gateway::drivers::YandexAdapter;
use ai_gateway::storage::OutputStore;
use ai_gateway::types::AudioSource;
use ai_gateway::{
    Capability, ErrorKind, Gateway, ImageRequest, Message, SpeechRequest, StreamEvent,
    TranscriptionRequest,
};
use base64::Engine;
use common::temp_dir;
use futures::StreamExt;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const COMPLETION_PATH: &str = "/foundationModels/v1/completion";

fn gateway(server: &ServerGuard) -> Gateway {
    let adapter = YandexAdapter::builder()
        .api_key("AQVN-test")
        .folder_id("b1gfolder")
        .base_url(server.url())
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    let root = temp_dir("yandex");
    Gateway::builder()
        .adapter(Arc::new(adapter))
        .route("yandexgpt-lite", "yandex")
        .route("general", "yandex")
        .route("yandex-art", "yandex")
        .output_store(OutputStore::new(root.join("audio"), root.join("images")))
        .build()
        .unwrap()
}

fn ndjson(lines: &[serde_json::Value]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

fn alternative(text: &str, status: &str) -> serde_json::Value {
    json!({
        "result": {
            "alternatives": [{"message": {"role": "assistant", "text": text}, "status": status}],
            "modelVersion": "23.10.2024"
        }
    })
}

#[tokio::test]
async fn test_completion_request_shape() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", COMPLETION_PATH)
        .match_header("authorization", "Api-Key AQVN-test")
        .match_header("x-folder-id", "b1gfolder")
        .match_body(Matcher::PartialJson(json!({
            "modelUri": "gpt://b1gfolder/yandexgpt-lite/latest",
            "completionOptions": {"stream": false, "temperature": 0.3},
            "messages": [
                {"role": "system", "text": "Отвечай кратко."},
                {"role": "user", "text": "Привет"}
            ]
        })))
        .with_status(200)
        .with_body(alternative("Здравствуйте!", "ALTERNATIVE_STATUS_FINAL").to_string())
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = gw
        .request(
            "yandexgpt-lite",
            vec![Message::system("Отвечай кратко."), Message::user("Привет")],
        )
        .with_option("temperature", 0.3);
    assert_eq!(gw.chat(&request).await.unwrap(), "Здравствуйте!");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_cumulative_stream_becomes_deltas() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", COMPLETION_PATH)
        .match_body(Matcher::PartialJson(json!({"completionOptions": {"stream": true}})))
        .with_status(200)
        .with_body(ndjson(&[
            alternative("Здрав", "ALTERNATIVE_STATUS_PARTIAL"),
            alternative("Здравствуй", "ALTERNATIVE_STATUS_PARTIAL"),
            alternative("Здравствуйте!", "ALTERNATIVE_STATUS_FINAL"),
        ]))
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = gw.request("yandexgpt-lite", vec![Message::user("Привет")]);
    let events: Vec<_> = gw.chat_stream(&request).await.unwrap().collect().await;
    assert_eq!(
        events,
        vec![
            StreamEvent::delta("Здрав"),
            StreamEvent::delta("ствуй"),
            StreamEvent::delta("те!"),
            StreamEvent::Completed,
        ]
    );
}

#[tokio::test]
async fn test_content_filter_keeps_chat_and_stream_in_parity() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", COMPLETION_PATH)
        .match_body(Matcher::PartialJson(json!({"completionOptions": {"stream": false}})))
        .with_status(200)
        .with_body(
            alternative("Я не могу обсуждать эту тему", "ALTERNATIVE_STATUS_CONTENT_FILTER")
                .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", COMPLETION_PATH)
        .match_body(Matcher::PartialJson(json!({"completionOptions": {"stream": true}})))
        .with_status(200)
        .with_body(ndjson(&[
            alternative("Я", "ALTERNATIVE_STATUS_PARTIAL"),
            alternative("Я не могу обсуждать эту тему", "ALTERNATIVE_STATUS_CONTENT_FILTER"),
        ]))
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = gw.request("yandexgpt-lite", vec![Message::user("?")]);
    let full = gw.chat(&request).await.unwrap();
    let events: Vec<_> = gw.chat_stream(&request).await.unwrap().collect().await;
    assert_eq!(
        events,
        vec![
            StreamEvent::delta("Я"),
            StreamEvent::delta(" не могу обсуждать эту тему"),
            StreamEvent::Completed,
        ]
    );
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Delta { text } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, full);
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", COMPLETION_PATH)
        .with_status(401)
        .with_body(r#"{"error":{"grpcCode":16,"httpCode":401,"message":"Unknown api key","httpStatus":"Unauthorized"}}"#)
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = gw.request("yandexgpt-lite", vec![Message::user("hi")]);
    let err = gw.chat(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.to_string().contains("Unknown api key"));

    let mut server = Server::new_async().await;
    server
        .mock("POST", COMPLETION_PATH)
        .with_status(429)
        .with_body(r#"{"error":{"grpcCode":8,"httpCode":429,"message":"ai.textGenerationCompletionSessionsCount.count gauge quota limit exceed","httpStatus":"Too Many Requests"}}"#)
        .create_async()
        .await;
    let gw = gateway(&server);
    let err = gw.chat_stream(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimit);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_recognition_query_and_result() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/speech/v1/stt:recognize")
        .match_header("authorization", "Api-Key AQVN-test")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("lang".into(), "ru-RU".into()),
            Matcher::UrlEncoded("topic".into(), "general".into()),
            Matcher::UrlEncoded("folderId".into(), "b1gfolder".into()),
        ]))
        .match_body("OggS-voice")
        .with_status(200)
        .with_body(r#"{"result":"привет мир"}"#)
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = TranscriptionRequest::new(
        "general",
        AudioSource::buffer(b"OggS-voice".to_vec(), Some("voice.ogg".into())),
    );
    assert_eq!(gw.transcribe(&request).await.unwrap(), "привет мир");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_recognition_error_code() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/speech/v1/stt:recognize")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"error_code":"UNAUTHENTICATED","error_message":"api key is invalid"}"#)
        .create_async()
        .await;

    let gw = gateway(&server);
    let request = TranscriptionRequest::new(
        "general",
        AudioSource::buffer(vec![0u8; 16], Some("voice.ogg".into())),
    );
    let err = gw.transcribe(&request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
    assert!(err.to_string().contains("api key is invalid"));
}

#[tokio::test]
async fn test_image_operation_is_polled_until_done() {
    let mut server = Server::new_async().await;
    let png = b"\x89PNG\r\n\x1a\nyandex-art".to_vec();
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let start = server
        .mock("POST", "/foundationModels/v1/imageGenerationAsync")
        .match_body(Matcher::PartialJson(json!({
            "modelUri": "art://b1gfolder/yandex-art/latest",
            "messages": [{"weight": "1", "text": "рыжий кот"}]
        })))
        .with_status(200)
        .with_body(r#"{"id":"fbveu1sntj","done":false}"#)
        .expect(2)
        .create_async()
        .await;
    let poll = server
        .mock("GET", "/operations/fbveu1sntj")
        .match_header("authorization", "Api-Key AQVN-test")
        .with_status(200)
        .with_body(json!({"id": "fbveu1sntj", "done": true, "response": {"image": encoded}}).to_string())
        .expect(2)
        .create_async()
        .await;

    let gw = gateway(&server);
    let images = gw
        .generate_image(&ImageRequest::new("yandex-art", "рыжий кот").count(2))
        .await
        .unwrap();
    assert_eq!(images.len(), 2);
    for (i, image) in images.iter().enumerate() {
        let file = image.as_stored().unwrap();
        assert_eq!(
            file.path.file_name().unwrap().to_string_lossy(),
            format!("image_{i}.png")
        );
        assert_eq!(tokio::fs::read(&file.path).await.unwrap(), png);
    }
    start.assert_async().await;
    poll.assert_async().await;
}

#[tokio::test]
async fn test_failed_image_operation_is_an_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/foundationModels/v1/imageGenerationAsync")
        .with_status(200)
        .with_body(r#"{"id":"op1","done":false}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/operations/op1")
        .with_status(200)
        .with_body(r#"{"id":"op1","done":true,"error":{"code":"RESOURCE_EXHAUSTED","message":"quota"}}"#)
        .create_async()
        .await;

    let gw = gateway(&server);
    let err = gw
        .generate_image(&ImageRequest::new("yandex-art", "cat").as_bytes())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RateLimit);
}

#[tokio::test]
async fn test_speech_is_not_offered() {
    let server = Server::new_async().await;
    let gw = gateway(&server);
    let err = gw
        .synthesize_speech(&SpeechRequest::new("yandexgpt-lite", "привет"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(gw.adapter("yandex").unwrap().speech().is_none());
    assert!(gw
        .adapter("yandex")
        .unwrap()
        .capabilities()
        .contains(&Capability::GenerateImage));
    assert!(gw.adapter("yandex").unwrap().structured().is_none());
}

#[test]
fn test_missing_folder_is_configuration_error() {
    let err = YandexAdapter::builder()
        .api_key("k")
        .folder_id("  ")
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

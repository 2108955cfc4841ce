//! Streaming pipeline properties: ordering, terminal uniqueness, refusal
//! interleaving, incremental forwarding and wire lines.

use ai_gateway::pipeline::{scripted, Decoder, Frame, SseDecoder, StreamPipeline};
use ai_gateway::types::ProviderChunk;
use ai_gateway::{Error, ErrorKind, ProviderErrorKind, StreamEvent};
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use std::time::Duration;

fn text(s: &str) -> ai_gateway::Result<ProviderChunk> {
    Ok(ProviderChunk::Text(s.to_string()))
}

fn assert_single_terminal(events: &[StreamEvent]) {
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "{events:?}");
    assert!(events.last().map(|e| e.is_terminal()).unwrap_or(false));
}

#[tokio::test]
async fn test_scenario_deltas_then_completed() {
    let events: Vec<_> = StreamPipeline::new()
        .run(
            "double",
            scripted(vec![text("a"), text("b"), Ok(ProviderChunk::Finished)]),
        )
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::delta("a"),
            StreamEvent::delta("b"),
            StreamEvent::Completed
        ]
    );

    let aggregate = StreamPipeline::new()
        .run(
            "double",
            scripted(vec![text("a"), text("b"), Ok(ProviderChunk::Finished)]),
        )
        .collect_text()
        .await
        .unwrap();
    assert_eq!(aggregate, "ab");
}

#[tokio::test]
async fn test_terminal_uniqueness_across_scripts() {
    let scripts: Vec<Vec<ai_gateway::Result<ProviderChunk>>> = vec![
        vec![],
        vec![text("x")],
        vec![Ok(ProviderChunk::Finished)],
        vec![text("x"), Ok(ProviderChunk::Finished), text("late")],
        vec![text("x"), Ok(ProviderChunk::Finished), Ok(ProviderChunk::Finished)],
        vec![
            text("x"),
            Err(Error::provider("p", ProviderErrorKind::Upstream, "boom")),
            text("y"),
        ],
        vec![Ok(ProviderChunk::Refusal("no".into())), text("x")],
    ];
    for script in scripts {
        let events: Vec<_> = StreamPipeline::new().run("p", scripted(script)).collect().await;
        assert_single_terminal(&events);
    }
}

#[tokio::test]
async fn test_refusal_interleaves_and_is_not_terminal() {
    let events: Vec<_> = StreamPipeline::new()
        .run(
            "p",
            scripted(vec![
                text("I "),
                Ok(ProviderChunk::Refusal("can't help".into())),
                text("sorry"),
                Ok(ProviderChunk::Finished),
            ]),
        )
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            StreamEvent::delta("I "),
            StreamEvent::refusal("can't help"),
            StreamEvent::delta("sorry"),
            StreamEvent::Completed,
        ]
    );
}

#[tokio::test]
async fn test_chunk_after_finish_is_protocol_violation() {
    let events: Vec<_> = StreamPipeline::new()
        .run(
            "p",
            scripted(vec![text("a"), Ok(ProviderChunk::Finished), text("b")]),
        )
        .collect()
        .await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], StreamEvent::delta("a"));
    assert!(matches!(
        events[1],
        StreamEvent::Error {
            kind: ErrorKind::ProtocolViolation,
            ..
        }
    ));
}

#[tokio::test]
async fn test_first_event_arrives_before_stream_ends() {
    let (tx, rx) = mpsc::unbounded::<ai_gateway::Result<ProviderChunk>>();
    let mut events = StreamPipeline::new().run("p", Box::pin(rx));

    tx.unbounded_send(text("first")).unwrap();
    let first = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("first event forwarded without waiting for the end");
    assert_eq!(first, Some(StreamEvent::delta("first")));

    tx.unbounded_send(Ok(ProviderChunk::Finished)).unwrap();
    drop(tx);
    assert_eq!(events.next().await, Some(StreamEvent::Completed));
    assert_eq!(events.next().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_surfaces_timeout_error() {
    let chunks = scripted(vec![text("a")]).chain(futures::stream::pending());
    let events: Vec<_> = StreamPipeline::new()
        .with_idle_timeout(Duration::from_secs(5))
        .run("slow", Box::pin(chunks))
        .collect()
        .await;
    assert_eq!(events[0], StreamEvent::delta("a"));
    assert!(matches!(
        events[1],
        StreamEvent::Error {
            kind: ErrorKind::Timeout,
            ..
        }
    ));
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn test_wire_lines_vocabulary() {
    let lines: Vec<String> = StreamPipeline::new()
        .run(
            "p",
            scripted(vec![
                text("hi"),
                Ok(ProviderChunk::Refusal("no".into())),
                Ok(ProviderChunk::Finished),
            ]),
        )
        .wire_lines()
        .collect()
        .await;
    assert_eq!(
        lines,
        vec![
            r#"{"delta":"hi"}"#.to_string(),
            r#"{"refusal":"no"}"#.to_string(),
            r#"{"event":"completed"}"#.to_string(),
        ]
    );

    let lines: Vec<String> = StreamPipeline::new()
        .run(
            "p",
            scripted(vec![
                text("hi"),
                Err(Error::provider("p", ProviderErrorKind::RateLimit, "slow down")),
            ]),
        )
        .wire_lines()
        .collect()
        .await;
    assert_eq!(lines, vec![r#"{"delta":"hi"}"#.to_string()]);
}

#[tokio::test]
async fn test_sse_body_through_pipeline() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let input = futures::stream::iter(
        body.as_bytes()
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect::<Vec<_>>(),
    );
    let chunks = SseDecoder::new()
        .decode(Box::pin(input))
        .filter_map(|frame| async move {
            match frame {
                Ok(Frame::Data(v)) => v
                    .pointer("/choices/0/delta/content")
                    .and_then(|c| c.as_str())
                    .map(|s| Ok(ProviderChunk::Text(s.to_string()))),
                Ok(Frame::Done) => Some(Ok(ProviderChunk::Finished)),
                Err(e) => Some(Err(e)),
            }
        });
    let text = StreamPipeline::new()
        .run("sse", Box::pin(chunks))
        .collect_text()
        .await
        .unwrap();
    assert_eq!(text, "Hello");
}

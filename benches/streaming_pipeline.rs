//! Benchmarks for the streaming pipeline
//!
//! This benchmark measures:
//! - SSE decoding of chunked response bodies
//! - Normalization of adapter chunks into stream events
//! - Wire line rendering

use ai_gateway::pipeline::{self, Decoder, Frame, SseDecoder, StreamPipeline};
use ai_gateway::types::ProviderChunk;
use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::StreamExt;

/// Sample SSE frames (OpenAI format)
const SSE_FRAMES: &[&str] = &[
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4.1-nano","choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4.1-nano","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4.1-nano","choices":[{"index":0,"delta":{"content":" there"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4.1-nano","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":null}]}"#,
    r#"data: {"id":"chatcmpl-123","object":"chat.completion.chunk","model":"gpt-4.1-nano","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
    "data: [DONE]",
];

fn sse_body() -> String {
    let mut body = SSE_FRAMES.join("\n\n");
    body.push_str("\n\n");
    body
}

/// Splits a body into fixed-size network chunks.
fn chunked(body: &str, size: usize) -> Vec<ai_gateway::Result<Bytes>> {
    body.as_bytes()
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

fn bench_sse_decoding(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = sse_body();
    let mut group = c.benchmark_group("sse_decoding");
    group.throughput(Throughput::Bytes(body.len() as u64));

    for size in [16usize, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk_size", size), &size, |b, &size| {
            b.to_async(&rt).iter(|| async {
                let input = Box::pin(futures::stream::iter(chunked(&body, size)));
                let frames: Vec<_> = SseDecoder::new().decode(input).collect().await;
                black_box(frames)
            })
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("normalize");

    for n in [10usize, 1000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("deltas", n), &n, |b, &n| {
            b.to_async(&rt).iter(|| async move {
                let mut script: Vec<_> = (0..n)
                    .map(|i| Ok(ProviderChunk::Text(format!("tok{i} "))))
                    .collect();
                script.push(Ok(ProviderChunk::Finished));
                let text = StreamPipeline::new()
                    .run("bench", pipeline::scripted(script))
                    .collect_text()
                    .await
                    .unwrap();
                black_box(text)
            })
        });
    }
    group.finish();
}

fn bench_end_to_end(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let body = sse_body();
    let mut group = c.benchmark_group("decode_normalize_wire");
    group.throughput(Throughput::Bytes(body.len() as u64));

    group.bench_function("openai_frames", |b| {
        b.to_async(&rt).iter(|| async {
            let input = Box::pin(futures::stream::iter(chunked(&body, 64)));
            let chunks = SseDecoder::new().decode(input).filter_map(|frame| async move {
                match frame {
                    Ok(Frame::Data(v)) => v
                        .pointer("/choices/0/delta/content")
                        .and_then(|c| c.as_str())
                        .filter(|s| !s.is_empty())
                        .map(|s| Ok(ProviderChunk::Text(s.to_string()))),
                    Ok(Frame::Done) => Some(Ok(ProviderChunk::Finished)),
                    Err(e) => Some(Err(e)),
                }
            });
            let lines: Vec<String> = StreamPipeline::new()
                .run("bench", Box::pin(chunks))
                .wire_lines()
                .collect()
                .await;
            black_box(lines)
        })
    });
    group.finish();
}

criterion_group!(benches, bench_sse_decoding, bench_normalize, bench_end_to_end);
criterion_main!(benches);

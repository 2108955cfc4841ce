//! ai-gateway CLI — 通过网关调用对话、流式对话、语音与图像能力的命令行工具
//!
//! Usage:
//!   ai-gateway-cli chat <model> <prompt...>          Complete text
//!   ai-gateway-cli stream <model> <prompt...>        Stream as wire lines
//!   ai-gateway-cli transcribe <model> <file>         Speech to text
//!   ai-gateway-cli speak <model> <text...>           Text to speech file
//!   ai-gateway-cli image <model> <prompt...>         Generate images
//!   ai-gateway-cli tokens <model> <text...>          Count tokens
//!   ai-gateway-cli routes                            List configured routes

use ai_gateway::types::AudioSource;
use ai_gateway::{
    BinaryOutput, Gateway, GatewayConfig, ImageRequest, Message, SpeechRequest,
    TranscriptionRequest,
};
use anyhow::{anyhow, bail, Context};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (config_path, args) = split_config_flag(args);
    let Some(command) = args.first().cloned() else {
        print_usage();
        std::process::exit(1);
    };

    let result = match command.as_str() {
        "version" | "--version" | "-V" => {
            println!("ai-gateway-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        _ => run(&command, &args[1..], config_path).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"ai-gateway-cli: capability gateway command line

USAGE:
    ai-gateway-cli [--config <file>] <COMMAND> [ARGS]

COMMANDS:
    chat <model> <prompt...>            Complete text
    stream <model> <prompt...>          Stream a reply as {{"delta": ...}} lines
    transcribe <model> <file>           Transcribe an audio file
    speak <model> <text...>             Synthesize speech into the audio directory
    image <model> [--count N] <prompt>  Generate images into the image directory
    tokens <model> <text...>            Count prompt tokens for a model
    routes                              List configured routes
    version                             Show version information
    help                                Show this help message

ENVIRONMENT:
    AI_GATEWAY_CONFIG                   Config file used when --config is absent
    OPENAI_API_KEY, YANDEX_API_KEY, YANDEX_FOLDER_ID
    RUST_LOG                            Log filter (default: warn)"#
    );
}

fn split_config_flag(args: Vec<String>) -> (Option<String>, Vec<String>) {
    let mut config = std::env::var("AI_GATEWAY_CONFIG").ok();
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next();
        } else {
            rest.push(arg);
        }
    }
    (config, rest)
}

async fn load_config(path: Option<String>) -> anyhow::Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(&path)
            .await
            .with_context(|| format!("loading {path}")),
        None => Ok(GatewayConfig::from_env()?),
    }
}

async fn run(command: &str, args: &[String], config_path: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    let gateway = Gateway::from_config(&config)?;

    match command {
        "chat" => {
            let (model, prompt) = model_and_text(args)?;
            let request = gateway.request(&model, vec![Message::user(prompt)]);
            println!("{}", gateway.chat(&request).await?);
        }
        "stream" => {
            let (model, prompt) = model_and_text(args)?;
            let request = gateway.request(&model, vec![Message::user(prompt)]);
            let events = gateway.chat_stream(&request).await?;
            let mut lines = Box::pin(events.wire_lines());
            while let Some(line) = lines.next().await {
                println!("{line}");
            }
        }
        "transcribe" => {
            let [model, file] = args else {
                bail!("usage: transcribe <model> <file>");
            };
            let request = TranscriptionRequest::new(model.as_str(), AudioSource::path(file));
            println!("{}", gateway.transcribe(&request).await?);
        }
        "speak" => {
            let (model, text) = model_and_text(args)?;
            let output = gateway
                .synthesize_speech(&SpeechRequest::new(model, text))
                .await?;
            print_output(&output);
        }
        "image" => {
            let (count, rest) = take_count(args)?;
            let (model, prompt) = model_and_text(&rest)?;
            let outputs = gateway
                .generate_image(&ImageRequest::new(model, prompt).count(count))
                .await?;
            outputs.iter().for_each(print_output);
        }
        "tokens" => {
            let (model, text) = model_and_text(args)?;
            let count = gateway.accountant().count_tokens(&text, &model)?;
            println!("{count}");
        }
        "routes" => {
            for route in gateway.routes() {
                let limit = route
                    .max_prompt_tokens
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "none".to_string());
                let capabilities = gateway
                    .adapter(&route.provider)
                    .map(|a| {
                        a.capabilities()
                            .iter()
                            .map(|c| c.as_str())
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .unwrap_or_default();
                println!(
                    "{:<28} {:<8} max_prompt_tokens={:<6} {}",
                    route.model, route.provider, limit, capabilities
                );
            }
        }
        other => {
            print_usage();
            bail!("unknown command: {other}");
        }
    }
    Ok(())
}

fn model_and_text(args: &[String]) -> anyhow::Result<(String, String)> {
    let (model, words) = args
        .split_first()
        .ok_or_else(|| anyhow!("missing <model>"))?;
    if words.is_empty() {
        bail!("missing text after <model>");
    }
    Ok((model.clone(), words.join(" ")))
}

fn take_count(args: &[String]) -> anyhow::Result<(usize, Vec<String>)> {
    let mut count = 1;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--count" {
            let value = iter.next().ok_or_else(|| anyhow!("--count needs a value"))?;
            count = value
                .parse()
                .with_context(|| format!("invalid --count '{value}'"))?;
        } else {
            rest.push(arg.clone());
        }
    }
    Ok((count, rest))
}

fn print_output(output: &BinaryOutput) {
    match output {
        BinaryOutput::Stored(file) => println!(
            "{} ({} bytes, {})",
            file.path.display(),
            file.size_bytes,
            file.media_type
        ),
        BinaryOutput::Bytes(bytes) => println!("<{} bytes>", bytes.len()),
    }
}

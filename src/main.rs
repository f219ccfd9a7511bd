use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use nestwise::config::EngineConfig;
use nestwise::engine::{Engine, TurnReply};
use nestwise::llm::{LlmBackend, LlmConfig, create_embedder, create_provider};
use nestwise::retrieval::{ChunkingConfig, RetrievalIndex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let backend = match std::env::var("NESTWISE_BACKEND").as_deref() {
        Ok("anthropic") => LlmBackend::Anthropic,
        _ => LlmBackend::OpenAi,
    };
    let (key_var, default_model) = match backend {
        LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
        LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
    };
    let api_key = std::env::var(key_var).unwrap_or_else(|_| {
        eprintln!("Error: {key_var} not set");
        std::process::exit(1);
    });
    let model = std::env::var("NESTWISE_MODEL").unwrap_or_else(|_| default_model.to_string());
    let corpus_dir = std::env::var("NESTWISE_CORPUS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./corpus"));

    eprintln!("NestWise v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", model);
    eprintln!("   Corpus: {}", corpus_dir.display());
    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    // Chat provider
    let llm = create_provider(&LlmConfig {
        backend,
        api_key: secrecy::SecretString::from(api_key),
        model,
    })?;

    // Embeddings always come from OpenAI; the corpus index needs them even
    // when chat runs on another backend.
    let embed_key = std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| {
        eprintln!("Error: OPENAI_API_KEY not set (required for embeddings)");
        std::process::exit(1);
    });
    let embed_model = std::env::var("NESTWISE_EMBED_MODEL")
        .unwrap_or_else(|_| "text-embedding-3-small".to_string());
    let embedder = create_embedder(&LlmConfig {
        backend: LlmBackend::OpenAi,
        api_key: secrecy::SecretString::from(embed_key),
        model: embed_model,
    })?;

    // The index is built once and shared read-only across sessions.
    let index = Arc::new(
        RetrievalIndex::build(&corpus_dir, ChunkingConfig::default(), embedder).await?,
    );
    eprintln!("   Indexed chunks: {}\n", index.len());

    let engine = Engine::new(EngineConfig::from_env(), llm, index);
    let session = engine.create_session().await;

    println!("\n{}\n", engine.greeting());
    eprint!("> ");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            eprint!("> ");
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        match engine.advance(session, line).await {
            Ok(output) => match output.reply {
                TurnReply::Question(text) => println!("\n{}\n", text),
                TurnReply::Plan(plan) => {
                    println!("\n{}\n", serde_json::to_string_pretty(&plan)?)
                }
            },
            Err(e) if e.is_turn_fatal() => {
                tracing::error!("Turn failed: {}", e);
                println!("\nSomething went wrong on my side - please try that again.\n");
            }
            Err(e) => return Err(e.into()),
        }
        eprint!("> ");
    }

    Ok(())
}

use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::indexer::VectorIndex;
use crate::llm::build_chat_model;
use crate::rag::{Answer, AnswerPipeline};
use crate::server;

/// Create the Ollama embedder and report whether the server and model are reachable
async fn connect_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedder =
        OllamaEmbedder::new(config).context("Failed to initialize the embedding client")?;

    let checker = embedder.clone();
    match tokio::task::spawn_blocking(move || checker.health_check()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Embedding server health check failed: {:#}", e),
        Err(e) => warn!("Embedding health check did not finish: {}", e),
    }

    Ok(Arc::new(embedder))
}

/// Build the shared answer pipeline with the configured embedder and chat model
#[inline]
pub async fn build_pipeline(config: Config) -> Result<Arc<AnswerPipeline>> {
    let embedder = connect_embedder(&config).await?;
    let llm = build_chat_model(&config);
    Ok(Arc::new(AnswerPipeline::new(config, embedder, llm)))
}

/// Start the HTTP server and run until Ctrl-C
#[inline]
pub async fn serve(config: Config) -> Result<()> {
    let address = config.bind_address();
    let pipeline = build_pipeline(config).await?;

    if !pipeline.has_llm() {
        info!("Running in retrieval-only mode");
    }
    pipeline.warm_up().await;

    server::serve(pipeline, &address)
        .await
        .with_context(|| format!("HTTP server on {} failed", address))?;
    Ok(())
}

/// Re-index every document in the knowledge base directory
#[inline]
pub async fn rebuild(config: Config) -> Result<()> {
    let embedder = connect_embedder(&config).await?;

    println!(
        "🔄 Rebuilding index from {}",
        style(config.get_base_dir().join(&config.knowledge_base_path).display()).cyan()
    );

    let (index, stats) = VectorIndex::build_and_persist(&config, embedder, None)
        .await
        .context("Index rebuild failed")?;

    if stats.chunks == 0 {
        println!(
            "{}",
            style("⚠️  No supported documents found; the index is empty").yellow()
        );
    } else {
        println!(
            "✅ Indexed {} documents into {} chunks",
            style(stats.documents).green(),
            style(index.count().await?).green()
        );
    }
    println!("   Index location: {}", config.index_path().display());

    Ok(())
}

/// Answer one question on the terminal
#[inline]
pub async fn ask(config: Config, question: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    let answer = pipeline
        .answer_question(question, top_k)
        .await
        .context("Failed to answer the question")?;

    print_answer(&answer);
    Ok(())
}

fn print_answer(answer: &Answer) {
    if answer.retrieved_only {
        println!("{}", style("(retrieval only)").dim());
    }
    println!("{}", answer.answer);

    if answer.sources.is_empty() {
        return;
    }

    println!();
    println!("{}", style(format!("📚 Sources ({})", answer.sources.len())).bold());
    for (position, source) in answer.sources.iter().enumerate() {
        println!(
            "  {}. {} {}",
            position + 1,
            style(&source.filename).cyan(),
            style(&source.source).dim()
        );
    }
}

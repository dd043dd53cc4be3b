mod chat;
mod config;
mod corpus;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use brujula_ai::{
    CosineIndex, OpenAIClient, OpenAIEmbedding, RetrievalTool, ToolRegistry, TurnOrchestrator,
};
use brujula_runtime::SessionRuntime;
use clap::Parser;
use config::CliConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brujula", version, about = "Asistente conversacional de políticas internas")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "brujula.toml")]
    config: PathBuf,

    /// OpenAI API key (overrides the config file)
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("brujula=info")),
        )
        .with_target(false)
        .init();

    let config = CliConfig::load(&cli.config);
    let api_key = cli
        .api_key
        .or_else(|| config.openai.api_key.clone())
        .context("no OpenAI API key: set OPENAI_API_KEY or [openai].api_key in the config")?;

    let mut embedding = OpenAIEmbedding::new(&api_key).with_model(
        &config.openai.embedding_model,
        config.openai.embedding_dimension,
    );
    let mut llm = OpenAIClient::new(&api_key).with_model(&config.openai.model);
    if let Some(base_url) = &config.openai.base_url {
        embedding = embedding.with_base_url(base_url);
        llm = llm.with_base_url(base_url);
    }

    let documents = corpus::load(&config.corpus.path)?;
    tracing::info!(chunks = documents.len(), "indexing policy corpus");
    let index = CosineIndex::build(Arc::new(embedding), documents)
        .await?
        .with_top_k(config.corpus.top_k);

    let mut tools = ToolRegistry::new();
    tools.register(RetrievalTool::new(Arc::new(index)));

    let orchestrator = TurnOrchestrator::new(Arc::new(llm), Arc::new(tools))?;
    let mut runtime = SessionRuntime::new(orchestrator);
    if let Some(starters) = config.starters.clone() {
        runtime = runtime.with_starters(starters);
    }

    chat::run(runtime).await
}

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use concierge_config::ServiceConfig;
use concierge_llm::{Message, OpenAi};
use concierge_server::AppState;
use concierge_support::{
  Capabilities, ChatData, EmbeddingRetriever, FewShotIndex, JsonOrderBook, start_event,
  support_workflow,
};

/// Concierge - a customer-support chat service
#[derive(Parser)]
#[command(name = "concierge")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to a JSON config file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Override the listen host
  #[arg(long, global = true)]
  host: Option<String>,

  /// Override the listen port
  #[arg(long, global = true)]
  port: Option<u16>,

  /// Override the per-run timeout, in seconds
  #[arg(long, global = true)]
  timeout: Option<u64>,

  /// Emit logs as JSON
  #[arg(long, global = true)]
  log_json: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve the chat endpoint over HTTP
  Serve,

  /// Ask a single question and stream the answer to stdout
  ///
  /// Earlier conversation can be piped on stdin as `{"messages": [...]}`.
  Ask {
    /// The customer's message
    message: String,
  },

  /// Print the pipeline's step graph as a Mermaid flowchart
  Graph,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  // A missing .env file is fine.
  let _ = dotenvy::dotenv();
  init_tracing(cli.log_json);

  let mut config =
    ServiceConfig::load_or_default(cli.config.as_deref()).context("failed to load config")?;
  if let Some(host) = cli.host {
    config.server.host = host;
  }
  if let Some(port) = cli.port {
    config.server.port = port;
  }
  if let Some(timeout) = cli.timeout {
    config.workflow.timeout_secs = timeout;
  }
  config.validate().context("invalid config")?;

  match cli.command {
    Some(Commands::Serve) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(serve(config))?;
    }
    Some(Commands::Ask { message }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(ask(config, message))?;
    }
    Some(Commands::Graph) => {
      let dispatcher = support_workflow(offline_capabilities(&config))?;
      println!("{}", dispatcher.graph().to_mermaid());
    }
    None => {
      println!("concierge - use --help to see available commands");
    }
  }

  Ok(())
}

fn init_tracing(json: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("concierge=info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr);

  if json {
    builder.json().init();
  } else {
    builder.init();
  }
}

fn openai_client(config: &ServiceConfig) -> Result<OpenAi> {
  let mut client = OpenAi::from_env(&config.model.chat_model)
    .context("OPENAI_API_KEY must be set")?
    .with_embedding_model(&config.model.embedding_model);
  if let Some(base_url) = &config.model.base_url {
    client = client.with_base_url(base_url);
  }
  Ok(client)
}

/// Capabilities that never touch the network or disk, for inspecting the graph.
fn offline_capabilities(config: &ServiceConfig) -> Capabilities {
  let client = Arc::new(
    OpenAi::new(String::new(), &config.model.chat_model)
      .with_embedding_model(&config.model.embedding_model),
  );
  let index = FewShotIndex::new(config.model.embedding_model.clone(), Vec::new());

  Capabilities {
    extractor: client.clone(),
    orders: Arc::new(JsonOrderBook::default()),
    examples: Arc::new(EmbeddingRetriever::new(
      Arc::new(index),
      client.clone(),
      config.few_shot.top_k,
    )),
    model: client,
    score_threshold: config.few_shot.score_threshold,
  }
}

async fn serve(config: ServiceConfig) -> Result<()> {
  let capabilities = Capabilities::from_config(&config, openai_client(&config)?).await?;
  let dispatcher = support_workflow(capabilities).context("failed to build support workflow")?;

  let addr: SocketAddr = config
    .bind_address()
    .parse()
    .with_context(|| format!("invalid bind address: {}", config.bind_address()))?;
  let state = AppState::new(
    dispatcher,
    Duration::from_secs(config.workflow.timeout_secs),
  );

  concierge_server::serve(addr, state).await
}

async fn ask(config: ServiceConfig, message: String) -> Result<()> {
  let mut chat = read_history_from_stdin()?;
  chat.messages.push(Message::user(message));

  let capabilities = Capabilities::from_config(&config, openai_client(&config)?).await?;
  let dispatcher = support_workflow(capabilities).context("failed to build support workflow")?;

  let mut handle = dispatcher.start(
    start_event(&chat)?,
    Duration::from_secs(config.workflow.timeout_secs),
  )?;

  let cancel = handle.cancellation_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      cancel.cancel();
    }
  });

  let mut tokens = handle
    .take_stream()
    .context("run has no token stream")?;
  let mut stdout = io::stdout();
  while let Some(token) = tokens.next().await {
    write!(stdout, "{}", token.token)?;
    stdout.flush()?;
  }
  writeln!(stdout)?;

  let result = handle.wait().await.context("run failed")?;
  eprintln!("{}", serde_json::to_string(&result)?);

  Ok(())
}

fn read_history_from_stdin() -> Result<ChatData> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(ChatData::new(Vec::new()));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read history from stdin")?;

  if input.trim().is_empty() {
    return Ok(ChatData::new(Vec::new()));
  }

  let chat: ChatData =
    serde_json::from_str(&input).context("failed to parse history JSON from stdin")?;
  if chat.is_last_message_from_user() {
    bail!("piped history must not end with a user message; pass it as the argument instead");
  }
  Ok(chat)
}

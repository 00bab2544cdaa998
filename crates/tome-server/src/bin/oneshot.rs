//! tome-oneshot binary — the request-scoped hosting shape.
//!
//! Reads one generation request as JSON from stdin, writes push-protocol
//! frames to stdout, and exits. Admission failures print a single JSON
//! error document and exit non-zero. Runs the identical orchestrator and
//! codec as the persistent server; only the sink differs.
//!
//! ```text
//! echo '{"input":"A floating city","kind":"seed"}' \
//!   | tome-oneshot --config config.toml --ip 203.0.113.9
//! ```

use std::{
  io::{Read as _, Write as _},
  path::PathBuf,
};

use anyhow::Context as _;
use clap::Parser;
use tome_core::{
  event::{ErrorBody, StreamEvent},
  request::{Caller, GenerationRequest, SectionRequest},
  sink::EventSink,
};
use tome_server::{ServerConfig, bootstrap};
use tome_wire::encode_event;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tome one-shot generation host")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Treat stdin as a section request instead of a page request.
  #[arg(long)]
  section: bool,

  /// Verified caller identity, if the invoking gateway resolved one.
  #[arg(long)]
  identity: Option<String>,

  /// Caller IP as seen by the invoking gateway.
  #[arg(long, default_value = "unknown")]
  ip: String,
}

/// Writes frames to stdout, flushing each one immediately.
struct StdoutSink {
  out: std::io::Stdout,
}

impl EventSink for StdoutSink {
  async fn send(&mut self, event: StreamEvent) -> bool {
    let frame = match encode_event(&event) {
      Ok(frame) => frame,
      Err(e) => {
        tracing::error!(error = %e, "dropping unencodable event");
        return true;
      }
    };
    self.out.write_all(frame.as_bytes()).and_then(|()| self.out.flush()).is_ok()
  }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Frames own stdout; logs go to stderr.
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TOME"))
    .build()
    .context("failed to read config file")?;
  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let state = bootstrap(&server_cfg).await?;

  let mut input = String::new();
  std::io::stdin()
    .read_to_string(&mut input)
    .context("failed to read request from stdin")?;

  let caller = Caller { identity: cli.identity, ip: cli.ip };
  let mut sink = StdoutSink { out: std::io::stdout() };

  if cli.section {
    let req: SectionRequest =
      serde_json::from_str(&input).context("invalid section request")?;
    match state.orch.admit_section(&caller, &req).await {
      Ok(ticket) => state.orch.stream_section(ticket, req, &mut sink).await,
      Err(e) => reject(&e),
    }
  } else {
    let req: GenerationRequest =
      serde_json::from_str(&input).context("invalid generation request")?;
    match state.orch.admit_page(&caller, &req).await {
      Ok(ticket) => state.orch.stream_page(ticket, req, &mut sink).await,
      Err(e) => reject(&e),
    }
  }

  Ok(())
}

/// Print the non-streaming error document and exit non-zero.
fn reject(error: &tome_core::Error) -> ! {
  let body = serde_json::json!({ "error": ErrorBody::from_error(error) });
  println!("{body}");
  std::process::exit(1);
}

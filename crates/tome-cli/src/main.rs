//! `tome` — terminal client for the Tome generation API.
//!
//! # Usage
//!
//! ```
//! tome --url http://localhost:8484 page "A floating city above crystal clouds"
//! tome section Climate --page Aethros --content-file aethros.txt
//! tome usage
//! ```

mod client;

use std::io::Write as _;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client::{ApiClient, ApiConfig};
use serde::Deserialize;
use tome_core::{
  event::StreamEvent,
  page::PageSnapshot,
  request::{GenerationRequest, PageKind, SectionRequest},
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tome", about = "Terminal client for the Tome API")]
struct Args {
  /// Path to a TOML config file (url, token).
  #[arg(short, long, value_name = "FILE")]
  config: Option<std::path::PathBuf>,

  /// Base URL of the Tome server (default: http://localhost:8484).
  #[arg(long, env = "TOME_URL")]
  url: Option<String>,

  /// Bearer token identifying the caller.
  #[arg(long, env = "TOME_TOKEN")]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
  Seed,
  Term,
}

impl From<KindArg> for PageKind {
  fn from(kind: KindArg) -> Self {
    match kind {
      KindArg::Seed => PageKind::Seed,
      KindArg::Term => PageKind::Term,
    }
  }
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate a full encyclopedia page and print it as it streams.
  Page {
    /// Seed prompt or cross-referenced term.
    input: String,
    #[arg(long, value_enum, default_value = "seed")]
    kind: KindArg,
    /// Extra context forwarded to the generator.
    #[arg(long)]
    context: Option<String>,
  },
  /// Generate one section of an existing page.
  Section {
    /// Section title, e.g. "Climate".
    title: String,
    /// Title of the page the section belongs to.
    #[arg(long)]
    page: String,
    /// File holding the page's current prose.
    #[arg(long, value_name = "FILE")]
    content_file: std::path::PathBuf,
  },
  /// Show today's free-tier usage.
  Usage,
  /// Store your own upstream API key (lifts the daily cap).
  SetKey { api_key: String },
  /// Remove your stored upstream API key.
  RemoveKey,
}

// ─── Config file ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
  url:   Option<String>,
  token: Option<String>,
}

fn load_file_config(path: Option<&std::path::Path>) -> Result<FileConfig> {
  let Some(path) = path else { return Ok(FileConfig::default()) };
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("cannot read config {path:?}"))?;
  toml::from_str(&raw).with_context(|| format!("cannot parse {path:?}"))
}

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let args = Args::parse();
  let file_cfg = load_file_config(args.config.as_deref())?;

  let client = ApiClient::new(ApiConfig {
    base_url: args
      .url
      .or(file_cfg.url)
      .unwrap_or_else(|| "http://localhost:8484".to_string()),
    token:    args.token.or(file_cfg.token),
  })?;

  match args.command {
    Command::Page { input, kind, context } => {
      let req = GenerationRequest {
        input,
        kind: kind.into(),
        context,
        world: None,
      };
      let terminal =
        client.stream_page(&req, progress_printer()).await?;
      print_terminal(terminal)?;
    }
    Command::Section { title, page, content_file } => {
      let page_content = std::fs::read_to_string(&content_file)
        .with_context(|| format!("cannot read {content_file:?}"))?;
      let req = SectionRequest {
        section_title: title,
        page_title: page,
        page_content,
        world: None,
      };
      let terminal =
        client.stream_section(&req, progress_printer()).await?;
      print_terminal(terminal)?;
    }
    Command::Usage => {
      let usage = client.usage().await?;
      println!(
        "{} of {} generations used today ({} remaining)",
        usage.usage_count, usage.daily_limit, usage.remaining
      );
    }
    Command::SetKey { api_key } => {
      client.set_credential(&api_key).await?;
      println!("key stored; the daily cap no longer applies");
    }
    Command::RemoveKey => {
      client.remove_credential().await?;
      println!("key removed; back on the free tier");
    }
  }

  Ok(())
}

/// Prints each snapshot's newly arrived prose as it streams in.
fn progress_printer() -> impl FnMut(&PageSnapshot) {
  let mut printed = 0usize;
  move |snapshot| {
    if snapshot.content.len() > printed {
      print!("{}", &snapshot.content[printed..]);
      std::io::stdout().flush().ok();
      printed = snapshot.content.len();
    }
  }
}

fn print_terminal(terminal: StreamEvent) -> Result<()> {
  match terminal {
    StreamEvent::Snapshot(snapshot) => {
      // Anything the partials didn't already print, then the summary.
      println!();
      if let Some(categories) = &snapshot.categories {
        println!("\ncategories: {}", categories.join(", "));
      }
      if let Some(facts) = &snapshot.facts {
        for fact in facts {
          println!("{}: {}", fact.name, fact.value);
        }
      }
      match snapshot.usage {
        Some(usage) => println!(
          "\n{} of {} free generations left today",
          usage.remaining, usage.daily_limit
        ),
        None => println!("\nusing your own key; no daily cap"),
      }
      Ok(())
    }
    StreamEvent::Error(envelope) => Err(anyhow::anyhow!(
      "generation failed: {} ({})",
      envelope.error.message,
      envelope.error.code
    )),
  }
}

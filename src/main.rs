use clap::{Parser, Subcommand};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veriloop_rs::*;
use veriloop_rs::llm::{openai::LlmClient, Llm};
use veriloop_rs::serper::{Searcher, Serper};
use veriloop_rs::server::{run_server, Engine};

#[derive(Parser)]
#[command(name="veriloop", version)]
struct Cli {
  #[command(subcommand)]
  cmd: Cmd,
  /// Settings file (TOML); VERILOOP_* env vars override it
  #[arg(long, env="VERILOOP_CONFIG")] config: Option<String>,
  /// Log filter when RUST_LOG is unset
  #[arg(long, default_value="info")] log_level: String,
  /// Emit logs as JSON
  #[arg(long)] json: bool,
}

#[derive(Subcommand)]
enum Cmd {
  /// Check a text and revise it until it passes or the budget runs out
  Verify { #[arg(long)] input_file: String, #[arg(long)] query: Option<String>, #[arg(long)] context_file: Option<String>, #[arg(long)] level: Option<VerificationLevel>, #[arg(long)] max_iterations: Option<u32>, #[arg(long)] pass_threshold: Option<f64>, #[arg(long)] report: bool },
  /// Score a text once without revising it
  Evaluate { #[arg(long)] input_file: String, #[arg(long)] query: Option<String>, #[arg(long)] context_file: Option<String> },
  /// Serve /verify and /evaluate over HTTP
  Serve { #[arg(long)] addr: Option<String> },
}

fn init_tracing(level: &str, json: bool) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
  // logs go to stderr so stdout stays clean JSON
  if json {
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).init();
  } else {
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
  }
}

fn build_engine(settings: &Settings, loop_cfg: LoopConfig) -> Result<Engine> {
  let timeout = Duration::from_secs(settings.collaborator_timeout_secs);
  let checker_llm: Arc<dyn Llm> = Arc::new(
    LlmClient::new(settings.checker_model.clone(), settings.openai_base_url.clone(), settings.openai_api_key.clone(), settings.llm_concurrency)
      .with_temperature(0.0)
      .with_timeout(timeout),
  );
  let reviser_llm: Arc<dyn Llm> = Arc::new(
    LlmClient::new(settings.reviser_model.clone(), settings.openai_base_url.clone(), settings.openai_api_key.clone(), settings.llm_concurrency)
      .with_temperature(0.3)
      .with_timeout(timeout),
  );
  let searcher = match &settings.serper_api_key {
    Some(key) => {
      let s: Arc<dyn Searcher> = Arc::new(Serper::new(key.clone(), settings.serper_qps, settings.search_res_num, timeout.as_millis() as u64)?);
      Some(s)
    }
    None => { tracing::info!("no serper key configured; requests without context go unsearched"); None }
  };
  Ok(Engine {
    checker: Arc::new(LlmChecker::new(checker_llm)),
    reviser: Arc::new(LlmReviser::new(reviser_llm)),
    searcher,
    loop_cfg,
    search_concurrency: 4,
  })
}

fn read_opt(path: Option<&str>) -> Result<Option<String>> {
  path.map(|p| std::fs::read_to_string(p).with_context(|| format!("reading {p}"))).transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(&cli.log_level, cli.json);
  let settings = Settings::load(cli.config.as_deref())?;
  let loop_cfg = settings.loop_config()?;

  match cli.cmd {
    Cmd::Verify { input_file, query, context_file, level, max_iterations, pass_threshold, report } => {
      let text = std::fs::read_to_string(&input_file).with_context(|| format!("reading {input_file}"))?;
      let context = read_opt(context_file.as_deref())?;
      let cfg = level.map(|l| l.loop_config()).unwrap_or(loop_cfg).with_overrides(pass_threshold, max_iterations)?;
      let engine = build_engine(&settings, cfg)?;
      let req = engine.check_request(query, context, vec![]).await;
      let outcome = verify_content(engine.checker.as_ref(), engine.reviser.as_ref(), cfg, &req, text).await;
      if report {
        println!("{}", veriloop_rs::report::improvement_report(&outcome));
      } else {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
      }
    }
    Cmd::Evaluate { input_file, query, context_file } => {
      let text = std::fs::read_to_string(&input_file).with_context(|| format!("reading {input_file}"))?;
      let context = read_opt(context_file.as_deref())?;
      let engine = build_engine(&settings, loop_cfg)?;
      let req = engine.check_request(query, context, vec![]).await;
      let eval = engine.checker.evaluate(&req, &text).await?.validate()?;
      let out = serde_json::json!({
        "faithfulness_score": eval.score,
        "assessment": eval.assessment(),
        "problematic_claims": eval.claims,
      });
      println!("{}", serde_json::to_string_pretty(&out)?);
    }
    Cmd::Serve { addr } => {
      let addr = addr.unwrap_or_else(|| settings.listen_addr.clone());
      let engine = build_engine(&settings, loop_cfg)?;
      run_server(engine, &addr).await?;
    }
  }
  Ok(())
}

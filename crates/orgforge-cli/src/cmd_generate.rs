use anyhow::{Context, Result};
use clap::ValueEnum;
use orgforge_conductor::DatasetSink;
use orgforge_narrative::{AnthropicProvider, OpenAiProvider, TemplateGenerator, TextGenerator};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cmd_config::{self, ConfigArgs};
use crate::sink::JsonDirSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Anthropic Messages API (ANTHROPIC_API_KEY)
    Anthropic,
    /// OpenAI-compatible chat completions (OPENAI_API_KEY, OPENAI_BASE_URL)
    Openai,
    /// Offline templates, no network
    Template,
}

pub struct GenerateParams<'a> {
    pub config: &'a ConfigArgs,
    pub out: &'a Path,
    pub provider: ProviderKind,
    pub model: Option<&'a str>,
    pub force: bool,
}

/// Execute `orgforge generate -c <config> -o <dir>`
pub fn execute(params: &GenerateParams<'_>) -> Result<()> {
    let cfg = cmd_config::load(params.config)?;
    let sink = JsonDirSink::new(params.out).with_overwrite(params.force);
    sink.check_writable()?;
    if params.force {
        // A fresh run log for the fresh dataset.
        let log = params.out.join("events.jsonl");
        if log.exists() {
            std::fs::remove_file(&log).with_context(|| format!("removing {}", log.display()))?;
        }
    }

    let timeout = Duration::from_secs(cfg.generation.call_timeout_sec);
    let generator = build_generator(params.provider, params.model, timeout)?;

    let cancel = CancellationToken::new();

    // Handle Ctrl+C gracefully
    ctrlc_cancel(cancel.clone());

    let rt = tokio::runtime::Runtime::new()?;
    let dataset = rt.block_on(orgforge_conductor::run(
        &cfg,
        generator,
        Some(params.out),
        cancel.clone(),
    ))?;

    sink.write(&dataset)
        .with_context(|| format!("writing dataset to {}", params.out.display()))?;

    let report = &dataset.report;
    println!("{}", report.summary());
    for failed in &report.failed {
        println!("  ✗ {} ({}): {}", failed.event_id, failed.kind, failed.message);
    }
    println!("Dataset written to {}", params.out.display());
    if cancel.is_cancelled() {
        println!("Interrupted; unfinished events are reported as cancelled.");
    }
    Ok(())
}

fn build_generator(
    kind: ProviderKind,
    model: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn TextGenerator>> {
    Ok(match kind {
        ProviderKind::Anthropic => {
            let mut p = AnthropicProvider::from_env(timeout).context("anthropic provider")?;
            if let Some(m) = model {
                p = p.with_model(m);
            }
            Arc::new(p)
        }
        ProviderKind::Openai => {
            let mut p = OpenAiProvider::from_env(timeout).context("openai provider")?;
            if let Some(m) = model {
                p = p.with_model(m);
            }
            Arc::new(p)
        }
        ProviderKind::Template => Arc::new(TemplateGenerator),
    })
}

fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

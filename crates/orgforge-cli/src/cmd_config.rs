use anyhow::Context;
use clap::{Args, Subcommand};
use orgforge_core::config::{load_config, to_yaml, ConfigSource, KeyValueSource, RunConfig, YamlSource};
use std::path::PathBuf;

// ── CLI Schema ──

/// Where a run's configuration comes from.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Config file (repeatable; later files override earlier ones)
    #[arg(short, long = "config", required = true)]
    pub files: Vec<PathBuf>,
    /// Override an option, e.g. `--set seed=7` or `--set generation.concurrency=8`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Load and validate a config, then print it with every default filled in
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

// ── Dispatch ──

pub fn run(cmd: ConfigCmd) -> anyhow::Result<()> {
    match cmd {
        ConfigCmd::Check { config } => check(&config),
    }
}

// ── Command Implementations ──

/// Files in order, then `--set` overrides on top.
pub fn load(args: &ConfigArgs) -> anyhow::Result<RunConfig> {
    let mut layers: Vec<Box<dyn ConfigSource>> = Vec::new();
    for path in &args.files {
        layers.push(Box::new(YamlSource::load(path)?));
    }
    if !args.overrides.is_empty() {
        let pairs = KeyValueSource::parse(args.overrides.iter().map(String::as_str))
            .context("parsing --set overrides")?;
        layers.push(Box::new(pairs));
    }
    let sources: Vec<&dyn ConfigSource> = layers.iter().map(|s| s.as_ref()).collect();
    load_config(&sources).context("invalid configuration")
}

/// `orgforge config check -c <file>`
fn check(args: &ConfigArgs) -> anyhow::Result<()> {
    let config = load(args)?;
    print!("{}", to_yaml(&config)?);
    eprintln!(
        "config ok: {} teams, {} epics, {} events requested",
        config.team_count,
        config.epic_count,
        config.requested_events()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
team_count: 3
team_size_range: "4-6"
role_weights: { engineer: 5, senior_engineer: 2, manager: 1, qa: 1 }
epic_count: 2
story_range: "2-4"
task_range: "1-3"
bug_rate: 0.2
fixversion_count: 2
scenario_mix: { StandupMeeting: 2 }
"#;

    fn write(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn files_layer_then_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "base.yaml", BASE);
        let local = write(dir.path(), "local.yaml", "seed: 5\nepic_count: 3\n");
        let args = ConfigArgs {
            files: vec![base, local],
            overrides: vec!["seed=9".into(), "generation.concurrency=8".into()],
        };
        let cfg = load(&args).unwrap();
        assert_eq!(cfg.seed, 9);
        assert_eq!(cfg.epic_count, 3);
        assert_eq!(cfg.generation.concurrency, 8);
        assert_eq!(cfg.team_count, 3);
    }

    #[test]
    fn missing_required_option_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "partial.yaml", "team_count: 3\n");
        let err = load(&ConfigArgs {
            files: vec![path],
            overrides: vec![],
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("missing required option"), "{err:#}");
    }

    #[test]
    fn bad_override_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "base.yaml", BASE);
        let err = load(&ConfigArgs {
            files: vec![path],
            overrides: vec!["no-equals-sign".into()],
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("--set"), "{err:#}");
    }
}

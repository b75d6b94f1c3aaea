//! Dataset directory layout:
//!
//! ```text
//! out/
//!   config.yaml      normalised config the run used
//!   graph.json       company graph after planning
//!   scenarios.json   planned events
//!   artifacts.jsonl  accepted artifacts (artifacts.json with output_format: json)
//!   report.json      run report
//!   events.jsonl     run log, appended while generating
//! ```

use anyhow::{bail, Context, Result};
use orgforge_conductor::{Dataset, DatasetSink};
use orgforge_core::config::{to_yaml, OutputFormat};
use orgforge_core::{Artifact, CompanyGraph, ScenarioEvent};
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const REPORT_FILE: &str = "report.json";

/// Writes a dataset as JSON files in one directory.
pub struct JsonDirSink {
    dir: PathBuf,
    overwrite: bool,
}

impl JsonDirSink {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Fail early when the directory already holds a finished dataset.
    pub fn check_writable(&self) -> Result<()> {
        if !self.overwrite && self.dir.join(REPORT_FILE).exists() {
            bail!(
                "{} already holds a dataset (use --force to replace it)",
                self.dir.display()
            );
        }
        Ok(())
    }
}

impl DatasetSink for JsonDirSink {
    fn write(&self, dataset: &Dataset) -> Result<()> {
        self.check_writable()?;

        write_atomic(
            &self.dir.join("config.yaml"),
            to_yaml(&dataset.config)?.as_bytes(),
        )?;
        write_json(&self.dir.join("graph.json"), &dataset.graph)?;
        write_json(&self.dir.join("scenarios.json"), &dataset.events)?;
        match dataset.config.output_format {
            OutputFormat::Jsonl => {
                let mut buf = Vec::new();
                for artifact in &dataset.artifacts {
                    serde_json::to_writer(&mut buf, artifact)?;
                    buf.push(b'\n');
                }
                write_atomic(&self.dir.join("artifacts.jsonl"), &buf)?;
            }
            OutputFormat::Json => {
                write_json(&self.dir.join("artifacts.json"), &dataset.artifacts)?;
            }
        }
        // Last, so a present report means a complete dataset.
        write_json(&self.dir.join(REPORT_FILE), &dataset.report)?;
        Ok(())
    }
}

/// The parts of a written dataset that validation needs.
pub struct DatasetFiles {
    pub graph: CompanyGraph,
    pub events: Vec<ScenarioEvent>,
    pub artifacts: Vec<Artifact>,
}

pub fn read_dataset(dir: &Path) -> Result<DatasetFiles> {
    let graph = read_json(&dir.join("graph.json"))?;
    let events = read_json(&dir.join("scenarios.json"))?;
    let jsonl = dir.join("artifacts.jsonl");
    let artifacts = if jsonl.exists() {
        let content =
            fs::read_to_string(&jsonl).with_context(|| format!("reading {}", jsonl.display()))?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("{}:{}: bad artifact", jsonl.display(), i + 1))
            })
            .collect::<Result<Vec<Artifact>>>()?
    } else {
        read_json(&dir.join("artifacts.json"))?
    };
    Ok(DatasetFiles {
        graph,
        events,
        artifacts,
    })
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data)
}

/// Write to a temp file in the same directory, then rename over `path`.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("no parent dir for {}", path.display()))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

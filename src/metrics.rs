// src/metrics.rs
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::ingest::ensure_metrics_described;

/// Prometheus recorder whose exposition is dumped to a textfile after each
/// run (node-exporter textfile collector).
pub struct Metrics {
    handle: PrometheusHandle,
    textfile: PathBuf,
}

impl Metrics {
    /// Installs the global recorder. Fails if one is already installed.
    pub fn init(textfile: impl Into<PathBuf>) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self {
            handle,
            textfile: textfile.into(),
        })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn textfile(&self) -> &Path {
        &self.textfile
    }

    pub fn flush(&self) -> Result<()> {
        write_textfile(&self.textfile, &self.render())
    }
}

/// Write via tmp file + rename so the collector never reads a partial file.
pub fn write_textfile(path: &Path, body: &str) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

use anyhow::{bail, Context, Result};
use census_reshape::{export, Config, LongTable, Pipeline};
use glob::glob;
use serde::Serialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Serialize)]
struct Summary<'a> {
    file: &'a str,
    rows: usize,
    months: Vec<String>,
    regions: usize,
    metrics: Vec<String>,
}

/// Expand a glob pattern; a plain path with no matches is taken as-is.
fn expand_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut inputs: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("invalid input pattern `{}`", pattern))?
        .filter_map(|entry| match entry {
            Ok(p) if p.is_file() => Some(p),
            Ok(_) => None,
            Err(e) => {
                warn!("cannot read glob entry: {}", e);
                None
            }
        })
        .collect();

    if inputs.is_empty() {
        let path = PathBuf::from(pattern);
        if !path.is_file() {
            bail!("no input files match `{}`", pattern);
        }
        inputs.push(path);
    }
    inputs.sort();
    Ok(inputs)
}

fn log_summary(path: &Path, long: &LongTable) -> Result<()> {
    let file = path.display().to_string();
    let summary = Summary {
        file: &file,
        rows: long.num_rows(),
        months: long.months(),
        regions: long.regions().len(),
        metrics: long.metric_columns(),
    };
    info!(summary = %serde_json::to_string(&summary)?, "reshaped");
    Ok(())
}

fn process_file(pipeline: &Pipeline, path: &Path, out_dir: &Path) -> Result<PathBuf> {
    let long = pipeline
        .run_path(path)
        .with_context(|| format!("processing {}", path.display()))?;
    log_summary(path, &long)?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "population".to_string());
    let out_path = out_dir.join(format!("{}_clean.csv", stem));
    export::write_csv(&long, &out_path)
        .with_context(|| format!("writing {}", out_path.display()))?;
    Ok(out_path)
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,census_reshape=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) config + args ────────────────────────────────────────────
    let config = Config::from_env().context("loading configuration")?;
    let mut args = env::args().skip(1);
    let pattern = args
        .next()
        .context("usage: census-reshape <INPUT|GLOB> [OUTPUT_DIR]")?;
    let out_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| config.output_dir.clone());
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    let inputs = expand_inputs(&pattern)?;
    info!(files = inputs.len(), key = %config.key_column, "startup");

    // ─── 3) run each file; one bad file does not stop the rest ──────
    let pipeline = Pipeline::new(config);
    let mut failed = 0usize;
    for path in &inputs {
        match process_file(&pipeline, path, &out_dir) {
            Ok(out) => info!("wrote {}", out.display()),
            Err(e) => {
                error!("{:#}", e);
                failed += 1;
            }
        }
    }

    info!(ok = inputs.len() - failed, failed, "all done");
    if failed == inputs.len() {
        bail!("every input failed");
    }
    Ok(())
}

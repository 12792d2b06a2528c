use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;
use viewconfig::ViewConfig;

use crate::bindings::{apply_overrides, pipeline_config};
use crate::cli::Args;
use crate::host::{run_host, HostOptions};
use crate::paths::AppPaths;
use crate::source::SourceContent;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = resolve_config(&args)?;
    if args.check_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let pipeline = pipeline_config(&config);
    tracing::info!(
        size = %format!("{}x{}", pipeline.initial_size.width, pipeline.initial_size.height),
        radius = ?pipeline.blur_radius.as_array(),
        format = %pipeline.frame_format,
        flip = pipeline.flip_vertical,
        "starting blurview"
    );

    let content = SourceContent::resolve(
        config.source.image.as_deref(),
        config.source.pattern,
        pipeline.frame_format,
    )?;
    let options = HostOptions {
        title: config.surface.title.clone(),
        frame_interval: config.frame_interval(),
        run_for: config.source.run_for,
    };
    run_host(pipeline, content, options)?;
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the explicit or default config file, then applies CLI flags.
fn resolve_config(args: &Args) -> Result<ViewConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => default_config_path(),
    };

    let mut config = match &path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration");
            ViewConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?
        }
        None => ViewConfig::default(),
    };

    apply_overrides(&mut config, args);
    config
        .validate()
        .context("command-line overrides produced an invalid configuration")?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    match AppPaths::discover() {
        Ok(paths) => {
            tracing::debug!(config = %paths.config_dir().display(), "resolved blurview paths");
            paths.default_config()
        }
        Err(err) => {
            tracing::warn!(error = %err, "no config directory; using defaults");
            None
        }
    }
}

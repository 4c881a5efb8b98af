use crate::caption::{
    default_cache_dir, CaptionConfig, Device, ImageSource, InterrogatorClient, DEFAULT_ENDPOINT,
    DEFAULT_MODEL,
};
use crate::logging::{self, LogTarget};
use crate::prompt::PromptSession;
use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "clip-prompt",
    version,
    about = "Caption images with a CLIP interrogator, then collect, merge and export prompts"
)]
pub struct Cli {
    /// Base URL of the CLIP interrogator service
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// CLIP model the service should load
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Compute device for the model
    #[arg(long, value_enum, default_value_t = Device::Auto)]
    pub device: Device,

    /// Model download cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Timeout for a single caption request
    #[arg(long, default_value = "120s")]
    pub timeout: humantime::Duration,

    /// Use --fast true or --fast false to pick the captioning mode
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub fast: bool,

    /// Import a prompt list before starting
    #[arg(long)]
    pub list: Option<PathBuf>,

    /// Caption these images, print the prompts and exit (no TUI)
    #[arg(long, num_args = 1..)]
    pub caption: Vec<PathBuf>,

    /// Export the collected prompt list after --caption ("-" for stdout)
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Merge prompts from this list file, print the result and exit (no TUI)
    #[arg(long)]
    pub merge: Option<PathBuf>,

    /// 1-based list positions to merge (default: all)
    #[arg(long, value_delimiter = ',')]
    pub select: Vec<usize>,

    /// Seed for reproducible merges
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log file for interactive runs
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    fn is_headless(&self) -> bool {
        self.merge.is_some() || !self.caption.is_empty()
    }
}

/// Build a `CaptionConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> CaptionConfig {
    CaptionConfig {
        endpoint: args.endpoint.clone(),
        clip_model_name: args.model.clone(),
        device: args.device.resolve(),
        cache_dir: args.cache_dir.clone().unwrap_or_else(default_cache_dir),
        timeout: Duration::from(args.timeout),
    }
}

/// Build the startup session: fast mode from the flags plus an optional preloaded list.
pub fn build_session(args: &Cli) -> Result<PromptSession> {
    let mut session = PromptSession::new();
    session.set_fast_mode(args.fast);
    if let Some(list) = args.list.as_deref() {
        session
            .import_file(list)
            .with_context(|| format!("import {}", list.display()))?;
    }
    Ok(session)
}

/// Load the caption model. Failure here is fatal: nothing works without it.
pub async fn load_captioner(args: &Cli) -> Result<InterrogatorClient> {
    let cfg = build_config(args);
    eprintln!(
        "Loading model {} on {}…",
        cfg.clip_model_name,
        cfg.device.as_str()
    );
    let client = InterrogatorClient::load(cfg)
        .await
        .context("failed to load caption model")?;
    tracing::info!(
        model = %client.config().clip_model_name,
        device = client.config().device.as_str(),
        endpoint = %client.config().endpoint,
        "captioner ready"
    );
    Ok(client)
}

pub async fn run(args: Cli) -> Result<()> {
    if args.merge.is_some() && !args.caption.is_empty() {
        return Err(anyhow::anyhow!("--merge and --caption cannot be used together"));
    }
    if args.export.is_some() && args.caption.is_empty() {
        return Err(anyhow::anyhow!("--export is only valid together with --caption"));
    }

    if args.is_headless() {
        logging::init(LogTarget::Stderr)?;
    } else {
        let path = args.log_file.clone().unwrap_or_else(logging::default_log_file);
        logging::init(LogTarget::File(&path))?;
    }

    if let Some(list) = args.merge.clone() {
        return run_merge(&args, list);
    }
    if !args.caption.is_empty() {
        return run_caption(args).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        Err(anyhow::anyhow!(
            "built without TUI support; use --caption or --merge"
        ))
    }
}

/// Convert 1-based positions to list indices. Empty means every entry.
fn selection_indices(positions: &[usize], len: usize) -> Result<Vec<usize>> {
    if positions.is_empty() {
        return Ok((0..len).collect());
    }
    positions
        .iter()
        .map(|&p| {
            p.checked_sub(1)
                .ok_or_else(|| anyhow::anyhow!("--select positions start at 1"))
        })
        .collect()
}

fn run_merge(args: &Cli, list: PathBuf) -> Result<()> {
    let mut session = PromptSession::new();
    session
        .import_file(&list)
        .with_context(|| format!("import {}", list.display()))?;

    let selected = selection_indices(&args.select, session.prompts().len())?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let merged = session.merge_selected(&selected, &mut rng)?;
    println!("{merged}");
    Ok(())
}

async fn run_caption(args: Cli) -> Result<()> {
    let mut session = build_session(&args)?;
    let captioner = load_captioner(&args).await?;

    // Captioning blocks on the runtime handle, so it must run on a blocking worker.
    let images = args.caption.clone();
    let (session, failures) = tokio::task::spawn_blocking(move || {
        let mut failures = 0usize;
        for path in images {
            match session.acquire(&captioner, &ImageSource::File(path.clone())) {
                Ok(prompt) => println!("{prompt}"),
                Err(e) => {
                    failures += 1;
                    eprintln!("{}: {e}", path.display());
                }
            }
        }
        (session, failures)
    })
    .await
    .context("caption worker failed")?;

    match args.export.as_deref() {
        Some(out) if out == Path::new("-") => {
            session
                .export_to(std::io::stdout().lock())
                .context("export to stdout")?;
        }
        Some(out) => {
            let written = session
                .export_file(out)
                .with_context(|| format!("export {}", out.display()))?;
            eprintln!(
                "Exported {} prompt(s) to {}",
                session.prompts().len(),
                written.display()
            );
        }
        None => {}
    }

    if failures > 0 {
        return Err(anyhow::anyhow!(
            "{failures} of {} image(s) could not be captioned",
            args.caption.len()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("clip-prompt").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert!(args.fast);
        assert!(!args.is_headless());
        let cfg = build_config(&args);
        assert_eq!(cfg.clip_model_name, DEFAULT_MODEL);
        assert_eq!(cfg.endpoint, DEFAULT_ENDPOINT);
        assert_ne!(cfg.device, Device::Auto);
        assert_eq!(cfg.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_flags_flow_into_config() {
        let args = parse(&[
            "--device",
            "cpu",
            "--timeout",
            "5s",
            "--fast",
            "false",
            "--cache-dir",
            "/tmp/models",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.device, Device::Cpu);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/models"));
        assert!(!build_session(&args).unwrap().fast_mode());
    }

    #[test]
    fn test_select_is_one_based() {
        let args = parse(&["--merge", "list.txt", "--select", "1,3"]);
        assert!(args.is_headless());
        assert_eq!(selection_indices(&args.select, 5).unwrap(), vec![0, 2]);
        assert_eq!(selection_indices(&[], 3).unwrap(), vec![0, 1, 2]);
        assert!(selection_indices(&[0], 3).is_err());
    }

    #[test]
    fn test_build_session_preloads_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut seed = PromptSession::new();
        seed.append("a cat, sitting".into());
        let path = seed.export_file(&dir.path().join("seed.txt")).unwrap();

        let args = parse(&["--list", path.to_str().unwrap()]);
        let session = build_session(&args).unwrap();
        assert_eq!(session.prompts(), ["a cat, sitting"]);
    }

    #[test]
    fn test_run_merge_with_seed() {
        let dir = tempfile::tempdir().unwrap();
        let mut seed = PromptSession::new();
        seed.append("red car, fast, shiny".into());
        seed.append("blue car, slow, rusty".into());
        let path = seed.export_file(&dir.path().join("cars.txt")).unwrap();

        let args = parse(&["--merge", path.to_str().unwrap(), "--seed", "4"]);
        run_merge(&args, path.clone()).unwrap();

        let single = parse(&["--merge", path.to_str().unwrap(), "--select", "2"]);
        assert!(run_merge(&single, path).is_err());
    }
}

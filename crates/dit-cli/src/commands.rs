use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use colored::Colorize;
use dit_crypto::ContentFingerprinter;
use dit_pack::ARCHIVE_FILE_NAME;
use dit_protocol::{app_name, AuthMethod, HttpUploadTransport, UploadTransport};
use dit_server::{DitServer, ServerConfig};
use dit_store::{InMemoryManifestStore, LogManifestStore, ManifestStore, MANIFEST_FILE_NAME};
use dit_sync::{ChangeSet, FileStatus, SyncEngine};
use tracing::{info, warn};

use crate::cli::*;
use crate::config::ProjectConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Deploy(args) => cmd_deploy(args),
        Command::Status(args) => cmd_status(args, cli.format),
        Command::Reset(args) => cmd_reset(args),
        Command::Serve(args) => cmd_serve(args),
    }
}

fn project_root(path: &Path) -> anyhow::Result<PathBuf> {
    let root = path
        .canonicalize()
        .with_context(|| format!("project root {} is not accessible", path.display()))?;
    anyhow::ensure!(root.is_dir(), "project root {} is not a directory", root.display());
    Ok(root)
}

fn engine_for(root: &Path, content_hash: bool) -> SyncEngine {
    let engine = SyncEngine::new(root);
    if content_hash {
        engine.with_fingerprinter(ContentFingerprinter)
    } else {
        engine
    }
}

fn cmd_deploy(args: DeployArgs) -> anyhow::Result<()> {
    let root = project_root(&args.path)?;
    let name = app_name(&root)?;
    let engine = engine_for(&root, args.content_hash);
    let settings =
        ProjectConfig::load(engine.state_dir())?.resolve(args.host, args.tag, args.token)?;
    let transport = HttpUploadTransport::new(&settings.host, AuthMethod::from_token(settings.token.as_deref()))?;

    let store = LogManifestStore::open_in(engine.state_dir())?;
    let result = engine.run(&store).context("sync failed")?;
    let form = result.to_deploy_form(&name, &settings.tag)?;
    let packed = result.packed_count();
    let deleted = result.deleted_paths.len();
    drop(result);

    if packed == 0 && deleted == 0 {
        println!("{} No file changes; sending tag {} only.", "•".cyan(), settings.tag.yellow());
    } else {
        println!(
            "{} {} changed, {} deleted",
            "•".cyan(),
            packed.to_string().bold(),
            deleted.to_string().bold()
        );
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let receipt = match runtime.block_on(transport.upload(form)) {
        Ok(receipt) => receipt,
        Err(err) => {
            store.close()?;
            eprintln!(
                "{} The manifest already records this sync; run {} to upload everything next time.",
                "hint:".yellow(),
                "dit reset".bold()
            );
            return Err(err).context("upload failed");
        }
    };

    if receipt.is_success() {
        info!(status = receipt.status, "deploy accepted");
        println!(
            "{} Deployed {} ({}) to {}",
            "✓".green().bold(),
            name.bold(),
            settings.tag.yellow(),
            settings.host
        );
    } else {
        warn!(status = receipt.status, body = %receipt.body, "deploy service returned an error status");
        println!(
            "{} Deploy service answered {}: {}",
            "!".yellow().bold(),
            receipt.status.to_string().yellow(),
            receipt.body.trim()
        );
    }

    if store.compact()? {
        info!("manifest compacted");
    }
    store.close()?;
    Ok(())
}

fn collect_status(root: &Path, content_hash: bool) -> anyhow::Result<ChangeSet> {
    let engine = engine_for(root, content_hash);
    let log_path = engine.state_dir().join(MANIFEST_FILE_NAME);
    // A project that was never deployed has no state directory yet; don't create one.
    let store: Box<dyn ManifestStore> = if log_path.exists() {
        Box::new(LogManifestStore::open(&log_path)?)
    } else {
        Box::new(InMemoryManifestStore::new())
    };
    Ok(engine.plan(store.as_ref())?)
}

fn cmd_status(args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = project_root(&args.path)?;
    let changes = collect_status(&root, args.content_hash)?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_clean() {
        println!("Nothing to deploy. {} is in sync.", root.display());
        return Ok(());
    }
    for entry in &changes.entries {
        let label = match entry.status {
            FileStatus::New => format!("{:>9}", entry.status.label()).green(),
            FileStatus::Modified => format!("{:>9}", entry.status.label()).yellow(),
            FileStatus::Deleted => format!("{:>9}", entry.status.label()).red(),
        };
        println!("  {label}  {}", entry.path);
    }
    println!(
        "\n{} new, {} modified, {} deleted",
        changes.count(FileStatus::New).to_string().bold(),
        changes.count(FileStatus::Modified).to_string().bold(),
        changes.count(FileStatus::Deleted).to_string().bold()
    );
    Ok(())
}

fn reset_state(state_dir: &Path) -> anyhow::Result<usize> {
    let store = LogManifestStore::open_in(state_dir)?;
    let forgotten = store.len()?;
    store.clear()?;
    store.close()?;

    let archive = state_dir.join(ARCHIVE_FILE_NAME);
    if archive.exists() {
        fs::remove_file(&archive)
            .with_context(|| format!("removing stale archive {}", archive.display()))?;
    }
    Ok(forgotten)
}

fn cmd_reset(args: ResetArgs) -> anyhow::Result<()> {
    let root = project_root(&args.path)?;
    let engine = SyncEngine::new(&root);
    let forgotten = reset_state(engine.state_dir())?;
    println!(
        "{} Forgot {} tracked files; the next deploy uploads everything.",
        "✓".green().bold(),
        forgotten.to_string().bold()
    );
    Ok(())
}

fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(apps_root) = args.apps_root {
        config.apps_root = apps_root;
    }
    if let Some(token) = args.token {
        config.auth_token = Some(token);
    }
    fs::create_dir_all(&config.apps_root)
        .with_context(|| format!("creating apps root {}", config.apps_root.display()))?;

    println!(
        "dit server on {} (apps: {})",
        config.bind_addr.to_string().bold(),
        config.apps_root.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(DitServer::new(config).serve())?;
    Ok(())
}

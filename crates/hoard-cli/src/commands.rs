use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use hoard_crypto::SigningKey;
use hoard_project::{ChunkReference, ManifestVersion, ProjectManifest, ProjectPublisher};
use hoard_replication::ReplicationEngine;
use hoard_store::{ChunkStore, DirectoryChunkStore, DirectoryConnector, StaticTopology};
use hoard_types::ChunkHash;
use tracing::warn;
use walkdir::WalkDir;

use crate::cli::*;
use crate::config::CliConfig;
use crate::listener::CommandLineListener;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Replicate(args) => cmd_replicate(args, config),
        Command::Manifest(args) => match args.action {
            ManifestAction::Show { file } => cmd_manifest_show(&file),
            ManifestAction::Build(args) => cmd_manifest_build(args),
        },
        Command::Publish(args) => cmd_publish(args, config),
        Command::Keygen(args) => cmd_keygen(args),
    }
}

fn cmd_replicate(args: ReplicateArgs, config: CliConfig) -> anyhow::Result<()> {
    let root = ChunkHash::from_hex(&args.hash).context("invalid root hash")?;
    let signer = Arc::new(load_signer(args.key.as_deref(), &config)?);

    let mut settings = config.replication;
    if let Some(n) = args.replications {
        settings.required_replications = n;
    }
    if let Some(n) = args.workers {
        settings.workers = n;
    }

    let mut engine = if args.read.is_empty() && args.write.is_empty() {
        if config.peers.is_empty() {
            bail!("no servers: pass --read/--write or configure [[peer]] entries");
        }
        let topology = StaticTopology::new(config.peers);
        ReplicationEngine::discover(settings, signer, &topology, &DirectoryConnector)
    } else {
        ReplicationEngine::new(settings, signer, open_stores(&args.read)?, open_stores(&args.write)?)
    };
    engine.add_listener(Arc::new(CommandLineListener::stdout()));

    println!(
        "Replicating {} from {} to {} servers",
        root.short_hex().yellow(),
        engine.read_servers().len(),
        engine.write_servers().len()
    );
    engine
        .execute(&root)
        .with_context(|| format!("replicating {}", root.short_hex()))
}

fn cmd_manifest_show(file: &Path) -> anyhow::Result<()> {
    let mut manifest =
        ProjectManifest::load(file).with_context(|| format!("reading {}", file.display()))?;

    println!("{}  {}", "Manifest".bold(), file.display());
    println!("  Version:     {}", manifest.version());
    println!("  Name:        {}", manifest.name().bold());
    println!("  Description: {}", manifest.description());
    match manifest.license_hash() {
        Some(license) => println!("  License:     {}", license.short_hex().yellow()),
        None => println!("  License:     {}", "none".dimmed()),
    }
    if let Some(size) = manifest.total_size() {
        println!("  Size:        {size} bytes");
    }
    println!();
    println!("{:<16} {:>12} {:>8}  {}", "HASH", "SIZE", "PADDING", "NAME");
    let mut count = 0usize;
    for part in manifest.parts()? {
        let part = part?;
        println!(
            "{:<16} {:>12} {:>8}  {}",
            part.hash().short_hex().yellow(),
            part.padding_adjusted_length(),
            part.padding().len(),
            part.relative_name()
        );
        count += 1;
    }
    println!("\n{count} files");
    manifest.close()?;
    Ok(())
}

fn cmd_manifest_build(args: BuildArgs) -> anyhow::Result<()> {
    let version = ManifestVersion::from_number(args.format_version)
        .with_context(|| format!("unsupported format version {}", args.format_version))?;
    let name = args.name.unwrap_or_else(|| directory_name(&args.dir));
    let mut manifest = ProjectManifest::new(name, args.description)?;
    manifest.set_version(version);

    for entry in WalkDir::new(&args.dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.path() == args.output {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&args.dir)?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let data = std::fs::read(entry.path())
            .with_context(|| format!("reading {}", entry.path().display()))?;
        manifest.add_part(ChunkReference::new(relative, ChunkHash::compute(&data), Vec::new()))?;
    }

    manifest
        .save(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    println!(
        "{} Wrote {} ({}, {} files, {} bytes)",
        "✓".green().bold(),
        args.output.display(),
        version,
        manifest.part_count(),
        manifest.total_size().unwrap_or(0)
    );
    manifest.close()?;
    Ok(())
}

fn cmd_publish(args: PublishArgs, config: CliConfig) -> anyhow::Result<()> {
    let signer = load_signer(args.key.as_deref(), &config)?;
    let mut publisher = ProjectPublisher::new(open_stores(&args.to)?, &signer);
    if let Some(size) = args.chunk_size {
        publisher = publisher.with_chunk_size(size);
    }
    let name = args.name.unwrap_or_else(|| directory_name(&args.dir));
    let (root, mut manifest) = publisher
        .publish_directory(&args.dir, &name, &args.description)
        .with_context(|| format!("publishing {}", args.dir.display()))?;

    println!("{} Published {}", "✓".green().bold(), name.bold());
    println!("  Files: {}", manifest.part_count());
    println!("  Root:  {}", root.to_hex().yellow());
    manifest.close()?;
    Ok(())
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    if args.file.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.file.display());
    }
    let key = SigningKey::generate();
    key.save(&args.file)
        .with_context(|| format!("writing {}", args.file.display()))?;
    println!("{} Wrote signing key to {}", "✓".green().bold(), args.file.display());
    println!("  Public key: {}", key.verifying_key().to_hex().cyan());
    Ok(())
}

fn open_stores(dirs: &[PathBuf]) -> anyhow::Result<Vec<Arc<dyn ChunkStore>>> {
    dirs.iter()
        .map(|dir| {
            let store = DirectoryChunkStore::open(dir)
                .with_context(|| format!("opening store {}", dir.display()))?;
            Ok(Arc::new(store) as Arc<dyn ChunkStore>)
        })
        .collect()
}

/// Key from `--key`, then the config file, else a throwaway key.
fn load_signer(flag: Option<&Path>, config: &CliConfig) -> anyhow::Result<SigningKey> {
    match flag.or(config.identity.key_file.as_deref()) {
        Some(path) => SigningKey::load(path)
            .with_context(|| format!("loading signing key {}", path.display())),
        None => {
            warn!("no signing key configured; using an ephemeral key");
            Ok(SigningKey::generate())
        }
    }
}

fn directory_name(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "project".to_owned())
}

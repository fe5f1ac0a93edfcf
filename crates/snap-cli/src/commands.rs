use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use tokio::sync::watch;
use tracing::warn;

use snap_chain::{ChainResolver, Ownership};
use snap_diff::{render, BlockRange, DiffConfig, DiffEngine, DiffReport};
use snap_store::{HeaderSource, ObjectStorage, StorageConfig, TemplateStorage};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let storage = open_storage(cli.config.as_deref())?;
    let template = TemplateStorage::new(storage, cli.artifact.into());

    match cli.command {
        Command::Diff(args) => cmd_diff(template, args, format).await,
        Command::Header(args) => cmd_header(&template, args, format).await,
        Command::Resolve(args) => cmd_resolve(&template, args, format).await,
    }
}

fn open_storage(config: Option<&Path>) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    let config = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            StorageConfig::from_toml_str(&text)?
        }
        None => StorageConfig::from_env()?,
    };
    config.open().context("failed to open template storage")
}

/// Byte range for `[start, end)` block indices; an `end` of 0 or past the
/// address space means the last block.
fn diff_range(chain: &ChainResolver, start: u64, end: u64) -> anyhow::Result<BlockRange> {
    let block_size = chain.block_size();
    let total_blocks = chain.leaf().header().metadata().block_count();
    let end = if end == 0 || end > total_blocks { total_blocks } else { end };
    if start > end {
        bail!("start block {start} is past end block {end}");
    }
    Ok(BlockRange::from_blocks(start, end, block_size)?)
}

async fn load_diff_chain(template: &TemplateStorage, args: &DiffArgs) -> anyhow::Result<ChainResolver> {
    let leaf = *args.layers.last().context("--layers needs at least one build id")?;
    let chain = ChainResolver::load(template, leaf)
        .await
        .with_context(|| format!("failed to load chain of {leaf}"))?;

    for id in &args.layers {
        if !chain.contains(*id) {
            bail!("layer {id} is not part of the chain of {leaf}");
        }
    }
    if let Some(requested) = args.block_size {
        if requested != chain.block_size() {
            bail!(
                "--block-size {requested} does not match the chain block size {}",
                chain.block_size()
            );
        }
    }
    Ok(chain)
}

async fn cmd_diff(template: TemplateStorage, args: DiffArgs, format: OutputFormat) -> anyhow::Result<()> {
    let chain = load_diff_chain(&template, &args).await?;
    let range = diff_range(&chain, args.start, args.end)?;
    let block_size = chain.block_size();

    if format == OutputFormat::Text {
        for layer in chain.layers() {
            println!("layer {} generation: {}", layer.build_id().to_string().cyan(), layer.header().generation());
        }
        println!(
            "Analyzing unchanged blocks for {} to {} by {} bytes blocks\n",
            range.start / block_size,
            range.end / block_size,
            block_size
        );
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight blocks");
            cancel_tx.send_replace(true);
        }
    });

    let engine = DiffEngine::new(
        Arc::new(chain),
        Arc::new(template),
        DiffConfig { max_concurrency: args.concurrency },
    );
    let report = engine.run(range, cancel_rx).await?;

    match format {
        OutputFormat::Json => println!("{}", report.to_json()?),
        OutputFormat::Text => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &DiffReport) {
    print!("{}", render::rows(report));

    println!("\n{}", "Summary".bold());
    print!("{}", render::summary(report));
    println!(
        "  {} of {} blocks classified, {} redundant ({} bytes)",
        report.classified_blocks(),
        report.total_blocks,
        report.redundant_blocks().to_string().yellow(),
        report.redundant_bytes()
    );

    if !report.failures.is_empty() {
        println!("\n{} ({})", "Failures".red().bold(), report.failures.len());
        print!("{}", render::failures(report));
    }
    if report.cancelled {
        println!("\n{} cancelled, report is partial", "!".yellow().bold());
    } else if report.is_complete() {
        println!("\n{} complete", "✓".green().bold());
    }
}

async fn cmd_header(template: &TemplateStorage, args: HeaderArgs, format: OutputFormat) -> anyhow::Result<()> {
    let header = template
        .read_header(args.build)
        .await
        .with_context(|| format!("failed to read header of {}", args.build))?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&header)?);
        return Ok(());
    }

    let meta = header.metadata();
    println!("Build {}", meta.build_id.to_string().yellow().bold());
    println!("  Version:    {}", meta.version);
    println!("  Generation: {}", meta.generation);
    match meta.parent_build_id {
        Some(parent) => println!("  Parent:     {}", parent.to_string().cyan()),
        None => println!("  Parent:     {}", "(root)".dimmed()),
    }
    println!("  Base:       {}", meta.base_build_id.to_string().cyan());
    println!("  Block size: {}", meta.block_size);
    println!("  Total size: {} ({} blocks)", meta.total_size, meta.block_count());
    println!("  Owned:      {} blocks", header.owned_blocks());
    println!("\n{} ({})", "Mappings".bold(), header.mappings().len());
    for entry in header.mappings() {
        let owner = if entry.is_unmapped() {
            "unmapped".dimmed().to_string()
        } else if entry.owner == meta.build_id {
            entry.owner.to_string().green().to_string()
        } else {
            entry.owner.to_string()
        };
        println!("  [{:012}-{:012}) {}", entry.start, entry.end, owner);
    }
    Ok(())
}

async fn cmd_resolve(template: &TemplateStorage, args: ResolveArgs, format: OutputFormat) -> anyhow::Result<()> {
    let chain = ChainResolver::load(template, args.build)
        .await
        .with_context(|| format!("failed to load chain of {}", args.build))?;
    let ownership = chain.resolve(args.build, args.offset)?;

    match (format, ownership) {
        (OutputFormat::Json, Ownership::Stored { owner, local_offset }) => println!(
            "{}",
            serde_json::json!({
                "build": args.build,
                "offset": args.offset,
                "owner": owner,
                "local_offset": local_offset,
            })
        ),
        (OutputFormat::Json, Ownership::Unmapped) => println!(
            "{}",
            serde_json::json!({ "build": args.build, "offset": args.offset, "owner": null })
        ),
        (OutputFormat::Text, Ownership::Stored { owner, local_offset }) => {
            let generation = chain
                .layer(owner)
                .map(|l| l.header().generation())
                .unwrap_or_default();
            println!(
                "offset {} of {} is stored by {} (generation {}) at offset {}",
                args.offset,
                args.build.short_id(),
                owner.to_string().green(),
                generation,
                local_offset
            );
        }
        (OutputFormat::Text, Ownership::Unmapped) => {
            println!("offset {} of {} is {}", args.offset, args.build.short_id(), "unmapped".dimmed());
        }
    }
    Ok(())
}

//! component-registry: build, verify, and install component registries.
//!
//! The binary is the only place that decides the process exit status; every
//! library error comes back here and is printed once.

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use component_registry::builder::{self, BuildOptions};
use component_registry::config::{self, ORIGIN_ENV, ProjectConfig};
use component_registry::installer::{self, InstallOptions, Installer};
use component_registry::loader::RegistryCache;
use component_registry::pipeline::{ArtifactPipeline, Ensured, fingerprint, origin};
use component_registry::{RegistryError, resolver};
use dialoguer::Confirm;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use cli::{Args, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    component_registry::init_logging(args.verbose, args.debug);
    let debug = args.debug;

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, debug);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let root = args.root;
    let config = ProjectConfig::load(&root)?;

    match args.command {
        Commands::Build {
            registry,
            output,
            strip_prefix,
        } => cmd_build(&root, &config, registry, output, strip_prefix),
        Commands::List { bundle, all, json } => cmd_list(&bundle_path(&root, &config, bundle), all, json),
        Commands::Resolve { items, bundle, json } => {
            cmd_resolve(&items, &bundle_path(&root, &config, bundle), json)
        }
        Commands::Add {
            items,
            bundle,
            cwd,
            overwrite,
            yes,
            dry_run,
            skip_install,
            timeout,
        } => {
            let target = cwd.unwrap_or_else(|| root.clone());
            let options = InstallOptions {
                overwrite,
                dry_run,
                timeout: Duration::from_secs(timeout),
            };
            cmd_add(
                &items,
                &bundle_path(&root, &config, bundle),
                &target,
                &config,
                options,
                yes,
                skip_install,
            )
            .await
        }
        Commands::Check { rebuild } => cmd_check(&root, &config, rebuild),
        Commands::Publish { origin, rebuild } => cmd_publish(&root, &config, origin, rebuild),
        Commands::RewriteOrigin { dir, from, to } => cmd_rewrite_origin(&root, &config, &dir, from, to),
        Commands::Fingerprint { inputs } => cmd_fingerprint(&root, &config, inputs),
    }
}

fn bundle_path(root: &Path, config: &ProjectConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| root.join(&config.bundle))
}

fn cmd_build(
    root: &Path,
    config: &ProjectConfig,
    registry: Option<PathBuf>,
    output: Option<PathBuf>,
    strip_prefix: Option<String>,
) -> Result<()> {
    let mut options = BuildOptions::from(config);
    if let Some(registry) = registry {
        options.registry_file = registry;
    }
    if let Some(prefix) = strip_prefix {
        options.rewrite_path = Some(Box::new(move |path: &str| {
            path.strip_prefix(prefix.as_str()).unwrap_or(path).to_string()
        }));
    }
    let output = output.unwrap_or_else(|| root.join(&config.bundle));

    let summary = builder::build(root, &output, &options)?;

    println!("{} Built {}", "ok:".green().bold(), summary);
    for (name, deps) in &summary.dependencies {
        if !deps.is_empty() {
            println!("  {} {}", name, deps.join(", ").dimmed());
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct ListEntry<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    description: Option<&'a str>,
    files: usize,
    hidden: bool,
}

fn cmd_list(bundle: &Path, all: bool, json: bool) -> Result<()> {
    let cache = RegistryCache::new(bundle);
    let loaded = cache.get_or_load()?;

    let entries: Vec<ListEntry> = loaded
        .items
        .iter()
        .filter(|item| all || !item.meta.hidden)
        .map(|item| ListEntry {
            name: &item.name,
            kind: item.kind.as_str(),
            description: item.description.as_deref(),
            files: item.files.len(),
            hidden: item.meta.hidden,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{} No items in {}", "info:".blue().bold(), bundle.display());
        return Ok(());
    }

    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in &entries {
        let name = format!("{:width$}", entry.name);
        println!(
            "{}  {}  {}",
            if entry.hidden { name.dimmed() } else { name.bold() },
            entry.kind.cyan(),
            entry.description.unwrap_or("").dimmed()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ResolveOutput {
    order: Vec<String>,
    dependencies: Vec<String>,
    external: Vec<String>,
}

fn resolve_items(cache: &RegistryCache, requested: &[String]) -> Result<ResolveOutput> {
    let bundle = cache.get_or_load()?;
    let lookup = |name: &str| bundle.item(name);
    let names: Vec<&str> = requested.iter().map(String::as_str).collect();

    let order = resolver::resolve(&names, lookup)?;
    let dependencies = resolver::collect_dependencies(&order, lookup)?.into_iter().collect();
    let external = resolver::external_references(&order, lookup);
    Ok(ResolveOutput {
        order,
        dependencies,
        external,
    })
}

fn cmd_resolve(items: &[String], bundle: &Path, json: bool) -> Result<()> {
    let cache = RegistryCache::new(bundle);
    let resolved = resolve_items(&cache, items)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    println!("{}", "Install order:".bold());
    for (i, name) in resolved.order.iter().enumerate() {
        println!("  {:>3}. {}", i + 1, name);
    }
    if !resolved.dependencies.is_empty() {
        println!("{}", "npm packages:".bold());
        for dep in &resolved.dependencies {
            println!("  {}", dep);
        }
    }
    print_external(&resolved.external);
    Ok(())
}

fn print_external(external: &[String]) {
    for reference in external {
        println!(
            "{} {} is served by another registry and was not resolved",
            "note:".cyan().bold(),
            reference
        );
    }
}

async fn cmd_add(
    items: &[String],
    bundle: &Path,
    target: &Path,
    config: &ProjectConfig,
    mut options: InstallOptions,
    yes: bool,
    skip_install: bool,
) -> Result<()> {
    let cache = RegistryCache::new(bundle);
    let resolved = resolve_items(&cache, items)?;
    let loaded = cache.get_or_load()?;
    let selected: Vec<_> = resolved.order.iter().filter_map(|name| loaded.item(name)).collect();

    let ops = installer::file_ops_for(&selected, target, config)?;
    let existing = ops.iter().filter(|op| op.target.exists()).count();

    if options.overwrite && existing > 0 && !yes && !options.dry_run {
        options.overwrite = Confirm::new()
            .with_prompt(format!("Overwrite {existing} existing file(s)?"))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
    }

    let dry_run = options.dry_run;
    let installer = Installer::new(options);
    let packages = if skip_install { Vec::new() } else { resolved.dependencies.clone() };
    let report = if packages.is_empty() {
        installer.install_files(&ops)?
    } else {
        installer.install(&ops, &packages, target).await?
    };

    let header = if dry_run { "Would write:" } else { "Wrote:" };
    if !report.written.is_empty() {
        println!("{}", header.yellow().bold());
        for label in &report.written {
            if report.overwritten.contains(label) {
                println!("  {} {}", "~".yellow(), label);
            } else {
                println!("  {} {}", "+".green(), label);
            }
        }
    }
    for label in &report.skipped {
        println!("  {} {} {}", "=".dimmed(), label, "(exists)".dimmed());
    }
    if !report.skipped.is_empty() && !dry_run {
        println!("{} Use --overwrite to replace existing files", "hint:".cyan().bold());
    }

    if !report.packages.is_empty() {
        let verb = if dry_run { "Would install" } else { "Installed" };
        println!("{} {}", format!("{verb}:").yellow().bold(), report.packages.join(" "));
    } else if skip_install && !resolved.dependencies.is_empty() {
        println!(
            "{} Install these packages yourself: {}",
            "hint:".cyan().bold(),
            resolved.dependencies.join(" ")
        );
    }
    print_external(&resolved.external);

    if report.written.is_empty() && report.packages.is_empty() {
        println!("{} Nothing to do", "info:".blue().bold());
    }
    Ok(())
}

fn cmd_check(root: &Path, config: &ProjectConfig, rebuild: bool) -> Result<()> {
    let pipeline = ArtifactPipeline::new(root, config);
    let message = match pipeline.ensure_public_artifacts(rebuild)? {
        Ensured::Fresh => "Published documents are up to date",
        Ensured::Built => "Built missing published documents",
        Ensured::Rebuilt => "Rebuilt stale published documents",
    };
    println!("{} {}", "ok:".green().bold(), message);
    Ok(())
}

fn resolve_target_origin(config: &ProjectConfig, flag: Option<String>) -> Result<Option<String>> {
    let configured = flag.or_else(|| config.pipeline.origin.to.clone());
    Ok(config::target_origin(std::env::var(ORIGIN_ENV).ok(), configured.as_deref())?)
}

fn cmd_publish(root: &Path, config: &ProjectConfig, origin: Option<String>, rebuild: bool) -> Result<()> {
    let pipeline = ArtifactPipeline::new(root, config);
    pipeline.ensure_public_artifacts(rebuild)?;

    let target = resolve_target_origin(config, origin)?;
    let report = pipeline.publish(target.as_deref())?;

    println!(
        "{} Published {} file(s) to {}",
        "ok:".green().bold(),
        report.manifest.files.len(),
        report.output_dir.display()
    );
    if let Some(origin) = &report.manifest.origin {
        println!("  origin      {} ({} file(s) rewritten)", origin, report.rewritten);
    }
    println!("  fingerprint {}", report.manifest.fingerprint.dimmed());
    Ok(())
}

fn cmd_rewrite_origin(
    root: &Path,
    config: &ProjectConfig,
    dir: &Path,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let from = from
        .or_else(|| config.pipeline.origin.from.clone())
        .context("No origin to replace; pass --from or set pipeline.origin.from")?;
    let to = resolve_target_origin(config, to)?
        .with_context(|| format!("No target origin; pass --to or set {ORIGIN_ENV}"))?;

    let changed = origin::rewrite_dir(&root.join(dir), &from, &to)?;
    if changed.is_empty() {
        println!("{} No files reference {}", "info:".blue().bold(), from);
    }
    for path in &changed {
        println!("  {} {}", "~".yellow(), path.display());
    }
    Ok(())
}

fn cmd_fingerprint(root: &Path, config: &ProjectConfig, inputs: Vec<PathBuf>) -> Result<()> {
    let inputs = if inputs.is_empty() {
        config.pipeline.inputs.clone()
    } else {
        inputs
    };
    println!("{}", fingerprint::fingerprint(root, &inputs)?);
    Ok(())
}

fn report_error(err: &anyhow::Error, debug: bool) {
    eprintln!("{} {}", "error:".red().bold(), err);

    if let Some(registry_err) = err.downcast_ref::<RegistryError>() {
        let log = if debug {
            registry_err.full_install_log().map(str::to_string)
        } else {
            registry_err.install_log()
        };
        if let Some(log) = log.filter(|l| !l.trim().is_empty()) {
            eprintln!("{}", "package manager output:".dimmed());
            for line in log.lines() {
                eprintln!("  {}", line);
            }
        }
    }

    if debug {
        eprintln!("\n{:?}", err);
    }
}

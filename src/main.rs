mod gateway;
mod normalize;
mod parser;
mod planner;
mod rich_text;
mod settings;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::gateway::{AdminClient, WriteResult};
use crate::parser::{html, ParsedContent, RawContent};
use crate::planner::{FieldIdMap, UpdateInstruction};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "metafield_copy", about = "Turn generated product copy into product metafield writes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the structured copy parsed from a raw content JSON or HTML report
    Parse {
        input: PathBuf,
    },
    /// Convert HTML analysis reports to JSON (<stem>.json next to each input)
    Convert {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Build update and creation instructions without touching the store
    Plan {
        #[arg(long)]
        product_id: u64,
        #[arg(long)]
        input_json: PathBuf,
        /// JSON object of field key -> metafield id
        #[arg(long)]
        ids_json: PathBuf,
        /// Output file (default: stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Create missing metafields and overwrite existing ones for a product
    Push {
        #[arg(long)]
        product_id: u64,
        #[arg(long)]
        input_json: PathBuf,
        /// Skip the remote lookup and use this key -> id map instead
        #[arg(long)]
        ids_json: Option<PathBuf>,
        /// Updates file (default: put_updates_<id>.json)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        shop: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
    /// Dump every metafield of a product to JSON
    Export {
        #[arg(long)]
        product_id: u64,
        /// Output file (default: metafields_<id>.json)
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        shop: Option<String>,
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input } => {
            let parsed = load_parsed(&input)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }
        Commands::Convert { inputs } => convert_reports(&inputs),
        Commands::Plan {
            product_id,
            input_json,
            ids_json,
            out,
        } => {
            let settings = Settings::load()?;
            let parsed = load_parsed(&input_json)?;
            let ids = load_ids_map(&ids_json)?;
            let plan = planner::plan(
                &planner::product_gid(product_id),
                &settings.namespace,
                &ids,
                &parsed,
            );
            match out {
                Some(path) => {
                    write_json(&path, &plan)?;
                    println!(
                        "Planned {} updates, {} creations -> {}",
                        plan.updates.len(),
                        plan.creations.len(),
                        path.display()
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&plan)?),
            }
            Ok(())
        }
        Commands::Push {
            product_id,
            input_json,
            ids_json,
            out,
            shop,
            token,
        } => {
            let settings = Settings::load()?.with_overrides(shop, token);
            push(&settings, product_id, &input_json, ids_json.as_deref(), out).await
        }
        Commands::Export {
            product_id,
            out,
            shop,
            token,
        } => {
            let settings = Settings::load()?.with_overrides(shop, token);
            let client = AdminClient::from_settings(&settings)?;
            let data = client
                .product_metafields(product_id)
                .await
                .with_context(|| format!("failed to export metafields of product {}", product_id))?;
            let path = out.unwrap_or_else(|| PathBuf::from(format!("metafields_{}.json", product_id)));
            write_json(&path, &data)?;
            println!("Saved {} (metafields={})", path.display(), data.count);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn push(
    settings: &Settings,
    product_id: u64,
    input_json: &Path,
    ids_json: Option<&Path>,
    out: Option<PathBuf>,
) -> Result<()> {
    let parsed = load_parsed(input_json)?;
    let client = AdminClient::from_settings(settings)?;

    let ids = match ids_json {
        Some(path) => load_ids_map(path)?,
        None => bootstrap_fields(&client, settings, product_id, &parsed).await?,
    };

    let updates = planner::plan_updates(&ids, &parsed);
    let out_path = out.unwrap_or_else(|| PathBuf::from(format!("put_updates_{}.json", product_id)));

    if !stage_updates(&updates, &out_path)? {
        println!("No updates; skipping PUTs and results file.");
        return Ok(());
    }

    let results = client.put_updates(&updates).await;
    let ok = results.iter().filter(|r| r.ok).count();
    println!("Updated {}/{} metafields", ok, results.len());

    let results_path = save_results(&out_path, &results)?;
    println!("Results saved to {}", results_path.display());
    Ok(())
}

/// Write the updates file. An empty set writes nothing and removes a stale
/// file at `out_path`; returns whether there is anything to send.
fn stage_updates(updates: &[UpdateInstruction], out_path: &Path) -> Result<bool> {
    if updates.is_empty() {
        if out_path.exists() {
            std::fs::remove_file(out_path)
                .with_context(|| format!("failed to remove {}", out_path.display()))?;
            println!("Removed empty updates file {}", out_path.display());
        }
        return Ok(false);
    }

    write_json(out_path, updates)?;
    println!("Generated {} updates in {}", updates.len(), out_path.display());
    Ok(true)
}

fn save_results(updates_path: &Path, results: &[WriteResult]) -> Result<PathBuf> {
    let path = results_path(updates_path);
    write_json(&path, results)?;
    Ok(path)
}

/// Resolve remote ids, making sure every schema field has a definition and,
/// where copy exists, a value.
async fn bootstrap_fields(
    client: &AdminClient,
    settings: &Settings,
    product_id: u64,
    parsed: &ParsedContent,
) -> Result<FieldIdMap> {
    let namespace = &settings.namespace;
    let remote = client
        .list_metafields(product_id)
        .await
        .context("failed to list product metafields")?;
    let ids = gateway::build_id_map(&remote, namespace);

    let defs = client
        .ensure_definitions(&planner::field_definitions(namespace))
        .await;
    println!("Definitions created: {}, errors: {}", defs.created.len(), defs.errors.len());
    print_errors(&defs.errors);

    let missing = planner::plan_creations(&planner::product_gid(product_id), namespace, &ids, parsed);
    if missing.is_empty() {
        return Ok(ids);
    }

    println!("Creating {} missing metafields via metafieldsSet...", missing.len());
    let set = client.set_metafields(&missing).await;
    println!("metafieldsSet: updated={}, errors={}", set.updated.len(), set.errors.len());
    print_errors(&set.errors);

    let remote = client
        .list_metafields(product_id)
        .await
        .context("failed to re-list product metafields")?;
    Ok(gateway::build_id_map(&remote, namespace))
}

/// Raw content JSON, or an HTML report when the extension says so.
fn load_parsed(path: &Path) -> Result<ParsedContent> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if is_html(path) {
        if !html::has_content(&text) {
            bail!("{} has no report content to parse", path.display());
        }
        let report = html::parse_report(&text, &source_name(path));
        info!(path = %path.display(), "HTML report loaded");
        return Ok(report.content.to_parsed_content());
    }

    let raw: RawContent = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse raw content {}", path.display()))?;
    if raw.content.trim().is_empty() {
        bail!("{} has no content to parse", path.display());
    }
    info!(
        path = %path.display(),
        format = %raw.format,
        model = raw.model.as_deref().unwrap_or("-"),
        "raw content loaded"
    );

    Ok(match raw.format.as_str() {
        "html" => html::parse_content(&raw.content).to_parsed_content(),
        _ => parser::parse_markdown(&raw.content),
    })
}

fn load_ids_map(path: &Path) -> Result<FieldIdMap> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    if !value.is_object() {
        bail!("{} must contain a JSON object of key -> id", path.display());
    }
    serde_json::from_value(value)
        .with_context(|| format!("{}: ids must be numbers or strings", path.display()))
}

fn convert_reports(inputs: &[PathBuf]) -> Result<()> {
    let results: Vec<_> = inputs.par_iter().map(|path| convert_report(path)).collect();

    let mut failed = 0usize;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(out) => println!("{} -> {}", input.display(), out.display()),
            Err(e) => {
                warn!(path = %input.display(), error = %e, "conversion failed");
                failed += 1;
            }
        }
    }

    println!("Converted {}/{} reports", inputs.len() - failed, inputs.len());
    if failed > 0 {
        bail!("{} report(s) failed to convert", failed);
    }
    Ok(())
}

fn convert_report(path: &Path) -> Result<PathBuf> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let report = html::parse_report(&text, &source_name(path));
    let out = path.with_extension("json");
    write_json(&out, &report)?;
    Ok(out)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
}

fn results_path(updates_path: &Path) -> PathBuf {
    let stem = updates_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("put_updates");
    updates_path.with_file_name(format!("{}_results.json", stem))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn print_errors(errors: &[serde_json::Value]) {
    for e in errors {
        println!("  {}", e);
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──

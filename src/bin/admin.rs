//! Canopy maintenance CLI
//!
//! Run with: cargo run --features cli --bin canopy-admin -- --config canopy.toml tree <page-id>
//!
//! Commands:
//!   tree <page-id>              - Print the resolved tree and illegal inheritance pointers
//!   permissions <page-id>       - Dump a page's permission records as JSON
//!   repair <page-id>            - Repair a page's subtree and print the applied batches
//!   repair-space <space-id>     - Repair every live root page of a space

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use uuid::Uuid;

use canopy::logging::init_logging;
use canopy::{EngineConfig, MemoryDirectory, PermissionEngine, RepairOp, RepairReport, ResolveOptions, TreeNode};

#[derive(Debug, Parser)]
#[command(name = "canopy-admin", version)]
struct Cli {
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Tree { page_id: Uuid },
    Permissions { page_id: Uuid },
    Repair { page_id: Uuid },
    RepairSpace { space_id: Uuid },
}

type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.log);

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: &EngineConfig, command: Command) -> CliResult<()> {
    let directory = MemoryDirectory::new().with_fallback_defaults(config.space_defaults());
    let engine = PermissionEngine::open(config, directory)?;

    match command {
        Command::Tree { page_id } => print_tree(&engine, &page_id),
        Command::Permissions { page_id } => {
            let records = engine.list_permissions(&page_id)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        Command::Repair { page_id } => {
            let report = engine.repair_illegal_permissions(&page_id)?;
            print_report(&report);
            Ok(())
        }
        Command::RepairSpace { space_id } => {
            let reports = engine.repair_space(&space_id)?;
            for r in &reports {
                print_report(r);
            }
            println!("{} root page(s) checked", reports.len());
            Ok(())
        }
    }
}

// ============================================================================
// Output
// ============================================================================

fn node_line(node: &TreeNode, depth: usize, marker: &str) -> String {
    let title = if node.page.title.is_empty() { "(untitled)" } else { node.page.title.as_str() };
    let mut s = format!("{}{} {} [{:?}] {}", "  ".repeat(depth), marker, node.id(), node.page.page_type, title);
    for p in &node.permissions {
        let source = p.source_permission_id.map_or_else(|| "own".to_string(), |s| format!("from {}", s));
        s.push_str(&format!("\n{}    {} {} ({})", "  ".repeat(depth), p.assignee, p.level, source));
    }
    s
}

fn print_tree<D: canopy::Directory>(engine: &PermissionEngine<D>, page_id: &Uuid) -> CliResult<()> {
    let tree = engine.resolve_tree(page_id, ResolveOptions::whole_subtree())?;

    let mut order: Vec<usize> = tree.ancestor_indices().iter().rev().copied().collect();
    order.push(tree.target_index());
    order.extend_from_slice(tree.descendant_indices());
    for i in order {
        let marker = if i == tree.target_index() { "*" } else { "-" };
        println!("{}", node_line(tree.node(i), tree.chain_of(i).len(), marker));
    }

    let illegal = canopy::repair::find_illegal_references(&tree);
    if illegal.is_empty() {
        println!("no illegal inheritance");
    } else {
        println!("{} illegal reference(s):", illegal.len());
        for r in illegal {
            println!("  page {} permission {} -> {}", r.page_id, r.permission_id, r.source_permission_id);
        }
    }
    Ok(())
}

fn print_report(report: &RepairReport) {
    if report.plan.is_empty() {
        println!("{}: clean", report.page_id);
        return;
    }
    println!("{}: {} record(s) updated", report.page_id, report.updated);
    for op in &report.plan.ops {
        match op {
            RepairOp::Detach { permission_ids } => {
                println!("  detach {} record(s)", permission_ids.len());
                for id in permission_ids {
                    println!("    {}", id);
                }
            }
            RepairOp::Repoint { old_source, new_source, page_ids } => {
                println!("  repoint {} -> {} on {} page(s)", old_source, new_source, page_ids.len());
            }
        }
    }
}

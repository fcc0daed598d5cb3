//! `simtree`: grow and navigate negotiation dialogue trees from the command line.
//!
//! Every command prints pretty JSON on stdout. Failures print the error chain
//! on stderr and exit with a code from [`simtree::exit_codes`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use simtree::bookmarks::{add_bookmark, list_bookmarks, remove_bookmark};
use simtree::continuation::{ContinueRequest, continue_conversation, generate_tree};
use simtree::core::types::{MessageView, TreeResult};
use simtree::error::{EngineError, ResultExt};
use simtree::exit_codes;
use simtree::frontier::frontier;
use simtree::generate::DialogueGenerator;
use simtree::io::config::{EngineConfig, load_config, write_config};
use simtree::io::file_store::FileStore;
use simtree::io::model::CommandModel;
use simtree::io::store::NodeStore;
use simtree::logging;
use simtree::reader::{selected_only, selected_range, tree_summary, tree_view};
use simtree::select::{check_tree, create_custom_node, prune_children, select, trim_after_children};
use simtree::tree::{BookmarkId, CaseId, NewCase, NodeId, TreeId, TreeMeta};
use simtree::writer::create_tree;

#[derive(Parser)]
#[command(
    name = "simtree",
    version,
    about = "Branching negotiation dialogue trees backed by a language model"
)]
struct Cli {
    /// Configuration file.
    #[arg(long, global = true, default_value = "simtree.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config and an empty store if missing.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,
    },
    /// Manage cases.
    #[command(subcommand)]
    Case(CaseCommand),
    /// Extend a tree at its frontier, or start a new one.
    Continue {
        #[arg(long)]
        case: CaseId,
        /// Omit to start a new tree.
        #[arg(long)]
        tree: Option<TreeId>,
        #[arg(long, default_value = "")]
        goal: String,
    },
    /// Generate a new tree with the first branch selected at every level.
    Generate {
        #[arg(long)]
        case: CaseId,
        #[arg(long, default_value = "")]
        goal: String,
    },
    /// Mark a message selected.
    Select { node: NodeId },
    /// Delete everything generated after a message's children.
    Trim { node: NodeId },
    /// Delete every descendant of a message.
    Prune { node: NodeId },
    /// Manage individual messages.
    #[command(subcommand)]
    Node(NodeCommand),
    /// Inspect trees.
    #[command(subcommand)]
    Tree(TreeCommand),
    /// Print the frontier message of a tree.
    Frontier { tree: TreeId },
    /// Print selected messages with ids in `start..=end`.
    Range { start: NodeId, end: NodeId },
    /// Check a tree's structural and selection invariants.
    Validate { tree: TreeId },
    /// Manage bookmarks.
    #[command(subcommand)]
    Bookmark(BookmarkCommand),
}

#[derive(Subcommand)]
enum CaseCommand {
    /// Store a case and print its id.
    Add(CaseAddArgs),
}

#[derive(Args)]
struct CaseAddArgs {
    #[arg(long)]
    name: String,
    /// Case context as text or JSON.
    #[arg(long, conflicts_with = "context_file", required_unless_present = "context_file")]
    context: Option<String>,
    /// Read the case context from a file.
    #[arg(long)]
    context_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Add a user-authored, selected message.
    Add {
        #[arg(long)]
        tree: TreeId,
        /// Parent message; omit to create the root of an empty tree.
        #[arg(long)]
        parent: Option<NodeId>,
        #[arg(long)]
        role: String,
        content: String,
    },
}

#[derive(Subcommand)]
enum TreeCommand {
    /// Create an empty tree, to be opened with `node add` and no `--parent`.
    New {
        #[arg(long)]
        case: CaseId,
        #[arg(long)]
        headline: Option<String>,
        #[arg(long)]
        brief: Option<String>,
    },
    /// Nested view of every message.
    Show { tree: TreeId },
    /// The selected path, root first.
    Path { tree: TreeId },
    /// Header and message count.
    Summary { tree: TreeId },
}

#[derive(Subcommand)]
enum BookmarkCommand {
    Add { tree: TreeId, node: NodeId },
    List { tree: TreeId },
    Remove { id: BookmarkId },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            err.downcast_ref::<EngineError>()
                .map_or(exit_codes::INVALID, |e| exit_codes::for_kind(e.kind()))
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = cli.config.as_path();

    match cli.command {
        Command::Init { force } => return cmd_init(config, force),
        Command::Case(CaseCommand::Add(args)) => {
            let (_, store) = open(config)?;
            let context = match (args.context, args.context_file) {
                (Some(text), _) => text,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("read case context {}", path.display()))?,
                (None, None) => String::new(),
            };
            let case = store
                .insert_case(NewCase {
                    name: args.name,
                    context,
                })
                .or_storage()?;
            print_json(&case)?;
        }
        Command::Continue { case, tree, goal } => {
            let (cfg, store) = open(config)?;
            let generator = build_generator(&cfg)?;
            let result = continue_conversation(
                &store,
                &generator,
                &ContinueRequest {
                    case_id: case,
                    tree_id: tree,
                    simulation_goal: goal,
                },
            )?;
            return print_tree_result(&result);
        }
        Command::Generate { case, goal } => {
            let (cfg, store) = open(config)?;
            let generator = build_generator(&cfg)?;
            let result = generate_tree(&store, &generator, case, &goal)?;
            return print_tree_result(&result);
        }
        Command::Select { node } => print_json(&select(&open(config)?.1, node)?)?,
        Command::Trim { node } => {
            let deleted = trim_after_children(&open(config)?.1, node)?;
            print_json(&json!({ "deleted": deleted }))?;
        }
        Command::Prune { node } => {
            let deleted = prune_children(&open(config)?.1, node)?;
            print_json(&json!({ "deleted": deleted }))?;
        }
        Command::Node(NodeCommand::Add {
            tree,
            parent,
            role,
            content,
        }) => {
            let node = create_custom_node(&open(config)?.1, tree, parent, &content, &role)?;
            print_json(&node)?;
        }
        Command::Tree(TreeCommand::New {
            case,
            headline,
            brief,
        }) => {
            let tree = create_tree(&open(config)?.1, case, TreeMeta { headline, brief })?;
            print_json(&tree)?;
        }
        Command::Tree(TreeCommand::Show { tree }) => {
            let views: Vec<MessageView> = tree_view(&open(config)?.1, tree)?;
            print_json(&views)?;
        }
        Command::Tree(TreeCommand::Path { tree }) => {
            let path = selected_only(&open(config)?.1, tree)?;
            print_json(&path.iter().collect::<Vec<_>>())?;
        }
        Command::Tree(TreeCommand::Summary { tree }) => {
            print_json(&tree_summary(&open(config)?.1, tree)?)?;
        }
        Command::Frontier { tree } => print_json(&frontier(&open(config)?.1, tree)?)?,
        Command::Range { start, end } => {
            print_json(&selected_range(&open(config)?.1, start, end)?)?;
        }
        Command::Validate { tree } => {
            let errors = check_tree(&open(config)?.1, tree)?;
            print_json(&json!({ "tree_id": tree, "valid": errors.is_empty(), "errors": errors }))?;
            if !errors.is_empty() {
                return Ok(exit_codes::INVALID);
            }
        }
        Command::Bookmark(BookmarkCommand::Add { tree, node }) => {
            print_json(&add_bookmark(&open(config)?.1, tree, node)?)?;
        }
        Command::Bookmark(BookmarkCommand::List { tree }) => {
            print_json(&list_bookmarks(&open(config)?.1, tree)?)?;
        }
        Command::Bookmark(BookmarkCommand::Remove { id }) => {
            remove_bookmark(&open(config)?.1, id)?;
            print_json(&json!({ "removed": id }))?;
        }
    }
    Ok(exit_codes::OK)
}

/// Load the config and open the store it names.
fn open(config: &Path) -> Result<(EngineConfig, FileStore)> {
    let cfg = load_config(config)?;
    debug!(store = %cfg.store_path.display(), "config loaded");
    let store = FileStore::new(&cfg.store_path);
    Ok((cfg, store))
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    let cfg = if force || !config_path.exists() {
        let cfg = EngineConfig::default();
        write_config(config_path, &cfg)?;
        cfg
    } else {
        load_config(config_path)?
    };
    FileStore::new(&cfg.store_path).ensure_exists()?;
    print_json(&json!({
        "config": config_path.display().to_string(),
        "store": cfg.store_path.display().to_string(),
    }))?;
    Ok(exit_codes::OK)
}

fn build_generator(cfg: &EngineConfig) -> Result<DialogueGenerator<CommandModel>> {
    let model = CommandModel::from_config(&cfg.model)?;
    DialogueGenerator::new(model, cfg.model.clone(), cfg.generation.clone())
}

/// A result carrying a generation error is printed, then reported as an
/// upstream failure.
fn print_tree_result(result: &TreeResult) -> Result<i32> {
    print_json(result)?;
    if let Some(error) = &result.error {
        eprintln!("generation failed: {error}");
        return Ok(exit_codes::UPSTREAM);
    }
    Ok(exit_codes::OK)
}

/// Print `value` as pretty JSON with a trailing newline.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{payload}");
    Ok(())
}

//! # Project Memory CLI (`pmem`)
//!
//! The `pmem` binary records and queries the project memory: sessions,
//! insights, patterns, problems, context windows and development events,
//! plus indexing of the source tree and the query service.
//!
//! ## Usage
//!
//! ```bash
//! pmem --config ./config/pmem.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pmem init` | Write a starter config and open the first session |
//! | `pmem session start\|end\|list` | Manage sessions |
//! | `pmem save <file>` | Save a file as a context window |
//! | `pmem context <query>` | Newest matching context windows |
//! | `pmem search <query>` | Search insights, patterns, problems, history |
//! | `pmem insight` / `insights` | Record or list insights |
//! | `pmem pattern` / `patterns` | Record or list patterns |
//! | `pmem problem track\|solve\|similar\|list` | Problem tracking |
//! | `pmem event` / `history` | Development events |
//! | `pmem analyze class\|system\|file\|hierarchy` | Analysis from memory and source |
//! | `pmem index [root]` | Scan the source tree into memory |
//! | `pmem lint <file>` | Run the style lint over one file |
//! | `pmem stats` | Store statistics and health |
//! | `pmem export` / `import` / `cleanup` | Store maintenance |
//! | `pmem serve` | Start the knowledge query service |
//!
//! A missing config file is not an error: built-in defaults are used.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use project_memory::code_search;
use project_memory::config::{self, Config};
use project_memory::indexer::{complexity_label, Indexer};
use project_memory::knowledge::{self, KnowledgeCache};
use project_memory::lint;
use project_memory::models::{ContextPayload, Impact};
use project_memory::progress::ProgressMode;
use project_memory::scanner::{ScanLimits, Scanner};
use project_memory::server;
use project_memory::stats;
use project_memory::store::{MemoryStore, SearchCategory};

/// Characters of a saved file kept in its context window.
const SAVE_PREVIEW_CHARS: usize = 500;

/// Project Memory CLI: persistent memory and source indexing for a game
/// codebase.
#[derive(Parser)]
#[command(
    name = "pmem",
    about = "Project Memory — persistent project memory and source indexer",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pmem.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config (if none exists) and open a session.
    Init {
        /// Session description.
        description: Vec<String>,
    },

    /// Start, end or list sessions.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Save a file as a context window.
    Save {
        file: PathBuf,
        /// Note recorded with the save.
        #[arg(long)]
        description: Option<String>,
    },

    /// Newest context windows matching a query.
    Context {
        query: String,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Search memory by substring.
    Search {
        query: String,
        /// Comma-separated: insights, patterns, problems, history, contexts.
        #[arg(long, value_delimiter = ',')]
        categories: Vec<SearchCategory>,
    },

    /// Record an insight.
    Insight {
        #[arg(value_name = "TYPE")]
        kind: String,
        description: String,
        /// File whose first lines are attached as context.
        #[arg(long)]
        context_file: Option<PathBuf>,
    },

    /// List insights, most relevant first.
    Insights {
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        min_relevance: f64,
    },

    /// Record a pattern.
    Pattern {
        name: String,
        description: String,
        examples: Vec<String>,
    },

    /// List patterns, most confident first.
    Patterns {
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
    },

    /// Track and solve problems.
    Problem {
        #[command(subcommand)]
        action: ProblemAction,
    },

    /// Record a development event.
    Event {
        #[arg(value_name = "TYPE")]
        kind: String,
        description: String,
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
        #[arg(long, default_value = "medium")]
        impact: Impact,
    },

    /// Recent development events, newest first.
    History {
        #[arg(long = "type")]
        kind: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Analyze a class, system, file or class hierarchy.
    Analyze {
        #[command(subcommand)]
        target: AnalyzeTarget,
    },

    /// Scan the source tree into memory.
    Index {
        /// Defaults to `[indexer].root`.
        root: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,
    },

    /// Report magic numbers and long functions in one file.
    Lint { file: PathBuf },

    /// Store statistics and health.
    Stats,

    /// Write a full copy of the store.
    Export { file: Option<PathBuf> },

    /// Replace the store with an exported copy.
    Import { file: PathBuf },

    /// Drop sessions, context windows and low-relevance insights older than N days.
    Cleanup {
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(0..))]
        days: i64,
    },

    /// Start the knowledge query service.
    Serve,
}

#[derive(Subcommand)]
enum SessionAction {
    Start { description: Vec<String> },
    End { summary: Vec<String> },
    List,
}

#[derive(Subcommand)]
enum ProblemAction {
    Track { description: Vec<String> },
    Solve {
        id: String,
        solution: Vec<String>,
        /// Record the attempt as unsuccessful.
        #[arg(long)]
        failed: bool,
    },
    Similar { description: Vec<String> },
    List,
}

#[derive(Subcommand)]
enum AnalyzeTarget {
    Class { name: String },
    System {
        name: String,
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },
    /// Path relative to the source root.
    File { file: String },
    Hierarchy { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if matches!(cli.command, Commands::Serve) {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { description } = &cli.command {
        if config::write_starter_config(&cli.config)? {
            println!("Wrote starter config to {}", cli.config.display());
        }
        let cfg = config::load_config(&cli.config)?;
        return run_init(&cfg, &joined(description, "CLI initialization session"));
    }

    let cfg = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Stats => stats::run_stats(&cfg)?,
        Commands::Lint { file } => run_lint(&cfg, &file)?,
        Commands::Analyze { target } => run_analyze(&cfg, target)?,
        Commands::Index { root, progress } => {
            let mut store = MemoryStore::open(&cfg)?;
            let root = root.unwrap_or_else(|| cfg.indexer.root.clone());
            let reporter = progress.reporter();
            let stats = Indexer::new(&cfg)?.index_tree(&mut store, &root, reporter.as_ref())?;
            println!("Indexed {}", root.display());
            println!(
                "  Files:   {} processed, {} skipped ({} total)",
                stats.processed_files, stats.skipped_files, stats.total_files
            );
            println!(
                "  Types:   {} headers, {} implementation, {} build",
                stats.header_files, stats.implementation_files, stats.build_files
            );
            println!(
                "  Lines:   {} (avg {:.0}, {} complexity)",
                stats.total_lines,
                stats.average_lines(),
                complexity_label(stats.average_lines())
            );
            println!("  Classes: {}", stats.classes_found);
            if !stats.errors.is_empty() {
                println!("  Errors:  {}", stats.errors.len());
                for e in &stats.errors {
                    println!("    {}: {}", e.file, e.error);
                }
            }
        }
        command => {
            let mut store = MemoryStore::open(&cfg)?;
            run_store_command(&mut store, command)?;
        }
    }

    Ok(())
}

fn joined(words: &[String], fallback: &str) -> String {
    if words.is_empty() {
        fallback.to_string()
    } else {
        words.join(" ")
    }
}

fn run_init(cfg: &Config, description: &str) -> anyhow::Result<()> {
    let mut store = MemoryStore::open(cfg)?;
    if let Some(id) = store.current_session_id() {
        println!("Session already open: {}", id);
        return Ok(());
    }
    let session_id = store.start_session(description)?;
    store.add_insight(
        "project-init",
        &format!("Memory system initialized for {}", cfg.project.name),
        json!({ "engineVersion": cfg.project.engine_version }),
    )?;
    println!("Memory initialized at {}", store.path().display());
    println!("Session started: {}", session_id);
    Ok(())
}

fn run_store_command(store: &mut MemoryStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Session { action } => match action {
            SessionAction::Start { description } => {
                let description = joined(&description, "New development session");
                let id = store.start_session(&description)?;
                println!("Session started: {}", id);
                println!("  {}", description);
            }
            SessionAction::End { summary } => {
                let summary = joined(&summary, "Session ended via CLI");
                match store.end_session(&summary)? {
                    Some(id) => println!("Session ended: {}", id),
                    None => println!("No open session"),
                }
            }
            SessionAction::List => {
                let sessions = store.sessions();
                println!("Sessions: {}", sessions.len());
                for s in sessions {
                    let state = if s.is_open() { "open" } else { "ended" };
                    println!(
                        "  {}  {}  {}  {}",
                        s.id,
                        s.started.format("%Y-%m-%d %H:%M"),
                        state,
                        s.description
                    );
                }
            }
        },
        Commands::Save { file, description } => {
            let code = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let line_count = code.lines().count();
            let mut preview: String = code.chars().take(SAVE_PREVIEW_CHARS).collect();
            if preview.len() < code.len() {
                preview.push_str("...");
            }
            let id = store.save_context_window(ContextPayload::CodeSnippet {
                file: Some(file.display().to_string()),
                language: language_for(&file),
                code: preview,
            })?;
            if let Some(description) = description {
                store.log_action(
                    "context_saved",
                    json!({ "contextId": id, "description": description }),
                )?;
            }
            println!("Context saved: {}", id);
            println!("  {} ({} chars, {} lines)", file.display(), code.len(), line_count);
        }
        Commands::Context { query, limit } => {
            let hits = store.get_relevant_context(&query, limit);
            println!("{} relevant context(s) for \"{}\"", hits.len(), query);
            for c in hits {
                println!("  {}  {}  {}", c.id, c.timestamp.format("%Y-%m-%d %H:%M"), c.summary);
            }
        }
        Commands::Search { query, categories } => {
            let categories: &[SearchCategory] = if categories.is_empty() {
                SearchCategory::DEFAULT
            } else {
                &categories
            };
            let results = store.search(&query, categories);
            println!("Search results for \"{}\": {} found", query, results.total());
            for i in &results.insights {
                println!("  insight  {}: {}", i.kind, i.description);
            }
            for p in &results.patterns {
                println!("  pattern  {}: {}", p.name, p.description);
            }
            for p in &results.problems {
                println!("  problem  {} ({:?})", p.description, p.status);
            }
            for e in &results.history {
                println!("  event    {}: {}", e.kind, e.description);
            }
            for c in &results.contexts {
                println!("  context  {}", c.summary);
            }
        }
        Commands::Insight {
            kind,
            description,
            context_file,
        } => {
            let context = match context_file {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let preview: String = text.chars().take(200).collect();
                    json!({ "file": path.display().to_string(), "preview": preview })
                }
                None => json!({}),
            };
            let id = store.add_insight(&kind, &description, context)?;
            println!("Insight added: {}", id);
        }
        Commands::Insights {
            kind,
            min_relevance,
        } => {
            let insights = store.get_insights(kind.as_deref(), min_relevance);
            println!("Insights: {}", insights.len());
            for i in insights {
                println!("  {:.2}  {}: {}", i.relevance, i.kind, i.description);
            }
        }
        Commands::Pattern {
            name,
            description,
            examples,
        } => {
            let id = store.add_pattern(&name, &description, examples, 1)?;
            println!("Pattern recorded: {}", id);
        }
        Commands::Patterns { min_confidence } => {
            let patterns = store.get_patterns(min_confidence);
            println!("Patterns: {}", patterns.len());
            for p in patterns {
                println!(
                    "  {:.1}  {} (seen {}x): {}",
                    p.confidence, p.name, p.frequency, p.description
                );
            }
        }
        Commands::Problem { action } => match action {
            ProblemAction::Track { description } => {
                if description.is_empty() {
                    bail!("problem description must not be empty");
                }
                let id = store.add_problem(&description.join(" "), json!({}))?;
                println!("Problem tracked: {}", id);
            }
            ProblemAction::Solve {
                id,
                solution,
                failed,
            } => {
                if solution.is_empty() {
                    bail!("solution must not be empty");
                }
                if !store.add_solution(&id, &solution.join(" "), !failed)? {
                    bail!("Problem not found: {}", id);
                }
                println!("Solution recorded for {}", id);
            }
            ProblemAction::Similar { description } => {
                let similar = store.get_similar_problems(&description.join(" "));
                println!("Similar problems: {}", similar.len());
                for s in similar {
                    println!(
                        "  {:.2}  {}  {} ({:?})",
                        s.similarity, s.problem.id, s.problem.description, s.problem.status
                    );
                }
            }
            ProblemAction::List => {
                let problems = &store.document().problems;
                println!("Problems: {}", problems.len());
                for p in problems {
                    println!("  {}  {:?}  {}", p.id, p.status, p.description);
                }
            }
        },
        Commands::Event {
            kind,
            description,
            files,
            impact,
        } => {
            let id = store.add_development_event(&kind, &description, files, impact)?;
            println!("Event recorded: {}", id);
        }
        Commands::History { kind, limit } => {
            let events = store.get_development_history(kind.as_deref(), limit);
            println!("Events: {}", events.len());
            for e in events {
                println!(
                    "  {}  {}  {:?}  {}",
                    e.timestamp.format("%Y-%m-%d %H:%M"),
                    e.kind,
                    e.impact,
                    e.description
                );
            }
        }
        Commands::Export { file } => {
            let path = store.export_memory(file.as_deref())?;
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            println!("Memory exported to {}", path.display());
            println!("  {}", stats::format_bytes(size));
        }
        Commands::Import { file } => {
            store.import_memory(&file)?;
            let stats = store.get_memory_stats();
            println!("Memory imported from {}", file.display());
            println!(
                "  {} insights, {} patterns, {} problems",
                stats.total_insights, stats.total_patterns, stats.total_problems
            );
        }
        Commands::Cleanup { days } => {
            let report = store.cleanup(days)?;
            println!("Cleaned up data older than {} days", days);
            println!(
                "  removed {} sessions, {} context windows, {} insights",
                report.sessions_removed, report.context_windows_removed, report.insights_removed
            );
        }
        Commands::Init { .. }
        | Commands::Serve
        | Commands::Stats
        | Commands::Lint { .. }
        | Commands::Analyze { .. }
        | Commands::Index { .. } => unreachable!(),
    }
    Ok(())
}

fn run_analyze(cfg: &Config, target: AnalyzeTarget) -> anyhow::Result<()> {
    let store = MemoryStore::open(cfg)?;
    match target {
        AnalyzeTarget::Class { name } => {
            let analysis = knowledge::analyze_class(&store, &name);
            println!("Class: {}", name);
            match &analysis.class_info {
                Some(info) => {
                    println!("  File:        {}", info.file);
                    println!("  Lines:       {}", info.line_count);
                    println!(
                        "  Inherits:    {}",
                        info.inheritance.as_deref().unwrap_or("-")
                    );
                    println!("  Functions:   {}", info.functions);
                    println!("  Complexity:  {:?}", info.complexity);
                }
                None => println!("  Class not found in memory"),
            }
            println!("  Relevant context: {} entries", analysis.relevant_context.len());
            for r in &analysis.recommendations {
                println!("  - {}", r);
            }
        }
        AnalyzeTarget::System { name, depth } => {
            let mut cache = KnowledgeCache::new();
            cache.sync(&store);
            let report = knowledge::system_dependencies(cache.document(&store), &name, depth);
            println!("System: {} (depth {})", report.system, report.depth);
            println!("  Direct:     {}", list_or_dash(&report.direct_dependencies));
            println!("  Indirect:   {}", list_or_dash(&report.indirect_dependencies));
            println!("  Dependents: {}", list_or_dash(&report.dependents));
            let risk = &report.risk_assessment;
            println!(
                "  Risk:       cyclic={} high_coupling={} critical_path={}",
                risk.cyclic_dependencies, risk.high_coupling, risk.critical_path
            );
        }
        AnalyzeTarget::File { file } => {
            let scanner = Scanner::new(ScanLimits::from(&cfg.scanner));
            let analysis = code_search::analyze_file(
                &cfg.indexer.root,
                &file,
                &scanner,
                cfg.scanner.long_function_lines,
            )?;
            println!("File: {}", analysis.file);
            println!("  Type:       {:?}", analysis.file_type);
            println!("  Lines:      {} ({:?})", analysis.line_count, analysis.complexity);
            println!("  Purpose:    {}", analysis.purpose);
            println!(
                "  Classes:    {}",
                analysis
                    .classes
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            println!("  Functions:  {}", analysis.functions.len());
            println!("  Depends on: {}", list_or_dash(&analysis.dependencies));
            println!("  Issues:     {}", analysis.issues.len());
        }
        AnalyzeTarget::Hierarchy { name } => {
            let hierarchy = knowledge::class_hierarchy(store.document(), &cfg.indexer.root, &name);
            println!("Hierarchy: {}", name);
            for (depth, link) in hierarchy.chain.iter().enumerate() {
                println!(
                    "  {}{}{}",
                    "  ".repeat(depth),
                    link.name,
                    link.file
                        .as_deref()
                        .map(|f| format!("  ({})", f))
                        .unwrap_or_default()
                );
            }
            if hierarchy.cycle {
                println!("  (inheritance cycle detected)");
            }
            if !hierarchy.children.is_empty() {
                println!("  Children: {}", hierarchy.children.join(", "));
            }
        }
    }
    Ok(())
}

fn run_lint(cfg: &Config, file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let issues = lint::check(&text, cfg.scanner.long_function_lines);
    println!("{}: {} issue(s)", file.display(), issues.len());
    for issue in issues {
        println!("  {}:{}  {}  {}", file.display(), issue.line, issue.severity, issue.message);
    }
    Ok(())
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn language_for(path: &Path) -> Option<String> {
    let lang = match path.extension()?.to_str()? {
        "h" | "hpp" | "cpp" | "cc" => "cpp",
        "cs" => "csharp",
        other => other,
    };
    Some(lang.to_string())
}

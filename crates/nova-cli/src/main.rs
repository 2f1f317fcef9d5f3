use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use nova_classfile::ClassFile;
use nova_flow::{
    analyze_class, analyze_method, FlowConfig, MethodOutcome, MethodReport, RichControlFlow,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(
    name = "nova",
    version,
    about = "Nova bytecode flow analysis (parameter leaks, control flow graphs)"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report which parameters of each method may be dereferenced or escape
    Leaks(LeaksArgs),
    /// Print the control flow graph of a single method
    Cfg(CfgArgs),
}

#[derive(Args)]
struct LeaksArgs {
    /// Path to a `.class` file
    class: PathBuf,
    /// Only analyse methods with this name
    #[arg(long)]
    method: Option<String>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
    /// TOML file with `[flow]` and `[logging]` tables
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct CfgArgs {
    /// Path to a `.class` file
    class: PathBuf,
    /// Method name
    #[arg(long)]
    method: String,
    /// Method descriptor, to pick one of several overloads
    #[arg(long)]
    descriptor: Option<String>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
    /// TOML file with `[flow]` and `[logging]` tables
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CliConfig {
    flow: FlowConfig,
    logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or a full `EnvFilter` directive string.
    level: String,
    /// Emit logs in JSON format.
    json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".to_owned()
    }

    fn normalize_level_directives(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::default_level();
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => "trace".to_owned(),
            "debug" => "debug".to_owned(),
            "info" => "info".to_owned(),
            "warn" | "warning" => "warn".to_owned(),
            "error" => "error".to_owned(),
            // Anything else is treated as an `EnvFilter` directive string.
            _ => trimmed.to_owned(),
        }
    }

    /// Effective filter: the configured level, with `NOVA_LOG` (or `RUST_LOG`)
    /// merged on top when set.
    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        let env_directives = ["NOVA_LOG", "RUST_LOG"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .map(|value| value.trim().to_owned())
            .find(|value| !value.is_empty());

        let config_directives = Self::normalize_level_directives(&self.level);
        let fallback = || {
            tracing_subscriber::EnvFilter::try_new(&config_directives).unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::default()
                    .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into())
            })
        };

        match env_directives {
            Some(env_directives) => {
                let combined = format!("{config_directives},{env_directives}");
                tracing_subscriber::EnvFilter::try_new(combined)
                    .or_else(|_| tracing_subscriber::EnvFilter::try_new(&env_directives))
                    .unwrap_or_else(|_| fallback())
            }
            None => fallback(),
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let Some(path) = path else {
        return Ok(CliConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn init_tracing(logging: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(logging.env_filter())
        .with_writer(std::io::stderr);
    // A subscriber may already be installed when running under the test harness.
    let _ = if logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Leaks(args) => {
            let config = load_config(args.config.as_deref())?;
            init_tracing(&config.logging);
            let mut class = read_class(&args.class)?;
            if let Some(name) = &args.method {
                class.methods.retain(|m| &m.name == name);
                if class.methods.is_empty() {
                    anyhow::bail!("no method named `{name}` in {}", class.this_class);
                }
            }
            tracing::debug!(
                target: "nova.cli",
                class = %class.this_class,
                methods = class.methods.len(),
                "analysing class"
            );

            let reports = analyze_class(&class, &config.flow, &CancellationToken::new());
            let failed = reports
                .iter()
                .any(|r| matches!(r.outcome, MethodOutcome::Failed(_)));
            print_leaks(&LeaksReport::new(&class.this_class, &reports), args.json)?;
            Ok(if failed { 1 } else { 0 })
        }
        Command::Cfg(args) => {
            let config = load_config(args.config.as_deref())?;
            init_tracing(&config.logging);
            let class = read_class(&args.class)?;
            let member = class
                .method(&args.method, args.descriptor.as_deref())
                .with_context(|| {
                    format!("no method named `{}` in {}", args.method, class.this_class)
                })?;

            match analyze_method(member, &config.flow, &CancellationToken::new()) {
                Ok(analysis) => {
                    let report = CfgReport::new(
                        &class.this_class,
                        &member.name,
                        &member.descriptor,
                        &analysis.flow,
                    );
                    print_cfg(&report, args.json)?;
                    Ok(0)
                }
                Err(err) => {
                    tracing::warn!(
                        target: "nova.cli",
                        method = %member.name,
                        error = %err,
                        "control flow unavailable"
                    );
                    eprintln!(
                        "{}.{}{}: {err}",
                        class.this_class, member.name, member.descriptor
                    );
                    Ok(1)
                }
            }
        }
    }
}

fn read_class(path: &Path) -> Result<ClassFile> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    ClassFile::parse(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

#[derive(Serialize)]
struct LeaksReport<'a> {
    class: &'a str,
    methods: Vec<MethodLeaks<'a>>,
}

#[derive(Serialize)]
struct MethodLeaks<'a> {
    name: &'a str,
    descriptor: &'a str,
    #[serde(flatten)]
    status: LeakStatus<'a>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum LeakStatus<'a> {
    Analyzed {
        not_null: &'a [bool],
        nullable: &'a [bool],
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl<'a> LeaksReport<'a> {
    fn new(class: &'a str, reports: &'a [MethodReport]) -> Self {
        let methods = reports
            .iter()
            .map(|report| MethodLeaks {
                name: &report.name,
                descriptor: &report.descriptor,
                status: match &report.outcome {
                    MethodOutcome::Analyzed(analysis) => LeakStatus::Analyzed {
                        not_null: &analysis.leaks.not_null,
                        nullable: &analysis.leaks.nullable,
                    },
                    MethodOutcome::Failed(err) => LeakStatus::Failed {
                        error: err.to_string(),
                    },
                    MethodOutcome::Cancelled => LeakStatus::Cancelled,
                },
            })
            .collect();
        Self { class, methods }
    }
}

fn print_leaks(report: &LeaksReport<'_>, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report)?;
        println!("{out}");
        return Ok(());
    }

    println!("{}:", report.class);
    for method in &report.methods {
        match &method.status {
            LeakStatus::Analyzed { not_null, nullable } => println!(
                "  {}{}: not_null: {} nullable: {}",
                method.name,
                method.descriptor,
                flagged(not_null),
                flagged(nullable)
            ),
            LeakStatus::Failed { error } => {
                println!("  {}{}: error: {error}", method.name, method.descriptor)
            }
            LeakStatus::Cancelled => println!("  {}{}: cancelled", method.name, method.descriptor),
        }
    }
    Ok(())
}

/// Parameter indices whose flag is set, e.g. `[0, 2]`.
fn flagged(flags: &[bool]) -> String {
    let indices: Vec<String> = flags
        .iter()
        .enumerate()
        .filter(|&(_, &set)| set)
        .map(|(idx, _)| idx.to_string())
        .collect();
    format!("[{}]", indices.join(", "))
}

#[derive(Serialize)]
struct CfgReport<'a> {
    class: &'a str,
    method: &'a str,
    descriptor: &'a str,
    nodes: usize,
    reducible: bool,
    edges: Vec<EdgeReport>,
    /// `(instruction, handler)` pairs for handlers that catch `NullPointerException`.
    npe_edges: Vec<(usize, usize)>,
}

#[derive(Serialize)]
struct EdgeReport {
    from: usize,
    to: usize,
    normal: bool,
    error: bool,
    back: bool,
}

impl<'a> CfgReport<'a> {
    fn new(
        class: &'a str,
        method: &'a str,
        descriptor: &'a str,
        flow: &RichControlFlow,
    ) -> Self {
        let mut edges: Vec<_> = flow.graph.edges().collect();
        edges.sort();
        let edges = edges
            .into_iter()
            .map(|edge| EdgeReport {
                from: edge.from,
                to: edge.to,
                normal: flow.graph.is_normal_edge(edge),
                error: flow.graph.is_error_edge(edge),
                back: flow.dfs.is_back_edge(edge),
            })
            .collect();
        let mut npe_edges: Vec<_> = flow
            .graph
            .npe_edges()
            .iter()
            .map(|(&insn, &handler)| (insn, handler))
            .collect();
        npe_edges.sort_unstable();
        Self {
            class,
            method,
            descriptor,
            nodes: flow.graph.node_count(),
            reducible: flow.reducible,
            edges,
            npe_edges,
        }
    }
}

fn print_cfg(report: &CfgReport<'_>, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(report)?;
        println!("{out}");
        return Ok(());
    }

    println!("{}.{}{}", report.class, report.method, report.descriptor);
    println!("  nodes: {}", report.nodes);
    println!("  edges: {}", report.edges.len());
    println!("  reducible: {}", report.reducible);
    for edge in &report.edges {
        let mut tags = Vec::new();
        if edge.error {
            tags.push("error");
        }
        if edge.back {
            tags.push("back");
        }
        if tags.is_empty() {
            println!("  {} -> {}", edge.from, edge.to);
        } else {
            println!("  {} -> {} ({})", edge.from, edge.to, tags.join(", "));
        }
    }
    for (insn, handler) in &report.npe_edges {
        println!("  npe: {insn} -> {handler}");
    }
    Ok(())
}

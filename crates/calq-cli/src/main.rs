mod app;
mod config;
mod repl;
mod solver;

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};

use calq_core::{
    format_decimals, CalculationResult, DisplayMode, GraphRange, HistoryEntry, HistoryExport,
    HistoryFilter, Matrix, OperationType, STATE_KEY,
};
use calq_engine::{Builtin, Engine, MatrixOp};
use calq_store::SqliteStore;

use app::App;
use config::{Config, DisplayConfig};
use solver::{encode_image, SolveRequest, SolverClient};

#[derive(Parser)]
#[command(
    name = "calq",
    version,
    about = "Calculator with symbolic calculus, graph sampling and a persistent history"
)]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print full results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression
    Eval {
        /// Expression, e.g. "2 × π" or "det([[1,2],[3,4]])"
        expression: String,
    },

    /// Sample a function of x (or of x and y with --surface)
    Graph {
        expression: String,

        /// Build a 3D mesh over x and y
        #[arg(long)]
        surface: bool,

        /// Domain start (default: saved range)
        #[arg(long, allow_hyphen_values = true)]
        min: Option<f64>,

        /// Domain end (default: saved range)
        #[arg(long, allow_hyphen_values = true)]
        max: Option<f64>,
    },

    /// Differentiate an expression
    Derive {
        expression: String,

        #[arg(short, long, default_value = "x")]
        variable: String,
    },

    /// Find an antiderivative
    Integrate {
        expression: String,

        #[arg(short, long, default_value = "x")]
        variable: String,
    },

    /// Solve an equation, e.g. "x^2 - 4 = 0"
    Solve {
        equation: String,

        #[arg(short, long, default_value = "x")]
        variable: String,
    },

    /// Descriptive statistics of a data set
    Stats {
        /// Numbers separated by spaces or commas
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<String>,
    },

    /// Matrix arithmetic on JSON matrices, e.g. '[[1,2],[3,4]]'
    Matrix {
        operation: CliMatrixOp,

        /// Matrix A
        a: String,

        /// Matrix B (add and multiply)
        b: Option<String>,
    },

    /// Inspect and manage the calculation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change the saved graph range
    Range {
        #[command(subcommand)]
        action: RangeAction,
    },

    /// Show or set the display mode
    Mode { mode: Option<CliMode> },

    /// Show the session token
    Session {
        /// Start a new session
        #[arg(long)]
        new: bool,
    },

    /// Send a problem (text and/or image) to the remote solver
    Ask {
        prompt: Option<String>,

        /// JPEG, PNG or WebP file, at most 10 MiB
        #[arg(short, long)]
        image: Option<PathBuf>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Evaluate the answer as an expression
        #[arg(long)]
        eval: bool,
    },

    /// Delete all saved state: history, graph range, display mode and session
    Reset {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Interactive session with line editing and recall
    Repl,

    /// Show the active configuration
    Config,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List entries, newest first
    List {
        /// Only this operation type
        #[arg(short = 't', long = "type")]
        operation: Option<CliOperation>,

        /// Entries at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,

        /// Entries at or before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,

        /// Case-insensitive text in expression or result
        #[arg(short, long)]
        search: Option<String>,

        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show one entry with its steps
    Show { id: String },

    /// Remove one entry
    Remove { id: String },

    /// Remove all entries
    Clear,

    /// Write a JSON snapshot
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace the history with a JSON snapshot
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum RangeAction {
    Show,
    /// Shrink to 70% around the center
    ZoomIn,
    /// Grow to 130% around the center
    ZoomOut,
    /// Back to [-10, 10]
    Reset,
    Set {
        #[arg(allow_hyphen_values = true)]
        min: f64,
        #[arg(allow_hyphen_values = true)]
        max: f64,
    },
}

#[derive(Clone, ValueEnum)]
enum CliMatrixOp {
    Add,
    Multiply,
    Determinant,
    Inverse,
    Transpose,
}

impl From<CliMatrixOp> for MatrixOp {
    fn from(val: CliMatrixOp) -> Self {
        match val {
            CliMatrixOp::Add => MatrixOp::Add,
            CliMatrixOp::Multiply => MatrixOp::Multiply,
            CliMatrixOp::Determinant => MatrixOp::Determinant,
            CliMatrixOp::Inverse => MatrixOp::Inverse,
            CliMatrixOp::Transpose => MatrixOp::Transpose,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliMode {
    Calculator,
    Graph,
    History,
    Image,
}

impl From<CliMode> for DisplayMode {
    fn from(val: CliMode) -> Self {
        match val {
            CliMode::Calculator => DisplayMode::Calculator,
            CliMode::Graph => DisplayMode::Graph,
            CliMode::History => DisplayMode::History,
            CliMode::Image => DisplayMode::Image,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum CliOperation {
    Basic,
    Graph,
    Derivative,
    Integral,
    Equation,
    Statistics,
    Matrix,
}

impl From<CliOperation> for OperationType {
    fn from(val: CliOperation) -> Self {
        match val {
            CliOperation::Basic => OperationType::Basic,
            CliOperation::Graph => OperationType::Graph,
            CliOperation::Derivative => OperationType::Derivative,
            CliOperation::Integral => OperationType::Integral,
            CliOperation::Equation => OperationType::Equation,
            CliOperation::Statistics => OperationType::Statistics,
            CliOperation::Matrix => OperationType::Matrix,
        }
    }
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "calq", "calq")
        .map(|dirs| dirs.data_dir().join("state.db"))
        .unwrap_or_else(|| PathBuf::from("calq-state.db"))
}

fn open_store(db: Option<PathBuf>, cfg: &Config) -> Result<SqliteStore> {
    let path = db
        .or_else(|| cfg.store.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    SqliteStore::new(&path).context("failed to open database")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;
    if let Commands::Config = cli.command {
        return cmd_config(&cfg);
    }

    let store = open_store(cli.db, &cfg)?;
    let engine = Engine::new(Builtin).with_sampler(cfg.graph.sampler());
    let mut app = App::load(&store, engine).context("failed to load saved state")?;
    let out = Output {
        display: &cfg.display,
        json: cli.json,
    };

    match cli.command {
        Commands::Eval { expression } => {
            app.set_expression(expression);
            let result = app.evaluate()?;
            out.result(result)
        }
        Commands::Graph {
            expression,
            surface,
            min,
            max,
        } => cmd_graph(&mut app, out, &expression, surface, min, max),
        Commands::Derive {
            expression,
            variable,
        } => {
            let result = app.run(|e| e.calculate_derivative(&expression, &variable))?;
            out.result(result)
        }
        Commands::Integrate {
            expression,
            variable,
        } => {
            let result = app.run(|e| e.calculate_integral(&expression, &variable))?;
            out.result(result)
        }
        Commands::Solve { equation, variable } => {
            let result = app.run(|e| e.solve_equation(&equation, &variable))?;
            out.result(result)
        }
        Commands::Stats { values } => {
            let data = parse_data(&values)?;
            let result = app.run(|e| e.calculate_statistics(&data))?;
            out.result(result)
        }
        Commands::Matrix { operation, a, b } => {
            cmd_matrix(&mut app, out, operation.into(), &a, b.as_deref())
        }
        Commands::History { action } => cmd_history(&mut app, out, action),
        Commands::Range { action } => cmd_range(&mut app, action),
        Commands::Mode { mode } => cmd_mode(&mut app, mode),
        Commands::Session { new } => cmd_session(&mut app, &store, new),
        Commands::Ask {
            prompt,
            image,
            max_tokens,
            eval,
        } => cmd_ask(&mut app, &cfg, out, prompt, image, max_tokens, eval),
        Commands::Reset { yes } => cmd_reset(&mut app, yes),
        Commands::Repl => {
            let stdin = std::io::stdin();
            if stdin.is_terminal() {
                repl::run(&mut app, &cfg.display, &repl::history_path())
            } else {
                repl::run_lines(&mut app, &cfg.display, stdin.lock(), &mut std::io::stdout())
            }
        }
        Commands::Config => cmd_config(&cfg),
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Output<'a> {
    display: &'a DisplayConfig,
    json: bool,
}

impl Output<'_> {
    fn trim(&self, text: &str) -> String {
        format_decimals(text, self.display.decimal_places)
    }

    fn result(&self, result: &CalculationResult) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else if result.error.is_none() {
            if self.display.show_steps {
                for step in &result.steps {
                    println!("  {}", self.trim(step));
                }
            }
            println!("{}", self.trim(&result.result));
        }
        if let Some(error) = &result.error {
            bail!("{error}");
        }
        Ok(())
    }

    fn entry(&self, entry: &HistoryEntry) {
        println!(
            "{}  {}  {:<10} {} = {}",
            entry.id,
            entry.timestamp.format("%Y-%m-%d %H:%M"),
            entry.operation_type.to_string(),
            entry.expression,
            self.trim(&entry.result).replace('\n', " ")
        );
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_graph(
    app: &mut App,
    out: Output,
    expression: &str,
    surface: bool,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<()> {
    let saved = app.graph_range();
    let range = GraphRange::new(min.unwrap_or(saved.min), max.unwrap_or(saved.max))?;
    let result = if surface {
        app.run(|e| e.generate_surface(expression, range))?
    } else {
        app.run(|e| e.generate_graph(expression, range))?
    };
    out.result(result)
}

fn cmd_matrix(
    app: &mut App,
    out: Output,
    op: MatrixOp,
    a: &str,
    b: Option<&str>,
) -> Result<()> {
    let a = parse_matrix(a).context("matrix A")?;
    let b = b.map(parse_matrix).transpose().context("matrix B")?;
    let result = app.run(|e| e.calculate_matrix(op, &a, b.as_ref()))?;
    out.result(result)
}

fn cmd_history(app: &mut App, out: Output, action: HistoryAction) -> Result<()> {
    match action {
        HistoryAction::List {
            operation,
            since,
            until,
            search,
            limit,
        } => {
            let filter = HistoryFilter {
                operation_type: operation.map(Into::into),
                since: since.as_deref().map(parse_time).transpose()?,
                until: until.as_deref().map(parse_time).transpose()?,
                search,
            };
            let entries: Vec<_> = app
                .history()
                .filter(&filter)
                .take(limit.unwrap_or(usize::MAX))
                .collect();
            if out.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No history entries.");
            } else {
                for entry in entries {
                    out.entry(entry);
                }
            }
        }
        HistoryAction::Show { id } => {
            let Some(entry) = app.history().get(&id) else {
                bail!("no history entry with id {id}");
            };
            if out.json {
                println!("{}", serde_json::to_string_pretty(entry)?);
            } else {
                out.entry(entry);
                for step in &entry.steps {
                    println!("  {}", out.trim(step));
                }
            }
        }
        HistoryAction::Remove { id } => {
            if app.remove_history(&id)? {
                println!("Removed: {id}");
            } else {
                println!("No entry {id}, nothing removed.");
            }
        }
        HistoryAction::Clear => {
            let n = app.history().len();
            app.clear_history()?;
            println!("Cleared {n} entries.");
        }
        HistoryAction::Export { output } => {
            let json = serde_json::to_string_pretty(&app.export_history())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exported {} entries to {}", app.history().len(), path.display());
                }
                None => println!("{json}"),
            }
        }
        HistoryAction::Import { file } => {
            let export = read_export(&file)?;
            let n = app.import_history(export)?;
            println!("Imported {n} entries.");
        }
    }
    Ok(())
}

fn cmd_range(app: &mut App, action: RangeAction) -> Result<()> {
    let range = match action {
        RangeAction::Show => app.graph_range(),
        RangeAction::ZoomIn => app.zoom_in()?,
        RangeAction::ZoomOut => app.zoom_out()?,
        RangeAction::Reset => {
            app.reset_graph()?;
            app.graph_range()
        }
        RangeAction::Set { min, max } => {
            let range = GraphRange::new(min, max)?;
            app.set_graph_range(range)?;
            range
        }
    };
    println!("{range}");
    Ok(())
}

fn cmd_mode(app: &mut App, mode: Option<CliMode>) -> Result<()> {
    if let Some(mode) = mode {
        app.set_display_mode(mode.into())?;
    }
    println!("{}", app.display_mode());
    Ok(())
}

fn cmd_session(app: &mut App, store: &SqliteStore, new: bool) -> Result<()> {
    if new {
        app.generate_user_session()?;
    }
    println!("Session: {}", app.user_session());
    if let Some(at) = store.updated_at(STATE_KEY)? {
        println!("Saved:   {}", at.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}

fn cmd_reset(app: &mut App, yes: bool) -> Result<()> {
    if !yes {
        eprint!("Delete all saved history and settings? [y/N] ");
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !matches!(answer.trim(), "y" | "Y" | "yes") {
            println!("Aborted");
            return Ok(());
        }
    }
    app.forget()?;
    println!("Saved state removed");
    Ok(())
}

fn cmd_ask(
    app: &mut App,
    cfg: &Config,
    out: Output,
    prompt: Option<String>,
    image: Option<PathBuf>,
    max_tokens: Option<u32>,
    eval: bool,
) -> Result<()> {
    let Some(endpoint) = cfg.solver.endpoint.as_deref() else {
        bail!("no solver endpoint configured (set [solver] endpoint in the config file)");
    };

    let image_base64 = match image {
        Some(path) => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let encoded = encode_image(&bytes)?;
            app.set_uploaded_image(Some(encoded.clone()));
            Some(encoded)
        }
        None => None,
    };

    // Image-only requests keep the smaller built-in budget unless overridden.
    let max_tokens = max_tokens.or_else(|| prompt.is_some().then_some(cfg.solver.max_tokens));
    let request = SolveRequest::new(prompt, image_base64, max_tokens)?;
    let client = SolverClient::new(endpoint, Duration::from_secs(cfg.solver.timeout_secs));
    app.set_calculating(true);
    let response = match client.solve(&request) {
        Ok(r) => r,
        Err(e) => {
            app.set_calculating(false);
            app.set_error(Some(e.to_string()));
            return Err(e.into());
        }
    };
    app.set_calculating(false);
    app.set_image_analysis_result(Some(response.text.clone()));

    println!("{}", response.text);
    if let Some(usage) = &response.usage {
        println!(
            "(tokens: {} in, {} out)",
            usage.input_tokens, usage.output_tokens
        );
    }

    if eval {
        app.set_expression(response.text.trim());
        let result = app.evaluate()?;
        out.result(result)?;
    }
    Ok(())
}

fn cmd_config(cfg: &Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[store]");
    println!(
        "  path = {}",
        cfg.store
            .path
            .as_deref()
            .unwrap_or("(default platform path)")
    );
    println!();
    println!("[display]");
    println!("  decimal_places = {}", cfg.display.decimal_places);
    println!("  show_steps = {}", cfg.display.show_steps);
    println!();
    println!("[graph]");
    println!("  samples = {}", cfg.graph.samples);
    println!("  surface_divisions = {}", cfg.graph.surface_divisions);
    println!();
    println!("[solver]");
    println!(
        "  endpoint = {}",
        cfg.solver.endpoint.as_deref().unwrap_or("(not set)")
    );
    println!("  max_tokens = {}", cfg.solver.max_tokens);
    println!("  timeout_secs = {}", cfg.solver.timeout_secs);
    Ok(())
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Numbers from arguments that may themselves hold comma-separated lists.
fn parse_data(values: &[String]) -> Result<Vec<f64>> {
    values
        .iter()
        .flat_map(|v| v.split([',', ' ']))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().with_context(|| format!("not a number: {s}")))
        .collect()
}

fn parse_matrix(text: &str) -> Result<Matrix> {
    serde_json::from_str(text).with_context(|| format!("invalid matrix {text}"))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .with_context(|| format!("invalid time {text} (expected RFC 3339 or YYYY-MM-DD)"))?;
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .with_context(|| format!("invalid date {text}"))
}

fn read_export(path: &Path) -> Result<HistoryExport> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

//! Interactive calculator over [`App`].
//!
//! On a terminal, lines come from a `rustyline` editor with recall saved
//! between sessions. Piped input is read line by line with the same
//! command handling.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::{debug, error};

use calq_core::{format_decimals, CalculationResult, DisplayMode};

use crate::app::App;
use crate::config::DisplayConfig;

const HELP: &str = "\
Type an expression to evaluate it. Dot commands:
  .append <text>     add text to the current expression
  .expr              show the current expression
  .clear             clear the expression and last result
  .reset             clear all unsaved state
  .graph [expr]      sample f(x) over the saved range
  .graph off         drop the current series
  .derive [expr]     d/dx
  .integrate [expr]  antiderivative in x
  .solve [equation]  solve for x
  .points            size of the current series
  .zoom in|out       change the graph range
  .range             show the graph range
  .mode [mode]       calculator, graph, history or image
  .history [n]       last n entries (default 10)
  exit               leave
An empty line evaluates the current expression.";

/// Entries kept in the recall file.
const MAX_RECALL: usize = 500;

enum Flow {
    Continue,
    Exit,
}

/// Recall file next to the database.
pub fn history_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "calq", "calq")
        .map(|dirs| dirs.data_dir().join("repl_history"))
        .unwrap_or_else(|| PathBuf::from(".calq_history"))
}

fn banner<W: Write>(out: &mut W) -> Result<()> {
    writeln!(out, "calq {} (type 'help' for commands)", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

/// Interactive loop with line editing. Ctrl-C and Ctrl-D leave.
pub fn run(app: &mut App, display: &DisplayConfig, history: &Path) -> Result<()> {
    let config = rustyline::Config::builder()
        .max_history_size(MAX_RECALL)?
        .build();
    let mut rl = DefaultEditor::with_config(config)?;
    if let Err(e) = rl.load_history(history) {
        debug!("no recall loaded from {}: {e}", history.display());
    }

    let mut stdout = std::io::stdout();
    banner(&mut stdout)?;
    loop {
        match rl.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if !line.is_empty() {
                    rl.add_history_entry(line)?;
                }
                if let Flow::Exit = handle(app, display, line, &mut stdout)? {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("line editor error: {e}");
                break;
            }
        }
    }

    if let Some(dir) = history.parent() {
        std::fs::create_dir_all(dir)?;
    }
    if let Err(e) = rl.save_history(history) {
        error!("failed to save recall to {}: {e}", history.display());
    }
    Ok(())
}

/// Same commands over any line source, for piped input and tests.
pub fn run_lines<R: BufRead, W: Write>(
    app: &mut App,
    display: &DisplayConfig,
    input: R,
    out: &mut W,
) -> Result<()> {
    banner(out)?;
    write!(out, "> ")?;
    out.flush()?;
    for line in input.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("stdin read error: {e}");
                break;
            }
        };
        if let Flow::Exit = handle(app, display, line.trim(), out)? {
            return Ok(());
        }
        write!(out, "> ")?;
        out.flush()?;
    }
    writeln!(out)?;
    Ok(())
}

fn handle<W: Write>(app: &mut App, display: &DisplayConfig, line: &str, out: &mut W) -> Result<Flow> {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (line, ""),
    };

    let result = match cmd {
        "exit" | "quit" => return Ok(Flow::Exit),
        "help" => {
            writeln!(out, "{HELP}")?;
            return Ok(Flow::Continue);
        }
        "" => {
            if app.transient().current_expression.trim().is_empty() {
                return Ok(Flow::Continue);
            }
            app.evaluate()?
        }
        ".append" => {
            app.append_to_expression(arg);
            writeln!(out, "{}", app.transient().current_expression)?;
            return Ok(Flow::Continue);
        }
        ".expr" => {
            let t = app.transient();
            writeln!(out, "{}", t.current_expression)?;
            if let Some(error) = &t.error {
                writeln!(out, "  (last error: {error})")?;
            }
            return Ok(Flow::Continue);
        }
        ".clear" => {
            app.clear_expression();
            return Ok(Flow::Continue);
        }
        ".reset" => {
            app.clear_all();
            return Ok(Flow::Continue);
        }
        ".graph" if arg == "off" => {
            app.set_graph_data(None);
            return Ok(Flow::Continue);
        }
        ".graph" => {
            let expr = operand(app, arg);
            let range = app.graph_range();
            app.run(|e| e.generate_graph(&expr, range))?
        }
        ".derive" => {
            let expr = operand(app, arg);
            app.run(|e| e.calculate_derivative(&expr, "x"))?
        }
        ".integrate" => {
            let expr = operand(app, arg);
            app.run(|e| e.calculate_integral(&expr, "x"))?
        }
        ".solve" => {
            let expr = operand(app, arg);
            app.run(|e| e.solve_equation(&expr, "x"))?
        }
        ".zoom" => {
            let range = match arg {
                "in" => app.zoom_in()?,
                "out" => app.zoom_out()?,
                _ => {
                    writeln!(out, "usage: .zoom in|out")?;
                    return Ok(Flow::Continue);
                }
            };
            writeln!(out, "{range}")?;
            return Ok(Flow::Continue);
        }
        ".range" => {
            let range = app.graph_range();
            writeln!(out, "{range}")?;
            return Ok(Flow::Continue);
        }
        ".mode" => {
            if !arg.is_empty() {
                match arg.parse::<DisplayMode>() {
                    Ok(mode) => app.set_display_mode(mode)?,
                    Err(e) => writeln!(out, "{e}")?,
                }
            }
            writeln!(out, "{}", app.display_mode())?;
            return Ok(Flow::Continue);
        }
        ".history" => {
            let n = arg.parse().unwrap_or(10);
            for entry in app.history().entries().iter().take(n) {
                writeln!(
                    out,
                    "{}  {} = {}",
                    entry.timestamp.format("%H:%M"),
                    entry.expression,
                    format_decimals(&entry.result, display.decimal_places).replace('\n', " ")
                )?;
            }
            return Ok(Flow::Continue);
        }
        ".points" => {
            match &app.transient().graph_data {
                Some(series) => writeln!(out, "{} points", series.point_count())?,
                None => writeln!(out, "no graph")?,
            }
            return Ok(Flow::Continue);
        }
        c if c.starts_with('.') => {
            writeln!(out, "unknown command {c} (try 'help')")?;
            return Ok(Flow::Continue);
        }
        _ => {
            app.set_expression(line);
            app.evaluate()?
        }
    };

    print_result(result, display, out)?;
    Ok(Flow::Continue)
}

/// Explicit argument, or the current expression when none was given.
fn operand(app: &App, arg: &str) -> String {
    if arg.is_empty() {
        app.transient().current_expression.clone()
    } else {
        arg.to_string()
    }
}

fn print_result<W: Write>(result: &CalculationResult, display: &DisplayConfig, out: &mut W) -> Result<()> {
    if let Some(error) = &result.error {
        writeln!(out, "error: {error}")?;
        return Ok(());
    }
    if display.show_steps {
        for step in &result.steps {
            writeln!(out, "  {}", format_decimals(step, display.decimal_places))?;
        }
    }
    writeln!(out, "{}", format_decimals(&result.result, display.decimal_places))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use calq_engine::Engine;
    use calq_store::SqliteStore;

    fn session(store: &SqliteStore, script: &str) -> (String, usize) {
        let mut app = App::load(store, Engine::default()).unwrap();
        let display = DisplayConfig {
            show_steps: false,
            ..DisplayConfig::default()
        };
        let mut out = Vec::new();
        run_lines(&mut app, &display, script.as_bytes(), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), app.history().len())
    }

    #[test]
    fn test_evaluates_lines() {
        let store = SqliteStore::in_memory().unwrap();
        let (out, n) = session(&store, "2 + 2\n3 × 4\n");
        assert!(out.contains("> 4\n"));
        assert!(out.contains("> 12\n"));
        assert_eq!(n, 2);
    }

    #[test]
    fn test_append_then_empty_line_evaluates() {
        let store = SqliteStore::in_memory().unwrap();
        let (out, n) = session(&store, ".append 6\n.append *7\n\n");
        assert!(out.contains("> 6*7\n"));
        assert!(out.contains("> 42\n"));
        assert_eq!(n, 1);
    }

    #[test]
    fn test_errors_are_printed_not_recorded() {
        let store = SqliteStore::in_memory().unwrap();
        let (out, n) = session(&store, "1 +\n.expr\n");
        assert!(out.contains("error: calculation error"));
        assert!(out.contains("(last error:"));
        assert_eq!(n, 0);
    }

    #[test]
    fn test_exit_stops_reading() {
        let store = SqliteStore::in_memory().unwrap();
        let (_, n) = session(&store, "1 + 1\nexit\n2 + 2\n");
        assert_eq!(n, 1);
    }

    #[test]
    fn test_graph_series_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        let (out, n) = session(&store, ".points\n.graph x^2\n.points\n.graph off\n.points\n");
        assert!(out.contains("Graph generated: 201 points"));
        assert!(out.contains("> 201 points\n"));
        assert_eq!(out.matches("no graph").count(), 2);
        assert_eq!(n, 1);
    }

    #[test]
    fn test_recall_path_names_a_file() {
        let path = history_path();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(matches!(name, "repl_history" | ".calq_history"), "{name}");
    }

    #[test]
    fn test_dot_commands() {
        let store = SqliteStore::in_memory().unwrap();
        let (out, n) = session(
            &store,
            ".derive x^2\n.zoom in\n.mode graph\n.mode bogus\n.nope\n",
        );
        assert!(out.replace(' ', "").contains("2*x"));
        assert!(out.contains("[-7, 7]"));
        assert!(out.contains("> graph\n"));
        assert!(out.contains("invalid display mode: bogus"));
        assert!(out.contains("unknown command .nope"));
        assert_eq!(n, 1);
    }
}

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use colored::Colorize;
use paramflow::config::EngineConfig;
use paramflow::symbols::SymbolRegistry;
use paramflow::types::Parameter;
use paramflow::{ExpressionEngine, Submission, Workspace};
use tracing::Level;

#[derive(Parser)]
#[command(name = "paramflow")]
#[command(about = "Evaluate parameter and function definitions, one per line")]
#[command(version)]
struct Args {
    /// File with one definition per line; stdin when omitted
    input: Option<PathBuf>,

    /// Engine configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbol table (JSON); the builtin table is used when it cannot be loaded
    #[arg(long)]
    symbols: Option<PathBuf>,

    /// Start from a saved snapshot instead of an empty workspace
    #[arg(long)]
    load: Option<PathBuf>,

    /// Set a parameter after all definitions are read, as name=value
    #[arg(long = "set", value_parser = parse_assignment)]
    set: Vec<(String, f64)>,

    /// Evaluate an expression against the final workspace
    #[arg(long)]
    eval: Vec<String>,

    /// Write the snapshot to this file, or to stdout with `-`
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// More log output (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn parse_assignment(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", text))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("invalid value in '{}': {}", text, err))?;
    Ok((name.trim().to_string(), value))
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(2);
        }
    }
}

/// Returns whether every line and command succeeded.
fn run(args: &Args) -> Result<bool, Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    let table = args
        .symbols
        .as_ref()
        .and_then(|path| fs::read_to_string(path).ok());
    let symbols = SymbolRegistry::load_or_fallback(table.as_deref());
    let engine = ExpressionEngine::new(symbols, config)?;

    let mut workspace = match &args.load {
        Some(path) => Workspace::from_json(engine, &fs::read_to_string(path)?)?,
        None => Workspace::new(engine),
    };

    let source = match &args.input {
        Some(path) => fs::read_to_string(path)?,
        None if args.load.is_some() => String::new(),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text)?;
            text
        }
    };

    let mut ok = true;
    for (number, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match workspace.submit(line) {
            Ok(Submission::Points(points)) => {
                let listed: Vec<String> = points
                    .iter()
                    .map(|p| format!("({}, {})", p.x, p.y))
                    .collect();
                println!("{} {}", "points".cyan(), listed.join(" "));
            }
            Ok(_) => {}
            Err(e) => {
                ok = false;
                eprintln!("{} line {}: {}: {}", "✗".red(), number + 1, line.bold(), e);
            }
        }
    }

    for (name, value) in &args.set {
        if let Err(e) = workspace.set_value(name, *value) {
            ok = false;
            eprintln!("{} --set {}={}: {}", "✗".red(), name, value, e);
        }
    }

    print_workspace(&workspace);

    for expr in &args.eval {
        match workspace.evaluate(expr) {
            Ok(value) => println!("{} = {}", expr.bold(), value.to_string().green()),
            Err(e) => {
                ok = false;
                eprintln!("{} {}: {}", "✗".red(), expr.bold(), e);
            }
        }
    }

    if let Some(path) = &args.snapshot {
        let json = workspace.to_json()?;
        if path.as_os_str() == "-" {
            println!("{}", json);
        } else {
            fs::write(path, json)?;
        }
    }
    Ok(ok)
}

fn describe(parameter: &Parameter) -> String {
    let value = parameter
        .value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!("{:<10} {}", parameter.full_name().bold(), value.green());
    if let Some(expression) = &parameter.expression {
        line.push_str(&format!("  = {}", expression.dimmed()));
    }
    if let Some(domain) = &parameter.domain {
        line.push_str(&format!(
            "  [{}, {}] step {}",
            domain.min, domain.max, domain.step
        ));
    }
    if parameter.is_independent_variable() {
        line.push_str(&format!("  {}", "(independent)".cyan()));
    }
    if let Some(error) = &parameter.error {
        line.push_str(&format!("  {}", error.red()));
    }
    line
}

fn print_workspace(workspace: &Workspace) {
    println!("{}", "Parameters".underline());
    for parameter in workspace.parameters() {
        println!("  {}", describe(parameter));
    }

    println!("{}", "Functions".underline());
    for function in workspace.functions() {
        let mut line = format!("  {} = {}", function.graph_name().bold(), function.expression);
        match (&function.stats, &function.error) {
            (_, Some(error)) => line.push_str(&format!("  {}", error.red())),
            (Some(stats), None) => line.push_str(&format!(
                "  min {:.4} max {:.4} mean {:.4} zeros {}{}",
                stats.min,
                stats.max,
                stats.mean,
                stats.zero_crossings,
                if stats.continuous { "" } else { " (gaps)" }
            )),
            (None, None) => {}
        }
        println!("{}", line);
    }

    match workspace.evaluation_order() {
        Ok(order) => println!("{} {}", "Order".underline(), order.join(" → ")),
        Err(cycle) => println!("{} {}", "Order".underline(), cycle.to_string().red()),
    }
}

//! `triad-cli` – Triad Command Line Interface
//!
//! This binary drives a single [`Scheduler`] interactively. It:
//!
//! 1. Checks for `~/.triad/config.toml`; runs a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the run history (SQLite, or in memory when `db_path` is empty).
//! 3. Drops the user into an **interactive REPL** with slash-commands
//!    (`/boot`, `/plan`, `/select`, `/resolve`, `/end`, `/log`, `/help`).
//! 4. Intercepts **Ctrl-C** to force-end the open turn and exit safely.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use triad_runtime::{MemoryContentStore, Scheduler};

fn main() {
    // RUST_LOG filters, TRIAD_LOG_FORMAT=json switches to JSON lines and
    // OTEL_EXPORTER_OTLP_ENDPOINT enables span export.
    let _telemetry = triad_runtime::init_tracing("triad");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – force-ending open turn …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── First-Run Wizard ──────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(None) => run_first_run_wizard(),
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };

    // ── Scheduler ─────────────────────────────────────────────────────────
    let scheduler_config = cfg.to_scheduler_config();
    match &scheduler_config.persistence_path {
        Some(path) => println!("  Run history: {}", path.dimmed()),
        None => println!("  Run history: {}", "in memory only".yellow()),
    }
    let mut scheduler = match Scheduler::new(scheduler_config) {
        Ok(s) => s.with_content_store(Box::new(MemoryContentStore::new())),
        Err(e) => {
            eprintln!("{}: {}", "Failed to start scheduler".red().bold(), e);
            std::process::exit(1);
        }
    };
    println!(
        "  {} prior run(s) on record.",
        scheduler.log().len().to_string().bold()
    );

    println!();
    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(&mut scheduler, shutdown);
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> config::Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║        Triad First-Run Wizard        ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
    println!("  No configuration found.  Let's set up Triad.\n");

    let mut cfg = config::Config::default();

    println!("  Where should run history be kept?");
    println!("    (enter {} to keep it in memory only)", "-".bold());
    let db = prompt_line(&format!("  Database path [{}]: ", cfg.db_path), &cfg.db_path);
    cfg.db_path = if db.trim() == "-" { String::new() } else { db };

    let threshold = prompt_line(
        &format!("  Boot threshold [{}]: ", cfg.boot.threshold),
        &cfg.boot.threshold.to_string(),
    );
    match threshold.trim().parse::<f64>() {
        Ok(t) if t.is_finite() && t >= 0.0 => cfg.boot.threshold = t,
        _ => println!(
            "  {} '{}' is not a valid threshold, keeping {}",
            "Warning:".yellow(),
            threshold,
            cfg.boot.threshold
        ),
    }

    let top_k = prompt_line(
        &format!("  Seeds per boot [{}]: ", cfg.boot.top_k),
        &cfg.boot.top_k.to_string(),
    );
    match top_k.trim().parse::<usize>() {
        Ok(k) if k > 0 => cfg.boot.top_k = k,
        _ => println!(
            "  {} '{}' is not a valid seed count, keeping {}",
            "Warning:".yellow(),
            top_k,
            cfg.boot.top_k
        ),
    }

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"  ______     _           __"#.bold().cyan());
    println!("{}", r#" /_  __/____(_)___ _____/ /"#.bold().cyan());
    println!("{}", r#"  / / / ___/ / __ `/ __  / "#.bold().cyan());
    println!("{}", r#" / / / /  / / /_/ / /_/ /  "#.bold().cyan());
    println!("{}", r#"/_/ /_/  /_/\__,_/\__,_/   "#.bold().cyan());
    println!();
    println!("  {} {}",
        "Triad".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Turn-budgeted path scheduler");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}

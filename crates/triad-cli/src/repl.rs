//! REPL – Read-Eval-Print Loop driving one [`Scheduler`].
//!
//! Supported slash-commands:
//!   /boot [text]           – score run history against `text` and start a cycle
//!   /plan [ROWS]           – plan the next turn (`t:grep, c:ask ; t:fallback`);
//!                            bare `/plan` uses the default rows
//!   /select N [TEXT]       – commit to row N, folding TEXT into its nodes
//!   /resolve ID TEXT       – bind a node with its payload
//!   /fail ID REASON        – fail a node
//!   /pause ID              – park a node as dormant
//!   /reclaim ID            – pull one reserve node back as an extension
//!   /emerge TEXT           – append an emergence node
//!   /carry                 – carry the remaining reserve forward
//!   /end                   – complete the turn
//!   /force                 – force-end the turn
//!   /show [json]           – render the current turn
//!   /log [json|schema]     – run history summary, export, or record schema
//!   /help                  – show this list
//!   /quit | /exit          – force-end any open turn and exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

use triad_kernel::{NodeDraft, RowId, RowProposal, Turn};
use triad_memory::boot_scorer::riskiest_kind;
use triad_memory::{BootDecision, SeedTier};
use triad_runtime::{Scheduler, SchedulerError, TurnOutcome};
use triad_types::{Node, NodeId, NodeKind, NodeStatus, run_record_schema};

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Boot(String),
    Plan(Vec<RowProposal>),
    Baseline,
    Select(RowId, String),
    Resolve(NodeId, String),
    Fail(NodeId, String),
    Pause(NodeId),
    Reclaim(NodeId),
    Emerge(String),
    Carry,
    End,
    Force,
    Show { json: bool },
    Log { json: bool },
    Schema,
    Help,
    Quit,
}

/// Parse one input line. Errors are user-facing messages.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim()),
        None => (line, ""),
    };

    match head {
        "/boot" => Ok(Command::Boot(rest.to_string())),
        "/plan" if rest.is_empty() => Ok(Command::Baseline),
        "/plan" => parse_plan(rest).map(Command::Plan),
        "/select" => {
            let (n, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            n.parse::<usize>()
                .map(|n| Command::Select(RowId(n), text.trim().to_string()))
                .map_err(|_| format!("'{}' is not a row number", n))
        }
        "/resolve" => {
            let (id, text) = id_and_text(rest, "/resolve ID TEXT")?;
            Ok(Command::Resolve(id, text))
        }
        "/fail" => {
            let (id, reason) = id_and_text(rest, "/fail ID REASON")?;
            Ok(Command::Fail(id, reason))
        }
        "/pause" => single_id(rest, "/pause ID").map(Command::Pause),
        "/reclaim" => single_id(rest, "/reclaim ID").map(Command::Reclaim),
        "/emerge" if rest.is_empty() => Err("usage: /emerge TEXT".to_string()),
        "/emerge" => Ok(Command::Emerge(rest.to_string())),
        "/carry" => Ok(Command::Carry),
        "/end" => Ok(Command::End),
        "/force" => Ok(Command::Force),
        "/show" => Ok(Command::Show { json: rest == "json" }),
        "/log" if rest == "schema" => Ok(Command::Schema),
        "/log" => Ok(Command::Log { json: rest == "json" }),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        other => Err(format!("Unknown command: '{}'", other)),
    }
}

/// Parse row proposals: rows separated by `;`, nodes by `,`.
///
/// A node prefixed `c:` is a collaboration node; `t:` or no prefix is a tool
/// call.
pub fn parse_plan(input: &str) -> Result<Vec<RowProposal>, String> {
    if input.trim().is_empty() {
        return Err("usage: /plan t:step, c:question ; t:alternative".to_string());
    }
    input
        .split(';')
        .enumerate()
        .map(|(i, row)| {
            let drafts = row
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(parse_draft)
                .collect::<Vec<_>>();
            if drafts.is_empty() {
                Err(format!("row {} is empty", i))
            } else {
                Ok(RowProposal::new(drafts))
            }
        })
        .collect()
}

fn parse_draft(item: &str) -> NodeDraft {
    if let Some(text) = item.strip_prefix("c:") {
        NodeDraft::collab(text.trim())
    } else if let Some(text) = item.strip_prefix("t:") {
        NodeDraft::tool(text.trim())
    } else {
        NodeDraft::tool(item)
    }
}

fn single_id(rest: &str, usage: &str) -> Result<NodeId, String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [id] => Ok(NodeId::from(*id)),
        _ => Err(format!("usage: {}", usage)),
    }
}

fn id_and_text(rest: &str, usage: &str) -> Result<(NodeId, String), String> {
    match rest.split_once(char::is_whitespace) {
        Some((id, text)) if !text.trim().is_empty() => {
            Ok((NodeId::from(id), text.trim().to_string()))
        }
        _ => Err(format!("usage: {}", usage)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set, or on Ctrl-C at the prompt,
/// any open turn is force-ended before the REPL exits.
pub fn run(scheduler: &mut Scheduler, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start line editor".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            abandon_open_turn(scheduler);
            break;
        }

        let line = match editor.readline(&prompt(scheduler)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("{}", "⚠  Interrupted – force-ending open turn …".yellow().bold());
                shutdown.store(true, Ordering::SeqCst);
                continue;
            }
            Err(ReadlineError::Eof) => {
                abandon_open_turn(scheduler);
                break;
            }
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                abandon_open_turn(scheduler);
                break;
            }
        };

        let cmd = line.trim();
        if cmd.is_empty() {
            continue;
        }
        if let Err(e) = editor.add_history_entry(cmd) {
            warn!(error = %e, "failed to record history entry");
        }

        match parse_command(cmd) {
            Ok(command) => {
                if execute(scheduler, command) == Flow::Quit {
                    println!("{}", "Goodbye.".green());
                    shutdown.store(true, Ordering::SeqCst);
                    break;
                }
            }
            Err(msg) => println!(
                "{} Type {} for available commands.",
                msg.red(),
                "/help".bold()
            ),
        }
    }
}

fn prompt(scheduler: &Scheduler) -> String {
    let label = match (scheduler.cycle(), scheduler.current_turn()) {
        (Some(c), Some(t)) if !t.is_complete() => format!("triad[c{} t{}]>", c.ordinal(), t.index().number()),
        (Some(c), _) => format!("triad[c{}]>", c.ordinal()),
        (None, _) => "triad>".to_string(),
    };
    format!("{} ", label.bold().cyan())
}

fn abandon_open_turn(scheduler: &mut Scheduler) {
    if !scheduler.has_open_turn() {
        return;
    }
    match scheduler.force_end() {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => println!("{}: {}", "Force-end failed".red(), e),
    }
}

/// Run one command against `scheduler`, printing the result.
pub fn execute(scheduler: &mut Scheduler, command: Command) -> Flow {
    let result = match command {
        Command::Boot(text) => scheduler.boot(&text).map(print_boot),
        Command::Plan(rows) => scheduler.begin_turn(rows).map(print_turn),
        Command::Baseline => scheduler.begin_baseline_turn().map(print_turn),
        Command::Select(row, text) => scheduler.select_with_input(row, &text).map(|()| {
            if let Some(turn) = scheduler.current_turn() {
                print_turn(turn);
                print_executed(turn);
            }
        }),
        Command::Resolve(id, text) => scheduler
            .resolve(&id, text)
            .map(|()| println!("  {} {} bound", "✓".green(), id.to_string().bold())),
        Command::Fail(id, reason) => scheduler
            .fail(&id, &reason)
            .map(|()| println!("  {} {} failed", "✗".red(), id.to_string().bold())),
        Command::Pause(id) => scheduler
            .pause(&id)
            .map(|()| println!("  {} {} dormant", "◌".dimmed(), id.to_string().bold())),
        Command::Reclaim(id) => scheduler.reclaim(&id).map(|node| {
            println!("  {} reclaimed as {}", "↺".cyan(), node.kind().to_string().yellow());
            print_node(&node);
        }),
        Command::Emerge(text) => scheduler
            .emerge(text)
            .map(|id| println!("  {} emerged {}", "✦".magenta(), id.to_string().bold())),
        Command::Carry => scheduler
            .carry_forward_reserve()
            .map(|n| println!("  {} {} node(s) carried forward", "→".cyan(), n)),
        Command::End => scheduler.end_turn().map(|o| print_outcome(&o)),
        Command::Force => scheduler.force_end().map(|o| print_outcome(&o)),
        Command::Show { json } => {
            show(scheduler, json);
            Ok(())
        }
        Command::Log { json } => {
            show_log(scheduler, json);
            Ok(())
        }
        Command::Schema => {
            match serde_json::to_string_pretty(&run_record_schema()) {
                Ok(s) => println!("{}", s),
                Err(e) => println!("{}: {}", "Serialization error".red(), e),
            }
            Ok(())
        }
        Command::Help => {
            cmd_help();
            Ok(())
        }
        Command::Quit => {
            abandon_open_turn(scheduler);
            return Flow::Quit;
        }
    };

    if let Err(e) = result {
        print_error(&e);
    }
    Flow::Continue
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_error(e: &SchedulerError) {
    println!("{}: {}", "Error".red().bold(), e);
}

fn print_boot(decision: &BootDecision) {
    if decision.is_cold() {
        println!("  {} {}", "Cold boot".yellow().bold(), decision.reason.dimmed());
        println!("  Suggested path: {}", decision.suggested_style.to_string().cyan());
        return;
    }
    println!(
        "  {} {} seed(s), top score {:.3}",
        "Context boot".green().bold(),
        decision.seeds.len(),
        decision.top_score.unwrap_or_default()
    );
    for seed in &decision.seeds {
        let tier = match seed.tier {
            SeedTier::Hot => "hot".red(),
            SeedTier::Warm => "warm".yellow(),
        };
        println!(
            "    {} {} [{}] {:.3}  {}",
            seed.node.kind.glyph(),
            seed.node.id.to_string().bold(),
            tier,
            seed.score,
            seed.node.content.dimmed()
        );
    }
    println!("  Suggested path: {}", decision.suggested_style.to_string().cyan());
    if !decision.ideas.is_empty() {
        println!("  Unused ideas:");
        for idea in &decision.ideas {
            println!("    {} {}", NodeKind::Emergence.glyph(), idea.content.dimmed());
        }
    }
}

fn print_turn(turn: &Turn) {
    println!();
    println!("{}", turn.render());
    println!();
}

fn print_executed(turn: &Turn) {
    for node in turn.executed() {
        print_node(node);
    }
}

fn print_node(node: &Node) {
    let status = match node.status() {
        NodeStatus::Open => "open".cyan(),
        NodeStatus::Bound => "bound".green(),
        NodeStatus::Failed => "failed".red(),
        NodeStatus::Dormant => "dormant".dimmed(),
    };
    println!(
        "    {} {:<16} {:<8} {}",
        node.kind().glyph(),
        node.id().to_string().bold(),
        status,
        node.content()
    );
}

fn print_outcome(outcome: &TurnOutcome) {
    let verb = if outcome.forced { "force-ended" } else { "complete" };
    println!(
        "  Cycle {} {} {} ({} fail mark(s))",
        outcome.cycle,
        outcome.index,
        verb.bold(),
        outcome.marks.len()
    );
    for mark in &outcome.marks {
        println!(
            "    {} {} {}",
            "✗".red(),
            mark.node.to_string().bold(),
            mark.reasons.join("; ").dimmed()
        );
    }
    if let Some(record) = &outcome.record {
        println!(
            "  {} cycle closed: {} bound, {} failed, {} carried forward",
            "✓".green().bold(),
            record.bound_count,
            record.failed_count,
            record.carry_forward_snapshot.len()
        );
    }
}

fn show(scheduler: &Scheduler, json: bool) {
    let Some(turn) = scheduler.current_turn() else {
        match scheduler.cycle() {
            Some(c) => println!(
                "  Cycle {} has no turns yet ({} seed(s) waiting).",
                c.ordinal(),
                c.seeds().len()
            ),
            None => println!("  No cycle running. Use {} or {}.", "/boot".bold(), "/plan".bold()),
        }
        return;
    };
    if json {
        match serde_json::to_string_pretty(turn) {
            Ok(s) => println!("{}", s),
            Err(e) => println!("{}: {}", "Serialization error".red(), e),
        }
        return;
    }
    print_turn(turn);
    print_executed(turn);
    let (unresolved, reserve) = turn.pending();
    println!(
        "  phase {}, {} unresolved, {} in reserve, {} reclaim(s) used",
        turn.phase().to_string().yellow(),
        unresolved,
        reserve,
        turn.reclaims_used()
    );
}

fn show_log(scheduler: &Scheduler, json: bool) {
    let log = scheduler.log();
    if json {
        match log.export_json() {
            Ok(s) => println!("{}", s),
            Err(e) => println!("{}: {}", "Export error".red(), e),
        }
        return;
    }

    let tally = log.tally();
    println!("{}", "Run History".bold().underline());
    println!(
        "  {} run(s), {} bound, {} failed, {} unused emergence",
        tally.runs, tally.total_bound, tally.total_failed, tally.unused_emergence
    );
    for (kind, rate) in log.fail_rate_by_type() {
        println!("    {} {:<18} {:>5.1}% of failures", kind.glyph(), kind, rate * 100.0);
    }
    if let Some(kind) = riskiest_kind(&log.snapshot()) {
        println!("  Riskiest node type: {}", kind.to_string().red());
    }
    for record in log.recent(5) {
        println!(
            "  {} {}  bound {:>3}  failed {:>3}  carried {}",
            record.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            record.cycle_id,
            record.bound_count,
            record.failed_count,
            record.carry_forward_snapshot.len()
        );
    }
}

fn cmd_help() {
    println!();
    println!("{}", "Triad Commands".bold().underline());
    println!("  {}      – score history against TEXT and start a cycle", "/boot [TEXT]".bold().cyan());
    println!("  {}       – plan a turn: {} (bare: default rows)", "/plan [ROWS]".bold().cyan(), "t:grep, c:ask ; t:alt".dimmed());
    println!("  {}   – commit to row N with the user's TEXT", "/select N [TEXT]".bold().cyan());
    println!("  {}  – bind a node", "/resolve ID TEXT".bold().cyan());
    println!("  {}   – fail a node", "/fail ID REASON".bold().cyan());
    println!("  {}  – park a node / pull one back from reserve", "/pause ID  /reclaim ID".bold().cyan());
    println!("  {}       – append an emergence node", "/emerge TEXT".bold().cyan());
    println!("  {}              – carry the reserve into the next turn", "/carry".bold().cyan());
    println!("  {}        – complete or force-end the turn", "/end  /force".bold().cyan());
    println!("  {}  – current turn / run history", "/show [json]  /log [json]".bold().cyan());
    println!("  {}        – JSON Schema of a run record", "/log schema".bold().cyan());
    println!("  {}        – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
    println!(
        "  Glyphs: {} tool-call  {} collaboration  {} tool-ext  {} collab-ext  {} emergence  {} unchosen",
        NodeKind::ToolCall.glyph(),
        NodeKind::Collaboration.glyph(),
        NodeKind::ToolExtension.glyph(),
        NodeKind::CollabExtension.glyph(),
        NodeKind::Emergence.glyph(),
        NodeKind::UnchosenMarker.glyph()
    );
    println!();
}

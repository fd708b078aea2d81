//! Interactive REPL for point-tracker.
//!
//! Launch with `point-tracker repl` to enter interactive mode.
//! Type `/help` for available commands, Tab for completion.
//! Every change is written to disk immediately.

use rustyline::completion::{Completer, Pair};
use rustyline::config::CompletionType;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{
    Cmd, ConditionalEventHandler, Config, Editor, Event, EventContext, EventHandler, Helper,
    KeyEvent, RepeatCount,
};

use point_tracker::{parse_date, WindowPolicy};

use crate::config::TrackerConfig;
use crate::output::{format_projection, render_estimate, render_overlay, render_table};
use crate::session::TrackerSession;
use crate::types::{CliError, CliResult};

/// Available REPL commands.
const COMMANDS: &[(&str, &str)] = &[
    ("/list", "Show all streamers with estimates"),
    ("/add", "Record points: /add <name> <points> [target]"),
    ("/target", "Set target: /target <name> <value|none>"),
    ("/rename", "Rename: /rename <old> <new>"),
    ("/remove", "Remove a streamer: /remove <name>"),
    ("/estimate", "Trend details: /estimate <name> [date]"),
    ("/series", "Series with fitted line: /series <name> [raw]"),
    ("/rebuild", "Refit every model"),
    ("/window", "Show or set window: /window [last-days:N|per-day|rolling:N]"),
    ("/save", "Write roster and models now"),
    ("/clear", "Clear the screen"),
    ("/help", "Show available commands"),
    ("/exit", "Quit the REPL"),
];

/// Commands whose first argument is a streamer name.
const NAME_COMMANDS: &[&str] = &["/add", "/target", "/rename", "/remove", "/estimate", "/series"];

/// REPL helper for tab completion.
#[derive(Default)]
struct TrackerHelper {
    names: Vec<String>,
}

impl Completer for TrackerHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let input = &line[..pos];

        if !input.contains(' ') {
            let matches: Vec<Pair> = COMMANDS
                .iter()
                .filter(|(cmd, _)| cmd.starts_with(input))
                .map(|(cmd, desc)| Pair {
                    display: format!("{cmd:<16} {desc}"),
                    replacement: format!("{cmd} "),
                })
                .collect();
            return Ok((0, matches));
        }

        // Streamer name completion for the first argument
        let parts: Vec<&str> = input.splitn(2, ' ').collect();
        let cmd = parts[0];
        let args = if parts.len() > 1 { parts[1] } else { "" };

        if NAME_COMMANDS.contains(&cmd) {
            if let Some(found) = matching_names(&self.names, args) {
                let prefix_start = input.len() - args.len();
                let matches: Vec<Pair> = found
                    .into_iter()
                    .map(|n| Pair {
                        display: n.clone(),
                        replacement: format!("{} ", quote_if_needed(n)),
                    })
                    .collect();
                return Ok((prefix_start, matches));
            }
        }

        Ok((pos, Vec::new()))
    }
}

impl Hinter for TrackerHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        if pos < line.len() || line.is_empty() {
            return None;
        }
        if line.starts_with('/') && !line.contains(' ') {
            for (cmd, _) in COMMANDS {
                if cmd.starts_with(line) && *cmd != line {
                    return Some(cmd[line.len()..].to_string());
                }
            }
        }
        None
    }
}

impl Highlighter for TrackerHelper {}
impl Validator for TrackerHelper {}
impl Helper for TrackerHelper {}

struct TabCompleteOrAcceptHint;

impl ConditionalEventHandler for TabCompleteOrAcceptHint {
    fn handle(
        &self,
        _evt: &Event,
        _n: RepeatCount,
        _positive: bool,
        ctx: &EventContext<'_>,
    ) -> Option<Cmd> {
        if ctx.has_hint() {
            Some(Cmd::CompleteHint)
        } else {
            Some(Cmd::Complete)
        }
    }
}

/// Run the interactive REPL.
pub fn run(config: TrackerConfig) -> anyhow::Result<()> {
    eprintln!();
    eprintln!(
        "  \x1b[32m\u{25c9}\x1b[0m \x1b[1mpoint-tracker v{}\x1b[0m \x1b[90m\u{2014} channel point targets\x1b[0m",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();
    eprintln!(
        "    Press \x1b[36m/\x1b[0m to browse commands, \x1b[90mTab\x1b[0m to complete, \x1b[90m/exit\x1b[0m to quit."
    );
    eprintln!();

    let mut session = TrackerSession::open(&config.roster_path, &config.models_path, config.policy)?;
    eprintln!(
        "  Roster: {} ({} streamers, window {})",
        config.roster_path,
        session.roster().count(),
        session.policy()
    );
    eprintln!();

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .completion_type(CompletionType::List)
        .completion_prompt_limit(20)
        .build();

    let mut rl: Editor<TrackerHelper, rustyline::history::DefaultHistory> =
        Editor::with_config(rl_config)?;
    rl.set_helper(Some(TrackerHelper {
        names: session.roster().names(),
    }));
    rl.bind_sequence(
        KeyEvent::from('\t'),
        EventHandler::Conditional(Box::new(TabCompleteOrAcceptHint)),
    );

    let hist_path = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".point_tracker_history");
    if hist_path.exists() {
        let _ = rl.load_history(&hist_path);
    }

    let prompt = " \x1b[36mpoints>\x1b[0m ";

    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let input = line.strip_prefix('/').unwrap_or(line);
                if input.is_empty() {
                    cmd_help();
                    continue;
                }

                let mut parts = input.splitn(2, ' ');
                let cmd = parts.next().unwrap_or("");
                let args = split_args(parts.next().unwrap_or("").trim());

                session.refresh();

                let result = match cmd {
                    "exit" | "quit" => {
                        eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                        break;
                    }
                    "help" | "h" | "?" => {
                        cmd_help();
                        Ok(())
                    }
                    "clear" | "cls" => {
                        eprint!("\x1b[2J\x1b[H");
                        Ok(())
                    }
                    "list" | "ls" => cmd_list(&session),
                    "add" => cmd_add(&args, &mut session),
                    "target" => cmd_target(&args, &mut session),
                    "rename" => cmd_rename(&args, &mut session),
                    "remove" | "rm" => cmd_remove(&args, &mut session),
                    "estimate" | "est" => cmd_estimate(&args, &session),
                    "series" => cmd_series(&args, &session),
                    "rebuild" => cmd_rebuild(&mut session),
                    "window" => cmd_window(&args, &mut session),
                    "save" => session.save(),
                    _ => {
                        eprintln!("  Unknown command '/{cmd}'. Type /help for commands.");
                        Ok(())
                    }
                };

                if let Err(e) = result {
                    eprintln!("  \x1b[31mError:\x1b[0m {e}");
                }

                if let Some(helper) = rl.helper_mut() {
                    helper.names = session.roster().names();
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("  \x1b[90m(Ctrl+C)\x1b[0m Type \x1b[1m/exit\x1b[0m to quit.");
            }
            Err(ReadlineError::Eof) => {
                eprintln!("  \x1b[90m\u{2728}\x1b[0m Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("  Error: {err}");
                break;
            }
        }
    }

    session.save()?;
    let _ = rl.save_history(&hist_path);

    Ok(())
}

fn cmd_help() {
    eprintln!();
    eprintln!("  Commands:");
    eprintln!();
    for (cmd, desc) in COMMANDS {
        eprintln!("    {cmd:<18} {desc}");
    }
    eprintln!();
    eprintln!("  Tip: Tab completes commands and streamer names. Quote names with spaces.");
    eprintln!();
}

fn cmd_list(session: &TrackerSession) -> CliResult<()> {
    let rows = session.summaries();
    eprintln!();
    if rows.is_empty() {
        eprintln!("  No streamers yet. Use /add <name> <points> [target].");
    } else {
        for line in render_table(&rows) {
            eprintln!("  {line}");
        }
    }
    eprintln!();
    Ok(())
}

fn cmd_add(args: &[String], session: &mut TrackerSession) -> CliResult<()> {
    let (name, points, target) = match args {
        [name, points] => (name, points, None),
        [name, points, target] => (name, points, Some(target)),
        _ => return Err(usage("/add <name> <points> [target]")),
    };
    let points = parse_number("points", points)?;
    let target = target.map(|t| parse_number("target", t)).transpose()?;

    let projection = session.record(name, points, None, target)?;
    session.save()?;
    eprintln!("  Recorded {name}: est. {}", format_projection(&projection));
    Ok(())
}

fn cmd_target(args: &[String], session: &mut TrackerSession) -> CliResult<()> {
    let [name, value] = args else {
        return Err(usage("/target <name> <value|none>"));
    };
    let target = parse_target(value)?;
    let projection = session.set_target(name, target)?;
    session.save()?;
    eprintln!("  Target updated for {name}: est. {}", format_projection(&projection));
    Ok(())
}

fn cmd_rename(args: &[String], session: &mut TrackerSession) -> CliResult<()> {
    let [old, new] = args else {
        return Err(usage("/rename <old> <new>"));
    };
    session.rename(old, new)?;
    session.save()?;
    eprintln!("  Renamed {old} -> {new}");
    Ok(())
}

fn cmd_remove(args: &[String], session: &mut TrackerSession) -> CliResult<()> {
    let [name] = args else {
        return Err(usage("/remove <name>"));
    };
    session.remove(name)?;
    session.save()?;
    eprintln!("  Removed {name}");
    Ok(())
}

fn cmd_estimate(args: &[String], session: &TrackerSession) -> CliResult<()> {
    let (name, at) = match args {
        [name] => (name, None),
        [name, date] => (
            name,
            Some(parse_date(date).ok_or_else(|| {
                CliError::InvalidArgs(format!("bad date '{date}', expected RFC 3339"))
            })?),
        ),
        _ => return Err(usage("/estimate <name> [date]")),
    };
    let report = session.estimate(name, at)?;
    eprintln!();
    for line in render_estimate(&report) {
        eprintln!("  {line}");
    }
    eprintln!();
    Ok(())
}

fn cmd_series(args: &[String], session: &TrackerSession) -> CliResult<()> {
    let (name, raw) = match args {
        [name] => (name, false),
        [name, flag] if flag == "raw" => (name, true),
        _ => return Err(usage("/series <name> [raw]")),
    };
    let overlay = session.overlay(name, raw)?;
    eprintln!();
    for line in render_overlay(&overlay) {
        eprintln!("  {line}");
    }
    eprintln!();
    Ok(())
}

fn cmd_rebuild(session: &mut TrackerSession) -> CliResult<()> {
    let built = session.rebuild_all();
    session.save()?;
    eprintln!("  Rebuilt {built} models");
    Ok(())
}

fn cmd_window(args: &[String], session: &mut TrackerSession) -> CliResult<()> {
    match args {
        [] => {
            eprintln!("  Window: {}", session.policy());
            Ok(())
        }
        [raw] => {
            let policy: WindowPolicy = raw.parse()?;
            let built = session.set_policy(policy)?;
            session.save()?;
            eprintln!("  Window set to {policy}; {built} models refit");
            Ok(())
        }
        _ => Err(usage("/window [last-days:N|per-day|rolling:N]")),
    }
}

fn usage(text: &str) -> CliError {
    CliError::InvalidArgs(format!("usage: {text}"))
}

fn parse_number(field: &str, raw: &str) -> CliResult<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != '_' && *c != ',').collect();
    cleaned
        .parse::<f64>()
        .map_err(|_| CliError::InvalidArgs(format!("{field} must be a number, got '{raw}'")))
}

/// Parse a target value; `none` clears it.
pub fn parse_target(raw: &str) -> CliResult<Option<f64>> {
    if raw.eq_ignore_ascii_case("none") || raw == "-" {
        return Ok(None);
    }
    parse_number("target", raw).map(Some)
}

/// Split REPL arguments on whitespace, keeping double-quoted runs together.
fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut has_token = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                has_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Names completing a partly typed first argument, which may open with a quote.
///
/// `None` once the argument is finished and completion no longer applies.
fn matching_names<'a>(names: &'a [String], arg: &str) -> Option<Vec<&'a String>> {
    let prefix = match arg.strip_prefix('"') {
        Some(rest) if rest.contains('"') => return None,
        Some(rest) => rest,
        None if arg.contains(' ') => return None,
        None => arg,
    };
    Some(names.iter().filter(|n| n.starts_with(prefix)).collect())
}

fn quote_if_needed(name: &str) -> String {
    if name.contains(char::is_whitespace) {
        format!("\"{name}\"")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args_handles_quotes() {
        assert_eq!(split_args("Alice 100"), vec!["Alice", "100"]);
        assert_eq!(split_args("\"Big Bob\"  5 10"), vec!["Big Bob", "5", "10"]);
        assert_eq!(split_args(""), Vec::<String>::new());
        assert_eq!(split_args("\"\""), vec![""]);
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(parse_target("none").unwrap(), None);
        assert_eq!(parse_target("1_000").unwrap(), Some(1000.0));
        assert_eq!(parse_target("25,000").unwrap(), Some(25000.0));
        assert!(parse_target("lots").is_err());
    }

    #[test]
    fn test_name_completion_after_open_quote() {
        let names = vec!["Alice".to_string(), "Big Bob".to_string(), "Bill".to_string()];

        assert_eq!(matching_names(&names, "Bi").unwrap(), vec!["Big Bob", "Bill"]);
        assert_eq!(matching_names(&names, "\"Big").unwrap(), vec!["Big Bob"]);
        assert_eq!(matching_names(&names, "\"Big B").unwrap(), vec!["Big Bob"]);
        assert_eq!(matching_names(&names, "\"").unwrap().len(), 3);
        assert!(matching_names(&names, "Big B").is_none());
        assert!(matching_names(&names, "\"Big Bob\" 5").is_none());
    }

    #[test]
    fn test_quote_if_needed() {
        assert_eq!(quote_if_needed("Alice"), "Alice");
        assert_eq!(quote_if_needed("Big Bob"), "\"Big Bob\"");
    }
}

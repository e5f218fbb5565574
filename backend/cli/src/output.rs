//! Terminal output: colored notes, snapshot tables, and the event printer.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

use exthost_core::RuntimeEvent;
use exthost_events::Listener;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false))
}

/// Strip ANSI escape codes from a string.
pub fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn note_info(msg: &str) {
    if supports_color() {
        println!("{CYAN}{BOLD}ℹ{RESET} {msg}");
    } else {
        println!("INFO: {msg}");
    }
}

pub fn note_warn(msg: &str) {
    if supports_color() {
        println!("{YELLOW}{BOLD}⚠{RESET} {msg}");
    } else {
        println!("WARN: {msg}");
    }
}

pub fn note_error(msg: &str) {
    if supports_color() {
        eprintln!("{RED}{BOLD}✗{RESET} {msg}");
    } else {
        eprintln!("ERROR: {msg}");
    }
}

pub fn note_success(msg: &str) {
    if supports_color() {
        println!("{GREEN}{BOLD}✓{RESET} {msg}");
    } else {
        println!("OK: {msg}");
    }
}

/// Two-column table of module ids and their granted permissions.
pub fn render_snapshot(modules: &[String], permissions: &BTreeMap<String, Vec<String>>) -> String {
    let rows: Vec<[String; 2]> = modules
        .iter()
        .map(|id| {
            let granted = permissions.get(id).map(|p| p.join(", ")).unwrap_or_default();
            [id.clone(), if granted.is_empty() { "-".into() } else { granted }]
        })
        .collect();
    render_table(["Module", "Permissions"], &rows)
}

fn render_table<const N: usize>(headers: [&str; N], rows: &[[String; N]]) -> String {
    let mut widths = headers.map(|h| h.len());
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(strip_ansi(cell).len());
        }
    }

    let line = |cells: Vec<String>| format!("  {}\n", cells.join("  ").trim_end());
    let pad = |s: &str, w: usize| format!("{s}{}", " ".repeat(w.saturating_sub(strip_ansi(s).len())));

    let mut out = line(headers.iter().zip(widths).map(|(h, w)| pad(*h, w)).collect());
    out.push_str(&line(widths.iter().map(|w| "-".repeat(*w)).collect()));
    for row in rows {
        out.push_str(&line(row.iter().zip(widths).map(|(c, w)| pad(c.as_str(), w)).collect()));
    }
    out
}

/// Prints one line per dispatched event to stdout.
pub struct EventPrinter;

impl EventPrinter {
    fn describe(event: &RuntimeEvent) -> String {
        match event {
            RuntimeEvent::PermissionGrant { module, permission }
            | RuntimeEvent::PermissionRevoke { module, permission } => {
                format!("{module} {permission}")
            }
            RuntimeEvent::ModuleLoad(state) | RuntimeEvent::ModuleUnload(state) => match &state.path {
                Some(path) => format!("{} ({path})", state.id),
                None => state.id.clone(),
            },
            RuntimeEvent::UpdateAvailable(update) => match &update.version_name {
                Some(name) => format!("{} \"{name}\"", update.version),
                None => update.version.clone(),
            },
            RuntimeEvent::Message(message) => format!("from {}: {}", message.sender, message.payload),
            _ => String::new(),
        }
    }
}

#[async_trait]
impl Listener for EventPrinter {
    fn name(&self) -> &str {
        "event_printer"
    }

    async fn handle(&self, event: &RuntimeEvent) -> Result<()> {
        let kind = event.kind().to_string();
        let detail = Self::describe(event);
        if supports_color() {
            println!("  {DIM}event{RESET} {BOLD}{kind}{RESET} {detail}");
        } else {
            println!("  event {kind} {detail}");
        }
        Ok(())
    }
}

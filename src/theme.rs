/// Terminal theme, command palette, and chat prompt visuals.
use crate::gate::ApprovalGate;

// ---------------------------------------------------------------------------
// ANSI color helpers
// ---------------------------------------------------------------------------

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const CYAN: &str = "\x1b[36m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";
pub const MAGENTA: &str = "\x1b[35m";
pub const BOLD_CYAN: &str = "\x1b[1;36m";
pub const BOLD_YELLOW: &str = "\x1b[1;33m";
pub const BOLD_RED: &str = "\x1b[1;31m";

// ---------------------------------------------------------------------------
// Known commands for fuzzy matching
// ---------------------------------------------------------------------------

/// All registered slash commands with descriptions.
pub const COMMAND_PALETTE: &[(&str, &str)] = &[
    ("help", "show command quick reference"),
    ("status", "show active profile/session/approval mode"),
    ("plan", "show the current triage plan and its gaps"),
    ("confirm", "confirm the drafted plan and start dispatch"),
    ("revise", "redraft the plan with extra hints"),
    ("approve", "approve the pending gated actions"),
    ("reject", "reject the pending gated actions"),
    ("auto", "toggle auto-approve for gated tools"),
    ("tools", "show registered tools and the gated set"),
    ("agents", "list available sub-agents"),
    ("memory", "show loaded user/project memory"),
    ("cancel", "abandon the current triage run"),
    ("exit", "end interactive chat"),
];

// ---------------------------------------------------------------------------
// Prompt builder
// ---------------------------------------------------------------------------

/// Build the interactive prompt string with mode indicators and color.
pub fn build_prompt(gate: &ApprovalGate, awaiting_confirmation: bool) -> String {
    let mut parts = Vec::new();

    if gate.auto_approve() {
        parts.push(format!("{BOLD_YELLOW}⚡auto{RESET}"));
    }
    if gate.has_pending() {
        parts.push(format!("{BOLD_RED}pending approval{RESET}"));
    } else if awaiting_confirmation {
        parts.push(format!("{MAGENTA}plan drafted{RESET}"));
    }

    if parts.is_empty() {
        format!("{BOLD_CYAN}opsmind>{RESET} ")
    } else {
        format!(
            "{BOLD_CYAN}opsmind{RESET} {DIM}[{RESET}{}{DIM}]{RESET}{BOLD_CYAN}>{RESET} ",
            parts.join(" ")
        )
    }
}

// ---------------------------------------------------------------------------
// Startup banner
// ---------------------------------------------------------------------------

/// Print the chat startup banner.
pub fn print_startup_banner(provider: &str, session_id: &str, auto_approve: bool) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!(
        "  {BOLD_CYAN}opsmind-cli{RESET} {DIM}v{version}{RESET}  {DIM}·{RESET}  {GREEN}{provider}{RESET} {DIM}/{RESET} {GREEN}{session_id}{RESET}"
    );
    if auto_approve {
        println!("  {BOLD_YELLOW}⚡ Auto-approve enabled{RESET} {DIM}gated tools run without prompting{RESET}");
    }
    println!();
    println!(
        "  {CYAN}/help{RESET} {DIM}commands{RESET}  {DIM}·{RESET}  {CYAN}/tools{RESET} {DIM}registered tools{RESET}  {DIM}·{RESET}  {CYAN}/exit{RESET} {DIM}quit{RESET}"
    );
    println!("  {DIM}{}{RESET}", "━".repeat(68));
    println!();
}

// ---------------------------------------------------------------------------
// Fuzzy command matching
// ---------------------------------------------------------------------------

/// Result of fuzzy command matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuzzyResult {
    NoMatch,
    Exact(String),
    Ambiguous(Vec<String>),
}

/// Find the best fuzzy match for a command prefix among known commands.
pub fn fuzzy_match_command(input: &str) -> FuzzyResult {
    let lower = input.to_ascii_lowercase();
    let matches: Vec<&str> = COMMAND_PALETTE
        .iter()
        .filter(|(name, _)| name.starts_with(&lower))
        .map(|(name, _)| *name)
        .collect();

    match matches.len() {
        0 => FuzzyResult::NoMatch,
        1 => FuzzyResult::Exact(matches[0].to_string()),
        _ => FuzzyResult::Ambiguous(matches.iter().map(|s| s.to_string()).collect()),
    }
}

/// Format a "did you mean?" suggestion for an unknown command.
pub fn suggest_command(input: &str) -> Option<String> {
    match fuzzy_match_command(input) {
        FuzzyResult::Exact(cmd) => Some(format!("Did you mean {CYAN}/{cmd}{RESET}?")),
        FuzzyResult::Ambiguous(cmds) => {
            let list = cmds
                .iter()
                .map(|c| format!("{CYAN}/{c}{RESET}"))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("Did you mean one of: {list}?"))
        }
        FuzzyResult::NoMatch => None,
    }
}

/// Format the command palette for display.
pub fn format_command_palette() -> String {
    let mut out = String::from("Command palette:\n");
    for (name, desc) in COMMAND_PALETTE {
        out.push_str(&format!("  {CYAN}/{name:<12}{RESET} {DIM}{desc}{RESET}\n"));
    }
    out
}

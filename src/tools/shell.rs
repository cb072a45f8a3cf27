/// Sandboxed shell execution tool.
///
/// Commands run through `sh -c` with the configured sandbox root as working
/// directory. Approval is the gate's job; this tool only refuses commands
/// matching the hard-denied patterns and reports structured results.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use super::{FunctionTool, ParamSpec, Tool};

pub const SHELL_DENIED_PATTERNS: &[&str] = &[
    "rm -rf", "mkfs", "shutdown", "reboot", "poweroff", "halt", ":(){", "dd if=",
];

/// Shell-level patterns that can smuggle writes through an innocent-looking command.
pub const CHAINING_PATTERNS: &[&str] = &[
    "<(", "$(", "`", ">", "&&", "||", "&", ";", "\n", "\r", "IFS",
];

/// Commands that are safe to auto-approve (no side effects).
pub const READONLY_COMMANDS: &[&str] = &[
    "ls", "cat", "echo", "pwd", "which", "head", "tail", "find", "grep", "rg", "wc",
    "stat", "file", "diff", "sort", "uniq", "env", "uname", "whoami", "date", "df",
    "du", "uptime", "hostname", "realpath", "dirname", "basename", "jq",
];

/// Git subcommands that do not mutate the repository.
pub const READONLY_GIT_SUBCOMMANDS: &[&str] = &[
    "status", "diff", "log", "show", "blame", "branch", "tag", "remote", "rev-parse",
    "ls-files", "ls-tree", "cat-file", "grep", "help", "version",
];

pub fn is_read_only_command(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() || trimmed.contains('\n') || trimmed.contains('\r') {
        return false;
    }

    // Split by shell words; if shlex fails, treat as unsafe.
    let Some(args) = shlex::split(trimmed) else {
        return false;
    };

    if args
        .iter()
        .any(|a| CHAINING_PATTERNS.iter().any(|p| a.contains(p)))
    {
        return false;
    }

    // Split on pipes and check each command in the chain.
    let mut current: Vec<&str> = Vec::new();
    let mut commands: Vec<Vec<&str>> = Vec::new();
    for arg in &args {
        if arg == "|" {
            if !current.is_empty() {
                commands.push(current);
            }
            current = Vec::new();
        } else if arg.contains('|') {
            return false;
        } else {
            current.push(arg);
        }
    }
    if !current.is_empty() {
        commands.push(current);
    }

    for cmd_args in &commands {
        let Some(cmd) = cmd_args.first() else {
            return false;
        };

        // `find` with mutation flags is unsafe.
        if *cmd == "find"
            && cmd_args
                .iter()
                .any(|a| a.contains("-exec") || a.contains("-delete") || a.contains("-ok"))
        {
            return false;
        }

        if *cmd == "git" {
            let Some(sub) = cmd_args.get(1) else {
                return false;
            };
            if !READONLY_GIT_SUBCOMMANDS.contains(sub) {
                return false;
            }
            continue;
        }

        if !READONLY_COMMANDS.contains(cmd) {
            return false;
        }
    }

    true
}

pub fn matched_denied_pattern(command: &str) -> Option<&'static str> {
    let normalized = command.trim().to_ascii_lowercase();
    SHELL_DENIED_PATTERNS
        .iter()
        .copied()
        .find(|pattern| normalized.contains(pattern))
}

pub fn truncate_text(text: &str, max_chars: usize) -> (String, bool) {
    let mut iter = text.chars();
    let truncated = iter.by_ref().take(max_chars).collect::<String>();
    if iter.next().is_some() {
        (truncated, true)
    } else {
        (text.to_string(), false)
    }
}

async fn run_shell(
    command: &str,
    sandbox_root: &PathBuf,
    timeout_secs: u64,
    max_output_chars: usize,
) -> Value {
    if let Some(pattern) = matched_denied_pattern(command) {
        return json!({
            "status": "error",
            "kind": "execute_shell",
            "code": "denied_command",
            "command": command,
            "error": format!("execute_shell refused command due to blocked pattern '{pattern}'"),
        });
    }

    let child = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(sandbox_root)
        .output();

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child).await {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            return json!({
                "status": "error",
                "kind": "execute_shell",
                "code": "io_error",
                "command": command,
                "error": format!("failed to launch shell command: {err}"),
            });
        }
        Err(_) => {
            return json!({
                "status": "error",
                "kind": "execute_shell",
                "code": "timeout",
                "command": command,
                "error": format!("command timed out after {timeout_secs}s"),
            });
        }
    };

    let stdout_text = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr_text = String::from_utf8_lossy(&output.stderr).to_string();
    let (stdout, stdout_truncated) = truncate_text(&stdout_text, max_output_chars);
    let (stderr, stderr_truncated) = truncate_text(&stderr_text, max_output_chars);

    if output.status.success() {
        json!({
            "status": "ok",
            "kind": "execute_shell",
            "command": command,
            "exit_code": output.status.code().unwrap_or(0),
            "stdout": stdout,
            "stderr": stderr,
            "stdout_truncated": stdout_truncated,
            "stderr_truncated": stderr_truncated,
        })
    } else {
        json!({
            "status": "error",
            "kind": "execute_shell",
            "code": "command_failed",
            "command": command,
            "error": format!("command exited with non-zero status: {}", output.status),
            "exit_code": output.status.code().unwrap_or(-1),
            "stdout": stdout,
            "stderr": stderr,
            "stdout_truncated": stdout_truncated,
            "stderr_truncated": stderr_truncated,
        })
    }
}

pub fn build_execute_shell_tool(
    sandbox_root: PathBuf,
    timeout_secs: u64,
    max_output_chars: usize,
) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        super::EXECUTE_SHELL_TOOL_NAME,
        "Executes a shell command inside the sandbox root and captures its output. \
         Args: command (required).",
        vec![ParamSpec::required(
            "command",
            "string",
            "shell command to execute",
        )],
        move |args| {
            let sandbox_root = sandbox_root.clone();
            async move {
                let command = args
                    .get("command")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                if command.is_empty() {
                    return Ok(json!({
                        "status": "error",
                        "kind": "execute_shell",
                        "code": "invalid_args",
                        "error": "'command' must be a non-empty string",
                    }));
                }
                Ok(run_shell(&command, &sandbox_root, timeout_secs, max_output_chars).await)
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_detection_accepts_plain_queries() {
        assert!(is_read_only_command("ls -la"));
        assert!(is_read_only_command("git status"));
        assert!(is_read_only_command("grep -rn pattern src | head -5"));
    }

    #[test]
    fn read_only_detection_rejects_mutations_and_chaining() {
        assert!(!is_read_only_command("make format"));
        assert!(!is_read_only_command("git push"));
        assert!(!is_read_only_command("ls; rm file"));
        assert!(!is_read_only_command("cat x > y"));
        assert!(!is_read_only_command("find . -delete"));
    }

    #[test]
    fn denied_patterns_match_case_insensitively() {
        assert_eq!(matched_denied_pattern("RM -RF /"), Some("rm -rf"));
        assert_eq!(matched_denied_pattern("echo ok"), None);
    }

    #[test]
    fn truncation_flags_overflow() {
        let (text, truncated) = truncate_text("abcdef", 4);
        assert_eq!(text, "abcd");
        assert!(truncated);
        let (text, truncated) = truncate_text("abc", 4);
        assert_eq!(text, "abc");
        assert!(!truncated);
    }
}

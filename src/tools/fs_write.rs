/// Sandboxed file write tool.
///
/// Paths resolve relative to the sandbox root; escapes via absolute paths or
/// parent components are refused before any filesystem access.
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::{Value, json};
use similar::{ChangeTag, TextDiff};

use super::{FunctionTool, ParamSpec, Tool};
use crate::theme::{DIM, GREEN, RED, RESET};

/// Resolve a tool-supplied path inside the sandbox root, or explain why not.
pub fn resolve_sandboxed_path(sandbox_root: &Path, raw: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        return Err(format!("absolute path '{raw}' is outside the sandbox root"));
    }
    if candidate
        .components()
        .any(|part| matches!(part, Component::ParentDir))
    {
        return Err(format!("path '{raw}' may not contain parent components"));
    }
    Ok(sandbox_root.join(candidate))
}

fn fs_write_response(sandbox_root: &Path, args: &Value) -> Value {
    let raw_path = args.get("path").and_then(Value::as_str).unwrap_or_default();
    let mode = args
        .get("mode")
        .and_then(Value::as_str)
        .unwrap_or("create");
    let content = args.get("content").and_then(Value::as_str).unwrap_or("");

    let path = match resolve_sandboxed_path(sandbox_root, raw_path) {
        Ok(path) => path,
        Err(reason) => {
            return json!({
                "status": "error",
                "kind": "fs_write",
                "code": "sandbox_violation",
                "path": raw_path,
                "error": reason,
            });
        }
    };

    let result = match mode {
        "create" => {
            if path.exists() {
                Err(format!(
                    "path '{raw_path}' already exists; use mode=overwrite to replace it"
                ))
            } else {
                write_with_parents(&path, content, false)
            }
        }
        "overwrite" => write_with_parents(&path, content, false),
        "append" => write_with_parents(&path, content, true),
        other => Err(format!(
            "unknown mode '{other}'. Use create|overwrite|append."
        )),
    };

    match result {
        Ok(()) => json!({
            "status": "ok",
            "kind": "fs_write",
            "path": raw_path,
            "mode": mode,
            "bytes_written": content.len(),
        }),
        Err(reason) => json!({
            "status": "error",
            "kind": "fs_write",
            "code": "write_failed",
            "path": raw_path,
            "error": reason,
        }),
    }
}

fn write_with_parents(path: &Path, content: &str, append: bool) -> Result<(), String> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create parent directory: {err}"))?;
    }
    if append {
        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| format!("failed to open file for append: {err}"))?;
        file.write_all(content.as_bytes())
            .map_err(|err| format!("failed to append: {err}"))
    } else {
        std::fs::write(path, content).map_err(|err| format!("failed to write: {err}"))
    }
}

/// Render a unified diff of a proposed write for the approval prompt.
pub fn render_write_preview(sandbox_root: &Path, args: &Value) -> String {
    let raw_path = args.get("path").and_then(Value::as_str).unwrap_or("?");
    let new_content = args.get("content").and_then(Value::as_str).unwrap_or("");
    let old_content = resolve_sandboxed_path(sandbox_root, raw_path)
        .ok()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .unwrap_or_default();

    let mut out = format!("{DIM}{raw_path}{RESET}\n");
    let diff = TextDiff::from_lines(old_content.as_str(), new_content);
    for change in diff.iter_all_changes() {
        let line = change.value().trim_end_matches('\n');
        match change.tag() {
            ChangeTag::Delete => out.push_str(&format!("{RED}- {line}{RESET}\n")),
            ChangeTag::Insert => out.push_str(&format!("{GREEN}+ {line}{RESET}\n")),
            ChangeTag::Equal => out.push_str(&format!("{DIM}  {line}{RESET}\n")),
        }
    }
    out
}

pub fn build_fs_write_tool(sandbox_root: PathBuf) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        super::FS_WRITE_TOOL_NAME,
        "Writes a file inside the sandbox root. \
         Args: path (required), mode=create|overwrite|append, content.",
        vec![
            ParamSpec::required("path", "string", "path relative to the sandbox root"),
            ParamSpec::with_default("mode", "string", json!("create"), "write mode"),
            ParamSpec::with_default("content", "string", json!(""), "file content"),
        ],
        move |args| {
            let sandbox_root = sandbox_root.clone();
            async move { Ok(fs_write_response(&sandbox_root, &args)) }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_land_inside_the_sandbox() {
        let dir = tempdir().unwrap();
        let tool = build_fs_write_tool(dir.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "notes/a.txt", "mode": "create", "content": "hello"}))
            .await
            .unwrap();

        assert_eq!(result["status"], json!("ok"));
        let written = std::fs::read_to_string(dir.path().join("notes/a.txt")).unwrap();
        assert_eq!(written, "hello");
    }

    #[tokio::test]
    async fn parent_components_are_refused() {
        let dir = tempdir().unwrap();
        let tool = build_fs_write_tool(dir.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "../escape.txt", "content": "x"}))
            .await
            .unwrap();

        assert_eq!(result["code"], json!("sandbox_violation"));
        assert!(!dir.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn create_refuses_existing_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "old").unwrap();
        let tool = build_fs_write_tool(dir.path().to_path_buf());
        let result = tool
            .execute(json!({"path": "a.txt", "mode": "create", "content": "new"}))
            .await
            .unwrap();

        assert_eq!(result["status"], json!("error"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "old");
    }
}

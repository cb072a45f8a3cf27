/// Agent memory loader: user-level and project-level instruction documents.
///
/// The user document lives at `~/.opsmind/<assistant_id>/agent.md`; the
/// project document at `<project_root>/.opsmind/agent.md`, where the project
/// root is found by walking up to a `.git` marker. Loading is idempotent per
/// session and an unreadable document degrades to a warning.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use crate::session::{PROJECT_MEMORY_KEY, SessionStore, USER_MEMORY_KEY};

/// Relative location of a memory document under its base directory.
pub const MEMORY_DIR: &str = ".opsmind";
pub const MEMORY_FILE: &str = "agent.md";

/// Walk up from `start` looking for a version-control marker directory.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if dir.join(".git").exists() {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Memory keys already present in session state, used for the idempotence check.
#[derive(Debug, Default, Clone)]
pub struct MemoryState {
    pub user_memory: Option<String>,
    pub project_memory: Option<String>,
}

/// Newly loaded memory documents. Empty when session state was already complete.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryUpdate {
    pub user_memory: Option<String>,
    pub project_memory: Option<String>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.user_memory.is_none() && self.project_memory.is_none()
    }
}

pub struct MemoryLoader {
    assistant_id: String,
    home_dir: Option<PathBuf>,
    project_root: Option<PathBuf>,
}

impl MemoryLoader {
    pub fn new(
        assistant_id: impl Into<String>,
        home_dir: Option<PathBuf>,
        project_root: Option<PathBuf>,
    ) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            home_dir,
            project_root,
        }
    }

    /// Resolve from the process environment: real home directory, project
    /// root detected from the current working directory.
    pub fn from_environment(assistant_id: &str) -> Self {
        let project_root = std::env::current_dir()
            .ok()
            .and_then(|cwd| find_project_root(&cwd));
        Self::new(assistant_id, dirs::home_dir(), project_root)
    }

    pub fn user_doc_path(&self) -> Option<PathBuf> {
        self.home_dir
            .as_ref()
            .map(|home| home.join(MEMORY_DIR).join(&self.assistant_id).join(MEMORY_FILE))
    }

    pub fn project_doc_path(&self) -> Option<PathBuf> {
        self.project_root
            .as_ref()
            .map(|root| root.join(MEMORY_DIR).join(MEMORY_FILE))
    }

    /// Load memory documents not already present in session state.
    ///
    /// Returns an empty update when state already holds every expected key:
    /// `user_memory` always, `project_memory` only when a project root was
    /// detected. No file is re-read in that case.
    pub fn load(&self, state: &MemoryState) -> MemoryUpdate {
        let project_expected = self.project_root.is_some();
        let already_loaded = state.user_memory.is_some()
            && (!project_expected || state.project_memory.is_some());
        if already_loaded {
            return MemoryUpdate::default();
        }

        let mut update = MemoryUpdate::default();
        if state.user_memory.is_none()
            && let Some(path) = self.user_doc_path()
        {
            update.user_memory = read_memory_doc(&path);
        }
        if project_expected
            && state.project_memory.is_none()
            && let Some(path) = self.project_doc_path()
        {
            update.project_memory = read_memory_doc(&path);
        }
        update
    }
}

/// Read a memory document. Absent files are not an error; unreadable files
/// are reported as a warning and skipped.
fn read_memory_doc(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "memory document is unreadable, continuing without it"
            );
            None
        }
    }
}

/// Load memory into session state, skipping keys the session already holds.
pub async fn load_session_memory(
    loader: &MemoryLoader,
    store: &Arc<dyn SessionStore>,
    session_id: &str,
) -> Result<MemoryUpdate> {
    let state = MemoryState {
        user_memory: store
            .get_state(session_id, USER_MEMORY_KEY)
            .await?
            .and_then(|v| v.as_str().map(String::from)),
        project_memory: store
            .get_state(session_id, PROJECT_MEMORY_KEY)
            .await?
            .and_then(|v| v.as_str().map(String::from)),
    };

    let update = loader.load(&state);
    if let Some(user_memory) = &update.user_memory {
        store
            .put_state(session_id, USER_MEMORY_KEY, &json!(user_memory))
            .await?;
    }
    if let Some(project_memory) = &update.project_memory {
        store
            .put_state(session_id, PROJECT_MEMORY_KEY, &json!(project_memory))
            .await?;
    }
    Ok(update)
}

/// Merge loaded memory into the orchestrator's effective system context.
pub fn memory_context_section(state: &MemoryState) -> Option<String> {
    let mut sections = Vec::new();
    if let Some(user_memory) = state.user_memory.as_deref().map(str::trim)
        && !user_memory.is_empty()
    {
        sections.push(format!("User instructions:\n{user_memory}"));
    }
    if let Some(project_memory) = state.project_memory.as_deref().map(str::trim)
        && !project_memory.is_empty()
    {
        sections.push(format!("Project instructions:\n{project_memory}"));
    }
    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_doc(base: &Path, assistant_id: Option<&str>, content: &str) {
        let dir = match assistant_id {
            Some(id) => base.join(MEMORY_DIR).join(id),
            None => base.join(MEMORY_DIR),
        };
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MEMORY_FILE), content).unwrap();
    }

    #[test]
    fn loads_user_memory_only_outside_a_project() {
        let home = tempdir().unwrap();
        write_doc(home.path(), Some("test_agent"), "User instructions");

        let loader = MemoryLoader::new("test_agent", Some(home.path().to_path_buf()), None);
        let update = loader.load(&MemoryState::default());

        assert_eq!(update.user_memory.as_deref(), Some("User instructions"));
        assert!(update.project_memory.is_none());
    }

    #[test]
    fn loads_both_memories_inside_a_project() {
        let home = tempdir().unwrap();
        let project = tempdir().unwrap();
        write_doc(home.path(), Some("test_agent"), "User instructions");
        std::fs::create_dir_all(project.path().join(".git")).unwrap();
        write_doc(project.path(), None, "Project instructions");

        let loader = MemoryLoader::new(
            "test_agent",
            Some(home.path().to_path_buf()),
            find_project_root(project.path()),
        );
        let update = loader.load(&MemoryState::default());

        assert_eq!(update.user_memory.as_deref(), Some("User instructions"));
        assert_eq!(update.project_memory.as_deref(), Some("Project instructions"));
    }

    #[test]
    fn load_is_idempotent_once_state_is_populated() {
        let home = tempdir().unwrap();
        write_doc(home.path(), Some("test_agent"), "User instructions");

        let loader = MemoryLoader::new("test_agent", Some(home.path().to_path_buf()), None);
        let state = MemoryState {
            user_memory: Some("Existing memory".to_string()),
            project_memory: Some("Existing project".to_string()),
        };

        assert_eq!(loader.load(&state), MemoryUpdate::default());
    }

    #[test]
    fn project_root_detection_walks_up_to_the_git_marker() {
        let project = tempdir().unwrap();
        std::fs::create_dir_all(project.path().join(".git")).unwrap();
        let nested = project.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_project_root(&nested),
            Some(project.path().to_path_buf())
        );
    }

    #[test]
    fn absent_documents_are_omitted_not_errors() {
        let home = tempdir().unwrap();
        let loader = MemoryLoader::new("test_agent", Some(home.path().to_path_buf()), None);
        let update = loader.load(&MemoryState::default());
        assert!(update.is_empty());
    }
}

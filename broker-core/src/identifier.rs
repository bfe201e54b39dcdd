use std::path::Path;

use broker_types::{CodebaseIdentity, IdentificationMethod};
use regex::Regex;
use tokio::process::Command;

/// Identifies a workspace path as a canonical codebase id, spec.md §4.8.
///
/// Shells out to `git` the way `distri/src/agent/code/sandbox.rs` shells out
/// to external commands and parses their stdout.
pub struct CodebaseIdentifier;

impl CodebaseIdentifier {
    pub async fn identify(workspace_path: &str, custom_id: Option<&str>) -> CodebaseIdentity {
        if let Some(custom_id) = custom_id {
            return CodebaseIdentity {
                canonical_id: custom_id.to_string(),
                display_name: custom_id.to_string(),
                workspace_path: workspace_path.to_string(),
                repository_url: None,
                git_remote: None,
                branch: None,
                commit_hash: None,
                method: IdentificationMethod::Custom,
            };
        }

        let git_dir = Path::new(workspace_path).join(".git");
        if git_dir.exists() {
            return Self::identify_git(workspace_path).await;
        }

        let folder_name = Path::new(workspace_path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| workspace_path.to_string());

        CodebaseIdentity {
            canonical_id: format!("local:{workspace_path}"),
            display_name: folder_name,
            workspace_path: workspace_path.to_string(),
            repository_url: None,
            git_remote: None,
            branch: None,
            commit_hash: None,
            method: IdentificationMethod::FolderName,
        }
    }

    async fn identify_git(workspace_path: &str) -> CodebaseIdentity {
        let branch = run_git(workspace_path, &["branch", "--show-current"]).await;
        let commit_hash = run_git(workspace_path, &["rev-parse", "HEAD"]).await;
        let remote_v = run_git(workspace_path, &["remote", "-v"]).await;

        let git_remote = remote_v
            .as_deref()
            .and_then(first_origin_url)
            .map(str::to_string);

        let folder_name = Path::new(workspace_path)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| workspace_path.to_string());

        match git_remote.as_deref().and_then(canonicalize_remote) {
            Some(canonical) => CodebaseIdentity {
                display_name: canonical.clone(),
                canonical_id: canonical,
                workspace_path: workspace_path.to_string(),
                repository_url: git_remote.clone(),
                git_remote,
                branch,
                commit_hash,
                method: IdentificationMethod::GitRemote,
            },
            None => CodebaseIdentity {
                canonical_id: format!("git-local:{folder_name}"),
                display_name: folder_name,
                workspace_path: workspace_path.to_string(),
                repository_url: None,
                git_remote: None,
                branch,
                commit_hash,
                method: IdentificationMethod::GitLocal,
            },
        }
    }

    pub async fn same_codebase(p1: &str, p2: &str) -> bool {
        Self::identify(p1, None).await.canonical_id == Self::identify(p2, None).await.canonical_id
    }
}

async fn run_git(cwd: &str, args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).current_dir(cwd).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// `git remote -v` prints one line per remote/direction; take the first
/// `origin` fetch URL, falling back to the first line present.
fn first_origin_url(remote_v: &str) -> Option<&str> {
    remote_v
        .lines()
        .find(|l| l.starts_with("origin\t") || l.starts_with("origin "))
        .or_else(|| remote_v.lines().next())
        .and_then(|line| line.split_whitespace().nth(1))
}

/// `github.com/<owner>/<repo>`, `gitlab.com/<owner>/<repo>`,
/// `host/<owner>/<repo>` (from SSH `git@host:owner/repo.git`), or a generic
/// `https://host/path` form.
fn canonicalize_remote(url: &str) -> Option<String> {
    static SSH: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"^git@([^:]+):(.+?)(\.git)?$").unwrap());
    static HTTPS: std::sync::LazyLock<Regex> =
        std::sync::LazyLock::new(|| Regex::new(r"^https?://([^/]+)/(.+?)(\.git)?/?$").unwrap());

    if let Some(caps) = SSH.captures(url) {
        let host = &caps[1];
        let path = &caps[2];
        return Some(format!("{host}/{path}"));
    }
    if let Some(caps) = HTTPS.captures(url) {
        let host = &caps[1];
        let path = &caps[2];
        return Some(format!("{host}/{path}"));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_ssh_remote() {
        assert_eq!(
            canonicalize_remote("git@github.com:acme/widgets.git"),
            Some("github.com/acme/widgets".to_string())
        );
    }

    #[test]
    fn canonicalizes_https_remote() {
        assert_eq!(
            canonicalize_remote("https://gitlab.com/acme/widgets.git"),
            Some("gitlab.com/acme/widgets".to_string())
        );
    }

    #[test]
    fn rejects_unrecognized_scheme() {
        assert_eq!(canonicalize_remote("ftp://example.com/x"), None);
    }

    #[tokio::test]
    async fn custom_id_wins_over_everything() {
        let identity = CodebaseIdentifier::identify("/tmp/does-not-matter", Some("my-id")).await;
        assert_eq!(identity.canonical_id, "my-id");
        assert_eq!(identity.method, IdentificationMethod::Custom);
    }

    #[tokio::test]
    async fn non_git_folder_uses_folder_name() {
        let dir = tempfile::tempdir().unwrap();
        let identity = CodebaseIdentifier::identify(dir.path().to_str().unwrap(), None).await;
        assert_eq!(identity.method, IdentificationMethod::FolderName);
        assert!(identity.canonical_id.starts_with("local:"));
    }
}

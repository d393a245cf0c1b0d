//! Shell resolution
//!
//! Picks the login shell a new session should run and the ordered chain of
//! fallbacks tried when spawning it fails.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// POSIX shells in preference order
const POSIX_CANDIDATES: [&str; 3] = ["/bin/zsh", "/bin/bash", "/bin/sh"];

/// Used when no POSIX candidate exists; spawning it may fail, which the
/// session's fallback chain handles.
pub const LAST_RESORT_SHELL: &str = "/bin/zsh";

/// Fixed shell on Windows (no existence check)
pub const WINDOWS_SHELL: &str = "powershell.exe";

/// Shells tried after the preferred one when spawning fails
const SPAWN_FALLBACKS: [&str; 2] = ["/bin/bash", "/bin/sh"];

/// Platform family, as far as shell selection is concerned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Posix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Posix
        }
    }
}

/// Information about a shell
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellInfo {
    /// Unique identifier (e.g., "zsh", "bash", "powershell")
    pub id: String,
    /// Human-readable label (e.g., "Zsh", "Bash", "PowerShell")
    pub label: String,
    /// Full path to the shell executable
    pub path: PathBuf,
}

impl ShellInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            path: path.into(),
        }
    }

    /// Derive id and label from the executable name
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("shell")
            .to_string();
        let label = match id.as_str() {
            "zsh" => "Zsh".to_string(),
            "bash" => "Bash".to_string(),
            "sh" => "Bourne Shell".to_string(),
            "powershell" => "Windows PowerShell".to_string(),
            "pwsh" => "PowerShell Core".to_string(),
            other => capitalize_first(other),
        };
        Self::new(id, label, path)
    }
}

/// Ranked shell candidates for `platform`.
///
/// On POSIX only candidates for which `exists` holds are kept, in preference
/// order; if none exist the list is `[/bin/zsh]`. On Windows the list is the
/// fixed PowerShell executable and `exists` is never consulted.
pub fn shell_candidates<F>(platform: Platform, exists: F) -> Vec<PathBuf>
where
    F: Fn(&Path) -> bool,
{
    match platform {
        Platform::Windows => vec![PathBuf::from(WINDOWS_SHELL)],
        Platform::Posix => {
            let found: Vec<PathBuf> = POSIX_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .filter(|p| exists(p))
                .collect();
            if found.is_empty() {
                vec![PathBuf::from(LAST_RESORT_SHELL)]
            } else {
                found
            }
        }
    }
}

/// Resolve the preferred shell against an explicit existence probe
pub fn resolve_shell_with<F>(platform: Platform, exists: F) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    shell_candidates(platform, exists)
        .into_iter()
        .next()
        .unwrap_or_else(|| PathBuf::from(LAST_RESORT_SHELL))
}

/// Resolve the preferred shell for this host
pub fn resolve_shell() -> PathBuf {
    let shell = resolve_shell_with(Platform::current(), Path::exists);
    tracing::debug!("Resolved shell: {}", shell.display());
    shell
}

/// Shells to try, in order, when spawning a session whose preferred shell
/// is `preferred`. Duplicates are removed while keeping the first occurrence.
pub fn spawn_chain(platform: Platform, preferred: &Path) -> Vec<PathBuf> {
    let mut chain = vec![preferred.to_path_buf()];
    if platform == Platform::Posix {
        for fallback in SPAWN_FALLBACKS {
            let fallback = PathBuf::from(fallback);
            if !chain.contains(&fallback) {
                chain.push(fallback);
            }
        }
    }
    chain
}

/// Default arguments for an interactive shell on `platform`
pub fn default_shell_args(platform: Platform) -> Vec<String> {
    match platform {
        Platform::Posix => vec!["-i".to_string()],
        Platform::Windows => vec![],
    }
}

/// Capitalize the first letter of a string
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn only(existing: &'static [&'static str]) -> impl Fn(&Path) -> bool {
        move |p: &Path| existing.iter().any(|e| Path::new(e) == p)
    }

    #[test]
    fn test_zsh_first_when_present() {
        let all = shell_candidates(Platform::Posix, only(&["/bin/zsh", "/bin/bash", "/bin/sh"]));
        assert_eq!(
            all,
            vec![
                PathBuf::from("/bin/zsh"),
                PathBuf::from("/bin/bash"),
                PathBuf::from("/bin/sh")
            ]
        );

        let no_bash = shell_candidates(Platform::Posix, only(&["/bin/zsh", "/bin/sh"]));
        assert_eq!(no_bash[0], PathBuf::from("/bin/zsh"));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let probe = only(&["/bin/bash", "/bin/sh"]);
        let first = shell_candidates(Platform::Posix, &probe);
        for _ in 0..5 {
            assert_eq!(shell_candidates(Platform::Posix, &probe), first);
        }
        assert_eq!(resolve_shell_with(Platform::Posix, &probe), PathBuf::from("/bin/bash"));
    }

    #[test]
    fn test_last_resort_when_nothing_exists() {
        let candidates = shell_candidates(Platform::Posix, |_| false);
        assert_eq!(candidates, vec![PathBuf::from(LAST_RESORT_SHELL)]);
    }

    #[test]
    fn test_windows_skips_probe() {
        let candidates = shell_candidates(Platform::Windows, |_| panic!("must not probe"));
        assert_eq!(candidates, vec![PathBuf::from(WINDOWS_SHELL)]);
    }

    #[test]
    fn test_spawn_chain_dedups() {
        let chain = spawn_chain(Platform::Posix, Path::new("/bin/bash"));
        assert_eq!(chain, vec![PathBuf::from("/bin/bash"), PathBuf::from("/bin/sh")]);

        let chain = spawn_chain(Platform::Posix, Path::new("/bin/zsh"));
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0], PathBuf::from("/bin/zsh"));

        let chain = spawn_chain(Platform::Windows, Path::new(WINDOWS_SHELL));
        assert_eq!(chain, vec![PathBuf::from(WINDOWS_SHELL)]);
    }

    #[test]
    fn test_shell_info_from_path() {
        let info = ShellInfo::from_path("/bin/zsh");
        assert_eq!(info.id, "zsh");
        assert_eq!(info.label, "Zsh");

        let info = ShellInfo::from_path("powershell.exe");
        assert_eq!(info.id, "powershell");

        let info = ShellInfo::from_path("/usr/local/bin/fish");
        assert_eq!(info.label, "Fish");
    }

    #[test]
    fn test_capitalize_first() {
        assert_eq!(capitalize_first("zsh"), "Zsh");
        assert_eq!(capitalize_first(""), "");
    }
}

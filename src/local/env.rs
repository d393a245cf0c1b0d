//! Child environment construction
//!
//! A host started from an interactive shell already carries a usable,
//! profile-sourced environment and passes it on. A host started from a
//! desktop launcher does not, so the shell gets a small deterministic
//! environment whose PATH covers the usual toolchain install locations.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::local::shell::Platform;

pub const DEFAULT_TERM: &str = "xterm-256color";
pub const DEFAULT_LANG: &str = "en_US.UTF-8";
const FALLBACK_USER: &str = "user";

/// Environment variables that sessions are built from
pub type Environment = BTreeMap<String, String>;

/// Snapshot of everything about the host process the builder looks at
#[derive(Clone, Debug)]
pub struct HostEnvironment {
    pub platform: Platform,
    /// Parent process environment
    pub vars: HashMap<String, String>,
    pub home: Option<PathBuf>,
    /// OS account name, used when `USER` is unset
    pub username: Option<String>,
    /// Installed/bundled build (as opposed to a development run)
    pub packaged: bool,
}

impl HostEnvironment {
    /// Capture the current process state
    pub fn capture(packaged: bool) -> Self {
        let username = whoami::username();
        Self {
            platform: Platform::current(),
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
            username: (!username.is_empty()).then_some(username),
            packaged,
        }
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    /// Launched from an interactive shell: both the shell indicator and the
    /// working-directory variable are inherited, and this is not a packaged build.
    pub fn is_terminal_context(&self) -> bool {
        self.var("SHELL").is_some() && self.var("PWD").is_some() && !self.packaged
    }

    /// Directory sessions start in
    pub fn working_directory(&self) -> PathBuf {
        self.home
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("/"))
    }
}

/// Build the environment block for a new shell
pub fn build_environment(host: &HostEnvironment) -> Environment {
    let cwd = host.working_directory();

    if host.platform == Platform::Windows {
        let mut env: Environment = host.vars.clone().into_iter().collect();
        if !env.contains_key("HOME") {
            env.insert("HOME".to_string(), cwd.display().to_string());
        }
        return env;
    }

    if host.is_terminal_context() {
        tracing::debug!("Launched from a terminal, inheriting parent environment");
        let mut env: Environment = host.vars.clone().into_iter().collect();
        env.insert("PWD".to_string(), cwd.display().to_string());
        return env;
    }

    tracing::debug!("Launched outside a terminal, using minimal environment");
    let home = host
        .home
        .clone()
        .unwrap_or_else(|| cwd.clone())
        .display()
        .to_string();
    let user = host
        .var("USER")
        .map(str::to_string)
        .or_else(|| host.username.clone())
        .unwrap_or_else(|| FALLBACK_USER.to_string());
    let lang = host.var("LANG").unwrap_or(DEFAULT_LANG).to_string();

    let mut env = Environment::new();
    env.insert("PATH".to_string(), curated_path(Path::new(&home)));
    env.insert("GOPATH".to_string(), format!("{}/go", home));
    env.insert("HOME".to_string(), home);
    env.insert("USER".to_string(), user);
    env.insert("TERM".to_string(), DEFAULT_TERM.to_string());
    env.insert("LANG".to_string(), lang);
    env.insert("PWD".to_string(), cwd.display().to_string());
    env
}

/// PATH covering package-manager and language-toolchain install locations
pub fn curated_path(home: &Path) -> String {
    let home = home.display();
    let mut entries = vec![
        "/opt/homebrew/bin".to_string(),
        "/opt/homebrew/sbin".to_string(),
        "/usr/local/go/bin".to_string(),
        format!("{}/go/bin", home),
        format!("{}/.cargo/bin", home),
    ];
    entries.extend(nvm_node_bins(&format!("{}/.nvm/versions/node/*/bin", home)));
    entries.extend(
        [
            format!("{}/.local/bin", home),
            "/usr/local/bin".to_string(),
            "/usr/bin".to_string(),
            "/bin".to_string(),
            "/usr/sbin".to_string(),
            "/sbin".to_string(),
        ]
        .into_iter(),
    );
    entries.join(":")
}

/// Installed nvm node versions; nothing when nvm is absent
fn nvm_node_bins(pattern: &str) -> Vec<String> {
    match glob::glob(pattern) {
        Ok(paths) => paths
            .filter_map(Result::ok)
            .map(|p| p.display().to_string())
            .collect(),
        Err(e) => {
            tracing::warn!("Invalid nvm path pattern {}: {}", pattern, e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(vars: &[(&str, &str)], packaged: bool) -> HostEnvironment {
        HostEnvironment {
            platform: Platform::Posix,
            vars: vars
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            home: Some(PathBuf::from("/home/alice")),
            username: Some("alice-os".to_string()),
            packaged,
        }
    }

    #[test]
    fn test_terminal_context_inherits() {
        let h = host(
            &[("SHELL", "/bin/zsh"), ("PWD", "/tmp/work"), ("EDITOR", "vim")],
            false,
        );
        assert!(h.is_terminal_context());

        let env = build_environment(&h);
        assert_eq!(env.get("EDITOR").map(String::as_str), Some("vim"));
        assert_eq!(env.get("SHELL").map(String::as_str), Some("/bin/zsh"));
        assert_eq!(env.get("PWD").map(String::as_str), Some("/home/alice"));
    }

    #[test]
    fn test_packaged_build_uses_minimal_env() {
        let h = host(&[("SHELL", "/bin/zsh"), ("PWD", "/tmp"), ("EDITOR", "vim")], true);
        assert!(!h.is_terminal_context());

        let env = build_environment(&h);
        assert!(!env.contains_key("EDITOR"));
        assert_eq!(env.get("TERM").map(String::as_str), Some(DEFAULT_TERM));
    }

    #[test]
    fn test_minimal_env_contents() {
        let env = build_environment(&host(&[], false));

        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/alice"));
        assert_eq!(env.get("PWD").map(String::as_str), Some("/home/alice"));
        assert_eq!(env.get("USER").map(String::as_str), Some("alice-os"));
        assert_eq!(env.get("LANG").map(String::as_str), Some(DEFAULT_LANG));
        assert_eq!(env.get("GOPATH").map(String::as_str), Some("/home/alice/go"));

        let path = env.get("PATH").expect("PATH set");
        assert!(path.starts_with("/opt/homebrew/bin:"));
        assert!(path.contains("/home/alice/.cargo/bin"));
        assert!(path.ends_with("/usr/sbin:/sbin"));
        assert!(!path.contains('*'));
    }

    #[test]
    fn test_user_and_lang_fallbacks() {
        let env = build_environment(&host(&[("USER", "bob"), ("LANG", "de_DE.UTF-8")], false));
        assert_eq!(env.get("USER").map(String::as_str), Some("bob"));
        assert_eq!(env.get("LANG").map(String::as_str), Some("de_DE.UTF-8"));

        let mut h = host(&[], false);
        h.username = None;
        let env = build_environment(&h);
        assert_eq!(env.get("USER").map(String::as_str), Some(FALLBACK_USER));
    }

    #[test]
    fn test_only_shell_var_is_not_terminal_context() {
        let h = host(&[("SHELL", "/bin/bash")], false);
        assert!(!h.is_terminal_context());
    }

    #[test]
    fn test_curated_path_expands_nvm() {
        let temp = tempfile::tempdir().unwrap();
        let node_bin = temp.path().join(".nvm/versions/node/v20.11.0/bin");
        std::fs::create_dir_all(&node_bin).unwrap();

        let path = curated_path(temp.path());
        let entries: Vec<&str> = path.split(':').collect();
        let cargo = entries
            .iter()
            .position(|e| e.ends_with(".cargo/bin"))
            .unwrap();
        let nvm = entries
            .iter()
            .position(|e| *e == node_bin.display().to_string())
            .unwrap();
        assert_eq!(nvm, cargo + 1);
    }

    #[test]
    fn test_windows_inherits_and_defaults_home() {
        let mut h = host(&[("PATH", "C:\\Windows")], true);
        h.platform = Platform::Windows;
        let env = build_environment(&h);
        assert_eq!(env.get("PATH").map(String::as_str), Some("C:\\Windows"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/alice"));
    }
}

//! Per-window options
//!
//! A surface describes itself with command-line style arguments
//! (`--title`, `--bg`, `--fg`, `--bash`). Parsing is lenient: unknown flags
//! and flags without a value are skipped. `--title` is a suffix: the window
//! is titled `Youyou <suffix>`.

use serde::{Deserialize, Serialize};

use crate::local::priming::PrimingQueue;

pub const DEFAULT_BASE_TITLE: &str = "Youyou";
pub const DEFAULT_BG: &str = "#1e1e1e";
pub const DEFAULT_FG: &str = "#cccccc";

/// Colors and titles sent to a surface in the `theme` message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub bg: String,
    pub fg: String,
    pub base_title: String,
    pub user_title: String,
    pub title: String,
}

/// Options of one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub base_title: String,
    pub bg: String,
    pub fg: String,
    /// Lines typed into the shell once it is ready
    pub bash_lines: Vec<String>,
    /// Suffix appended to the base title (`--title`)
    pub user_title: String,
}

impl Default for SurfaceOptions {
    fn default() -> Self {
        Self {
            base_title: DEFAULT_BASE_TITLE.to_string(),
            bg: DEFAULT_BG.to_string(),
            fg: DEFAULT_FG.to_string(),
            bash_lines: Vec::new(),
            user_title: String::new(),
        }
    }
}

impl SurfaceOptions {
    /// Parse `--flag value` pairs on top of the defaults
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::default().merge_args(args)
    }

    /// Apply `--flag value` pairs on top of `self`. Repeated `--bash` flags
    /// accumulate; the other flags keep the last value.
    pub fn merge_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_ref();
            let value = args
                .get(i + 1)
                .map(|v| v.as_ref())
                .filter(|v| !v.is_empty());

            let target = match flag {
                "--title" => Some(&mut self.user_title),
                "--bg" => Some(&mut self.bg),
                "--fg" => Some(&mut self.fg),
                "--bash" => {
                    if let Some(value) = value {
                        self.bash_lines.extend(decode_bash_lines(value));
                        i += 2;
                    } else {
                        i += 1;
                    }
                    continue;
                }
                _ => None,
            };

            match (target, value) {
                (Some(target), Some(value)) => {
                    *target = value.to_string();
                    i += 2;
                }
                (Some(_), None) => {
                    tracing::debug!("Ignoring {} without a value", flag);
                    i += 1;
                }
                (None, _) => {
                    if flag.starts_with("--") {
                        tracing::debug!("Ignoring unknown option {}", flag);
                    }
                    i += 1;
                }
            }
        }
        self
    }

    /// Window title: base title, then the trimmed user title if any
    pub fn title(&self) -> String {
        let user = self.user_title.trim();
        if user.is_empty() {
            self.base_title.clone()
        } else {
            format!("{} {}", self.base_title, user)
        }
    }

    pub fn theme(&self) -> Theme {
        Theme {
            bg: self.bg.clone(),
            fg: self.fg.clone(),
            base_title: self.base_title.clone(),
            user_title: self.user_title.clone(),
            title: self.title(),
        }
    }

    pub fn priming(&self) -> PrimingQueue {
        PrimingQueue::new(self.bash_lines.iter().cloned())
    }
}

/// Decode `\n`, `\r` and `\t` escapes and split into non-empty lines
pub fn decode_bash_lines(value: &str) -> Vec<String> {
    let decoded = value
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t");
    decoded
        .split('\n')
        .map(|line| line.replace('\r', ""))
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SurfaceOptions::from_args(Vec::<String>::new());
        assert_eq!(opts.base_title, "Youyou");
        assert_eq!(opts.bg, "#1e1e1e");
        assert_eq!(opts.fg, "#cccccc");
        assert!(opts.bash_lines.is_empty());
        assert_eq!(opts.title(), "Youyou");
    }

    #[test]
    fn test_known_flags() {
        let opts = SurfaceOptions::from_args([
            "--title", "Build", "--bg", "#000000", "--fg", "#ffffff",
        ]);
        assert_eq!(opts.base_title, "Youyou");
        assert_eq!(opts.user_title, "Build");
        assert_eq!(opts.title(), "Youyou Build");
        assert_eq!(opts.bg, "#000000");
        assert_eq!(opts.fg, "#ffffff");
    }

    #[test]
    fn test_unknown_and_valueless_flags_ignored() {
        let opts = SurfaceOptions::from_args(["--verbose", "--title", "", "--bg"]);
        assert_eq!(opts, SurfaceOptions::default());

        let opts = SurfaceOptions::from_args(["stray", "--zoom", "2", "--fg", "#123456"]);
        assert_eq!(opts.fg, "#123456");
    }

    #[test]
    fn test_bash_escapes_and_accumulation() {
        let opts = SurfaceOptions::from_args([
            "--bash",
            "cd /tmp\\r\\nls\\n\\n",
            "--bash",
            "echo\\tdone",
        ]);
        assert_eq!(opts.bash_lines, vec!["cd /tmp", "ls", "echo\tdone"]);
        assert_eq!(opts.priming().len(), 3);
    }

    #[test]
    fn test_merge_keeps_host_defaults() {
        let host = SurfaceOptions::from_args(["--bg", "#101010", "--bash", "pwd"]);
        let window = host.clone().merge_args(["--title", "Logs", "--bash", "ls"]);
        assert_eq!(window.bg, "#101010");
        assert_eq!(window.user_title, "Logs");
        assert_eq!(window.title(), "Youyou Logs");
        assert_eq!(window.bash_lines, vec!["pwd", "ls"]);
    }

    #[test]
    fn test_title_composition() {
        let opts = SurfaceOptions::from_args(["--title", "   "]);
        assert_eq!(opts.title(), "Youyou");

        let opts = SurfaceOptions::from_args(["--title", "  Dev box "]);
        assert_eq!(opts.title(), "Youyou Dev box");

        let theme = opts.theme();
        assert_eq!(theme.base_title, "Youyou");
        assert_eq!(theme.user_title, "  Dev box ");
        assert_eq!(theme.title, "Youyou Dev box");
    }
}

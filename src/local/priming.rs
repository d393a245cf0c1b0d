//! Priming input
//!
//! Lines typed into a fresh shell on the user's behalf once it looks ready.
//! "Ready" means the shell produced its first output chunk; the lines are
//! then written after a short settle delay, each terminated like an Enter
//! key-press.

use std::time::Duration;

/// Pause between the first output chunk and the first priming write
pub const PRIMING_SETTLE_DELAY: Duration = Duration::from_millis(160);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PrimingState {
    Waiting,
    Released,
}

/// Pending Input Queue, consumed exactly once
#[derive(Clone, Debug)]
pub struct PrimingQueue {
    lines: Vec<String>,
    state: PrimingState,
}

impl PrimingQueue {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines
                .into_iter()
                .map(Into::into)
                .filter(|l: &String| !l.is_empty())
                .collect(),
            state: PrimingState::Waiting,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Record an output chunk. The first call on a non-empty queue hands out
    /// the writes to perform (one per line, `\r`-terminated, in order);
    /// every other call returns `None`.
    pub fn on_output(&mut self) -> Option<Vec<Vec<u8>>> {
        if self.state == PrimingState::Released || self.lines.is_empty() {
            return None;
        }
        self.state = PrimingState::Released;
        Some(
            std::mem::take(&mut self.lines)
                .into_iter()
                .map(|line| {
                    let mut bytes = line.into_bytes();
                    bytes.push(b'\r');
                    bytes
                })
                .collect(),
        )
    }
}

impl Default for PrimingQueue {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_released_on_first_output_only() {
        let mut queue = PrimingQueue::new(["ls", "pwd"]);
        assert_eq!(queue.len(), 2);

        let writes = queue.on_output().expect("first chunk releases the queue");
        assert_eq!(writes, vec![b"ls\r".to_vec(), b"pwd\r".to_vec()]);

        assert!(queue.on_output().is_none());
        assert!(queue.on_output().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue_never_releases() {
        let mut queue = PrimingQueue::empty();
        assert!(queue.on_output().is_none());
    }

    #[test]
    fn test_blank_lines_dropped() {
        let mut queue = PrimingQueue::new(vec!["echo A".to_string(), String::new(), "echo B".to_string()]);
        let writes = queue.on_output().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], b"echo B\r".to_vec());
    }
}

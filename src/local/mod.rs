//! Local terminal support module
//!
//! Spawns the user's shell on a pseudo-terminal and keeps track of which
//! display surface owns which session.

pub mod env;
pub mod priming;
pub mod pty;
pub mod registry;
pub mod session;
pub mod shell;

pub use env::{build_environment, Environment, HostEnvironment};
pub use priming::{PrimingQueue, PRIMING_SETTLE_DELAY};
pub use pty::{LaunchSpec, PtyError, PtyHandle};
pub use registry::{RegistryError, SessionHandle, SurfaceId, SurfaceRegistry};
pub use session::{PtySession, SessionEvent, SessionEvents, SessionInfo, SessionState};
pub use shell::{resolve_shell, shell_candidates, spawn_chain, Platform, ShellInfo};

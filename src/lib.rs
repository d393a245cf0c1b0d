//! Youyou - a terminal host for one local login shell per window
//!
//! Spawns the user's shell on a pseudo-terminal and relays it to display
//! surfaces over a local WebSocket.

// Use mimalloc as the global allocator for better performance
// with high-frequency small allocations (WebSocket frames, PTY chunks)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod bridge;
pub mod config;
pub mod local;
pub mod state;

use bridge::WsBridge;
use config::{ConfigStorage, SurfaceOptions};
use state::AppContext;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Write startup log to file (useful for debugging launcher issues)
fn write_startup_log(message: &str) {
    if let Ok(log_dir) = config::storage::log_dir() {
        // Ensure log directory exists
        let _ = std::fs::create_dir_all(&log_dir);

        let log_file = log_dir.join("startup.log");
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_file) {
            let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
            let _ = writeln!(file, "[{}] {}", timestamp, message);
        }
    }
}

/// Initialize logging
fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn startup_failure(msg: &str) -> i32 {
    tracing::error!("{}", msg);
    write_startup_log(msg);
    1
}

/// Run the host until the last surface closes. Returns the process exit code.
pub fn run() -> i32 {
    write_startup_log("Youyou starting...");

    init_logging();
    tracing::info!("Starting Youyou...");
    write_startup_log("Logging initialized");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return startup_failure(&format!("Failed to start async runtime: {}", e)),
    };

    let defaults = SurfaceOptions::from_args(std::env::args().skip(1));
    runtime.block_on(serve(defaults))
}

async fn serve(defaults: SurfaceOptions) -> i32 {
    let storage = match ConfigStorage::new() {
        Ok(storage) => storage,
        Err(e) => return startup_failure(&format!("Failed to get config directory: {}", e)),
    };
    write_startup_log(&format!("Config path: {:?}", storage.path()));

    let config = match storage.load().await {
        Ok(config) => config,
        Err(e) => {
            return startup_failure(&format!(
                "Failed to load config at {:?}: {}",
                storage.path(),
                e
            ))
        }
    };

    let ctx = Arc::new(AppContext::new(config, defaults));
    let bridge = match WsBridge::bind(ctx.clone()).await {
        Ok(bridge) => bridge,
        Err(e) => return startup_failure(&e.to_string()),
    };
    let url = match bridge.url() {
        Ok(url) => url,
        Err(e) => return startup_failure(&format!("Failed to get local address: {}", e)),
    };

    // The launcher reads this single line to find and authenticate to us
    let announce = serde_json::json!({ "url": url, "token": ctx.token() });
    println!("{}", announce);
    let _ = std::io::stdout().flush();
    write_startup_log(&format!("Listening on {}", url));

    bridge.serve().await;
    ctx.teardown().await;

    tracing::info!("Youyou stopped");
    0
}

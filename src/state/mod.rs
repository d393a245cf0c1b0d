//! Application context
//!
//! Owns everything that outlives a single surface: the session registry,
//! host configuration, surface bookkeeping and the shutdown signal.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

use crate::bridge::token::generate_token;
use crate::config::{HostConfig, SurfaceOptions};
use crate::local::{HostEnvironment, LaunchSpec, RegistryError, SurfaceId, SurfaceRegistry};

pub struct AppContext {
    registry: SurfaceRegistry,
    config: HostConfig,
    /// Options parsed from the host command line, used by `open` without argv
    defaults: SurfaceOptions,
    host: HostEnvironment,
    token: String,
    next_surface: AtomicU64,
    open_surfaces: AtomicUsize,
    shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: HostConfig, defaults: SurfaceOptions) -> Self {
        let host = HostEnvironment::capture(config.is_packaged());
        Self::with_host(config, defaults, host)
    }

    /// Context with an explicit host environment snapshot
    pub fn with_host(config: HostConfig, defaults: SurfaceOptions, host: HostEnvironment) -> Self {
        Self {
            registry: SurfaceRegistry::new(),
            config,
            defaults,
            host,
            token: generate_token(),
            next_surface: AtomicU64::new(1),
            open_surfaces: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn default_options(&self) -> &SurfaceOptions {
        &self.defaults
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Cancelled when the host should stop serving
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn open_surface_count(&self) -> usize {
        self.open_surfaces.load(Ordering::SeqCst)
    }

    /// Register a newly connected surface
    pub fn open_surface(&self) -> SurfaceId {
        let surface = SurfaceId(self.next_surface.fetch_add(1, Ordering::SeqCst));
        let open = self.open_surfaces.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Surface {} opened ({} open)", surface, open);
        surface
    }

    /// Tear down a surface: kill its session and, when it was the last one,
    /// request host shutdown if configured to.
    pub async fn close_surface(&self, surface: SurfaceId) {
        match self.registry.destroy(surface).await {
            Ok(()) | Err(RegistryError::NotFound(_)) => {}
            Err(e) => tracing::warn!("Failed to destroy session of {}: {}", surface, e),
        }

        let remaining = self
            .open_surfaces
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);
        tracing::info!("Surface {} closed ({} open)", surface, remaining);

        if remaining == 0 && self.config.exit_on_last_close {
            tracing::info!("Last surface closed, shutting down");
            self.shutdown.cancel();
        }
    }

    /// Launch spec for a new session, sized by the surface or the configured
    /// defaults
    pub fn launch_spec(&self, cols: Option<u16>, rows: Option<u16>) -> LaunchSpec {
        LaunchSpec::resolve(
            &self.host,
            cols.filter(|c| *c > 0).unwrap_or(self.config.default_cols),
            rows.filter(|r| *r > 0).unwrap_or(self.config.default_rows),
        )
    }

    /// Stop serving and kill every remaining session
    pub async fn teardown(&self) {
        self.shutdown.cancel();
        self.registry.destroy_all().await;
        tracing::info!("Host context torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(exit_on_last_close: bool) -> AppContext {
        let config = HostConfig {
            exit_on_last_close,
            packaged: Some(false),
            ..HostConfig::default()
        };
        AppContext::new(config, SurfaceOptions::default())
    }

    #[tokio::test]
    async fn test_surface_ids_are_unique() {
        let ctx = context(true);
        let a = ctx.open_surface();
        let b = ctx.open_surface();
        assert_ne!(a, b);
        assert_eq!(ctx.open_surface_count(), 2);
    }

    #[tokio::test]
    async fn test_last_close_requests_shutdown() {
        let ctx = context(true);
        let a = ctx.open_surface();
        let b = ctx.open_surface();

        ctx.close_surface(a).await;
        assert!(!ctx.shutdown_token().is_cancelled());
        ctx.close_surface(b).await;
        assert!(ctx.shutdown_token().is_cancelled());
        assert_eq!(ctx.open_surface_count(), 0);
    }

    #[tokio::test]
    async fn test_last_close_keeps_running_when_disabled() {
        let ctx = context(false);
        let a = ctx.open_surface();
        ctx.close_surface(a).await;
        assert!(!ctx.shutdown_token().is_cancelled());
    }

    #[test]
    fn test_launch_spec_sizes() {
        let ctx = context(true);
        let spec = ctx.launch_spec(None, Some(0));
        assert_eq!((spec.initial_cols, spec.initial_rows), (80, 24));
        let spec = ctx.launch_spec(Some(120), Some(40));
        assert_eq!((spec.initial_cols, spec.initial_rows), (120, 40));
    }
}

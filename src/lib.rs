pub mod config;
pub mod inference;
pub mod normalize;
pub mod server;

/// Process-level helpers
pub mod util {
    use tracing_subscriber::EnvFilter;

    /// Install the global tracing subscriber. `RUST_LOG` takes precedence over
    /// `default_filter`. Records from the `log` crate (actix-web's access log)
    /// are forwarded too.
    pub fn init_tracing(default_filter: &str) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

//! artclust HTTP server.
//!
//! Reads the YAML config named by `ARTCLUST_CONFIG`, or runs on defaults.

use mimalloc::MiMalloc;

use artclust::AppConfig;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var_os("ARTCLUST_CONFIG") {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };
    artclust::server::start_server(config).await
}

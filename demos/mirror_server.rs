//! Mirror server example
//!
//! Runs catalog-mirror with the REST API enabled, allowing control via HTTP
//! endpoints. Pass a JSON config file as the first argument to override the
//! defaults.
//!
//! After starting, you can:
//! - View Swagger UI at http://localhost:8000/swagger-ui
//! - Check for changes via GET http://localhost:8000/watch
//! - Start polling via POST http://localhost:8000/monitor/start
//! - Stream events via GET http://localhost:8000/events

use catalog_mirror::api::start_api_server;
use catalog_mirror::{CatalogMirror, Config, run_with_shutdown};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing (optional)
    // Uncomment if you add tracing-subscriber to your dependencies:
    // tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    let address = config.server.api.bind_address;

    let mirror = Arc::new(CatalogMirror::new(config.clone()).await?);
    let config_arc = Arc::new(config);

    println!("🚀 Starting catalog-mirror server");
    println!("📖 Swagger UI: http://{address}/swagger-ui");
    println!("🔄 Events stream: http://{address}/events");
    println!();
    println!("Example commands:");
    println!("  # Has the remote index changed?");
    println!("  curl http://{address}/watch");
    println!();
    println!("  # Crawl everything using the canned offline responses");
    println!("  curl -X POST 'http://{address}/crawl/run?offline=true'");
    println!();
    println!("  # Poll every 10 minutes");
    println!("  curl -X POST http://{address}/monitor/start \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"interval_seconds\": 600}}'");
    println!();
    println!("  # Check the local store");
    println!("  curl 'http://{address}/verify?detail=true'");

    tokio::select! {
        result = start_api_server(mirror.clone(), config_arc) => result?,
        result = run_with_shutdown((*mirror).clone()) => result?,
    }

    Ok(())
}

//! Instance with OpenTelemetry traces and metrics
//!
//! Start a collector on localhost:4317, then run with:
//! cargo run --example observability_instance

use brayns::core::ObservabilityConfig;
use brayns::Instance;
use brayns::client::ExponentialBackoff;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let otel_config = ObservabilityConfig::new("brayns-observability-demo")
        .with_endpoint("http://localhost:4317")
        .with_log_level("brayns_client=debug,info");

    let instance = Instance::builder("localhost:5000")
        .with_observability(otel_config)
        .with_retry(Box::new(
            ExponentialBackoff::new(Duration::from_millis(200), Duration::from_secs(2))
                .with_max_attempts(5),
        ))
        .connect()
        .await?;

    for i in 1..=5 {
        tracing::info!(iteration = i, "Querying engine");
        let version = instance.get_version().await?;
        println!("Iteration {}: Brayns {}", i, version);

        let scene: serde_json::Value = instance.request("get-scene", ()).await?;
        println!("Scene bounds: {}", scene["bounds"]);
    }

    instance.disconnect().await?;

    // Let the batch exporters flush
    tokio::time::sleep(Duration::from_secs(2)).await;
    brayns::core::shutdown_observability();
    Ok(())
}

//! Render a snapshot and follow its progress
//!
//! Run against a local engine with: cargo run --example snapshot

use brayns::{Error, Instance};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct SnapshotParams {
    path: String,
    resolution: [u32; 2],
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let instance = Instance::builder("localhost:5000")
        .with_request_timeout(Duration::from_secs(10))
        .connect()
        .await?;

    let version = instance.get_version().await?;
    println!("Connected to Brayns {}", version);

    let params = SnapshotParams {
        path: "/tmp/snapshot.png".to_string(),
        resolution: [1920, 1080],
    };
    let started = Instant::now();
    let mut task = instance.task("snapshot", params).await?;

    while let Some(progress) = task.next_progress().await {
        println!("{:>5.1}% {}", progress.amount * 100.0, progress.operation);
        if started.elapsed() > Duration::from_secs(60) {
            task.cancel().await;
        }
    }

    match task.wait().await {
        Ok(reply) => println!("Snapshot done: {}", reply.result),
        Err(Error::Cancelled) => println!("Snapshot cancelled"),
        Err(e) => println!("Snapshot failed: {}", e),
    }

    instance.disconnect().await?;
    Ok(())
}

//! Brayns SDK: drive a Brayns rendering engine from Rust
//!
//! This is the convenience crate that re-exports the Brayns sub-crates.
//! Use it if you want a single dependency.
//!
//! # Architecture
//!
//! - **brayns-core**: wire types, frame codec, errors, observability
//! - **brayns-client**: transport, request registry, instance
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use brayns::Instance;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let instance = Instance::connect("localhost:5000").await?;
//!
//!     let version = instance.get_version().await?;
//!     println!("Connected to Brayns {}", version);
//!
//!     let scene: serde_json::Value = instance.request("get-scene", ()).await?;
//!     println!("Scene: {}", scene);
//!
//!     Ok(())
//! }
//! ```

pub use brayns_client as client;
pub use brayns_core as core;

pub use brayns_client::{Instance, RequestFuture, Version};
pub use brayns_core::{Error, Id, JsonRpcProgress, Result};

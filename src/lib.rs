//! Client for the FastDFS distributed file store.
//!
//! FastDFS organizes servers into two roles: **trackers**, which answer
//! routing queries, and **storages**, which hold file content. Every
//! operation here is two-step: ask a tracker where the file lives (or where
//! uploads go), then dispatch the file command to that storage. Both hops
//! run over pooled TCP connections with per-call deadlines.
//!
//! A [`Cluster`] talks to one FastDFS deployment; a [`Client`] routes
//! between several independent clusters by name.
//!
//! ```no_run
//! use fdfs_client::{Client, Cluster, StorageConfig, TrackerConfig};
//!
//! # async fn demo() -> Result<(), fdfs_client::FdfsError> {
//! let cluster = Cluster::init(
//!     "pictures",
//!     &[
//!         "10.0.0.1:22122".to_string(),
//!         "10.0.0.2:22122".to_string(),
//!     ],
//!     TrackerConfig::default(),
//!     StorageConfig::default(),
//! )
//! .await?;
//!
//! let client = Client::new();
//! client.add_cluster(cluster);
//!
//! let fid = client.upload("pictures", b"...", "g1", "jpg").await?;
//! let bytes = client.download("pictures", &fid).await?;
//! client.delete("pictures", &fid).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod pool;
pub mod protocol;
mod request;
pub mod storage;
pub mod tracker;

pub use client::Client;
pub use cluster::{Cluster, StorageGroup};
pub use config::{CacheMethod, PoolConfig, StorageConfig, TrackerConfig};
pub use error::{ErrorKind, FdfsError};
pub use pool::{Pool, PooledConnection};
pub use protocol::FileId;
pub use storage::Storage;
pub use tracker::{Tracker, TrackerStoreInfo};

/// Convenience result type for fallible client operations.
pub type Result<T> = std::result::Result<T, FdfsError>;

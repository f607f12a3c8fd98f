//! Registry of independent FastDFS clusters addressed by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::cluster::Cluster;
use crate::config::{StorageConfig, TrackerConfig};
use crate::error::FdfsError;

/// Client managing multiple independent FastDFS clusters.
///
/// Every operation takes a leading cluster name and forwards to the matching
/// [`Cluster`]; an unregistered name fails with
/// [`crate::ErrorKind::UnknownCluster`]. For a single-cluster deployment the
/// [`Cluster`] API is the more direct choice.
#[derive(Default)]
pub struct Client {
    clusters: RwLock<HashMap<String, Arc<Cluster>>>,
}

impl Client {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `cluster` under its name, replacing any previous cluster
    /// with the same name.
    pub fn add_cluster(&self, cluster: Cluster) {
        self.clusters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(cluster.name().to_string(), Arc::new(cluster));
    }

    /// Returns the cluster registered as `name`.
    pub fn cluster(&self, name: &str) -> Option<Arc<Cluster>> {
        self.clusters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Uploads `content` into `group` of the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any [`Cluster::upload`]
    /// error.
    pub async fn upload(
        &self,
        cluster: &str,
        content: &[u8],
        group: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        self.cluster_or_err(cluster)?
            .upload(content, group, ext)
            .await
    }

    /// Uploads `content` as an appender file into `group` of the named
    /// cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any
    /// [`Cluster::upload_appender`] error.
    pub async fn upload_appender(
        &self,
        cluster: &str,
        content: &[u8],
        group: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        self.cluster_or_err(cluster)?
            .upload_appender(content, group, ext)
            .await
    }

    /// Uploads `content` as a slave of `master` in the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any
    /// [`Cluster::upload_slave`] error.
    pub async fn upload_slave(
        &self,
        cluster: &str,
        content: &[u8],
        master: &str,
        suffix: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        self.cluster_or_err(cluster)?
            .upload_slave(content, master, suffix, ext)
            .await
    }

    /// Appends `content` to the appender file `fid` in the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any [`Cluster::append`]
    /// error.
    pub async fn append(&self, cluster: &str, content: &[u8], fid: &str) -> Result<(), FdfsError> {
        self.cluster_or_err(cluster)?.append(content, fid).await
    }

    /// Downloads the whole file `fid` from the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any [`Cluster::download`]
    /// error.
    pub async fn download(&self, cluster: &str, fid: &str) -> Result<Vec<u8>, FdfsError> {
        self.cluster_or_err(cluster)?.download(fid).await
    }

    /// Downloads `length` bytes of `fid` from `offset` in the named cluster.
    /// A zero `length` reads to end of file.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any
    /// [`Cluster::download_range`] error.
    pub async fn download_range(
        &self,
        cluster: &str,
        fid: &str,
        offset: i64,
        length: i64,
    ) -> Result<Vec<u8>, FdfsError> {
        self.cluster_or_err(cluster)?
            .download_range(fid, offset, length)
            .await
    }

    /// Deletes the file `fid` from the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`], or any [`Cluster::delete`]
    /// error.
    pub async fn delete(&self, cluster: &str, fid: &str) -> Result<(), FdfsError> {
        self.cluster_or_err(cluster)?.delete(fid).await
    }

    /// Applies `config` to every tracker peer of the named cluster.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`].
    pub fn update_tracker(&self, cluster: &str, config: TrackerConfig) -> Result<(), FdfsError> {
        self.cluster_or_err(cluster)?.update_tracker(config);
        Ok(())
    }

    /// Applies `config` to every storage of `group` in the named cluster,
    /// creating the group if absent.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::UnknownCluster`].
    pub fn update_storage_group(
        &self,
        cluster: &str,
        group: &str,
        config: StorageConfig,
    ) -> Result<(), FdfsError> {
        self.cluster_or_err(cluster)?
            .update_storage_group(group, config);
        Ok(())
    }

    fn cluster_or_err(&self, name: &str) -> Result<Arc<Cluster>, FdfsError> {
        self.cluster(name)
            .ok_or_else(|| FdfsError::unknown_cluster(name))
    }
}

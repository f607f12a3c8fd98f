//! A single FastDFS cluster: tracker peers plus storage groups.
//!
//! Every file operation is two-step: ask a randomly chosen tracker peer
//! where the file lives (or where uploads go), then dispatch the storage
//! command to that endpoint. Storage clients are created lazily the first
//! time a tracker names their address and live for the life of the cluster.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::Rng;

use crate::config::{StorageConfig, TrackerConfig};
use crate::error::{ErrorKind, FdfsError};
use crate::protocol::FileId;
use crate::storage::Storage;
use crate::tracker::{Tracker, TrackerStoreInfo};

/// Storages belonging to one FastDFS group, keyed by endpoint address.
pub struct StorageGroup {
    group_name: String,
    /// Base config inherited by storages created lazily in this group.
    base: RwLock<StorageConfig>,
    storages: RwLock<HashMap<String, Arc<Storage>>>,
}

impl StorageGroup {
    /// Creates an empty group with its shared base storage config.
    pub fn new(group_name: impl Into<String>, base: StorageConfig) -> Self {
        Self {
            group_name: group_name.into(),
            base: RwLock::new(base),
            storages: RwLock::new(HashMap::new()),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.group_name
    }

    /// Snapshot of the group's base storage config.
    pub fn base_config(&self) -> StorageConfig {
        *self.base.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up the storage client for `address`.
    pub fn storage(&self, address: &str) -> Option<Arc<Storage>> {
        self.read_storages().get(address).cloned()
    }

    /// Installs `storage` under its address, replacing any previous client.
    pub fn add(&self, storage: Arc<Storage>) {
        self.write_storages()
            .insert(storage.address().to_string(), storage);
    }

    /// Applies `config` to every storage in the group and adopts it as the
    /// new base for storages created later.
    pub fn update(&self, config: StorageConfig) {
        let storages: Vec<Arc<Storage>> = self.read_storages().values().cloned().collect();
        for storage in &storages {
            storage.update(config);
        }
        *self.base.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Returns the client for `candidate`'s address, installing `candidate`
    /// if the slot is vacant. On a lost race the candidate comes back so the
    /// caller can close its pool.
    fn adopt(&self, candidate: Arc<Storage>) -> (Arc<Storage>, Option<Arc<Storage>>) {
        let mut storages = self.write_storages();
        match storages.entry(candidate.address().to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), Some(candidate)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&candidate));
                (candidate, None)
            }
        }
    }

    fn read_storages(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Storage>>> {
        self.storages.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_storages(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Storage>>> {
        self.storages.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Client for one FastDFS cluster.
pub struct Cluster {
    name: String,
    tracker_base: TrackerConfig,
    storage_base: StorageConfig,
    trackers: RwLock<Vec<Arc<Tracker>>>,
    groups: RwLock<HashMap<String, Arc<StorageGroup>>>,
}

impl Cluster {
    /// Initializes a cluster: dials every tracker peer and records the base
    /// configs that later tracker and storage clients inherit. The first
    /// failed dial aborts initialization.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::CreatePool`] from the failed tracker dial, wrapped with
    /// the cluster name.
    pub async fn init(
        name: impl Into<String>,
        tracker_addrs: &[String],
        tracker_config: TrackerConfig,
        storage_config: StorageConfig,
    ) -> Result<Self, FdfsError> {
        let name = name.into();
        let mut peers = Vec::with_capacity(tracker_addrs.len());
        for addr in tracker_addrs {
            let tracker = Tracker::new(addr.clone(), tracker_config)
                .await
                .map_err(|e| e.wrap(&name))?;
            peers.push(Arc::new(tracker));
        }
        tracing::debug!(cluster = %name, peers = peers.len(), "cluster initialized");

        Ok(Self {
            name,
            tracker_base: tracker_config,
            storage_base: storage_config,
            trackers: RwLock::new(peers),
            groups: RwLock::new(HashMap::new()),
        })
    }

    /// Cluster name, the key it is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base config recorded for tracker peers.
    pub fn tracker_base_config(&self) -> TrackerConfig {
        self.tracker_base
    }

    /// Base config inherited by lazily created storages.
    pub fn storage_base_config(&self) -> StorageConfig {
        self.storage_base
    }

    /// Appends a tracker to the cluster's peer list.
    pub fn add_tracker(&self, tracker: Tracker) {
        self.trackers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(tracker));
    }

    /// Registers a storage group, replacing any group with the same name.
    pub fn add_storage_group(&self, group: StorageGroup) {
        self.groups
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(group.name().to_string(), Arc::new(group));
    }

    /// Looks up a storage group by name.
    pub fn storage_group(&self, group: &str) -> Option<Arc<StorageGroup>> {
        self.groups
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(group)
            .cloned()
    }

    /// Uploads `content` into `group` with the given extension, returning
    /// the assigned file id. The file cannot be appended to later; use
    /// [`Cluster::upload_appender`] for that.
    ///
    /// # Errors
    ///
    /// Tracker, pool, or storage errors, wrapped with the cluster name.
    pub async fn upload(&self, content: &[u8], group: &str, ext: &str) -> Result<String, FdfsError> {
        self.upload_inner(content, group, ext, false).await
    }

    /// Uploads `content` as an appender file, which accepts later
    /// [`Cluster::append`] calls.
    ///
    /// # Errors
    ///
    /// Tracker, pool, or storage errors, wrapped with the cluster name.
    pub async fn upload_appender(
        &self,
        content: &[u8],
        group: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        self.upload_inner(content, group, ext, true).await
    }

    async fn upload_inner(
        &self,
        content: &[u8],
        group: &str,
        ext: &str,
        allow_append: bool,
    ) -> Result<String, FdfsError> {
        let info = self
            .tracker()?
            .query_store(group)
            .await
            .map_err(|e| self.wrap(e))?;
        let storage = self.storage_for(&info).await?;
        storage
            .upload(content, info.path_index, ext, allow_append)
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Uploads `content` as a slave of `master`. The returned id is
    /// conventionally `{master}{suffix}.{ext}`, but the server is
    /// authoritative.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::WrongFid`] for a malformed master id, or tracker, pool,
    /// and storage errors, all wrapped with the cluster name.
    pub async fn upload_slave(
        &self,
        content: &[u8],
        master: &str,
        suffix: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        let id = self.split(master)?;
        let info = self
            .tracker()?
            .query_update(id.group(), id.remote_name())
            .await
            .map_err(|e| self.wrap(e))?;
        let storage = self.storage_for(&info).await?;
        storage
            .upload_slave(content, id.remote_name(), suffix, ext)
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Appends `content` to the appender file `fid`.
    ///
    /// Routed through a query-update reply so the bytes reach the node that
    /// currently owns the file.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::WrongFid`] for a malformed id, or tracker, pool, and
    /// storage errors, all wrapped with the cluster name.
    pub async fn append(&self, content: &[u8], fid: &str) -> Result<(), FdfsError> {
        let id = self.split(fid)?;
        let info = self
            .tracker()?
            .query_update(id.group(), id.remote_name())
            .await
            .map_err(|e| self.wrap(e))?;
        let storage = self.storage_for(&info).await?;
        storage
            .append(content, id.remote_name())
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Deletes the file `fid`.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::WrongFid`] for a malformed id, or tracker, pool, and
    /// storage errors, all wrapped with the cluster name; a missing file
    /// surfaces as [`ErrorKind::FileNotExist`].
    pub async fn delete(&self, fid: &str) -> Result<(), FdfsError> {
        let id = self.split(fid)?;
        let info = self
            .tracker()?
            .query_update(id.group(), id.remote_name())
            .await
            .map_err(|e| self.wrap(e))?;
        let storage = self.storage_for(&info).await?;
        storage
            .delete(id.remote_name())
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Downloads the whole file `fid`.
    ///
    /// # Errors
    ///
    /// Same as [`Cluster::download_range`].
    pub async fn download(&self, fid: &str) -> Result<Vec<u8>, FdfsError> {
        self.download_range(fid, 0, 0).await
    }

    /// Downloads `length` bytes of `fid` starting at `offset`. A zero
    /// `length` reads to end of file.
    ///
    /// # Errors
    ///
    /// [`ErrorKind::WrongFid`] for a malformed id, or tracker, pool, and
    /// storage errors, all wrapped with the cluster name; an oversize reply
    /// surfaces as [`ErrorKind::WrongPkgLength`].
    pub async fn download_range(
        &self,
        fid: &str,
        offset: i64,
        length: i64,
    ) -> Result<Vec<u8>, FdfsError> {
        let id = self.split(fid)?;
        let info = self
            .tracker()?
            .query_fetch(id.group(), id.remote_name())
            .await
            .map_err(|e| self.wrap(e))?;
        let storage = self.storage_for(&info).await?;
        storage
            .download(id.remote_name(), offset, length)
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Applies `config` to every tracker peer.
    pub fn update_tracker(&self, config: TrackerConfig) {
        let peers = self.trackers.read().unwrap_or_else(|e| e.into_inner());
        for tracker in peers.iter() {
            tracker.update(config);
        }
    }

    /// Applies `config` to every storage in `group`, creating the group
    /// with that config if it does not exist yet.
    pub fn update_storage_group(&self, group: &str, config: StorageConfig) {
        if let Some(existing) = self.storage_group(group) {
            existing.update(config);
        } else {
            self.add_storage_group(StorageGroup::new(group, config));
        }
    }

    /// Picks one tracker peer uniformly at random.
    fn tracker(&self) -> Result<Arc<Tracker>, FdfsError> {
        let peers = self.trackers.read().unwrap_or_else(|e| e.into_inner());
        if peers.is_empty() {
            return Err(FdfsError::new(
                ErrorKind::NoTrackerPeers,
                format!("cluster {} has no tracker peers", self.name),
            )
            .wrap(&self.name));
        }
        let index = rand::thread_rng().gen_range(0..peers.len());
        Ok(Arc::clone(&peers[index]))
    }

    /// Returns the storage client for the endpoint a tracker answered with,
    /// creating it lazily under the group's base config.
    ///
    /// Concurrent first uses of one address may dial more than once; the
    /// install is atomic per `(group, address)` and the loser closes its
    /// fresh pool.
    async fn storage_for(&self, info: &TrackerStoreInfo) -> Result<Arc<Storage>, FdfsError> {
        let group = self.group_or_insert(&info.group);
        if let Some(storage) = group.storage(&info.address) {
            return Ok(storage);
        }

        // Dial outside the group lock.
        let candidate = Arc::new(
            Storage::new(info.address.clone(), info.group.clone(), group.base_config())
                .await
                .map_err(|e| self.wrap(e))?,
        );
        let (storage, loser) = group.adopt(candidate);
        if let Some(loser) = loser {
            // A concurrent first use installed a client before ours.
            loser.close();
            tracing::debug!(
                cluster = %self.name,
                group = %info.group,
                address = %info.address,
                "storage client lost install race"
            );
        } else {
            tracing::debug!(
                cluster = %self.name,
                group = %info.group,
                address = %info.address,
                "storage client created"
            );
        }
        Ok(storage)
    }

    fn group_or_insert(&self, name: &str) -> Arc<StorageGroup> {
        if let Some(group) = self.storage_group(name) {
            return group;
        }
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            groups
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(StorageGroup::new(name, self.storage_base))),
        )
    }

    fn split(&self, fid: &str) -> Result<FileId, FdfsError> {
        FileId::parse(fid).map_err(|e| self.wrap(e))
    }

    fn wrap(&self, e: FdfsError) -> FdfsError {
        e.wrap(&self.name)
    }
}

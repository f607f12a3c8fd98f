//! Client for a FastDFS storage node.
//!
//! Storages hold file content. A storage client executes the file-level
//! commands against one endpoint inside one group: upload (plain, appender,
//! slave), append, delete, and ranged download. Every operation takes one
//! pooled connection for exactly one round trip.

use std::sync::RwLock;

use bytes::{BufMut, BytesMut};

use crate::config::StorageConfig;
use crate::error::FdfsError;
use crate::pool::{Pool, PooledConnection};
use crate::protocol::{
    self, FILE_EXT_NAME_LEN, FILE_PREFIX_LEN, FileId, GROUP_NAME_LEN, HEADER_LEN, Header,
    STORAGE_CMD_APPEND_FILE, STORAGE_CMD_DELETE_FILE, STORAGE_CMD_DOWNLOAD_FILE,
    STORAGE_CMD_UPLOAD_APPENDER_FILE, STORAGE_CMD_UPLOAD_FILE, STORAGE_CMD_UPLOAD_SLAVE_FILE,
};
use crate::request;

/// Sanity ceiling on replies that should only carry a file id, or nothing.
const FID_RESP_LIMIT: u64 = 130;

/// Client bound to one storage endpoint within a group.
pub struct Storage {
    address: String,
    group: String,
    download_size_limit: RwLock<u64>,
    pool: Pool,
}

impl Storage {
    /// Connects a storage client, eagerly opening its connection pool.
    /// Unset config fields fall back to [`StorageConfig::defaults`].
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::CreatePool`] if the eager dial fails.
    pub async fn new(
        address: impl Into<String>,
        group: impl Into<String>,
        config: StorageConfig,
    ) -> Result<Self, FdfsError> {
        let address = address.into();
        let group = group.into();
        let config = StorageConfig::defaults().merge(config);
        let pool = Pool::new(address.clone(), config.pool)
            .await
            .map_err(|e| e.wrap(&scope(&group, &address)))?;
        Ok(Self {
            download_size_limit: RwLock::new(config.download_size_limit),
            address,
            group,
            pool,
        })
    }

    /// Uploads `content` with the given extension, returning the assigned
    /// file id. `allow_append` selects the appender variant, which permits
    /// later [`Storage::append`] calls.
    ///
    /// # Errors
    ///
    /// Pool, transport, server-status, or reply-shape errors, wrapped with
    /// this storage's scope.
    pub async fn upload(
        &self,
        content: &[u8],
        path_index: u8,
        ext: &str,
        allow_append: bool,
    ) -> Result<String, FdfsError> {
        let packet = upload_packet(path_index, ext, content.len(), allow_append);
        let mut conn = self.acquire().await?;
        let reply = request::roundtrip(&mut conn, &packet, Some(content), FID_RESP_LIMIT)
            .await
            .map_err(|e| self.wrap(e))?;
        parse_fid(&reply).map_err(|e| self.wrap(e))
    }

    /// Uploads `content` as a slave of `master`. The server derives the
    /// slave's name from the master name, `suffix`, and `ext`.
    ///
    /// # Errors
    ///
    /// Pool, transport, server-status, or reply-shape errors, wrapped with
    /// this storage's scope.
    pub async fn upload_slave(
        &self,
        content: &[u8],
        master: &str,
        suffix: &str,
        ext: &str,
    ) -> Result<String, FdfsError> {
        let packet = upload_slave_packet(master, suffix, ext, content.len());
        let mut conn = self.acquire().await?;
        let reply = request::roundtrip(&mut conn, &packet, Some(content), FID_RESP_LIMIT)
            .await
            .map_err(|e| self.wrap(e))?;
        parse_fid(&reply).map_err(|e| self.wrap(e))
    }

    /// Appends `content` to the appender file `filename`.
    ///
    /// # Errors
    ///
    /// Pool, transport, or server-status errors, wrapped with this storage's
    /// scope.
    pub async fn append(&self, content: &[u8], filename: &str) -> Result<(), FdfsError> {
        let packet = append_packet(filename, content.len());
        let mut conn = self.acquire().await?;
        request::roundtrip(&mut conn, &packet, Some(content), FID_RESP_LIMIT)
            .await
            .map_err(|e| self.wrap(e))?;
        Ok(())
    }

    /// Deletes `filename` from this storage's group.
    ///
    /// # Errors
    ///
    /// Pool, transport, or server-status errors, wrapped with this storage's
    /// scope; a missing file surfaces as [`crate::ErrorKind::FileNotExist`].
    pub async fn delete(&self, filename: &str) -> Result<(), FdfsError> {
        let packet = delete_packet(&self.group, filename);
        let mut conn = self.acquire().await?;
        request::roundtrip(&mut conn, &packet, None, 0)
            .await
            .map_err(|e| self.wrap(e))?;
        Ok(())
    }

    /// Downloads `length` bytes of `filename` starting at `offset`. A zero
    /// `length` reads to end of file; zero for both means the whole file.
    ///
    /// A reply announcing more than the configured download size limit fails
    /// fast without the body being read.
    ///
    /// # Errors
    ///
    /// Pool, transport, server-status, or oversize errors, wrapped with this
    /// storage's scope.
    pub async fn download(
        &self,
        filename: &str,
        offset: i64,
        length: i64,
    ) -> Result<Vec<u8>, FdfsError> {
        let limit = self.download_size_limit();
        let packet = download_packet(&self.group, filename, offset, length);
        let mut conn = self.acquire().await?;
        request::roundtrip(&mut conn, &packet, None, limit)
            .await
            .map_err(|e| self.wrap(e))
    }

    /// Applies a new configuration. A zero download size limit keeps the
    /// current one; pool changes follow pool reconfiguration rules.
    pub fn update(&self, config: StorageConfig) {
        if config.download_size_limit > 0 {
            *self
                .download_size_limit
                .write()
                .unwrap_or_else(|e| e.into_inner()) = config.download_size_limit;
        }
        self.pool.update(config.pool);
    }

    /// Closes the underlying pool. Used when this client loses an install
    /// race and a sibling for the same address is kept instead.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Endpoint address of this storage.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Group this storage belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    fn download_size_limit(&self) -> u64 {
        *self
            .download_size_limit
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    async fn acquire(&self) -> Result<PooledConnection, FdfsError> {
        self.pool.acquire().await.map_err(|e| self.wrap(e))
    }

    fn wrap(&self, e: FdfsError) -> FdfsError {
        e.wrap(&scope(&self.group, &self.address))
    }
}

fn scope(group: &str, address: &str) -> String {
    format!("Storage_{group}:{address}")
}

/// `path_index(1) content_len(8) ext(6)`; the content follows as payload.
fn upload_packet(path_index: u8, ext: &str, content_len: usize, allow_append: bool) -> BytesMut {
    let cmd = if allow_append {
        STORAGE_CMD_UPLOAD_APPENDER_FILE
    } else {
        STORAGE_CMD_UPLOAD_FILE
    };
    let pkg_len = (1 + 8 + FILE_EXT_NAME_LEN + content_len) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + 1 + 8 + FILE_EXT_NAME_LEN);
    Header::request(cmd, pkg_len).encode(&mut packet);
    packet.put_u8(path_index);
    packet.put_i64(content_len as i64);
    protocol::put_fixed_str(&mut packet, ext, FILE_EXT_NAME_LEN);
    packet
}

/// `master_len(8) content_len(8) prefix(16) ext(6) master(k)`; the content
/// follows as payload.
fn upload_slave_packet(master: &str, suffix: &str, ext: &str, content_len: usize) -> BytesMut {
    let fixed = 8 + 8 + FILE_PREFIX_LEN + FILE_EXT_NAME_LEN;
    let pkg_len = (fixed + master.len() + content_len) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + fixed + master.len());
    Header::request(STORAGE_CMD_UPLOAD_SLAVE_FILE, pkg_len).encode(&mut packet);
    packet.put_i64(master.len() as i64);
    packet.put_i64(content_len as i64);
    protocol::put_fixed_str(&mut packet, suffix, FILE_PREFIX_LEN);
    protocol::put_fixed_str(&mut packet, ext, FILE_EXT_NAME_LEN);
    packet.put_slice(master.as_bytes());
    packet
}

/// `filename_len(8) content_len(8) filename(n)`; the content follows as
/// payload.
fn append_packet(filename: &str, content_len: usize) -> BytesMut {
    let pkg_len = (8 + 8 + filename.len() + content_len) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + 16 + filename.len());
    Header::request(STORAGE_CMD_APPEND_FILE, pkg_len).encode(&mut packet);
    packet.put_i64(filename.len() as i64);
    packet.put_i64(content_len as i64);
    packet.put_slice(filename.as_bytes());
    packet
}

/// `group(16) filename(n)`.
fn delete_packet(group: &str, filename: &str) -> BytesMut {
    let pkg_len = (GROUP_NAME_LEN + filename.len()) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + pkg_len as usize);
    Header::request(STORAGE_CMD_DELETE_FILE, pkg_len).encode(&mut packet);
    protocol::put_fixed_str(&mut packet, group, GROUP_NAME_LEN);
    packet.put_slice(filename.as_bytes());
    packet
}

/// `offset(8) length(8) group(16) filename(n)`.
fn download_packet(group: &str, filename: &str, offset: i64, length: i64) -> BytesMut {
    let pkg_len = (8 + 8 + GROUP_NAME_LEN + filename.len()) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + pkg_len as usize);
    Header::request(STORAGE_CMD_DOWNLOAD_FILE, pkg_len).encode(&mut packet);
    packet.put_i64(offset);
    packet.put_i64(length);
    protocol::put_fixed_str(&mut packet, group, GROUP_NAME_LEN);
    packet.put_slice(filename.as_bytes());
    packet
}

/// Decodes an upload reply, `group(16) remote_name(rest)`, into a printed
/// file id.
fn parse_fid(reply: &[u8]) -> Result<String, FdfsError> {
    if reply.len() < GROUP_NAME_LEN {
        return Err(FdfsError::unexpected_len(reply.len(), GROUP_NAME_LEN));
    }
    let group = protocol::fixed_str(&reply[..GROUP_NAME_LEN]);
    let remote_name = String::from_utf8_lossy(&reply[GROUP_NAME_LEN..]).into_owned();
    Ok(FileId::new(group, remote_name).to_string())
}

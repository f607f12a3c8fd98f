//! Client for a FastDFS tracker node.
//!
//! Trackers answer routing queries: which storage accepts uploads for a
//! group, and which storage owns or serves an existing file. Every query is
//! one round trip on a pooled connection.

use bytes::{Buf, BufMut, BytesMut};

use crate::config::TrackerConfig;
use crate::error::FdfsError;
use crate::pool::Pool;
use crate::protocol::{
    self, GROUP_NAME_LEN, HEADER_LEN, Header, IP_ADDR_LEN, TRACKER_CMD_QUERY_FETCH_ONE,
    TRACKER_CMD_QUERY_STORE_WITH_GROUP, TRACKER_CMD_QUERY_UPDATE, TRACKER_FETCH_BODY_LEN,
    TRACKER_STORE_BODY_LEN,
};
use crate::request;

/// Storage location answered by a tracker query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStoreInfo {
    /// Storage endpoint, `host:port`.
    pub address: String,
    /// Group the storage belongs to.
    pub group: String,
    /// Storage volume index. Meaningful only in store-query replies; fetch
    /// and update replies leave it zero.
    pub path_index: u8,
}

impl TrackerStoreInfo {
    /// Decodes a tracker reply body: `group(16) ip(15) port(8)`, plus a
    /// trailing path index byte on store replies.
    fn decode(body: &[u8], with_path_index: bool) -> Result<Self, FdfsError> {
        let expected = if with_path_index {
            TRACKER_STORE_BODY_LEN
        } else {
            TRACKER_FETCH_BODY_LEN
        };
        if body.len() != expected {
            return Err(FdfsError::unexpected_len(body.len(), expected));
        }

        let group = protocol::fixed_str(&body[..GROUP_NAME_LEN]);
        let ip = protocol::fixed_str(&body[GROUP_NAME_LEN..GROUP_NAME_LEN + IP_ADDR_LEN]);
        let mut tail = &body[GROUP_NAME_LEN + IP_ADDR_LEN..];
        let port = tail.get_u64();
        let path_index = if with_path_index { body[expected - 1] } else { 0 };

        Ok(Self {
            address: format!("{ip}:{port}"),
            group,
            path_index,
        })
    }
}

/// Client bound to one tracker endpoint.
pub struct Tracker {
    address: String,
    pool: Pool,
}

impl Tracker {
    /// Connects a tracker client, eagerly opening its connection pool.
    ///
    /// # Errors
    ///
    /// [`crate::ErrorKind::CreatePool`] if the eager dial fails.
    pub async fn new(address: impl Into<String>, config: TrackerConfig) -> Result<Self, FdfsError> {
        let address = address.into();
        let pool = Pool::new(address.clone(), config.pool)
            .await
            .map_err(|e| e.wrap(&format!("Tracker:{address}")))?;
        Ok(Self { address, pool })
    }

    /// Asks which storage accepts uploads for `group`.
    ///
    /// # Errors
    ///
    /// Pool, transport, or reply-shape errors, wrapped with this tracker's
    /// scope.
    pub async fn query_store(&self, group: &str) -> Result<TrackerStoreInfo, FdfsError> {
        self.query(TRACKER_CMD_QUERY_STORE_WITH_GROUP, group, "", true)
            .await
    }

    /// Asks which storage owns `filename` for updates (append, delete).
    ///
    /// # Errors
    ///
    /// Pool, transport, or reply-shape errors, wrapped with this tracker's
    /// scope.
    pub async fn query_update(
        &self,
        group: &str,
        filename: &str,
    ) -> Result<TrackerStoreInfo, FdfsError> {
        self.query(TRACKER_CMD_QUERY_UPDATE, group, filename, false)
            .await
    }

    /// Asks which storage serves `filename` for download.
    ///
    /// # Errors
    ///
    /// Pool, transport, or reply-shape errors, wrapped with this tracker's
    /// scope.
    pub async fn query_fetch(
        &self,
        group: &str,
        filename: &str,
    ) -> Result<TrackerStoreInfo, FdfsError> {
        self.query(TRACKER_CMD_QUERY_FETCH_ONE, group, filename, false)
            .await
    }

    async fn query(
        &self,
        cmd: u8,
        group: &str,
        filename: &str,
        with_path_index: bool,
    ) -> Result<TrackerStoreInfo, FdfsError> {
        let mut conn = self.pool.acquire().await.map_err(|e| self.wrap(e))?;
        let packet = query_packet(cmd, group, filename);

        let reply = match request::roundtrip(&mut conn, &packet, None, 0).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.wrap(e)),
        };
        TrackerStoreInfo::decode(&reply, with_path_index).map_err(|e| self.wrap(e))
    }

    /// Applies a new pool configuration; zero fields keep current values.
    pub fn update(&self, config: TrackerConfig) {
        self.pool.update(config.pool);
    }

    /// Endpoint address of this tracker.
    pub fn address(&self) -> &str {
        &self.address
    }

    fn wrap(&self, e: FdfsError) -> FdfsError {
        e.wrap(&format!("Tracker:{}", self.address))
    }
}

/// Builds a tracker query packet: header, fixed group field, and the
/// filename when one applies.
fn query_packet(cmd: u8, group: &str, filename: &str) -> BytesMut {
    let pkg_len = (GROUP_NAME_LEN + filename.len()) as i64;
    let mut packet = BytesMut::with_capacity(HEADER_LEN + pkg_len as usize);
    Header::request(cmd, pkg_len).encode(&mut packet);
    protocol::put_fixed_str(&mut packet, group, GROUP_NAME_LEN);
    packet.put_slice(filename.as_bytes());
    packet
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::*;

    #[test]
    fn test_query_packet_layout() {
        let packet = query_packet(TRACKER_CMD_QUERY_UPDATE, "g1", "M00/00/00/a.bin");

        let body_len = GROUP_NAME_LEN + "M00/00/00/a.bin".len();
        assert_eq!(packet.len(), HEADER_LEN + body_len);
        assert_eq!(&packet[..8], &(body_len as i64).to_be_bytes());
        assert_eq!(packet[8], TRACKER_CMD_QUERY_UPDATE);
        assert_eq!(packet[9], 0);
        assert_eq!(&packet[10..12], b"g1");
        assert!(packet[12..10 + GROUP_NAME_LEN].iter().all(|&b| b == 0));
        assert_eq!(&packet[10 + GROUP_NAME_LEN..], b"M00/00/00/a.bin");
    }

    #[test]
    fn test_store_query_body_is_group_only() {
        let packet = query_packet(TRACKER_CMD_QUERY_STORE_WITH_GROUP, "g1", "");
        assert_eq!(packet.len(), HEADER_LEN + GROUP_NAME_LEN);
        assert_eq!(&packet[..8], &(GROUP_NAME_LEN as i64).to_be_bytes());
    }

    fn reply_body(group: &str, ip: &str, port: u64, path_index: Option<u8>) -> Vec<u8> {
        let mut body = Vec::new();
        protocol::put_fixed_str(&mut body, group, GROUP_NAME_LEN);
        protocol::put_fixed_str(&mut body, ip, IP_ADDR_LEN);
        body.extend_from_slice(&port.to_be_bytes());
        if let Some(index) = path_index {
            body.push(index);
        }
        body
    }

    #[test]
    fn test_decode_store_reply() {
        let body = reply_body("g1", "10.0.0.5", 23000, Some(1));
        let info = TrackerStoreInfo::decode(&body, true).unwrap();

        assert_eq!(info.group, "g1");
        assert_eq!(info.address, "10.0.0.5:23000");
        assert_eq!(info.path_index, 1);
    }

    #[test]
    fn test_decode_fetch_reply() {
        let body = reply_body("g1", "10.0.0.5", 23000, None);
        let info = TrackerStoreInfo::decode(&body, false).unwrap();

        assert_eq!(info.group, "g1");
        assert_eq!(info.address, "10.0.0.5:23000");
        assert_eq!(info.path_index, 0);
    }

    #[test]
    fn test_decode_rejects_wrong_body_size() {
        // A fetch-sized reply where a store reply was expected.
        let body = reply_body("g1", "10.0.0.5", 23000, None);
        let err = TrackerStoreInfo::decode(&body, true).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnexpectedLen);
        assert_eq!(err.name(), "UnexpectedLenErr");
    }
}

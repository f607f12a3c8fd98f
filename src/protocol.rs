//! FastDFS wire protocol: opcodes, the frame header, fixed-width string
//! fields, and file ids.
//!
//! Every message on the wire is a 10-byte header followed by a body. The
//! header is a big-endian signed 64-bit body length, a command byte, and a
//! status byte (zero on requests; non-zero in replies signals a server
//! error).

use std::fmt;

use bytes::BufMut;

use crate::error::{ErrorKind, FdfsError};

/// Size of every frame header on the wire.
pub const HEADER_LEN: usize = 10;
/// Width of the fixed group name field.
pub const GROUP_NAME_LEN: usize = 16;
/// Width of the fixed file extension field.
pub const FILE_EXT_NAME_LEN: usize = 6;
/// Width of the fixed slave prefix field.
pub const FILE_PREFIX_LEN: usize = 16;
/// Width of the ip field in tracker replies.
pub const IP_ADDR_LEN: usize = 15;
/// Reply body size of a query-store response: group, ip, port, path index.
pub const TRACKER_STORE_BODY_LEN: usize = 40;
/// Reply body size of a query-fetch or query-update response.
pub const TRACKER_FETCH_BODY_LEN: usize = 39;

/// Tracker command: pick an upload target inside a group.
pub const TRACKER_CMD_QUERY_STORE_WITH_GROUP: u8 = 104;
/// Tracker command: locate the storage serving a file for download.
pub const TRACKER_CMD_QUERY_FETCH_ONE: u8 = 102;
/// Tracker command: locate the storage owning a file for updates.
pub const TRACKER_CMD_QUERY_UPDATE: u8 = 103;
/// Storage command: plain upload.
pub const STORAGE_CMD_UPLOAD_FILE: u8 = 11;
/// Storage command: delete a file.
pub const STORAGE_CMD_DELETE_FILE: u8 = 12;
/// Storage command: ranged download.
pub const STORAGE_CMD_DOWNLOAD_FILE: u8 = 14;
/// Storage command: upload a slave file bound to a master name.
pub const STORAGE_CMD_UPLOAD_SLAVE_FILE: u8 = 21;
/// Storage command: upload an appendable file.
pub const STORAGE_CMD_UPLOAD_APPENDER_FILE: u8 = 23;
/// Storage command: append to an appender file.
pub const STORAGE_CMD_APPEND_FILE: u8 = 24;

/// The 10-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Body length in bytes, excluding the header itself.
    pub pkg_len: i64,
    /// Command or reply opcode.
    pub cmd: u8,
    /// Zero on success; a server error code otherwise.
    pub status: u8,
}

impl Header {
    /// Builds a request header; requests always carry status zero.
    pub fn request(cmd: u8, pkg_len: i64) -> Self {
        Self {
            pkg_len,
            cmd,
            status: 0,
        }
    }

    /// Appends the wire form of the header to `buf`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i64(self.pkg_len);
        buf.put_u8(self.cmd);
        buf.put_u8(self.status);
    }

    /// Decodes a header read off the wire. A negative body length is a
    /// framing error.
    pub fn decode(raw: &[u8; HEADER_LEN]) -> Result<Self, FdfsError> {
        let pkg_len = i64::from_be_bytes([
            raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
        ]);
        if pkg_len < 0 {
            return Err(FdfsError::new(
                ErrorKind::ReadResponseHeader,
                format!("wrong pkg length: {pkg_len}"),
            ));
        }
        Ok(Self {
            pkg_len,
            cmd: raw[8],
            status: raw[9],
        })
    }
}

/// Appends `s` to `buf` as a `width`-byte field, truncated at `width` and
/// NUL-padded below it.
pub fn put_fixed_str(buf: &mut impl BufMut, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    buf.put_slice(&bytes[..n]);
    buf.put_bytes(0, width - n);
}

/// Decodes a fixed-width field, truncating at the first NUL.
pub fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Returns the extension of `filename`: the part after the last `.`, or the
/// empty string when there is none.
pub fn file_ext(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "",
    }
}

/// File id handed out by uploads: `group/remote_name`.
///
/// The group is the replication set that stores the file; the remote name is
/// the server-assigned path within the group. Splitting an id without a `/`
/// fails with [`ErrorKind::WrongFid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId {
    group: String,
    remote_name: String,
}

impl FileId {
    /// Builds a file id from its two halves.
    pub fn new(group: impl Into<String>, remote_name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            remote_name: remote_name.into(),
        }
    }

    /// Splits `fid` at the first `/` into group and remote name.
    pub fn parse(fid: &str) -> Result<Self, FdfsError> {
        match fid.split_once('/') {
            Some((group, remote_name)) => Ok(Self::new(group, remote_name)),
            None => Err(FdfsError::wrong_fid(fid)),
        }
    }

    /// The group half of the id.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The server-assigned name within the group.
    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.remote_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = Header::request(STORAGE_CMD_UPLOAD_FILE, 18);
        let mut buf = Vec::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(&buf[..8], &18i64.to_be_bytes());
        assert_eq!(buf[8], STORAGE_CMD_UPLOAD_FILE);
        assert_eq!(buf[9], 0);

        let raw: [u8; HEADER_LEN] = buf.try_into().unwrap();
        assert_eq!(Header::decode(&raw).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_negative_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1i64).to_be_bytes());
        buf.push(100);
        buf.push(0);
        let raw: [u8; HEADER_LEN] = buf.try_into().unwrap();

        let err = Header::decode(&raw).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ReadResponseHeader);
    }

    #[test]
    fn test_fixed_str_pads_and_truncates() {
        let mut buf = Vec::new();
        put_fixed_str(&mut buf, "helloworld", 5);
        assert_eq!(buf, b"hello");

        buf.clear();
        put_fixed_str(&mut buf, "helloworld", 11);
        assert_eq!(buf, b"helloworld\0");

        buf.clear();
        put_fixed_str(&mut buf, "g1", GROUP_NAME_LEN);
        assert_eq!(buf.len(), GROUP_NAME_LEN);
        assert_eq!(&buf[..2], b"g1");
        assert!(buf[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_fixed_str_decode_stops_at_first_nul() {
        assert_eq!(fixed_str(b"g1\0\0\0rest"), "g1");
        assert_eq!(fixed_str(b"nonul"), "nonul");
        assert_eq!(fixed_str(b"\0leading"), "");
    }

    #[test]
    fn test_fixed_str_decode_inverts_encode() {
        for s in ["", "g", "group01", "exactly16bytes!!"] {
            let mut buf = Vec::new();
            put_fixed_str(&mut buf, s, GROUP_NAME_LEN);
            assert_eq!(fixed_str(&buf), s);
        }
    }

    #[test]
    fn test_file_ext() {
        assert_eq!(file_ext("a.jpg"), "jpg");
        assert_eq!(file_ext("archive.tar.gz"), "gz");
        assert_eq!(file_ext("noext"), "");
    }

    #[test]
    fn test_file_id_split_join() {
        let fid = FileId::parse("g1/M00/00/00/a.bin").unwrap();
        assert_eq!(fid.group(), "g1");
        assert_eq!(fid.remote_name(), "M00/00/00/a.bin");
        assert_eq!(fid.to_string(), "g1/M00/00/00/a.bin");

        let joined = FileId::new("g2", "M01/AB/x.jpg");
        let reparsed = FileId::parse(&joined.to_string()).unwrap();
        assert_eq!(reparsed, joined);
    }

    #[test]
    fn test_file_id_without_separator_fails() {
        let err = FileId::parse("justaname").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongFid);
    }
}

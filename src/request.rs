//! One request/response round trip on a pooled connection.

use crate::error::{ErrorKind, FdfsError};
use crate::pool::PooledConnection;
use crate::protocol::{HEADER_LEN, Header};

/// Sends `packet` (header plus command fields) and an optional payload, then
/// reads the reply body.
///
/// `resp_limit` greater than zero caps the reply size the caller is willing
/// to read. A server announcing more fails fast with
/// [`ErrorKind::WrongPkgLength`]: the body stays unread, so the connection
/// is marked unusable and discarded on release. Socket failures likewise
/// poison the connection.
pub(crate) async fn roundtrip(
    conn: &mut PooledConnection,
    packet: &[u8],
    body: Option<&[u8]>,
    resp_limit: u64,
) -> Result<Vec<u8>, FdfsError> {
    if let Err(e) = conn.write_all(packet).await {
        conn.mark_unusable();
        return Err(FdfsError::new(ErrorKind::WriteRequestHeader, e.to_string()));
    }
    if let Some(body) = body {
        if let Err(e) = conn.write_all(body).await {
            conn.mark_unusable();
            return Err(FdfsError::new(ErrorKind::WriteRequestBody, e.to_string()));
        }
    }

    let mut raw = [0u8; HEADER_LEN];
    if let Err(e) = conn.read_exact(&mut raw).await {
        conn.mark_unusable();
        return Err(FdfsError::new(ErrorKind::ReadResponseHeader, e.to_string()));
    }
    let header = match Header::decode(&raw) {
        Ok(header) => header,
        Err(e) => {
            conn.mark_unusable();
            return Err(e);
        }
    };
    if header.status != 0 {
        if header.pkg_len > 0 {
            // Error replies normally carry no body; a stream with unread
            // bytes cannot be reused.
            conn.mark_unusable();
        }
        return Err(FdfsError::from_status(header.status));
    }

    let pkg_len = header.pkg_len as u64;
    if resp_limit > 0 && pkg_len > resp_limit {
        conn.mark_unusable();
        return Err(FdfsError::new(
            ErrorKind::WrongPkgLength,
            format!("announced body of {pkg_len} bytes exceeds limit {resp_limit}"),
        ));
    }

    let mut resp = vec![0u8; pkg_len as usize];
    if let Err(e) = conn.read_exact(&mut resp).await {
        conn.mark_unusable();
        return Err(FdfsError::new(ErrorKind::ReadResponseBody, e.to_string()));
    }
    Ok(resp)
}

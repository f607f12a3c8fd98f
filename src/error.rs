//! Library error type with a dotted scope path.
//!
//! Failures carry two pieces of identity: a [`ErrorKind`] for matching, and
//! a dotted name path recording every scope the error crossed on its way up
//! (`cluster.Storage_g1:10.0.0.5:23000.FileNotExist`). Wrapping prepends a
//! scope qualifier; the inner name is never rewritten.

use thiserror::Error;

/// Classifies an [`FdfsError`] independent of the scope path it accrued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No cluster registered under the requested name.
    UnknownCluster,
    /// File id without a `group/remote_name` separator.
    WrongFid,
    /// Initial pool dial failed.
    CreatePool,
    /// Acquire timed out, or a dial during acquire failed.
    GetConn,
    /// The cluster has no tracker peers to query.
    NoTrackerPeers,
    /// Writing the request header failed.
    WriteRequestHeader,
    /// Writing the request body failed.
    WriteRequestBody,
    /// Reading or decoding the response header failed.
    ReadResponseHeader,
    /// Reading the response body failed.
    ReadResponseBody,
    /// Announced response length exceeds the operation's limit.
    WrongPkgLength,
    /// Reply body size disagrees with the fixed size the command expects.
    UnexpectedLen,
    /// Server status 2: the file does not exist.
    FileNotExist,
    /// Server status 22: invalid parameter.
    InvalidParameter,
    /// Any other non-zero server status byte.
    ServerStatus(u8),
}

impl ErrorKind {
    /// Base error name before any scope is prepended.
    fn base_name(self) -> &'static str {
        match self {
            ErrorKind::UnknownCluster => "UnknownCluster",
            ErrorKind::WrongFid => "WrongFidErr",
            ErrorKind::CreatePool => "CreatePoolErr",
            ErrorKind::GetConn => "GetConnFromPoolErr",
            ErrorKind::NoTrackerPeers => "NoTrackerPeersErr",
            ErrorKind::WriteRequestHeader => "WriteRequestHeaderErr",
            ErrorKind::WriteRequestBody => "WriteRequestBodyErr",
            ErrorKind::ReadResponseHeader => "ReadResponseHeaderErr",
            ErrorKind::ReadResponseBody => "ReadResponseBodyErr",
            ErrorKind::WrongPkgLength => "WrongPkgLengthErr",
            ErrorKind::UnexpectedLen => "UnexpectedLenErr",
            ErrorKind::FileNotExist => "FileNotExist",
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::ServerStatus(_) => "ServerStatusErr",
        }
    }
}

/// Error returned by every fallible client operation.
#[derive(Debug, Error)]
#[error("{name}: {detail}")]
pub struct FdfsError {
    kind: ErrorKind,
    name: String,
    detail: String,
}

impl FdfsError {
    pub(crate) fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            name: kind.base_name().to_string(),
            kind,
            detail: detail.into(),
        }
    }

    /// The failure kind, independent of accumulated scopes.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The dotted name path, outermost scope first.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable failure detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Prepends a scope qualifier to the name path.
    pub(crate) fn wrap(mut self, scope: &str) -> Self {
        self.name = format!("{scope}.{}", self.name);
        self
    }

    pub(crate) fn unknown_cluster(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownCluster,
            format!("cluster {name} is not registered"),
        )
    }

    pub(crate) fn wrong_fid(fid: &str) -> Self {
        Self::new(
            ErrorKind::WrongFid,
            format!("fid is not group/remote_name: {fid}"),
        )
    }

    pub(crate) fn unexpected_len(received: usize, expected: usize) -> Self {
        Self::new(
            ErrorKind::UnexpectedLen,
            format!("received body of {received} bytes, expected {expected}"),
        )
    }

    /// Maps a non-zero reply status byte to its error kind.
    pub(crate) fn from_status(status: u8) -> Self {
        match status {
            2 => Self::new(ErrorKind::FileNotExist, "server status 2: file not exist"),
            22 => Self::new(
                ErrorKind::InvalidParameter,
                "server status 22: invalid parameter",
            ),
            code => Self::new(
                ErrorKind::ServerStatus(code),
                format!("server status {code} != 0"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(FdfsError::from_status(2).kind(), ErrorKind::FileNotExist);
        assert_eq!(
            FdfsError::from_status(22).kind(),
            ErrorKind::InvalidParameter
        );
        assert_eq!(
            FdfsError::from_status(5).kind(),
            ErrorKind::ServerStatus(5)
        );
        assert_eq!(FdfsError::from_status(2).name(), "FileNotExist");
    }

    #[test]
    fn test_wrapping_prepends_scopes_in_order() {
        let err = FdfsError::from_status(2)
            .wrap("Storage_g1:10.0.0.5:23000")
            .wrap("Tracker:10.0.0.1:22122")
            .wrap("pictures");

        assert_eq!(
            err.name(),
            "pictures.Tracker:10.0.0.1:22122.Storage_g1:10.0.0.5:23000.FileNotExist"
        );
        // The kind survives wrapping untouched.
        assert_eq!(err.kind(), ErrorKind::FileNotExist);
    }

    #[test]
    fn test_display_carries_name_and_detail() {
        let err = FdfsError::wrong_fid("nogroup").wrap("c1");
        let printed = err.to_string();
        assert!(printed.starts_with("c1.WrongFidErr"));
        assert!(printed.contains("nogroup"));
    }
}

use std::io;
use std::path::PathBuf;

use crate::chip::AbiVersion;

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all chip and line request operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The handle was used after `close`.
    #[error("handle is closed")]
    Closed,

    /// The requested configuration violates an invariant and was rejected
    /// before any kernel call.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration requires a feature the negotiated uAPI version
    /// cannot express.
    #[error("{feature} requires a later kernel uAPI than {abi_version}")]
    UapiIncompatibility {
        feature: &'static str,
        abi_version: AbiVersion,
    },

    /// The kernel refused the operation with EPERM, e.g. writing to an
    /// input line.
    #[error("permission denied")]
    PermissionDenied,

    /// The kernel refused the operation with EBUSY, e.g. re-watching an
    /// offset or requesting an already requested line.
    #[error("resource busy")]
    Busy,

    /// Chip path or line offset does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path does not refer to a character device.
    #[error("{0} is not a character device")]
    NotCharacterDevice(PathBuf),

    /// The device refused GET_CHIPINFO, so it is not a GPIO chip.
    #[error("{0} is not a GPIO character device")]
    NotGpioChip(PathBuf),

    /// The kernel event buffer overflowed and events were lost.
    #[error("event buffer overflow")]
    Overflow,

    /// Any other kernel or I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }

    pub(crate) fn abi(feature: &'static str, abi_version: AbiVersion) -> Self {
        Error::UapiIncompatibility {
            feature,
            abi_version,
        }
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(errno: nix::errno::Errno) -> Self {
        use nix::errno::Errno;
        match errno {
            Errno::EPERM | Errno::EACCES => Error::PermissionDenied,
            Errno::EBUSY => Error::Busy,
            Errno::ENOENT | Errno::ENODEV => Error::NotFound(errno.desc().to_string()),
            _ => Error::Io(io::Error::from_raw_os_error(errno as i32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert!(matches!(
            Error::from(nix::errno::Errno::EPERM),
            Error::PermissionDenied
        ));
        assert!(matches!(Error::from(nix::errno::Errno::EBUSY), Error::Busy));
        assert!(matches!(
            Error::from(nix::errno::Errno::ENOENT),
            Error::NotFound(_)
        ));
        let e = Error::from(nix::errno::Errno::EINVAL);
        match e {
            Error::Io(io) => assert_eq!(io.raw_os_error(), Some(libc::EINVAL)),
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn uapi_incompatibility_display() {
        let e = Error::abi("debounce", AbiVersion::V1);
        assert_eq!(
            e.to_string(),
            "debounce requires a later kernel uAPI than v1"
        );
    }
}

//! Device errors, boundary status codes and errno mapping

use core::ffi::c_int;

use crate::io::CopyFault;

pub const EINTR: c_int = 4;
pub const EBADF: c_int = 9;
pub const EFAULT: c_int = 14;
pub const EBUSY: c_int = 16;
pub const EINVAL: c_int = 22;
pub const ENOSPC: c_int = 28;

/// Errors returned by device operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Caller memory could not be accessed
    #[error("bad address")]
    Fault,

    /// Write cursor is at or past the capacity
    #[error("no space left on device")]
    NoSpace,

    /// Waiting for the device lock was interrupted
    #[error("interrupted system call")]
    Interrupted,

    #[error("invalid control command: {0}")]
    InvalidCommand(u32),

    /// Seek would move the cursor before the start of the device
    #[error("invalid seek position")]
    InvalidSeek,

    #[error("invalid device configuration: {0}")]
    InvalidConfig(String),
}

impl DeviceError {
    /// Positive errno value for this error
    #[must_use]
    pub fn errno(&self) -> c_int {
        match self {
            Self::Fault => EFAULT,
            Self::NoSpace => ENOSPC,
            Self::Interrupted => EINTR,
            Self::InvalidCommand(_) | Self::InvalidSeek | Self::InvalidConfig(_) => EINVAL,
        }
    }
}

impl From<CopyFault> for DeviceError {
    fn from(_: CopyFault) -> Self {
        Self::Fault
    }
}

impl embedded_io::Error for DeviceError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::Fault => embedded_io::ErrorKind::InvalidData,
            Self::NoSpace => embedded_io::ErrorKind::OutOfMemory,
            Self::Interrupted => embedded_io::ErrorKind::Interrupted,
            Self::InvalidCommand(_) | Self::InvalidSeek | Self::InvalidConfig(_) => {
                embedded_io::ErrorKind::InvalidInput
            }
        }
    }
}

/// Status code reported to whoever sits on the other side of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    /// A successful read that returned no bytes
    EndOfData,
    NoSpace,
    Fault,
    Interrupted,
    InvalidCommand,
}

impl Status {
    /// Status of a read result
    #[must_use]
    pub fn of_read(result: &Result<usize, DeviceError>) -> Self {
        match result {
            Ok(0) => Self::EndOfData,
            Ok(_) => Self::Ok,
            Err(e) => Self::from(e),
        }
    }

    /// Status of a read, write or ioctl return value (negative errno on
    /// failure)
    ///
    /// Only those calls map `EINVAL` to an invalid command; an `lseek`
    /// result needs its own reading. Returns `None` for errno values the
    /// device never produces.
    #[must_use]
    pub fn from_return(ret: i64) -> Option<Self> {
        if ret >= 0 {
            return Some(Self::Ok);
        }
        match c_int::try_from(-ret).ok()? {
            ENOSPC => Some(Self::NoSpace),
            EFAULT => Some(Self::Fault),
            EINTR => Some(Self::Interrupted),
            EINVAL => Some(Self::InvalidCommand),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::EndOfData => "end of data",
            Self::NoSpace => "no space",
            Self::Fault => "fault",
            Self::Interrupted => "interrupted",
            Self::InvalidCommand => "invalid command",
        }
    }
}

impl From<&DeviceError> for Status {
    fn from(e: &DeviceError) -> Self {
        match e {
            DeviceError::Fault => Self::Fault,
            DeviceError::NoSpace => Self::NoSpace,
            DeviceError::Interrupted => Self::Interrupted,
            DeviceError::InvalidCommand(_)
            | DeviceError::InvalidSeek
            | DeviceError::InvalidConfig(_) => Self::InvalidCommand,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(DeviceError::Fault.errno(), 14);
        assert_eq!(DeviceError::NoSpace.errno(), 28);
        assert_eq!(DeviceError::Interrupted.errno(), 4);
        assert_eq!(DeviceError::InvalidCommand(99).errno(), 22);
    }

    #[test]
    fn test_status_of_read() {
        assert_eq!(Status::of_read(&Ok(0)), Status::EndOfData);
        assert_eq!(Status::of_read(&Ok(3)), Status::Ok);
        assert_eq!(
            Status::of_read(&Err(DeviceError::Interrupted)),
            Status::Interrupted
        );
    }

    #[test]
    fn test_status_from_return() {
        assert_eq!(Status::from_return(12), Some(Status::Ok));
        assert_eq!(Status::from_return(-28), Some(Status::NoSpace));
        assert_eq!(Status::from_return(-14), Some(Status::Fault));
        assert_eq!(Status::from_return(-22), Some(Status::InvalidCommand));
        assert_eq!(Status::from_return(-9), None);
    }

    #[test]
    fn test_copy_fault_is_fault() {
        assert_eq!(DeviceError::from(CopyFault), DeviceError::Fault);
    }
}

//! # Protocol Errors
//!
//! Every failure is returned to the caller with the header/extension or id
//! that was involved. The protocol layer never retries on its own.

use core::fmt;

use cadenza_hal::HalError;

use crate::header::{MsgExtension, MsgHeader};
use crate::status::FwStatus;

/// Unified protocol error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No reply before the deadline
    Timeout {
        /// Request header
        header: MsgHeader,
        /// Request extension
        extension: MsgExtension,
    },
    /// Reply carried a non-zero status
    Rejected {
        /// Request header
        header: MsgHeader,
        /// Firmware status
        status: FwStatus,
    },
    /// Reply value outside the range the request allows
    UnexpectedReply {
        /// Request header
        header: MsgHeader,
        /// Value the firmware sent
        value: u32,
    },
    /// No free instance id for the module type
    ResourceExhausted {
        /// Module id
        module_id: u16,
    },
    /// Transport disabled, nothing was sent
    Disabled,
    /// Payload does not fit one message
    PayloadTooLarge {
        /// Payload length
        len: usize,
        /// Largest payload accepted
        capacity: usize,
    },
    /// Argument outside its wire range
    InvalidParameter(&'static str),
    /// Unknown module, instance or pipeline
    NotFound,
    /// Operation not legal in the current local state
    InvalidState,
    /// Id already in use
    AlreadyExists,
    /// Firmware did not report ready
    FirmwareNotReady,
    /// Mailbox access failure
    Hal(HalError),
}

/// Protocol result type
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// Firmware status of a rejected request
    pub fn status(&self) -> Option<FwStatus> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error was decided locally without a firmware round trip
    pub fn is_local(&self) -> bool {
        !matches!(
            self,
            Self::Timeout { .. } | Self::Rejected { .. } | Self::UnexpectedReply { .. }
        )
    }
}

impl From<HalError> for Error {
    fn from(err: HalError) -> Self {
        Self::Hal(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { header, extension } => write!(
                f,
                "ipc timed out for header {:#010x} extension {:#010x}",
                header.raw(),
                extension.raw()
            ),
            Self::Rejected { header, status } => write!(
                f,
                "firmware rejected header {:#010x}: {}",
                header.raw(),
                status
            ),
            Self::UnexpectedReply { header, value } => write!(
                f,
                "unexpected reply value {:#x} for header {:#010x}",
                value,
                header.raw()
            ),
            Self::ResourceExhausted { module_id } => {
                write!(f, "no free instance id for module {}", module_id)
            },
            Self::Disabled => write!(f, "ipc transport disabled"),
            Self::PayloadTooLarge { len, capacity } => write!(
                f,
                "payload of {} bytes exceeds capacity of {} bytes",
                len, capacity
            ),
            Self::InvalidParameter(what) => write!(f, "invalid parameter: {}", what),
            Self::NotFound => write!(f, "not found"),
            Self::InvalidState => write!(f, "invalid state"),
            Self::AlreadyExists => write!(f, "already exists"),
            Self::FirmwareNotReady => write!(f, "firmware not ready"),
            Self::Hal(err) => write!(f, "mailbox: {}", err),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

//! # Session Errors
//!
//! A failed stream setup is reported as one [`SetupError`]: the step that
//! failed and the protocol error behind it. Everything built before that
//! step has already been unwound when the caller sees it.

use core::fmt;

use cadenza_ipc::Error;

/// Step of a stream setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Session not ready for setup
    Session,
    /// Path description rejected before any message
    Validate,
    /// Pipeline creation
    CreatePipeline {
        /// Pipeline id
        pipeline_id: u8,
    },
    /// Module instance creation
    InitModule {
        /// Index in the path's module list
        index: usize,
        /// Module type id
        module_id: u16,
    },
    /// Connecting two instances
    Bind {
        /// Index in the path's link list
        index: usize,
    },
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => write!(f, "session"),
            Self::Validate => write!(f, "path validation"),
            Self::CreatePipeline { pipeline_id } => write!(f, "create pipeline {}", pipeline_id),
            Self::InitModule { index, module_id } => {
                write!(f, "init module {} (path entry {})", module_id, index)
            },
            Self::Bind { index } => write!(f, "bind link {}", index),
        }
    }
}

/// Stream setup failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupError {
    /// Step that failed
    pub stage: SetupStage,
    /// Protocol error
    pub source: Error,
}

impl SetupError {
    /// Failure of `stage` with `source`
    pub const fn new(stage: SetupStage, source: Error) -> Self {
        Self { stage, source }
    }
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio path setup failed at {}: {}", self.stage, self.source)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use cadenza_ipc::{FwStatus, GlobalMsgType, MsgHeader};

    #[test]
    fn test_display_names_stage_and_status() {
        let err = SetupError::new(
            SetupStage::CreatePipeline { pipeline_id: 3 },
            Error::Rejected {
                header: MsgHeader::global(GlobalMsgType::CreatePipeline),
                status: FwStatus::NOT_FOUND,
            },
        );
        let text = err.to_string();
        assert!(text.contains("create pipeline 3"));
        assert!(text.contains("resource not found"));
    }
}

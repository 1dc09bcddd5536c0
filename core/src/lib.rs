//! # Cadenza Core
//!
//! Session layer of the audio DSP control stack. A [`DspSession`] is the
//! owned container for one loaded firmware image: the transaction engine,
//! the module descriptor table with its instance bitmaps and the pipeline
//! table. Audio streams are set up as [`AudioPath`]s built from a
//! [`PathSpec`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        CADENZA CORE                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   audio stream layer                                            │
//! │          │ PathSpec                 ▲ SetupError                │
//! │          ▼                          │                           │
//! │   ┌─────────────────────────────────┴───────────────────────┐   │
//! │   │                      DspSession                         │   │
//! │   │  boot · setup_path · start · stop · teardown · shutdown │   │
//! │   └───────┬───────────────────┬──────────────────┬──────────┘   │
//! │           ▼                   ▼                  ▼              │
//! │   ┌──────────────┐   ┌────────────────┐   ┌──────────────────┐  │
//! │   │ModuleManager │   │PipelineManager │   │TransactionEngine │  │
//! │   │  (modules)   │   │  (pipeline)    │   │     (ipc)        │  │
//! │   └──────────────┘   └────────────────┘   └────────▲─────────┘  │
//! │                                                    │ handle_irq │
//! │                                          doorbell interrupt     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod error;
pub mod path;
pub mod session;

pub use error::{SetupError, SetupStage};
pub use path::{AudioPath, Link, LinkSpec, ModuleSpec, PathSpec};
pub use session::{DspSession, SessionState};

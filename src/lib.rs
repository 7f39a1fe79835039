//! Sdpcom loads images into i.MX/Vybrid parts sitting in serial download
//! mode, over a plain UART connection to the boot ROM.
//!
//! A session goes through three layers:
//!
//! * the [`transport`] layer opens the serial line, associates with the boot
//!   ROM and moves fixed-size reports in either direction,
//! * the [`sdp`] command layer builds the serial download protocol commands on
//!   top of it (status, register access, file write, jump),
//! * the [`sequencer`] walks the work chain of the target, one item at a time,
//!   and stops at the first error.
//!
//! The sequencer is implemented as a state machine with the following
//! characteristics:
//!
//! * It can only be in one state at any time.
//! * Each state has its own associated data; the [`Settings`] are shared by
//!   all states.
//! * Transitions between states are triggered via typed **events** and only
//!   the transitions with a `From` implementation from the event type to the
//!   state type are possible.
//! * Transitioning from one state to another consumes the original state.
//!
//! **Example** - Loading the default work chain of a board:
//! ```no_run
//! use sdpcom::{SettingsBuilder, WorkChain};
//!
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyUSB0")
//!     .work_file("vybrid_usb_work.conf")
//!     .finalize();
//! let exe = std::env::current_exe().ok();
//! sdpcom::load(&settings, WorkChain::default(), exe.as_deref())?;
//! # Ok::<(), sdpcom::Error>(())
//! ```

mod error;
mod loader;
pub mod sdp;
mod sequencer;
mod settings;
pub mod transport;
pub mod work;

pub use error::{Error, Result};
pub use loader::{load, run_session};
pub use sdp::BootCommands;
pub use sequencer::Sequencer;
pub use settings::{Settings, SettingsBuilder, DEFAULT_STALL_READS};
pub use transport::{
    uart::{open_channel, UartChannel},
    Device, Report, Transfer,
};
pub use work::{parse_jobs, WorkChain, WorkFile, WorkItem};

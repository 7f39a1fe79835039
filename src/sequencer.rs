//! Work sequencer.
//!
//! **Example** - Running a work chain against a device:
//! ```ignore
//! use sdpcom::{Sequencer, SettingsBuilder};
//!
//! let settings = SettingsBuilder::new().verify(true).finalize();
//! let result = Sequencer::new(settings, &mut device, &mut chain).run();
//! ```

mod events;
mod state_machine;
mod states;

pub use state_machine::Sequencer;

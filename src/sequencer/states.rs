//! States for the work sequencer state machine.
//!
//! This modules is private and restricted to the
//! [`sequencer`](crate::sequencer) scope. The public interface of the state
//! machine is provided by [`sequencer`](crate::sequencer).
//!
//! ```ignore
//! use super::states::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use log::{debug, info};

use super::events::*;

use crate::{
    error::{Error, Result},
    sdp::BootCommands,
    settings::Settings,
    work::{WorkChain, WorkItem},
};

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// What the states work on: the device commands and the work chain.
pub(crate) struct Target<'a, C: BootCommands> {
    pub commands: &'a mut C,
    pub chain: &'a mut WorkChain,
}

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// A state implements this method so it can be `run` after the state
    /// machine transitions into it.
    ///
    /// During this call, the state can do any work that needs to be done and
    /// when finished, requests a transition to a `new state` by returning the
    /// appropriate `event`. The `state` and the `event` are consumed to create
    /// the `new state` using the corresponding [`From`] trait implementation
    /// (provided such implementation exists).
    fn run<C: BootCommands>(&mut self, settings: &Settings, target: &mut Target<'_, C>)
        -> Event;
}

// ItemActive State ============================================================

/// The state in which a work item is processed.
///
/// Memory directives are applied first, in order, then the image (if any) is
/// downloaded and started. From the `ItemActiveState`, the state machine always
/// evolves via:
///
///  * **[`CheckStatusEvent`] => [`StatusCheckState`]**, carrying the error that
///    stopped the item, if any.
#[derive(Debug)]
pub(crate) struct ItemActiveState {
    pub index: usize,
}
impl Runnable for ItemActiveState {
    fn run<C: BootCommands>(
        &mut self,
        settings: &Settings,
        target: &mut Target<'_, C>,
    ) -> Event {
        info!("=> Item #{}", self.index);

        let failure = match target.chain.get(self.index) {
            Some(item) => process(item, target.commands, settings.verify).err(),
            None => None,
        };

        Event::CheckStatus(CheckStatusEvent {
            settings: settings.clone(),
            index: self.index,
            failure: failure.map(|source| Error::Item {
                index: self.index,
                source: Box::new(source),
            }),
        })
    }
}

// StatusCheck State ===========================================================

/// The state in which the device is asked for its status after an item.
///
///  * **[`AdvanceEvent`] => [`AdvanceState`]** when the item succeeded and the
///    device answered,
///  * **[`HaltEvent`] => [`HaltState`]** when the item failed (the status is
///    only reported then) or when the device did not answer.
#[derive(Debug)]
pub(crate) struct StatusCheckState {
    pub index: usize,
    pub failure: Option<Error>,
}
impl Runnable for StatusCheckState {
    fn run<C: BootCommands>(
        &mut self,
        settings: &Settings,
        target: &mut Target<'_, C>,
    ) -> Event {
        info!("=> Status check");
        let status = target.commands.status();

        if let Some(failure) = self.failure.take() {
            match status {
                Ok(word) => info!("device status after the failure: 0x{:08x}", word),
                Err(e) => info!("device did not report its status: {}", e),
            }
            return Event::Halt(HaltEvent {
                settings: settings.clone(),
                error: Some(failure),
            });
        }

        match status {
            Ok(word) => {
                if let Some(item) = target.chain.get(self.index) {
                    debug!(
                        "item #{} jump_mode {:?} plug={} status=0x{:08x}",
                        self.index, item.jump, item.plug, word
                    );
                }
                Event::Advance(AdvanceEvent {
                    settings: settings.clone(),
                    index: self.index,
                })
            }
            Err(e) => Event::Halt(HaltEvent {
                settings: settings.clone(),
                error: Some(Error::Status(Box::new(e))),
            }),
        }
    }
}

// Advance State ===============================================================

/// The state deciding which item comes next.
///
///  * **[`ActivateItemEvent`] => [`ItemActiveState`]** on the same item when
///    its plug flag was set (the flag is cleared first), or on the next item,
///  * **[`HaltEvent`] => [`HaltState`]** when the chain is exhausted.
#[derive(Debug)]
pub(crate) struct AdvanceState {
    pub index: usize,
}
impl Runnable for AdvanceState {
    fn run<C: BootCommands>(
        &mut self,
        settings: &Settings,
        target: &mut Target<'_, C>,
    ) -> Event {
        info!("=> Advance");

        if let Some(item) = target.chain.get_mut(self.index) {
            if item.plug {
                item.plug = false;
                info!("item #{} is plugged, processing it again", self.index);
                return Event::ActivateItem(ActivateItemEvent {
                    settings: settings.clone(),
                    index: self.index,
                });
            }
        }

        match target.chain.next(self.index) {
            Some(index) => Event::ActivateItem(ActivateItemEvent {
                settings: settings.clone(),
                index,
            }),
            None => Event::Halt(HaltEvent {
                settings: settings.clone(),
                error: None,
            }),
        }
    }
}

// Halt State ==================================================================

/// Reached when the sequencer stops (normally or abnormally).
///
/// This state runs in two phases: first it reports the outcome, then it
/// triggers the [`ExitEvent`] so the event loop terminates with the error, if
/// any.
#[derive(Debug)]
pub(crate) struct HaltState {
    pub error: Option<Error>,
    /// When `true` instructs the event loop to exit.
    pub should_exit: bool,
}
impl Runnable for HaltState {
    fn run<C: BootCommands>(
        &mut self,
        settings: &Settings,
        _target: &mut Target<'_, C>,
    ) -> Event {
        info!(
            "=> Halt with{}errors",
            if self.error.is_some() { " " } else { " no " }
        );
        Event::Exit(ExitEvent {
            settings: settings.clone(),
            error: self.error.take(),
        })
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn process<C: BootCommands>(item: &WorkItem, commands: &mut C, verify: bool) -> Result<()> {
    for mem in &item.mem {
        commands.write_memory(mem)?;
    }
    if item.file.is_some() {
        commands.download(item, verify)?;
    }
    Ok(())
}

//! Work sequencer state machine.
//!
//! The sequencer walks the work chain of a session, one item at a time, and
//! checks the device status after every item. It stops at the first error; any
//! retry policy belongs to the command layer.
//!
//! The following state diagram summarizes the different states and transitions
//! the sequencer goes through:
//!
//! ```text
//!                       START
//!                         |
//!             chain empty | head of chain
//!          .--------------+---------------.
//!          |                              v
//!          |                      .---------------.
//!          |          .---------->|  ItemActive   |
//!          |          |           '---------------'
//!          |          |                   |
//!          |   plug (cleared)             v
//!          |   or next item       .---------------.   item failed
//!          |          |           |  StatusCheck  |-------------------.
//!          |          |           '---------------'   or no status    |
//!          |          |                   | status ok                 |
//!          |          |                   v                           |
//!          |          |           .---------------.                   |
//!          |          '-----------|    Advance    |                   |
//!          |                      '---------------'                   |
//!          |                              | end of chain              |
//!          |                              v                           |
//!          |                      .---------------.                   |
//!          '--------------------->|     Halt      |<------------------'
//!                                 '---------------'
//!                                         |
//!                                         v
//!                                        END
//! ```

use super::events::*;
use super::states::*;
use crate::{
    error::{Error, Result},
    sdp::BootCommands,
    settings::Settings,
    work::WorkChain,
};

// =============================================================================
// Public Interface
// =============================================================================

/// Runs a work chain against a device. Build one with [`Sequencer::new`] and
/// start it with [`Sequencer::run`].
pub struct Sequencer<'a, C: BootCommands> {
    target: Target<'a, C>,
    sm: SequencerStates,
}
impl<'a, C: BootCommands> Sequencer<'a, C> {
    /// The sequencer starts on the head of `chain`, or halts right away when
    /// the chain is empty. The chain is only modified to clear plug flags.
    pub fn new(settings: Settings, commands: &'a mut C, chain: &'a mut WorkChain) -> Self {
        let sm = match chain.head() {
            Some(index) => SequencerStates::ItemActive(SequencerSM {
                settings,
                state: ItemActiveState { index },
            }),
            None => SequencerStates::Halt(SequencerSM {
                settings,
                state: HaltState {
                    error: None,
                    should_exit: false,
                },
            }),
        };

        Sequencer {
            target: Target { commands, chain },
            sm,
        }
    }

    /// The sequencer event loop runs until the `Halt` state is reached and its
    /// `should_exit` flag is set. It then returns the error that stopped the
    /// work chain, if any.
    pub fn run(mut self) -> Result<()> {
        loop {
            self.sm = self.sm.step(&mut self.target);
            if let SequencerStates::Halt(sm) = &mut self.sm {
                if sm.state.should_exit {
                    return match sm.state.error.take() {
                        Some(e) => Err(e),
                        None => Ok(()),
                    };
                }
            }
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// The raw state machine, holding the current state together with the data
/// shared by all states.
#[derive(Debug)]
struct SequencerSM<S: Runnable> {
    settings: Settings,
    state: S,
}
impl<S: Runnable> SequencerSM<S> {
    fn run<C: BootCommands>(&mut self, target: &mut Target<'_, C>) -> Event {
        self.state.run(&self.settings, target)
    }
}

/// Wraps the state machine and its various states into a simple enum, which can
/// also be used for pattern matching during state transitions.
enum SequencerStates {
    ItemActive(SequencerSM<ItemActiveState>),
    StatusCheck(SequencerSM<StatusCheckState>),
    Advance(SequencerSM<AdvanceState>),
    Halt(SequencerSM<HaltState>),
}
impl SequencerStates {
    /// The unit of work in the event loop: run the current state and turn the
    /// event it returns into the next state.
    fn step<C: BootCommands>(&mut self, target: &mut Target<'_, C>) -> Self {
        match self {
            SequencerStates::ItemActive(sm) => {
                let event = sm.run(target);
                match event {
                    Event::CheckStatus(ev) => SequencerStates::StatusCheck(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SequencerStates::StatusCheck(sm) => {
                let event = sm.run(target);
                match event {
                    Event::Advance(ev) => SequencerStates::Advance(ev.into()),
                    Event::Halt(ev) => SequencerStates::Halt(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SequencerStates::Advance(sm) => {
                let event = sm.run(target);
                match event {
                    Event::ActivateItem(ev) => SequencerStates::ItemActive(ev.into()),
                    Event::Halt(ev) => SequencerStates::Halt(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
            SequencerStates::Halt(sm) => {
                let event = sm.run(target);
                match event {
                    Event::Exit(ev) => SequencerStates::Halt(ev.into()),
                    _ => unreachable!("illegal event {:#?} at current state {:#?}", event, sm),
                }
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<ActivateItemEvent> for SequencerSM<ItemActiveState> {
    fn from(event: ActivateItemEvent) -> SequencerSM<ItemActiveState> {
        SequencerSM {
            settings: event.settings,
            state: ItemActiveState { index: event.index },
        }
    }
}

impl From<CheckStatusEvent> for SequencerSM<StatusCheckState> {
    fn from(event: CheckStatusEvent) -> SequencerSM<StatusCheckState> {
        SequencerSM {
            settings: event.settings,
            state: StatusCheckState {
                index: event.index,
                failure: event.failure,
            },
        }
    }
}

impl From<AdvanceEvent> for SequencerSM<AdvanceState> {
    fn from(event: AdvanceEvent) -> SequencerSM<AdvanceState> {
        SequencerSM {
            settings: event.settings,
            state: AdvanceState { index: event.index },
        }
    }
}

impl From<HaltEvent> for SequencerSM<HaltState> {
    fn from(event: HaltEvent) -> SequencerSM<HaltState> {
        SequencerSM {
            settings: event.settings,
            state: HaltState {
                error: event.error,
                should_exit: false,
            },
        }
    }
}
impl From<ExitEvent> for SequencerSM<HaltState> {
    fn from(event: ExitEvent) -> SequencerSM<HaltState> {
        SequencerSM {
            settings: event.settings,
            state: HaltState {
                error: event.error,
                should_exit: true,
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

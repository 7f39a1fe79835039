//! Events for the work sequencer state machine.
//!
//! This modules is private and restricted to the
//! [`sequencer`](crate::sequencer) scope. The public interface of the state
//! machine is provided by [`sequencer`](crate::sequencer).
//!
//! ```ignore
//! use super::events::*;
//! ```
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use crate::{error::Error, settings::Settings};

// =============================================================================
// Crate-Public Interface
// =============================================================================

// ActivateItemEvent ===========================================================

/// Event fired to trigger a transition to the `ItemActive` state.
///
/// This event can happen under one of the following circumstances:
///
///  1. While at the `Advance` state, when the completed item has its plug flag
///     set. The same item is processed again.
///  2. While at the `Advance` state, when the completed item has a successor
///     in the work chain.
#[derive(Debug)]
pub(crate) struct ActivateItemEvent {
    pub settings: Settings,
    /// Position of the item to process in the work chain.
    pub index: usize,
}

// CheckStatusEvent ============================================================

/// Event fired once an item has been processed, successfully or not, to query
/// the device status in the `StatusCheck` state.
#[derive(Debug)]
pub(crate) struct CheckStatusEvent {
    pub settings: Settings,
    pub index: usize,
    /// The error that ended the item processing, if any. Consumed and moved to
    /// the next state.
    pub failure: Option<Error>,
}

// AdvanceEvent ================================================================

/// Event fired when the device answered the status query after a successful
/// item. It triggers a transition to the `Advance` state.
#[derive(Debug)]
pub(crate) struct AdvanceEvent {
    pub settings: Settings,
    pub index: usize,
}

// HaltEvent ===================================================================

/// Event fired when the sequencer stops. It triggers a transition to the
/// `Halt` state.
///
/// This event can happen when the work chain is exhausted, when an item failed
/// (after its trailing status query), or when the status query following a
/// successful item failed.
#[derive(Debug)]
pub(crate) struct HaltEvent {
    pub settings: Settings,
    /// The error the sequencer stops with; `None` for a normal completion.
    pub error: Option<Error>,
}

// ExitEvent ===================================================================

/// The last event of the sequencer. It makes the event loop terminate and hand
/// the outcome back to the caller.
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub settings: Settings,
    pub error: Option<Error>,
}

// Events enum ==================================================================

/// Events that can be triggered within the work sequencer state machine.
///
/// Each possible value holds an `event`, which in turn may hold additional data
/// for the state transition. Such data is passed by the origin state for
/// potential use by the target state.
#[derive(Debug)]
pub(crate) enum Event {
    ActivateItem(ActivateItemEvent),
    CheckStatus(CheckStatusEvent),
    Advance(AdvanceEvent),
    Halt(HaltEvent),
    Exit(ExitEvent),
}

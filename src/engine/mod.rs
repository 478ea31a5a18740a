//! Engine boundary: graph instantiation, state changes and the status bus.
//!
//! The engine executes pipeline descriptions; the rest of the crate only
//! describes and supervises it. Its asynchronous status reporting is a
//! plain channel: the engine posts [`StatusMessage`]s, the supervisor does a
//! blocking receive, so signals arrive in emission order and at most one is
//! in flight at a time.

pub mod runtime;

mod rtp;
pub(crate) mod sink;
mod source;

pub use runtime::{TransmitEngine, TransmitHandle, TxStats};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::error::ConstructionError;
use crate::pipeline::GraphDescription;

/// Target states a supervisor may request from an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// Graph running: source producing, sink transmitting.
    Playing,
    /// Graph fully stopped with all resources released.
    Null,
}

/// Status signal posted by an engine on its bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// The source has delivered its final buffer.
    EndOfStream,
    /// The engine hit an unrecoverable fault.
    Error {
        /// Human-readable description of the fault.
        message: String,
        /// Optional diagnostic detail.
        debug: Option<String>,
    },
    /// Anything else; supervisors acknowledge these and keep waiting.
    Other(String),
}

/// Error reported by an engine for a rejected state-change request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct StateChangeError(pub String);

/// Boundary to the media engine that executes a pipeline description.
///
/// One engine instance stands in for the engine's process-wide state: it is
/// created once, handed to the controller, and torn down when the instance
/// goes out of scope, so there is no hidden global lifecycle.
pub trait Engine {
    /// Runtime graph handle, owned by the caller for the run's duration.
    type Handle;

    /// Realize a description into a runtime graph.
    fn instantiate(&self, description: &GraphDescription)
        -> Result<Self::Handle, ConstructionError>;

    /// Status channel for a graph.
    ///
    /// Subscribe before requesting [`TargetState::Playing`] so no early
    /// signal is missed.
    fn bus(&self, handle: &Self::Handle) -> Receiver<StatusMessage>;

    /// Request a state transition for a graph.
    fn set_state(&self, handle: &Self::Handle, target: TargetState)
        -> Result<(), StateChangeError>;
}

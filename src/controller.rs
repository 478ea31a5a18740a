//! Pipeline lifecycle controller.
//!
//! Owns the runtime graph and the pipeline state for exactly one run:
//! instantiate, subscribe, activate, supervise, tear down. Lifecycle
//! decisions are single-threaded; the supervision loop is the sole blocking
//! point and wakes only for a status signal or an interrupt.

use crossbeam_channel::{never, select, Receiver};
use tracing::{error, info, trace, warn};

use crate::engine::{Engine, StatusMessage, TargetState};
use crate::error::{ActivationError, StreamError};
use crate::pipeline::GraphDescription;

/// Lifecycle states of a single streaming run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Constructed; nothing instantiated yet.
    Uninitialized,
    /// Graph instantiation and activation in progress.
    Activating,
    /// Engine transmitting; supervision loop blocked on the bus.
    Running,
    /// Shutdown requested; waiting for the engine to release resources.
    Stopping,
    /// Clean shutdown complete.
    Terminated,
    /// Unrecoverable construction or activation failure.
    Failed,
}

/// How a supervised run ended, for the zero-exit paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The stream played to end-of-stream.
    Completed,
    /// The user cancelled the run.
    Interrupted,
}

/// Supervises one streaming run from activation to teardown.
///
/// Single instance per run. The interrupt channel is serviced at loop
/// iteration boundaries, so at most one in-flight status signal finishes
/// processing before shutdown begins.
pub struct Controller<E: Engine> {
    engine: E,
    interrupt: Receiver<()>,
    state: PipelineState,
}

impl<E: Engine> Controller<E> {
    pub fn new(engine: E, interrupt: Receiver<()>) -> Self {
        Self {
            engine,
            interrupt,
            state: PipelineState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Drive a description through instantiation, activation and the
    /// supervision loop, tearing the graph down on every exit path.
    pub fn run(&mut self, description: &GraphDescription) -> Result<RunOutcome, StreamError> {
        self.state = PipelineState::Activating;

        let handle = match self.engine.instantiate(description) {
            Ok(handle) => handle,
            Err(err) => {
                self.state = PipelineState::Failed;
                return Err(StreamError::Construction(err));
            }
        };

        // Subscribe before requesting PLAYING so no early signal is missed.
        let bus = self.engine.bus(&handle);

        if let Err(err) = self.engine.set_state(&handle, TargetState::Playing) {
            // The graph may hold partial resources; release them.
            self.teardown(&handle);
            self.state = PipelineState::Failed;
            return Err(StreamError::Activation(ActivationError(err.0)));
        }

        self.state = PipelineState::Running;
        info!("pipeline playing");

        let verdict = self.supervise(bus);

        self.state = PipelineState::Stopping;
        self.teardown(&handle);
        self.state = PipelineState::Terminated;

        verdict
    }

    /// Block until a terminal status signal or an interrupt.
    fn supervise(&self, bus: Receiver<StatusMessage>) -> Result<RunOutcome, StreamError> {
        let mut interrupt = self.interrupt.clone();
        loop {
            select! {
                recv(bus) -> message => {
                    match message {
                        Ok(StatusMessage::EndOfStream) => {
                            info!("end of stream reached");
                            return Ok(RunOutcome::Completed);
                        }
                        Ok(StatusMessage::Error { message, debug }) => {
                            error!("stream error: {message}");
                            if let Some(detail) = &debug {
                                error!("debug info: {detail}");
                            }
                            return Err(StreamError::Runtime { message, debug });
                        }
                        Ok(StatusMessage::Other(tag)) => {
                            // Benign or unrecognized signal; keep waiting.
                            trace!("ignoring status signal: {tag}");
                        }
                        Err(_) => {
                            // The engine dropped the bus without a terminal
                            // signal; the stream is gone.
                            return Err(StreamError::Runtime {
                                message: "status channel closed unexpectedly".to_string(),
                                debug: None,
                            });
                        }
                    }
                }
                recv(interrupt) -> message => {
                    if message.is_ok() {
                        info!("interrupted, stopping stream");
                        return Ok(RunOutcome::Interrupted);
                    }
                    // Interrupt source went away; rely on the bus alone.
                    interrupt = never();
                }
            }
        }
    }

    /// Request the fully-stopped state, releasing engine resources.
    ///
    /// Safe on a partially activated graph and safe to invoke repeatedly.
    fn teardown(&self, handle: &E::Handle) {
        if let Err(err) = self.engine.set_state(handle, TargetState::Null) {
            // A teardown error never changes the already-decided outcome.
            warn!("error while stopping pipeline: {err}");
        }
    }
}

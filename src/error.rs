//! Run-fatal error taxonomy.
//!
//! All four terminal conditions of a run are handled locally by the
//! controller and turned into a state transition plus a log line; nothing
//! here propagates as a panic. An interrupt is a normal cancellation, not an
//! error, and has no type in this module.

use thiserror::Error;

/// The engine could not realize a pipeline description.
///
/// Fatal, no retry: the description names a stage or property combination
/// the engine does not support.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ConstructionError(pub String);

/// The engine refused to bring the pipeline to the playing state.
///
/// Fatal, no retry: typically a sink that cannot bind its network resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ActivationError(pub String);

/// Terminal failure of a streaming run, tagged by the phase that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The description could not be realized; the run never activated.
    #[error("pipeline construction failed: {0}")]
    Construction(#[from] ConstructionError),
    /// The engine rejected the playing-state transition.
    #[error("pipeline activation failed: {0}")]
    Activation(#[from] ActivationError),
    /// The engine reported a fault while the stream was running.
    ///
    /// Ends the run through the normal shutdown path, not a crash.
    #[error("stream error: {message}")]
    Runtime {
        /// Human-readable engine message.
        message: String,
        /// Optional diagnostic detail accompanying the fault.
        debug: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_identify_the_failed_phase() {
        let construction: StreamError = ConstructionError("bad stage".to_string()).into();
        assert_eq!(
            construction.to_string(),
            "pipeline construction failed: bad stage"
        );

        let activation: StreamError = ActivationError("port busy".to_string()).into();
        assert_eq!(
            activation.to_string(),
            "pipeline activation failed: port busy"
        );

        let runtime = StreamError::Runtime {
            message: "socket gone".to_string(),
            debug: Some("after 10 packets".to_string()),
        };
        assert_eq!(runtime.to_string(), "stream error: socket gone");
    }
}

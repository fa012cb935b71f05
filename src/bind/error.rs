//! Error types for function binding and dispatch.

use thiserror::Error;

use crate::abi::Value;

/// Errors raised by the host/service adapters and raw dispatch.
#[derive(Error, Debug)]
pub enum BindError {
    /// The native function failed although its signature declares no
    /// `result` error case able to carry the failure.
    #[error("Protocol violation in '{function}': {message}")]
    ProtocolViolation { function: String, message: String },

    /// A call completed with the declared `result` error case.
    #[error("Call failed with declared error case: {payload:?}")]
    CallFailed { payload: Option<Value> },

    #[error("No implementation provided for '{interface}.{function}'")]
    MissingImplementation { interface: String, function: String },

    #[error("Raw function index {index} is not installed")]
    UnknownFunction { index: u32 },

    #[error("'{interface}.{function}' is not exported by the bound world")]
    UnknownExport { interface: String, function: String },

    #[error("Argument count mismatch for '{function}': expected {expected}, got {got}")]
    ArgumentCount {
        function: String,
        expected: usize,
        got: usize,
    },

    /// The connection dropped a deferred call before completing it.
    #[error("Connection closed before the call completed")]
    ConnectionClosed,
}

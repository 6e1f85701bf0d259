use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vst2_sys::HostOpcode;

use crate::plugin::PluginState;

/// Errors that can occur while loading, driving or closing VST2 plugins.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("plugin binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("failed to load plugin library {path}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("failed to unload plugin library {path}: {source}")]
    LibraryUnload {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("plugin library {path} does not export {symbol}")]
    MissingEntry { path: PathBuf, symbol: &'static str },
    #[error("entry point of {0} returned a null effect")]
    NullEffect(PathBuf),
    #[error("effect created by {path} has bad magic {magic:#010x}")]
    BadMagic { path: PathBuf, magic: i32 },
    #[error("effect created by {0} has no dispatcher")]
    MissingDispatcher(PathBuf),
    #[error("cannot {operation} plugin {path} while {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: PluginState,
        path: PathBuf,
    },
    #[error("plugin {0} is already closed")]
    AlreadyClosed(PathBuf),
    #[error("effect {handle:#x} is already registered")]
    AlreadyRegistered { handle: usize },
    #[error("host callback {opcode:?} arrived for unregistered effect {handle:#x}")]
    UnregisteredEffect { handle: usize, opcode: HostOpcode },
    #[error("plugin {path} does not support {precision} precision processing")]
    UnsupportedPrecision {
        path: PathBuf,
        precision: &'static str,
    },
    #[error(
        "process buffers for {path} carry {inputs} inputs and {outputs} outputs, plugin expects {expected_inputs} and {expected_outputs}"
    )]
    ChannelMismatch {
        path: PathBuf,
        inputs: usize,
        outputs: usize,
        expected_inputs: usize,
        expected_outputs: usize,
    },
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HostError {
    pub fn missing_entry(path: impl Into<PathBuf>, symbol: &'static str) -> Self {
        HostError::MissingEntry {
            path: path.into(),
            symbol,
        }
    }

    pub(crate) fn transition(
        operation: &'static str,
        state: PluginState,
        path: impl Into<PathBuf>,
    ) -> Self {
        HostError::InvalidTransition {
            operation,
            state,
            path: path.into(),
        }
    }

    /// True for errors that indicate a broken host integration rather than a
    /// recoverable runtime condition.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            HostError::AlreadyClosed(_)
                | HostError::AlreadyRegistered { .. }
                | HostError::UnregisteredEffect { .. }
        )
    }
}

pub type Result<T, E = HostError> = std::result::Result<T, E>;

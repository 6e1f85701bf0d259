//! Harmoniq Studio VST2 hosting core.
//!
//! Loads VST 2.4 plugin binaries, takes each instance through its lifecycle
//! (open, configure, start, process, stop, close) and bridges the engine's
//! `f64` channel buffers to the planar pointer arrays the plugin ABI expects.
//! Host callbacks from native code are routed through a process-wide registry
//! keyed by the effect pointer, which is the only place raw effect pointers
//! coming back from plugins are trusted. The raw ABI lives in `vst2-sys`.

pub mod audio_buffer;
pub mod buffer;
pub mod config;
mod effect;
mod error;
mod module;
mod plugin;
pub mod processor;
pub mod registry;

pub use audio_buffer::{AudioBuffer, HostBuffer};
pub use buffer::{DoubleBuffer, FloatBuffer, PlanarBuffer, Sample};
pub use config::{DispatchRequest, Precision, ProcessorConfig, CONFIG_ENV};
pub use effect::{Effect, EffectHandle, Index, Opt, Ptr, Return, Value};
pub use error::{HostError, Result};
pub use module::{EntryPoint, LibraryLoader, Module, ModuleHandle, ModuleLoader, StaticHandle};
pub use plugin::{ParameterInfo, Plugin, PluginInfo, PluginState};
pub use processor::{Processor, Transport};
pub use registry::HostCallback;

pub use vst2_sys as sys;

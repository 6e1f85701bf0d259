#![cfg_attr(not(test), no_std)]
//! Raw bindings for the VST 2.4 plug-in ABI.
//!
//! Everything in this crate mirrors the published protocol bit-for-bit: record
//! layouts are `#[repr(C)]`, opcodes and flags are transparent newtypes over the
//! integers that cross the boundary. Higher level hosting lives in
//! `harmoniq-host-vst2`.

mod aeffect;
mod opcodes;
mod speaker;
mod time;

pub use aeffect::{
    AEffect, DispatcherProc, EffectFlags, GetParameterProc, HostCallbackProc, PluginMain,
    ProcessDoubleProc, ProcessProc, SetParameterProc, EFFECT_MAGIC,
};
pub use opcodes::{EffectOpcode, HostOpcode, ProcessLevel};
pub use speaker::{SpeakerArrangement, SpeakerArrangementType, SpeakerProperties, SpeakerType};
pub use time::{SmpteFrameRate, TimeInfo, TimeInfoFlags};

/// Protocol version reported to plug-ins in answer to [`HostOpcode::VERSION`].
pub const VST_VERSION: i32 = 2400;

/// Exported symbol carrying the plug-in entry function.
pub const ENTRY_SYMBOL: &[u8] = b"VSTPluginMain\0";
/// Entry symbol used by plug-ins built against pre-2.4 SDKs.
pub const LEGACY_ENTRY_SYMBOL: &[u8] = b"main\0";

/// Used for effGetProgramName, effSetProgramName and effGetProgramNameIndexed.
pub const MAX_PROG_NAME_LEN: usize = 24;
/// Used for effGetParamLabel, effGetParamDisplay and effGetParamName.
pub const MAX_PARAM_STR_LEN: usize = 8;
/// Used for effGetVendorString and audioMasterGetVendorString.
pub const MAX_VENDOR_STR_LEN: usize = 64;
/// Used for effGetProductString and audioMasterGetProductString.
pub const MAX_PRODUCT_STR_LEN: usize = 64;
/// Used for effGetEffectName.
pub const MAX_EFFECT_NAME_LEN: usize = 32;
/// Used for speaker and pin names.
pub const MAX_NAME_LEN: usize = 64;
/// Used for parameter property labels.
pub const MAX_LABEL_LEN: usize = 64;
/// Used for parameter property short labels.
pub const MAX_SHORT_LABEL_LEN: usize = 8;
/// Used for parameter category labels.
pub const MAX_CATEG_LABEL_LEN: usize = 24;
/// Used for offline file names.
pub const MAX_FILE_NAME_LEN: usize = 100;

//! Thin wrapper around the native `AEffect` record.

use std::ffi::{c_void, CString};
use std::fmt;
use std::path::Path;
use std::ptr::{self, NonNull};

use vst2_sys::{
    AEffect, EffectFlags, EffectOpcode, SpeakerArrangement, MAX_EFFECT_NAME_LEN,
    MAX_PARAM_STR_LEN, MAX_PRODUCT_STR_LEN, MAX_VENDOR_STR_LEN,
};

use crate::buffer::{DoubleBuffer, FloatBuffer, PlanarBuffer, Sample};
use crate::error::{HostError, Result};

/// `index` argument of a dispatch or host callback.
pub type Index = i64;
/// `value` argument of a dispatch or host callback.
pub type Value = i64;
/// `ptr` argument of a dispatch or host callback.
pub type Ptr = *mut c_void;
/// `opt` argument of a dispatch or host callback.
pub type Opt = f64;
/// Single integer result of a dispatch or host callback.
pub type Return = i64;

// Plugins are allowed to overrun the documented string limits, so string
// queries always hand out a generously sized scratch area.
const STRING_SCRATCH_LEN: usize = 256;

/// Identity of a native effect, used as the registry key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectHandle(usize);

impl EffectHandle {
    pub(crate) fn from_ptr(effect: *const AEffect) -> Self {
        Self(effect as usize)
    }

    pub fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectHandle({:#x})", self.0)
    }
}

/// Non-owning view of a live native effect.
///
/// Lifetime of the underlying record is governed by [`crate::Plugin`]; an
/// `Effect` handed to a host callback is only valid for the duration of that
/// call.
pub struct Effect {
    raw: NonNull<AEffect>,
}

// Calls are serialized by the owning plugin; callbacks get their own view.
unsafe impl Send for Effect {}

impl Effect {
    /// # Safety
    /// `raw` must point to a live effect record created by a plugin entry
    /// function, and must stay valid for as long as the returned value is used.
    pub(crate) unsafe fn from_raw(raw: NonNull<AEffect>) -> Self {
        Self { raw }
    }

    pub fn handle(&self) -> EffectHandle {
        EffectHandle::from_ptr(self.raw.as_ptr())
    }

    pub fn as_ptr(&self) -> *mut AEffect {
        self.raw.as_ptr()
    }

    fn record(&self) -> &AEffect {
        // Valid per the contract of `from_raw`.
        unsafe { self.raw.as_ref() }
    }

    /// Issues a dispatch call using the protocol's five generic fields.
    ///
    /// The result is opcode specific; zero is not a generic failure.
    pub fn dispatch(
        &self,
        opcode: EffectOpcode,
        index: Index,
        value: Value,
        ptr: Ptr,
        opt: Opt,
    ) -> Return {
        match self.record().dispatcher {
            Some(dispatcher) => unsafe {
                dispatcher(
                    self.as_ptr(),
                    opcode.0,
                    index as i32,
                    value as isize,
                    ptr,
                    opt as f32,
                ) as Return
            },
            None => 0,
        }
    }

    pub fn flags(&self) -> EffectFlags {
        self.record().flags()
    }

    /// Legacy plugins install `processReplacing` without raising the flag.
    pub fn can_process_f32(&self) -> bool {
        self.record().process_replacing.is_some()
    }

    pub fn can_process_f64(&self) -> bool {
        self.flags().contains(EffectFlags::CAN_DOUBLE_REPLACING)
            && self.record().process_double_replacing.is_some()
    }

    pub fn is_synth(&self) -> bool {
        self.flags().contains(EffectFlags::IS_SYNTH)
    }

    pub fn has_editor(&self) -> bool {
        self.flags().contains(EffectFlags::HAS_EDITOR)
    }

    pub fn num_inputs(&self) -> usize {
        usize::try_from(self.record().num_inputs).unwrap_or(0)
    }

    pub fn num_outputs(&self) -> usize {
        usize::try_from(self.record().num_outputs).unwrap_or(0)
    }

    pub fn num_params(&self) -> usize {
        usize::try_from(self.record().num_params).unwrap_or(0)
    }

    pub fn num_programs(&self) -> usize {
        usize::try_from(self.record().num_programs).unwrap_or(0)
    }

    pub fn initial_delay(&self) -> i32 {
        self.record().initial_delay
    }

    pub fn unique_id(&self) -> i32 {
        self.record().unique_id
    }

    pub fn version(&self) -> i32 {
        self.record().version
    }

    pub fn effect_name(&self) -> String {
        self.query_string(EffectOpcode::GET_EFFECT_NAME, 0, MAX_EFFECT_NAME_LEN)
    }

    pub fn vendor_name(&self) -> String {
        self.query_string(EffectOpcode::GET_VENDOR_STRING, 0, MAX_VENDOR_STR_LEN)
    }

    pub fn product_name(&self) -> String {
        self.query_string(EffectOpcode::GET_PRODUCT_STRING, 0, MAX_PRODUCT_STR_LEN)
    }

    pub fn vendor_version(&self) -> i64 {
        self.dispatch(EffectOpcode::GET_VENDOR_VERSION, 0, 0, ptr::null_mut(), 0.0)
    }

    /// Protocol version the plugin was built against; pre-2.0 plugins answer 0.
    pub fn vst_version(&self) -> i64 {
        self.dispatch(EffectOpcode::GET_VST_VERSION, 0, 0, ptr::null_mut(), 0.0)
    }

    pub fn parameter(&self, index: usize) -> f32 {
        match self.record().get_parameter {
            Some(get) if index < self.num_params() => unsafe { get(self.as_ptr(), index as i32) },
            _ => 0.0,
        }
    }

    pub fn set_parameter(&self, index: usize, value: f32) {
        if let Some(set) = self.record().set_parameter {
            if index < self.num_params() {
                unsafe { set(self.as_ptr(), index as i32, value) };
            }
        }
    }

    pub fn parameter_name(&self, index: usize) -> String {
        self.query_string(EffectOpcode::GET_PARAM_NAME, index as Index, MAX_PARAM_STR_LEN)
    }

    pub fn parameter_label(&self, index: usize) -> String {
        self.query_string(EffectOpcode::GET_PARAM_LABEL, index as Index, MAX_PARAM_STR_LEN)
    }

    pub fn parameter_display(&self, index: usize) -> String {
        self.query_string(EffectOpcode::GET_PARAM_DISPLAY, index as Index, MAX_PARAM_STR_LEN)
    }

    /// Asks whether the plugin supports a named capability ("receiveVstTimeInfo", ...).
    pub fn can_do(&self, capability: &str) -> bool {
        let Ok(capability) = CString::new(capability) else {
            return false;
        };
        self.dispatch(
            EffectOpcode::CAN_DO,
            0,
            0,
            capability.as_ptr() as Ptr,
            0.0,
        ) > 0
    }

    pub(crate) fn set_sample_rate(&self, sample_rate: f64) {
        self.dispatch(
            EffectOpcode::SET_SAMPLE_RATE,
            0,
            0,
            ptr::null_mut(),
            sample_rate,
        );
    }

    pub(crate) fn set_block_size(&self, frames: usize) {
        self.dispatch(
            EffectOpcode::SET_BLOCK_SIZE,
            0,
            frames as Value,
            ptr::null_mut(),
            0.0,
        );
    }

    /// Input arrangement travels in `value`, output arrangement in `ptr`.
    pub(crate) fn set_speaker_arrangement(
        &self,
        input: &mut SpeakerArrangement,
        output: &mut SpeakerArrangement,
    ) -> Return {
        self.dispatch(
            EffectOpcode::SET_SPEAKER_ARRANGEMENT,
            0,
            input as *mut SpeakerArrangement as Value,
            output as *mut SpeakerArrangement as Ptr,
            0.0,
        )
    }

    pub(crate) fn set_mains(&self, running: bool) {
        self.dispatch(
            EffectOpcode::MAINS_CHANGED,
            0,
            Value::from(running),
            ptr::null_mut(),
            0.0,
        );
    }

    pub(crate) fn set_processing(&self, processing: bool) {
        let opcode = if processing {
            EffectOpcode::START_PROCESS
        } else {
            EffectOpcode::STOP_PROCESS
        };
        self.dispatch(opcode, 0, 0, ptr::null_mut(), 0.0);
    }

    /// Runs `processReplacing` over `num_frames` frames.
    ///
    /// `path` names the owning plugin in errors.
    pub(crate) fn process_f32(
        &self,
        path: &Path,
        num_channels: usize,
        num_frames: usize,
        input: &mut FloatBuffer,
        output: &mut FloatBuffer,
    ) -> Result<()> {
        let process = self
            .record()
            .process_replacing
            .filter(|_| self.can_process_f32());
        let Some(process) = process else {
            return Err(unsupported::<f32>(path));
        };
        let frames = self.check_shape(path, num_channels, num_frames, input, output)?;
        unsafe {
            process(
                self.as_ptr(),
                input.as_mut_ptr_array(),
                output.as_mut_ptr_array(),
                frames,
            )
        };
        Ok(())
    }

    /// Runs `processDoubleReplacing` over `num_frames` frames.
    ///
    /// `path` names the owning plugin in errors.
    pub(crate) fn process_f64(
        &self,
        path: &Path,
        num_channels: usize,
        num_frames: usize,
        input: &mut DoubleBuffer,
        output: &mut DoubleBuffer,
    ) -> Result<()> {
        let process = self
            .record()
            .process_double_replacing
            .filter(|_| self.can_process_f64());
        let Some(process) = process else {
            return Err(unsupported::<f64>(path));
        };
        let frames = self.check_shape(path, num_channels, num_frames, input, output)?;
        unsafe {
            process(
                self.as_ptr(),
                input.as_mut_ptr_array(),
                output.as_mut_ptr_array(),
                frames,
            )
        };
        Ok(())
    }

    /// The plugin indexes its pointer arrays by its own declared channel
    /// counts and reads `frames` samples per channel, so both must fit inside
    /// the staging buffers before the call is made.
    fn check_shape<T: Sample>(
        &self,
        path: &Path,
        num_channels: usize,
        num_frames: usize,
        input: &PlanarBuffer<T>,
        output: &PlanarBuffer<T>,
    ) -> Result<i32> {
        let expected_inputs = self.num_inputs().max(num_channels);
        let expected_outputs = self.num_outputs().max(num_channels);
        if input.num_channels() < expected_inputs || output.num_channels() < expected_outputs {
            return Err(HostError::ChannelMismatch {
                path: path.to_path_buf(),
                inputs: input.num_channels(),
                outputs: output.num_channels(),
                expected_inputs,
                expected_outputs,
            });
        }
        let frames = num_frames.min(input.frames()).min(output.frames());
        Ok(i32::try_from(frames).unwrap_or(i32::MAX))
    }

    fn query_string(&self, opcode: EffectOpcode, index: Index, limit: usize) -> String {
        let mut scratch = [0u8; STRING_SCRATCH_LEN];
        debug_assert!(limit < STRING_SCRATCH_LEN);
        self.dispatch(opcode, index, 0, scratch.as_mut_ptr() as Ptr, 0.0);
        // Plugins do not reliably terminate strings; the last byte stays NUL.
        scratch[STRING_SCRATCH_LEN - 1] = 0;
        let end = scratch.iter().position(|byte| *byte == 0).unwrap_or(0);
        String::from_utf8_lossy(&scratch[..end]).trim().to_string()
    }
}

fn unsupported<T: Sample>(path: &Path) -> HostError {
    HostError::UnsupportedPrecision {
        path: path.to_path_buf(),
        precision: T::PRECISION,
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("handle", &self.handle())
            .field("flags", &self.flags())
            .finish()
    }
}

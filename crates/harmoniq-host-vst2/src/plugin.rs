use std::fmt;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use vst2_sys::{EffectFlags, EffectOpcode, SpeakerArrangement};

use crate::buffer::{DoubleBuffer, FloatBuffer};
use crate::effect::{Effect, EffectHandle, Index, Opt, Ptr, Return, Value};
use crate::error::{HostError, Result};
use crate::module::ModuleShared;
use crate::registry::{self, HostCallback, host_callback};

/// Lifecycle position of a [`Plugin`].
///
/// Sample rate, block size and speaker arrangement are configuration, not
/// states: they may be issued in any order and repeated whenever the instance
/// is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PluginState {
    /// The native effect exists and is registered; nothing was dispatched.
    Created,
    Opened,
    Started,
    Stopped,
    /// Deregistered and closed. The native effect must not be touched again.
    Closed,
}

/// One live plugin instance created from a [`crate::Module`].
///
/// Owns the native effect exclusively. Dropping an instance that was not
/// closed closes it.
pub struct Plugin {
    effect: Effect,
    state: PluginState,
    path: PathBuf,
    name: String,
    // Keeps the module's code mapped while the effect is alive.
    _module: Arc<ModuleShared>,
}

impl Plugin {
    /// Runs the module's entry function and registers the resulting effect.
    ///
    /// Nothing stays registered when the effect is rejected.
    pub(crate) fn create(module: Arc<ModuleShared>, callback: Arc<HostCallback>) -> Result<Self> {
        let path = module.path().to_path_buf();
        let main = module.main();
        let raw = unsafe { main(host_callback) };
        let raw = NonNull::new(raw).ok_or_else(|| HostError::NullEffect(path.clone()))?;

        let record = unsafe { raw.as_ref() };
        if !record.has_valid_magic() {
            return Err(HostError::BadMagic {
                path,
                magic: record.magic,
            });
        }
        if record.dispatcher.is_none() {
            return Err(HostError::MissingDispatcher(path));
        }

        let effect = unsafe { Effect::from_raw(raw) };
        registry::register(effect.handle(), callback)?;
        debug!(path = %path.display(), handle = ?effect.handle(), "plugin created");

        Ok(Self {
            effect,
            state: PluginState::Created,
            name: module.name().to_string(),
            path,
            _module: module,
        })
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Registry key of the native effect. Stays comparable after close.
    pub fn handle(&self) -> EffectHandle {
        self.effect.handle()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native effect of a plugin that has not been closed.
    pub fn effect(&self) -> Result<&Effect> {
        match self.state {
            PluginState::Closed => Err(HostError::AlreadyClosed(self.path.clone())),
            _ => Ok(&self.effect),
        }
    }

    pub fn flags(&self) -> Result<EffectFlags> {
        Ok(self.effect()?.flags())
    }

    /// Sends the open dispatch. Only valid right after creation.
    pub fn open(&mut self) -> Result<()> {
        self.expect("open", &[PluginState::Created])?;
        self.effect
            .dispatch(EffectOpcode::OPEN, 0, 0, ptr::null_mut(), 0.0);
        self.transition(PluginState::Opened);
        Ok(())
    }

    /// Raw dispatch for opcodes without a dedicated wrapper.
    pub fn dispatch(
        &self,
        opcode: EffectOpcode,
        index: Index,
        value: Value,
        ptr: Ptr,
        opt: Opt,
    ) -> Result<Return> {
        Ok(self.effect()?.dispatch(opcode, index, value, ptr, opt))
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.expect_configurable("set sample rate")?;
        self.effect.set_sample_rate(sample_rate);
        Ok(())
    }

    pub fn set_buffer_size(&mut self, frames: usize) -> Result<()> {
        self.expect_configurable("set buffer size")?;
        self.effect.set_block_size(frames);
        Ok(())
    }

    /// Announces input and output channel geometry. The plugin's answer is
    /// returned as is; it reports whether the layout was accepted.
    pub fn set_speaker_arrangement(
        &mut self,
        input: &mut SpeakerArrangement,
        output: &mut SpeakerArrangement,
    ) -> Result<Return> {
        self.expect_configurable("set speaker arrangement")?;
        Ok(self.effect.set_speaker_arrangement(input, output))
    }

    /// Selects the processing precision, 1 for double and 0 for single.
    pub fn set_process_precision(&mut self, double: bool) -> Result<Return> {
        self.expect_configurable("set process precision")?;
        Ok(self.effect.dispatch(
            EffectOpcode::SET_PROCESS_PRECISION,
            0,
            Value::from(double),
            ptr::null_mut(),
            0.0,
        ))
    }

    /// Resumes the plugin. Every start must be matched by a stop.
    pub fn start(&mut self) -> Result<()> {
        self.expect("start", &[PluginState::Opened, PluginState::Stopped])?;
        self.effect.set_mains(true);
        self.effect.set_processing(true);
        self.transition(PluginState::Started);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.expect("stop", &[PluginState::Started])?;
        self.effect.set_processing(false);
        self.effect.set_mains(false);
        self.transition(PluginState::Stopped);
        Ok(())
    }

    pub fn process_f32(&mut self, input: &mut FloatBuffer, output: &mut FloatBuffer) -> Result<()> {
        self.expect("process", &[PluginState::Started])?;
        self.effect
            .process_f32(&self.path, input.num_channels(), input.frames(), input, output)
    }

    pub fn process_f64(
        &mut self,
        input: &mut DoubleBuffer,
        output: &mut DoubleBuffer,
    ) -> Result<()> {
        self.expect("process", &[PluginState::Started])?;
        self.effect
            .process_f64(&self.path, input.num_channels(), input.frames(), input, output)
    }

    /// Stops the plugin if needed, deregisters it and sends the close
    /// dispatch, after which the plugin frees the native effect.
    pub fn close(&mut self) -> Result<()> {
        if self.state == PluginState::Closed {
            return Err(HostError::AlreadyClosed(self.path.clone()));
        }
        if self.state == PluginState::Started {
            self.stop()?;
        }

        registry::deregister(self.handle());
        self.effect
            .dispatch(EffectOpcode::CLOSE, 0, 0, ptr::null_mut(), 0.0);
        self.transition(PluginState::Closed);
        Ok(())
    }

    /// Snapshot of what the plugin reports about itself.
    pub fn info(&self) -> Result<PluginInfo> {
        let effect = self.effect()?;
        let parameters = (0..effect.num_params())
            .map(|index| ParameterInfo {
                index,
                name: effect.parameter_name(index),
                label: effect.parameter_label(index),
                display: effect.parameter_display(index),
                value: effect.parameter(index),
            })
            .collect();

        Ok(PluginInfo {
            name: self.name.clone(),
            path: self.path.clone(),
            effect_name: effect.effect_name(),
            vendor: effect.vendor_name(),
            product: effect.product_name(),
            vendor_version: effect.vendor_version(),
            vst_version: effect.vst_version(),
            unique_id: effect.unique_id(),
            version: effect.version(),
            num_inputs: effect.num_inputs(),
            num_outputs: effect.num_outputs(),
            num_programs: effect.num_programs(),
            initial_delay: effect.initial_delay(),
            is_synth: effect.is_synth(),
            has_editor: effect.has_editor(),
            can_process_f32: effect.can_process_f32(),
            can_process_f64: effect.can_process_f64(),
            parameters,
        })
    }

    fn expect(&self, operation: &'static str, allowed: &[PluginState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        match self.state {
            PluginState::Closed => Err(HostError::AlreadyClosed(self.path.clone())),
            state => Err(HostError::transition(operation, state, self.path.clone())),
        }
    }

    fn expect_configurable(&self, operation: &'static str) -> Result<()> {
        self.expect(
            operation,
            &[
                PluginState::Opened,
                PluginState::Started,
                PluginState::Stopped,
            ],
        )
    }

    fn transition(&mut self, next: PluginState) {
        debug!(
            path = %self.path.display(),
            from = ?self.state,
            to = ?next,
            "plugin state changed"
        );
        self.state = next;
    }
}

impl Drop for Plugin {
    fn drop(&mut self) {
        if self.state != PluginState::Closed {
            warn!(path = %self.path.display(), state = ?self.state, "plugin dropped without close");
            if let Err(err) = self.close() {
                warn!(path = %self.path.display(), %err, "failed to close dropped plugin");
            }
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &self.state)
            .field("handle", &self.handle())
            .finish()
    }
}

/// Serializable description of a plugin, gathered after open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub path: PathBuf,
    pub effect_name: String,
    pub vendor: String,
    pub product: String,
    pub vendor_version: i64,
    pub vst_version: i64,
    pub unique_id: i32,
    pub version: i32,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_programs: usize,
    pub initial_delay: i32,
    pub is_synth: bool,
    pub has_editor: bool,
    pub can_process_f32: bool,
    pub can_process_f64: bool,
    pub parameters: Vec<ParameterInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub index: usize,
    pub name: String,
    pub label: String,
    pub display: String,
    pub value: f32,
}

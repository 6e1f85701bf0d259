//! Drives one plugin instance block by block.

use std::collections::HashMap;
use std::ptr;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};
use vst2_sys::{
    EffectOpcode, HostOpcode, ProcessLevel, SpeakerArrangement, TimeInfo, TimeInfoFlags,
};

use crate::audio_buffer::{AudioBuffer, HostBuffer};
use crate::buffer::{DoubleBuffer, FloatBuffer};
use crate::config::{Precision, ProcessorConfig};
use crate::effect::{Effect, Index, Opt, Ptr, Return, Value};
use crate::error::{HostError, Result};
use crate::module::Module;
use crate::plugin::{Plugin, PluginState};

/// Stream state the plugin may query through host callbacks.
///
/// Shared between the processor and the callback registered for its plugin,
/// which may run on a different thread.
#[derive(Debug)]
pub struct Transport {
    // `f64` bits.
    sample_rate: AtomicU64,
    block_size: AtomicUsize,
    position: AtomicI64,
    // Storage behind the pointers handed out for time queries, one record per
    // querying thread. Boxed so addresses survive map growth.
    snapshots: Mutex<HashMap<ThreadId, Box<TimeInfo>>>,
}

impl Transport {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate: AtomicU64::new(sample_rate.to_bits()),
            block_size: AtomicUsize::new(0),
            position: AtomicI64::new(0),
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    pub fn sample_rate(&self) -> f64 {
        f64::from_bits(self.sample_rate.load(Ordering::Relaxed))
    }

    fn set_sample_rate(&self, sample_rate: f64) {
        self.sample_rate
            .store(sample_rate.to_bits(), Ordering::Relaxed);
    }

    /// Frames per block last negotiated with the plugin, 0 before the first block.
    pub fn block_size(&self) -> usize {
        self.block_size.load(Ordering::Relaxed)
    }

    /// Frames processed since the stream started.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    fn advance(&self, frames: usize) {
        self.position.fetch_add(frames as i64, Ordering::Relaxed);
    }

    /// Refreshes the calling thread's time snapshot and returns a pointer to
    /// it.
    ///
    /// The pointer stays valid while the transport lives. Its contents change
    /// only on the next query from the same thread, so a GUI or timer thread
    /// asking for the time never rewrites the record the audio thread is
    /// reading. The first query from a thread allocates its record.
    pub fn snapshot(&self) -> *mut TimeInfo {
        let nano_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as f64)
            .unwrap_or_default();
        let mut snapshots = self.snapshots.lock();
        let time = snapshots.entry(thread::current().id()).or_default();
        **time = TimeInfo {
            sample_pos: self.position() as f64,
            sample_rate: self.sample_rate(),
            nano_seconds,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
            flags: TimeInfoFlags::TIME_SIG_VALID,
            ..TimeInfo::default()
        };
        &mut **time as *mut TimeInfo
    }

    /// Answers host callbacks for the processor's plugin.
    pub fn handle(
        &self,
        effect: &Effect,
        opcode: HostOpcode,
        _index: Index,
        _value: Value,
        _ptr: Ptr,
        _opt: Opt,
    ) -> Return {
        match opcode {
            HostOpcode::IDLE => {
                effect.dispatch(EffectOpcode::EDIT_IDLE, 0, 0, ptr::null_mut(), 0.0);
                0
            }
            HostOpcode::GET_CURRENT_PROCESS_LEVEL => ProcessLevel::Realtime as Return,
            HostOpcode::GET_SAMPLE_RATE => self.sample_rate() as Return,
            HostOpcode::GET_BLOCK_SIZE => self.block_size() as Return,
            HostOpcode::GET_TIME => self.snapshot() as Return,
            _ => {
                trace!(?opcode, "ignoring host opcode");
                0
            }
        }
    }
}

/// Staging buffers in the negotiated precision.
enum Bridge {
    Single {
        input: FloatBuffer,
        output: FloatBuffer,
    },
    Double {
        input: DoubleBuffer,
        output: DoubleBuffer,
    },
}

impl Bridge {
    fn allocate(precision: Precision, channels: usize, frames: usize) -> Self {
        match precision {
            Precision::Double => Bridge::Double {
                input: DoubleBuffer::allocate(channels, frames),
                output: DoubleBuffer::allocate(channels, frames),
            },
            _ => Bridge::Single {
                input: FloatBuffer::allocate(channels, frames),
                output: FloatBuffer::allocate(channels, frames),
            },
        }
    }

    fn frames(&self) -> usize {
        match self {
            Bridge::Single { input, .. } => input.frames(),
            Bridge::Double { input, .. } => input.frames(),
        }
    }

    fn release(self) {
        match self {
            Bridge::Single { input, output } => {
                input.release();
                output.release();
            }
            Bridge::Double { input, output } => {
                input.release();
                output.release();
            }
        }
    }

    fn process<B: HostBuffer + ?Sized>(
        &mut self,
        plugin: &mut Plugin,
        block: &B,
        scratch: &mut AudioBuffer,
    ) -> Result<()> {
        match self {
            Bridge::Single { input, output } => {
                input.copy_from(block);
                plugin.process_f32(input, output)?;
                output.copy_to(scratch);
            }
            Bridge::Double { input, output } => {
                input.copy_from(block);
                plugin.process_f64(input, output)?;
                output.copy_to(scratch);
            }
        }
        Ok(())
    }
}

/// Owns one plugin and runs it over a stream of blocks, replacing each block
/// with the plugin's output.
pub struct Processor {
    plugin: Plugin,
    transport: Arc<Transport>,
    precision: Precision,
    channels: usize,
    bridge_channels: usize,
    bridge: Option<Bridge>,
    scratch: AudioBuffer,
    reallocations: usize,
}

impl Processor {
    /// Creates, opens, configures and starts a plugin from `module`.
    pub fn new(module: &Module, config: &ProcessorConfig) -> Result<Self> {
        let transport = Arc::new(Transport::new(config.sample_rate));
        let handler = Arc::clone(&transport);
        let mut plugin = module.load(move |effect, opcode, index, value, ptr, opt| {
            handler.handle(effect, opcode, index, value, ptr, opt)
        })?;

        match Self::prepare(&mut plugin, config) {
            Ok((precision, bridge_channels)) => Ok(Self {
                plugin,
                transport,
                precision,
                channels: config.channels,
                bridge_channels,
                bridge: None,
                scratch: AudioBuffer::new(config.channels, 0),
                reallocations: 0,
            }),
            Err(err) => {
                if let Err(close_err) = plugin.close() {
                    warn!(
                        path = %plugin.path().display(),
                        err = %close_err,
                        "failed to close plugin after start-up error"
                    );
                }
                Err(err)
            }
        }
    }

    fn prepare(plugin: &mut Plugin, config: &ProcessorConfig) -> Result<(Precision, usize)> {
        plugin.open()?;

        let effect = plugin.effect()?;
        let precision = match config.precision {
            Precision::Auto if effect.can_process_f64() => Precision::Double,
            Precision::Auto | Precision::Single if effect.can_process_f32() => Precision::Single,
            Precision::Double if effect.can_process_f64() => Precision::Double,
            Precision::Double => {
                return Err(HostError::UnsupportedPrecision {
                    path: plugin.path().to_path_buf(),
                    precision: "double",
                })
            }
            _ => {
                return Err(HostError::UnsupportedPrecision {
                    path: plugin.path().to_path_buf(),
                    precision: "single",
                })
            }
        };
        let bridge_channels = bridge_width(effect, config.channels);

        plugin.set_sample_rate(config.sample_rate)?;
        let mut input = SpeakerArrangement::for_channels(config.channels);
        let mut output = SpeakerArrangement::for_channels(config.channels);
        plugin.set_speaker_arrangement(&mut input, &mut output)?;
        plugin.set_process_precision(precision == Precision::Double)?;

        for request in &config.dispatch_before_start {
            plugin.dispatch(
                request.opcode(),
                request.index,
                request.value,
                ptr::null_mut(),
                request.opt,
            )?;
        }

        plugin.start()?;
        debug!(
            path = %plugin.path().display(),
            ?precision,
            channels = config.channels,
            sample_rate = config.sample_rate,
            "processor started"
        );
        Ok((precision, bridge_channels))
    }

    /// Runs the plugin over `block` and writes the result back into it.
    ///
    /// A change in frame count renegotiates the block size and reallocates the
    /// staging buffers before the plugin sees the block.
    pub fn process<B: HostBuffer + ?Sized>(&mut self, block: &mut B) -> Result<()> {
        if self.plugin.state() != PluginState::Started {
            return Err(HostError::transition(
                "process",
                self.plugin.state(),
                self.plugin.path(),
            ));
        }

        let frames = block.frames();
        if self.bridge.as_ref().map(Bridge::frames) != Some(frames) {
            self.renegotiate(frames)?;
        }

        let Some(bridge) = self.bridge.as_mut() else {
            return Ok(());
        };
        bridge.process(&mut self.plugin, &*block, &mut self.scratch)?;
        self.transport.advance(frames);
        self.scratch.copy_to(block);
        Ok(())
    }

    fn renegotiate(&mut self, frames: usize) -> Result<()> {
        self.transport.block_size.store(frames, Ordering::Relaxed);
        self.plugin.set_buffer_size(frames)?;
        self.invalidate_bridge();
        self.bridge = Some(Bridge::allocate(
            self.precision,
            self.bridge_channels,
            frames,
        ));
        self.scratch.resize(self.channels, frames);
        self.reallocations += 1;
        debug!(frames, channels = self.bridge_channels, "reallocated bridge buffers");
        Ok(())
    }

    /// Reissues the sample rate mid-session. Host callbacks answer the new
    /// rate at once and the next block reallocates the staging buffers.
    pub fn set_sample_rate(&mut self, sample_rate: f64) -> Result<()> {
        self.plugin.set_sample_rate(sample_rate)?;
        self.transport.set_sample_rate(sample_rate);
        self.invalidate_bridge();
        debug!(sample_rate, "processor sample rate changed");
        Ok(())
    }

    /// Announces a new pipeline channel count to the plugin. The next block
    /// reallocates the staging buffers for the new width.
    pub fn set_channels(&mut self, channels: usize) -> Result<()> {
        let mut input = SpeakerArrangement::for_channels(channels);
        let mut output = SpeakerArrangement::for_channels(channels);
        self.plugin.set_speaker_arrangement(&mut input, &mut output)?;
        self.bridge_channels = bridge_width(self.plugin.effect()?, channels);
        self.channels = channels;
        self.invalidate_bridge();
        debug!(channels, "processor channel count changed");
        Ok(())
    }

    fn invalidate_bridge(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            bridge.release();
        }
    }

    /// Ends the stream: stops the plugin and releases the staging buffers.
    pub fn flush(&mut self) -> Result<()> {
        self.plugin.stop()?;
        self.invalidate_bridge();
        Ok(())
    }

    /// Restarts a flushed stream. The next block allocates fresh buffers.
    pub fn resume(&mut self) -> Result<()> {
        self.plugin.start()
    }

    /// Stops if needed and closes the plugin.
    pub fn close(mut self) -> Result<()> {
        if self.plugin.state() == PluginState::Started {
            self.flush()?;
        }
        self.plugin.close()
    }

    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Precision chosen for the plugin, never [`Precision::Auto`].
    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sample_rate(&self) -> f64 {
        self.transport.sample_rate()
    }

    /// Block size currently negotiated, `None` before the first block or after flush.
    pub fn block_size(&self) -> Option<usize> {
        self.bridge.as_ref().map(Bridge::frames)
    }

    pub fn position(&self) -> i64 {
        self.transport.position()
    }

    /// How many times the staging buffers were allocated.
    pub fn reallocations(&self) -> usize {
        self.reallocations
    }
}

/// Staging width: wide enough for the pipeline and for every channel the
/// plugin declares, so the plugin never indexes past the pointer arrays.
fn bridge_width(effect: &Effect, channels: usize) -> usize {
    channels.max(effect.num_inputs()).max(effect.num_outputs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_position_and_fixed_meter() {
        let transport = Transport::new(48_000.0);
        transport.advance(512);
        transport.advance(256);

        let time = unsafe { *transport.snapshot() };
        assert_eq!(time.sample_pos, 768.0);
        assert_eq!(time.sample_rate, 48_000.0);
        assert_eq!(time.time_sig_numerator, 4);
        assert_eq!(time.time_sig_denominator, 4);
        assert!(time.nano_seconds > 0.0);
        assert_eq!(time.flags, TimeInfoFlags::TIME_SIG_VALID);
        assert!(!time.flags.contains(TimeInfoFlags::NANOS_VALID));
    }

    #[test]
    fn snapshot_storage_is_stable() {
        let transport = Transport::new(44_100.0);
        let first = transport.snapshot();
        transport.advance(64);
        let second = transport.snapshot();
        assert_eq!(first, second);
        assert_eq!(unsafe { (*first).sample_pos }, 64.0);
    }

    #[test]
    fn each_thread_gets_its_own_snapshot() {
        let transport = Arc::new(Transport::new(48_000.0));
        let local = transport.snapshot() as usize;
        assert_eq!(transport.snapshot() as usize, local);

        let remote = {
            let transport = Arc::clone(&transport);
            thread::spawn(move || transport.snapshot() as usize)
                .join()
                .unwrap()
        };
        assert_ne!(remote, local);

        // The other thread's query did not touch this thread's record.
        transport.advance(128);
        let remote_time = unsafe { *(remote as *const TimeInfo) };
        assert_eq!(remote_time.sample_pos, 0.0);
        assert_eq!(unsafe { (*transport.snapshot()).sample_pos }, 128.0);
    }

    #[test]
    fn sample_rate_updates_are_visible_to_callbacks() {
        let transport = Transport::new(44_100.0);
        transport.set_sample_rate(96_000.0);
        assert_eq!(transport.sample_rate(), 96_000.0);
        assert_eq!(unsafe { (*transport.snapshot()).sample_rate }, 96_000.0);
    }

    #[test]
    fn bridge_follows_precision() {
        let single = Bridge::allocate(Precision::Single, 2, 128);
        assert!(matches!(single, Bridge::Single { .. }));
        assert_eq!(single.frames(), 128);
        single.release();

        let double = Bridge::allocate(Precision::Double, 2, 64);
        assert!(matches!(double, Bridge::Double { .. }));
        assert_eq!(double.frames(), 64);
        double.release();
    }
}

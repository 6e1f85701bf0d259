//! Planar staging buffers handed to the plugin process calls.
//!
//! The VST2 process ABI takes one pointer per channel. [`PlanarBuffer`] owns one
//! contiguous block per channel plus the pointer array referencing them, and
//! converts to and from the host's [`HostBuffer`] representation. Shape
//! mismatches between the two sides are clamped to the smaller dimension,
//! never reported.

use std::fmt;

use crate::audio_buffer::HostBuffer;

/// Element type of a planar buffer: `f32` for `processReplacing`, `f64` for
/// `processDoubleReplacing`.
pub trait Sample: Copy + Default + PartialEq + fmt::Debug + Send + 'static {
    const PRECISION: &'static str;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl Sample for f32 {
    const PRECISION: &'static str = "single";

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        f64::from(self)
    }
}

impl Sample for f64 {
    const PRECISION: &'static str = "double";

    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// Per-channel sample blocks laid out the way the plugin ABI expects.
///
/// Memory is released exactly once, either through [`PlanarBuffer::release`]
/// or on drop; `release` consumes the buffer so it cannot be touched again.
pub struct PlanarBuffer<T: Sample> {
    channels: Vec<Box<[T]>>,
    pointers: Vec<*mut T>,
    frames: usize,
}

/// Staging buffer for double precision plugins.
pub type DoubleBuffer = PlanarBuffer<f64>;
/// Staging buffer for plugins without double precision support.
pub type FloatBuffer = PlanarBuffer<f32>;

// The pointer array only references blocks owned by the same value.
unsafe impl<T: Sample> Send for PlanarBuffer<T> {}

impl<T: Sample> PlanarBuffer<T> {
    /// Reserves `channels` blocks of `frames` silent samples each.
    pub fn allocate(channels: usize, frames: usize) -> Self {
        let mut channels: Vec<Box<[T]>> = (0..channels)
            .map(|_| vec![T::default(); frames].into_boxed_slice())
            .collect();
        let pointers = channels
            .iter_mut()
            .map(|channel| channel.as_mut_ptr())
            .collect();
        Self {
            channels,
            pointers,
            frames,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, index: usize) -> &[T] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [T] {
        &mut self.channels[index]
    }

    /// Fills the buffer from `src`, touching only `min(channels) x min(frames)`
    /// samples; the rest of this buffer keeps its previous content.
    pub fn copy_from<B: HostBuffer + ?Sized>(&mut self, src: &B) {
        let channels = self.channels.len().min(src.num_channels());
        let frames = self.frames.min(src.frames());
        for (index, channel) in self.channels.iter_mut().take(channels).enumerate() {
            for (frame, sample) in channel.iter_mut().take(frames).enumerate() {
                *sample = T::from_f64(src.sample(index, frame));
            }
        }
    }

    /// Writes the buffer into `dst` with the same clamp as [`Self::copy_from`].
    pub fn copy_to<B: HostBuffer + ?Sized>(&self, dst: &mut B) {
        let channels = self.channels.len().min(dst.num_channels());
        let frames = self.frames.min(dst.frames());
        for (index, channel) in self.channels.iter().take(channels).enumerate() {
            for (frame, sample) in channel.iter().take(frames).enumerate() {
                dst.set_sample(index, frame, sample.to_f64());
            }
        }
    }

    /// Pointer array for the native process call, one entry per channel.
    ///
    /// The entries are refreshed from the owned blocks on every call so that
    /// no pointer outlives a later mutable borrow of a channel.
    pub fn as_mut_ptr_array(&mut self) -> *mut *mut T {
        for (pointer, channel) in self.pointers.iter_mut().zip(self.channels.iter_mut()) {
            *pointer = channel.as_mut_ptr();
        }
        self.pointers.as_mut_ptr()
    }

    /// Frees every channel block.
    pub fn release(self) {
        drop(self);
    }
}

impl<T: Sample> fmt::Debug for PlanarBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanarBuffer")
            .field("precision", &T::PRECISION)
            .field("channels", &self.channels.len())
            .field("frames", &self.frames)
            .finish()
    }
}

use std::ops::{Index, IndexMut};

/// Minimal view of a host-side multi-channel signal.
///
/// This is all the bridge needs from the surrounding pipeline: shape queries
/// and sample access by channel and frame index. Implementations may be
/// backed by any layout.
pub trait HostBuffer {
    fn num_channels(&self) -> usize;
    fn frames(&self) -> usize;
    fn sample(&self, channel: usize, frame: usize) -> f64;
    fn set_sample(&mut self, channel: usize, frame: usize, value: f64);
}

/// Channel-major `f64` signal used as the pipeline container and as the
/// processor's scratch output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f64>>,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a buffer with the provided number of channels and frames,
    /// initialised to silence.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channels],
            frames,
        }
    }

    /// Builds a buffer from per-channel sample vectors. Shorter channels are
    /// padded with silence up to the longest one.
    pub fn from_channels(mut channels: Vec<Vec<f64>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in &mut channels {
            channel.resize(frames, 0.0);
        }
        Self { channels, frames }
    }

    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Clears the contents of the buffer back to silence.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Resizes the buffer while preserving existing contents where
    /// possible. New samples are initialised to silence.
    pub fn resize(&mut self, channels: usize, frames: usize) {
        if self.channels.len() != channels {
            self.channels.resize_with(channels, Vec::new);
        }
        for channel in &mut self.channels {
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    pub fn channel_slices(&self) -> impl Iterator<Item = &[f64]> {
        self.channels.iter().map(|channel| channel.as_slice())
    }

    /// Writes this buffer over `dst`, limited to the smaller channel count and
    /// frame count of the two. Samples of `dst` outside that region are left
    /// as they were.
    pub fn copy_to<B: HostBuffer + ?Sized>(&self, dst: &mut B) {
        let channels = self.channels().min(dst.num_channels());
        let frames = self.frames.min(dst.frames());
        for (index, channel) in self.channels.iter().take(channels).enumerate() {
            for (frame, sample) in channel.iter().take(frames).enumerate() {
                dst.set_sample(index, frame, *sample);
            }
        }
    }
}

impl HostBuffer for AudioBuffer {
    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn frames(&self) -> usize {
        self.frames
    }

    fn sample(&self, channel: usize, frame: usize) -> f64 {
        self.channels[channel][frame]
    }

    fn set_sample(&mut self, channel: usize, frame: usize, value: f64) {
        self.channels[channel][frame] = value;
    }
}

impl Index<usize> for AudioBuffer {
    type Output = [f64];

    fn index(&self, index: usize) -> &Self::Output {
        self.channels[index].as_slice()
    }
}

impl IndexMut<usize> for AudioBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.channels[index].as_mut_slice()
    }
}

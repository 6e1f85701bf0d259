use core::ops::{BitOr, BitOrAssign};

/// Transport state at the start of the block being processed.
///
/// Returned by pointer in answer to [`crate::HostOpcode::GET_TIME`]; `flags`
/// says which of the optional fields carry meaning.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeInfo {
    /// Current position in audio samples.
    pub sample_pos: f64,
    /// Current sample rate in Hz.
    pub sample_rate: f64,
    /// System time in nanoseconds.
    pub nano_seconds: f64,
    /// Musical position in quarter notes.
    pub ppq_pos: f64,
    /// Tempo in BPM.
    pub tempo: f64,
    /// Last bar start position in quarter notes.
    pub bar_start_pos: f64,
    /// Cycle start (left locator) in quarter notes.
    pub cycle_start_pos: f64,
    /// Cycle end (right locator) in quarter notes.
    pub cycle_end_pos: f64,
    pub time_sig_numerator: i32,
    pub time_sig_denominator: i32,
    /// SMPTE offset in subframes (1/80 of a frame).
    pub smpte_offset: i32,
    pub smpte_frame_rate: SmpteFrameRate,
    /// MIDI clock resolution (24 per quarter note), may be negative.
    pub samples_to_next_clock: i32,
    pub flags: TimeInfoFlags,
}

/// Validity and transport bits of [`TimeInfo::flags`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeInfoFlags(pub i32);

impl TimeInfoFlags {
    pub const TRANSPORT_CHANGED: Self = Self(1 << 0);
    pub const TRANSPORT_PLAYING: Self = Self(1 << 1);
    pub const TRANSPORT_CYCLE_ACTIVE: Self = Self(1 << 2);
    pub const TRANSPORT_RECORDING: Self = Self(1 << 3);
    pub const AUTOMATION_WRITING: Self = Self(1 << 6);
    pub const AUTOMATION_READING: Self = Self(1 << 7);
    pub const NANOS_VALID: Self = Self(1 << 8);
    pub const PPQ_POS_VALID: Self = Self(1 << 9);
    pub const TEMPO_VALID: Self = Self(1 << 10);
    pub const BARS_VALID: Self = Self(1 << 11);
    pub const CYCLE_POS_VALID: Self = Self(1 << 12);
    pub const TIME_SIG_VALID: Self = Self(1 << 13);
    pub const SMPTE_VALID: Self = Self(1 << 14);
    pub const CLOCK_VALID: Self = Self(1 << 15);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TimeInfoFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TimeInfoFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Frame rate of [`TimeInfo::smpte_offset`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SmpteFrameRate(pub i32);

impl SmpteFrameRate {
    pub const FPS_24: Self = Self(0);
    pub const FPS_25: Self = Self(1);
    pub const FPS_2997: Self = Self(2);
    pub const FPS_30: Self = Self(3);
    pub const FPS_2997_DROP: Self = Self(4);
    pub const FPS_30_DROP: Self = Self(5);
    pub const FILM_16MM: Self = Self(6);
    pub const FILM_35MM: Self = Self(7);
    pub const FPS_239: Self = Self(10);
    pub const FPS_249: Self = Self(11);
    pub const FPS_599: Self = Self(12);
    pub const FPS_60: Self = Self(13);
}

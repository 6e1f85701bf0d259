use core::fmt;

use crate::MAX_NAME_LEN;

/// Named channel layout carried in [`SpeakerArrangement::arrangement_type`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpeakerArrangementType(pub i32);

impl SpeakerArrangementType {
    pub const USER_DEFINED: Self = Self(-2);
    pub const EMPTY: Self = Self(-1);
    /// M
    pub const MONO: Self = Self(0);
    /// L R
    pub const STEREO: Self = Self(1);
    /// Ls Rs
    pub const STEREO_SURROUND: Self = Self(2);
    /// Lc Rc
    pub const STEREO_CENTER: Self = Self(3);
    /// Sl Sr
    pub const STEREO_SIDE: Self = Self(4);
    /// C Lfe
    pub const STEREO_C_LFE: Self = Self(5);
    /// L R C
    pub const CINE_30: Self = Self(6);
    /// L R S
    pub const MUSIC_30: Self = Self(7);
    /// L R C Lfe
    pub const CINE_31: Self = Self(8);
    /// L R Lfe S
    pub const MUSIC_31: Self = Self(9);
    /// L R C S (LCRS)
    pub const CINE_40: Self = Self(10);
    /// L R Ls Rs (Quadro)
    pub const MUSIC_40: Self = Self(11);
    /// L R C Lfe S (LCRS+Lfe)
    pub const CINE_41: Self = Self(12);
    /// L R Lfe Ls Rs (Quadro+Lfe)
    pub const MUSIC_41: Self = Self(13);
    /// L R C Ls Rs
    pub const SURROUND_50: Self = Self(14);
    /// L R C Lfe Ls Rs
    pub const SURROUND_51: Self = Self(15);
    /// L R C Ls Rs Cs
    pub const CINE_60: Self = Self(16);
    /// L R Ls Rs Sl Sr
    pub const MUSIC_60: Self = Self(17);
    /// L R C Lfe Ls Rs Cs
    pub const CINE_61: Self = Self(18);
    /// L R Lfe Ls Rs Sl Sr
    pub const MUSIC_61: Self = Self(19);
    /// L R C Ls Rs Lc Rc
    pub const CINE_70: Self = Self(20);
    /// L R C Ls Rs Sl Sr
    pub const MUSIC_70: Self = Self(21);
    /// L R C Lfe Ls Rs Lc Rc
    pub const CINE_71: Self = Self(22);
    /// L R C Lfe Ls Rs Sl Sr
    pub const MUSIC_71: Self = Self(23);
    /// L R C Ls Rs Lc Rc Cs
    pub const CINE_80: Self = Self(24);
    /// L R C Ls Rs Cs Sl Sr
    pub const MUSIC_80: Self = Self(25);
    /// L R C Lfe Ls Rs Lc Rc Cs
    pub const CINE_81: Self = Self(26);
    /// L R C Lfe Ls Rs Cs Sl Sr
    pub const MUSIC_81: Self = Self(27);
    /// L R C Lfe Ls Rs Tfl Tfc Tfr Trl Trr Lfe2
    pub const SURROUND_102: Self = Self(28);

    /// Layout the host announces for a plain channel count.
    pub const fn for_channels(channels: usize) -> Self {
        match channels {
            0 => Self::EMPTY,
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self::MUSIC_30,
            4 => Self::MUSIC_40,
            5 => Self::SURROUND_50,
            6 => Self::MUSIC_60,
            7 => Self::MUSIC_70,
            8 => Self::MUSIC_80,
            _ => Self::USER_DEFINED,
        }
    }
}

impl fmt::Debug for SpeakerArrangementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpeakerArrangementType({})", self.0)
    }
}

/// Role of a single speaker.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SpeakerType(pub i32);

impl SpeakerType {
    pub const UNDEFINED: Self = Self(0x7fff_ffff);
    pub const M: Self = Self(0);
    pub const L: Self = Self(1);
    pub const R: Self = Self(2);
    pub const C: Self = Self(3);
    pub const LFE: Self = Self(4);
    pub const LS: Self = Self(5);
    pub const RS: Self = Self(6);
    pub const LC: Self = Self(7);
    pub const RC: Self = Self(8);
    pub const S: Self = Self(9);
    /// Center of surround, same slot as [`SpeakerType::S`].
    pub const CS: Self = Self::S;
    pub const SL: Self = Self(10);
    pub const SR: Self = Self(11);
    pub const TM: Self = Self(12);
    pub const TFL: Self = Self(13);
    pub const TFC: Self = Self(14);
    pub const TFR: Self = Self(15);
    pub const TRL: Self = Self(16);
    pub const TRC: Self = Self(17);
    pub const TRR: Self = Self(18);
    pub const LFE2: Self = Self(19);
}

/// Per-channel speaker descriptor.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SpeakerProperties {
    /// Radians, -pi..pi.
    pub azimuth: f32,
    /// Radians, -pi/2..pi/2.
    pub elevation: f32,
    /// Meters.
    pub radius: f32,
    pub reserved: f32,
    pub name: [u8; MAX_NAME_LEN],
    pub speaker_type: SpeakerType,
    pub future: [u8; 28],
}

impl SpeakerProperties {
    pub const fn undefined() -> Self {
        Self {
            azimuth: 0.0,
            elevation: 0.0,
            radius: 0.0,
            reserved: 0.0,
            name: [0; MAX_NAME_LEN],
            speaker_type: SpeakerType::UNDEFINED,
            future: [0; 28],
        }
    }
}

impl Default for SpeakerProperties {
    fn default() -> Self {
        Self::undefined()
    }
}

impl fmt::Debug for SpeakerProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeakerProperties")
            .field("azimuth", &self.azimuth)
            .field("elevation", &self.elevation)
            .field("radius", &self.radius)
            .field("speaker_type", &self.speaker_type)
            .finish()
    }
}

/// Channel geometry exchanged through [`crate::EffectOpcode::SET_SPEAKER_ARRANGEMENT`].
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct SpeakerArrangement {
    pub arrangement_type: SpeakerArrangementType,
    pub num_channels: i32,
    /// Only the first `min(num_channels, 8)` entries are meaningful.
    pub speakers: [SpeakerProperties; 8],
}

impl SpeakerArrangement {
    /// Geometry derived from the channel count alone, every speaker left undefined.
    pub fn for_channels(channels: usize) -> Self {
        Self {
            arrangement_type: SpeakerArrangementType::for_channels(channels),
            num_channels: i32::try_from(channels).unwrap_or(i32::MAX),
            speakers: [SpeakerProperties::undefined(); 8],
        }
    }
}

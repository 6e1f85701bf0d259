use core::ffi::c_void;
use core::fmt;
use core::ops::{BitAnd, BitOr, BitOrAssign};

/// Magic number stored in [`AEffect::magic`] by every conforming plug-in (`'VstP'`).
pub const EFFECT_MAGIC: i32 = i32::from_be_bytes(*b"VstP");

/// Host to plug-in dispatch: `(effect, opcode, index, value, ptr, opt) -> result`.
pub type DispatcherProc =
    unsafe extern "C" fn(*mut AEffect, i32, i32, isize, *mut c_void, f32) -> isize;
/// Single precision replacing (and the deprecated accumulating) process call.
pub type ProcessProc = unsafe extern "C" fn(*mut AEffect, *mut *mut f32, *mut *mut f32, i32);
/// Double precision replacing process call.
pub type ProcessDoubleProc =
    unsafe extern "C" fn(*mut AEffect, *mut *mut f64, *mut *mut f64, i32);
pub type SetParameterProc = unsafe extern "C" fn(*mut AEffect, i32, f32);
pub type GetParameterProc = unsafe extern "C" fn(*mut AEffect, i32) -> f32;
/// Plug-in to host callback, same argument shape as [`DispatcherProc`].
pub type HostCallbackProc =
    unsafe extern "C" fn(*mut AEffect, i32, i32, isize, *mut c_void, f32) -> isize;
/// Signature of the exported entry function (`VSTPluginMain`).
pub type PluginMain = unsafe extern "C" fn(HostCallbackProc) -> *mut AEffect;

/// The native effect record shared between host and plug-in.
#[repr(C)]
pub struct AEffect {
    pub magic: i32,
    pub dispatcher: Option<DispatcherProc>,
    /// Accumulating process, deprecated since 2.4.
    pub process: Option<ProcessProc>,
    pub set_parameter: Option<SetParameterProc>,
    pub get_parameter: Option<GetParameterProc>,
    pub num_programs: i32,
    pub num_params: i32,
    pub num_inputs: i32,
    pub num_outputs: i32,
    /// Raw [`EffectFlags`] bits.
    pub flags: i32,
    pub reserved1: isize,
    pub reserved2: isize,
    pub initial_delay: i32,
    pub real_qualities: i32,
    pub off_qualities: i32,
    pub io_ratio: f32,
    /// Plug-in private pointer.
    pub object: *mut c_void,
    /// Host private pointer.
    pub user: *mut c_void,
    pub unique_id: i32,
    pub version: i32,
    pub process_replacing: Option<ProcessProc>,
    pub process_double_replacing: Option<ProcessDoubleProc>,
    pub future: [u8; 56],
}

impl AEffect {
    /// A record carrying the magic number and nothing else.
    pub const fn new() -> Self {
        Self {
            magic: EFFECT_MAGIC,
            dispatcher: None,
            process: None,
            set_parameter: None,
            get_parameter: None,
            num_programs: 0,
            num_params: 0,
            num_inputs: 0,
            num_outputs: 0,
            flags: 0,
            reserved1: 0,
            reserved2: 0,
            initial_delay: 0,
            real_qualities: 0,
            off_qualities: 0,
            io_ratio: 1.0,
            object: core::ptr::null_mut(),
            user: core::ptr::null_mut(),
            unique_id: 0,
            version: 0,
            process_replacing: None,
            process_double_replacing: None,
            future: [0; 56],
        }
    }

    pub fn flags(&self) -> EffectFlags {
        EffectFlags::from_bits(self.flags)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic == EFFECT_MAGIC
    }
}

impl Default for AEffect {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability bits advertised in [`AEffect::flags`].
///
/// Several bits are usually set at once, so membership must be tested with
/// [`EffectFlags::contains`] rather than equality.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EffectFlags(i32);

impl EffectFlags {
    pub const HAS_EDITOR: Self = Self(1 << 0);
    /// Deprecated since 2.4.
    pub const HAS_CLIP: Self = Self(1 << 1);
    /// Deprecated since 2.4.
    pub const HAS_VU: Self = Self(1 << 2);
    /// Deprecated since 2.4.
    pub const CAN_MONO: Self = Self(1 << 3);
    /// Supports `processReplacing` (single precision).
    pub const CAN_REPLACING: Self = Self(1 << 4);
    pub const PROGRAM_CHUNKS: Self = Self(1 << 5);
    pub const IS_SYNTH: Self = Self(1 << 8);
    pub const NO_SOUND_IN_STOP: Self = Self(1 << 9);
    /// Deprecated since 2.4.
    pub const EXT_IS_ASYNC: Self = Self(1 << 10);
    /// Deprecated since 2.4.
    pub const EXT_HAS_BUFFER: Self = Self(1 << 11);
    /// Supports `processDoubleReplacing`.
    pub const CAN_DOUBLE_REPLACING: Self = Self(1 << 12);

    const NAMES: [(Self, &'static str); 11] = [
        (Self::HAS_EDITOR, "HAS_EDITOR"),
        (Self::HAS_CLIP, "HAS_CLIP"),
        (Self::HAS_VU, "HAS_VU"),
        (Self::CAN_MONO, "CAN_MONO"),
        (Self::CAN_REPLACING, "CAN_REPLACING"),
        (Self::PROGRAM_CHUNKS, "PROGRAM_CHUNKS"),
        (Self::IS_SYNTH, "IS_SYNTH"),
        (Self::NO_SOUND_IN_STOP, "NO_SOUND_IN_STOP"),
        (Self::EXT_IS_ASYNC, "EXT_IS_ASYNC"),
        (Self::EXT_HAS_BUFFER, "EXT_HAS_BUFFER"),
        (Self::CAN_DOUBLE_REPLACING, "CAN_DOUBLE_REPLACING"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Keeps unknown bits so they survive a round trip through the host.
    pub const fn from_bits(bits: i32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for EffectFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EffectFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EffectFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for EffectFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        let mut known = 0;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
                known |= flag.0;
            }
        }
        let unknown = self.0 & !known;
        if unknown != 0 {
            set.entry(&format_args!("{unknown:#x}"));
        }
        set.finish()
    }
}

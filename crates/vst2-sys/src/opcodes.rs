use core::fmt;

macro_rules! opcode_table {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        $( $(#[$cmeta:meta])* $konst:ident = $value:literal, )*
    ) => {
        $(#[$meta])*
        #[repr(transparent)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i32);

        impl $name {
            $( $(#[$cmeta])* pub const $konst: Self = Self($value); )*

            /// Symbolic name of a published opcode, `None` for anything else.
            pub const fn name(self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some(stringify!($konst)), )*
                    _ => None,
                }
            }
        }

        impl From<i32> for $name {
            fn from(value: i32) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i32 {
            fn from(opcode: $name) -> i32 {
                opcode.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self.name() {
                    Some(name) => write!(f, "{}::{}", stringify!($name), name),
                    None => write!(f, "{}({})", stringify!($name), self.0),
                }
            }
        }
    };
}

opcode_table! {
    /// Requests sent by the host to the plug-in dispatcher.
    pub struct EffectOpcode;
    OPEN = 0,
    CLOSE = 1,
    SET_PROGRAM = 2,
    GET_PROGRAM = 3,
    SET_PROGRAM_NAME = 4,
    GET_PROGRAM_NAME = 5,
    GET_PARAM_LABEL = 6,
    GET_PARAM_DISPLAY = 7,
    GET_PARAM_NAME = 8,
    /// Deprecated.
    GET_VU = 9,
    /// Sample rate travels in `opt`.
    SET_SAMPLE_RATE = 10,
    /// Block size travels in `value`.
    SET_BLOCK_SIZE = 11,
    /// `value` 1 resumes, 0 suspends.
    MAINS_CHANGED = 12,
    EDIT_GET_RECT = 13,
    EDIT_OPEN = 14,
    EDIT_CLOSE = 15,
    EDIT_DRAW = 16,
    EDIT_MOUSE = 17,
    EDIT_KEY = 18,
    EDIT_IDLE = 19,
    EDIT_TOP = 20,
    EDIT_SLEEP = 21,
    IDENTIFY = 22,
    GET_CHUNK = 23,
    SET_CHUNK = 24,
    PROCESS_EVENTS = 25,
    CAN_BE_AUTOMATED = 26,
    STRING_TO_PARAMETER = 27,
    GET_NUM_PROGRAM_CATEGORIES = 28,
    GET_PROGRAM_NAME_INDEXED = 29,
    COPY_PROGRAM = 30,
    CONNECT_INPUT = 31,
    CONNECT_OUTPUT = 32,
    GET_INPUT_PROPERTIES = 33,
    GET_OUTPUT_PROPERTIES = 34,
    GET_PLUG_CATEGORY = 35,
    GET_CURRENT_POSITION = 36,
    GET_DESTINATION_BUFFER = 37,
    OFFLINE_NOTIFY = 38,
    OFFLINE_PREPARE = 39,
    OFFLINE_RUN = 40,
    PROCESS_VAR_IO = 41,
    /// Input arrangement pointer in `value`, output arrangement in `ptr`.
    SET_SPEAKER_ARRANGEMENT = 42,
    SET_BLOCK_SIZE_AND_SAMPLE_RATE = 43,
    SET_BYPASS = 44,
    GET_EFFECT_NAME = 45,
    GET_ERROR_TEXT = 46,
    GET_VENDOR_STRING = 47,
    GET_PRODUCT_STRING = 48,
    GET_VENDOR_VERSION = 49,
    VENDOR_SPECIFIC = 50,
    CAN_DO = 51,
    GET_TAIL_SIZE = 52,
    IDLE = 53,
    GET_ICON = 54,
    SET_VIEW_POSITION = 55,
    GET_PARAMETER_PROPERTIES = 56,
    KEYS_REQUIRED = 57,
    GET_VST_VERSION = 58,
    EDIT_KEY_DOWN = 59,
    EDIT_KEY_UP = 60,
    SET_EDIT_KNOB_MODE = 61,
    GET_MIDI_PROGRAM_NAME = 62,
    GET_CURRENT_MIDI_PROGRAM = 63,
    GET_MIDI_PROGRAM_CATEGORY = 64,
    HAS_MIDI_PROGRAMS_CHANGED = 65,
    GET_MIDI_KEY_NAME = 66,
    BEGIN_SET_PROGRAM = 67,
    END_SET_PROGRAM = 68,
    GET_SPEAKER_ARRANGEMENT = 69,
    SHELL_GET_NEXT_PLUGIN = 70,
    START_PROCESS = 71,
    STOP_PROCESS = 72,
    SET_TOTAL_SAMPLE_TO_PROCESS = 73,
    SET_PAN_LAW = 74,
    BEGIN_LOAD_BANK = 75,
    BEGIN_LOAD_PROGRAM = 76,
    /// `value` 0 selects single, 1 double precision.
    SET_PROCESS_PRECISION = 77,
    GET_NUM_MIDI_INPUT_CHANNELS = 78,
    GET_NUM_MIDI_OUTPUT_CHANNELS = 79,
}

opcode_table! {
    /// Requests sent by the plug-in through the host callback.
    pub struct HostOpcode;
    AUTOMATE = 0,
    /// Answered before the effect is known to the host.
    VERSION = 1,
    CURRENT_ID = 2,
    IDLE = 3,
    PIN_CONNECTED = 4,
    WANT_MIDI = 6,
    GET_TIME = 7,
    PROCESS_EVENTS = 8,
    SET_TIME = 9,
    TEMPO_AT = 10,
    GET_NUM_AUTOMATABLE_PARAMETERS = 11,
    GET_PARAMETER_QUANTIZATION = 12,
    IO_CHANGED = 13,
    NEED_IDLE = 14,
    SIZE_WINDOW = 15,
    GET_SAMPLE_RATE = 16,
    GET_BLOCK_SIZE = 17,
    GET_INPUT_LATENCY = 18,
    GET_OUTPUT_LATENCY = 19,
    GET_PREVIOUS_PLUG = 20,
    GET_NEXT_PLUG = 21,
    WILL_REPLACE_OR_ACCUMULATE = 22,
    GET_CURRENT_PROCESS_LEVEL = 23,
    GET_AUTOMATION_STATE = 24,
    OFFLINE_START = 25,
    OFFLINE_READ = 26,
    OFFLINE_WRITE = 27,
    OFFLINE_GET_CURRENT_PASS = 28,
    OFFLINE_GET_CURRENT_META_PASS = 29,
    SET_OUTPUT_SAMPLE_RATE = 30,
    GET_OUTPUT_SPEAKER_ARRANGEMENT = 31,
    GET_VENDOR_STRING = 32,
    GET_PRODUCT_STRING = 33,
    GET_VENDOR_VERSION = 34,
    VENDOR_SPECIFIC = 35,
    SET_ICON = 36,
    CAN_DO = 37,
    GET_LANGUAGE = 38,
    OPEN_WINDOW = 39,
    CLOSE_WINDOW = 40,
    GET_DIRECTORY = 41,
    UPDATE_DISPLAY = 42,
    BEGIN_EDIT = 43,
    END_EDIT = 44,
    OPEN_FILE_SELECTOR = 45,
    CLOSE_FILE_SELECTOR = 46,
    EDIT_FILE = 47,
    GET_CHUNK_FILE = 48,
    GET_INPUT_SPEAKER_ARRANGEMENT = 49,
}

/// Answer to [`HostOpcode::GET_CURRENT_PROCESS_LEVEL`]: which thread the host is on.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessLevel {
    Unknown = 0,
    /// GUI thread.
    User = 1,
    /// Audio thread, where process is called.
    Realtime = 2,
    /// Sequencer thread (MIDI, timers).
    Prefetch = 3,
    /// Offline processing, user thread.
    Offline = 4,
}

//! In-process mock plugin exposed through the native entry function ABI.

#![allow(dead_code)]

use std::cell::RefCell;
use std::ffi::{c_char, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use harmoniq_host_vst2::sys::{
    AEffect, EffectFlags, EffectOpcode, HostCallbackProc, HostOpcode, SpeakerArrangement,
    SpeakerArrangementType, TimeInfo,
};
use harmoniq_host_vst2::{EntryPoint, HostError, Module, ModuleHandle, StaticHandle};
use parking_lot::Mutex;

/// Shape and behaviour of the next mock instance.
#[derive(Debug, Clone)]
pub struct MockSpec {
    pub inputs: i32,
    pub outputs: i32,
    pub double: bool,
    pub gain: f32,
    pub bad_magic: bool,
    pub no_dispatcher: bool,
    /// Host opcodes queried while handling the open dispatch.
    pub on_open: Vec<HostOpcode>,
    /// Host opcodes queried at the start of every process call.
    pub on_process: Vec<HostOpcode>,
    /// Issue the process-time queries from a worker thread that is joined
    /// before rendering, the way plugins with internal thread pools do.
    pub cross_thread: bool,
}

impl Default for MockSpec {
    fn default() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
            double: true,
            gain: 1.0,
            bad_magic: false,
            no_dispatcher: false,
            on_open: Vec::new(),
            on_process: Vec::new(),
            cross_thread: false,
        }
    }
}

impl MockSpec {
    pub fn single_only() -> Self {
        Self {
            double: false,
            ..Self::default()
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn on_process(mut self, opcodes: &[HostOpcode]) -> Self {
        self.on_process = opcodes.to_vec();
        self
    }

    pub fn cross_thread(mut self) -> Self {
        self.cross_thread = true;
        self
    }

    pub fn with_io(mut self, inputs: i32, outputs: i32) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dispatched {
    pub opcode: EffectOpcode,
    pub index: i32,
    pub value: isize,
    pub opt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arrangement {
    pub input: (SpeakerArrangementType, i32),
    pub output: (SpeakerArrangementType, i32),
}

/// Everything a mock instance observed.
#[derive(Debug, Default)]
pub struct MockLog {
    /// Address of the effect handed to the host.
    pub effect: usize,
    pub host_version: isize,
    pub dispatched: Vec<Dispatched>,
    pub replies: Vec<(HostOpcode, isize)>,
    pub times: Vec<TimeInfo>,
    pub arrangements: Vec<Arrangement>,
    pub processed: Vec<(&'static str, i32)>,
    pub closed: bool,
}

impl MockLog {
    pub fn opcodes(&self) -> Vec<EffectOpcode> {
        self.dispatched.iter().map(|call| call.opcode).collect()
    }

    pub fn calls(&self, opcode: EffectOpcode) -> Vec<Dispatched> {
        self.dispatched
            .iter()
            .copied()
            .filter(|call| call.opcode == opcode)
            .collect()
    }

    pub fn position(&self, opcode: EffectOpcode) -> Option<usize> {
        self.dispatched.iter().position(|call| call.opcode == opcode)
    }

    pub fn reply(&self, opcode: HostOpcode) -> Option<isize> {
        self.replies
            .iter()
            .find(|(queried, _)| *queried == opcode)
            .map(|(_, reply)| *reply)
    }
}

pub type SharedLog = Arc<Mutex<MockLog>>;

#[repr(C)]
struct MockEffect {
    // Must stay first: the host only ever sees a pointer to this field.
    effect: AEffect,
    host: HostCallbackProc,
    spec: MockSpec,
    gain: Mutex<f32>,
    log: SharedLog,
}

thread_local! {
    static ARMED: RefCell<Option<(MockSpec, SharedLog)>> = const { RefCell::new(None) };
}

/// Configures the instance created by the next entry call on this thread.
pub fn arm(spec: MockSpec) -> SharedLog {
    let log = SharedLog::default();
    ARMED.with(|armed| *armed.borrow_mut() = Some((spec, Arc::clone(&log))));
    log
}

pub fn mock_module(name: &str) -> Module {
    Module::from_entry_point(
        format!("mock/{name}.so"),
        EntryPoint::new(mock_main, Box::new(StaticHandle)),
    )
}

/// Module whose handle counts how often it was unloaded.
pub fn counting_module(name: &str) -> (Module, Arc<AtomicUsize>) {
    let unloads = Arc::new(AtomicUsize::new(0));
    let module = Module::from_entry_point(
        format!("mock/{name}.so"),
        EntryPoint::new(mock_main, Box::new(CountingHandle(Arc::clone(&unloads)))),
    );
    (module, unloads)
}

struct CountingHandle(Arc<AtomicUsize>);

impl ModuleHandle for CountingHandle {
    fn close(self: Box<Self>) -> Result<(), HostError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

unsafe extern "C" fn mock_main(host: HostCallbackProc) -> *mut AEffect {
    let Some((spec, log)) = ARMED.with(|armed| armed.borrow_mut().take()) else {
        return ptr::null_mut();
    };

    // Real plugins ask for the host version before handing out their effect.
    let version = host(ptr::null_mut(), HostOpcode::VERSION.0, 0, 0, ptr::null_mut(), 0.0);
    log.lock().host_version = version;

    let mut effect = AEffect::new();
    if spec.bad_magic {
        effect.magic = 0;
    }
    if !spec.no_dispatcher {
        effect.dispatcher = Some(dispatch);
    }
    effect.set_parameter = Some(set_parameter);
    effect.get_parameter = Some(get_parameter);
    effect.process_replacing = Some(process_f32);
    let mut flags = EffectFlags::CAN_REPLACING;
    if spec.double {
        effect.process_double_replacing = Some(process_f64);
        flags |= EffectFlags::CAN_DOUBLE_REPLACING;
    }
    effect.flags = flags.bits();
    effect.num_inputs = spec.inputs;
    effect.num_outputs = spec.outputs;
    effect.num_params = 1;
    effect.num_programs = 1;
    effect.unique_id = i32::from_be_bytes(*b"HqMk");
    effect.version = 1;

    let mock = Box::new(MockEffect {
        effect,
        host,
        gain: Mutex::new(spec.gain),
        spec,
        log,
    });
    let log = Arc::clone(&mock.log);
    let effect = Box::into_raw(mock).cast::<AEffect>();
    log.lock().effect = effect as usize;
    effect
}

unsafe fn mock<'a>(effect: *mut AEffect) -> &'a MockEffect {
    &*effect.cast::<MockEffect>()
}

unsafe fn write_string(ptr: *mut c_void, text: &str) -> isize {
    let dst = ptr.cast::<u8>();
    ptr::copy_nonoverlapping(text.as_ptr(), dst, text.len());
    *dst.add(text.len()) = 0;
    1
}

unsafe fn query_host(effect: *mut AEffect, opcodes: &[HostOpcode]) {
    let mock = mock(effect);
    for &opcode in opcodes {
        // The log is not held across the call: the host may dispatch back in.
        let reply = (mock.host)(effect, opcode.0, 0, 0, ptr::null_mut(), 0.0);
        let mut log = mock.log.lock();
        log.replies.push((opcode, reply));
        if opcode == HostOpcode::GET_TIME && reply != 0 {
            log.times.push(*(reply as *const TimeInfo));
        }
    }
}

/// Runs the process-time queries, on a worker thread for `cross_thread` mocks.
unsafe fn query_host_for_process(effect: *mut AEffect) {
    let mock = mock(effect);
    if !mock.spec.cross_thread {
        query_host(effect, &mock.spec.on_process);
        return;
    }
    let address = effect as usize;
    let worker = std::thread::spawn(move || {
        let effect = address as *mut AEffect;
        unsafe { query_host(effect, &self::mock(effect).spec.on_process) };
    });
    if worker.join().is_err() {
        panic!("mock worker thread panicked");
    }
}

unsafe extern "C" fn dispatch(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let opcode = EffectOpcode(opcode);
    let mock = mock(effect);
    mock.log.lock().dispatched.push(Dispatched {
        opcode,
        index,
        value,
        opt,
    });

    match opcode {
        EffectOpcode::OPEN => {
            query_host(effect, &mock.spec.on_open);
            0
        }
        EffectOpcode::CLOSE => {
            // Left allocated so a stale handle never aliases an instance
            // created later by a test running in parallel.
            mock.log.lock().closed = true;
            1
        }
        EffectOpcode::SET_SPEAKER_ARRANGEMENT => {
            let input = &*(value as *const SpeakerArrangement);
            let output = &*(ptr as *const SpeakerArrangement);
            mock.log.lock().arrangements.push(Arrangement {
                input: (input.arrangement_type, input.num_channels),
                output: (output.arrangement_type, output.num_channels),
            });
            1
        }
        EffectOpcode::GET_EFFECT_NAME => write_string(ptr, "Mock Gain"),
        EffectOpcode::GET_VENDOR_STRING => write_string(ptr, "Harmoniq"),
        EffectOpcode::GET_PRODUCT_STRING => write_string(ptr, "Mock Suite"),
        EffectOpcode::GET_VENDOR_VERSION => 1000,
        EffectOpcode::GET_VST_VERSION => 2400,
        EffectOpcode::GET_PARAM_NAME if index == 0 => write_string(ptr, "Gain"),
        EffectOpcode::GET_PARAM_LABEL if index == 0 => write_string(ptr, "x"),
        EffectOpcode::GET_PARAM_DISPLAY if index == 0 => {
            write_string(ptr, &format!("{:.2}", *mock.gain.lock()))
        }
        EffectOpcode::CAN_DO => {
            let capability = CStr::from_ptr(ptr as *const c_char);
            if capability.to_bytes() == b"receiveVstTimeInfo" {
                1
            } else {
                -1
            }
        }
        _ => 0,
    }
}

unsafe extern "C" fn set_parameter(effect: *mut AEffect, index: i32, value: f32) {
    if index == 0 {
        *mock(effect).gain.lock() = value;
    }
}

unsafe extern "C" fn get_parameter(effect: *mut AEffect, index: i32) -> f32 {
    if index == 0 {
        *mock(effect).gain.lock()
    } else {
        0.0
    }
}

unsafe fn render<T: Copy + Default>(
    effect: *mut AEffect,
    inputs: *mut *mut T,
    outputs: *mut *mut T,
    frames: i32,
    scale: impl Fn(T) -> T,
) {
    let mock = mock(effect);
    let frames = frames as usize;
    for channel in 0..mock.spec.outputs as usize {
        let out = std::slice::from_raw_parts_mut(*outputs.add(channel), frames);
        if channel < mock.spec.inputs as usize {
            let input = std::slice::from_raw_parts(*inputs.add(channel), frames);
            for (dst, src) in out.iter_mut().zip(input) {
                *dst = scale(*src);
            }
        } else {
            out.fill(T::default());
        }
    }
}

unsafe extern "C" fn process_f32(
    effect: *mut AEffect,
    inputs: *mut *mut f32,
    outputs: *mut *mut f32,
    frames: i32,
) {
    let mock = mock(effect);
    query_host_for_process(effect);
    mock.log.lock().processed.push(("single", frames));
    let gain = *mock.gain.lock();
    render(effect, inputs, outputs, frames, |sample| sample * gain);
}

unsafe extern "C" fn process_f64(
    effect: *mut AEffect,
    inputs: *mut *mut f64,
    outputs: *mut *mut f64,
    frames: i32,
) {
    let mock = mock(effect);
    query_host_for_process(effect);
    mock.log.lock().processed.push(("double", frames));
    let gain = f64::from(*mock.gain.lock());
    render(effect, inputs, outputs, frames, |sample| sample * gain);
}

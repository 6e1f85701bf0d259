//! Process-wide table routing native host callbacks to their owners.
//!
//! The native callback carries nothing but the effect pointer, so every live
//! effect is registered here under that pointer before the plugin can call back
//! and removed again before its memory is invalidated. This module is the only
//! place a raw effect pointer arriving from native code is turned back into an
//! [`Effect`].

use std::collections::HashMap;
use std::ffi::c_void;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::error;
use vst2_sys::{AEffect, HostOpcode, VST_VERSION};

use crate::effect::{Effect, EffectHandle, Index, Opt, Ptr, Return, Value};
use crate::error::{HostError, Result};

/// Host side handler invoked for every callback a plugin issues.
///
/// The [`Effect`] argument is a borrowed view valid for the duration of the
/// call only. Handlers may be invoked from any thread the plugin chooses.
pub type HostCallback = dyn Fn(&Effect, HostOpcode, Index, Value, Ptr, Opt) -> Return + Send + Sync;

static REGISTRY: Lazy<RwLock<HashMap<EffectHandle, Arc<HostCallback>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub(crate) fn register(handle: EffectHandle, callback: Arc<HostCallback>) -> Result<()> {
    let mut registry = REGISTRY.write();
    if registry.contains_key(&handle) {
        return Err(HostError::AlreadyRegistered {
            handle: handle.as_usize(),
        });
    }
    registry.insert(handle, callback);
    Ok(())
}

/// Returns false when the handle was not registered.
pub(crate) fn deregister(handle: EffectHandle) -> bool {
    REGISTRY.write().remove(&handle).is_some()
}

pub fn is_registered(handle: EffectHandle) -> bool {
    REGISTRY.read().contains_key(&handle)
}

/// Number of effects currently reachable through the native callback.
pub fn registered_count() -> usize {
    REGISTRY.read().len()
}

/// Routes one callback to the handler registered for `effect`.
///
/// [`HostOpcode::VERSION`] is answered without consulting the table because
/// plugins ask for it from inside their entry function, before the host has
/// seen the effect pointer. The read lock is released before the handler runs
/// so handlers may reenter the host, including loading or closing other
/// plugins.
pub fn route(
    effect: *mut AEffect,
    opcode: HostOpcode,
    index: Index,
    value: Value,
    ptr: Ptr,
    opt: Opt,
) -> Result<Return> {
    if opcode == HostOpcode::VERSION {
        return Ok(Return::from(VST_VERSION));
    }

    let handle = EffectHandle::from_ptr(effect);
    let callback = REGISTRY.read().get(&handle).cloned();
    let (Some(callback), Some(raw)) = (callback, NonNull::new(effect)) else {
        return Err(HostError::UnregisteredEffect {
            handle: handle.as_usize(),
            opcode,
        });
    };

    // Registered effects stay alive until they are deregistered.
    let effect = unsafe { Effect::from_raw(raw) };
    Ok(callback(&effect, opcode, index, value, ptr, opt))
}

/// The callback handed to every plugin entry function.
pub(crate) unsafe extern "C" fn host_callback(
    effect: *mut AEffect,
    opcode: i32,
    index: i32,
    value: isize,
    ptr: *mut c_void,
    opt: f32,
) -> isize {
    let opcode = HostOpcode::from(opcode);
    let routed = panic::catch_unwind(AssertUnwindSafe(|| {
        route(
            effect,
            opcode,
            Index::from(index),
            value as Value,
            ptr,
            Opt::from(opt),
        )
    }));

    match routed {
        Ok(Ok(result)) => result as isize,
        Ok(Err(err)) => {
            // A plugin calling back on an effect the host no longer tracks
            // would otherwise be routed to freed state.
            error!(%err, "host callback protocol violation");
            std::process::abort();
        }
        Err(_) => {
            error!(?opcode, "host callback handler panicked");
            0
        }
    }
}

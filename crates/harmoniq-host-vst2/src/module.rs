use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, warn};
use vst2_sys::{HostOpcode, PluginMain, ENTRY_SYMBOL, LEGACY_ENTRY_SYMBOL};

use crate::effect::{Effect, Index, Opt, Ptr, Return, Value};
use crate::error::{HostError, Result};
use crate::plugin::Plugin;
use crate::registry::HostCallback;

/// OS resource keeping a module's code mapped.
pub trait ModuleHandle: Send {
    fn close(self: Box<Self>) -> Result<()>;
}

/// Resolves a plugin binary to its entry function.
///
/// Search paths and extension filtering are the loader's business; the host
/// only ever asks for one path at a time.
pub trait ModuleLoader {
    fn open(&self, path: &Path) -> Result<EntryPoint>;
}

/// Entry function of a loaded module together with the handle that keeps it
/// mapped.
pub struct EntryPoint {
    main: PluginMain,
    handle: Box<dyn ModuleHandle>,
}

impl EntryPoint {
    pub fn new(main: PluginMain, handle: Box<dyn ModuleHandle>) -> Self {
        Self { main, handle }
    }

    pub fn main(&self) -> PluginMain {
        self.main
    }

    pub fn close(self) -> Result<()> {
        self.handle.close()
    }
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoint")
            .field("main", &(self.main as usize as *const ()))
            .finish_non_exhaustive()
    }
}

/// Loads shared libraries through `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLoader;

impl ModuleLoader for LibraryLoader {
    fn open(&self, path: &Path) -> Result<EntryPoint> {
        if !path.exists() {
            return Err(HostError::MissingBinary(path.to_path_buf()));
        }

        let library = unsafe { Library::new(path) }.map_err(|source| HostError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let main = unsafe {
            library
                .get::<PluginMain>(ENTRY_SYMBOL)
                .or_else(|_| library.get::<PluginMain>(LEGACY_ENTRY_SYMBOL))
                .map(|symbol| *symbol)
                .map_err(|_| HostError::missing_entry(path, "VSTPluginMain"))?
        };

        Ok(EntryPoint::new(
            main,
            Box::new(LibraryHandle {
                path: path.to_path_buf(),
                library,
            }),
        ))
    }
}

struct LibraryHandle {
    path: PathBuf,
    library: Library,
}

impl ModuleHandle for LibraryHandle {
    fn close(self: Box<Self>) -> Result<()> {
        let LibraryHandle { path, library } = *self;
        library
            .close()
            .map_err(|source| HostError::LibraryUnload { path, source })
    }
}

/// Handle for entry functions linked into the host binary itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticHandle;

impl ModuleHandle for StaticHandle {
    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// State shared between a module and every plugin created from it.
pub(crate) struct ModuleShared {
    path: PathBuf,
    name: String,
    main: PluginMain,
    handle: Mutex<Option<Box<dyn ModuleHandle>>>,
}

impl ModuleShared {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn main(&self) -> PluginMain {
        self.main
    }

    fn unload(&self) -> Result<()> {
        match self.handle.lock().take() {
            Some(handle) => {
                debug!(path = %self.path.display(), "unloading plugin module");
                handle.close()
            }
            None => Ok(()),
        }
    }
}

impl Drop for ModuleShared {
    fn drop(&mut self) {
        if let Err(err) = self.unload() {
            warn!(path = %self.path.display(), %err, "failed to unload plugin module");
        }
    }
}

/// A plugin binary loaded into memory, used to create plugin instances.
pub struct Module {
    shared: Arc<ModuleShared>,
}

impl Module {
    /// Loads the shared library at `path` and resolves its entry function.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(&LibraryLoader, path)
    }

    pub fn open_with<L: ModuleLoader + ?Sized>(loader: &L, path: impl AsRef<Path>) -> Result<Self> {
        let path = absolute(path.as_ref())?;
        let entry = loader.open(&path)?;
        debug!(path = %path.display(), "loaded plugin module");
        Ok(Self::from_entry_point(path, entry))
    }

    /// Wraps an entry function that was resolved elsewhere.
    pub fn from_entry_point(path: impl Into<PathBuf>, entry: EntryPoint) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let EntryPoint { main, handle } = entry;
        Self {
            shared: Arc::new(ModuleShared {
                path,
                name,
                main,
                handle: Mutex::new(Some(handle)),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        self.shared.path()
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// Plugins created from this module that have not been dropped yet.
    pub fn live_instances(&self) -> usize {
        Arc::strong_count(&self.shared) - 1
    }

    /// Creates a new plugin instance routed to `callback`.
    ///
    /// The instance is registered but not opened.
    pub fn load<F>(&self, callback: F) -> Result<Plugin>
    where
        F: Fn(&Effect, HostOpcode, Index, Value, Ptr, Opt) -> Return + Send + Sync + 'static,
    {
        let callback: Arc<HostCallback> = Arc::new(callback);
        Plugin::create(Arc::clone(&self.shared), callback)
    }

    /// Unloads the module.
    ///
    /// Plugins keep their module mapped, so when instances are still alive
    /// the unload happens once the last of them is dropped.
    pub fn close(self) -> Result<()> {
        match Arc::try_unwrap(self.shared) {
            Ok(shared) => shared.unload(),
            Err(shared) => {
                warn!(
                    path = %shared.path().display(),
                    live_instances = Arc::strong_count(&shared) - 1,
                    "module closed with live plugin instances, deferring unload"
                );
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.shared.path)
            .field("name", &self.shared.name)
            .finish()
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use vst2_sys::{AEffect, HostCallbackProc};

    unsafe extern "C" fn null_main(_callback: HostCallbackProc) -> *mut AEffect {
        ptr::null_mut()
    }

    struct CountingHandle(Arc<AtomicUsize>);

    impl ModuleHandle for CountingHandle {
        fn close(self: Box<Self>) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn missing_binary_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.so");
        let err = Module::open(&path).unwrap_err();
        match err {
            HostError::MissingBinary(reported) => assert_eq!(reported, path),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_library_file_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.so");
        std::fs::write(&path, b"not a shared library").unwrap();
        let err = Module::open(&path).unwrap_err();
        assert!(matches!(err, HostError::LibraryLoad { .. }), "{err:?}");
    }

    #[test]
    fn name_comes_from_file_stem() {
        let module = Module::from_entry_point(
            "/plugins/Delay.so",
            EntryPoint::new(null_main, Box::new(StaticHandle)),
        );
        assert_eq!(module.name(), "Delay");
        assert_eq!(module.path(), Path::new("/plugins/Delay.so"));
        assert_eq!(module.live_instances(), 0);
    }

    #[test]
    fn close_unloads_exactly_once() {
        let closed = Arc::new(AtomicUsize::new(0));
        let module = Module::from_entry_point(
            "mock/counting",
            EntryPoint::new(null_main, Box::new(CountingHandle(Arc::clone(&closed)))),
        );
        module.close().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn entry_point_close_releases_its_handle() {
        let closed = Arc::new(AtomicUsize::new(0));
        let entry = EntryPoint::new(null_main, Box::new(CountingHandle(Arc::clone(&closed))));
        assert_eq!(entry.main() as usize, null_main as usize);
        entry.close().unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_effect_leaves_nothing_behind() {
        let module = Module::from_entry_point(
            "mock/null",
            EntryPoint::new(null_main, Box::new(StaticHandle)),
        );
        let err = module
            .load(|_, _, _, _, _, _| 0)
            .unwrap_err();
        assert!(matches!(err, HostError::NullEffect(_)));
        assert_eq!(module.live_instances(), 0);
    }
}

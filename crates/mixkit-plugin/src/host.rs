//! Native segment plugins.
//!
//! A plugin is a dynamic library exporting two well-known entry points:
//! `mixkit_plugin_register`, called with a [`Registry`] handle so the
//! plugin can register its segment types, and `mixkit_plugin_deregister`,
//! called before unload to remove them again. The [`export_plugin!`]
//! macro generates both for plugin authors.

use crate::error::{PluginError, Result};
use libloading::Library;
use mixkit_core::Registry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name of the registration entry point a plugin must export.
pub const REGISTER_SYMBOL: &str = "mixkit_plugin_register";
/// Name of the teardown entry point a plugin must export.
pub const DEREGISTER_SYMBOL: &str = "mixkit_plugin_deregister";

/// Signature of both plugin entry points. Returns `true` on success.
pub type PluginEntryFn = unsafe extern "C" fn(registry: *mut Registry) -> bool;

/// Loads segment plugins and keeps them resident.
///
/// Dropping the host deregisters and unloads everything it loaded.
pub struct PluginHost {
    registry: Registry,
    libraries: HashMap<PathBuf, Library>,
}

impl PluginHost {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            libraries: HashMap::new(),
        }
    }

    /// The registry plugins register their segment types into.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load the plugin library at `path` and let it register itself.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        if self.libraries.contains_key(&path) {
            return Err(PluginError::AlreadyLoaded { path });
        }
        let library = unsafe { Library::new(&path) }.map_err(|source| PluginError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        let entry = unsafe {
            library
                .get::<PluginEntryFn>(b"mixkit_plugin_register\0")
                .map_err(|_| PluginError::MissingSymbol {
                    path: path.clone(),
                    symbol: REGISTER_SYMBOL,
                })?
        };
        let mut registry = self.registry.clone();
        let ok = unsafe { entry(&mut registry as *mut Registry) };
        if !ok {
            return Err(PluginError::RegistrationFailed { path });
        }
        debug!(path = %path.display(), "loaded segment plugin");
        self.libraries.insert(path, library);
        Ok(())
    }

    /// Deregister and unload the plugin at `path`.
    pub fn close(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let library = self
            .libraries
            .get(&path)
            .ok_or_else(|| PluginError::NotLoaded { path: path.clone() })?;
        let entry = unsafe {
            library
                .get::<PluginEntryFn>(b"mixkit_plugin_deregister\0")
                .map_err(|_| PluginError::MissingSymbol {
                    path: path.clone(),
                    symbol: DEREGISTER_SYMBOL,
                })?
        };
        let mut registry = self.registry.clone();
        let ok = unsafe { entry(&mut registry as *mut Registry) };
        if !ok {
            warn!(path = %path.display(), "plugin teardown reported failure");
        }
        debug!(path = %path.display(), "closing segment plugin");
        self.libraries.remove(&path);
        Ok(())
    }

    pub fn is_loaded(&self, path: impl AsRef<Path>) -> bool {
        self.libraries.contains_key(path.as_ref())
    }

    /// Paths of all currently loaded plugins.
    pub fn loaded(&self) -> Vec<PathBuf> {
        self.libraries.keys().cloned().collect()
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        for path in self.loaded() {
            if let Err(err) = self.close(&path) {
                warn!(path = %path.display(), %err, "failed to close plugin on drop");
            }
        }
    }
}

/// Generate the plugin entry points from two `fn(&Registry) ->
/// mixkit_core::Result<()>` functions.
///
/// ```ignore
/// fn register(registry: &Registry) -> mixkit_core::Result<()> { ... }
/// fn deregister(registry: &Registry) -> mixkit_core::Result<()> { ... }
///
/// mixkit_plugin::export_plugin!(register, deregister);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($register:path, $deregister:path) => {
        #[no_mangle]
        pub unsafe extern "C" fn mixkit_plugin_register(
            registry: *mut $crate::Registry,
        ) -> bool {
            let registry = unsafe { &*registry };
            let result: $crate::CoreResult<()> = $register(registry);
            result.is_ok()
        }

        #[no_mangle]
        pub unsafe extern "C" fn mixkit_plugin_deregister(
            registry: *mut $crate::Registry,
        ) -> bool {
            let registry = unsafe { &*registry };
            let result: $crate::CoreResult<()> = $deregister(registry);
            result.is_ok()
        }
    };
}

//! Loader for third-party LADSPA effect libraries.
//!
//! LADSPA libraries export a single `ladspa_descriptor(index)` entry that
//! enumerates the plugins they contain. This module resolves that entry,
//! exposes the raw descriptors, and wraps instantiated plugin handles so
//! activate/run/cleanup follow RAII. Parameter marshaling into segment
//! fields is left to callers; ports are connected raw.

use crate::error::{PluginError, Result};
use libloading::{Library, Symbol};
use std::ffi::{c_char, c_int, c_ulong, c_void, CStr};
use std::path::{Path, PathBuf};
use tracing::debug;

pub type LadspaData = f32;
pub type LadspaHandle = *mut c_void;
pub type LadspaPortDescriptor = c_int;

pub const LADSPA_PORT_INPUT: LadspaPortDescriptor = 0x1;
pub const LADSPA_PORT_OUTPUT: LadspaPortDescriptor = 0x2;
pub const LADSPA_PORT_CONTROL: LadspaPortDescriptor = 0x4;
pub const LADSPA_PORT_AUDIO: LadspaPortDescriptor = 0x8;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LadspaPortRangeHint {
    pub hint_descriptor: c_int,
    pub lower_bound: LadspaData,
    pub upper_bound: LadspaData,
}

/// The descriptor struct of the LADSPA ABI, field for field.
#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: c_int,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const LadspaPortDescriptor,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const LadspaPortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(*const LadspaDescriptor, c_ulong) -> LadspaHandle>,
    pub connect_port: Option<unsafe extern "C" fn(LadspaHandle, c_ulong, *mut LadspaData)>,
    pub activate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(LadspaHandle, c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(LadspaHandle, LadspaData)>,
    pub deactivate: Option<unsafe extern "C" fn(LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(LadspaHandle)>,
}

type DescriptorFn = unsafe extern "C" fn(c_ulong) -> *const LadspaDescriptor;

const DESCRIPTOR_SYMBOL: &str = "ladspa_descriptor";

fn string_at(pointer: *const c_char) -> String {
    if pointer.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(pointer) }
            .to_string_lossy()
            .into_owned()
    }
}

/// An opened LADSPA library.
#[derive(Debug)]
pub struct LadspaLibrary {
    path: PathBuf,
    library: Library,
}

impl LadspaLibrary {
    /// Open the library at `path` and verify its descriptor entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let library =
            unsafe { Library::new(&path) }.map_err(|source| PluginError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        unsafe {
            library
                .get::<DescriptorFn>(b"ladspa_descriptor\0")
                .map_err(|_| PluginError::MissingSymbol {
                    path: path.clone(),
                    symbol: DESCRIPTOR_SYMBOL,
                })?
        };
        debug!(path = %path.display(), "opened LADSPA library");
        Ok(Self { path, library })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn descriptor_fn(&self) -> Result<Symbol<'_, DescriptorFn>> {
        unsafe {
            self.library
                .get::<DescriptorFn>(b"ladspa_descriptor\0")
                .map_err(|_| PluginError::MissingSymbol {
                    path: self.path.clone(),
                    symbol: DESCRIPTOR_SYMBOL,
                })
        }
    }

    /// The plugin descriptor at `index`.
    pub fn plugin(&self, index: u32) -> Result<LadspaPlugin<'_>> {
        let entry = self.descriptor_fn()?;
        let descriptor = unsafe { entry(index as c_ulong) };
        if descriptor.is_null() {
            return Err(PluginError::NoPluginAtIndex {
                path: self.path.clone(),
                index,
            });
        }
        Ok(LadspaPlugin {
            path: &self.path,
            descriptor: unsafe { &*descriptor },
        })
    }

    /// All plugin descriptors in the library, in index order.
    pub fn plugins(&self) -> Result<Vec<LadspaPlugin<'_>>> {
        let entry = self.descriptor_fn()?;
        let mut plugins = Vec::new();
        for index in 0.. {
            let descriptor = unsafe { entry(index) };
            if descriptor.is_null() {
                break;
            }
            plugins.push(LadspaPlugin {
                path: &self.path,
                descriptor: unsafe { &*descriptor },
            });
        }
        Ok(plugins)
    }
}

/// One plugin descriptor within an open library.
#[derive(Clone, Copy)]
pub struct LadspaPlugin<'lib> {
    path: &'lib Path,
    descriptor: &'lib LadspaDescriptor,
}

impl<'lib> LadspaPlugin<'lib> {
    pub fn descriptor(&self) -> &'lib LadspaDescriptor {
        self.descriptor
    }

    pub fn unique_id(&self) -> u64 {
        self.descriptor.unique_id as u64
    }

    pub fn label(&self) -> String {
        string_at(self.descriptor.label)
    }

    pub fn name(&self) -> String {
        string_at(self.descriptor.name)
    }

    pub fn maker(&self) -> String {
        string_at(self.descriptor.maker)
    }

    pub fn port_count(&self) -> u32 {
        self.descriptor.port_count as u32
    }

    pub fn port_descriptor(&self, port: u32) -> Option<LadspaPortDescriptor> {
        if port >= self.port_count() || self.descriptor.port_descriptors.is_null() {
            return None;
        }
        Some(unsafe { *self.descriptor.port_descriptors.add(port as usize) })
    }

    pub fn port_name(&self, port: u32) -> Option<String> {
        if port >= self.port_count() || self.descriptor.port_names.is_null() {
            return None;
        }
        Some(string_at(unsafe {
            *self.descriptor.port_names.add(port as usize)
        }))
    }

    /// Instantiate the plugin at `samplerate`.
    pub fn instantiate(&self, samplerate: u32) -> Result<LadspaInstance<'lib>> {
        let instantiate = self.descriptor.instantiate.ok_or_else(|| {
            PluginError::InstantiationFailed {
                path: self.path.to_path_buf(),
                label: self.label(),
            }
        })?;
        let handle = unsafe { instantiate(self.descriptor, samplerate as c_ulong) };
        if handle.is_null() {
            return Err(PluginError::InstantiationFailed {
                path: self.path.to_path_buf(),
                label: self.label(),
            });
        }
        debug!(label = %self.label(), samplerate, "instantiated LADSPA plugin");
        Ok(LadspaInstance {
            descriptor: self.descriptor,
            handle,
            activated: false,
        })
    }
}

/// A live plugin handle. Cleaned up on drop.
pub struct LadspaInstance<'lib> {
    descriptor: &'lib LadspaDescriptor,
    handle: LadspaHandle,
    activated: bool,
}

impl LadspaInstance<'_> {
    /// Connect a port to a data location.
    ///
    /// # Safety
    ///
    /// `data` must stay valid and correctly sized for every following
    /// [`run`](Self::run) call until the port is reconnected.
    pub unsafe fn connect_port(&mut self, port: u32, data: *mut LadspaData) {
        if let Some(connect) = self.descriptor.connect_port {
            unsafe { connect(self.handle, port as c_ulong, data) };
        }
    }

    pub fn activate(&mut self) {
        if !self.activated {
            if let Some(activate) = self.descriptor.activate {
                unsafe { activate(self.handle) };
            }
            self.activated = true;
        }
    }

    /// Process `frames` samples through the connected ports.
    pub fn run(&mut self, frames: u32) {
        if let Some(run) = self.descriptor.run {
            unsafe { run(self.handle, frames as c_ulong) };
        }
    }

    pub fn deactivate(&mut self) {
        if self.activated {
            if let Some(deactivate) = self.descriptor.deactivate {
                unsafe { deactivate(self.handle) };
            }
            self.activated = false;
        }
    }
}

impl Drop for LadspaInstance<'_> {
    fn drop(&mut self) {
        self.deactivate();
        if let Some(cleanup) = self.descriptor.cleanup {
            unsafe { cleanup(self.handle) };
        }
    }
}

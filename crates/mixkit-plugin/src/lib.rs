//! Dynamic segment plugins for mixkit.
//!
//! Two loaders live here:
//!
//! - [`PluginHost`]: native mixkit plugins, dynamic libraries that
//!   register segment types into a [`Registry`] through two well-known
//!   entry points. [`export_plugin!`] generates the entry points on the
//!   plugin side.
//! - [`LadspaLibrary`]: third-party LADSPA effect libraries, enumerated
//!   and instantiated through the standard `ladspa_descriptor` entry.

pub mod error;
pub mod host;
pub mod ladspa;

pub use error::{PluginError, Result};
pub use host::{PluginHost, PluginEntryFn, DEREGISTER_SYMBOL, REGISTER_SYMBOL};
pub use ladspa::{LadspaDescriptor, LadspaInstance, LadspaLibrary, LadspaPlugin};

// Re-exported for the export_plugin! macro expansion.
pub use mixkit_core::Registry;
#[doc(hidden)]
pub use mixkit_core::Result as CoreResult;

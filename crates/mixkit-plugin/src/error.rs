//! Error types for mixkit-plugin.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for dynamic plugin operations.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to open plugin library {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    #[error("Plugin library {} has no {symbol} symbol", path.display())]
    MissingSymbol { path: PathBuf, symbol: &'static str },

    #[error("Plugin {} failed to register its segments", path.display())]
    RegistrationFailed { path: PathBuf },

    #[error("Plugin {} is already loaded", path.display())]
    AlreadyLoaded { path: PathBuf },

    #[error("Plugin {} is not loaded", path.display())]
    NotLoaded { path: PathBuf },

    #[error("No LADSPA descriptor at index {index} in {}", path.display())]
    NoPluginAtIndex { path: PathBuf, index: u32 },

    #[error("LADSPA plugin '{label}' in {} failed to instantiate", path.display())]
    InstantiationFailed { path: PathBuf, label: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, PluginError>;

//! Error types for the eventbuilder-core library.
//!
//! Fatal errors (missing modules, unreadable images, template failures) abort
//! the run. [`Error::UnrecognizedSignatureShape`] is the one recoverable kind:
//! extractors turn it into a [`Diagnostic`](crate::Diagnostic) and move on.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for eventbuilder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all eventbuilder operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A referenced module was not present in any search directory
    #[error("module '{name}' not found in search directories [{}]", display_paths(.searched))]
    ModuleNotFound {
        /// Name of the requested module (assembly name)
        name: String,
        /// Directories that were searched, in order
        searched: Vec<PathBuf>,
    },

    /// A module file could not be loaded
    #[error("failed to load module '{path}': {source}")]
    ModuleLoad {
        /// Path of the module that failed to load
        path: PathBuf,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// dotscope could not read the image or one of its heaps and signatures
    #[error("metadata error: {0}")]
    Metadata(#[from] dotscope::Error),

    /// The metadata tables refer to rows or tables that do not fit
    #[error("malformed metadata: {details}")]
    Malformed {
        /// Detailed description of the issue
        details: String,
    },

    /// A member's handler shape cannot be adapted
    #[error("unrecognized signature shape for '{member}': {reason}")]
    UnrecognizedSignatureShape {
        /// `Type.Member` being extracted
        member: String,
        /// Why the shape was rejected
        reason: String,
    },

    /// A platform's reference assemblies could not be located
    #[error("platform '{platform}' is unavailable: {details}")]
    PlatformUnavailable {
        /// Platform name
        platform: String,
        /// What was looked for
        details: String,
    },

    /// The template could not be rendered
    #[error("template render failure at line {line}: {details}")]
    TemplateRender {
        /// 1-based template line
        line: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Failed to serialize the template model
    #[error("failed to serialize template model: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new module-not-found error
    pub fn module_not_found(name: impl Into<String>, searched: Vec<PathBuf>) -> Self {
        Self::ModuleNotFound {
            name: name.into(),
            searched,
        }
    }

    /// Wraps `source` as a load failure of the module at `path`
    pub fn module_load(path: impl Into<PathBuf>, source: Error) -> Self {
        Self::ModuleLoad {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Creates a new malformed metadata error
    pub fn malformed(details: impl Into<String>) -> Self {
        Self::Malformed {
            details: details.into(),
        }
    }

    /// Creates a new unrecognized shape error
    pub fn unrecognized(member: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnrecognizedSignatureShape {
            member: member.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new platform-unavailable error
    pub fn platform_unavailable(platform: impl Into<String>, details: impl Into<String>) -> Self {
        Self::PlatformUnavailable {
            platform: platform.into(),
            details: details.into(),
        }
    }

    /// Creates a new template error
    pub fn template(line: usize, details: impl Into<String>) -> Self {
        Self::TemplateRender {
            line,
            details: details.into(),
        }
    }

    /// Returns true if this is a recoverable error that should be skipped
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnrecognizedSignatureShape { .. })
    }

    /// True for failures to decode metadata content (rows, heaps, blobs)
    pub fn is_decoding(&self) -> bool {
        matches!(self, Self::Metadata(_) | Self::Malformed { .. })
    }
}

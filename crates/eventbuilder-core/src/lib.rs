//! # eventbuilder-core
//!
//! A library for extracting event and delegate signatures from .NET assemblies
//! and rendering them into reactive wrapper bindings.
//!
//! This crate provides the core functionality for:
//! - Reading ECMA-335 metadata from `.dll`, `.exe` and `.winmd` modules (via `dotscope`)
//! - Resolving cross-module references against platform search paths
//! - Normalizing public events and delegates into a template-ready model
//! - Rendering that model through a Mustache-subset template
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`loader`]: Module files opened as [`Assembly`], dependency resolution and the loaded [`ModuleSet`]
//! - [`extract`]: The [`TypeSystem`] capability trait and the extractors
//! - [`model`]: Normalized signatures, payload classification and grouping
//! - [`render`]: Template rendering and output substitutions
//! - [`platform`]: Target platform descriptors
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use eventbuilder_core::{Generator, GeneratorConfig, Platform, PlatformRoots};
//!
//! let descriptor = Platform::Android.descriptor(&PlatformRoots::new(), &[])?;
//! let generator = Generator::new(GeneratorConfig::for_platform(&descriptor));
//! let generated = generator.generate(&descriptor.assemblies, &descriptor.search_dirs)?;
//!
//! for diagnostic in &generated.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! println!("{}", generated.text);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`TypeSystem`]: Feed the extractors from something other than metadata files
//! - [`TemplateRenderer`]: Render the model with another templating engine
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod extract;
pub mod generator;
pub mod loader;
pub mod model;
pub mod platform;
pub mod render;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use extract::{DelegateExtractor, EventExtractor, EventScope, ExtractOptions, TypeSystem};
pub use generator::{Generated, Generator, GeneratorConfig};
pub use loader::{Assembly, DependencyResolver, Manifest, ModuleSet};
pub use model::{
    classify, Diagnostic, NamespaceGroup, NormalizedSignature, PayloadArity, PayloadParam,
    TemplateModel, TypeGroup,
};
pub use platform::{Platform, PlatformDescriptor, PlatformRoots};
pub use render::{BuiltinTemplate, MustacheRenderer, Substitutions, TemplateRenderer, TemplateSource};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

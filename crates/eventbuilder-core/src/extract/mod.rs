//! Event and delegate extraction.
//!
//! Extractors only talk to the [`TypeSystem`] trait: they enumerate public
//! types, ask for events and delegate `Invoke` signatures, and turn what they
//! find into [`NormalizedSignature`](crate::model::NormalizedSignature)s.
//! [`ModuleSet`](crate::loader::ModuleSet) is the metadata-backed
//! implementation.

mod delegates;
mod events;
#[cfg(test)]
pub(crate) mod memory;

use crate::error::{Error, Result};
use crate::model::{Diagnostic, NormalizedSignature, PayloadParam, TypeDetails};
use tracing::info;

pub use delegates::DelegateExtractor;
pub use events::EventExtractor;

/// Index of a loaded module
pub type ModuleId = usize;

/// A type definition inside a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    /// Owning module
    pub module: ModuleId,
    /// TypeDef row
    pub row: u32,
}

/// Names and flags of a type definition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeInfo {
    /// Namespace (of the outermost enclosing type for nested types)
    pub namespace: String,
    /// Name relative to the namespace, arity markers stripped (`Outer.Inner`)
    pub name: String,
    /// Interface type
    pub is_interface: bool,
    /// Abstract type
    pub is_abstract: bool,
    /// Sealed type
    pub is_sealed: bool,
    /// Generic type definition
    pub is_generic: bool,
    /// Nested inside another type
    pub is_nested: bool,
}

impl TypeInfo {
    /// Namespace-qualified name
    pub fn full_name(&self) -> String {
        crate::model::qualify(&self.namespace, &self.name)
    }

    /// C# `static class`
    pub fn is_static(&self) -> bool {
        self.is_abstract && self.is_sealed
    }
}

/// Which events an extraction pass looks at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventScope {
    /// Instance events
    #[default]
    Instance,
    /// Static events only
    Static,
}

impl EventScope {
    /// Whether an event with the given static flag is in scope
    pub fn includes(self, is_static: bool) -> bool {
        match self {
            EventScope::Instance => !is_static,
            EventScope::Static => is_static,
        }
    }
}

/// Opaque reference to an event's handler type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerRef {
    /// Module whose metadata the token belongs to
    pub module: ModuleId,
    /// Metadata token (TypeDef, TypeRef or TypeSpec)
    pub token: u32,
}

/// An event as declared, before its handler is looked at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEventMember {
    /// Declaring type
    pub declaring: TypeHandle,
    /// Event name
    pub name: String,
    /// The `add` accessor is static
    pub is_static: bool,
    /// The `add` accessor is public
    pub is_public: bool,
    /// Handler delegate type
    pub handler: HandlerRef,
}

/// How a rendered type can be used as a payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TypeShape {
    /// An ordinary value or reference type
    #[default]
    Value,
    /// `void`
    Void,
    /// Managed reference (`ref`/`out`)
    ByRef,
    /// Unmanaged or function pointer
    Pointer,
    /// Contains a generic parameter that was not substituted
    OpenGeneric,
}

/// A rendered type reference
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDesc {
    /// Rendered name
    pub name: String,
    /// Usability as a payload
    pub shape: TypeShape,
    /// Generic instantiation
    pub is_generic: bool,
    /// Nested type
    pub is_nested: bool,
}

impl TypeDesc {
    /// A top-level value type by name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A named parameter of an `Invoke` method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Declared name
    pub name: String,
    /// Parameter type
    pub ty: TypeDesc,
}

/// Return type and parameters of a delegate's `Invoke`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeSignature {
    /// Return type
    pub return_type: TypeDesc,
    /// Parameters in declaration order
    pub params: Vec<Parameter>,
}

/// A handler type resolved to its delegate definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandler {
    /// Rendered handler type name, with generic arguments
    pub type_name: String,
    /// `Invoke` with generic arguments substituted
    pub invoke: InvokeSignature,
}

/// Read-only view of a set of loaded modules
pub trait TypeSystem: Sync {
    /// Modules to extract from, in order
    fn modules(&self) -> Vec<ModuleId>;

    /// Display name of a module
    fn module_name(&self, module: ModuleId) -> &str;

    /// Publicly visible type definitions of a module
    fn public_types(&self, module: ModuleId) -> Result<Vec<TypeHandle>>;

    /// Names and flags of a type
    fn type_info(&self, ty: TypeHandle) -> Result<TypeInfo>;

    /// Events declared directly on a type
    fn events(&self, ty: TypeHandle) -> Result<Vec<RawEventMember>>;

    /// Resolves a handler type to its delegate definition
    fn resolve_handler(&self, handler: &HandlerRef) -> Result<ResolvedHandler>;

    /// Whether the type derives from `System.MulticastDelegate`
    fn is_delegate(&self, ty: TypeHandle) -> Result<bool>;

    /// `Invoke` signature of a delegate type
    fn delegate_invoke(&self, ty: TypeHandle) -> Result<InvokeSignature>;

    /// Resolved base type, if any
    fn base_type(&self, ty: TypeHandle) -> Result<Option<TypeHandle>>;
}

/// What one extraction pass produced
#[derive(Debug, Default)]
pub struct Extraction {
    /// Signatures in module order
    pub signatures: Vec<NormalizedSignature>,
    /// Declaring type facts
    pub types: Vec<TypeDetails>,
    /// Recoverable skips
    pub diagnostics: Vec<Diagnostic>,
}

impl Extraction {
    /// Appends another extraction, keeping order
    pub fn extend(&mut self, other: Extraction) {
        self.signatures.extend(other.signatures);
        self.types.extend(other.types);
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Filters shared by both extractors
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Namespaces whose types are ignored
    pub excluded_namespaces: Vec<String>,
    /// Which events to extract
    pub scope: EventScope,
}

impl ExtractOptions {
    /// Whether types of `namespace` are skipped
    pub fn is_excluded(&self, namespace: &str) -> bool {
        self.excluded_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// Rejects `Invoke` shapes that cannot become an observable payload
pub(crate) fn check_shape(member: &str, invoke: &InvokeSignature) -> Result<()> {
    if invoke.return_type.shape != TypeShape::Void {
        return Err(Error::unrecognized(
            member,
            format!("handler returns {}", invoke.return_type.name),
        ));
    }
    for param in &invoke.params {
        let problem = match param.ty.shape {
            TypeShape::Value => continue,
            TypeShape::Void => "has type void",
            TypeShape::ByRef => "is passed by reference",
            TypeShape::Pointer => "is a pointer",
            TypeShape::OpenGeneric => "has an unresolved generic parameter",
        };
        return Err(Error::unrecognized(
            member,
            format!("parameter '{}' {}", param.name, problem),
        ));
    }
    Ok(())
}

/// Converts an `Invoke` parameter into a payload descriptor
pub(crate) fn to_payload(param: &Parameter) -> PayloadParam {
    PayloadParam {
        name: param.name.clone(),
        type_name: param.ty.name.clone(),
        is_generic: param.ty.is_generic,
        is_nested: param.ty.is_nested,
    }
}

/// Attributes a per-member failure to `member`
///
/// Metadata that cannot be decoded only costs the member that needs it, so
/// decoding errors become skips like any other unrecognized shape.
pub(crate) fn member_error(member: &str, e: Error) -> Error {
    match e {
        Error::UnrecognizedSignatureShape { reason, .. } => Error::unrecognized(member, reason),
        e if e.is_decoding() => {
            Error::unrecognized(member, format!("signature could not be decoded: {}", e))
        }
        other => other,
    }
}

/// Turns a recoverable error into a diagnostic, passing fatal ones through
pub(crate) fn recover<T>(
    module: &str,
    member: &str,
    result: Result<T>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_recoverable() => {
            let reason = match e {
                Error::UnrecognizedSignatureShape { reason, .. } => reason,
                other => other.to_string(),
            };
            info!("{}: skipping {}: {}", module, member, reason);
            diagnostics.push(Diagnostic {
                module: module.to_string(),
                member: member.to_string(),
                reason,
            });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

//! Template-ready data model.
//!
//! Extractors produce [`NormalizedSignature`]s; the [`Aggregator`] groups,
//! deduplicates and orders them into the [`TemplateModel`] handed to the
//! renderer. The model serializes with camelCase keys and carries a few
//! derived fields (`noPayload`, `parameterList`, ...) so logic-less templates
//! can use it directly.

mod aggregate;

use serde::ser::{Serialize, SerializeStruct, Serializer};

pub use aggregate::Aggregator;

/// Type name used for events that carry no data
pub const UNIT_TYPE: &str = "System.Reactive.Unit";

/// One payload parameter of a normalized signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadParam {
    /// Declared parameter name
    pub name: String,
    /// Rendered type name (`System.Int32`, `Acme.Outer.Inner`, `List<T>`)
    pub type_name: String,
    /// The type is a generic instantiation
    pub is_generic: bool,
    /// The type is nested inside another type
    pub is_nested: bool,
}

impl PayloadParam {
    /// Creates a plain (non-generic, top-level) parameter
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_generic: false,
            is_nested: false,
        }
    }
}

/// How much data a member delivers to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PayloadArity {
    /// Nothing after boilerplate was stripped
    NoPayload,
    /// Exactly one value
    SinglePayload(String),
    /// Several values, in declaration order
    MultiPayload(Vec<String>),
}

impl PayloadArity {
    /// Type observers of this member receive
    pub fn payload_type(&self) -> String {
        match self {
            PayloadArity::NoPayload => UNIT_TYPE.to_string(),
            PayloadArity::SinglePayload(ty) => ty.clone(),
            PayloadArity::MultiPayload(types) => format!("({})", types.join(", ")),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PayloadArity::NoPayload => "none",
            PayloadArity::SinglePayload(_) => "single",
            PayloadArity::MultiPayload(_) => "multiple",
        }
    }
}

impl Serialize for PayloadArity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.kind())
    }
}

/// Classifies payload parameters by count
pub fn classify(params: &[PayloadParam]) -> PayloadArity {
    match params {
        [] => PayloadArity::NoPayload,
        [single] => PayloadArity::SinglePayload(single.type_name.clone()),
        many => PayloadArity::MultiPayload(many.iter().map(|p| p.type_name.clone()).collect()),
    }
}

/// An event or delegate signature ready for templating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSignature {
    /// Namespace of the declaring type; empty for the global namespace
    pub namespace: String,
    /// Declaring type name relative to its namespace (`Outer.Inner`)
    pub declaring_type: String,
    /// Event name, or `Invoke` for delegates
    pub member_name: String,
    /// Handler delegate type of an event
    pub handler_type: Option<String>,
    /// Static event
    pub is_static: bool,
    /// Payload parameters in declaration order
    pub parameters: Vec<PayloadParam>,
    /// Every `Invoke` parameter, sender and event args included
    pub handler_parameters: Vec<PayloadParam>,
    /// Classification of `parameters`
    pub arity: PayloadArity,
}

/// Identity of a signature; equal keys are duplicates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureKey<'a> {
    /// Namespace
    pub namespace: &'a str,
    /// Declaring type
    pub declaring_type: &'a str,
    /// Member name
    pub member_name: &'a str,
    /// Payload arity and types
    pub arity: &'a PayloadArity,
}

impl NormalizedSignature {
    /// Builds a signature, classifying `parameters`
    pub fn new(
        namespace: impl Into<String>,
        declaring_type: impl Into<String>,
        member_name: impl Into<String>,
        parameters: Vec<PayloadParam>,
    ) -> Self {
        let arity = classify(&parameters);
        Self {
            namespace: namespace.into(),
            declaring_type: declaring_type.into(),
            member_name: member_name.into(),
            handler_type: None,
            is_static: false,
            handler_parameters: parameters.clone(),
            parameters,
            arity,
        }
    }

    /// Sets the full handler parameter list when boilerplate was stripped
    pub fn handler_parameters(mut self, params: Vec<PayloadParam>) -> Self {
        self.handler_parameters = params;
        self
    }

    /// Sets the handler type
    pub fn handler_type(mut self, handler: impl Into<String>) -> Self {
        self.handler_type = Some(handler.into());
        self
    }

    /// Marks the member static
    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = is_static;
        self
    }

    /// Deduplication key
    pub fn key(&self) -> SignatureKey<'_> {
        SignatureKey {
            namespace: &self.namespace,
            declaring_type: &self.declaring_type,
            member_name: &self.member_name,
            arity: &self.arity,
        }
    }

    /// Fully qualified declaring type
    pub fn full_type_name(&self) -> String {
        qualify(&self.namespace, &self.declaring_type)
    }

    fn joined(&self, item: impl Fn(&PayloadParam) -> String) -> String {
        join(&self.parameters, item)
    }
}

fn join(params: &[PayloadParam], item: impl Fn(&PayloadParam) -> String) -> String {
    params.iter().map(item).collect::<Vec<_>>().join(", ")
}

fn declaration(p: &PayloadParam) -> String {
    format!("{} {}", p.type_name, p.name)
}

impl Serialize for NormalizedSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("NormalizedSignature", 17)?;
        s.serialize_field("namespace", &self.namespace)?;
        s.serialize_field("declaringType", &self.declaring_type)?;
        s.serialize_field("declaringFullName", &self.full_type_name())?;
        s.serialize_field("name", &self.member_name)?;
        s.serialize_field("handlerType", &self.handler_type)?;
        s.serialize_field("isStatic", &self.is_static)?;
        s.serialize_field("parameters", &self.parameters)?;
        s.serialize_field("handlerParameters", &self.handler_parameters)?;
        s.serialize_field("arity", &self.arity)?;
        s.serialize_field("noPayload", &matches!(self.arity, PayloadArity::NoPayload))?;
        s.serialize_field("singlePayload", &matches!(self.arity, PayloadArity::SinglePayload(_)))?;
        s.serialize_field("multiPayload", &matches!(self.arity, PayloadArity::MultiPayload(_)))?;
        s.serialize_field("payloadType", &self.arity.payload_type())?;
        s.serialize_field("parameterList", &self.joined(declaration))?;
        s.serialize_field(
            "handlerParameterList",
            &join(&self.handler_parameters, declaration),
        )?;
        s.serialize_field("parameterTypeList", &self.joined(|p| p.type_name.clone()))?;
        s.serialize_field("parameterNameList", &self.joined(|p| p.name.clone()))?;
        s.end()
    }
}

/// A namespace and a type name relative to it
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Namespace; empty for the global namespace
    pub namespace: String,
    /// Name relative to the namespace (`Outer.Inner`)
    pub name: String,
}

impl TypeName {
    /// Creates a type name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Namespace-qualified name
    pub fn full_name(&self) -> String {
        qualify(&self.namespace, &self.name)
    }

    /// Name usable as an identifier (`Outer.Inner` becomes `OuterInner`)
    pub fn identifier(&self) -> String {
        self.name.replace('.', "")
    }
}

/// A declaring type and its members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeGroup {
    /// Type name relative to its namespace
    pub name: String,
    /// Namespace-qualified name
    pub full_name: String,
    /// Nearest base type that also exposes events
    pub parent: Option<TypeName>,
    /// Declared `static` (abstract and sealed)
    pub is_static: bool,
    /// Declared abstract
    pub is_abstract: bool,
    /// Members sorted by name
    pub members: Vec<NormalizedSignature>,
}

impl TypeGroup {
    /// Name usable as an identifier (`Outer.Inner` becomes `OuterInner`)
    pub fn identifier(&self) -> String {
        self.name.replace('.', "")
    }
}

impl Serialize for TypeGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let parent = self.parent.as_ref();
        let mut s = serializer.serialize_struct("TypeGroup", 9)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("identifier", &self.identifier())?;
        s.serialize_field("fullName", &self.full_name)?;
        s.serialize_field("parent", &parent.map(TypeName::full_name))?;
        s.serialize_field("parentNamespace", &parent.map(|p| p.namespace.as_str()))?;
        s.serialize_field("parentIdentifier", &parent.map(TypeName::identifier))?;
        s.serialize_field("isStatic", &self.is_static)?;
        s.serialize_field("isAbstract", &self.is_abstract)?;
        s.serialize_field("members", &self.members)?;
        s.end()
    }
}

/// Types of one namespace
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceGroup {
    /// Namespace; empty for the global namespace
    pub name: String,
    /// Types sorted by name
    pub types: Vec<TypeGroup>,
}

/// Everything a template can see
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateModel {
    /// Event signatures grouped by namespace
    pub namespaces: Vec<NamespaceGroup>,
    /// Delegate signatures grouped by namespace
    pub delegate_namespaces: Vec<NamespaceGroup>,
}

impl TemplateModel {
    /// Total number of event and delegate members
    pub fn member_count(&self) -> usize {
        self.namespaces
            .iter()
            .chain(&self.delegate_namespaces)
            .flat_map(|ns| &ns.types)
            .map(|t| t.members.len())
            .sum()
    }
}

/// Facts about a declaring type gathered during extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDetails {
    /// Namespace
    pub namespace: String,
    /// Type name relative to its namespace
    pub name: String,
    /// Nearest base type with events
    pub parent: Option<TypeName>,
    /// Abstract and sealed
    pub is_static: bool,
    /// Abstract
    pub is_abstract: bool,
}

/// A member skipped during extraction
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Module the member was found in
    pub module: String,
    /// `Type.Member`
    pub member: String,
    /// Why it was skipped
    pub reason: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: skipped {}: {}", self.module, self.member, self.reason)
    }
}

/// Joins a namespace and a relative type name
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

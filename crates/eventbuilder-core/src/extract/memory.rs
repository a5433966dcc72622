//! A [`TypeSystem`] assembled in memory, for extractor and pipeline tests.

use super::{
    HandlerRef, InvokeSignature, ModuleId, Parameter, RawEventMember, ResolvedHandler, TypeDesc,
    TypeHandle, TypeInfo, TypeShape, TypeSystem,
};
use crate::error::{Error, Result};

/// What an event's handler token resolves to
#[derive(Debug, Clone)]
pub(crate) enum Handler {
    /// A delegate defined in the type system
    Delegate(TypeHandle),
    /// An already resolved handler, e.g. a closed generic
    Resolved(ResolvedHandler),
    /// Signature bytes that cannot be decoded
    Undecodable(String),
    /// A reference to a type nothing defines
    Missing(String),
}

#[derive(Debug)]
struct MemoryType {
    info: TypeInfo,
    public: bool,
    base: Option<TypeHandle>,
    invoke: Option<std::result::Result<InvokeSignature, String>>,
    events: Vec<RawEventMember>,
    events_fault: Option<String>,
}

#[derive(Debug)]
struct MemoryModule {
    name: String,
    root: bool,
    types: Vec<MemoryType>,
}

/// Modules, types and handlers held in plain vectors
#[derive(Debug, Default)]
pub(crate) struct MemoryTypes {
    modules: Vec<MemoryModule>,
    handlers: Vec<Handler>,
}

/// `void Invoke(...)` with the given `(name, type)` parameters
pub(crate) fn invoke(params: &[(&str, &str)]) -> InvokeSignature {
    returning(void(), params)
}

/// `Invoke` returning `return_type`
pub(crate) fn returning(return_type: TypeDesc, params: &[(&str, &str)]) -> InvokeSignature {
    InvokeSignature {
        return_type,
        params: params
            .iter()
            .map(|(name, ty)| Parameter {
                name: name.to_string(),
                ty: TypeDesc::named(*ty),
            })
            .collect(),
    }
}

pub(crate) fn void() -> TypeDesc {
    TypeDesc {
        name: "System.Void".into(),
        shape: TypeShape::Void,
        ..TypeDesc::default()
    }
}

/// `System.EventHandler`
pub(crate) fn event_handler() -> Handler {
    Handler::Resolved(ResolvedHandler {
        type_name: "System.EventHandler".into(),
        invoke: invoke(&[("sender", "System.Object"), ("e", "System.EventArgs")]),
    })
}

/// `System.EventHandler<args>`
pub(crate) fn generic_event_handler(args: &str) -> Handler {
    Handler::Resolved(ResolvedHandler {
        type_name: format!("System.EventHandler<{}>", args),
        invoke: invoke(&[("sender", "System.Object"), ("e", args)]),
    })
}

impl MemoryTypes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A module extraction walks
    pub(crate) fn module(&mut self, name: &str) -> ModuleId {
        self.push_module(name, true)
    }

    /// A dependency: its types resolve but are not extracted
    pub(crate) fn library(&mut self, name: &str) -> ModuleId {
        self.push_module(name, false)
    }

    fn push_module(&mut self, name: &str, root: bool) -> ModuleId {
        self.modules.push(MemoryModule {
            name: name.to_string(),
            root,
            types: Vec::new(),
        });
        self.modules.len() - 1
    }

    /// A public, non-generic class
    pub(crate) fn class(&mut self, module: ModuleId, namespace: &str, name: &str) -> TypeHandle {
        let types = &mut self.modules[module].types;
        types.push(MemoryType {
            info: TypeInfo {
                namespace: namespace.to_string(),
                name: name.to_string(),
                ..TypeInfo::default()
            },
            public: true,
            base: None,
            invoke: None,
            events: Vec::new(),
            events_fault: None,
        });
        TypeHandle {
            module,
            row: types.len() as u32,
        }
    }

    /// A public delegate with the given `Invoke`
    pub(crate) fn delegate(
        &mut self,
        module: ModuleId,
        namespace: &str,
        name: &str,
        signature: InvokeSignature,
    ) -> TypeHandle {
        let ty = self.class(module, namespace, name);
        self.get_mut(ty).invoke = Some(Ok(signature));
        self.get_mut(ty).info.is_sealed = true;
        ty
    }

    /// A public delegate whose `Invoke` signature cannot be decoded
    pub(crate) fn undecodable_delegate(
        &mut self,
        module: ModuleId,
        namespace: &str,
        name: &str,
        details: &str,
    ) -> TypeHandle {
        let ty = self.class(module, namespace, name);
        self.get_mut(ty).invoke = Some(Err(details.to_string()));
        ty
    }

    /// Mutable names and flags of a type
    pub(crate) fn info_mut(&mut self, ty: TypeHandle) -> &mut TypeInfo {
        &mut self.get_mut(ty).info
    }

    pub(crate) fn hide(&mut self, ty: TypeHandle) {
        self.get_mut(ty).public = false;
    }

    pub(crate) fn set_base(&mut self, ty: TypeHandle, base: TypeHandle) {
        self.get_mut(ty).base = Some(base);
    }

    /// Makes reading the events of `ty` fail to decode
    pub(crate) fn break_events(&mut self, ty: TypeHandle, details: &str) {
        self.get_mut(ty).events_fault = Some(details.to_string());
    }

    /// A public instance event
    pub(crate) fn event(&mut self, ty: TypeHandle, name: &str, handler: Handler) {
        self.push_event(ty, name, handler, false);
    }

    /// A public static event
    pub(crate) fn static_event(&mut self, ty: TypeHandle, name: &str, handler: Handler) {
        self.push_event(ty, name, handler, true);
    }

    fn push_event(&mut self, ty: TypeHandle, name: &str, handler: Handler, is_static: bool) {
        self.handlers.push(handler);
        let token = self.handlers.len() as u32;
        self.get_mut(ty).events.push(RawEventMember {
            declaring: ty,
            name: name.to_string(),
            is_static,
            is_public: true,
            handler: HandlerRef {
                module: ty.module,
                token,
            },
        });
    }

    fn get(&self, ty: TypeHandle) -> Result<&MemoryType> {
        ty.row
            .checked_sub(1)
            .and_then(|i| self.modules.get(ty.module)?.types.get(i as usize))
            .ok_or_else(|| Error::malformed(format!("no type at {:?}", ty)))
    }

    fn get_mut(&mut self, ty: TypeHandle) -> &mut MemoryType {
        &mut self.modules[ty.module].types[ty.row as usize - 1]
    }

    fn invoke_of(&self, ty: TypeHandle) -> Result<InvokeSignature> {
        let found = self.get(ty)?;
        match &found.invoke {
            Some(Ok(invoke)) => Ok(invoke.clone()),
            Some(Err(details)) => Err(Error::malformed(details.clone())),
            None => Err(Error::unrecognized(found.info.full_name(), "not a delegate")),
        }
    }
}

impl TypeSystem for MemoryTypes {
    fn modules(&self) -> Vec<ModuleId> {
        (0..self.modules.len())
            .filter(|&m| self.modules[m].root)
            .collect()
    }

    fn module_name(&self, module: ModuleId) -> &str {
        &self.modules[module].name
    }

    fn public_types(&self, module: ModuleId) -> Result<Vec<TypeHandle>> {
        Ok(self.modules[module]
            .types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.public)
            .map(|(i, _)| TypeHandle {
                module,
                row: i as u32 + 1,
            })
            .collect())
    }

    fn type_info(&self, ty: TypeHandle) -> Result<TypeInfo> {
        Ok(self.get(ty)?.info.clone())
    }

    fn events(&self, ty: TypeHandle) -> Result<Vec<RawEventMember>> {
        let found = self.get(ty)?;
        match &found.events_fault {
            Some(details) => Err(Error::malformed(details.clone())),
            None => Ok(found.events.clone()),
        }
    }

    fn resolve_handler(&self, handler: &HandlerRef) -> Result<ResolvedHandler> {
        let entry = handler
            .token
            .checked_sub(1)
            .and_then(|i| self.handlers.get(i as usize))
            .ok_or_else(|| Error::malformed(format!("no handler {:#x}", handler.token)))?;
        match entry {
            Handler::Delegate(ty) => Ok(ResolvedHandler {
                type_name: self.get(*ty)?.info.full_name(),
                invoke: self.invoke_of(*ty)?,
            }),
            Handler::Resolved(resolved) => Ok(resolved.clone()),
            Handler::Undecodable(details) => Err(Error::malformed(details.clone())),
            Handler::Missing(name) => Err(Error::unrecognized(name.clone(), "type not found")),
        }
    }

    fn is_delegate(&self, ty: TypeHandle) -> Result<bool> {
        Ok(self.get(ty)?.invoke.is_some())
    }

    fn delegate_invoke(&self, ty: TypeHandle) -> Result<InvokeSignature> {
        self.invoke_of(ty)
    }

    fn base_type(&self, ty: TypeHandle) -> Result<Option<TypeHandle>> {
        Ok(self.get(ty)?.base)
    }
}

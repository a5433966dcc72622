//! [`TypeSystem`] over a [`ModuleSet`]: type naming, cross-module resolution
//! and delegate signatures.

use super::assembly::{method_flags, type_flags, Assembly, RefScope, TypeToken};
use super::ModuleSet;
use crate::error::{Error, Result};
use crate::extract::{
    HandlerRef, InvokeSignature, ModuleId, Parameter, RawEventMember, ResolvedHandler, TypeDesc,
    TypeHandle, TypeInfo, TypeShape, TypeSystem,
};
use crate::model::qualify;
use dotscope::metadata::signatures::{SignatureParameter, TypeSignature};
use dotscope::metadata::token::Token;

/// Forwarders and nesting levels followed before giving up
const MAX_RESOLVE_DEPTH: usize = 16;

/// Nesting limit when rendering TypeSpecs that refer to TypeSpecs
const MAX_RENDER_DEPTH: usize = 32;

const INVOKE: &str = "Invoke";

/// Removes a trailing generic arity marker (`` List`1 `` → `List`)
pub(crate) fn strip_arity(name: &str) -> &str {
    match name.rfind('`') {
        Some(i) if i + 1 < name.len() && name[i + 1..].bytes().all(|b| b.is_ascii_digit()) => {
            &name[..i]
        }
        _ => name,
    }
}

/// Framework name of a primitive element type
fn primitive_name(sig: &TypeSignature) -> Option<&'static str> {
    let name = match sig {
        TypeSignature::Boolean => "System.Boolean",
        TypeSignature::Char => "System.Char",
        TypeSignature::I1 => "System.SByte",
        TypeSignature::U1 => "System.Byte",
        TypeSignature::I2 => "System.Int16",
        TypeSignature::U2 => "System.UInt16",
        TypeSignature::I4 => "System.Int32",
        TypeSignature::U4 => "System.UInt32",
        TypeSignature::I8 => "System.Int64",
        TypeSignature::U8 => "System.UInt64",
        TypeSignature::R4 => "System.Single",
        TypeSignature::R8 => "System.Double",
        TypeSignature::I => "System.IntPtr",
        TypeSignature::U => "System.UIntPtr",
        TypeSignature::String => "System.String",
        TypeSignature::Object => "System.Object",
        TypeSignature::TypedByRef => "System.TypedReference",
        _ => return None,
    };
    Some(name)
}

fn open_generic(name: String) -> TypeDesc {
    TypeDesc {
        name,
        shape: TypeShape::OpenGeneric,
        is_generic: true,
        is_nested: false,
    }
}

impl ModuleSet {
    fn assembly(&self, module: ModuleId) -> &Assembly {
        self.module(module)
    }

    /// Namespace and dotted relative name of a TypeDef
    fn def_names(&self, ty: TypeHandle) -> Result<(String, String)> {
        let assembly = self.assembly(ty.module);
        let mut segments = Vec::new();
        let mut row = ty.row;
        for _ in 0..MAX_RESOLVE_DEPTH {
            let (namespace, name) = assembly.def_name(row)?;
            segments.push(strip_arity(name));
            match assembly.enclosing_type(row) {
                Some(outer) => row = outer,
                None => {
                    segments.reverse();
                    return Ok((namespace.to_string(), segments.join(".")));
                }
            }
        }
        Err(Error::malformed(format!("type nesting too deep at TypeDef {}", ty.row)))
    }

    /// Namespace and dotted relative name of a TypeRef, from its own metadata
    fn ref_names(&self, assembly: &Assembly, row: u32) -> Result<(String, String)> {
        let mut segments = Vec::new();
        let mut current = row;
        for _ in 0..MAX_RESOLVE_DEPTH {
            let type_ref = assembly.type_ref(current)?;
            segments.push(strip_arity(type_ref.name));
            if let RefScope::Enclosing(outer) = type_ref.scope {
                current = outer;
                continue;
            }
            segments.reverse();
            return Ok((type_ref.namespace.to_string(), segments.join(".")));
        }
        Err(Error::malformed(format!("type nesting too deep at TypeRef {}", row)))
    }

    /// Renders a type signature as a payload type
    fn render(
        &self,
        module: ModuleId,
        sig: &TypeSignature,
        args: &[TypeDesc],
        depth: usize,
    ) -> Result<TypeDesc> {
        if depth > MAX_RENDER_DEPTH {
            return Err(Error::malformed("type signature nests too deeply"));
        }
        if let Some(name) = primitive_name(sig) {
            return Ok(TypeDesc::named(name));
        }
        let desc = match sig {
            TypeSignature::Void => TypeDesc {
                name: "System.Void".to_string(),
                shape: TypeShape::Void,
                ..TypeDesc::default()
            },
            TypeSignature::Class(token) | TypeSignature::ValueType(token) => {
                self.render_named(module, type_token(*token)?, args, depth)?
            }
            TypeSignature::GenericInst(base, type_args) => {
                let base = self.render(module, base, args, depth + 1)?;
                let type_args = type_args
                    .iter()
                    .map(|a| self.render(module, a, args, depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                let names: Vec<&str> = type_args.iter().map(|a| a.name.as_str()).collect();
                TypeDesc {
                    name: format!("{}<{}>", base.name, names.join(",")),
                    shape: type_args
                        .iter()
                        .map(|a| a.shape)
                        .find(|s| *s != TypeShape::Value)
                        .unwrap_or(TypeShape::Value),
                    is_generic: true,
                    is_nested: base.is_nested,
                }
            }
            TypeSignature::GenericParamType(n) => match args.get(*n as usize) {
                Some(arg) => arg.clone(),
                None => open_generic(format!("!{}", n)),
            },
            TypeSignature::GenericParamMethod(n) => open_generic(format!("!!{}", n)),
            TypeSignature::SzArray(array) => {
                let inner = self.render(module, &array.base, args, depth + 1)?;
                TypeDesc {
                    name: format!("{}[]", inner.name),
                    ..inner
                }
            }
            TypeSignature::Array(array) => {
                let inner = self.render(module, &array.base, args, depth + 1)?;
                let commas = ",".repeat(array.rank.saturating_sub(1) as usize);
                TypeDesc {
                    name: format!("{}[{}]", inner.name, commas),
                    ..inner
                }
            }
            TypeSignature::Ptr(pointer) => {
                let inner = self.render(module, &pointer.base, args, depth + 1)?;
                TypeDesc {
                    name: format!("{}*", inner.name),
                    shape: TypeShape::Pointer,
                    ..inner
                }
            }
            TypeSignature::ByRef(inner) => by_ref(self.render(module, inner, args, depth + 1)?),
            TypeSignature::Pinned(inner) => self.render(module, inner, args, depth + 1)?,
            TypeSignature::FnPtr(_) => TypeDesc {
                name: "method*".to_string(),
                shape: TypeShape::Pointer,
                ..TypeDesc::default()
            },
            other => {
                return Err(Error::malformed(format!(
                    "{:?} cannot appear as a parameter type",
                    other
                )));
            }
        };
        Ok(desc)
    }

    /// Renders a parameter, marking by-ref parameters
    fn render_param(
        &self,
        module: ModuleId,
        param: &SignatureParameter,
        args: &[TypeDesc],
    ) -> Result<TypeDesc> {
        let desc = self.render(module, &param.base, args, 0)?;
        Ok(if param.by_ref { by_ref(desc) } else { desc })
    }

    fn render_named(
        &self,
        module: ModuleId,
        target: TypeToken,
        args: &[TypeDesc],
        depth: usize,
    ) -> Result<TypeDesc> {
        let assembly = self.assembly(module);
        let (namespace, name, is_nested) = match target {
            TypeToken::Def(row) => {
                let (ns, name) = self.def_names(TypeHandle { module, row })?;
                (ns, name, assembly.enclosing_type(row).is_some())
            }
            TypeToken::Ref(row) => {
                let (ns, name) = self.ref_names(assembly, row)?;
                let nested = matches!(assembly.type_ref(row)?.scope, RefScope::Enclosing(_));
                (ns, name, nested)
            }
            TypeToken::Spec(row) => {
                let spec = assembly.type_spec(row)?;
                return self.render(module, &spec, args, depth + 1);
            }
        };
        Ok(TypeDesc {
            name: qualify(&namespace, &name),
            is_nested,
            ..TypeDesc::default()
        })
    }

    /// Resolves a TypeDef, TypeRef or TypeSpec to the definition it names
    fn resolve_type(&self, module: ModuleId, target: TypeToken, depth: usize) -> Result<TypeHandle> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(Error::unrecognized(
                self.render_named(module, target, &[], 0)?.name,
                "type resolution chain too long",
            ));
        }
        match target {
            TypeToken::Def(row) => Ok(TypeHandle { module, row }),
            TypeToken::Ref(row) => self.resolve_type_ref(module, row, depth),
            TypeToken::Spec(row) => match self.assembly(module).type_spec(row)? {
                TypeSignature::GenericInst(base, _) => match *base {
                    TypeSignature::Class(inner) | TypeSignature::ValueType(inner) => {
                        self.resolve_type(module, type_token(inner)?, depth + 1)
                    }
                    other => Err(Error::unrecognized(
                        format!("{:?}", other),
                        "generic instance of a non-named type",
                    )),
                },
                TypeSignature::Class(inner) | TypeSignature::ValueType(inner) => {
                    self.resolve_type(module, type_token(inner)?, depth + 1)
                }
                other => Err(Error::unrecognized(
                    format!("{:?}", other),
                    "type specification does not name a definition",
                )),
            },
        }
    }

    fn resolve_type_ref(&self, module: ModuleId, row: u32, depth: usize) -> Result<TypeHandle> {
        let assembly = self.assembly(module);
        let type_ref = assembly.type_ref(row)?;

        match type_ref.scope {
            RefScope::Local => self.find_in(module, type_ref.namespace, type_ref.name, depth),
            RefScope::Enclosing(outer_row) => {
                let outer = self.resolve_type_ref(module, outer_row, depth + 1)?;
                self.assembly(outer.module)
                    .find_nested(outer.row, type_ref.name)
                    .map(|row| TypeHandle {
                        module: outer.module,
                        row,
                    })
                    .ok_or_else(|| {
                        Error::unrecognized(
                            type_ref.name,
                            format!(
                                "nested type not found in '{}'",
                                self.assembly(outer.module).name()
                            ),
                        )
                    })
            }
            RefScope::Assembly(assembly_ref) => {
                let target = self.handle(module).dependency(assembly_ref).ok_or_else(|| {
                    let wanted = assembly
                        .references()
                        .get(assembly_ref as usize - 1)
                        .cloned()
                        .unwrap_or_default();
                    Error::unrecognized(
                        qualify(type_ref.namespace, type_ref.name),
                        format!("assembly '{}' is not loaded", wanted),
                    )
                })?;
                self.find_in(target, type_ref.namespace, type_ref.name, depth + 1)
            }
        }
    }

    /// Finds a top-level type in `module`, following type forwarders
    fn find_in(&self, module: ModuleId, namespace: &str, name: &str, depth: usize) -> Result<TypeHandle> {
        let assembly = self.assembly(module);
        if let Some(row) = assembly.find_type(namespace, name) {
            return Ok(TypeHandle { module, row });
        }
        let not_found = || {
            Error::unrecognized(
                qualify(namespace, name),
                format!("type not found in '{}'", assembly.name()),
            )
        };
        let forwarded = assembly.find_forwarder(namespace, name).ok_or_else(not_found)?;
        if depth > MAX_RESOLVE_DEPTH {
            return Err(not_found());
        }
        let target = self.handle(module).dependency(forwarded).ok_or_else(not_found)?;
        self.find_in(target, namespace, name, depth + 1)
    }

    /// `Invoke` of a delegate definition with `args` substituted for `!N`
    fn invoke_of(&self, ty: TypeHandle, args: &[TypeDesc]) -> Result<InvokeSignature> {
        let assembly = self.assembly(ty.module);
        let mut invoke = None;
        for method in assembly.methods_of(ty.row)? {
            if assembly.method(method)?.0 == INVOKE {
                invoke = Some(method);
                break;
            }
        }
        let Some(method) = invoke else {
            let (ns, name) = self.def_names(ty)?;
            return Err(Error::unrecognized(qualify(&ns, &name), "delegate has no Invoke method"));
        };

        let sig = assembly.method_sig(method)?;
        let names = assembly.param_names(method)?;
        let return_type = self.render_param(ty.module, &sig.return_type, args)?;
        let params = sig
            .params
            .iter()
            .enumerate()
            .map(|(i, param)| {
                let sequence = i as u32 + 1;
                let name = names
                    .get(&sequence)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("arg{}", sequence));
                Ok(Parameter {
                    name,
                    ty: self.render_param(ty.module, param, args)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InvokeSignature {
            return_type,
            params,
        })
    }

    fn is_visible(&self, assembly: &Assembly, row: u32) -> Result<bool> {
        let mut row = row;
        for _ in 0..MAX_RESOLVE_DEPTH {
            let visibility = assembly.type_def(row)?.flags & type_flags::VISIBILITY_MASK;
            match assembly.enclosing_type(row) {
                None => return Ok(visibility == type_flags::PUBLIC),
                Some(outer) if visibility == type_flags::NESTED_PUBLIC => row = outer,
                Some(_) => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Namespace and raw name of a TypeDef or TypeRef, without resolution
    fn raw_name(&self, module: ModuleId, target: TypeToken) -> Result<Option<(&str, &str)>> {
        let assembly = self.assembly(module);
        match target {
            TypeToken::Def(row) => assembly.def_name(row).map(Some),
            TypeToken::Ref(row) => {
                let type_ref = assembly.type_ref(row)?;
                Ok(Some((type_ref.namespace, type_ref.name)))
            }
            TypeToken::Spec(_) => Ok(None),
        }
    }
}

/// A type token from a signature; anything else is malformed
fn type_token(token: Token) -> Result<TypeToken> {
    TypeToken::from_token(token).ok_or_else(|| {
        Error::malformed(format!("token {:#010x} does not name a type", token.value()))
    })
}

fn by_ref(inner: TypeDesc) -> TypeDesc {
    TypeDesc {
        name: format!("{}&", inner.name),
        shape: TypeShape::ByRef,
        ..inner
    }
}

impl TypeSystem for ModuleSet {
    fn modules(&self) -> Vec<ModuleId> {
        (0..self.root_count()).collect()
    }

    fn module_name(&self, module: ModuleId) -> &str {
        self.assembly(module).name()
    }

    fn public_types(&self, module: ModuleId) -> Result<Vec<TypeHandle>> {
        let assembly = self.assembly(module);
        let mut types = Vec::new();
        for row in 1..=assembly.type_count() {
            if self.is_visible(assembly, row)? {
                types.push(TypeHandle { module, row });
            }
        }
        Ok(types)
    }

    fn type_info(&self, ty: TypeHandle) -> Result<TypeInfo> {
        let assembly = self.assembly(ty.module);
        let flags = assembly.type_def(ty.row)?.flags;
        let (namespace, name) = self.def_names(ty)?;
        Ok(TypeInfo {
            namespace,
            name,
            is_interface: flags & type_flags::INTERFACE != 0,
            is_abstract: flags & type_flags::ABSTRACT != 0,
            is_sealed: flags & type_flags::SEALED != 0,
            is_generic: assembly.is_generic(ty.row),
            is_nested: assembly.enclosing_type(ty.row).is_some(),
        })
    }

    fn events(&self, ty: TypeHandle) -> Result<Vec<RawEventMember>> {
        let assembly = self.assembly(ty.module);
        let mut members = Vec::new();
        for row in assembly.events_of(ty.row) {
            let (name, handler) = assembly.event(row)?;
            let Some(handler) = handler else {
                return Err(Error::malformed(format!("event '{}' has no handler type", name)));
            };
            let (is_public, is_static) = match assembly.add_accessor(row) {
                Some(method) => {
                    let flags = assembly.method(method)?.1;
                    (
                        flags & method_flags::ACCESS_MASK == method_flags::PUBLIC,
                        flags & method_flags::STATIC != 0,
                    )
                }
                None => (false, false),
            };
            members.push(RawEventMember {
                declaring: ty,
                name: name.to_string(),
                is_static,
                is_public,
                handler: HandlerRef {
                    module: ty.module,
                    token: handler.token(),
                },
            });
        }
        Ok(members)
    }

    fn resolve_handler(&self, handler: &HandlerRef) -> Result<ResolvedHandler> {
        let module = handler.module;
        let target = type_token(Token::new(handler.token))?;
        let type_name = self.render_named(module, target, &[], 0)?.name;

        let (definition, args) = match target {
            TypeToken::Spec(row) => match self.assembly(module).type_spec(row)? {
                TypeSignature::GenericInst(base, type_args) => {
                    let (TypeSignature::Class(base) | TypeSignature::ValueType(base)) = *base
                    else {
                        return Err(Error::unrecognized(type_name, "handler is not a named type"));
                    };
                    let args = type_args
                        .iter()
                        .map(|a| self.render(module, a, &[], 0))
                        .collect::<Result<Vec<_>>>()?;
                    (self.resolve_type(module, type_token(base)?, 0)?, args)
                }
                TypeSignature::Class(inner) | TypeSignature::ValueType(inner) => {
                    (self.resolve_type(module, type_token(inner)?, 0)?, Vec::new())
                }
                _ => return Err(Error::unrecognized(type_name, "handler is not a named type")),
            },
            _ => (self.resolve_type(module, target, 0)?, Vec::new()),
        };

        if !self.is_delegate(definition)? {
            return Err(Error::unrecognized(type_name, "handler type is not a delegate"));
        }
        let invoke = self.invoke_of(definition, &args)?;
        Ok(ResolvedHandler { type_name, invoke })
    }

    fn is_delegate(&self, ty: TypeHandle) -> Result<bool> {
        let Some(extends) = self.assembly(ty.module).extends(ty.row)? else {
            return Ok(false);
        };
        Ok(self.raw_name(ty.module, extends)? == Some(("System", "MulticastDelegate")))
    }

    fn delegate_invoke(&self, ty: TypeHandle) -> Result<InvokeSignature> {
        self.invoke_of(ty, &[])
    }

    fn base_type(&self, ty: TypeHandle) -> Result<Option<TypeHandle>> {
        match self.assembly(ty.module).extends(ty.row)? {
            Some(extends) => self.resolve_type(ty.module, extends, 0).map(Some),
            None => Ok(None),
        }
    }
}

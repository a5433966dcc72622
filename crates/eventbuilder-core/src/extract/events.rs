//! Public event extraction.

use super::{
    check_shape, member_error, recover, to_payload, ExtractOptions, Extraction, Parameter,
    RawEventMember, TypeHandle, TypeInfo, TypeSystem,
};
use crate::error::Result;
use crate::model::{NormalizedSignature, PayloadParam, TypeDetails, TypeName};
use rayon::prelude::*;
use tracing::{debug, trace};

/// Base-type hops followed when looking for a parent with events
const MAX_BASE_DEPTH: usize = 64;

const EVENT_ARGS: &str = "System.EventArgs";
const OBJECT: &str = "System.Object";

/// Walks public types and normalizes their events
#[derive(Debug)]
pub struct EventExtractor<'a, T: TypeSystem + ?Sized> {
    types: &'a T,
    options: &'a ExtractOptions,
}

impl<'a, T: TypeSystem + ?Sized> EventExtractor<'a, T> {
    /// Creates an extractor over `types`
    pub fn new(types: &'a T, options: &'a ExtractOptions) -> Self {
        Self { types, options }
    }

    /// Extracts events from every module, one module per worker
    pub fn extract(&self) -> Result<Extraction> {
        let modules = self.types.modules();
        let results: Vec<Result<Extraction>> = modules
            .par_iter()
            .map(|&module| self.extract_module(module))
            .collect();

        let mut extraction = Extraction::default();
        for result in results {
            extraction.extend(result?);
        }
        debug!(
            "Extracted {} event(s), {} skipped",
            extraction.signatures.len(),
            extraction.diagnostics.len()
        );
        Ok(extraction)
    }

    fn extract_module(&self, module: usize) -> Result<Extraction> {
        let module_name = self.types.module_name(module);
        let mut out = Extraction::default();

        for ty in self.types.public_types(module)? {
            let info = self.types.type_info(ty)?;
            if info.is_interface || info.is_generic {
                continue;
            }
            if self.options.is_excluded(&info.namespace) {
                trace!("{}: {} is in an excluded namespace", module_name, info.full_name());
                continue;
            }

            let scoped = self
                .scoped_events(ty)
                .map_err(|e| member_error(&info.name, e));
            let Some(events) = recover(module_name, &info.name, scoped, &mut out.diagnostics)? else {
                continue;
            };
            if events.is_empty() {
                continue;
            }

            for event in &events {
                let member = format!("{}.{}", info.name, event.name);
                let normalized = self.normalize(&info, event, &member);
                if let Some(sig) = recover(module_name, &member, normalized, &mut out.diagnostics)? {
                    trace!("{}: {} -> {:?}", module_name, member, sig.arity);
                    out.signatures.push(sig);
                }
            }

            out.types.push(TypeDetails {
                namespace: info.namespace.clone(),
                name: info.name.clone(),
                parent: self.parent_of(ty),
                is_static: info.is_static(),
                is_abstract: info.is_abstract,
            });
        }

        debug!(
            "{}: {} event(s) on {} type(s)",
            module_name,
            out.signatures.len(),
            out.types.len()
        );
        Ok(out)
    }

    /// Public events of `ty` matching the configured scope
    fn scoped_events(&self, ty: TypeHandle) -> Result<Vec<RawEventMember>> {
        Ok(self
            .types
            .events(ty)?
            .into_iter()
            .filter(|e| e.is_public && self.options.scope.includes(e.is_static))
            .collect())
    }

    fn normalize(
        &self,
        info: &TypeInfo,
        event: &RawEventMember,
        member: &str,
    ) -> Result<NormalizedSignature> {
        let handler = self
            .types
            .resolve_handler(&event.handler)
            .map_err(|e| member_error(member, e))?;
        check_shape(member, &handler.invoke)?;

        Ok(NormalizedSignature::new(
            info.namespace.clone(),
            info.name.clone(),
            event.name.clone(),
            strip_boilerplate(&handler.invoke.params),
        )
        .handler_parameters(handler.invoke.params.iter().map(to_payload).collect())
        .handler_type(handler.type_name)
        .is_static(event.is_static))
    }

    /// Nearest base type exposing events in scope
    fn parent_of(&self, ty: TypeHandle) -> Option<TypeName> {
        let mut current = ty;
        for _ in 0..MAX_BASE_DEPTH {
            let base = match self.types.base_type(current) {
                Ok(Some(base)) => base,
                Ok(None) => return None,
                Err(e) => {
                    trace!("Stopping base walk: {}", e);
                    return None;
                }
            };
            if self.scoped_events(base).map_or(false, |events| !events.is_empty()) {
                return self
                    .types
                    .type_info(base)
                    .ok()
                    .map(|info| TypeName::new(info.namespace, info.name));
            }
            current = base;
        }
        None
    }
}

/// Drops the sender and plain `EventArgs` parameters
pub(crate) fn strip_boilerplate(params: &[Parameter]) -> Vec<PayloadParam> {
    let rest = match params {
        [first, tail @ ..]
            if first.name == "sender" || (first.ty.name == OBJECT && params.len() >= 2) =>
        {
            tail
        }
        _ => params,
    };
    rest.iter()
        .filter(|p| p.ty.name != EVENT_ARGS)
        .map(to_payload)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::memory::{
        event_handler, generic_event_handler, invoke, returning, Handler, MemoryTypes,
    };
    use crate::extract::{EventScope, TypeDesc, TypeShape};
    use crate::model::PayloadArity;
    use pretty_assertions::assert_eq;

    fn param(name: &str, ty: &str) -> Parameter {
        Parameter {
            name: name.into(),
            ty: TypeDesc::named(ty),
        }
    }

    fn names(params: &[PayloadParam]) -> Vec<&str> {
        params.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_strip_sender_and_event_args() {
        let stripped = strip_boilerplate(&[param("sender", OBJECT), param("e", EVENT_ARGS)]);
        assert!(stripped.is_empty());

        let stripped = strip_boilerplate(&[param("s", OBJECT), param("e", "Acme.MovedEventArgs")]);
        assert_eq!(names(&stripped), vec!["e"]);

        // a lone object parameter is data, not a sender
        let stripped = strip_boilerplate(&[param("value", OBJECT)]);
        assert_eq!(names(&stripped), vec!["value"]);

        let stripped = strip_boilerplate(&[param("x", "System.Int32"), param("y", "System.Int32")]);
        assert_eq!(names(&stripped), vec!["x", "y"]);
    }

    /// Acme: Widget with Clicked (EventHandler) and ValueChanged (int)
    fn acme() -> MemoryTypes {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        let value_handler = types.delegate(
            acme,
            "Acme",
            "ValueChangedHandler",
            invoke(&[("value", "System.Int32")]),
        );
        let widget = types.class(acme, "Acme", "Widget");
        types.event(widget, "ValueChanged", Handler::Delegate(value_handler));
        types.event(widget, "Clicked", event_handler());
        types
    }

    fn extract(types: &MemoryTypes, scope: EventScope) -> Extraction {
        let options = ExtractOptions {
            scope,
            ..Default::default()
        };
        EventExtractor::new(types, &options).extract().unwrap()
    }

    #[test]
    fn test_extracts_widget_events() {
        let types = acme();
        let extraction = extract(&types, EventScope::Instance);
        assert!(extraction.diagnostics.is_empty());

        let mut sigs = extraction.signatures;
        sigs.sort_by(|a, b| a.member_name.cmp(&b.member_name));
        assert_eq!(sigs.len(), 2);
        assert_eq!(sigs[0].member_name, "Clicked");
        assert_eq!(sigs[0].arity, PayloadArity::NoPayload);
        assert_eq!(sigs[0].handler_type.as_deref(), Some("System.EventHandler"));
        assert_eq!(sigs[1].member_name, "ValueChanged");
        assert_eq!(
            sigs[1].arity,
            PayloadArity::SinglePayload("System.Int32".to_string())
        );
    }

    #[test]
    fn test_handler_parameters_survive_stripping() {
        let types = acme();
        let extraction = extract(&types, EventScope::Instance);
        let clicked = extraction
            .signatures
            .iter()
            .find(|s| s.member_name == "Clicked")
            .unwrap();
        assert!(clicked.parameters.is_empty());
        assert_eq!(names(&clicked.handler_parameters), vec!["sender", "e"]);
        assert_eq!(clicked.handler_parameters[1].type_name, EVENT_ARGS);

        let changed = extraction
            .signatures
            .iter()
            .find(|s| s.member_name == "ValueChanged")
            .unwrap();
        assert_eq!(names(&changed.handler_parameters), vec!["value"]);
    }

    #[test]
    fn test_static_scope_and_skips() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        let closing = types.delegate(
            acme,
            "Acme",
            "ClosingHandler",
            returning(TypeDesc::named("System.Boolean"), &[]),
        );
        let mut keyed = invoke(&[]);
        keyed.params.push(Parameter {
            name: "handled".into(),
            ty: TypeDesc {
                name: "System.Boolean&".into(),
                shape: TypeShape::ByRef,
                ..TypeDesc::default()
            },
        });
        let keyed = types.delegate(acme, "Acme", "KeyHandler", keyed);
        let window = types.class(acme, "Acme", "Window");
        types.event(window, "Closing", Handler::Delegate(closing));
        types.event(window, "Key", Handler::Delegate(keyed));
        types.static_event(window, "Created", event_handler());

        let instance = extract(&types, EventScope::Instance);
        assert!(instance.signatures.is_empty());
        let mut skipped: Vec<_> = instance.diagnostics.iter().map(|d| d.member.as_str()).collect();
        skipped.sort();
        assert_eq!(skipped, vec!["Window.Closing", "Window.Key"]);

        let statics = extract(&types, EventScope::Static);
        assert_eq!(statics.signatures.len(), 1);
        assert_eq!(statics.signatures[0].member_name, "Created");
        assert!(statics.signatures[0].is_static);
    }

    #[test]
    fn test_undecodable_handler_is_skipped() {
        let mut types = acme();
        let widget = TypeHandle { module: 0, row: 2 };
        types.event(
            widget,
            "Resized",
            Handler::Undecodable("blob offset 0x4c out of range".into()),
        );
        types.event(widget, "Dropped", Handler::Missing("Acme.Drag.DropHandler".into()));

        let extraction = extract(&types, EventScope::Instance);
        assert_eq!(extraction.signatures.len(), 2);

        let mut diagnostics = extraction.diagnostics;
        diagnostics.sort_by(|a, b| a.member.cmp(&b.member));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].member, "Widget.Dropped");
        assert_eq!(diagnostics[0].reason, "type not found");
        assert_eq!(diagnostics[1].member, "Widget.Resized");
        assert!(diagnostics[1].reason.contains("could not be decoded"));
        assert!(diagnostics[1].reason.contains("0x4c"));
    }

    #[test]
    fn test_undecodable_event_table_skips_type() {
        let mut types = acme();
        let panel = types.class(0, "Acme", "Panel");
        types.event(panel, "Scrolled", event_handler());
        types.break_events(panel, "Event row 7 out of range");

        let extraction = extract(&types, EventScope::Instance);
        assert_eq!(extraction.signatures.len(), 2);
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].member, "Panel");
        assert!(extraction.diagnostics[0].reason.contains("Event row 7"));
    }

    #[test]
    fn test_generic_handler_and_parent() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        let widget = types.class(acme, "Acme", "Widget");
        types.event(widget, "Clicked", event_handler());
        let button = types.class(acme, "Acme", "Button");
        types.set_base(button, widget);
        types.event(button, "Moved", generic_event_handler("Acme.MovedEventArgs"));

        let extraction = extract(&types, EventScope::Instance);
        let moved = extraction
            .signatures
            .iter()
            .find(|s| s.member_name == "Moved")
            .unwrap();
        assert_eq!(
            moved.arity,
            PayloadArity::SinglePayload("Acme.MovedEventArgs".to_string())
        );
        assert_eq!(
            moved.handler_type.as_deref(),
            Some("System.EventHandler<Acme.MovedEventArgs>")
        );

        let button = extraction.types.iter().find(|t| t.name == "Button").unwrap();
        assert_eq!(button.parent, Some(TypeName::new("Acme", "Widget")));
        let widget = extraction.types.iter().find(|t| t.name == "Widget").unwrap();
        assert_eq!(widget.parent, None);
    }

    #[test]
    fn test_parent_found_across_modules() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        let ui = types.library("Acme.UI");
        let control = types.class(ui, "Acme.UI", "Control");
        types.event(control, "Focused", event_handler());
        // a base without events is walked through
        let panel = types.class(ui, "Acme.UI", "Panel");
        types.set_base(panel, control);
        let widget = types.class(acme, "Acme", "Widget");
        types.set_base(widget, panel);
        types.event(widget, "Clicked", event_handler());

        let extraction = extract(&types, EventScope::Instance);
        // library types are not extracted themselves
        assert_eq!(extraction.signatures.len(), 1);
        assert_eq!(
            extraction.types[0].parent,
            Some(TypeName::new("Acme.UI", "Control"))
        );
    }

    #[test]
    fn test_interfaces_hidden_and_excluded_namespaces_ignored() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        let contract = types.class(acme, "Acme", "IWidget");
        types.info_mut(contract).is_interface = true;
        types.event(contract, "Clicked", event_handler());
        let hidden = types.class(acme, "Acme.Internal", "Plumbing");
        types.event(hidden, "Leaked", event_handler());
        let private = types.class(acme, "Acme", "Secret");
        types.hide(private);
        types.event(private, "Whispered", event_handler());

        let options = ExtractOptions {
            excluded_namespaces: vec!["Acme.Internal".into()],
            ..Default::default()
        };
        let extraction = EventExtractor::new(&types, &options).extract().unwrap();
        assert!(extraction.signatures.is_empty());
        assert!(extraction.types.is_empty());
    }
}

//! Public delegate type extraction.

use super::{check_shape, member_error, recover, to_payload, ExtractOptions, Extraction, TypeSystem};
use crate::error::Result;
use crate::model::NormalizedSignature;
use rayon::prelude::*;
use tracing::{debug, trace};

/// Member name recorded for delegate signatures
pub(crate) const INVOKE: &str = "Invoke";

/// Walks public delegate definitions and normalizes their `Invoke` methods
#[derive(Debug)]
pub struct DelegateExtractor<'a, T: TypeSystem + ?Sized> {
    types: &'a T,
    options: &'a ExtractOptions,
}

impl<'a, T: TypeSystem + ?Sized> DelegateExtractor<'a, T> {
    /// Creates an extractor over `types`
    pub fn new(types: &'a T, options: &'a ExtractOptions) -> Self {
        Self { types, options }
    }

    /// Extracts delegates from every module, one module per worker
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
            "Extracted {} delegate(s), {} skipped",
            extraction.signatures.len(),
            extraction.diagnostics.len()
        );
        Ok(extraction)
    }

    fn extract_module(&self, module: usize) -> Result<Extraction> {
        let module_name = self.types.module_name(module);
        let mut out = Extraction::default();

        for ty in self.types.public_types(module)? {
            if !self.types.is_delegate(ty)? {
                continue;
            }
            let info = self.types.type_info(ty)?;
            if info.is_generic || self.options.is_excluded(&info.namespace) {
                trace!("{}: ignoring delegate {}", module_name, info.full_name());
                continue;
            }

            let member = format!("{}.{}", info.name, INVOKE);
            let normalized = self
                .types
                .delegate_invoke(ty)
                .map_err(|e| member_error(&member, e))
                .and_then(|invoke| {
                    check_shape(&member, &invoke)?;
                    let params = invoke.params.iter().map(to_payload).collect();
                    Ok(NormalizedSignature::new(
                        info.namespace.clone(),
                        info.name.clone(),
                        INVOKE,
                        params,
                    ))
                });
            if let Some(sig) = recover(module_name, &member, normalized, &mut out.diagnostics)? {
                out.signatures.push(sig);
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::memory::{invoke, returning, MemoryTypes};
    use crate::extract::TypeDesc;
    use crate::model::PayloadArity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extracts_delegates() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        types.delegate(
            acme,
            "Acme",
            "DrawHandler",
            invoke(&[("sender", "System.Object"), ("layer", "System.Int32")]),
        );
        types.delegate(
            acme,
            "Acme",
            "Predicate",
            returning(TypeDesc::named("System.Boolean"), &[("value", "System.Object")]),
        );
        let open = types.delegate(acme, "Acme", "Action", invoke(&[("obj", "!0")]));
        types.info_mut(open).is_generic = true;
        types.class(acme, "Acme", "Widget");

        let options = ExtractOptions::default();
        let extraction = DelegateExtractor::new(&types, &options).extract().unwrap();

        assert_eq!(extraction.signatures.len(), 1);
        let draw = &extraction.signatures[0];
        assert_eq!(draw.declaring_type, "DrawHandler");
        assert_eq!(draw.member_name, INVOKE);
        // delegates keep every parameter, sender included
        assert_eq!(
            draw.arity,
            PayloadArity::MultiPayload(vec!["System.Object".into(), "System.Int32".into()])
        );

        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].member, "Predicate.Invoke");
    }

    #[test]
    fn test_undecodable_invoke_is_skipped() {
        let mut types = MemoryTypes::new();
        let acme = types.module("Acme");
        types.undecodable_delegate(acme, "Acme", "Broken", "truncated method signature");
        types.delegate(acme, "Acme", "Tick", invoke(&[]));

        let options = ExtractOptions::default();
        let extraction = DelegateExtractor::new(&types, &options).extract().unwrap();

        assert_eq!(extraction.signatures.len(), 1);
        assert_eq!(extraction.signatures[0].declaring_type, "Tick");
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].member, "Broken.Invoke");
        assert!(extraction.diagnostics[0]
            .reason
            .contains("truncated method signature"));
    }
}

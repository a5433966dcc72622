//! Namespace aggregation: grouping, deduplication and ordering.

use super::{qualify, NamespaceGroup, NormalizedSignature, PayloadArity, TemplateModel, TypeDetails, TypeGroup};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

type OwnedKey = (String, String, String, PayloadArity);

/// Collects signatures from every extractor and builds the [`TemplateModel`]
#[derive(Debug, Default)]
pub struct Aggregator {
    events: Vec<NormalizedSignature>,
    delegates: Vec<NormalizedSignature>,
    details: HashMap<(String, String), TypeDetails>,
}

impl Aggregator {
    /// Creates an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds event signatures, in module order
    pub fn add_events(&mut self, signatures: impl IntoIterator<Item = NormalizedSignature>) {
        self.events.extend(signatures);
    }

    /// Adds delegate signatures, in module order
    pub fn add_delegates(&mut self, signatures: impl IntoIterator<Item = NormalizedSignature>) {
        self.delegates.extend(signatures);
    }

    /// Records facts about a declaring type; the first record for a type wins
    pub fn add_type_details(&mut self, details: TypeDetails) {
        self.details
            .entry((details.namespace.clone(), details.name.clone()))
            .or_insert(details);
    }

    /// Groups, deduplicates and sorts everything collected so far
    pub fn finish(self) -> TemplateModel {
        let namespaces = group(self.events, &self.details);
        let delegate_namespaces = group(self.delegates, &self.details);
        debug!(
            "Aggregated {} event namespace(s), {} delegate namespace(s)",
            namespaces.len(),
            delegate_namespaces.len()
        );
        TemplateModel {
            namespaces,
            delegate_namespaces,
        }
    }
}

fn group(
    signatures: Vec<NormalizedSignature>,
    details: &HashMap<(String, String), TypeDetails>,
) -> Vec<NamespaceGroup> {
    let mut seen: HashSet<OwnedKey> = HashSet::new();
    let mut tree: BTreeMap<String, BTreeMap<String, Vec<NormalizedSignature>>> = BTreeMap::new();

    for sig in signatures {
        let key = (
            sig.namespace.clone(),
            sig.declaring_type.clone(),
            sig.member_name.clone(),
            sig.arity.clone(),
        );
        if !seen.insert(key) {
            trace!("Dropping duplicate {}.{}", sig.full_type_name(), sig.member_name);
            continue;
        }
        tree.entry(sig.namespace.clone())
            .or_default()
            .entry(sig.declaring_type.clone())
            .or_default()
            .push(sig);
    }

    tree.into_iter()
        .map(|(namespace, types)| {
            let types = types
                .into_iter()
                .map(|(name, mut members)| {
                    members.sort_by(|a, b| a.key().cmp(&b.key()));
                    let info = details.get(&(namespace.clone(), name.clone()));
                    TypeGroup {
                        full_name: qualify(&namespace, &name),
                        parent: info.and_then(|d| d.parent.clone()),
                        is_static: info.map_or(false, |d| d.is_static),
                        is_abstract: info.map_or(false, |d| d.is_abstract),
                        name,
                        members,
                    }
                })
                .collect();
            NamespaceGroup {
                name: namespace,
                types,
            }
        })
        .collect()
}

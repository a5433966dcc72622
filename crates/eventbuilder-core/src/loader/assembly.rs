//! One module opened with `dotscope`, plus the lookups the type system needs.
//!
//! `dotscope` parses the PE container, the metadata root, the heaps and the
//! table stream. [`Assembly`] copies out the handful of tables event and
//! delegate extraction reads and indexes them once, at load time.

use crate::error::{Error, Result};
use dotscope::metadata::signatures::{
    parse_method_signature, parse_type_spec_signature, SignatureMethod, TypeSignature,
};
use dotscope::metadata::tables::{
    AssemblyRefRaw, CodedIndex, EventMapRaw, EventRaw, ExportedTypeRaw, GenericParamRaw,
    MethodDefRaw, MethodSemanticsRaw, NestedClassRaw, ParamRaw, TableId, TypeDefRaw, TypeRefRaw,
    TypeSpecRaw,
};
use dotscope::metadata::token::Token;
use dotscope::{CilAssemblyView, ValidationConfig};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// TypeAttributes bits
pub(crate) mod type_flags {
    pub(crate) const VISIBILITY_MASK: u32 = 0x0000_0007;
    pub(crate) const PUBLIC: u32 = 0x0000_0001;
    pub(crate) const NESTED_PUBLIC: u32 = 0x0000_0002;
    pub(crate) const INTERFACE: u32 = 0x0000_0020;
    pub(crate) const ABSTRACT: u32 = 0x0000_0080;
    pub(crate) const SEALED: u32 = 0x0000_0100;
}

/// MethodAttributes bits used for accessor checks
pub(crate) mod method_flags {
    pub(crate) const ACCESS_MASK: u32 = 0x0007;
    pub(crate) const PUBLIC: u32 = 0x0006;
    pub(crate) const STATIC: u32 = 0x0010;
}

/// MethodSemanticsAttributes: the `add` accessor of an event
const SEMANTICS_ADD_ON: u32 = 0x0008;

/// A TypeDefOrRefOrSpec target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TypeToken {
    Def(u32),
    Ref(u32),
    Spec(u32),
}

impl TypeToken {
    /// From a full metadata token as found in signatures
    pub(crate) fn from_token(token: Token) -> Option<Self> {
        let row = token.row();
        if row == 0 {
            return None;
        }
        match token.table() {
            0x02 => Some(TypeToken::Def(row)),
            0x01 => Some(TypeToken::Ref(row)),
            0x1B => Some(TypeToken::Spec(row)),
            _ => None,
        }
    }

    /// From a coded index column; `None` for null and non-type targets
    pub(crate) fn from_coded(index: &CodedIndex) -> Option<Self> {
        if index.row == 0 {
            return None;
        }
        match index.tag {
            TableId::TypeDef => Some(TypeToken::Def(index.row)),
            TableId::TypeRef => Some(TypeToken::Ref(index.row)),
            TableId::TypeSpec => Some(TypeToken::Spec(index.row)),
            _ => None,
        }
    }

    /// Full metadata token value
    pub(crate) fn token(self) -> u32 {
        match self {
            TypeToken::Def(row) => 0x0200_0000 | row,
            TypeToken::Ref(row) => 0x0100_0000 | row,
            TypeToken::Spec(row) => 0x1B00_0000 | row,
        }
    }
}

/// Scope a TypeRef is resolved in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefScope {
    /// This module
    Local,
    /// An AssemblyRef row
    Assembly(u32),
    /// The enclosing type, for nested TypeRefs
    Enclosing(u32),
}

/// A TypeRef row with its names read
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeRefEntry<'a> {
    pub(crate) namespace: &'a str,
    pub(crate) name: &'a str,
    pub(crate) scope: RefScope,
}

/// A loaded module
pub struct Assembly {
    path: PathBuf,
    name: String,
    references: Vec<String>,
    view: CilAssemblyView,
    type_defs: Vec<TypeDefRaw>,
    type_refs: Vec<TypeRefRaw>,
    type_specs: Vec<TypeSpecRaw>,
    methods: Vec<MethodDefRaw>,
    params: Vec<ParamRaw>,
    events: Vec<EventRaw>,
    event_maps: Vec<EventMapRaw>,
    nested: Vec<NestedClassRaw>,
    /// (namespace, name) of forwarded types → AssemblyRef row
    forwarders: HashMap<(String, String), u32>,
    /// (namespace, name) of top-level types → TypeDef row
    top_level: HashMap<(String, String), u32>,
    /// nested TypeDef row → enclosing TypeDef row
    enclosing: HashMap<u32, u32>,
    /// TypeDef rows that declare generic parameters
    generic: HashSet<u32>,
    /// Event row → add accessor MethodDef row
    add_accessors: HashMap<u32, u32>,
}

macro_rules! rows {
    ($tables:expr, $raw:ty) => {
        $tables
            .table::<$raw>()
            .map(|table| table.iter().collect::<Vec<$raw>>())
            .unwrap_or_default()
    };
}

impl Assembly {
    /// Opens and indexes the module at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let view = CilAssemblyView::from_path_with_validation(path, ValidationConfig::analysis())?;
        Self::from_view(path, view)
    }

    fn from_view(path: &Path, view: CilAssemblyView) -> Result<Self> {
        let tables = view
            .tables()
            .ok_or_else(|| Error::malformed(format!("{} has no table stream", path.display())))?;

        let assembly_refs = rows!(tables, AssemblyRefRaw);
        let exported = rows!(tables, ExportedTypeRaw);
        let generic_params = rows!(tables, GenericParamRaw);
        let semantics = rows!(tables, MethodSemanticsRaw);

        let mut assembly = Self {
            path: path.to_path_buf(),
            name: String::new(),
            references: Vec::with_capacity(assembly_refs.len()),
            type_defs: rows!(tables, TypeDefRaw),
            type_refs: rows!(tables, TypeRefRaw),
            type_specs: rows!(tables, TypeSpecRaw),
            methods: rows!(tables, MethodDefRaw),
            params: rows!(tables, ParamRaw),
            events: rows!(tables, EventRaw),
            event_maps: rows!(tables, EventMapRaw),
            nested: rows!(tables, NestedClassRaw),
            forwarders: HashMap::new(),
            top_level: HashMap::new(),
            enclosing: HashMap::new(),
            generic: HashSet::new(),
            add_accessors: HashMap::new(),
            view,
        };

        assembly.name = match assembly.view.identity()? {
            Some(identity) => identity.name,
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
        };

        for row in &assembly_refs {
            let name = assembly.string(row.name)?.to_string();
            assembly.references.push(name);
        }

        for row in &exported {
            if row.implementation.tag == TableId::AssemblyRef && row.implementation.row != 0 {
                let key = (
                    assembly.string(row.namespace)?.to_string(),
                    assembly.string(row.name)?.to_string(),
                );
                assembly.forwarders.entry(key).or_insert(row.implementation.row);
            }
        }

        for row in &assembly.nested {
            assembly.enclosing.insert(row.nested_class, row.enclosing_class);
        }

        for def in &assembly.type_defs {
            if assembly.enclosing.contains_key(&def.rid) {
                continue;
            }
            let key = (
                assembly.string(def.type_namespace)?.to_string(),
                assembly.string(def.type_name)?.to_string(),
            );
            assembly.top_level.entry(key).or_insert(def.rid);
        }

        for param in &generic_params {
            if param.owner.tag == TableId::TypeDef {
                assembly.generic.insert(param.owner.row);
            }
        }

        for row in &semantics {
            if row.semantics & SEMANTICS_ADD_ON != 0 && row.association.tag == TableId::Event {
                assembly.add_accessors.insert(row.association.row, row.method);
            }
        }

        debug!(
            "Parsed {} ({} types, {} events, {} assembly refs)",
            assembly.name,
            assembly.type_defs.len(),
            assembly.events.len(),
            assembly.references.len()
        );
        Ok(assembly)
    }

    /// File this module was read from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Assembly name, or the file stem for modules without a manifest
    pub fn name(&self) -> &str {
        &self.name
    }

    /// AssemblyRef names in row order
    pub fn references(&self) -> &[String] {
        &self.references
    }

    /// Number of TypeDef rows
    pub fn type_count(&self) -> u32 {
        self.type_defs.len() as u32
    }

    pub(crate) fn string(&self, index: u32) -> Result<&str> {
        let strings = self
            .view
            .strings()
            .ok_or_else(|| Error::malformed(format!("{} has no #Strings heap", self.name)))?;
        Ok(strings.get(index as usize)?)
    }

    fn blob(&self, index: u32) -> Result<&[u8]> {
        let blobs = self
            .view
            .blobs()
            .ok_or_else(|| Error::malformed(format!("{} has no #Blob heap", self.name)))?;
        Ok(blobs.get(index as usize)?)
    }

    /// TypeDef row (1-based)
    pub(crate) fn type_def(&self, row: u32) -> Result<&TypeDefRaw> {
        row_at(&self.type_defs, row, "TypeDef")
    }

    /// Namespace and raw name of a TypeDef
    pub(crate) fn def_name(&self, row: u32) -> Result<(&str, &str)> {
        let def = self.type_def(row)?;
        Ok((self.string(def.type_namespace)?, self.string(def.type_name)?))
    }

    /// Base type column of a TypeDef
    pub(crate) fn extends(&self, row: u32) -> Result<Option<TypeToken>> {
        Ok(TypeToken::from_coded(&self.type_def(row)?.extends))
    }

    /// Enclosing type of a nested TypeDef
    pub(crate) fn enclosing_type(&self, row: u32) -> Option<u32> {
        self.enclosing.get(&row).copied()
    }

    /// Whether a TypeDef declares generic parameters
    pub(crate) fn is_generic(&self, row: u32) -> bool {
        self.generic.contains(&row)
    }

    /// Looks up a top-level type by namespace and raw name (with arity marker)
    pub(crate) fn find_type(&self, namespace: &str, name: &str) -> Option<u32> {
        self.top_level
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    /// Looks up a nested type of `enclosing` by raw name
    pub(crate) fn find_nested(&self, enclosing: u32, name: &str) -> Option<u32> {
        self.nested
            .iter()
            .filter(|row| row.enclosing_class == enclosing)
            .find(|row| {
                self.def_name(row.nested_class)
                    .map(|(_, n)| n == name)
                    .unwrap_or(false)
            })
            .map(|row| row.nested_class)
    }

    /// AssemblyRef row a forwarded type points to
    pub(crate) fn find_forwarder(&self, namespace: &str, name: &str) -> Option<u32> {
        self.forwarders
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    /// A TypeRef row with its names and scope
    pub(crate) fn type_ref(&self, row: u32) -> Result<TypeRefEntry<'_>> {
        let type_ref = row_at(&self.type_refs, row, "TypeRef")?;
        let scope_index = &type_ref.resolution_scope;
        let scope = match scope_index.tag {
            TableId::TypeRef if scope_index.row != 0 => RefScope::Enclosing(scope_index.row),
            TableId::AssemblyRef if scope_index.row != 0 => RefScope::Assembly(scope_index.row),
            // Module, ModuleRef and null scopes: the type lives in this assembly
            _ => RefScope::Local,
        };
        Ok(TypeRefEntry {
            namespace: self.string(type_ref.type_namespace)?,
            name: self.string(type_ref.type_name)?,
            scope,
        })
    }

    /// Parsed TypeSpec signature
    pub(crate) fn type_spec(&self, row: u32) -> Result<TypeSignature> {
        let spec = row_at(&self.type_specs, row, "TypeSpec")?;
        Ok(parse_type_spec_signature(self.blob(spec.signature)?)?.base)
    }

    /// MethodDef rows owned by a TypeDef
    pub(crate) fn methods_of(&self, type_row: u32) -> Result<std::ops::Range<u32>> {
        let start = self.type_def(type_row)?.method_list;
        let end = self
            .type_defs
            .get(type_row as usize)
            .map(|next| next.method_list)
            .unwrap_or(self.methods.len() as u32 + 1);
        Ok(run(start, end))
    }

    /// Name and flags of a MethodDef
    pub(crate) fn method(&self, row: u32) -> Result<(&str, u32)> {
        let method = row_at(&self.methods, row, "MethodDef")?;
        Ok((self.string(method.name)?, method.flags))
    }

    /// Parsed signature of a MethodDef
    pub(crate) fn method_sig(&self, row: u32) -> Result<SignatureMethod> {
        let method = row_at(&self.methods, row, "MethodDef")?;
        Ok(parse_method_signature(self.blob(method.signature)?)?)
    }

    /// Parameter names of a MethodDef keyed by sequence number
    pub(crate) fn param_names(&self, method_row: u32) -> Result<HashMap<u32, &str>> {
        let start = row_at(&self.methods, method_row, "MethodDef")?.param_list;
        let end = self
            .methods
            .get(method_row as usize)
            .map(|next| next.param_list)
            .unwrap_or(self.params.len() as u32 + 1);

        let mut names = HashMap::new();
        for row in run(start, end) {
            let param = row_at(&self.params, row, "Param")?;
            names.insert(param.sequence, self.string(param.name)?);
        }
        Ok(names)
    }

    /// Event rows declared by a TypeDef
    pub(crate) fn events_of(&self, type_row: u32) -> std::ops::Range<u32> {
        let Some(index) = self.event_maps.iter().position(|m| m.parent == type_row) else {
            return 0..0;
        };
        let start = self.event_maps[index].event_list;
        let end = self
            .event_maps
            .get(index + 1)
            .map(|next| next.event_list)
            .unwrap_or(self.events.len() as u32 + 1);
        run(start, end)
    }

    /// Name and handler type of an event
    pub(crate) fn event(&self, row: u32) -> Result<(&str, Option<TypeToken>)> {
        let event = row_at(&self.events, row, "Event")?;
        Ok((self.string(event.name)?, TypeToken::from_coded(&event.event_type)))
    }

    /// `add` accessor of an event
    pub(crate) fn add_accessor(&self, event_row: u32) -> Option<u32> {
        self.add_accessors.get(&event_row).copied()
    }
}

impl fmt::Debug for Assembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assembly")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("references", &self.references)
            .field("types", &self.type_defs.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Row `row` (1-based) of a copied table
fn row_at<'a, T>(rows: &'a [T], row: u32, table: &str) -> Result<&'a T> {
    row.checked_sub(1)
        .and_then(|i| rows.get(i as usize))
        .ok_or_else(|| Error::malformed(format!("{} row {} out of range", table, row)))
}

/// A `start..end` list run; empty for a null or inverted start
fn run(start: u32, end: u32) -> std::ops::Range<u32> {
    if start == 0 || end <= start {
        0..0
    } else {
        start..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_token_round_trip() {
        let token = TypeToken::from_token(Token::new(0x1B00_0004)).unwrap();
        assert_eq!(token, TypeToken::Spec(4));
        assert_eq!(token.token(), 0x1B00_0004);
        assert_eq!(
            TypeToken::from_token(Token::new(0x0100_0002)),
            Some(TypeToken::Ref(2))
        );
        // MethodDef tokens and null rows do not name types
        assert_eq!(TypeToken::from_token(Token::new(0x0600_0001)), None);
        assert_eq!(TypeToken::from_token(Token::new(0x0200_0000)), None);
    }

    #[test]
    fn test_list_runs() {
        assert_eq!(run(3, 6), 3..6);
        assert!(run(0, 6).is_empty());
        assert!(run(6, 6).is_empty());
        assert!(run(7, 6).is_empty());
    }

    #[test]
    fn test_row_at() {
        let rows = ["first", "second"];
        assert_eq!(*row_at(&rows, 2, "TypeDef").unwrap(), "second");
        let err = row_at(&rows, 3, "TypeDef").unwrap_err();
        assert!(err.is_decoding());
        assert!(err.to_string().contains("TypeDef row 3"));
        assert!(row_at(&rows, 0, "TypeDef").is_err());
    }

    #[test]
    fn test_open_rejects_non_images() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("Broken.dll");
        std::fs::write(&path, b"not an image").unwrap();
        let err = Assembly::open(&path).unwrap_err();
        assert!(matches!(err, Error::Metadata(_)), "{:?}", err);
    }
}

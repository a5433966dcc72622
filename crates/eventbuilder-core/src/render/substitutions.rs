//! Post-render text substitutions.

/// Ordered `from -> to` replacement table applied to rendered output
///
/// Application does not depend on insertion order: longer `from` tokens are
/// replaced first, so `` `10`` is never clipped by `` `1``.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitutions {
    entries: Vec<(String, String)>,
}

impl Default for Substitutions {
    fn default() -> Self {
        Self::empty()
            .with("System.String", "string")
            .with("System.Object", "object")
            .with("&lt;", "<")
            .with("&gt;", ">")
            .with_arity_markers(3)
    }
}

impl Substitutions {
    /// The default table
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with no entries
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds or replaces one entry
    pub fn with(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        match self.entries.iter_mut().find(|(f, _)| *f == from) {
            Some(entry) => entry.1 = to,
            None => self.entries.push((from, to)),
        }
        self
    }

    /// Removes generic arity markers `` `1`` through `` `max``
    pub fn with_arity_markers(self, max: usize) -> Self {
        (1..=max).fold(self, |table, n| table.with(format!("`{}", n), ""))
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    /// Applies every entry to `text`
    pub fn apply(&self, text: &str) -> String {
        let mut ordered: Vec<&(String, String)> =
            self.entries.iter().filter(|(from, _)| !from.is_empty()).collect();
        // stable: equal lengths keep insertion order
        ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        ordered
            .into_iter()
            .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
    }
}

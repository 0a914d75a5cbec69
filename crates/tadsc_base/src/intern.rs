//! String interning.
//!
//! Every identifier, literal, and synthesized name in a compilation is
//! interned exactly once; the rest of the compiler passes around [`NameId`]
//! handles and compares them as integers. Symbol-table keys, vocabulary
//! words, and decorated multi-method names all go through here.

use std::collections::HashMap;

/// A handle to an interned string.
///
/// `NameId`s are `Copy`, compare in O(1), and are stable for the life of
/// the [`Interner`] that produced them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    /// The empty string, always interned at index 0.
    pub const EMPTY: NameId = NameId(0);

    /// Index form, for dense side tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Default for NameId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Interns strings and resolves [`NameId`] handles back to text.
pub struct Interner {
    map: HashMap<String, NameId>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        let mut interner = Interner {
            map: HashMap::new(),
            strings: Vec::new(),
        };
        interner.strings.push(String::new());
        interner
    }

    /// Interns `s`, returning the existing handle if already present.
    pub fn intern(&mut self, s: &str) -> NameId {
        if let Some(&id) = self.map.get(s) {
            return id;
        }
        let id = NameId(self.strings.len() as u32);
        self.strings.push(s.to_string());
        self.map.insert(s.to_string(), id);
        id
    }

    /// Returns the text for a handle produced by this interner.
    pub fn resolve(&self, id: NameId) -> &str {
        &self.strings[id.0 as usize]
    }

    /// Looks up a string without interning it.
    pub fn lookup(&self, s: &str) -> Option<NameId> {
        self.map.get(s).copied()
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 1
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_string_same_handle() {
        let mut i = Interner::new();
        assert_eq!(i.intern("desc"), i.intern("desc"));
    }

    #[test]
    fn different_strings_different_handles() {
        let mut i = Interner::new();
        assert_ne!(i.intern("desc"), i.intern("location"));
    }

    #[test]
    fn resolve_round_trips() {
        let mut i = Interner::new();
        let id = i.intern("lexicalParent");
        assert_eq!(i.resolve(id), "lexicalParent");
    }

    #[test]
    fn lookup_does_not_intern() {
        let mut i = Interner::new();
        assert_eq!(i.lookup("noun"), None);
        let id = i.intern("noun");
        assert_eq!(i.lookup("noun"), Some(id));
    }

    #[test]
    fn empty_is_preinterned() {
        let i = Interner::new();
        assert_eq!(i.resolve(NameId::EMPTY), "");
        assert_eq!(i.len(), 1);
    }

    #[test]
    fn leading_space_names_are_distinct() {
        // modify-shadow names use a leading space to stay unreachable
        let mut i = Interner::new();
        assert_ne!(i.intern(" room#1"), i.intern("room"));
    }
}

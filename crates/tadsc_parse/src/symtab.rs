//! The global symbol table and its symbol records.
//!
//! One table per compilation, keyed by interned name, enumerated in
//! insertion order. Symbols are a common header (name, position, external
//! and referenced flags) plus a per-kind payload; forward references are
//! installed as `external` and upgraded in place when the definition
//! arrives.
//!
//! The table also owns the compilation-wide registries the program parser
//! maintains alongside it: the dictionary-property list, the active
//! dictionary, the `+` location property, the anonymous-object list, the
//! grammar-production registry, the intrinsic function-set and metaclass
//! name lists, and the object/property/enum id allocators.

use crate::ast::{BodyId, ObjStmtId};
use indexmap::IndexMap;
use tadsc_base::{NameId, SourcePos};

/// Handle to a symbol-table entry.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SymId(pub u32);

impl SymId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Compile-time marker for the VM-level class of an object symbol.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum MetaclassTag {
    #[default]
    TadsObject,
    Dictionary,
    GrammarProd,
    IntrinsicClassModifier,
}

/// One word on an object's vocabulary list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VocabWord {
    pub word: NameId,
    pub prop: SymId,
}

/// Token-kind selector for one template item.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TplTokKind {
    SStr,
    DStr,
    List,
    At,
    Plus,
    Minus,
    Times,
    Div,
    Mod,
    Arrow,
    Amp,
    Not,
    BNot,
    Comma,
    /// Placeholder for the `inherited` keyword in a template definition;
    /// expanded away before the template is stored.
    Inherited,
}

/// One item of an object template: matching token kind, target property,
/// alternation and optionality flags.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TemplateItem {
    pub prop: Option<SymId>,
    pub tok: TplTokKind,
    pub is_alt: bool,
    pub is_opt: bool,
}

/// An object template: an ordered item list attached to a class symbol or
/// to the root-object list.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Template {
    pub items: Vec<TemplateItem>,
}

/// One token of a string template's match list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StrTplTok {
    Star,
    Word(NameId),
}

/// A `string template` record: token list plus processor function.
#[derive(Clone, Debug)]
pub struct StringTemplate {
    pub toks: Vec<StrTplTok>,
    pub func: SymId,
}

/// One token of a grammar-rule alternative.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum GramTok {
    /// Sub-production reference.
    Prod(SymId),
    /// `enum token` value, by enum id.
    TokenType(u32),
    /// Part-of-speech property, by property id.
    PartOfSpeech(u16),
    /// `<prop prop ...>` part-of-speech list.
    PartOfSpeechList(Vec<u16>),
    /// Literal token text.
    Literal(NameId),
    /// `*` free-match.
    Star,
}

/// One alternative of a grammar production.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct GramAlt {
    pub score: i16,
    pub badness: i16,
    pub proc_obj: Option<SymId>,
    pub dict: Option<SymId>,
    pub toks: Vec<GramTok>,
}

/// A grammar production: the master rule list for one nonterminal, or the
/// private rule list of one named match object.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GramProd {
    pub sym: SymId,
    pub declared: bool,
    pub alts: Vec<GramAlt>,
}

/// A linker-published identifier: internal symbol name plus the external
/// name it is published under.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Export {
    pub sym: NameId,
    pub ext: NameId,
}

/// Object-symbol payload.
#[derive(Clone, Debug, Default)]
pub struct ObjectSym {
    pub obj_id: u32,
    pub is_class: bool,
    pub transient: bool,
    pub metaclass: MetaclassTag,
    /// The defining object statement, once parsed.
    pub stmt: Option<ObjStmtId>,
    /// Superclass names, kept on the symbol for symbol-file export.
    pub sc_names: Vec<NameId>,
    /// Declared with the `object` root-class keyword.
    pub sc_is_root: bool,
    pub vocab: Vec<VocabWord>,
    /// Properties queued for link-time deletion on the base object
    /// (`replace` inside a `modify` body).
    pub del_props: Vec<SymId>,
    /// Modification chain: the synthesized symbol holding the previous
    /// definition, for `modify`.
    pub mod_base: Option<SymId>,
    pub ext_modify: bool,
    pub ext_replace: bool,
    /// Dictionary active when the object was defined.
    pub dict: Option<SymId>,
    /// Private grammar rule list (named grammar match objects only).
    pub grammar_entry: Option<Box<GramProd>>,
    /// Templates defined for this class.
    pub templates: Vec<Template>,
}

/// Property-symbol payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertySym {
    pub prop_id: u16,
    /// Dictionary (vocabulary) property.
    pub vocab: bool,
    /// Provisional entry from a symbol file; displaced by a real import.
    pub weak: bool,
}

/// Function-symbol payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionSym {
    pub argc: u16,
    pub opt_argc: u16,
    pub varargs: bool,
    pub has_retval: bool,
    pub is_multimethod: bool,
    pub is_mm_base: bool,
    /// Exported even though external: the base symbol of a multi-method
    /// has no defining module until link time.
    pub mm_def: bool,
    pub ext_replace: bool,
    pub code_body: Option<BodyId>,
    /// Shadowed previous version, for `modify function`.
    pub mod_base: Option<SymId>,
}

/// Built-in (intrinsic function set) function payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinSym {
    pub fnset: u16,
    pub index: u16,
    pub argc: u16,
    pub opt_argc: u16,
    pub varargs: bool,
    pub has_retval: bool,
}

/// Enum-symbol payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnumSym {
    pub enum_id: u32,
    pub is_token: bool,
}

/// One native property of an intrinsic class.
#[derive(Clone, Copy, Debug)]
pub struct MetaProp {
    pub prop: SymId,
    pub is_static: bool,
}

/// Metaclass (intrinsic class) payload.
#[derive(Clone, Debug, Default)]
pub struct MetaclassSym {
    /// Index in the compilation's metaclass dependency list.
    pub meta_idx: u16,
    /// The VM-global registration name ("bignumber/030001" style).
    pub ext_name: NameId,
    pub props: Vec<MetaProp>,
    pub super_meta: Option<SymId>,
    /// Current intrinsic-class-modifier object, if the class has been
    /// modified.
    pub mod_obj: Option<SymId>,
}

/// Per-kind payload of a symbol.
#[derive(Clone, Debug)]
pub enum SymKind {
    Object(ObjectSym),
    Property(PropertySym),
    Function(FunctionSym),
    Builtin(BuiltinSym),
    Enum(EnumSym),
    Metaclass(MetaclassSym),
}

impl SymKind {
    pub fn describe(&self) -> &'static str {
        match self {
            SymKind::Object(_) => "object",
            SymKind::Property(_) => "property",
            SymKind::Function(_) => "function",
            SymKind::Builtin(_) => "intrinsic function",
            SymKind::Enum(_) => "enum",
            SymKind::Metaclass(_) => "intrinsic class",
        }
    }
}

/// A named binding: common header plus kind payload.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: NameId,
    pub pos: SourcePos,
    /// Declared but defined in another module.
    pub external: bool,
    pub referenced: bool,
    pub kind: SymKind,
}

impl Symbol {
    pub fn new(name: NameId, pos: SourcePos, kind: SymKind) -> Self {
        Symbol {
            name,
            pos,
            external: false,
            referenced: false,
            kind,
        }
    }

    pub fn external(name: NameId, pos: SourcePos, kind: SymKind) -> Self {
        Symbol {
            name,
            pos,
            external: true,
            referenced: false,
            kind,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectSym> {
        match &self.kind {
            SymKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut ObjectSym> {
        match &mut self.kind {
            SymKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertySym> {
        match &self.kind {
            SymKind::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_property_mut(&mut self) -> Option<&mut PropertySym> {
        match &mut self.kind {
            SymKind::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionSym> {
        match &self.kind {
            SymKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionSym> {
        match &mut self.kind {
            SymKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumSym> {
        match &self.kind {
            SymKind::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_metaclass(&self) -> Option<&MetaclassSym> {
        match &self.kind {
            SymKind::Metaclass(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_metaclass_mut(&mut self) -> Option<&mut MetaclassSym> {
        match &mut self.kind {
            SymKind::Metaclass(m) => Some(m),
            _ => None,
        }
    }
}

/// A dictionary property known at global scope, with its per-object
/// "defined on the current object" scratch flag.
#[derive(Clone, Copy, Debug)]
pub struct DictProp {
    pub prop: SymId,
    pub defined: bool,
}

/// One word of a dictionary object's table.
#[derive(Clone, Debug)]
pub struct DictWord {
    /// Original spelling.
    pub text: NameId,
    /// (object, property) associations.
    pub refs: Vec<(SymId, SymId)>,
}

/// A dictionary object's word table, keyed case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct DictEntry {
    pub words: IndexMap<String, DictWord>,
}

impl DictEntry {
    pub fn add_word(&mut self, folded: String, text: NameId, obj: SymId, prop: SymId) {
        let entry = self
            .words
            .entry(folded)
            .or_insert_with(|| DictWord { text, refs: Vec::new() });
        if !entry.refs.contains(&(obj, prop)) {
            entry.refs.push((obj, prop));
        }
    }
}

/// The global symbol table.
#[derive(Default)]
pub struct SymbolTable {
    entries: Vec<Symbol>,
    by_name: IndexMap<NameId, SymId>,
    /// Symbols not reachable by name but written to the object file:
    /// anonymous objects, in definition order.
    pub anon_objs: Vec<SymId>,
    /// Object IDs allocated outside the symbol system.
    pub nonsym_objs: Vec<u32>,
    /// Dictionary properties recognized at global scope.
    pub dict_props: Vec<DictProp>,
    /// The dictionary into which subsequent vocabulary is inserted.
    pub cur_dict: Option<SymId>,
    /// The property set by `+ property ...;`, used for the `+` location
    /// relation.
    pub plus_prop: Option<SymId>,
    /// Word tables per dictionary object.
    pub dicts: IndexMap<SymId, DictEntry>,
    /// Master grammar-production registry, by production name.
    pub gramprods: IndexMap<NameId, GramProd>,
    /// Intrinsic function-set names, in declaration order.
    pub fnsets: Vec<NameId>,
    /// Intrinsic class (metaclass) registration names, in declaration order.
    pub metas: Vec<NameId>,
    /// Metaclass symbol claimed by each registration name, if any.
    pub meta_syms: Vec<Option<SymId>>,
    /// Exported identifiers, in declaration order.
    pub exports: Vec<Export>,
    next_obj_id: u32,
    next_prop_id: u16,
    next_enum_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            next_obj_id: 1,
            next_prop_id: 1,
            next_enum_id: 1,
            ..SymbolTable::default()
        }
    }

    pub fn new_obj_id(&mut self) -> u32 {
        let id = self.next_obj_id;
        self.next_obj_id += 1;
        id
    }

    pub fn new_prop_id(&mut self) -> u16 {
        let id = self.next_prop_id;
        self.next_prop_id += 1;
        id
    }

    pub fn new_enum_id(&mut self) -> u32 {
        let id = self.next_enum_id;
        self.next_enum_id += 1;
        id
    }

    pub fn sym(&self, id: SymId) -> &Symbol {
        &self.entries[id.index()]
    }

    pub fn sym_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.entries[id.index()]
    }

    /// Exact-name lookup.
    pub fn find(&self, name: NameId) -> Option<SymId> {
        self.by_name.get(&name).copied()
    }

    /// Lookup that treats a weak property entry as absent: if the existing
    /// entry is a weak property symbol it is removed and `None` returned so
    /// the caller may install a real definition.
    pub fn find_delete_weak(&mut self, name: NameId) -> Option<SymId> {
        let id = self.find(name)?;
        if matches!(
            &self.entries[id.index()].kind,
            SymKind::Property(p) if p.weak
        ) {
            self.by_name.shift_remove(&name);
            return None;
        }
        Some(id)
    }

    /// Inserts a symbol. On a name clash the table is unchanged and the
    /// existing entry's id is returned as the error.
    pub fn add(&mut self, sym: Symbol) -> Result<SymId, SymId> {
        if let Some(&existing) = self.by_name.get(&sym.name) {
            return Err(existing);
        }
        let id = SymId(self.entries.len() as u32);
        self.by_name.insert(sym.name, id);
        self.entries.push(sym);
        Ok(id)
    }

    /// Inserts a symbol that is unreachable by name (anonymous objects,
    /// modify shadows with leading-space names that must still be written).
    pub fn add_unnamed(&mut self, sym: Symbol) -> SymId {
        let id = SymId(self.entries.len() as u32);
        self.entries.push(sym);
        id
    }

    /// Removes a symbol from name lookup. The entry itself stays allocated
    /// (handles remain valid); it simply stops being enumerable.
    pub fn remove(&mut self, id: SymId) {
        let name = self.entries[id.index()].name;
        if self.by_name.get(&name) == Some(&id) {
            self.by_name.shift_remove(&name);
        }
    }

    /// Enumerates named symbols in insertion order.
    pub fn enumerate(&self) -> impl Iterator<Item = (SymId, &Symbol)> {
        self.by_name
            .values()
            .map(move |&id| (id, &self.entries[id.index()]))
    }

    /// Number of named symbols.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn add_anon_obj(&mut self, id: SymId) {
        self.anon_objs.push(id);
    }

    /// Registers a property as a dictionary property.
    pub fn add_dict_prop(&mut self, prop: SymId) {
        if !self.dict_props.iter().any(|d| d.prop == prop) {
            self.dict_props.push(DictProp {
                prop,
                defined: false,
            });
        }
    }

    pub fn find_or_add_fnset(&mut self, name: NameId) -> u16 {
        if let Some(i) = self.fnsets.iter().position(|&n| n == name) {
            return i as u16;
        }
        self.fnsets.push(name);
        (self.fnsets.len() - 1) as u16
    }

    pub fn find_or_add_meta(&mut self, name: NameId) -> u16 {
        if let Some(i) = self.metas.iter().position(|&n| n == name) {
            return i as u16;
        }
        self.metas.push(name);
        self.meta_syms.push(None);
        (self.metas.len() - 1) as u16
    }

    /// The metaclass symbol registered for a dependency-list slot.
    pub fn meta_sym(&self, idx: u16) -> Option<SymId> {
        self.meta_syms.get(idx as usize).copied().flatten()
    }

    pub fn set_meta_sym(&mut self, idx: u16, sym: SymId) {
        if let Some(slot) = self.meta_syms.get_mut(idx as usize) {
            *slot = Some(sym);
        }
    }

    pub fn add_export(&mut self, sym: NameId, ext: NameId) {
        self.exports.push(Export { sym, ext });
    }

    /// True if `ancestor` appears anywhere in `sym`'s transitive superclass
    /// name chain. Used for the lazy circular-class check; unresolved names
    /// terminate the walk.
    pub fn descends_from(&self, sym: SymId, ancestor: SymId) -> bool {
        let mut stack = vec![sym];
        let mut seen = vec![false; self.entries.len()];
        while let Some(cur) = stack.pop() {
            if seen[cur.index()] {
                continue;
            }
            seen[cur.index()] = true;
            if let Some(obj) = self.entries[cur.index()].as_object() {
                for &sc_name in &obj.sc_names {
                    if let Some(sc_id) = self.find(sc_name) {
                        if sc_id == ancestor {
                            return true;
                        }
                        stack.push(sc_id);
                    }
                }
            }
        }
        false
    }

    /// Merges every object's vocabulary list into its dictionary's word
    /// table. Called once at end of parse.
    pub fn build_dictionaries(&mut self, interner: &tadsc_base::Interner) {
        let mut adds: Vec<(SymId, String, NameId, SymId, SymId)> = Vec::new();
        for (id, sym) in self.enumerate() {
            if let Some(obj) = sym.as_object() {
                if let Some(dict) = obj.dict {
                    for w in &obj.vocab {
                        let folded = interner.resolve(w.word).to_lowercase();
                        adds.push((dict, folded, w.word, id, w.prop));
                    }
                }
            }
        }
        let anon = self.anon_objs.clone();
        for id in anon {
            let sym = &self.entries[id.index()];
            if let Some(obj) = sym.as_object() {
                if let Some(dict) = obj.dict {
                    for w in &obj.vocab {
                        let folded = interner.resolve(w.word).to_lowercase();
                        adds.push((dict, folded, w.word, id, w.prop));
                    }
                }
            }
        }
        for (dict, folded, text, obj, prop) in adds {
            self.dicts
                .entry(dict)
                .or_default()
                .add_word(folded, text, obj, prop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tadsc_base::Interner;

    fn obj_sym(name: NameId) -> Symbol {
        Symbol::new(name, SourcePos::none(), SymKind::Object(ObjectSym::default()))
    }

    #[test]
    fn add_and_find() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let name = i.intern("startRoom");
        let id = tab.add(obj_sym(name)).unwrap();
        assert_eq!(tab.find(name), Some(id));
    }

    #[test]
    fn duplicate_add_reports_existing() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let name = i.intern("thing");
        let id = tab.add(obj_sym(name)).unwrap();
        assert_eq!(tab.add(obj_sym(name)), Err(id));
    }

    #[test]
    fn weak_property_is_displaced() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let name = i.intern("noun");
        let pid = tab.new_prop_id();
        tab.add(Symbol::new(
            name,
            SourcePos::none(),
            SymKind::Property(PropertySym {
                prop_id: pid,
                vocab: false,
                weak: true,
            }),
        ))
        .unwrap();
        assert!(tab.find_delete_weak(name).is_none());
        assert!(tab.find(name).is_none());
        // a real symbol can now take the name
        assert!(tab.add(obj_sym(name)).is_ok());
    }

    #[test]
    fn strong_symbols_survive_find_delete_weak() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let name = i.intern("f");
        let id = tab
            .add(Symbol::new(
                name,
                SourcePos::none(),
                SymKind::Function(FunctionSym::default()),
            ))
            .unwrap();
        assert_eq!(tab.find_delete_weak(name), Some(id));
        assert_eq!(tab.find(name), Some(id));
    }

    #[test]
    fn enumerate_preserves_insertion_order() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let names = ["zebra", "apple", "mango"].map(|s| i.intern(s));
        for n in names {
            tab.add(obj_sym(n)).unwrap();
        }
        let order: Vec<NameId> = tab.enumerate().map(|(_, s)| s.name).collect();
        assert_eq!(order, names.to_vec());
    }

    #[test]
    fn descends_from_follows_sc_names() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let base = i.intern("Base");
        let mid = i.intern("Mid");
        let leaf = i.intern("Leaf");
        let base_id = tab.add(obj_sym(base)).unwrap();
        let mut mid_sym = obj_sym(mid);
        mid_sym.as_object_mut().unwrap().sc_names.push(base);
        let mid_id = tab.add(mid_sym).unwrap();
        let mut leaf_sym = obj_sym(leaf);
        leaf_sym.as_object_mut().unwrap().sc_names.push(mid);
        let leaf_id = tab.add(leaf_sym).unwrap();
        assert!(tab.descends_from(leaf_id, base_id));
        assert!(tab.descends_from(mid_id, base_id));
        assert!(!tab.descends_from(base_id, leaf_id));
    }

    #[test]
    fn descends_from_tolerates_cycles() {
        // cycle in sc_names must not hang the walk
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let a = i.intern("A");
        let b = i.intern("B");
        let mut a_sym = obj_sym(a);
        a_sym.as_object_mut().unwrap().sc_names.push(b);
        let a_id = tab.add(a_sym).unwrap();
        let mut b_sym = obj_sym(b);
        b_sym.as_object_mut().unwrap().sc_names.push(a);
        let b_id = tab.add(b_sym).unwrap();
        assert!(tab.descends_from(a_id, b_id));
        assert!(tab.descends_from(b_id, a_id));
    }

    #[test]
    fn dictionary_words_fold_case() {
        let mut entry = DictEntry::default();
        let mut i = Interner::new();
        let alice = i.intern("Alice");
        entry.add_word("alice".into(), alice, SymId(0), SymId(1));
        entry.add_word("alice".into(), alice, SymId(0), SymId(1));
        entry.add_word("alice".into(), alice, SymId(2), SymId(1));
        let word = &entry.words["alice"];
        assert_eq!(word.refs.len(), 2);
    }

    #[test]
    fn fnset_indices_are_stable() {
        let mut i = Interner::new();
        let mut tab = SymbolTable::new();
        let t3vm = i.intern("t3vm/010006");
        let io = i.intern("tads-io/030007");
        assert_eq!(tab.find_or_add_fnset(t3vm), 0);
        assert_eq!(tab.find_or_add_fnset(io), 1);
        assert_eq!(tab.find_or_add_fnset(t3vm), 0);
    }
}

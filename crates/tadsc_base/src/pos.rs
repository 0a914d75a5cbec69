//! Source positions.
//!
//! The tokenizer boundary reports positions as a file descriptor plus a
//! line number, and every token, IR node, and diagnostic carries one. A
//! [`FileTable`] maps descriptors back to paths for rendering.

/// Identifies one source file within a compilation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct FileId(pub u32);

/// A file + line position.
///
/// Line numbers are 1-based; line 0 means "no position" (synthesized
/// constructs, whole-file diagnostics).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SourcePos {
    pub file: FileId,
    pub line: u32,
}

impl SourcePos {
    pub fn new(file: FileId, line: u32) -> Self {
        SourcePos { file, line }
    }

    /// The "no position" sentinel.
    pub fn none() -> Self {
        SourcePos::default()
    }

    pub fn is_none(&self) -> bool {
        self.line == 0
    }
}

/// Registry of source file paths, indexed by [`FileId`].
#[derive(Default)]
pub struct FileTable {
    paths: Vec<String>,
}

impl FileTable {
    pub fn new() -> Self {
        FileTable::default()
    }

    /// Registers a path, returning its descriptor.
    pub fn add(&mut self, path: &str) -> FileId {
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.to_string());
        id
    }

    /// Returns the path for a descriptor, or `"<unknown>"`.
    pub fn path(&self, id: FileId) -> &str {
        self.paths
            .get(id.0 as usize)
            .map(String::as_str)
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_resolve() {
        let mut files = FileTable::new();
        let a = files.add("gamemain.t");
        let b = files.add("rooms.t");
        assert_eq!(files.path(a), "gamemain.t");
        assert_eq!(files.path(b), "rooms.t");
    }

    #[test]
    fn unknown_descriptor_renders_placeholder() {
        let files = FileTable::new();
        assert_eq!(files.path(FileId(9)), "<unknown>");
    }

    #[test]
    fn none_position() {
        assert!(SourcePos::none().is_none());
        assert!(!SourcePos::new(FileId(0), 3).is_none());
    }
}

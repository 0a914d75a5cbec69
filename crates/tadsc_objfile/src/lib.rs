//! # tadsc-objfile
//!
//! The linkable object-file container and the symbol-export file.
//!
//! The object file carries, in order: signature and version, the opaque
//! build-config blob, intrinsic function-set and class name lists, the
//! symbol records (with dense per-file symbol and dictionary indices
//! starting at 1), anonymous-object records, non-symbol object ids,
//! cross-reference records, grammar productions, named-grammar-rule
//! associations, and the export list. Counts not known up front are
//! patched with placeholder-and-seek-back.

pub mod format;
pub mod io;
pub mod read;
pub mod symfile;
pub mod write;

pub use format::{BuildConfig, FILE_VERSION, OBJ_FILE_SIG, SYM_FILE_SIG};
pub use io::{Error, ObjReader, ObjWriter};
pub use read::{read_object_file, ObjFileData, SymBody, SymRecord};
pub use symfile::{read_symbol_file, write_symbol_file};
pub use write::write_object_file;

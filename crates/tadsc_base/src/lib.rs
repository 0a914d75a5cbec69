//! # tadsc-base
//!
//! Structural atoms for the tadsc compiler front end:
//!
//! - [`Arena`] — bump allocation for stable IR references
//! - [`Interner`]/[`NameId`] — string interning for O(1) name equality
//! - [`SourcePos`]/[`FileTable`] — file + line source tracking
//! - [`Diagnostic`]/[`ErrorSink`] — message-code diagnostics with severities
//!
//! This crate knows nothing about the TADS language itself; it provides the
//! generic infrastructure the parser and object-file crates build on.

pub mod arena;
pub mod diag;
pub mod intern;
pub mod pos;

pub use arena::Arena;
pub use diag::{Diagnostic, ErrorCode, ErrorSink, Fatal, Severity};
pub use intern::{Interner, NameId};
pub use pos::{FileId, FileTable, SourcePos};

/// Result alias for operations that can fail fatally.
///
/// Recoverable problems are logged to an [`ErrorSink`] and parsing continues;
/// only unrecoverable conditions (EOF mid-construct, I/O failure) surface as
/// `Err(Fatal)`.
pub type Result<T> = std::result::Result<T, Fatal>;

//! Message-code diagnostics.
//!
//! Errors are reported by message code with a source position and a
//! severity; recoverable problems go to an [`ErrorSink`] and parsing
//! continues, while fatal conditions unwind through `Result<T, Fatal>`.
//! The compilation fails (nonzero exit) if anything at severity
//! [`Severity::Error`] or above was recorded.

use crate::pos::{FileTable, SourcePos};
use std::fmt;

/// Marker for unrecoverable parse failures (EOF mid-construct, I/O loss).
///
/// Carries no payload: the diagnostic describing the failure has already
/// been logged to the sink by the time `Fatal` propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fatal;

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fatal parse error")
    }
}

impl std::error::Error for Fatal {}

/// Diagnostic severity ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Nitpicks: idempotent reimports and the like.
    Pedantic,
    Warning,
    Error,
    /// Parsing of the translation unit cannot continue.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Pedantic => "pedantic",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        })
    }
}

/// Every message the front end can emit, by code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // lexical-syntactic
    UnexpectedEof,
    InvalidCharacter,
    UnterminatedString,
    ExpectedSemi,
    ExpectedColon,
    ExpectedLParen,
    ExpectedRParen,
    ExpectedLBrace,
    ExpectedRBrace,
    ExpectedRBracket,
    ExpectedExpression,
    ExpectedFunctionOrObject,
    ExpectedFormal,
    ExpectedCommaFormal,
    MissingRParenFormal,
    MissingLastFormal,
    ExpectedCodeBody,
    BadTypeAnnotation,

    // statements and locals
    LocalRequiresName,
    LocalRedef,
    ExpectedWhile,
    ExpectedCase,
    MisplacedBreak,
    MisplacedContinue,
    CatchRequiresClass,

    // declarations
    DuplicateSymbol,
    FuncRequiresName,
    FuncRedef,
    IncompatFuncRedef,
    RedefAsFunc,
    FuncRedefAsMultimethod,
    ReplaceFuncUndef,
    ExternNoCodeBody,
    InvalidExtern,
    ExternObjRequiresName,
    ObjRedef,
    RedefAsObj,
    RedefAsProp,
    RedefAsEnum,
    EnumRequiresName,
    EnumRequiresComma,
    PropDeclRequiresName,
    PropDeclRequiresComma,
    ExportRequiresName,
    ExportNameTooLong,
    DictSyntax,
    DictPropRequiresName,
    DictPropRequiresComma,
    InvalidTransient,

    // intrinsics
    IntrinsicRequiresName,
    IntrinsicRequiresLBrace,
    IntrinsicRequiresFuncName,
    IntrinsicRequiresLParen,
    EofInIntrinsic,
    IntrinsicClassRedef,
    IntrinsicClassRequiresName,
    IntrinsicClassRequiresNameString,
    IntrinsicClassRequiresProp,
    IntrinsicSuperclassUndef,
    IntrinsicSuperclassNotIntrinsic,
    EofInIntrinsicClass,
    MetaclassAlreadyDefined,

    // object bodies
    ObjDefRequiresColon,
    ObjDefRequiresSuperclass,
    ObjDefObjNoSuperclass,
    CircularClass,
    CannotModOrReplaceType,
    ReplaceObjRequiresSuperclass,
    ReplaceModObjUndef,
    PlusObjTooDeep,
    PlusPropRequiresName,
    UnterminatedObject,
    ObjDefRequiresSemi,
    ObjDefRequiresRBrace,
    ObjDefRequiresProp,
    ObjDefRequiresPropValue,
    PropRequiresEq,
    PropRedefInObj,
    VocabRequiresSstr,
    VocabNoDict,
    ReplacePropRequiresModObj,
    CannotModMetaProp,
    EqWithMethodObsolete,
    OperatorWrongFormals,
    BadOperatorName,

    // templates
    TemplateEmpty,
    TemplateStrRequiresProp,
    TemplateOpRequiresProp,
    TemplateRequiresRBracket,
    TemplateBadToken,
    TemplateSymNotProp,
    TemplateNoVocab,
    TemplatePropDup,
    StringTemplateRequiresFunc,

    // propertysets
    PropsetTooDeep,
    PropsetRequiresString,
    PropsetInvalidPattern,
    PropsetInvalidFormals,
    PropsetRequiresLBrace,
    OperatorInPropset,

    // grammar
    GrammarRequiresName,
    GrammarRequiresColon,
    GrammarRequiresNameRParen,
    GrammarModRequiresTag,
    GrammarBadEnum,
    GrammarInvalidToken,
    GrammarArrowRequiresProp,
    GrammarRequiresGt,

    // symbol / object files
    SymFileInvalidSig,
    SymFileNameTooLong,
    SymFileRedef,
    ObjFileInvalidSig,
    ObjFileBadRecord,
    ObjFileTruncated,
}

impl ErrorCode {
    /// The severity this code is reported at.
    pub fn severity(self) -> Severity {
        match self {
            ErrorCode::SymFileRedef => Severity::Pedantic,
            ErrorCode::EqWithMethodObsolete => Severity::Warning,
            ErrorCode::UnexpectedEof
            | ErrorCode::EofInIntrinsic
            | ErrorCode::EofInIntrinsicClass
            | ErrorCode::ObjFileTruncated => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// One reported problem: code, position, rendered message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    pub pos: SourcePos,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, pos: SourcePos, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: code.severity(),
            pos,
            message: message.into(),
        }
    }

    /// Renders `path:line: severity: message`.
    pub fn render(&self, files: &FileTable) -> String {
        if self.pos.is_none() {
            format!("{}: {}", self.severity, self.message)
        } else {
            format!(
                "{}:{}: {}: {}",
                files.path(self.pos.file),
                self.pos.line,
                self.severity,
                self.message
            )
        }
    }
}

/// Collects diagnostics and tracks severity counts.
#[derive(Default)]
pub struct ErrorSink {
    diags: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl ErrorSink {
    pub fn new() -> Self {
        ErrorSink::default()
    }

    pub fn report(&mut self, diag: Diagnostic) {
        match diag.severity {
            Severity::Error | Severity::Fatal => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Pedantic => {}
        }
        self.diags.push(diag);
    }

    /// Shorthand: build and report a diagnostic in one call.
    pub fn log(&mut self, code: ErrorCode, pos: SourcePos, message: impl Into<String>) {
        self.report(Diagnostic::new(code, pos, message));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// True if the compilation must exit nonzero.
    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    /// Diagnostics matching one code, for tests.
    pub fn count_of(&self, code: ErrorCode) -> usize {
        self.diags.iter().filter(|d| d.code == code).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pos::{FileId, FileTable};

    #[test]
    fn severity_counts() {
        let mut sink = ErrorSink::new();
        sink.log(ErrorCode::ExpectedSemi, SourcePos::none(), "expected ';'");
        sink.log(ErrorCode::TemplateEmpty, SourcePos::none(), "template is empty");
        sink.log(ErrorCode::SymFileRedef, SourcePos::none(), "redefined");
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.warning_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn render_includes_position() {
        let mut files = FileTable::new();
        let f = files.add("rooms.t");
        let d = Diagnostic::new(
            ErrorCode::CircularClass,
            SourcePos::new(f, 12),
            "circular class definition: 'A' is a subclass of 'B'",
        );
        assert_eq!(
            d.render(&files),
            "rooms.t:12: error: circular class definition: 'A' is a subclass of 'B'"
        );
    }

    #[test]
    fn render_without_position() {
        let files = FileTable::new();
        let d = Diagnostic::new(ErrorCode::SymFileInvalidSig, SourcePos::none(), "bad signature");
        assert_eq!(d.render(&files), "error: bad signature");
    }

    #[test]
    fn eof_is_fatal() {
        assert_eq!(ErrorCode::UnexpectedEof.severity(), Severity::Fatal);
        let _ = FileId(0);
    }
}

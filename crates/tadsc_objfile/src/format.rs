//! Object-file layout constants.
//!
//! All integers are little-endian. Strings are a `u16` length prefix
//! followed by UTF-8 bytes. Record counts that are not known until their
//! bodies have been written use placeholder-and-seek-back patching.

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Signature of a linkable object file.
pub const OBJ_FILE_SIG: &[u8; 16] = b"TADS3.ObjectFile";
/// Signature of a symbol-export file.
pub const SYM_FILE_SIG: &[u8; 16] = b"TADS3.SymbolFile";
/// Format version; incremented on incompatible change.
pub const FILE_VERSION: u32 = 1;

/// One-byte kind discriminator opening every symbol record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum SymRecordKind {
    Function = 1,
    Object = 2,
    Property = 3,
    Enum = 4,
    Builtin = 5,
    Metaclass = 6,
}

/// One-byte metaclass tag in object records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum MetaTagByte {
    TadsObject = 0,
    Dictionary = 1,
    GrammarProd = 2,
    IntrinsicClassModifier = 3,
}

/// Grammar-token kind word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum GramTokKind {
    Prod = 1,
    TokenType = 2,
    PartOfSpeech = 3,
    Literal = 4,
    Star = 5,
    PartOfSpeechList = 6,
}

bitflags! {
    /// Flag word of a function record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FuncFlags: u16 {
        const EXTERNAL = 0x0001;
        const VARARGS = 0x0002;
        const HAS_RETVAL = 0x0004;
        const MULTIMETHOD = 0x0008;
        const MM_BASE = 0x0010;
        const MM_DEF = 0x0020;
        const EXT_REPLACE = 0x0040;
        const HAS_BODY = 0x0080;
    }
}

bitflags! {
    /// Flag word of an object record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjFlags: u16 {
        const EXTERNAL = 0x0001;
        const CLASS = 0x0002;
        const TRANSIENT = 0x0004;
        const EXT_MODIFY = 0x0008;
        const EXT_REPLACE = 0x0010;
        const SC_IS_ROOT = 0x0020;
    }
}

bitflags! {
    /// Flag byte of a property record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PropFlags: u8 {
        const VOCAB = 0x01;
        const WEAK = 0x02;
    }
}

bitflags! {
    /// Flag byte of an enum record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EnumFlags: u8 {
        const IS_TOKEN = 0x01;
    }
}

bitflags! {
    /// Flag byte of a built-in function record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BifFlags: u8 {
        const VARARGS = 0x01;
        const HAS_RETVAL = 0x02;
    }
}

bitflags! {
    /// Flag word of a grammar-production record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProdFlags: u32 {
        const DECLARED = 0x0001;
    }
}

/// The build configuration serialized into the opaque header blob, so a
/// rebuild can detect option changes without parsing anything else.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    pub tool_version: String,
    pub defines: Vec<(String, String)>,
    pub source_files: Vec<String>,
}

impl BuildConfig {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_sixteen_bytes() {
        assert_eq!(OBJ_FILE_SIG.len(), 16);
        assert_eq!(SYM_FILE_SIG.len(), 16);
    }

    #[test]
    fn record_kind_round_trips() {
        let byte: u8 = SymRecordKind::Enum.into();
        assert_eq!(SymRecordKind::try_from(byte), Ok(SymRecordKind::Enum));
        assert!(SymRecordKind::try_from(0u8).is_err());
    }

    #[test]
    fn build_config_round_trips() {
        let cfg = BuildConfig {
            tool_version: "0.1.0".into(),
            defines: vec![("LANGUAGE".into(), "en_us".into())],
            source_files: vec!["gamemain.t".into()],
        };
        let bytes = cfg.to_bytes();
        assert_eq!(BuildConfig::from_bytes(&bytes), Some(cfg));
    }
}

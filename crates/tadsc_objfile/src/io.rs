//! Little-endian record I/O with placeholder patching.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Object-file I/O and structure errors.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    BadSignature,
    BadVersion(u32),
    BadRecord(String),
    Truncated,
    StringTooLong(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "i/o error: {e}"),
            Error::BadSignature => write!(f, "invalid file signature"),
            Error::BadVersion(v) => write!(f, "unsupported file version {v}"),
            Error::BadRecord(what) => write!(f, "malformed record: {what}"),
            Error::Truncated => write!(f, "unexpected end of file"),
            Error::StringTooLong(n) => write!(f, "string of {n} bytes exceeds the 64k record limit"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Writer over a seekable byte sink.
pub struct ObjWriter<W: Write + Seek> {
    w: W,
}

impl<W: Write + Seek> ObjWriter<W> {
    pub fn new(w: W) -> Self {
        ObjWriter { w }
    }

    pub fn into_inner(self) -> W {
        self.w
    }

    pub fn pos(&mut self) -> Result<u64> {
        Ok(self.w.stream_position()?)
    }

    pub fn bytes(&mut self, b: &[u8]) -> Result<()> {
        self.w.write_all(b)?;
        Ok(())
    }

    pub fn u8(&mut self, v: u8) -> Result<()> {
        self.bytes(&[v])
    }

    pub fn u16(&mut self, v: u16) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    pub fn i16(&mut self, v: i16) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    /// Length-prefixed string (u16 length).
    pub fn str16(&mut self, s: &str) -> Result<()> {
        let bytes = s.as_bytes();
        if bytes.len() > u16::MAX as usize {
            return Err(Error::StringTooLong(bytes.len()));
        }
        self.u16(bytes.len() as u16)?;
        self.bytes(bytes)
    }

    /// Writes a zero u32 and returns its offset for later patching.
    pub fn placeholder_u32(&mut self) -> Result<u64> {
        let at = self.pos()?;
        self.u32(0)?;
        Ok(at)
    }

    /// Seeks back, rewrites a placeholder, and returns to the end.
    pub fn patch_u32(&mut self, at: u64, v: u32) -> Result<()> {
        let end = self.pos()?;
        self.w.seek(SeekFrom::Start(at))?;
        self.u32(v)?;
        self.w.seek(SeekFrom::Start(end))?;
        Ok(())
    }
}

/// Reader over a seekable byte source.
pub struct ObjReader<R: Read + Seek> {
    r: R,
}

impl<R: Read + Seek> ObjReader<R> {
    pub fn new(r: R) -> Self {
        ObjReader { r }
    }

    pub fn bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.r.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.r.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.r.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn i16(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        self.r.read_exact(&mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.r.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn str16(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes).map_err(|_| Error::BadRecord("non-UTF-8 string".into()))
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        self.r.seek(SeekFrom::Current(n as i64))?;
        Ok(())
    }

    /// Reads and checks a 16-byte signature.
    pub fn expect_signature(&mut self, sig: &[u8; 16]) -> Result<()> {
        let got = self.bytes(16)?;
        if got != sig {
            return Err(Error::BadSignature);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn scalar_round_trip() {
        let mut w = ObjWriter::new(Cursor::new(Vec::new()));
        w.u8(7).unwrap();
        w.u16(0xBEEF).unwrap();
        w.u32(0xDEADBEEF).unwrap();
        w.i16(-5).unwrap();
        w.str16("noun").unwrap();
        let buf = w.into_inner().into_inner();

        let mut r = ObjReader::new(Cursor::new(buf));
        assert_eq!(r.u8().unwrap(), 7);
        assert_eq!(r.u16().unwrap(), 0xBEEF);
        assert_eq!(r.u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.i16().unwrap(), -5);
        assert_eq!(r.str16().unwrap(), "noun");
    }

    #[test]
    fn placeholder_patching() {
        let mut w = ObjWriter::new(Cursor::new(Vec::new()));
        let at = w.placeholder_u32().unwrap();
        w.u32(1).unwrap();
        w.u32(2).unwrap();
        w.patch_u32(at, 2).unwrap();
        let buf = w.into_inner().into_inner();

        let mut r = ObjReader::new(Cursor::new(buf));
        assert_eq!(r.u32().unwrap(), 2);
        assert_eq!(r.u32().unwrap(), 1);
        assert_eq!(r.u32().unwrap(), 2);
    }

    #[test]
    fn truncated_read_is_reported() {
        let mut r = ObjReader::new(Cursor::new(vec![1u8]));
        assert!(matches!(r.u32(), Err(Error::Truncated)));
    }
}

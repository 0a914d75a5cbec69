//! Resource bundling for compiled images.
//!
//! An image file is a signed header followed by tagged blocks, each with a
//! 10-byte header (4-byte type, 4-byte little-endian size, 2-byte flags),
//! terminated by an `EOF ` block. Bundling appends an `MRES` block in the
//! EOF block's place: a `u16` entry count, a table of contents of
//! `(u32 offset, u32 size, u8 name-length, name)` entries with the name
//! bytes masked by XOR `0xFF`, then the raw resource bytes; a fresh EOF
//! block follows. Offsets are relative to the start of the block body.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Image-file signature.
pub const IMAGE_SIG: &[u8] = b"T3-image\r\n\x1a";
/// Image format version written into new files.
pub const IMAGE_VERSION: u16 = 1;
/// Block flag: the interpreter must understand this block.
pub const BLOCK_MANDATORY: u16 = 0x0001;

const HEADER_RESERVED: usize = 32;
const HEADER_TIMESTAMP: usize = 24;
const BLOCK_HEADER: u64 = 10;

/// Bundler errors.
#[derive(Debug)]
pub enum ResError {
    Io(io::Error),
    BadImage(String),
    NameTooLong(String),
}

impl fmt::Display for ResError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResError::Io(e) => write!(f, "i/o error: {e}"),
            ResError::BadImage(what) => write!(f, "invalid image file: {what}"),
            ResError::NameTooLong(name) => {
                write!(f, "resource name \"{name}\" exceeds 255 bytes")
            }
        }
    }
}

impl std::error::Error for ResError {}

impl From<io::Error> for ResError {
    fn from(e: io::Error) -> Self {
        ResError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, ResError>;

/// One file to bundle, with the resource name it is stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResEntry {
    pub path: PathBuf,
    pub url: String,
}

/// The ordered list of resources for one bundling run.
#[derive(Debug, Default)]
pub struct ResList {
    entries: Vec<ResEntry>,
}

impl ResList {
    pub fn new() -> Self {
        ResList::default()
    }

    pub fn entries(&self) -> &[ResEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a file, or a directory's contents (descending into
    /// subdirectories when `recurse` is set). The resource name is the
    /// alias if given, otherwise the path with separators normalized to
    /// `/`.
    pub fn add_file(&mut self, path: &Path, alias: Option<&str>, recurse: bool) -> io::Result<()> {
        if path.is_dir() {
            let mut children: Vec<PathBuf> = std::fs::read_dir(path)?
                .collect::<io::Result<Vec<_>>>()?
                .into_iter()
                .map(|e| e.path())
                .collect();
            children.sort();
            for child in children {
                if child.is_dir() {
                    if recurse {
                        self.add_file(&child, None, recurse)?;
                    }
                } else {
                    self.add_file(&child, None, recurse)?;
                }
            }
            return Ok(());
        }
        let url = match alias {
            Some(a) => a.to_string(),
            None => path.to_string_lossy().replace('\\', "/"),
        };
        self.entries.push(ResEntry {
            path: path.to_path_buf(),
            url,
        });
        Ok(())
    }
}

/// Parses an ordered operation list: `-add` (the default mode),
/// `-recurse` / `-norecurse` toggles affecting subsequent directory
/// operands, bare paths, and `path=alias` renames.
pub fn parse_operations(ops: &[String]) -> io::Result<ResList> {
    let mut list = ResList::new();
    let mut recurse = true;
    for op in ops {
        match op.as_str() {
            "-add" => {}
            "-recurse" => recurse = true,
            "-norecurse" => recurse = false,
            spec => {
                // 'path=alias' renames; a bare '=' at index 0 would make an
                // empty path, so treat that as a plain name
                match spec.split_once('=') {
                    Some((path, alias)) if !path.is_empty() => {
                        list.add_file(Path::new(path), Some(alias), recurse)?;
                    }
                    _ => list.add_file(Path::new(spec), None, recurse)?,
                }
            }
        }
    }
    Ok(list)
}

/// Creates a new, empty image file: header plus an EOF block.
pub fn create_image(path: &Path) -> Result<()> {
    let mut f = File::create(path)?;
    f.write_all(IMAGE_SIG)?;
    f.write_all(&IMAGE_VERSION.to_le_bytes())?;
    f.write_all(&[0u8; HEADER_RESERVED])?;
    f.write_all(&timestamp())?;
    write_block_header(&mut f, b"EOF ", 0, BLOCK_MANDATORY)?;
    Ok(())
}

fn timestamp() -> [u8; HEADER_TIMESTAMP] {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let text = format!("{secs:>24}");
    let mut buf = [b' '; HEADER_TIMESTAMP];
    buf.copy_from_slice(&text.as_bytes()[..HEADER_TIMESTAMP]);
    buf
}

fn write_block_header<W: Write>(w: &mut W, tag: &[u8; 4], size: u32, flags: u16) -> io::Result<()> {
    w.write_all(tag)?;
    w.write_all(&size.to_le_bytes())?;
    w.write_all(&flags.to_le_bytes())?;
    Ok(())
}

fn read_exact_at<R: Read>(r: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Verifies the header and returns the offset of the EOF block header.
fn seek_eof_block(f: &mut File, image: &Path) -> Result<u64> {
    let header_len = IMAGE_SIG.len() + 2 + HEADER_RESERVED + HEADER_TIMESTAMP;
    let header = read_exact_at(f, header_len).map_err(|_| {
        ResError::BadImage(format!("{}: truncated header", image.display()))
    })?;
    if &header[..IMAGE_SIG.len()] != IMAGE_SIG {
        return Err(ResError::BadImage(format!(
            "{}: not an image file",
            image.display()
        )));
    }
    loop {
        let at = f.stream_position()?;
        let block = match read_exact_at(f, BLOCK_HEADER as usize) {
            Ok(b) => b,
            Err(_) => {
                return Err(ResError::BadImage(format!(
                    "{}: missing EOF block",
                    image.display()
                )))
            }
        };
        if &block[..4] == b"EOF " {
            // nothing may follow the EOF block
            let here = f.stream_position()?;
            let end = f.seek(SeekFrom::End(0))?;
            if here != end {
                return Err(ResError::BadImage(format!(
                    "{}: data after the EOF block",
                    image.display()
                )));
            }
            return Ok(at);
        }
        let size = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        f.seek(SeekFrom::Current(size as i64))?;
    }
}

/// Appends the resources to the image, creating it first when asked.
pub fn add_resources(image: &Path, list: &ResList, create_new: bool) -> Result<()> {
    if create_new {
        create_image(image)?;
    }

    let mut f = OpenOptions::new().read(true).write(true).open(image)?;
    let eof_at = seek_eof_block(&mut f, image)?;

    // overwrite the EOF block with the new MRES block
    f.seek(SeekFrom::Start(eof_at))?;
    write_block_header(&mut f, b"MRES", 0, 0)?;
    f.write_all(&(list.len() as u16).to_le_bytes())?;

    // the table of contents comes first, so the first data offset is the
    // table size (the u16 count included)
    let mut contents_siz: u64 = 2;
    for entry in list.entries() {
        if entry.url.len() > 255 {
            return Err(ResError::NameTooLong(entry.url.clone()));
        }
        contents_siz += 4 + 4 + 1 + entry.url.len() as u64;
    }

    let mut ofs = contents_siz;
    for entry in list.entries() {
        let size = std::fs::metadata(&entry.path)?.len();
        f.write_all(&(ofs as u32).to_le_bytes())?;
        f.write_all(&(size as u32).to_le_bytes())?;
        f.write_all(&[entry.url.len() as u8])?;
        let masked: Vec<u8> = entry.url.bytes().map(|b| b ^ 0xFF).collect();
        f.write_all(&masked)?;
        ofs += size;
    }

    for entry in list.entries() {
        let mut src = File::open(&entry.path)?;
        io::copy(&mut src, &mut f)?;
    }

    // patch the block size, then close the file with a fresh EOF block
    let end = f.stream_position()?;
    let mres_size = end - eof_at - BLOCK_HEADER;
    f.seek(SeekFrom::Start(eof_at + 4))?;
    f.write_all(&(mres_size as u32).to_le_bytes())?;
    f.seek(SeekFrom::Start(end))?;
    write_block_header(&mut f, b"EOF ", 0, BLOCK_MANDATORY)?;
    Ok(())
}

/// Lists the resources in an image: `(name, size)` per entry, across every
/// MRES block in block order.
pub fn list_resources(image: &Path) -> Result<Vec<(String, u32)>> {
    let mut f = File::open(image)?;
    let header_len = IMAGE_SIG.len() + 2 + HEADER_RESERVED + HEADER_TIMESTAMP;
    let header = read_exact_at(&mut f, header_len)
        .map_err(|_| ResError::BadImage(format!("{}: truncated header", image.display())))?;
    if &header[..IMAGE_SIG.len()] != IMAGE_SIG {
        return Err(ResError::BadImage(format!(
            "{}: not an image file",
            image.display()
        )));
    }
    let mut out = Vec::new();
    loop {
        let block = match read_exact_at(&mut f, BLOCK_HEADER as usize) {
            Ok(b) => b,
            Err(_) => break,
        };
        let size = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
        if &block[..4] == b"EOF " {
            break;
        }
        if &block[..4] != b"MRES" {
            f.seek(SeekFrom::Current(size as i64))?;
            continue;
        }
        let body_at = f.stream_position()?;
        let count_buf = read_exact_at(&mut f, 2)?;
        let count = u16::from_le_bytes([count_buf[0], count_buf[1]]);
        for _ in 0..count {
            let fixed = read_exact_at(&mut f, 9)?;
            let res_size = u32::from_le_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
            let name_len = fixed[8] as usize;
            let masked = read_exact_at(&mut f, name_len)?;
            let name: Vec<u8> = masked.into_iter().map(|b| b ^ 0xFF).collect();
            let name = String::from_utf8(name).map_err(|_| {
                ResError::BadImage(format!("{}: malformed resource name", image.display()))
            })?;
            out.push((name, res_size));
        }
        f.seek(SeekFrom::Start(body_at + size as u64))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_honor_recurse_toggles() {
        // only syntax here: the '-add' marker and '=' renames
        let ops = vec![
            "-add".to_string(),
            "-norecurse".to_string(),
            "-recurse".to_string(),
        ];
        let list = parse_operations(&ops).unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn alias_splits_on_equals() {
        let dir = std::env::temp_dir().join("tadsc-res-alias-test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("cover.jpg");
        std::fs::write(&file, b"jpeg").unwrap();
        let spec = format!("{}=.system/CoverArt.jpg", file.display());
        let list = parse_operations(&[spec]).unwrap();
        assert_eq!(list.entries()[0].url, ".system/CoverArt.jpg");
        std::fs::remove_dir_all(&dir).ok();
    }
}

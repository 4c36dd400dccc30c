//! BAM header codec.
//!
//! ```text
//! BAM header:
//! - 4 bytes: magic "BAM\1"
//! - 4 bytes: SAM header text length (l_text, uint32)
//! - l_text bytes: SAM header text
//! - 4 bytes: number of reference sequences (n_ref, int32)
//! - for each reference:
//!   - 4 bytes: name length including NUL (l_name, int32)
//!   - l_name bytes: NUL-terminated name
//!   - 4 bytes: reference length (l_ref, int32)
//! ```
//!
//! The reference dictionary duplicates the `@SQ` lines of the text header. The
//! text is the source of truth: the dictionary is skipped on read and rebuilt
//! from `@SQ` on write.

use super::{read_up_to, skip_bytes};
use crate::{Error, Result};
use std::fmt;
use std::io::Read;

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// Ordered `TAG:VALUE` pairs of one header line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagRecord {
    tags: Vec<(String, String)>,
}

impl TagRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Set a tag. A repeated tag keeps its original position and takes the new value.
    pub fn insert(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        let tag = tag.into();
        let value = value.into();
        match self.tags.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((tag, value)),
        }
    }

    pub fn with(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(tag, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(t, v)| (t.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// An `@SQ` line: name, length and any other tags in line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSequence {
    pub name: String,
    pub length: u64,
    pub other: TagRecord,
}

impl ReferenceSequence {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            length,
            other: TagRecord::new(),
        }
    }

    fn from_tags(tags: TagRecord, line: usize) -> Result<Self> {
        let mut name = None;
        let mut length = None;
        let mut other = TagRecord::new();

        for (tag, value) in tags.iter() {
            match tag {
                "SN" => name = Some(value.to_string()),
                "LN" => {
                    let parsed = value
                        .parse::<u64>()
                        .ok()
                        .filter(|&n| n <= i32::MAX as u64)
                        .ok_or_else(|| {
                            Error::Format(format!("invalid reference length on line {}", line))
                        })?;
                    length = Some(parsed);
                }
                _ => other.insert(tag, value),
            }
        }

        match (name, length) {
            (Some(name), Some(length)) => Ok(Self {
                name,
                length,
                other,
            }),
            (None, _) => Err(Error::Format(format!(
                "reference without SN tag on line {}",
                line
            ))),
            (_, None) => Err(Error::Format(format!(
                "reference without LN tag on line {}",
                line
            ))),
        }
    }
}

/// Parsed SAM header.
///
/// Sections are kept in the fixed BAM order: `@HD`, `@SQ`, `@RG`, `@PG`, `@CO`.
/// The position of a reference in `reference_sequences` is its reference id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    pub header: TagRecord,
    pub reference_sequences: Vec<ReferenceSequence>,
    pub read_groups: Vec<TagRecord>,
    pub programs: Vec<TagRecord>,
    pub comments: Vec<String>,
}

impl Header {
    /// Reference id of the sequence named `name`.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.reference_sequences.iter().position(|r| r.name == name)
    }

    /// Byte length of the binary reference dictionary that follows the text.
    pub fn reference_dictionary_len(&self) -> u64 {
        4 + self
            .reference_sequences
            .iter()
            .map(|r| 8 + r.name.len() as u64 + 1)
            .sum::<u64>()
    }

    /// Parse SAM header text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut header = Header::default();

        let text = text.trim_end_matches('\0').trim_matches('\n');
        if text.is_empty() {
            return Ok(header);
        }

        for (i, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);

            let (code, rest) = split_code(line)
                .ok_or_else(|| Error::Format(format!("malformed code on line {}", i)))?;

            if !matches!(code, "HD" | "SQ" | "RG" | "PG" | "CO") {
                return Err(Error::Format(format!("unknown code on line {}", i)));
            }

            if code == "HD" && i != 0 {
                return Err(Error::Format(format!("header code found on line {}", i)));
            }

            if code == "CO" {
                header.comments.push(rest[1..].to_string());
                continue;
            }

            let tags = parse_tags(rest)
                .ok_or_else(|| Error::Format(format!("malformed tags on line {}", i)))?;

            match code {
                "HD" => header.header = tags,
                "SQ" => header
                    .reference_sequences
                    .push(ReferenceSequence::from_tags(tags, i)?),
                "RG" => header.read_groups.push(tags),
                _ => header.programs.push(tags),
            }
        }

        Ok(header)
    }
}

impl fmt::Display for Header {
    /// Renders the SAM text, one newline-terminated line per record.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.header.is_empty() {
            write_tag_line(f, "HD", &self.header)?;
        }

        for reference in &self.reference_sequences {
            write!(f, "@SQ\tSN:{}\tLN:{}", reference.name, reference.length)?;
            for (tag, value) in reference.other.iter() {
                write!(f, "\t{}:{}", tag, value)?;
            }
            writeln!(f)?;
        }

        for record in &self.read_groups {
            write_id_line(f, "RG", record)?;
        }

        for record in &self.programs {
            write_id_line(f, "PG", record)?;
        }

        for comment in &self.comments {
            writeln!(f, "@CO\t{}", comment)?;
        }

        Ok(())
    }
}

fn write_tag_line(f: &mut fmt::Formatter<'_>, code: &str, record: &TagRecord) -> fmt::Result {
    write!(f, "@{}", code)?;
    for (tag, value) in record.iter() {
        write!(f, "\t{}:{}", tag, value)?;
    }
    writeln!(f)
}

/// Like [`write_tag_line`], with `ID` leading the line.
fn write_id_line(f: &mut fmt::Formatter<'_>, code: &str, record: &TagRecord) -> fmt::Result {
    write!(f, "@{}", code)?;
    if let Some(id) = record.get("ID") {
        write!(f, "\tID:{}", id)?;
    }
    for (tag, value) in record.iter().filter(|(tag, _)| *tag != "ID") {
        write!(f, "\t{}:{}", tag, value)?;
    }
    writeln!(f)
}

/// Split `@XX\t...` into the code and the remainder starting at the tab.
fn split_code(line: &str) -> Option<(&str, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 4
        || bytes[0] != b'@'
        || !bytes[1].is_ascii_uppercase()
        || !bytes[2].is_ascii_uppercase()
        || bytes[3] != b'\t'
    {
        return None;
    }
    Some((&line[1..3], &line[3..]))
}

/// Parse `\tTAG:VALUE` repeated until the end of the line; every field must conform.
fn parse_tags(rest: &str) -> Option<TagRecord> {
    let mut record = TagRecord::new();
    for field in rest[1..].split('\t') {
        let bytes = field.as_bytes();
        if bytes.len() < 4
            || !bytes[0].is_ascii_alphabetic()
            || !bytes[1].is_ascii_alphanumeric()
            || bytes[2] != b':'
        {
            return None;
        }
        record.insert(&field[..2], &field[3..]);
    }
    Some(record)
}

/// Read a BAM header from an uncompressed stream.
///
/// Returns the header and the number of bytes consumed, which is the
/// uncompressed offset of the first alignment record.
pub fn read_header<R: Read>(reader: &mut R) -> Result<(Header, u64)> {
    let mut magic = [0u8; 4];
    let n = read_up_to(reader, &mut magic)?;
    if n < 4 || &magic != BAM_MAGIC {
        return Err(Error::Format("magic number not found".to_string()));
    }

    let mut len_buf = [0u8; 4];
    if read_up_to(reader, &mut len_buf)? < 4 {
        return Err(Error::Truncated(
            "unexpected EOF reading header text length".to_string(),
        ));
    }
    let text_len = u32::from_le_bytes(len_buf) as usize;

    let mut text = vec![0u8; text_len];
    let n = read_up_to(reader, &mut text)?;
    if n < text_len {
        return Err(Error::Truncated(format!(
            "header text declares {} bytes, got {}",
            text_len, n
        )));
    }

    let text = std::str::from_utf8(&text)
        .map_err(|e| Error::Format(format!("header text is not valid UTF-8: {}", e)))?;
    let header = Header::parse(text)?;

    // The dictionary repeats @SQ; only its count has to agree with the text.
    let dictionary_len = header.reference_dictionary_len();
    let mut count_buf = [0u8; 4];
    if read_up_to(reader, &mut count_buf)? < 4 {
        return Err(Error::Truncated(
            "unexpected EOF reading reference dictionary".to_string(),
        ));
    }
    let n_ref = i32::from_le_bytes(count_buf);
    if n_ref < 0 || n_ref as usize != header.reference_sequences.len() {
        return Err(Error::Format(format!(
            "reference dictionary declares {} references, header text declares {}",
            n_ref,
            header.reference_sequences.len()
        )));
    }

    let remaining = dictionary_len - 4;
    let skipped = skip_bytes(reader, remaining)?;
    if skipped < remaining {
        return Err(Error::Truncated(format!(
            "reference dictionary declares {} bytes, got {}",
            dictionary_len,
            4 + skipped
        )));
    }

    let consumed = 8 + text_len as u64 + dictionary_len;
    Ok((header, consumed))
}

/// Serialize a header to its uncompressed BAM byte layout.
pub fn encode(header: &Header) -> Vec<u8> {
    let text = header.to_string();
    let mut buf = Vec::with_capacity(8 + text.len() + header.reference_dictionary_len() as usize);

    buf.extend_from_slice(BAM_MAGIC);
    buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
    buf.extend_from_slice(text.as_bytes());

    buf.extend_from_slice(&(header.reference_sequences.len() as i32).to_le_bytes());
    for reference in &header.reference_sequences {
        buf.extend_from_slice(&(reference.name.len() as i32 + 1).to_le_bytes());
        buf.extend_from_slice(reference.name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&(reference.length as i32).to_le_bytes());
    }

    buf
}

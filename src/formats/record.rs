//! BAM alignment record codec.
//!
//! A record is kept as its raw bytes, length prefix included, so selected
//! records are copied to the output untouched. Only the fields needed for
//! region filtering are decoded:
//!
//! ```text
//! offset  field
//! 0       block_size   uint32 (length of the rest of the record)
//! 4       refID        int32
//! 8       pos          int32 (0-based, -1 when unplaced)
//! 12      l_read_name  uint8
//! 13      mapq         uint8
//! 14      bin          uint16
//! 16      n_cigar_op   uint16
//! 18      flag         uint16
//! 20      l_seq        int32
//! 24      next_refID   int32
//! 28      next_pos     int32
//! 32      tlen         int32
//! 36      read_name, cigar, seq, qual, tags
//! ```

use super::read_up_to;
use crate::slicing::binning::reg2bin;
use crate::{Error, Result};
use std::io::Read;

/// CIGAR operation codes in BAM encoding order.
pub const CIGAR_OPS: &[u8; 9] = b"MIDNSHP=X";

/// Bytes of the fixed section, length prefix included.
const FIXED_LEN: usize = 36;

const SEQ_CODES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";

/// `reg2bin(-1, 0)`: the bin htslib assigns to unplaced reads.
const UNPLACED_BIN: u32 = 4680;

/// One alignment record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    reference_id: i32,
    position: i32,
    coverage: u32,
    data: Vec<u8>,
}

impl Record {
    /// Decode the filtering fields of a record whose bytes include the length prefix.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.len() < FIXED_LEN {
            return Err(Error::Format(format!(
                "alignment record of {} bytes is shorter than the fixed section",
                data.len()
            )));
        }

        let reference_id = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let position = i32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let name_len = data[12] as usize;
        let n_cigar_op = u16::from_le_bytes([data[16], data[17]]) as usize;

        let cigar_start = FIXED_LEN + name_len;
        let cigar_end = cigar_start + 4 * n_cigar_op;
        if cigar_end > data.len() {
            return Err(Error::Format(format!(
                "alignment record CIGAR ends at byte {} past record end {}",
                cigar_end,
                data.len()
            )));
        }

        let coverage = cigar_coverage(&data[cigar_start..cigar_end])?;

        Ok(Self {
            reference_id,
            position,
            coverage,
            data,
        })
    }

    /// Reference id, -1 for unplaced reads.
    pub fn reference_id(&self) -> i32 {
        self.reference_id
    }

    /// Leftmost mapped position, 1-based.
    pub fn pos(&self) -> i64 {
        self.position as i64 + 1
    }

    /// Rightmost mapped position, 1-based inclusive.
    pub fn end(&self) -> i64 {
        self.position as i64 + self.coverage as i64
    }

    /// Reference bases consumed by the CIGAR.
    pub fn coverage(&self) -> u32 {
        self.coverage
    }

    /// 0-based half-open reference span used for overlap tests. A record that
    /// consumes no reference bases covers its start base.
    pub fn span(&self) -> (i64, i64) {
        let start = self.position as i64;
        (start, start + self.coverage.max(1) as i64)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Sum the reference-consuming operations (`M`, `D`, `N`, `=`, `X`) of packed CIGAR bytes.
pub fn cigar_coverage(cigar: &[u8]) -> Result<u32> {
    let mut coverage: u32 = 0;
    for op in cigar.chunks_exact(4) {
        let value = u32::from_le_bytes([op[0], op[1], op[2], op[3]]);
        let len = value >> 4;
        match CIGAR_OPS.get((value & 0xF) as usize) {
            Some(b'M' | b'D' | b'N' | b'=' | b'X') => coverage = coverage.saturating_add(len),
            Some(_) => {}
            None => {
                return Err(Error::Format(format!(
                    "invalid CIGAR operation code {}",
                    value & 0xF
                )));
            }
        }
    }
    Ok(coverage)
}

/// Read one record. `Ok(None)` marks a clean end of input before a length prefix.
pub fn read_record<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Record>> {
    let mut len_buf = [0u8; 4];
    match read_up_to(reader, &mut len_buf)? {
        0 => return Ok(None),
        4 => {}
        n => {
            return Err(Error::Truncated(format!(
                "record length prefix: expected 4 bytes, got {}",
                n
            )));
        }
    }

    let block_size = u32::from_le_bytes(len_buf) as usize;
    let mut data = vec![0u8; 4 + block_size];
    data[..4].copy_from_slice(&len_buf);

    let n = read_up_to(reader, &mut data[4..])?;
    if n < block_size {
        return Err(Error::Truncated(format!(
            "record declares {} bytes, got {}",
            block_size, n
        )));
    }

    Record::from_bytes(data).map(Some)
}

/// Lazy record iterator over an uncompressed stream.
///
/// Ends at a clean end of input. After an error it yields nothing more.
pub struct Records<R> {
    reader: R,
    done: bool,
}

impl<R: Read> Records<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match read_record(&mut self.reader) {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Field values for encoding a record.
#[derive(Debug, Clone)]
pub struct AlignmentFields {
    pub name: String,
    pub flags: u16,
    pub reference_id: i32,
    /// 0-based; -1 when unplaced.
    pub position: i32,
    pub mapping_quality: u8,
    /// `(length, op)` pairs with ops from [`CIGAR_OPS`], e.g. `(50, b'M')`.
    pub cigar: Vec<(u32, u8)>,
    pub mate_reference_id: i32,
    pub mate_position: i32,
    pub template_length: i32,
    /// Bases as IUPAC letters.
    pub sequence: Vec<u8>,
    /// Raw Phred scores; empty means "missing".
    pub quality: Vec<u8>,
}

impl AlignmentFields {
    /// An unplaced, unmapped read with no sequence.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: 0x4,
            reference_id: -1,
            position: -1,
            mapping_quality: 255,
            cigar: Vec::new(),
            mate_reference_id: -1,
            mate_position: -1,
            template_length: 0,
            sequence: Vec::new(),
            quality: Vec::new(),
        }
    }

    /// A mapped read with an all-match CIGAR spanning `len` bases.
    pub fn mapped(name: impl Into<String>, reference_id: i32, position: i32, len: u32) -> Self {
        Self {
            flags: 0,
            reference_id,
            position,
            mapping_quality: 60,
            cigar: vec![(len, b'M')],
            sequence: vec![b'A'; len as usize],
            ..Self::new(name)
        }
    }

    pub fn encode(&self) -> Result<Record> {
        if self.name.len() > 254 {
            return Err(Error::InvalidInput(format!(
                "read name of {} bytes exceeds 254",
                self.name.len()
            )));
        }
        if self.cigar.len() > u16::MAX as usize {
            return Err(Error::InvalidInput(format!(
                "{} CIGAR operations exceed the inline limit",
                self.cigar.len()
            )));
        }
        if !self.quality.is_empty() && self.quality.len() != self.sequence.len() {
            return Err(Error::InvalidInput(
                "quality length differs from sequence length".to_string(),
            ));
        }

        let mut cigar = Vec::with_capacity(self.cigar.len());
        let mut coverage: u32 = 0;
        for &(len, op) in &self.cigar {
            let code = CIGAR_OPS.iter().position(|&c| c == op).ok_or_else(|| {
                Error::InvalidInput(format!("invalid CIGAR operation {:?}", op as char))
            })?;
            if matches!(op, b'M' | b'D' | b'N' | b'=' | b'X') {
                coverage += len;
            }
            cigar.push((len << 4) | code as u32);
        }

        let bin = if self.position < 0 {
            UNPLACED_BIN
        } else {
            let begin = self.position as u64;
            reg2bin(begin, begin + coverage.max(1) as u64)
        };

        let mut data = Vec::new();
        data.extend_from_slice(&[0u8; 4]);
        data.extend_from_slice(&self.reference_id.to_le_bytes());
        data.extend_from_slice(&self.position.to_le_bytes());
        data.push(self.name.len() as u8 + 1);
        data.push(self.mapping_quality);
        data.extend_from_slice(&(bin as u16).to_le_bytes());
        data.extend_from_slice(&(cigar.len() as u16).to_le_bytes());
        data.extend_from_slice(&self.flags.to_le_bytes());
        data.extend_from_slice(&(self.sequence.len() as i32).to_le_bytes());
        data.extend_from_slice(&self.mate_reference_id.to_le_bytes());
        data.extend_from_slice(&self.mate_position.to_le_bytes());
        data.extend_from_slice(&self.template_length.to_le_bytes());
        data.extend_from_slice(self.name.as_bytes());
        data.push(0);
        for op in cigar {
            data.extend_from_slice(&op.to_le_bytes());
        }
        for pair in self.sequence.chunks(2) {
            let hi = encode_base(pair[0]);
            let lo = pair.get(1).map_or(0, |&b| encode_base(b));
            data.push((hi << 4) | lo);
        }
        if self.quality.is_empty() {
            data.extend(std::iter::repeat_n(0xFF, self.sequence.len()));
        } else {
            data.extend_from_slice(&self.quality);
        }

        let block_size = (data.len() - 4) as u32;
        data[..4].copy_from_slice(&block_size.to_le_bytes());

        Record::from_bytes(data)
    }
}

fn encode_base(base: u8) -> u8 {
    SEQ_CODES
        .iter()
        .position(|&c| c == base.to_ascii_uppercase())
        .unwrap_or(15) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_fields() {
        let mut fields = AlignmentFields::mapped("read1", 2, 999, 0);
        fields.cigar = vec![
            (5, b'S'),
            (20, b'M'),
            (3, b'I'),
            (10, b'D'),
            (4, b'N'),
            (6, b'='),
            (2, b'X'),
            (7, b'H'),
        ];
        fields.sequence = vec![b'C'; 36];
        let record = fields.encode().unwrap();

        assert_eq!(record.reference_id(), 2);
        assert_eq!(record.pos(), 1000);
        assert_eq!(record.coverage(), 20 + 10 + 4 + 6 + 2);
        assert_eq!(record.end(), 999 + 42);
        assert_eq!(record.span(), (999, 1041));
    }

    #[test]
    fn test_read_record_from_stream() {
        let first = AlignmentFields::mapped("a", 0, 10, 50).encode().unwrap();
        let second = AlignmentFields::mapped("b", 0, 20, 50).encode().unwrap();

        let mut stream = first.as_bytes().to_vec();
        stream.extend_from_slice(second.as_bytes());

        let records: Vec<Record> = Records::new(&stream[..])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn test_clean_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_record(&mut empty).unwrap().is_none());
    }

    #[test]
    fn test_truncated_prefix() {
        let err = read_record(&mut &[1u8, 0][..]).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }

    #[test]
    fn test_truncated_body() {
        let record = AlignmentFields::mapped("a", 0, 10, 50).encode().unwrap();
        let bytes = record.as_bytes();
        let err = read_record(&mut &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let record = AlignmentFields::mapped("a", 0, 10, 50).encode().unwrap();
        let mut stream = record.as_bytes().to_vec();
        stream.extend_from_slice(&[9, 9]);

        let mut records = Records::new(&stream[..]);
        assert!(records.next().unwrap().is_ok());
        assert!(records.next().unwrap().is_err());
        assert!(records.next().is_none());
    }

    #[test]
    fn test_short_fixed_section() {
        let mut data = 8u32.to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        assert!(matches!(Record::from_bytes(data), Err(Error::Format(_))));
    }

    #[test]
    fn test_cigar_past_record_end() {
        let record = AlignmentFields::mapped("a", 0, 10, 50).encode().unwrap();
        let mut data = record.into_bytes();
        data[16] = 200;
        assert!(matches!(Record::from_bytes(data), Err(Error::Format(_))));
    }

    #[test]
    fn test_invalid_cigar_op() {
        let op = (10u32 << 4) | 9;
        let err = cigar_coverage(&op.to_le_bytes()).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_unmapped_record() {
        let record = AlignmentFields::new("u").encode().unwrap();
        assert_eq!(record.reference_id(), -1);
        assert_eq!(record.pos(), 0);
        assert_eq!(record.coverage(), 0);
        let bin = u16::from_le_bytes([record.as_bytes()[14], record.as_bytes()[15]]);
        assert_eq!(bin, 4680);
    }

    #[test]
    fn test_sequence_packing() {
        let mut fields = AlignmentFields::mapped("s", 0, 0, 3);
        fields.sequence = b"ACG".to_vec();
        fields.quality = vec![30, 31, 32];
        let record = fields.encode().unwrap();
        let bytes = record.as_bytes();
        // name "s\0" then one CIGAR op
        let seq_start = 36 + 2 + 4;
        assert_eq!(&bytes[seq_start..seq_start + 2], &[0x12, 0x40]);
        assert_eq!(&bytes[seq_start + 2..], &[30, 31, 32]);
    }
}

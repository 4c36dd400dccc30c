//! Shared fixtures: a coordinate-sorted BAM with its BAI, built in memory.
#![allow(dead_code)]

use flate2::read::MultiGzDecoder;
use htslice::formats::header::{self, read_header};
use htslice::formats::{
    AlignmentFields, BgzfWriter, Header, Record, Records, ReferenceSequence, TagRecord,
    VirtualOffset,
};
use htslice::slicing::Slicer;
use htslice::slicing::binning::reg2bin;
use htslice::storage::MemorySource;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub const FIXTURE_BLOCK_SIZE: usize = 4096;

pub const CHR1_LEN: u64 = 100_000;
pub const CHR2_LEN: u64 = 50_000;
pub const CHR3_LEN: u64 = 10_000;
pub const UNPLACED: usize = 5;

pub fn standard_header() -> Header {
    let mut chr1 = ReferenceSequence::new("chr1", CHR1_LEN);
    chr1.other.insert("M5", "0123456789abcdef0123456789abcdef");

    Header {
        header: TagRecord::new().with("VN", "1.6").with("SO", "coordinate"),
        reference_sequences: vec![
            chr1,
            ReferenceSequence::new("chr2", CHR2_LEN),
            ReferenceSequence::new("chr3", CHR3_LEN),
        ],
        read_groups: vec![TagRecord::new().with("ID", "rg1").with("SM", "sample")],
        programs: vec![TagRecord::new().with("ID", "fixture").with("PN", "htslice-tests")],
        comments: vec!["synthetic test data".to_string()],
    }
}

/// Reads in coordinate order: short reads tiled over chr1 and chr2, a long
/// chr1 read spanning several linear-index tiles, a chr1 read consuming no
/// reference bases, nothing on chr3, then unplaced reads.
pub fn standard_reads() -> Vec<AlignmentFields> {
    let mut reads = Vec::new();

    for pos in (0..99_000).step_by(250) {
        reads.push(AlignmentFields::mapped(format!("chr1_{}", pos), 0, pos, 100));
    }
    reads.push(AlignmentFields::mapped("chr1_long", 0, 10_000, 30_000));

    let mut zero = AlignmentFields::mapped("chr1_zero", 0, 50_000, 0);
    zero.cigar = vec![(20, b'S')];
    zero.sequence = vec![b'C'; 20];
    reads.push(zero);

    for pos in (0..49_000).step_by(1000) {
        reads.push(AlignmentFields::mapped(format!("chr2_{}", pos), 1, pos, 150));
    }

    reads.sort_by_key(|r| (r.reference_id, r.position));

    for i in 0..UNPLACED {
        let mut read = AlignmentFields::new(format!("unplaced_{}", i));
        read.sequence = b"ACGTACGTAC".to_vec();
        reads.push(read);
    }
    reads
}

/// Position of one written record.
struct Placement {
    reference_id: i32,
    begin: u64,
    end: u64,
    start: VirtualOffset,
    stop: VirtualOffset,
}

pub struct Fixture {
    pub header: Header,
    pub reads: Vec<AlignmentFields>,
    pub bam: Vec<u8>,
    pub bai: Vec<u8>,
}

impl Fixture {
    pub fn standard() -> Self {
        Self::build(standard_header(), standard_reads())
    }

    pub fn build(header: Header, reads: Vec<AlignmentFields>) -> Self {
        let mut writer = BgzfWriter::with_block_size(Vec::new(), FIXTURE_BLOCK_SIZE).unwrap();
        writer.write_unit(&header::encode(&header), true).unwrap();
        writer.flush_block().unwrap();

        let mut placements = Vec::new();
        for read in &reads {
            let record = read.encode().unwrap();
            let bytes = record.as_bytes();

            // Start a new block rather than split the record, so offsets
            // point at the record's first byte.
            let buffered = writer.virtual_position().uncompressed() as usize;
            if buffered + bytes.len() > writer.block_size() {
                writer.flush_block().unwrap();
            }

            let start = writer.virtual_position();
            writer.write_unit(bytes, false).unwrap();
            let stop = writer.virtual_position();

            let (begin, end) = record.span();
            placements.push(Placement {
                reference_id: record.reference_id(),
                begin: begin.max(0) as u64,
                end: end.max(0) as u64,
                start,
                stop,
            });
        }

        let bam = writer.finish().unwrap();
        let bai = build_index(header.reference_sequences.len(), &placements);

        Self {
            header,
            reads,
            bam,
            bai,
        }
    }

    pub fn slicer(&self) -> Slicer {
        Slicer::new(
            Arc::new(MemorySource::new(self.bam.clone())),
            Arc::new(MemorySource::new(self.bai.clone())),
        )
    }

    /// Names of the records a slice must return, in output order.
    ///
    /// `regions` are 0-based half-open `(name, begin, end)` triples.
    pub fn expected(&self, regions: &[(&str, u64, u64)], include_unmapped: bool) -> Vec<String> {
        let mut names = Vec::new();
        for read in &self.reads {
            let record = read.encode().unwrap();
            if record.reference_id() < 0 {
                continue;
            }
            let name = self.header.reference_sequences[record.reference_id() as usize]
                .name
                .as_str();
            let (begin, end) = record.span();
            let overlaps = regions.iter().any(|&(r, b, e)| {
                r == name && (b as i64) < end && begin < e as i64
            });
            if overlaps {
                names.push(read.name.clone());
            }
        }

        if include_unmapped {
            names.extend(
                self.reads
                    .iter()
                    .filter(|r| r.reference_id < 0)
                    .map(|r| r.name.clone()),
            );
        }
        names
    }

    /// Write `<id>.bam` and `<id>.bam.bai` into `dir`.
    pub fn write_to(&self, dir: &Path, id: &str) {
        std::fs::write(dir.join(format!("{}.bam", id)), &self.bam).unwrap();
        std::fs::write(dir.join(format!("{}.bam.bai", id)), &self.bai).unwrap();
    }
}

fn build_index(n_ref: usize, placements: &[Placement]) -> Vec<u8> {
    #[derive(Default)]
    struct Reference {
        bins: BTreeMap<u32, Vec<(u64, u64)>>,
        linear: Vec<u64>,
        first: Option<u64>,
        last: u64,
        count: u64,
    }

    let mut references: Vec<Reference> = (0..n_ref).map(|_| Reference::default()).collect();
    let mut unplaced = 0u64;

    for p in placements {
        if p.reference_id < 0 {
            unplaced += 1;
            continue;
        }
        let reference = &mut references[p.reference_id as usize];
        let (start, stop) = (p.start.as_raw(), p.stop.as_raw());

        let chunks = reference.bins.entry(reg2bin(p.begin, p.end)).or_default();
        match chunks.last_mut() {
            Some(last) if last.1 == start => last.1 = stop,
            _ => chunks.push((start, stop)),
        }

        let first_tile = (p.begin >> 14) as usize;
        let last_tile = ((p.end - 1) >> 14) as usize;
        if reference.linear.len() <= last_tile {
            reference.linear.resize(last_tile + 1, 0);
        }
        for tile in first_tile..=last_tile {
            if reference.linear[tile] == 0 {
                reference.linear[tile] = start;
            }
        }

        reference.first.get_or_insert(start);
        reference.last = stop;
        reference.count += 1;
    }

    let mut out = b"BAI\x01".to_vec();
    out.extend_from_slice(&(n_ref as i32).to_le_bytes());

    for mut reference in references {
        for i in 1..reference.linear.len() {
            if reference.linear[i] == 0 {
                reference.linear[i] = reference.linear[i - 1];
            }
        }

        let n_bin = reference.bins.len() + usize::from(reference.first.is_some());
        out.extend_from_slice(&(n_bin as i32).to_le_bytes());
        for (bin, chunks) in &reference.bins {
            out.extend_from_slice(&bin.to_le_bytes());
            out.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (start, stop) in chunks {
                out.extend_from_slice(&start.to_le_bytes());
                out.extend_from_slice(&stop.to_le_bytes());
            }
        }
        if let Some(first) = reference.first {
            out.extend_from_slice(&37450u32.to_le_bytes());
            out.extend_from_slice(&2i32.to_le_bytes());
            for value in [first, reference.last, reference.count, 0] {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }

        out.extend_from_slice(&(reference.linear.len() as i32).to_le_bytes());
        for offset in &reference.linear {
            out.extend_from_slice(&offset.to_le_bytes());
        }
    }

    out.extend_from_slice(&unplaced.to_le_bytes());
    out
}

/// Decode a complete BAM stream with the crate's own codecs.
pub fn decode(bam: &[u8]) -> (Header, Vec<Record>) {
    let mut reader = MultiGzDecoder::new(bam);
    let (header, _) = read_header(&mut reader).unwrap();
    let records = Records::new(reader).collect::<Result<Vec<_>, _>>().unwrap();
    (header, records)
}

pub fn read_name(record: &Record) -> String {
    let bytes = record.as_bytes();
    let len = bytes[12] as usize;
    String::from_utf8_lossy(&bytes[36..36 + len - 1]).into_owned()
}

pub fn names(records: &[Record]) -> Vec<String> {
    records.iter().map(read_name).collect()
}

/// Split a BGZF stream into its blocks.
pub fn blocks(mut data: &[u8]) -> Vec<&[u8]> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let bsize = u16::from_le_bytes([data[16], data[17]]) as usize + 1;
        out.push(&data[..bsize]);
        data = &data[bsize..];
    }
    out
}

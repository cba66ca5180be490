//! Field compiler
//!
//! Turns a field's ordered descriptor list into `(destination offset, source mask)` segments.
//! The destination offset of a segment is the accumulated width of the descriptors declared
//! before it, not its source position; this is what reassembles scattered source bits into a
//! contiguous value.
//!
//! ```text
//! jal_imm = ["30:21", "20", "19:12", "31"], offset 1
//!
//!  source  | 31 | 30 ........ 21 | 20 | 19 ..... 12 |
//!  value   | 20 | 10 .........  1 | 11 | 19 ..... 12 |   (after the result offset of 1)
//! ```
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::{
    descriptor::{Descriptor, DescriptorError},
    error::{Error, Location, Result},
};

/// Widest instruction word the compiler handles
pub const MAX_WORD_WIDTH: u32 = 64;

/// One descriptor after compilation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Segment {
    /// Bit position inside the reconstructed field (before the result offset) where the lowest
    /// source bit of this segment lands
    pub dest_offset: u32,
    /// Source bits selected from the instruction word
    pub mask: u64,
}

impl Segment {
    /// Index of the lowest set bit of the source mask
    pub fn source_offset(&self) -> u32 {
        self.mask.trailing_zeros()
    }

    pub fn width(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Right-shift moving the masked source bits to their final position. Negative values
    /// mean a left shift.
    pub fn shift(&self, result_offset: u32) -> i64 {
        self.source_offset() as i64 - self.dest_offset as i64 - result_offset as i64
    }
}

/// A named field ready for code generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledField {
    name: String,
    bit_length: u32,
    result_offset: u32,
    word_width: u32,
    segments: Vec<Segment>,
}

impl CompiledField {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of source bits, the sum of all descriptor widths
    pub fn bit_length(&self) -> u32 {
        self.bit_length
    }

    /// Left shift applied to the whole reconstructed value
    pub fn result_offset(&self) -> u32 {
        self.result_offset
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Width of the extracted value: `bit_length + result_offset`
    pub fn value_width(&self) -> u32 {
        self.bit_length + self.result_offset
    }

    /// Union of all source masks
    pub fn source_mask(&self) -> u64 {
        self.segments.iter().fold(0, |acc, seg| acc | seg.mask)
    }

    /// Evaluate the segment map against a raw instruction word
    pub fn extract(&self, word: u64) -> u64 {
        self.segments.iter().fold(0, |acc, seg| {
            let bits = word & seg.mask;
            let shift = seg.shift(self.result_offset);
            acc | if shift >= 0 { bits >> shift } else { bits << -shift }
        })
    }

    /// Inverse of [`CompiledField::extract`]: scatter a field value back into its source bits.
    /// Value bits the field does not carry are dropped.
    pub fn deposit(&self, value: u64) -> u64 {
        self.segments.iter().fold(0, |acc, seg| {
            let shift = seg.shift(self.result_offset);
            let bits = if shift >= 0 { value << shift } else { value >> -shift };
            acc | (bits & seg.mask)
        })
    }

    /// Whether `value` survives a deposit/extract round trip, i.e. it fits the field and has no
    /// bits below the result offset
    pub fn fits(&self, value: u64) -> bool {
        self.extract(self.deposit(value)) == value
    }
}

/// Compiles field declarations for one instruction word width
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FieldCompiler {
    word_width: u32,
}

impl FieldCompiler {
    pub fn new(word_width: u32) -> Self {
        debug_assert!((1..=MAX_WORD_WIDTH).contains(&word_width));
        Self { word_width }
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    /// Compile `descriptors` (in declaration order) into a field.
    ///
    /// Fails with [`Error::Format`] on a descriptor that does not parse or that names a bit
    /// outside the word, and with [`Error::Overlap`] when two descriptors share a source bit.
    pub fn compile<S: AsRef<str>>(
        &self,
        name: &str,
        descriptors: &[S],
        result_offset: u32,
    ) -> Result<CompiledField> {
        if descriptors.is_empty() {
            return Err(Error::format(Location::field(name), "field declares no bit positions"));
        }

        let mut segments = Vec::with_capacity(descriptors.len());
        let mut claimed: Vec<(&str, u64)> = Vec::with_capacity(descriptors.len());
        let mut dest_offset = 0;

        for raw in descriptors {
            let raw = raw.as_ref();
            let location =
                || Location::Descriptor { field: name.to_string(), descriptor: raw.to_string() };

            let descriptor: Descriptor = raw
                .parse()
                .map_err(|e: DescriptorError| Error::format(location(), e.to_string()))?;
            if descriptor.high() >= self.word_width {
                return Err(Error::format(
                    location(),
                    format!(
                        "bit index {} is outside a {}-bit instruction word",
                        descriptor.high(),
                        self.word_width
                    ),
                ));
            }

            let mask = descriptor.mask();
            if let Some((first, prior)) = claimed.iter().find(|(_, prior)| prior & mask != 0) {
                return Err(Error::Overlap {
                    field: name.to_string(),
                    first: first.to_string(),
                    second: raw.to_string(),
                    bits: prior & mask,
                });
            }
            claimed.push((raw, mask));

            segments.push(Segment { dest_offset, mask });
            // disjoint bits below the word width, so the sum stays within MAX_WORD_WIDTH
            dest_offset += descriptor.width() as u32;
        }

        let bit_length = dest_offset;
        let value_width = u64::from(bit_length) + u64::from(result_offset);
        if value_width > u64::from(MAX_WORD_WIDTH) {
            return Err(Error::format(
                Location::field(name),
                format!(
                    "value needs {value_width} bits ({bit_length} + offset {result_offset}), \
                     more than {MAX_WORD_WIDTH}"
                ),
            ));
        }

        debug!(field = name, bit_length, result_offset, segments = segments.len(), "compiled field");

        Ok(CompiledField {
            name: name.to_string(),
            bit_length,
            result_offset,
            word_width: self.word_width,
            segments,
        })
    }
}

/// Compiled fields by name, in declaration order. Fields are shared with the operations and
/// trees that refer to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    fields: IndexMap<String, Arc<CompiledField>>,
}

impl FieldSet {
    pub fn insert(&mut self, field: CompiledField) -> Arc<CompiledField> {
        let field = Arc::new(field);
        self.fields.insert(field.name.clone(), field.clone());
        field
    }

    pub fn get(&self, name: &str) -> Option<&Arc<CompiledField>> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Arc<CompiledField>> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<CompiledField> for FieldSet {
    fn from_iter<I: IntoIterator<Item = CompiledField>>(iter: I) -> Self {
        let mut set = FieldSet::default();
        for field in iter {
            set.insert(field);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rv32() -> FieldCompiler {
        FieldCompiler::new(32)
    }

    #[test]
    fn test_shamt_single_segment() {
        let field = rv32().compile("shamt", &["24:20"], 0).unwrap();
        assert_eq!(field.bit_length(), 5);
        assert_eq!(field.segments(), &[Segment { dest_offset: 0, mask: 0b1_1111 << 20 }]);
        assert_eq!(field.extract(0b10110 << 20 | 0x7F), 0b10110);
    }

    #[test]
    fn test_jal_imm_segments() {
        let field = rv32().compile("jal_imm", &["30:21", "20", "19:12", "31"], 1).unwrap();
        let offsets: Vec<u32> = field.segments().iter().map(|s| s.dest_offset).collect();
        assert_eq!(offsets, vec![0, 10, 11, 19]);
        assert_eq!(field.bit_length(), 20);
        assert_eq!(field.value_width(), 21);

        // bit 31 is imm[20]
        assert_eq!(field.extract(0x8000_0000), 1 << 20);
        // jal x0, 4
        assert_eq!(field.extract(0x0040_006F), 4);
        // jal x1, 2048: imm[11] lives in bit 20
        assert_eq!(field.extract(0x0010_00EF), 2048);
    }

    #[test]
    fn test_branch_imm_matches_reference_formula() {
        let field = rv32().compile("branch_imm", &["11:8", "30:25", "7", "31"], 1).unwrap();
        for raw in [0x0020_8463u32, 0xFE20_8EE3, 0x8000_0080, 0x7E00_0F00] {
            let imm12 = (raw >> 31) & 1;
            let imm10_5 = (raw >> 25) & 0x3F;
            let imm4_1 = (raw >> 8) & 0xF;
            let imm11 = (raw >> 7) & 1;
            let expected = (imm12 << 12) | (imm11 << 11) | (imm10_5 << 5) | (imm4_1 << 1);
            assert_eq!(field.extract(raw as u64), expected as u64, "raw = {raw:#010x}");
        }
    }

    #[test]
    fn test_li_imm_offset() {
        let field = rv32().compile("li_imm", &["31:12"], 12).unwrap();
        assert_eq!(field.segments()[0].shift(12), 0);
        assert_eq!(field.extract(0x1234_5037), 0x1234_5000);
        assert!(field.fits(0x1234_5000));
        assert!(!field.fits(0x1234_5001));
    }

    #[test]
    fn test_deposit_inverts_extract() {
        let field = rv32().compile("str_imm", &["11:7", "31:25"], 0).unwrap();
        let word = 0xFE00_0F80;
        assert_eq!(field.deposit(field.extract(word)), word & field.source_mask());
        assert!(!field.fits(1 << 12));
    }

    #[test]
    fn test_malformed_descriptor() {
        let err = rv32().compile("bad", &["11:7", "abc"], 0).unwrap_err();
        match err {
            Error::Format { location: Location::Descriptor { field, descriptor }, .. } => {
                assert_eq!(field, "bad");
                assert_eq!(descriptor, "abc");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_index_outside_word() {
        let err = FieldCompiler::new(16).compile("wide", &["16:10"], 0).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
        assert!(FieldCompiler::new(16).compile("ok", &["15:10"], 0).is_ok());
    }

    #[test]
    fn test_overlap_detected() {
        let err = rv32().compile("dup", &["24:20", "7", "21"], 0).unwrap_err();
        assert_eq!(
            err,
            Error::Overlap {
                field: "dup".into(),
                first: "24:20".into(),
                second: "21".into(),
                bits: 1 << 21,
            }
        );
    }

    #[test]
    fn test_empty_and_too_wide() {
        assert!(rv32().compile::<&str>("none", &[], 0).is_err());
        assert!(FieldCompiler::new(64).compile("full", &["63:0"], 0).is_ok());
        assert!(FieldCompiler::new(64).compile("over", &["63:0"], 1).is_err());
    }

    #[test]
    fn test_huge_offset_is_format_error() {
        let err = rv32().compile("f", &["24:20"], u32::MAX).unwrap_err();
        match err {
            Error::Format { location, reason } => {
                assert_eq!(location, Location::field("f"));
                assert!(reason.contains("4294967300 bits"), "{reason}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

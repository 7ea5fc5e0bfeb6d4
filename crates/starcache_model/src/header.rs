//! Content-addressed segment headers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bits::BitKey;
use crate::column::SegmentColumn;
use crate::hash::Fnv64;

/// Cryptographic digest of a schema definition.
///
/// Opaque byte string; two deployments of the same schema produce the same
/// checksum, so headers remain interchangeable across processes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaChecksum(Vec<u8>);

impl SchemaChecksum {
    /// Wraps raw digest bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Digests a schema definition text.
    #[must_use]
    pub fn of(schema_definition: &str) -> Self {
        Self(Sha256::digest(schema_definition.as_bytes()).to_vec())
    }

    /// The raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SchemaChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The schema/cube/measure/fact-table provenance that scopes a segment's
/// identity. Headers with different provenance never match, roll up, or
/// intersect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentProvenance {
    /// Name of the schema.
    pub schema_name: String,
    /// Checksum of the schema definition.
    pub schema_checksum: SchemaChecksum,
    /// Name of the cube.
    pub cube_name: String,
    /// Name of the measure.
    pub measure_name: String,
    /// Alias of the star's fact table.
    pub fact_table: String,
}

/// The unique identifier of a segment header: a SHA-256 digest of its key
/// material. Headers with equal ids are interchangeable across processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId([u8; 32]);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// The immutable, content-addressed identity of a segment.
///
/// A header describes a segment's provenance, its dimensionality (one
/// constrained column per bit of the bit key, in bit order), the verbatim
/// text of any compound predicates, and the regions punched out by earlier
/// flushes. Headers are the keys of the segment cache: equality is
/// equality of [`SegmentHeader::unique_id`], a SHA-256 digest over
/// provenance, column predicates and compound predicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "HeaderRepr", into = "HeaderRepr")]
pub struct SegmentHeader {
    provenance: SegmentProvenance,
    constrained_columns: Vec<SegmentColumn>,
    compound_predicates: Vec<String>,
    bit_key: BitKey,
    excluded_regions: Vec<SegmentColumn>,
    hash: u64,
    unique_id: OnceLock<SegmentId>,
}

impl SegmentHeader {
    /// Creates a header.
    ///
    /// `constrained_columns` must hold one entry per set bit of `bit_key`,
    /// ordered by bit position. The hash code is computed up front; the
    /// unique id is computed on first access and memoized.
    #[must_use]
    pub fn new(
        provenance: SegmentProvenance,
        constrained_columns: Vec<SegmentColumn>,
        compound_predicates: Vec<String>,
        bit_key: BitKey,
        excluded_regions: Vec<SegmentColumn>,
    ) -> Self {
        let mut fnv = Fnv64::new();
        provenance.schema_name.hash(&mut fnv);
        provenance.schema_checksum.hash(&mut fnv);
        provenance.cube_name.hash(&mut fnv);
        provenance.measure_name.hash(&mut fnv);
        for column in &constrained_columns {
            column.hash(&mut fnv);
        }
        for predicate in &compound_predicates {
            predicate.hash(&mut fnv);
        }
        Self {
            hash: fnv.finish(),
            provenance,
            constrained_columns,
            compound_predicates,
            bit_key,
            excluded_regions,
            unique_id: OnceLock::new(),
        }
    }

    /// The provenance scoping this header.
    #[must_use]
    pub fn provenance(&self) -> &SegmentProvenance {
        &self.provenance
    }

    /// The constrained columns, one per axis, in bit-key order.
    #[must_use]
    pub fn constrained_columns(&self) -> &[SegmentColumn] {
        &self.constrained_columns
    }

    /// The verbatim compound predicate texts.
    #[must_use]
    pub fn compound_predicates(&self) -> &[String] {
        &self.compound_predicates
    }

    /// The dimensionality bitmap.
    #[must_use]
    pub fn bit_key(&self) -> &BitKey {
        &self.bit_key
    }

    /// Regions excluded from this segment by earlier flushes.
    #[must_use]
    pub fn excluded_regions(&self) -> &[SegmentColumn] {
        &self.excluded_regions
    }

    /// Number of axes.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.constrained_columns.len()
    }

    /// The constrained column for `column_expression`, if this header has
    /// one. Linear scan; arity is small.
    #[must_use]
    pub fn constrained_column(&self, column_expression: &str) -> Option<&SegmentColumn> {
        self.constrained_columns
            .iter()
            .find(|c| c.column_expression() == column_expression)
    }

    /// The excluded region touching `column_expression`, if any.
    #[must_use]
    pub fn excluded_region(&self, column_expression: &str) -> Option<&SegmentColumn> {
        self.excluded_regions
            .iter()
            .find(|c| c.column_expression() == column_expression)
    }

    /// Clones this header, replacing or adding constrained columns by
    /// expression. Existing columns keep their position; new columns are
    /// appended in the order given.
    #[must_use]
    pub fn with_overrides(&self, overrides: &[SegmentColumn]) -> SegmentHeader {
        let mut columns = self.constrained_columns.clone();
        for over in overrides {
            match columns
                .iter_mut()
                .find(|c| c.column_expression() == over.column_expression())
            {
                Some(slot) => *slot = over.clone(),
                None => columns.push(over.clone()),
            }
        }
        SegmentHeader::new(
            self.provenance.clone(),
            columns,
            self.compound_predicates.clone(),
            self.bit_key.clone(),
            self.excluded_regions.clone(),
        )
    }

    /// Clones this header with an additional excluded region.
    #[must_use]
    pub fn with_excluded_region(&self, region: SegmentColumn) -> SegmentHeader {
        let mut excluded = self.excluded_regions.clone();
        excluded.push(region);
        SegmentHeader::new(
            self.provenance.clone(),
            self.constrained_columns.clone(),
            self.compound_predicates.clone(),
            self.bit_key.clone(),
            excluded,
        )
    }

    /// Returns whether this header has the given provenance and
    /// dimensionality. Callers combine this with value-range checks when
    /// deciding whether a segment can serve a request.
    #[must_use]
    pub fn matches_dimensionality(
        &self,
        provenance: &SegmentProvenance,
        bit_key: &BitKey,
    ) -> bool {
        self.provenance == *provenance && self.bit_key == *bit_key
    }

    /// The content digest identifying this header, computed on first
    /// access. Fact table and excluded regions are not digest material:
    /// a flushed segment keeps its identity.
    pub fn unique_id(&self) -> SegmentId {
        *self.unique_id.get_or_init(|| {
            let mut digest = DigestWriter::new();
            digest.write_str(&self.provenance.schema_name);
            digest.write_bytes(self.provenance.schema_checksum.as_bytes());
            digest.write_str(&self.provenance.cube_name);
            digest.write_str(&self.provenance.measure_name);
            for column in &self.constrained_columns {
                digest.write_str(column.column_expression());
                if let Some(values) = column.values() {
                    for value in values.iter() {
                        digest.write_str(&value.to_string());
                    }
                }
            }
            for predicate in &self.compound_predicates {
                digest.write_str(predicate);
            }
            SegmentId(digest.finish())
        })
    }
}

impl PartialEq for SegmentHeader {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id() == other.unique_id()
    }
}

impl Eq for SegmentHeader {}

impl Hash for SegmentHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for SegmentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "*Segment Header")?;
        writeln!(f, "Schema:[{}]", self.provenance.schema_name)?;
        writeln!(f, "Checksum:[{}]", self.provenance.schema_checksum)?;
        writeln!(f, "Cube:[{}]", self.provenance.cube_name)?;
        writeln!(f, "Measure:[{}]", self.provenance.measure_name)?;
        write!(f, "Axes:[")?;
        for column in &self.constrained_columns {
            write!(f, "\n\t{{{}=(", column.column_expression())?;
            match column.values() {
                None => write!(f, "*")?,
                Some(values) => {
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, "'{value}'")?;
                    }
                }
            }
            write!(f, ")}}")?;
        }
        writeln!(f, "]")?;
        write!(f, "Compound Predicates:[")?;
        for predicate in &self.compound_predicates {
            write!(f, "\n\t{{{predicate}}}")?;
        }
        writeln!(f, "]")?;
        writeln!(f, "ID:[{}]", self.unique_id())
    }
}

/// Incremental SHA-256 over length-framed components, so that adjacent
/// fields can never run together and alias another header's material.
struct DigestWriter {
    sha: Sha256,
}

impl DigestWriter {
    fn new() -> Self {
        Self { sha: Sha256::new() }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        self.sha.update((bytes.len() as u64).to_le_bytes());
        self.sha.update(bytes);
    }

    fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    fn finish(self) -> [u8; 32] {
        self.sha.finalize().into()
    }
}

#[derive(Serialize, Deserialize)]
struct HeaderRepr {
    provenance: SegmentProvenance,
    constrained_columns: Vec<SegmentColumn>,
    compound_predicates: Vec<String>,
    bit_key: BitKey,
    excluded_regions: Vec<SegmentColumn>,
}

impl From<HeaderRepr> for SegmentHeader {
    fn from(repr: HeaderRepr) -> Self {
        SegmentHeader::new(
            repr.provenance,
            repr.constrained_columns,
            repr.compound_predicates,
            repr.bit_key,
            repr.excluded_regions,
        )
    }
}

impl From<SegmentHeader> for HeaderRepr {
    fn from(header: SegmentHeader) -> Self {
        HeaderRepr {
            provenance: header.provenance,
            constrained_columns: header.constrained_columns,
            compound_predicates: header.compound_predicates,
            bit_key: header.bit_key,
            excluded_regions: header.excluded_regions,
        }
    }
}

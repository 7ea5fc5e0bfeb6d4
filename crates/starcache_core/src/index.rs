//! The in-memory segment header index.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::thread::{self, ThreadId};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{error, trace};

use starcache_model::{BitKey, CellValue, SegmentColumn, SegmentHeader, SegmentProvenance};

use crate::error::{CoreError, CoreResult};
use crate::poset::BitKeyPoset;

/// A request for a single cell, addressed by provenance, dimensionality,
/// and one coordinate per constrained column.
#[derive(Debug, Clone)]
pub struct CellRequest {
    /// Provenance of the requested cell.
    pub provenance: SegmentProvenance,
    /// Dimensionality of the request.
    pub bit_key: BitKey,
    /// Requested coordinate per column expression.
    pub coords: BTreeMap<String, CellValue>,
    /// Compound predicates the serving segment must carry, verbatim.
    pub compound_predicates: Vec<String>,
}

/// Data structure that identifies which segments contain cells.
///
/// The index knows every header this node has seen - with a local body,
/// or known only to exist in an external cache. It is owned by the cache
/// manager's thread: every operation verifies it runs on that thread and
/// fails with an invariant violation otherwise. It answers three query
/// families: [`locate`](Self::locate) (exact dimensionality),
/// [`intersect_region`](Self::intersect_region) (flush targeting), and
/// [`find_rollup_candidates`](Self::find_rollup_candidates) (reuse across
/// dimensionalities).
pub struct SegmentCacheIndex {
    owner: ThreadId,
    bitkey_map: HashMap<(SegmentProvenance, BitKey), Vec<SegmentHeader>>,
    fact_map: HashMap<SegmentProvenance, FactInfo>,
    // Insertion-ordered roster of everything indexed; the eviction
    // victim is drawn from here so the policy acts on real entries.
    roster: Vec<SegmentHeader>,
    max_headers: Option<usize>,
    rng: StdRng,
}

#[derive(Default)]
struct FactInfo {
    headers: Vec<SegmentHeader>,
    poset: BitKeyPoset,
}

impl SegmentCacheIndex {
    /// Creates an index owned by the calling thread.
    ///
    /// `max_headers` bounds the number of indexed headers; on overflow a
    /// random entry is evicted, drawn from an RNG seeded with
    /// `eviction_seed` so the policy is reproducible.
    #[must_use]
    pub fn new(max_headers: Option<usize>, eviction_seed: u64) -> Self {
        Self {
            owner: thread::current().id(),
            bitkey_map: HashMap::new(),
            fact_map: HashMap::new(),
            roster: Vec::new(),
            max_headers,
            rng: StdRng::seed_from_u64(eviction_seed),
        }
    }

    fn check_thread(&self, operation: &str) -> CoreResult<()> {
        let current = thread::current().id();
        if current == self.owner {
            return Ok(());
        }
        let message = format!(
            "index {operation} from thread {current:?}, owner is {:?}",
            self.owner
        );
        error!("{message}");
        Err(CoreError::invariant_violation(message))
    }

    /// Number of indexed headers.
    pub fn len(&self) -> CoreResult<usize> {
        self.check_thread("len")?;
        Ok(self.roster.len())
    }

    /// Returns whether the index is empty.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Adds a header to the index. Returns false when the header was
    /// already present.
    pub fn add(&mut self, header: SegmentHeader) -> CoreResult<bool> {
        self.check_thread("add")?;
        let bitkey_key = (header.provenance().clone(), header.bit_key().clone());
        let headers = self.bitkey_map.entry(bitkey_key).or_default();
        if headers.contains(&header) {
            return Ok(false);
        }
        headers.push(header.clone());

        let fact = self
            .fact_map
            .entry(header.provenance().clone())
            .or_default();
        fact.headers.push(header.clone());
        fact.poset.add(header.bit_key().clone());

        trace!(id = %header.unique_id(), "indexed segment header");
        self.roster.push(header);
        self.evict_if_needed();
        Ok(true)
    }

    /// Removes a header. Unknown headers are ignored.
    pub fn remove(&mut self, header: &SegmentHeader) -> CoreResult<()> {
        self.check_thread("remove")?;
        let Some(at) = self.roster.iter().position(|h| h == header) else {
            return Ok(());
        };
        self.roster.remove(at);

        if let Some(fact) = self.fact_map.get_mut(header.provenance()) {
            fact.headers.retain(|h| h != header);
            fact.poset.remove(header.bit_key());
            if fact.headers.is_empty() {
                self.fact_map.remove(header.provenance());
            }
        }

        let bitkey_key = (header.provenance().clone(), header.bit_key().clone());
        if let Some(headers) = self.bitkey_map.get_mut(&bitkey_key) {
            headers.retain(|h| h != header);
            if headers.is_empty() {
                self.bitkey_map.remove(&bitkey_key);
            }
        }
        trace!(id = %header.unique_id(), "dropped segment header");
        Ok(())
    }

    fn evict_if_needed(&mut self) {
        let Some(max) = self.max_headers else {
            return;
        };
        while self.roster.len() > max {
            let victim = self.roster[self.rng.gen_range(0..self.roster.len())].clone();
            trace!(id = %victim.unique_id(), "evicting segment header");
            // Same thread: the check cannot fail here.
            let _ = self.remove(&victim);
        }
    }

    /// Returns the headers of exactly the requested dimensionality whose
    /// predicates admit every coordinate of the request and whose
    /// compound predicates match verbatim.
    ///
    /// # Errors
    ///
    /// Requesting a coordinate for a column a candidate header does not
    /// constrain is a dimensionality mismatch and fails with an
    /// invariant violation.
    pub fn locate(&self, request: &CellRequest) -> CoreResult<Vec<SegmentHeader>> {
        self.check_thread("locate")?;
        let bitkey_key = (request.provenance.clone(), request.bit_key.clone());
        let Some(headers) = self.bitkey_map.get(&bitkey_key) else {
            return Ok(Vec::new());
        };
        let mut found = Vec::new();
        for header in headers {
            if self.matches(header, request)? {
                found.push(header.clone());
            }
        }
        Ok(found)
    }

    fn matches(&self, header: &SegmentHeader, request: &CellRequest) -> CoreResult<bool> {
        if header.compound_predicates() != request.compound_predicates {
            return Ok(false);
        }
        for (expr, value) in &request.coords {
            // A coordinate inside an excluded region was flushed away.
            if let Some(excluded) = header.excluded_region(expr) {
                match excluded.values() {
                    None => return Ok(false),
                    Some(values) if values.contains(value) => return Ok(false),
                    Some(_) => {}
                }
            }
            let Some(column) = header.constrained_column(expr) else {
                return Err(CoreError::invariant_violation(format!(
                    "segment axis for column '{expr}' not found"
                )));
            };
            if let Some(values) = column.values() {
                if !values.contains(value) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Returns every header of the fact group whose constrained columns
    /// overlap `region`.
    ///
    /// A header that does not constrain a region column implicitly
    /// intersects, which is what lets a flush target every segment of a
    /// measure. A wildcard on either side intersects; otherwise the two
    /// value sets must share at least one element. An empty region
    /// intersects everything.
    pub fn intersect_region(
        &self,
        provenance: &SegmentProvenance,
        region: &[SegmentColumn],
    ) -> CoreResult<Vec<SegmentHeader>> {
        self.check_thread("intersect_region")?;
        let Some(fact) = self.fact_map.get(provenance) else {
            return Ok(Vec::new());
        };
        Ok(fact
            .headers
            .iter()
            .filter(|header| intersects(header, region))
            .cloned()
            .collect())
    }

    /// Finds groups of headers a rollup could combine to serve a request
    /// whose dimensionality produced no exact match.
    ///
    /// Ancestor dimensionalities are probed smallest-first. A header
    /// qualifies alone when every column being aggregated away is
    /// wildcarded; headers that would need to be combined with siblings
    /// are recognized but not yet combined, so only singleton groups are
    /// returned.
    pub fn find_rollup_candidates(
        &self,
        request: &CellRequest,
    ) -> CoreResult<Vec<Vec<SegmentHeader>>> {
        self.check_thread("find_rollup_candidates")?;
        let Some(fact) = self.fact_map.get(&request.provenance) else {
            return Ok(Vec::new());
        };

        let mut groups = Vec::new();
        let mut partial_matches: Vec<&SegmentHeader> = Vec::new();
        for ancestor in fact.poset.ancestors(&request.bit_key) {
            let bitkey_key = (request.provenance.clone(), ancestor);
            let Some(headers) = self.bitkey_map.get(&bitkey_key) else {
                debug_assert!(false, "poset / bitkey map inconsistency");
                continue;
            };

            partial_matches.clear();
            'headers: for header in headers {
                let mut non_wildcard_count = 0;
                for column in header.constrained_columns() {
                    match request.coords.get(column.column_expression()) {
                        // Kept column: the requested coordinate must be
                        // in the range the segment covers.
                        Some(value) => {
                            if let Some(values) = column.values() {
                                if !values.contains(value) {
                                    continue 'headers;
                                }
                            }
                        }
                        // Aggregated away: must be wildcarded for the
                        // header to be sufficient on its own.
                        None => {
                            if column.values().is_some() {
                                non_wildcard_count += 1;
                            }
                        }
                    }
                }
                if non_wildcard_count == 0 {
                    groups.push(vec![header.clone()]);
                } else {
                    partial_matches.push(header);
                }
            }
            // Combining several partial matches into one covering group
            // is future work; they are recognized and dropped.
            partial_matches.clear();
        }
        Ok(groups)
    }

    /// Renders the description of every indexed header, in insertion
    /// order.
    pub fn dump(&self) -> CoreResult<String> {
        self.check_thread("dump")?;
        let mut out = String::new();
        for header in &self.roster {
            let _ = writeln!(out, "{header}");
        }
        Ok(out)
    }
}

fn intersects(header: &SegmentHeader, region: &[SegmentColumn]) -> bool {
    if region.is_empty() {
        return true;
    }
    for region_column in region {
        let Some(header_column) = header.constrained_column(region_column.column_expression())
        else {
            // The header does not constrain this column, so it covers
            // every value of it: implicit intersection.
            return true;
        };
        match (header_column.values(), region_column.values()) {
            (None, _) | (_, None) => return true,
            (Some(header_values), Some(region_values)) => {
                if region_values.iter().any(|v| header_values.contains(v)) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use starcache_model::{SchemaChecksum, ValueSet};
    use std::sync::Arc;

    fn provenance() -> SegmentProvenance {
        SegmentProvenance {
            schema_name: "FoodMart".into(),
            schema_checksum: SchemaChecksum::of("<schema/>"),
            cube_name: "Sales".into(),
            measure_name: "Unit Sales".into(),
            fact_table: "sales_fact".into(),
        }
    }

    fn values(names: &[&str]) -> ValueSet {
        names.iter().map(|n| CellValue::from(*n)).collect()
    }

    fn column(expr: &str, names: &[&str]) -> SegmentColumn {
        SegmentColumn::new(expr, Some(values(names)))
    }

    /// State in {CA, OR, WA}, gender wildcard, bits {0, 1}.
    fn state_gender_header() -> SegmentHeader {
        SegmentHeader::new(
            provenance(),
            vec![
                column("state", &["CA", "OR", "WA"]),
                SegmentColumn::wildcard("gender"),
            ],
            Vec::new(),
            BitKey::of([0, 1]),
            Vec::new(),
        )
    }

    fn request(coords: &[(&str, &str)], bits: BitKey) -> CellRequest {
        CellRequest {
            provenance: provenance(),
            bit_key: bits,
            coords: coords
                .iter()
                .map(|(e, v)| ((*e).to_owned(), CellValue::from(*v)))
                .collect(),
            compound_predicates: Vec::new(),
        }
    }

    #[test]
    fn locate_exact_hit() {
        let mut index = SegmentCacheIndex::new(None, 0);
        let header = state_gender_header();
        index.add(header.clone()).unwrap();

        let found = index
            .locate(&request(
                &[("state", "CA"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
            .unwrap();
        assert_eq!(found, vec![header]);
    }

    #[test]
    fn locate_miss_on_value() {
        let mut index = SegmentCacheIndex::new(None, 0);
        index.add(state_gender_header()).unwrap();

        let found = index
            .locate(&request(
                &[("state", "TX"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn locate_respects_compound_predicates() {
        let mut index = SegmentCacheIndex::new(None, 0);
        let header = SegmentHeader::new(
            provenance(),
            vec![column("state", &["CA"])],
            vec!["(a=1 AND b=2)".into()],
            BitKey::of([0]),
            Vec::new(),
        );
        index.add(header.clone()).unwrap();

        let mut req = request(&[("state", "CA")], BitKey::of([0]));
        assert!(index.locate(&req).unwrap().is_empty());
        req.compound_predicates = vec!["(a=1 AND b=2)".into()];
        assert_eq!(index.locate(&req).unwrap(), vec![header]);
    }

    #[test]
    fn locate_rejects_excluded_coordinates() {
        let mut index = SegmentCacheIndex::new(None, 0);
        let header = state_gender_header().with_excluded_region(column("state", &["CA"]));
        index.add(header).unwrap();

        let hit = index
            .locate(&request(
                &[("state", "OR"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
            .unwrap();
        assert_eq!(hit.len(), 1);

        let flushed = index
            .locate(&request(
                &[("state", "CA"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
            .unwrap();
        assert!(flushed.is_empty());
    }

    #[test]
    fn locate_unknown_column_is_invariant_violation() {
        let mut index = SegmentCacheIndex::new(None, 0);
        index.add(state_gender_header()).unwrap();

        let result = index.locate(&request(
            &[("state", "CA"), ("year", "1997")],
            BitKey::of([0, 1]),
        ));
        assert!(matches!(result, Err(CoreError::InvariantViolation { .. })));
    }

    #[test]
    fn intersect_region_wildcard_implicitly_intersects() {
        let mut index = SegmentCacheIndex::new(None, 0);
        let header = state_gender_header();
        index.add(header.clone()).unwrap();

        // Gender is wildcard in the header: intersects.
        let affected = index
            .intersect_region(&provenance(), &[column("gender", &["F"])])
            .unwrap();
        assert_eq!(affected, vec![header.clone()]);

        // The header does not constrain "year" at all: implicit
        // intersection, enabling global flushes.
        let affected = index
            .intersect_region(&provenance(), &[column("year", &["1997"])])
            .unwrap();
        assert_eq!(affected, vec![header.clone()]);

        // Disjoint value sets on a constrained column: no intersection.
        let affected = index
            .intersect_region(&provenance(), &[column("state", &["TX"])])
            .unwrap();
        assert!(affected.is_empty());

        // Empty region: everything in the fact group.
        let affected = index.intersect_region(&provenance(), &[]).unwrap();
        assert_eq!(affected, vec![header]);
    }

    #[test]
    fn rollup_candidates_ascend_the_poset() {
        let mut index = SegmentCacheIndex::new(None, 0);
        // 2-d segment with gender wildcarded: sufficient on its own for
        // a state-only request.
        let two_d = state_gender_header();
        index.add(two_d.clone()).unwrap();
        // 3-d segment, all extra columns wildcarded.
        let three_d = SegmentHeader::new(
            provenance(),
            vec![
                column("state", &["CA", "OR"]),
                SegmentColumn::wildcard("gender"),
                SegmentColumn::wildcard("year"),
            ],
            Vec::new(),
            BitKey::of([0, 1, 2]),
            Vec::new(),
        );
        index.add(three_d.clone()).unwrap();

        let groups = index
            .find_rollup_candidates(&request(&[("state", "CA")], BitKey::of([0])))
            .unwrap();
        // Smaller dimensionality probed first.
        assert_eq!(groups, vec![vec![two_d], vec![three_d]]);
    }

    #[test]
    fn rollup_candidates_skip_out_of_range_and_partial() {
        let mut index = SegmentCacheIndex::new(None, 0);
        index.add(state_gender_header()).unwrap();
        // Gender constrained: aggregating it away needs a sibling, so
        // this header is only a partial match.
        let partial = SegmentHeader::new(
            provenance(),
            vec![column("state", &["CA"]), column("gender", &["F"])],
            Vec::new(),
            BitKey::of([0, 1]),
            Vec::new(),
        );
        index.add(partial).unwrap();

        let groups = index
            .find_rollup_candidates(&request(&[("state", "TX")], BitKey::of([0])))
            .unwrap();
        assert!(groups.is_empty());

        let groups = index
            .find_rollup_candidates(&request(&[("state", "CA")], BitKey::of([0])))
            .unwrap();
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn add_is_idempotent_and_remove_cleans_up() {
        let mut index = SegmentCacheIndex::new(None, 0);
        let header = state_gender_header();
        assert!(index.add(header.clone()).unwrap());
        assert!(!index.add(header.clone()).unwrap());
        assert_eq!(index.len().unwrap(), 1);

        index.remove(&header).unwrap();
        assert!(index.is_empty().unwrap());
        let found = index
            .locate(&request(
                &[("state", "CA"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn eviction_is_bounded_and_deterministic() {
        let run = |seed: u64| -> Vec<String> {
            let mut index = SegmentCacheIndex::new(Some(4), seed);
            for i in 0..10 {
                let header = SegmentHeader::new(
                    provenance(),
                    vec![column("state", &[&format!("S{i}")])],
                    Vec::new(),
                    BitKey::of([0]),
                    Vec::new(),
                );
                index.add(header).unwrap();
            }
            index
                .roster
                .iter()
                .map(|h| h.unique_id().to_string())
                .collect()
        };
        assert_eq!(run(42).len(), 4);
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn off_thread_access_is_an_invariant_violation() {
        let index = Arc::new(Mutex::new(SegmentCacheIndex::new(None, 0)));
        index.lock().add(state_gender_header()).unwrap();

        let remote = Arc::clone(&index);
        let result = std::thread::spawn(move || {
            remote.lock().locate(&request(
                &[("state", "CA"), ("gender", "F")],
                BitKey::of([0, 1]),
            ))
        })
        .join()
        .unwrap();
        assert!(matches!(result, Err(CoreError::InvariantViolation { .. })));
    }
}

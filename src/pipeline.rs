use crate::error::{MapperError, Result};
use crate::warehouse::CountyResponseRow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

/// One survey record as it arrives from the source table. Only the postal
/// code matters for mapping; records without one cannot be joined to a
/// county and are dropped.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub zip_code: Option<String>,
}

impl RawRecord {
    pub fn new(zip_code: impl Into<String>) -> Self {
        Self {
            zip_code: Some(zip_code.into()),
        }
    }

    pub fn without_zip() -> Self {
        Self { zip_code: None }
    }
}

/// Whether the rendered map covers the whole country or can tighten its
/// viewport to a single state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapView {
    National,
    SingleState(String),
}

/// Per-county log-scaled response values plus the global color range.
/// Keys are always 5-character zero-padded FIPS codes.
#[derive(Debug, Clone)]
pub struct NormalizedAggregate {
    log_responses: BTreeMap<String, f64>,
    range_min: f64,
    range_max: f64,
}

/// Left-pads a numeric county identifier to the canonical 5-character FIPS
/// form, so `"1001"` becomes `"01001"` and a leading zero is never lost.
/// A no-op on identifiers that are already 5 characters.
pub fn pad_fips(raw: &str) -> String {
    format!("{:0>5}", raw.trim())
}

/// Canonicalizes a postal code to 5 zero-padded characters. Null or empty
/// codes yield `None`; such records are excluded before aggregation.
pub fn canonicalize_zip(zip: Option<&str>) -> Option<String> {
    let zip = zip?.trim();
    if zip.is_empty() {
        return None;
    }
    Some(format!("{:0>5}", zip))
}

/// Groups records by county and counts them, joining each record's
/// canonicalized postal code against the zip-to-county lookup. Unmapped
/// zips contribute nothing. The result is a pure function of the record
/// multiset: grouping is order-independent and keys are unique.
pub fn aggregate(
    records: &[RawRecord],
    zip_to_county: &HashMap<String, String>,
) -> BTreeMap<String, u64> {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for record in records {
        let Some(zip) = canonicalize_zip(record.zip_code.as_deref()) else {
            continue;
        };
        let Some(county) = zip_to_county.get(&zip) else {
            debug!("Zip {} has no county mapping, skipping record", zip);
            continue;
        };
        *counts.entry(pad_fips(county)).or_insert(0) += 1;
    }
    counts
}

impl NormalizedAggregate {
    /// Applies the log10 transform to per-county counts and computes the
    /// global color range. The vast majority of counties have very few
    /// respondents, so the raw counts make a useless color scale.
    pub fn from_counts(counts: &BTreeMap<String, u64>) -> Result<Self> {
        let mut log_responses = BTreeMap::new();
        for (county, &count) in counts {
            if count == 0 {
                // Counties only materialize with at least one record, so a
                // zero here means an upstream contract breach.
                return Err(MapperError::ZeroCountInvariant(county.clone()));
            }
            log_responses.insert(pad_fips(county), (count as f64).log10());
        }

        if log_responses.is_empty() {
            return Err(MapperError::EmptyResult);
        }

        let range_min = log_responses
            .values()
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let range_max = log_responses
            .values()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);

        info!(
            counties = log_responses.len(),
            range_min, range_max, "Normalized county aggregates"
        );

        Ok(Self {
            log_responses,
            range_min,
            range_max,
        })
    }

    /// Builds the aggregate from rows the warehouse already grouped by
    /// county. FIPS codes arrive possibly un-padded and are canonicalized
    /// here.
    pub fn from_rows(rows: &[CountyResponseRow]) -> Result<Self> {
        let mut counts = BTreeMap::new();
        for row in rows {
            *counts.entry(pad_fips(&row.county_fips)).or_insert(0) += row.responses;
        }
        Self::from_counts(&counts)
    }

    pub fn log_responses(&self) -> &BTreeMap<String, f64> {
        &self.log_responses
    }

    /// Global `(min, max)` of the log values, for the color scale.
    pub fn range(&self) -> (f64, f64) {
        (self.range_min, self.range_max)
    }

    /// The distinct 2-character state prefixes across all counties.
    pub fn states(&self) -> BTreeSet<String> {
        self.log_responses
            .keys()
            .map(|county| county[0..2].to_string())
            .collect()
    }

    /// Single-region detection: if every county shares one state prefix the
    /// renderer can tighten the viewport to that state.
    pub fn map_view(&self) -> MapView {
        let states = self.states();
        if states.len() == 1 {
            let state = states.into_iter().next().unwrap();
            MapView::SingleState(state)
        } else {
            MapView::National
        }
    }
}

// Address Resolver - decomposes free-form Russian addresses into fixed fields
// Pipeline: normalize → classify extractor facts → regex fallback chain.
// Later stages never overwrite a field set by an earlier stage.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::extractor::{AddrExtractor, AddressFact};

// ============================================================================
// OUTPUT RECORD
// ============================================================================

/// The seven output slots of an AddressRecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressField {
    PostalCode,
    Region,
    District,
    Locality,
    Street,
    House,
    Flat,
}

/// AddressRecord - fully resolved address, immutable once returned
///
/// Every field is either a non-empty string or None. `raw` is None exactly
/// when the input address was absent/empty; in that case nothing else is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub raw: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub locality: Option<String>,
    pub street: Option<String>,
    pub house: Option<String>,
    pub flat: Option<String>,
}

impl AddressRecord {
    pub fn get(&self, field: AddressField) -> Option<&str> {
        match field {
            AddressField::PostalCode => self.postal_code.as_deref(),
            AddressField::Region => self.region.as_deref(),
            AddressField::District => self.district.as_deref(),
            AddressField::Locality => self.locality.as_deref(),
            AddressField::Street => self.street.as_deref(),
            AddressField::House => self.house.as_deref(),
            AddressField::Flat => self.flat.as_deref(),
        }
    }

    /// First-match-wins: sets the slot only if it is still empty and the
    /// value is non-empty. Returns whether the value was taken.
    fn set_if_empty(&mut self, field: AddressField, value: String) -> bool {
        let value = value.trim();
        if value.is_empty() || self.get(field).is_some() {
            return false;
        }
        let slot = match field {
            AddressField::PostalCode => &mut self.postal_code,
            AddressField::Region => &mut self.region,
            AddressField::District => &mut self.district,
            AddressField::Locality => &mut self.locality,
            AddressField::Street => &mut self.street,
            AddressField::House => &mut self.house,
            AddressField::Flat => &mut self.flat,
        };
        *slot = Some(value.to_string());
        true
    }
}

// ============================================================================
// CATEGORY → FIELD MAP
// ============================================================================

/// Extractor category labels (lower-case) and the slot each one fills.
/// Many-to-one on purpose: every street-like unit lands in `street`, every
/// settlement-like unit in `locality`. Labels absent from this table
/// ("страна", "корпус", "строение", "офис") bind to no slot and are dropped.
const CATEGORY_FIELD_MAP: &[(&str, AddressField)] = &[
    ("индекс", AddressField::PostalCode),
    ("регион", AddressField::Region),
    ("область", AddressField::Region),
    ("край", AddressField::Region),
    ("республика", AddressField::Region),
    ("район", AddressField::District),
    ("р-н", AddressField::District),
    ("город", AddressField::Locality),
    ("населенный пункт", AddressField::Locality),
    ("поселок", AddressField::Locality),
    ("деревня", AddressField::Locality),
    ("село", AddressField::Locality),
    ("станица", AddressField::Locality),
    ("ст.", AddressField::Locality),
    ("улица", AddressField::Street),
    ("проспект", AddressField::Street),
    ("микрорайон", AddressField::Street),
    ("переулок", AddressField::Street),
    ("шоссе", AddressField::Street),
    ("площадь", AddressField::Street),
    ("дом", AddressField::House),
    ("квартира", AddressField::Flat),
];

/// Look up the output slot for an extractor category label.
pub fn field_for_category(category: &str) -> Option<AddressField> {
    let category = category.trim().to_lowercase();
    CATEGORY_FIELD_MAP
        .iter()
        .find(|(label, _)| *label == category)
        .map(|(_, field)| *field)
}

// ============================================================================
// NORMALIZATION
// ============================================================================

static GOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bгор\.\s*").unwrap());
static RN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bр-н\b").unwrap());
static RON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bр-он\b").unwrap());

/// Canonicalize informal abbreviations before extraction: "гор." becomes the
/// standard "г. ", "р-н"/"р-он" become the full word "район". The extractor
/// and the fallback patterns are tuned to the standard forms.
pub fn normalize(address: &str) -> String {
    let address = GOR_RE.replace_all(address, "г. ");
    let address = RN_RE.replace_all(&address, "район");
    RON_RE.replace_all(&address, "район").into_owned()
}

// ============================================================================
// FALLBACK PATTERNS
// ============================================================================

// Zone-as-street: microdistrict first, territory second, first match wins.
static MKR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)мкр\.?\s*\d+[а-яА-Я]?").unwrap());
static TER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)тер\.?\s*[^,]+").unwrap());

static DISTRICT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([А-Яа-яё\-]+)\s+район").unwrap());

// Candidate spans captured after a region/district anchor are rejected when
// they carry a marker of some other field.
static REJECT_AFTER_REGION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(район|р-н|ул\.|улица|мкр\.|микрорайон|просп\.|пер\.|шоссе|пл\.|дом|д\.)")
        .unwrap()
});
// After a district anchor the filter keeps street-family markers only:
// "д. Сырково" right after a district is a village, not a house.
static REJECT_AFTER_DISTRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(ул\.|улица|мкр\.|микрорайон|просп\.|пер\.|шоссе|пл\.)").unwrap()
});

static RP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"р\.п\.?\s*([А-Яа-яё\- ]+?)(?:,|ул\.|улица|$)").unwrap());
static ST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ст\.?\s*([А-Яа-яё\- ]+?)(?:,|ул\.|улица|$)").unwrap());

/// Capture the comma-delimited span right after `anchor` in `text`.
fn capture_after(anchor: &str, text: &str) -> Option<String> {
    let pattern = format!(r"{},\s*([^,]+)", regex::escape(anchor));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

// ============================================================================
// LOCALITY FALLBACK CHAIN - ordered rules, stop at first acceptance
// ============================================================================

type LocalityRule = fn(&AddressRecord, &str) -> Option<String>;

fn locality_after_region(record: &AddressRecord, address: &str) -> Option<String> {
    let region = record.region.as_deref()?;
    let candidate = capture_after(region, address)?;
    if REJECT_AFTER_REGION.is_match(&candidate) {
        return None;
    }
    Some(candidate)
}

fn locality_after_district(record: &AddressRecord, address: &str) -> Option<String> {
    let district = record.district.as_deref()?;
    let candidate = capture_after(district, address)?;
    if REJECT_AFTER_DISTRICT.is_match(&candidate) {
        return None;
    }
    Some(candidate)
}

fn locality_workers_settlement(_record: &AddressRecord, address: &str) -> Option<String> {
    let caps = RP_RE.captures(address)?;
    Some(format!("р.п. {}", caps.get(1)?.as_str().trim()))
}

fn locality_stanitsa(_record: &AddressRecord, address: &str) -> Option<String> {
    let caps = ST_RE.captures(address)?;
    Some(format!("ст. {}", caps.get(1)?.as_str().trim()))
}

const LOCALITY_RULES: &[LocalityRule] = &[
    locality_after_region,
    locality_after_district,
    locality_workers_settlement,
    locality_stanitsa,
];

// ============================================================================
// RESOLVER
// ============================================================================

/// AddressResolver - single entry point for the surrounding ETL
///
/// Stateless across calls; generic over the extractor so tests can drive the
/// pipeline with a deterministic stub. The only error it can return is an
/// extractor failure, propagated unchanged; every other path terminates in
/// a well-formed record, worst case all-None except `raw`.
pub struct AddressResolver<E: AddrExtractor> {
    extractor: E,
}

impl<E: AddrExtractor> AddressResolver<E> {
    pub fn new(extractor: E) -> Self {
        AddressResolver { extractor }
    }

    pub fn resolve(&self, address: Option<&str>) -> Result<AddressRecord> {
        let Some(address) = address.filter(|a| !a.is_empty()) else {
            return Ok(AddressRecord::default());
        };

        let address = normalize(address);
        let mut record = AddressRecord {
            raw: Some(address.clone()),
            ..AddressRecord::default()
        };

        let facts = self.extractor.extract(&address)?;
        classify_facts(&mut record, &facts);
        apply_zone_as_street(&mut record, &address);
        apply_district_fallback(&mut record, &address);
        apply_locality_chain(&mut record, &address);

        Ok(record)
    }
}

/// Stage 2: map extractor facts onto slots, first qualifying fact per slot
/// wins, later facts for a filled slot are discarded.
fn classify_facts(record: &mut AddressRecord, facts: &[AddressFact]) {
    for fact in facts {
        let Some(category) = fact.category.as_deref() else {
            continue;
        };
        let Some(field) = field_for_category(category) else {
            continue;
        };
        let value = match field {
            // Keep which kind of administrative unit it is:
            // "Тверская область", not bare "Тверская".
            AddressField::Region | AddressField::District => {
                format!("{} {}", fact.value, category).trim().to_string()
            }
            _ => fact.value.clone(),
        };
        record.set_if_empty(field, value);
    }
}

/// Stage 3: microdistrict/territory designations fill the street slot when
/// no formal street was recognized.
fn apply_zone_as_street(record: &mut AddressRecord, address: &str) {
    if record.street.is_some() {
        return;
    }
    if let Some(m) = MKR_RE.find(address) {
        record.set_if_empty(AddressField::Street, m.as_str().trim().to_string());
        return;
    }
    if let Some(m) = TER_RE.find(address) {
        record.set_if_empty(AddressField::Street, m.as_str().trim().to_string());
    }
}

/// Stage 4: "<Имя> район" anywhere in the text.
fn apply_district_fallback(record: &mut AddressRecord, address: &str) {
    if record.district.is_some() {
        return;
    }
    if let Some(caps) = DISTRICT_RE.captures(address) {
        let name = caps[1].trim().to_string();
        record.set_if_empty(AddressField::District, format!("{name} район"));
    }
}

/// Stages 5-6: the locality rule chain, evaluated lazily in order.
fn apply_locality_chain(record: &mut AddressRecord, address: &str) {
    if record.locality.is_some() {
        return;
    }
    for rule in LOCALITY_RULES {
        if let Some(value) = rule(record, address) {
            record.set_if_empty(AddressField::Locality, value);
            return;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

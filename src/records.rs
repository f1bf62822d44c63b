// Message Records - typed shape of the Fedresurs extrajudicial export
// Raw serde structs mirror the XML tree; shaped records carry the resolved
// debtor address and lenient numeric sums.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::extractor::AddrExtractor;
use crate::resolver::{AddressRecord, AddressResolver};

// ============================================================================
// RAW XML TREE (deserialization only)
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawExport {
    #[serde(rename = "ExtrajudicialBankruptcyMessage", default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "Id")]
    id: Option<String>,
    #[serde(rename = "Number")]
    number: Option<String>,
    #[serde(rename = "Type")]
    message_type: Option<String>,
    #[serde(rename = "PublishDate")]
    publish_date: Option<String>,
    #[serde(rename = "FinishReason")]
    finish_reason: Option<String>,
    #[serde(rename = "Debtor")]
    debtor: Option<RawDebtor>,
    #[serde(rename = "Publisher")]
    publisher: Option<RawPublisher>,
    #[serde(rename = "Banks")]
    banks: Option<RawBanks>,
    #[serde(rename = "CreditorsFromEntrepreneurship")]
    creditors_from_entrepreneurship: Option<RawCreditorsFrom>,
    #[serde(rename = "CreditorsNonFromEntrepreneurship")]
    creditors_non_from_entrepreneurship: Option<RawCreditorsNonFrom>,
}

#[derive(Debug, Deserialize)]
struct RawDebtor {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "BirthDate")]
    birth_date: Option<String>,
    #[serde(rename = "BirthPlace")]
    birth_place: Option<String>,
    #[serde(rename = "Address")]
    address: Option<String>,
    #[serde(rename = "Inn")]
    inn: Option<String>,
    #[serde(rename = "NameHistory")]
    name_history: Option<RawNameHistory>,
}

#[derive(Debug, Deserialize)]
struct RawNameHistory {
    #[serde(rename = "PreviousName", default)]
    previous_names: Vec<RawPreviousName>,
}

#[derive(Debug, Deserialize)]
struct RawPreviousName {
    #[serde(rename = "Value")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPublisher {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Inn")]
    inn: Option<String>,
    #[serde(rename = "Ogrn")]
    ogrn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBanks {
    #[serde(rename = "Bank", default)]
    banks: Vec<RawBank>,
}

#[derive(Debug, Deserialize)]
struct RawBank {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Bik")]
    bik: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawObligatoryPayments {
    #[serde(rename = "ObligatoryPayment", default)]
    payments: Vec<RawObligatoryPayment>,
}

#[derive(Debug, Deserialize)]
struct RawObligatoryPayment {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "Sum")]
    sum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMonetaryObligations {
    #[serde(rename = "MonetaryObligation", default)]
    obligations: Vec<RawMonetaryObligation>,
}

#[derive(Debug, Deserialize)]
struct RawMonetaryObligation {
    #[serde(rename = "CreditorName")]
    creditor_name: Option<String>,
    #[serde(rename = "Content")]
    content: Option<String>,
    #[serde(rename = "Basis")]
    basis: Option<String>,
    #[serde(rename = "TotalSum")]
    total_sum: Option<String>,
    #[serde(rename = "DebtSum")]
    debt_sum: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCreditorsFrom {
    #[serde(rename = "ObligatoryPayments")]
    obligatory_payments: Option<RawObligatoryPayments>,
}

#[derive(Debug, Deserialize)]
struct RawCreditorsNonFrom {
    #[serde(rename = "ObligatoryPayments")]
    obligatory_payments: Option<RawObligatoryPayments>,
    #[serde(rename = "MonetaryObligations")]
    monetary_obligations: Option<RawMonetaryObligations>,
}

// ============================================================================
// SHAPED RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub name: Option<String>,
    pub inn: Option<String>,
    pub ogrn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankInfo {
    pub name: Option<String>,
    pub bik: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObligatoryPayment {
    pub name: Option<String>,
    pub payment_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonetaryObligation {
    pub creditor_name: Option<String>,
    pub content: Option<String>,
    pub basis: Option<String>,
    pub total_sum: f64,
    pub debt_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreditorsFromEntrepreneurship {
    pub obligatory_payments: Vec<ObligatoryPayment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreditorsNonFromEntrepreneurship {
    pub obligatory_payments: Vec<ObligatoryPayment>,
    pub monetary_obligations: Vec<MonetaryObligation>,
}

/// Debtor with the original address text plus the resolved fixed fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debtor {
    pub name: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub address: Option<String>,
    pub inn: Option<String>,
    pub previous_names: Vec<String>,
    pub parsed_address: AddressRecord,
}

impl Debtor {
    /// Natural-key hash for deduplication (name + birth date + INN).
    pub fn dedup_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}",
            self.name.as_deref().unwrap_or(""),
            self.birth_date.as_deref().unwrap_or(""),
            self.inn.as_deref().unwrap_or(""),
        ));
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtrajudicialBankruptcyMessage {
    pub id: Option<String>,
    pub number: Option<String>,
    pub message_type: Option<String>,
    pub publish_date: Option<String>,
    pub finish_reason: Option<String>,
    pub debtor: Option<Debtor>,
    pub publisher: Option<Publisher>,
    pub banks: Vec<BankInfo>,
    pub creditors_from_entrepreneurship: Option<CreditorsFromEntrepreneurship>,
    pub creditors_non_from_entrepreneurship: Option<CreditorsNonFromEntrepreneurship>,
}

impl ExtrajudicialBankruptcyMessage {
    /// Total outstanding debt across monetary obligations.
    pub fn total_debt(&self) -> f64 {
        self.creditors_non_from_entrepreneurship
            .as_ref()
            .map(|c| c.monetary_obligations.iter().map(|m| m.debt_sum).sum())
            .unwrap_or(0.0)
    }
}

// ============================================================================
// SHAPING
// ============================================================================

/// Sums parse leniently: absent or malformed text degrades to 0.0 instead of
/// failing the whole import.
fn parse_sum(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.trim().parse::<f64>().ok()).unwrap_or(0.0)
}

fn shape_payments(raw: Option<RawObligatoryPayments>) -> Vec<ObligatoryPayment> {
    raw.map(|p| p.payments)
        .unwrap_or_default()
        .into_iter()
        .map(|p| ObligatoryPayment {
            payment_sum: parse_sum(p.sum.as_deref()),
            name: p.name,
        })
        .collect()
}

fn shape_obligations(raw: Option<RawMonetaryObligations>) -> Vec<MonetaryObligation> {
    raw.map(|o| o.obligations)
        .unwrap_or_default()
        .into_iter()
        .map(|o| MonetaryObligation {
            total_sum: parse_sum(o.total_sum.as_deref()),
            debt_sum: parse_sum(o.debt_sum.as_deref()),
            creditor_name: o.creditor_name,
            content: o.content,
            basis: o.basis,
        })
        .collect()
}

impl RawMessage {
    fn shape<E: AddrExtractor>(
        self,
        resolver: &AddressResolver<E>,
    ) -> Result<ExtrajudicialBankruptcyMessage> {
        let debtor = match self.debtor {
            Some(raw) => {
                let parsed_address = resolver.resolve(raw.address.as_deref())?;
                Some(Debtor {
                    name: raw.name,
                    birth_date: raw.birth_date,
                    birth_place: raw.birth_place,
                    address: raw.address,
                    inn: raw.inn,
                    previous_names: raw
                        .name_history
                        .map(|h| h.previous_names)
                        .unwrap_or_default()
                        .into_iter()
                        .filter_map(|p| p.value)
                        .collect(),
                    parsed_address,
                })
            }
            None => None,
        };

        Ok(ExtrajudicialBankruptcyMessage {
            id: self.id,
            number: self.number,
            message_type: self.message_type,
            publish_date: self.publish_date,
            finish_reason: self.finish_reason,
            debtor,
            publisher: self.publisher.map(|p| Publisher {
                name: p.name,
                inn: p.inn,
                ogrn: p.ogrn,
            }),
            banks: self
                .banks
                .map(|b| b.banks)
                .unwrap_or_default()
                .into_iter()
                .map(|b| BankInfo {
                    name: b.name,
                    bik: b.bik,
                })
                .collect(),
            creditors_from_entrepreneurship: self.creditors_from_entrepreneurship.map(|c| {
                CreditorsFromEntrepreneurship {
                    obligatory_payments: shape_payments(c.obligatory_payments),
                }
            }),
            creditors_non_from_entrepreneurship: self.creditors_non_from_entrepreneurship.map(
                |c| CreditorsNonFromEntrepreneurship {
                    obligatory_payments: shape_payments(c.obligatory_payments),
                    monetary_obligations: shape_obligations(c.monetary_obligations),
                },
            ),
        })
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Parse an export document from a string (tests and small inputs).
pub fn parse_messages_str<E: AddrExtractor>(
    xml: &str,
    resolver: &AddressResolver<E>,
) -> Result<Vec<ExtrajudicialBankruptcyMessage>> {
    let export: RawExport =
        quick_xml::de::from_str(xml).context("Failed to parse export XML")?;
    export
        .messages
        .into_iter()
        .map(|m| m.shape(resolver))
        .collect()
}

/// Parse an export file, transparently decompressing `.gz` archives, and
/// resolve every debtor address.
pub fn parse_messages<E: AddrExtractor>(
    path: &Path,
    resolver: &AddressResolver<E>,
) -> Result<Vec<ExtrajudicialBankruptcyMessage>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open export file: {}", path.display()))?;

    let export: RawExport = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        quick_xml::de::from_reader(BufReader::new(GzDecoder::new(file)))
    } else {
        quick_xml::de::from_reader(BufReader::new(file))
    }
    .with_context(|| format!("Failed to parse export XML: {}", path.display()))?;

    export
        .messages
        .into_iter()
        .map(|m| m.shape(resolver))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

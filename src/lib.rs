// Bankrot ETL - Core Library
// Parses the Fedresurs extrajudicial-bankruptcy XML export, resolves debtor
// addresses into fixed fields, and persists the result into SQLite.

pub mod db;
pub mod extractor;
pub mod records;
pub mod report;
pub mod resolver;

// Re-export commonly used types
pub use db::{
    insert_messages, region_stats, setup_database, to_sql_date, verify_count, ImportStats,
    RegionStat,
};
pub use extractor::{AddrExtractor, AddressFact, MarkerExtractor};
pub use records::{
    parse_messages, parse_messages_str, BankInfo, CreditorsFromEntrepreneurship,
    CreditorsNonFromEntrepreneurship, Debtor, ExtrajudicialBankruptcyMessage,
    MonetaryObligation, ObligatoryPayment, Publisher,
};
pub use report::{age_stats, build_report, print_report, write_region_csv, AgeBandStat, Report};
pub use resolver::{
    field_for_category, normalize, AddressField, AddressRecord, AddressResolver,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// SQLite persistence for bankruptcy messages
// Messages dedup by natural key (message id); debtors and publishers are
// get-or-insert keyed by a content hash, so re-importing a file is a no-op.

use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use crate::records::{Debtor, ExtrajudicialBankruptcyMessage, Publisher};

/// Outcome of a batch insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub inserted: usize,
    pub duplicates: usize,
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS debtors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dedup_hash TEXT UNIQUE NOT NULL,
            name TEXT,
            birth_date TEXT,
            birth_place TEXT,
            address TEXT,
            postal_code TEXT,
            region TEXT,
            district TEXT,
            locality TEXT,
            street TEXT,
            house TEXT,
            flat TEXT,
            inn TEXT,
            previous_names TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS publishers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            dedup_hash TEXT UNIQUE NOT NULL,
            name TEXT,
            inn TEXT,
            ogrn TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id TEXT UNIQUE NOT NULL,
            number TEXT,
            type TEXT,
            publish_date TEXT,
            finish_reason TEXT,
            debtor_id INTEGER REFERENCES debtors(id),
            publisher_id INTEGER REFERENCES publishers(id),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS banks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL REFERENCES messages(id),
            name TEXT,
            bik TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS obligatory_payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL REFERENCES messages(id),
            creditor_kind TEXT NOT NULL,
            name TEXT,
            payment_sum REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS monetary_obligations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL REFERENCES messages(id),
            creditor_name TEXT,
            content TEXT,
            basis TEXT,
            total_sum REAL NOT NULL,
            debt_sum REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_publish_date ON messages(publish_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_debtors_region ON debtors(region)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mo_message ON monetary_obligations(message_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// DATE NORMALIZATION
// ============================================================================

/// Normalize an XML timestamp to `YYYY-MM-DD`. Accepts RFC 3339 with or
/// without zone and bare dates; anything else degrades to None.
pub fn to_sql_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive().format("%Y-%m-%d").to_string());
    }
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

// ============================================================================
// INSERTS
// ============================================================================

/// The message natural key is its export id; a message without one gets a
/// content hash so re-imports still dedup.
fn natural_key(msg: &ExtrajudicialBankruptcyMessage) -> String {
    if let Some(id) = msg.id.as_deref() {
        return id.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}",
        msg.number.as_deref().unwrap_or(""),
        msg.publish_date.as_deref().unwrap_or(""),
        msg.debtor
            .as_ref()
            .and_then(|d| d.name.as_deref())
            .unwrap_or(""),
    ));
    format!("{:x}", hasher.finalize())
}

fn insert_debtor(conn: &Connection, debtor: &Debtor) -> Result<i64> {
    let hash = debtor.dedup_hash();
    let previous_names = serde_json::to_string(&debtor.previous_names)?;
    let parsed = &debtor.parsed_address;

    conn.execute(
        "INSERT OR IGNORE INTO debtors (
            dedup_hash, name, birth_date, birth_place, address,
            postal_code, region, district, locality, street, house, flat,
            inn, previous_names
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            hash,
            debtor.name,
            to_sql_date(debtor.birth_date.as_deref()),
            debtor.birth_place,
            debtor.address,
            parsed.postal_code,
            parsed.region,
            parsed.district,
            parsed.locality,
            parsed.street,
            parsed.house,
            parsed.flat,
            debtor.inn,
            previous_names,
        ],
    )?;

    let id = conn.query_row(
        "SELECT id FROM debtors WHERE dedup_hash = ?1",
        params![hash],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn insert_publisher(conn: &Connection, publisher: &Publisher) -> Result<i64> {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}",
        publisher.name.as_deref().unwrap_or(""),
        publisher.inn.as_deref().unwrap_or(""),
        publisher.ogrn.as_deref().unwrap_or(""),
    ));
    let hash = format!("{:x}", hasher.finalize());

    conn.execute(
        "INSERT OR IGNORE INTO publishers (dedup_hash, name, inn, ogrn)
         VALUES (?1, ?2, ?3, ?4)",
        params![hash, publisher.name, publisher.inn, publisher.ogrn],
    )?;

    let id = conn.query_row(
        "SELECT id FROM publishers WHERE dedup_hash = ?1",
        params![hash],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn insert_children(
    conn: &Connection,
    row_id: i64,
    msg: &ExtrajudicialBankruptcyMessage,
) -> Result<()> {
    for bank in &msg.banks {
        conn.execute(
            "INSERT INTO banks (message_id, name, bik) VALUES (?1, ?2, ?3)",
            params![row_id, bank.name, bank.bik],
        )?;
    }

    if let Some(creditors) = &msg.creditors_from_entrepreneurship {
        for payment in &creditors.obligatory_payments {
            conn.execute(
                "INSERT INTO obligatory_payments (message_id, creditor_kind, name, payment_sum)
                 VALUES (?1, 'entrepreneurship', ?2, ?3)",
                params![row_id, payment.name, payment.payment_sum],
            )?;
        }
    }

    if let Some(creditors) = &msg.creditors_non_from_entrepreneurship {
        for payment in &creditors.obligatory_payments {
            conn.execute(
                "INSERT INTO obligatory_payments (message_id, creditor_kind, name, payment_sum)
                 VALUES (?1, 'non_entrepreneurship', ?2, ?3)",
                params![row_id, payment.name, payment.payment_sum],
            )?;
        }
        for obligation in &creditors.monetary_obligations {
            conn.execute(
                "INSERT INTO monetary_obligations
                 (message_id, creditor_name, content, basis, total_sum, debt_sum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    row_id,
                    obligation.creditor_name,
                    obligation.content,
                    obligation.basis,
                    obligation.total_sum,
                    obligation.debt_sum,
                ],
            )?;
        }
    }

    Ok(())
}

/// Insert a batch of messages. A natural-key collision counts as a duplicate
/// and the message is skipped whole, child rows included.
pub fn insert_messages(
    conn: &Connection,
    messages: &[ExtrajudicialBankruptcyMessage],
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for msg in messages {
        let key = natural_key(msg);

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM messages WHERE message_id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            stats.duplicates += 1;
            continue;
        }

        let debtor_id = match &msg.debtor {
            Some(debtor) => Some(insert_debtor(conn, debtor)?),
            None => None,
        };
        let publisher_id = match &msg.publisher {
            Some(publisher) => Some(insert_publisher(conn, publisher)?),
            None => None,
        };

        let result = conn.execute(
            "INSERT INTO messages
             (message_id, number, type, publish_date, finish_reason, debtor_id, publisher_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                msg.number,
                msg.message_type,
                to_sql_date(msg.publish_date.as_deref()),
                msg.finish_reason,
                debtor_id,
                publisher_id,
            ],
        );

        match result {
            Ok(_) => {
                let row_id = conn.last_insert_rowid();
                insert_children(conn, row_id, msg)?;
                stats.inserted += 1;
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                stats.duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(stats)
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
    Ok(count)
}

/// One row of the region aggregate: message count and outstanding debt.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStat {
    pub region: String,
    pub messages: i64,
    pub debt_sum: f64,
}

pub fn region_stats(conn: &Connection) -> Result<Vec<RegionStat>> {
    let mut stmt = conn.prepare(
        "SELECT
            COALESCE(d.region, 'не определено') AS region,
            COUNT(*) AS messages,
            SUM(COALESCE(mo.debt, 0)) AS debt_sum
         FROM messages m
         LEFT JOIN debtors d ON d.id = m.debtor_id
         LEFT JOIN (
            SELECT message_id, SUM(debt_sum) AS debt
            FROM monetary_obligations
            GROUP BY message_id
         ) mo ON mo.message_id = m.id
         GROUP BY region
         ORDER BY messages DESC, region ASC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok(RegionStat {
            region: row.get(0)?,
            messages: row.get(1)?,
            debt_sum: row.get(2)?,
        })
    })?;

    let mut stats = Vec::new();
    for row in rows {
        stats.push(row?);
    }
    Ok(stats)
}

/// Debtor birth date plus total debt per message, for the age-band report.
pub fn birth_debt_rows(conn: &Connection) -> Result<Vec<(Option<String>, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT d.birth_date, COALESCE(mo.debt, 0)
         FROM messages m
         JOIN debtors d ON d.id = m.debtor_id
         LEFT JOIN (
            SELECT message_id, SUM(debt_sum) AS debt
            FROM monetary_obligations
            GROUP BY message_id
         ) mo ON mo.message_id = m.id",
    )?;

    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{BankInfo, CreditorsNonFromEntrepreneurship, MonetaryObligation};
    use crate::resolver::AddressRecord;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_message(id: &str, region: Option<&str>, debt: f64) -> ExtrajudicialBankruptcyMessage {
        ExtrajudicialBankruptcyMessage {
            id: Some(id.to_string()),
            number: Some("1".to_string()),
            message_type: Some("StartOfExtrajudicialBankruptcy".to_string()),
            publish_date: Some("2025-01-01T10:00:00Z".to_string()),
            finish_reason: None,
            debtor: Some(Debtor {
                name: Some(format!("Должник {id}")),
                birth_date: Some("1990-01-01".to_string()),
                birth_place: None,
                address: Some("г. Тверь".to_string()),
                inn: Some("690000000000".to_string()),
                previous_names: vec![],
                parsed_address: AddressRecord {
                    raw: Some("г. Тверь".to_string()),
                    locality: Some("Тверь".to_string()),
                    region: region.map(|r| r.to_string()),
                    ..AddressRecord::default()
                },
            }),
            publisher: None,
            banks: vec![BankInfo {
                name: Some("Банк А".to_string()),
                bik: Some("044525225".to_string()),
            }],
            creditors_from_entrepreneurship: None,
            creditors_non_from_entrepreneurship: Some(CreditorsNonFromEntrepreneurship {
                obligatory_payments: vec![],
                monetary_obligations: vec![MonetaryObligation {
                    creditor_name: Some("Банк А".to_string()),
                    content: None,
                    basis: None,
                    total_sum: debt * 2.0,
                    debt_sum: debt,
                }],
            }),
        }
    }

    #[test]
    fn test_insert_and_count() {
        let conn = test_conn();
        let batch = vec![
            sample_message("m1", Some("Тверская область"), 1000.0),
            sample_message("m2", Some("Тверская область"), 500.0),
        ];

        let stats = insert_messages(&conn, &batch).unwrap();
        assert_eq!(stats, ImportStats { inserted: 2, duplicates: 0 });
        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let conn = test_conn();
        let batch = vec![sample_message("m1", None, 1000.0)];

        insert_messages(&conn, &batch).unwrap();
        let stats = insert_messages(&conn, &batch).unwrap();

        assert_eq!(stats, ImportStats { inserted: 0, duplicates: 1 });
        assert_eq!(verify_count(&conn).unwrap(), 1);

        // child rows did not double up either
        let banks: i64 = conn
            .query_row("SELECT COUNT(*) FROM banks", [], |r| r.get(0))
            .unwrap();
        assert_eq!(banks, 1);
    }

    #[test]
    fn test_shared_debtor_row() {
        let conn = test_conn();
        let mut second = sample_message("m2", None, 500.0);
        // same natural key as the debtor of m1
        second.debtor.as_mut().unwrap().name = Some("Должник m1".to_string());

        insert_messages(&conn, &[sample_message("m1", None, 1000.0), second]).unwrap();

        let debtors: i64 = conn
            .query_row("SELECT COUNT(*) FROM debtors", [], |r| r.get(0))
            .unwrap();
        assert_eq!(debtors, 1);
        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_region_stats_aggregate() {
        let conn = test_conn();
        insert_messages(
            &conn,
            &[
                sample_message("m1", Some("Тверская область"), 1000.0),
                sample_message("m2", Some("Тверская область"), 500.0),
                sample_message("m3", None, 200.0),
            ],
        )
        .unwrap();

        let stats = region_stats(&conn).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].region, "Тверская область");
        assert_eq!(stats[0].messages, 2);
        assert_eq!(stats[0].debt_sum, 1500.0);
        assert_eq!(stats[1].region, "не определено");
        assert_eq!(stats[1].debt_sum, 200.0);
    }

    #[test]
    fn test_to_sql_date() {
        assert_eq!(
            to_sql_date(Some("2025-01-01T10:00:00Z")),
            Some("2025-01-01".to_string())
        );
        assert_eq!(
            to_sql_date(Some("2025-01-01T10:00:00+03:00")),
            Some("2025-01-01".to_string())
        );
        assert_eq!(
            to_sql_date(Some("2025-01-01")),
            Some("2025-01-01".to_string())
        );
        assert_eq!(to_sql_date(Some("вчера")), None);
        assert_eq!(to_sql_date(Some("")), None);
        assert_eq!(to_sql_date(None), None);
    }
}

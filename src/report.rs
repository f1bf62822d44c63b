// Reporting - aggregated figures over the imported messages
// Region totals come straight from SQL; age bands are computed here from
// normalized birth dates.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use std::path::Path;

use crate::db::{birth_debt_rows, region_stats, RegionStat};

// ============================================================================
// AGE BANDS
// ============================================================================

const AGE_BANDS: &[&str] = &["до 25", "25-34", "35-44", "45-54", "55-64", "65+"];

#[derive(Debug, Clone, PartialEq)]
pub struct AgeBandStat {
    pub band: &'static str,
    pub debtors: i64,
    pub debt_sum: f64,
}

impl AgeBandStat {
    pub fn avg_debt(&self) -> f64 {
        if self.debtors == 0 {
            0.0
        } else {
            self.debt_sum / self.debtors as f64
        }
    }
}

fn age_band(age: u32) -> &'static str {
    match age {
        0..=24 => AGE_BANDS[0],
        25..=34 => AGE_BANDS[1],
        35..=44 => AGE_BANDS[2],
        45..=54 => AGE_BANDS[3],
        55..=64 => AGE_BANDS[4],
        _ => AGE_BANDS[5],
    }
}

/// Bucket debtors by age at `today`. Rows without a parseable birth date are
/// left out of the aggregate.
pub fn age_stats(rows: &[(Option<String>, f64)], today: NaiveDate) -> Vec<AgeBandStat> {
    let mut stats: Vec<AgeBandStat> = AGE_BANDS
        .iter()
        .map(|band| AgeBandStat {
            band,
            debtors: 0,
            debt_sum: 0.0,
        })
        .collect();

    for (birth_date, debt) in rows {
        let Some(birth) = birth_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            continue;
        };
        let Some(age) = today.years_since(birth) else {
            continue;
        };
        let band = age_band(age);
        if let Some(stat) = stats.iter_mut().find(|s| s.band == band) {
            stat.debtors += 1;
            stat.debt_sum += debt;
        }
    }

    stats.retain(|s| s.debtors > 0);
    stats
}

// ============================================================================
// REPORT ASSEMBLY
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub regions: Vec<RegionStat>,
    pub age_bands: Vec<AgeBandStat>,
}

pub fn build_report(conn: &Connection) -> Result<Report> {
    let regions = region_stats(conn)?;
    let rows = birth_debt_rows(conn)?;
    let age_bands = age_stats(&rows, Utc::now().date_naive());
    Ok(Report { regions, age_bands })
}

pub fn print_report(report: &Report) {
    println!("Сообщения по регионам");
    println!("{:<40} {:>10} {:>16}", "регион", "сообщений", "долг, руб.");
    for stat in &report.regions {
        println!(
            "{:<40} {:>10} {:>16.2}",
            stat.region, stat.messages, stat.debt_sum
        );
    }

    println!();
    println!("Долг по возрастным группам");
    println!(
        "{:<10} {:>10} {:>16} {:>16}",
        "возраст", "должников", "долг, руб.", "средний долг"
    );
    for stat in &report.age_bands {
        println!(
            "{:<10} {:>10} {:>16.2} {:>16.2}",
            stat.band,
            stat.debtors,
            stat.debt_sum,
            stat.avg_debt()
        );
    }
}

/// Export the region aggregate as CSV.
pub fn write_region_csv(report: &Report, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;

    writer.write_record(["region", "messages", "debt_sum"])?;
    for stat in &report.regions {
        let messages = stat.messages.to_string();
        let debt_sum = format!("{:.2}", stat.debt_sum);
        writer.write_record([stat.region.as_str(), messages.as_str(), debt_sum.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(birth: &str, debt: f64) -> (Option<String>, f64) {
        (Some(birth.to_string()), debt)
    }

    #[test]
    fn test_age_band_boundaries() {
        assert_eq!(age_band(24), "до 25");
        assert_eq!(age_band(25), "25-34");
        assert_eq!(age_band(34), "25-34");
        assert_eq!(age_band(35), "35-44");
        assert_eq!(age_band(64), "55-64");
        assert_eq!(age_band(65), "65+");
        assert_eq!(age_band(90), "65+");
    }

    #[test]
    fn test_age_stats_buckets_and_sums() {
        let today = date("2025-06-01");
        let rows = vec![
            row("1990-01-01", 1000.0), // 35
            row("1992-12-31", 500.0),  // 32
            row("1991-06-02", 200.0),  // 33, birthday not reached
        ];

        let stats = age_stats(&rows, today);
        assert_eq!(stats.len(), 2);

        let mid = stats.iter().find(|s| s.band == "25-34").unwrap();
        assert_eq!(mid.debtors, 2);
        assert_eq!(mid.debt_sum, 700.0);
        assert_eq!(mid.avg_debt(), 350.0);

        let older = stats.iter().find(|s| s.band == "35-44").unwrap();
        assert_eq!(older.debtors, 1);
        assert_eq!(older.debt_sum, 1000.0);
    }

    #[test]
    fn test_unparseable_birth_dates_are_skipped() {
        let today = date("2025-06-01");
        let rows = vec![
            (None, 100.0),
            (Some("не дата".to_string()), 100.0),
            row("2005-01-01", 300.0),
        ];

        let stats = age_stats(&rows, today);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].band, "до 25");
        assert_eq!(stats[0].debt_sum, 300.0);
    }

    #[test]
    fn test_future_birth_date_is_skipped() {
        let today = date("2025-06-01");
        let stats = age_stats(&[row("2030-01-01", 100.0)], today);
        assert!(stats.is_empty());
    }
}

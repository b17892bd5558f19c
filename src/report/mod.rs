//! Final report generation and result merge-back
//!
//! Three artifacts per run: a consolidated results CSV, a deduplicated
//! plain-text email list, and a JSON summary with method effectiveness and
//! top email domains. `merge_into_records` is the file-update contract: a
//! pure function from original rows plus results to augmented rows, so
//! re-running it with identical inputs yields identical output.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::company::{field_value, NAME_ALIASES};
use crate::processor::ProcessingResult;
use crate::{EngineError, Result};

/// Paths of the three generated report files
#[derive(Debug)]
pub struct ReportFiles {
    pub results_csv: PathBuf,
    pub emails_txt: PathBuf,
    pub summary_json: PathBuf,
}

#[derive(Serialize)]
struct FinalRow<'a> {
    name: &'a str,
    domain: &'a str,
    website: &'a str,
    city: &'a str,
    industry: &'a str,
    emails_found: String,
    email_count: usize,
    discovery_method: &'a str,
    success: bool,
    pages_accessed: String,
    processing_time: f64,
}

/// Writes the consolidated CSV, the unique-emails list and the summary
/// JSON into `output_dir`.
pub fn write_final_report(
    output_dir: &Path,
    results: &[ProcessingResult],
    elapsed_seconds: f64,
) -> Result<ReportFiles> {
    std::fs::create_dir_all(output_dir)?;

    let total = results.len();
    let success_count = results.iter().filter(|r| r.success).count();
    let total_emails: usize = results.iter().map(|r| r.emails.len()).sum();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    // Consolidated CSV with an explicit email_count column.
    let results_csv = output_dir.join(format!(
        "FINAL_results_{}_companies_{}_emails_{}.csv",
        total, total_emails, timestamp
    ));
    let mut writer =
        csv::Writer::from_path(&results_csv).map_err(|e| EngineError::Report(e.to_string()))?;
    for result in results {
        writer
            .serialize(FinalRow {
                name: &result.company_name,
                domain: result.domain.as_deref().unwrap_or(""),
                website: result.website.as_deref().unwrap_or(""),
                city: &result.city,
                industry: &result.industry,
                emails_found: result.emails.join(", "),
                email_count: result.emails.len(),
                discovery_method: result.discovery_method.as_str(),
                success: result.success,
                pages_accessed: result.pages_accessed.join("; "),
                processing_time: result.processing_time_seconds,
            })
            .map_err(|e| EngineError::Report(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| EngineError::Report(e.to_string()))?;

    // Unique emails, annotated when several companies share one address.
    let mut email_sources: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for result in results {
        for email in &result.emails {
            email_sources
                .entry(email.trim().to_lowercase())
                .or_default()
                .push(&result.company_name);
        }
    }

    let emails_txt = output_dir.join(format!(
        "FINAL_unique_emails_{}_emails_{}.txt",
        total_emails, timestamp
    ));
    let mut out = std::fs::File::create(&emails_txt)?;
    writeln!(out, "# Email Discovery Report")?;
    writeln!(out, "# Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"))?;
    writeln!(out, "# Total Unique Emails: {}", email_sources.len())?;
    writeln!(out, "# Source Companies: {}", total)?;
    if total > 0 {
        writeln!(
            out,
            "# Success Rate: {:.1}%",
            success_count as f64 / total as f64 * 100.0
        )?;
    }
    writeln!(out)?;
    for (email, sources) in &email_sources {
        if sources.len() == 1 {
            writeln!(out, "{}", email)?;
        } else {
            writeln!(out, "{} # Found in {} companies", email, sources.len())?;
        }
    }

    // Summary JSON: totals, per-method breakdown, top email domains.
    let mut method_companies: BTreeMap<&str, usize> = BTreeMap::new();
    let mut method_emails: BTreeMap<&str, usize> = BTreeMap::new();
    for result in results {
        let method = result.discovery_method.as_str();
        *method_companies.entry(method).or_insert(0) += 1;
        *method_emails.entry(method).or_insert(0) += result.emails.len();
    }

    let mut domain_counts: HashMap<String, usize> = HashMap::new();
    for email in email_sources.keys() {
        if let Some((_, domain)) = email.split_once('@') {
            *domain_counts.entry(domain.to_string()).or_insert(0) += 1;
        }
    }
    let mut top_domains: Vec<(String, usize)> = domain_counts.into_iter().collect();
    top_domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_domains.truncate(10);
    let top_domains: serde_json::Map<String, Value> = top_domains
        .into_iter()
        .map(|(domain, count)| (domain, json!(count)))
        .collect();

    let method_breakdown: serde_json::Map<String, Value> = method_companies
        .iter()
        .map(|(method, companies)| {
            (
                method.to_string(),
                json!({
                    "companies": companies,
                    "emails": method_emails.get(method).copied().unwrap_or(0),
                    "percentage": if total > 0 {
                        (*companies as f64 / total as f64 * 10000.0).round() / 100.0
                    } else {
                        0.0
                    },
                }),
            )
        })
        .collect();

    let summary = json!({
        "processing_summary": {
            "total_companies_processed": total,
            "companies_with_emails": success_count,
            "success_rate_percent": if total > 0 {
                (success_count as f64 / total as f64 * 10000.0).round() / 100.0
            } else {
                0.0
            },
            "total_emails_found": total_emails,
            "unique_emails_found": email_sources.len(),
            "processing_time_minutes": (elapsed_seconds / 60.0 * 100.0).round() / 100.0,
        },
        "method_breakdown": method_breakdown,
        "top_email_domains": top_domains,
        "report_generated": Local::now().to_rfc3339(),
    });

    let summary_json = output_dir.join(format!("FINAL_summary_stats_{}.json", timestamp));
    std::fs::write(&summary_json, serde_json::to_string_pretty(&summary)?)?;

    info!(
        csv = %results_csv.display(),
        emails = %emails_txt.display(),
        summary = %summary_json.display(),
        "final report written"
    );

    Ok(ReportFiles {
        results_csv,
        emails_txt,
        summary_json,
    })
}

/// Merges results into the original row set by company-name lookup.
///
/// Rows without a matching result pass through untouched; matched rows gain
/// the result fields. Pure and idempotent: applying it twice with the same
/// inputs produces the same rows.
pub fn merge_into_records(rows: &[Value], results: &[ProcessingResult]) -> Vec<Value> {
    let by_name: HashMap<&str, &ProcessingResult> = results
        .iter()
        .map(|r| (r.company_name.as_str(), r))
        .collect();

    rows.iter()
        .map(|row| {
            let mut row = row.clone();
            let name = match field_value(&row, NAME_ALIASES) {
                Some(name) => name,
                None => return row,
            };
            let Some(result) = by_name.get(name.as_str()) else {
                return row;
            };
            if let Some(object) = row.as_object_mut() {
                object.insert("emails_found".into(), json!(result.emails.join(", ")));
                object.insert("email_count".into(), json!(result.emails.len()));
                object.insert(
                    "discovery_method".into(),
                    json!(result.discovery_method.as_str()),
                );
                object.insert("success".into(), json!(result.success));
                object.insert(
                    "pages_accessed".into(),
                    json!(result.pages_accessed.join("; ")),
                );
                object.insert(
                    "processing_time".into(),
                    json!(result.processing_time_seconds),
                );
            }
            row
        })
        .collect()
}

/// Writes rows back out as NDJSON.
pub fn write_ndjson(path: &Path, rows: &[Value]) -> Result<()> {
    let mut out = std::fs::File::create(path)?;
    for row in rows {
        writeln!(out, "{}", serde_json::to_string(row)?)?;
    }
    Ok(())
}

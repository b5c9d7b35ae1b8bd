//! Vertical card display for analysis results and playbook versions.

use chrono::{DateTime, NaiveDateTime};
use clauselens_core::{AnalysisResult, Finding, PlaybookVersion, Recommendation};

const MAX_CHUNKS: usize = 3;
const SNIPPET_CHARS: usize = 80;

// ── Analysis results ──

/// Print a completed analysis as a card: headline, warnings, usage, findings.
pub fn print_result_card(result: &AnalysisResult) {
    match &result.analysis_id {
        Some(id) => println!("=== Analysis {id} ==="),
        None => println!("=== Analysis ==="),
    }
    println!(
        "  {:<20} {}",
        "overall risk",
        result.overall_risk_score.as_str().to_uppercase()
    );
    println!("  {:<20} {:.0}%", "confidence", result.confidence_score * 100.0);
    if let Some(version) = &result.playbook_version_id {
        println!("  {:<20} {}", "playbook version", version);
    }
    if let Some(ts) = &result.timestamp {
        println!("  {:<20} {}", "completed", format_timestamp(ts));
    }
    println!();

    if !result.guardrail_warnings.is_empty() {
        println!("Guardrail warnings ({}):", result.guardrail_warnings.len());
        for w in &result.guardrail_warnings {
            print!("  [{}] {}", w.kind, w.message);
            if let Some(trigger) = &w.triggered_by {
                print!("  (triggered by {trigger})");
            }
            println!();
        }
        println!();
    }

    if let Some(usage) = &result.usage {
        println!("Usage");
        println!(
            "  {:<20} {} in / {} out / {} total",
            "tokens", usage.input_tokens, usage.output_tokens, usage.total_tokens
        );
        println!("  {:<20} ${:.4}", "estimated cost", usage.estimated_cost_usd);
        println!();
    }

    if result.findings.is_empty() {
        println!("No findings.");
        return;
    }
    println!("Findings ({}):", result.findings.len());
    for finding in &result.findings {
        print_finding(finding);
    }
}

/// Findings collected before the stream stopped.
pub fn print_partial_findings(findings: &[Finding]) {
    println!("Partial findings ({}):", findings.len());
    for finding in findings {
        print_finding(finding);
    }
}

/// One-line summary used while findings stream in.
pub fn finding_line(finding: &Finding) -> String {
    format!(
        "  [{:<8}] {}",
        finding.risk_level.as_str(),
        if finding.clause_type.is_empty() {
            "(unnamed clause)"
        } else {
            finding.clause_type.as_str()
        }
    )
}

fn print_finding(finding: &Finding) {
    println!("{}", finding_line(finding));
    let fields = [
        ("extracted", &finding.extracted_value),
        ("playbook", &finding.playbook_standard),
        ("deviation", &finding.deviation),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("      {:<12} {}", label, value);
        }
    }

    if let Some(text) = &finding.recommendation {
        let rec = Recommendation::parse(text);
        if !rec.main.is_empty() {
            println!("      {:<12} {}", "recommend", rec.main);
        }
        if !rec.citations.is_empty() {
            println!("      {:<12} {}", "cites", rec.citations.join(", "));
        }
    }

    let chunks = &finding.retrieved_chunks;
    for chunk in chunks.iter().take(MAX_CHUNKS) {
        println!(
            "      {:<12} {} ({}): {}",
            "source",
            chunk.chunk_id,
            chunk.source,
            snippet(&chunk.content)
        );
    }
    if chunks.len() > MAX_CHUNKS {
        println!("      ... and {} more chunks", chunks.len() - MAX_CHUNKS);
    }
}

// ── Playbook versions ──

pub fn print_versions(versions: &[PlaybookVersion], active: Option<&str>) {
    if versions.is_empty() {
        println!("No playbook versions.");
        return;
    }
    for v in versions {
        let marker = if Some(v.id.as_str()) == active { "*" } else { " " };
        let created = v.created_at.as_deref().map(format_timestamp).unwrap_or_default();
        print!(
            "{marker} {:<38} {:<12} {:<17}",
            v.id,
            v.label.as_deref().unwrap_or("-"),
            created
        );
        if let Some(note) = &v.change_note {
            print!("  {note}");
        }
        println!();
    }
}

/// Print one version as a card followed by its full content.
pub fn print_version(version: &PlaybookVersion, active: Option<&str>) {
    let marker = if Some(version.id.as_str()) == active { " (active)" } else { "" };
    println!("=== Playbook {}{marker} ===", version.id);
    if let Some(label) = &version.label {
        println!("  {:<20} {}", "label", label);
    }
    if let Some(created) = &version.created_at {
        println!("  {:<20} {}", "created", format_timestamp(created));
    }
    if let Some(note) = &version.change_note {
        println!("  {:<20} {}", "change note", note);
    }
    println!();
    println!("{}", version.content.trim_end());
}

// ── Helpers ──

/// Service timestamps are ISO-8601, with or without an offset.
fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d %H:%M").to_string();
    }
    raw.to_string()
}

fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > SNIPPET_CHARS {
        let cut: String = flat.chars().take(SNIPPET_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_with_and_without_offset() {
        assert_eq!(format_timestamp("2026-02-21T10:15:30Z"), "2026-02-21 10:15");
        assert_eq!(format_timestamp("2026-02-21T10:15:30.123456"), "2026-02-21 10:15");
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("Cap at\n  12 months"), "Cap at 12 months");
        let long = "x".repeat(200);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS);
        assert!(s.ends_with("..."));
    }

    #[test]
    fn finding_line_names_unnamed_clauses() {
        let finding: Finding =
            serde_json::from_str(r#"{"clause_type": "", "risk_level": "high"}"#).unwrap();
        assert_eq!(finding_line(&finding), "  [high    ] (unnamed clause)");
    }
}

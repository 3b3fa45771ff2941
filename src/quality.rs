//! Quality heuristics for converted Markdown.
//!
//! The processor gives no signal about how well a document survived
//! conversion. [`assess`] runs five cheap regex checks over the Markdown and
//! folds them into a [`DocumentQualityReport`] with a 0.0–1.0 score and
//! actionable recommendations (switch to quality mode, enable OCR, ...).
//!
//! | Metric | Passes when |
//! |--------|-------------|
//! | `table_preservation` | a table with a separator row exists, or nothing mentions tables |
//! | `heading_hierarchy`  | at least one heading exists |
//! | `image_placeholders` | an image link exists, or nothing mentions images/figures |
//! | `text_content`       | more than 20 words survive after stripping markup |
//! | `list_structure`     | always (informational) |
//!
//! The overall score is the unweighted mean; the report passes at 0.70.

use crate::model::FileKind;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// Minimum overall score for a report to pass.
pub const PASS_THRESHOLD: f64 = 0.70;
/// Overall score from which the output is considered excellent.
pub const EXCELLENT_THRESHOLD: f64 = 0.90;

const EVIDENCE_TEXT_CHARS: usize = 200;

static TABLE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\|.*\|.*\|").unwrap());
static TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[ \t]*:?-+:?[ \t]*\|").unwrap());
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^(#{1,6})\s+(.+)$").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").unwrap());
static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#*_`\[\]()]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static UNORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*[-*+]\s+(.+)$").unwrap());
static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+\.\s+(.+)$").unwrap());

/// What a [`QualityScore`] measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityMetric {
    TablePreservation,
    HeadingHierarchy,
    ImagePlaceholders,
    TextContent,
    ListStructure,
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityScore {
    pub metric: QualityMetric,
    /// 0.0 to 1.0.
    pub score: f64,
    pub passed: bool,
    pub details: String,
    /// A few matched snippets, for humans.
    pub evidence: Vec<String>,
}

impl QualityScore {
    fn new(metric: QualityMetric, score: f64, passed: bool, details: impl Into<String>) -> Self {
        Self {
            metric,
            score,
            passed,
            details: details.into(),
            evidence: Vec::new(),
        }
    }

    fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// All checks for one converted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentQualityReport {
    pub filename: String,
    pub file_type: FileKind,
    pub scores: Vec<QualityScore>,
    pub overall_score: f64,
    pub overall_passed: bool,
    pub recommendations: Vec<String>,
}

impl DocumentQualityReport {
    pub fn score(&self, metric: QualityMetric) -> Option<&QualityScore> {
        self.scores.iter().find(|s| s.metric == metric)
    }

    pub fn is_excellent(&self) -> bool {
        self.overall_score >= EXCELLENT_THRESHOLD
    }
}

/// Run every check over `markdown` and build the report.
pub fn assess(markdown: &str, filename: &str, file_type: FileKind) -> DocumentQualityReport {
    let scores = vec![
        score_tables(markdown),
        score_headings(markdown),
        score_images(markdown),
        score_text(markdown),
        score_lists(markdown),
    ];
    let overall_score = overall_score(&scores);
    let overall_passed = overall_score >= PASS_THRESHOLD;

    let mut recommendations: Vec<String> = scores
        .iter()
        .filter(|s| !s.passed)
        .filter_map(|s| match s.metric {
            QualityMetric::TablePreservation => {
                Some("Consider using Quality mode for better table preservation")
            }
            QualityMetric::HeadingHierarchy => {
                Some("Document structure may benefit from clearer heading hierarchy")
            }
            QualityMetric::TextContent => Some("Enable OCR if document is scanned or image-based"),
            _ => None,
        })
        .map(String::from)
        .collect();
    let verdict = if overall_score >= EXCELLENT_THRESHOLD {
        "Excellent quality - suitable for RAG usage"
    } else if overall_passed {
        "Acceptable quality - may benefit from Quality mode processing"
    } else {
        "Low quality output - consider re-processing with Quality mode and OCR enabled"
    };
    recommendations.push(verdict.to_string());

    debug!(
        "Quality of {}: {:.2} ({})",
        filename,
        overall_score,
        if overall_passed { "pass" } else { "fail" }
    );

    DocumentQualityReport {
        filename: filename.to_string(),
        file_type,
        scores,
        overall_score,
        overall_passed,
        recommendations,
    }
}

/// Unweighted mean of the scores; `0.0` when there are none.
pub fn overall_score(scores: &[QualityScore]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().map(|s| s.score).sum::<f64>() / scores.len() as f64
}

pub fn score_tables(markdown: &str) -> QualityScore {
    let rows: Vec<&str> = TABLE_ROW.find_iter(markdown).map(|m| m.as_str()).collect();
    let tables = TABLE_SEPARATOR.find_iter(markdown).count();
    let metric = QualityMetric::TablePreservation;

    if tables > 0 {
        let evidence = rows.iter().take(3).map(|r| r.trim().to_string()).collect();
        QualityScore::new(
            metric,
            1.0,
            true,
            format!("Found {tables} table(s) with proper markdown formatting"),
        )
        .with_evidence(evidence)
    } else if !rows.is_empty() {
        let details = "Found table-like content but missing proper headers";
        QualityScore::new(metric, 0.5, false, details)
    } else if markdown.to_lowercase().contains("table") {
        let details = "Document references tables but none found in markdown";
        QualityScore::new(metric, 0.0, false, details)
    } else {
        QualityScore::new(metric, 1.0, true, "No tables expected or found")
    }
}

pub fn score_headings(markdown: &str) -> QualityScore {
    let headings: Vec<(usize, &str)> = HEADING
        .captures_iter(markdown)
        .map(|c| (c[1].len(), c.get(2).map_or("", |m| m.as_str())))
        .collect();
    let metric = QualityMetric::HeadingHierarchy;

    if headings.is_empty() {
        return QualityScore::new(metric, 0.0, false, "No headings found in markdown output");
    }

    let evidence = headings
        .iter()
        .take(5)
        .map(|(level, text)| format!("{} {}", "#".repeat(*level), text))
        .collect();
    let has_h1 = headings.iter().any(|(level, _)| *level == 1);
    let deepest = headings.iter().map(|(level, _)| *level).max().unwrap_or(1);

    let score = if has_h1 && deepest <= 4 {
        QualityScore::new(
            metric,
            1.0,
            true,
            format!(
                "Found {} headings with proper hierarchy (H1-H{deepest})",
                headings.len()
            ),
        )
    } else {
        QualityScore::new(
            metric,
            0.7,
            true,
            format!(
                "Found {} headings but hierarchy could be improved",
                headings.len()
            ),
        )
    };
    score.with_evidence(evidence)
}

pub fn score_images(markdown: &str) -> QualityScore {
    let images: Vec<(&str, &str)> = IMAGE
        .captures_iter(markdown)
        .map(|c| {
            (
                c.get(1).map_or("", |m| m.as_str()),
                c.get(2).map_or("", |m| m.as_str()),
            )
        })
        .collect();
    let metric = QualityMetric::ImagePlaceholders;

    if !images.is_empty() {
        let evidence = images
            .iter()
            .take(3)
            .map(|(alt, src)| format!("![{alt}]({src})"))
            .collect();
        return QualityScore::new(
            metric,
            1.0,
            true,
            format!("Found {} image placeholder(s)", images.len()),
        )
        .with_evidence(evidence);
    }

    let lower = markdown.to_lowercase();
    if lower.contains("image") || lower.contains("figure") {
        let details = "Document references images but no placeholders found";
        QualityScore::new(metric, 0.0, false, details)
    } else {
        QualityScore::new(metric, 1.0, true, "No images expected or found")
    }
}

pub fn score_text(markdown: &str) -> QualityScore {
    let stripped = MARKUP.replace_all(markdown, "");
    let plain = WHITESPACE.replace_all(&stripped, " ");
    let plain = plain.trim();
    let words = plain.split_whitespace().count();
    let chars = plain.chars().count();
    let metric = QualityMetric::TextContent;

    let sample = if chars > EVIDENCE_TEXT_CHARS {
        let head: String = plain.chars().take(EVIDENCE_TEXT_CHARS).collect();
        format!("{head}...")
    } else {
        plain.to_string()
    };

    let score = match words {
        w if w > 50 => QualityScore::new(
            metric,
            1.0,
            true,
            format!("Extracted {w} words, {chars} characters"),
        ),
        w if w > 20 => {
            QualityScore::new(metric, 0.7, true, format!("Extracted {w} words (limited content)"))
        }
        0 => QualityScore::new(metric, 0.0, false, "No text content extracted"),
        w => QualityScore::new(
            metric,
            0.4,
            false,
            format!("Very limited text extraction ({w} words)"),
        ),
    };
    score.with_evidence(vec![sample])
}

fn list_item(c: regex::Captures<'_>) -> String {
    c.get(1).map_or(String::new(), |m| m.as_str().to_string())
}

pub fn score_lists(markdown: &str) -> QualityScore {
    let unordered: Vec<String> = UNORDERED_ITEM.captures_iter(markdown).map(list_item).collect();
    let ordered: Vec<String> = ORDERED_ITEM.captures_iter(markdown).map(list_item).collect();
    let metric = QualityMetric::ListStructure;

    if unordered.is_empty() && ordered.is_empty() {
        return QualityScore::new(metric, 1.0, true, "No lists expected or found");
    }

    let evidence = unordered
        .iter()
        .take(2)
        .map(|i| format!("- {i}"))
        .chain(ordered.iter().take(2).map(|i| format!("1. {i}")))
        .collect();
    QualityScore::new(
        metric,
        1.0,
        true,
        format!(
            "Found {} unordered and {} ordered list items",
            unordered.len(),
            ordered.len()
        ),
    )
    .with_evidence(evidence)
}

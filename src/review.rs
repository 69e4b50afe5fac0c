//! Review payload normalization.
//!
//! The task executor has reported review output in several historical
//! shapes: field names drifted across prompt revisions, dimension scores
//! arrive either as bare numbers or as `{score, comment}` objects, and
//! whole sections go missing. [`normalize`] folds all of them into one
//! canonical [`NormalizedReview`]. Each logical field resolves through an
//! explicit ordered list of accepted aliases, so "which alias wins" lives
//! in one place instead of scattered optional lookups.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Accepted property names, in priority order, per logical field.
const DIMENSION_FIELDS: &[&str] = &["dimensions", "scores"];
const SUGGESTION_FIELDS: &[&str] = &["suggestions", "improvements", "revision_suggestions"];
const OVERALL_SCORE_FIELDS: &[&str] = &["avg_score", "overall_score", "total_score", "score"];
const ASPECT_FIELDS: &[&str] = &["aspect", "area", "dimension"];
const ISSUE_FIELDS: &[&str] = &["issue", "problem", "description"];
const ADVICE_FIELDS: &[&str] = &["suggestion", "advice", "fix"];
const CURRENT_FIELDS: &[&str] = &["current", "current_text", "excerpt"];
const SUMMARY_FIELDS: &[&str] = &["summary", "overall_comment"];
const DIRECTION_FIELDS: &[&str] = &["revision_direction", "direction"];
const TONE_FIELDS: &[&str] = &["tone_adjustment", "tone"];
const PACING_FIELDS: &[&str] = &["pacing_suggestion", "pacing_note"];

/// Qualitative band derived from the average score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Exceptional,
    Strong,
    Good,
    Passing,
    NeedsWork,
    Unassessed,
}

impl Grade {
    pub fn from_score(avg: f64) -> Self {
        if avg >= 9.0 {
            Grade::Exceptional
        } else if avg >= 8.0 {
            Grade::Strong
        } else if avg >= 7.0 {
            Grade::Good
        } else if avg >= 6.0 {
            Grade::Passing
        } else {
            Grade::NeedsWork
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Exceptional => "exceptional",
            Grade::Strong => "strong",
            Grade::Good => "good",
            Grade::Passing => "passing",
            Grade::NeedsWork => "needs_work",
            Grade::Unassessed => "unassessed",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency of a single revision suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    High,
    Medium,
    Normal,
}

impl SuggestionPriority {
    /// Parse from executor output, defaulting to Normal.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" => SuggestionPriority::High,
            "medium" => SuggestionPriority::Medium,
            _ => SuggestionPriority::Normal,
        }
    }
}

/// One scored review dimension (plot, pacing, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDimension {
    pub key: String,
    pub label: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One actionable revision suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSuggestion {
    pub aspect: String,
    pub priority: SuggestionPriority,
    pub issue: String,
    pub suggestion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
}

/// Canonical review record derived from a raw task-output payload.
///
/// Recomputed whenever the raw payload changes; never persisted
/// independently of its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReview {
    pub avg_score: f64,
    pub grade: Grade,
    pub summary: String,
    pub dimensions: Vec<ReviewDimension>,
    pub suggestions: Vec<ReviewSuggestion>,
    pub critique: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone_adjustment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pacing_suggestion: Option<String>,
    pub captured_at: DateTime<Utc>,
}

impl NormalizedReview {
    /// Canonical record for absent input.
    pub fn empty() -> Self {
        Self {
            avg_score: 0.0,
            grade: Grade::Unassessed,
            summary: String::new(),
            dimensions: Vec::new(),
            suggestions: Vec::new(),
            critique: BTreeMap::new(),
            revision_direction: None,
            tone_adjustment: None,
            pacing_suggestion: None,
            captured_at: Utc::now(),
        }
    }

    /// Rebuild a raw payload in the canonical shape.
    ///
    /// Normalizing this value yields an equivalent record, which is what
    /// makes normalization idempotent.
    pub fn to_raw(&self) -> Value {
        let dimensions: Map<String, Value> = self
            .dimensions
            .iter()
            .map(|d| {
                let mut entry = Map::new();
                entry.insert("score".into(), json!(d.score));
                if let Some(comment) = &d.comment {
                    entry.insert("comment".into(), json!(comment));
                }
                (d.key.clone(), Value::Object(entry))
            })
            .collect();

        let mut raw = Map::new();
        raw.insert("avg_score".into(), json!(self.avg_score));
        raw.insert("summary".into(), json!(self.summary));
        raw.insert("dimensions".into(), Value::Object(dimensions));
        raw.insert(
            "suggestions".into(),
            Value::Array(
                self.suggestions
                    .iter()
                    .map(|s| serde_json::to_value(s).unwrap_or(Value::Null))
                    .collect(),
            ),
        );
        raw.insert("critique".into(), json!(self.critique));
        if let Some(direction) = &self.revision_direction {
            raw.insert("revision_direction".into(), json!(direction));
        }
        if let Some(tone) = &self.tone_adjustment {
            raw.insert("tone_adjustment".into(), json!(tone));
        }
        if let Some(pacing) = &self.pacing_suggestion {
            raw.insert("pacing_suggestion".into(), json!(pacing));
        }
        Value::Object(raw)
    }
}

/// Display labels for the dimensions the review prompt is known to emit.
pub fn default_labels() -> BTreeMap<String, String> {
    [
        ("plot", "Plot"),
        ("pacing", "Pacing"),
        ("characters", "Characters"),
        ("prose", "Prose"),
        ("continuity", "Continuity"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Normalize an arbitrary-shaped review payload.
///
/// Never panics: missing, extra and misnamed fields degrade to defaults,
/// and absent input yields the canonical empty record.
pub fn normalize(raw: Option<&Value>, labels: &BTreeMap<String, String>) -> NormalizedReview {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return NormalizedReview::empty();
    };

    let dimensions = extract_dimensions(obj, labels);
    let avg = if dimensions.is_empty() {
        first_number(obj, OVERALL_SCORE_FIELDS).unwrap_or(0.0)
    } else {
        dimensions.iter().map(|d| d.score).sum::<f64>() / dimensions.len() as f64
    };
    let avg_score = round1(avg.clamp(0.0, 10.0));

    NormalizedReview {
        avg_score,
        grade: Grade::from_score(avg_score),
        summary: first_text(obj, SUMMARY_FIELDS).unwrap_or_default(),
        dimensions,
        suggestions: extract_suggestions(obj),
        critique: extract_critique(obj),
        revision_direction: first_text(obj, DIRECTION_FIELDS),
        tone_adjustment: first_text(obj, TONE_FIELDS),
        pacing_suggestion: first_text(obj, PACING_FIELDS),
        captured_at: Utc::now(),
    }
}

/// First non-empty string among the aliases, trimmed.
fn first_text(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First finite number among the aliases.
fn first_number(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_f64))
        .filter(|n| n.is_finite())
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

fn extract_dimensions(
    obj: &Map<String, Value>,
    labels: &BTreeMap<String, String>,
) -> Vec<ReviewDimension> {
    let Some(dims) = DIMENSION_FIELDS
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_object))
    else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (key, value) in dims {
        let (score, comment) = match value {
            Value::Number(n) => (n.as_f64(), None),
            Value::Object(entry) => (
                entry.get("score").and_then(Value::as_f64),
                entry
                    .get("comment")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            ),
            _ => (None, None),
        };
        // Entries without a numeric score are dropped silently.
        let Some(score) = score.filter(|s| s.is_finite()) else {
            continue;
        };
        let label = labels
            .get(key)
            .cloned()
            .unwrap_or_else(|| capitalize_first(key));
        out.push(ReviewDimension {
            key: key.clone(),
            label,
            score,
            comment,
        });
    }
    out
}

fn extract_suggestions(obj: &Map<String, Value>) -> Vec<ReviewSuggestion> {
    let Some(items) = SUGGESTION_FIELDS
        .iter()
        .find_map(|f| obj.get(*f).and_then(Value::as_array))
    else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let entry = item.as_object()?;
            let issue = first_text(entry, ISSUE_FIELDS).unwrap_or_default();
            let suggestion = first_text(entry, ADVICE_FIELDS).unwrap_or_default();
            if issue.is_empty() && suggestion.is_empty() {
                return None;
            }
            Some(ReviewSuggestion {
                aspect: first_text(entry, ASPECT_FIELDS).unwrap_or_else(|| "general".to_string()),
                priority: entry
                    .get("priority")
                    .and_then(Value::as_str)
                    .map(SuggestionPriority::parse)
                    .unwrap_or(SuggestionPriority::Normal),
                issue,
                suggestion,
                current: first_text(entry, CURRENT_FIELDS),
            })
        })
        .collect()
}

fn extract_critique(obj: &Map<String, Value>) -> BTreeMap<String, String> {
    obj.get("critique")
        .and_then(Value::as_object)
        .map(|critique| {
            critique
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Capitalizes the first character of a string.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

//! Core data models for codemend
//!
//! These models are shared by every pipeline stage: issues and metrics flow
//! out of the analyzer, transformations out of the generator, validation
//! results out of the gate, and the outcome/learning records out of the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generate a deterministic issue ID based on content hash.
///
/// The ID is a 16-character hex string derived from hashing the rule code,
/// file path, line, column and message, so the same issue keeps the same ID
/// across runs and two hits on one line stay distinct.
pub fn deterministic_issue_id(code: &str, file: &str, line: u32, column: u32, message: &str) -> String {
    // MD5 for stable cross-version hashing; DefaultHasher is not stable.
    let input = format!("{code}\n{file}\n{line}:{column}\n{message}");
    let digest = md5::compute(input.as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Deterministic transformation ID: stable for the same edit on the same file.
pub fn deterministic_transformation_id(file: &str, start: usize, end: usize, replacement: &str) -> String {
    let input = format!("{file}\n{start}\n{end}\n{replacement}");
    let digest = md5::compute(input.as_bytes());
    format!("t-{}", &format!("{:x}", digest)[..12])
}

/// Severity levels for issues, transformations and validation issues
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    #[serde(alias = "warning")]
    Minor,
    #[serde(alias = "error")]
    Major,
    Critical,
}

impl Severity {
    /// Prioritization rank: critical first, info last
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::Major => 1,
            Severity::Minor => 2,
            Severity::Info => 3,
        }
    }

    /// All severities, most severe first
    pub fn all() -> Vec<Severity> {
        vec![Severity::Critical, Severity::Major, Severity::Minor, Severity::Info]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Minor => write!(f, "minor"),
            Severity::Major => write!(f, "major"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Issue / transformation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Security,
    Performance,
    Maintainability,
    Complexity,
}

impl Category {
    /// All categories in the default priority order
    pub fn all() -> Vec<Category> {
        vec![
            Category::Security,
            Category::Performance,
            Category::Complexity,
            Category::Maintainability,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Security => write!(f, "security"),
            Category::Performance => write!(f, "performance"),
            Category::Maintainability => write!(f, "maintainability"),
            Category::Complexity => write!(f, "complexity"),
        }
    }
}

/// Half-open byte range `[start, end)` into a file's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether two ranges share at least one byte
    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, other: &TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Where an issue was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    /// 1-based line
    pub line: u32,
    /// 1-based column (bytes)
    pub column: u32,
    #[serde(default)]
    pub range: Option<TextRange>,
}

/// A detected code problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    /// Rule code, e.g. `EVAL_USAGE`
    pub code: String,
    pub category: Category,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    #[serde(default)]
    pub code_snippet: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

impl Issue {
    /// Build an issue with a deterministic ID
    pub fn new(
        code: &str,
        category: Category,
        severity: Severity,
        message: impl Into<String>,
        location: Location,
    ) -> Self {
        let message = message.into();
        let id = deterministic_issue_id(
            code,
            &location.file.to_string_lossy(),
            location.line,
            location.column,
            &message,
        );
        Self {
            id,
            code: code.to_string(),
            category,
            severity,
            message,
            location,
            code_snippet: None,
            suggestion: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Per-file quantitative snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub complexity: u32,
    /// 0-100, higher is better
    pub maintainability: f64,
    /// 0-1 share of non-blank lines inside repeated blocks
    pub duplication_ratio: f64,
    pub lines: usize,
    pub functions: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            complexity: 1,
            maintainability: 100.0,
            duplication_ratio: 0.0,
            lines: 0,
            functions: 0,
        }
    }
}

/// Output of the issue detector for one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metrics: Metrics,
    pub issues: Vec<Issue>,
}

/// Cycle severity, derived from cycle length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSeverity {
    High,
    Medium,
    Low,
}

impl CycleSeverity {
    pub fn from_len(len: usize) -> Self {
        match len {
            n if n <= 3 => CycleSeverity::High,
            n if n <= 5 => CycleSeverity::Medium,
            _ => CycleSeverity::Low,
        }
    }

    /// Severity of the issue raised for a file taking part in the cycle
    pub fn issue_severity(self) -> Severity {
        match self {
            CycleSeverity::High => Severity::Major,
            CycleSeverity::Medium => Severity::Minor,
            CycleSeverity::Low => Severity::Info,
        }
    }
}

/// A detected import cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircularDependency {
    /// Files forming the cycle; `files[i]` imports `files[i + 1]`, the last imports the first
    pub files: Vec<PathBuf>,
    pub severity: CycleSeverity,
}

impl CircularDependency {
    pub fn new(files: Vec<PathBuf>) -> Self {
        let severity = CycleSeverity::from_len(files.len());
        Self { files, severity }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// The exact text a transformation replaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl OriginalSpan {
    pub fn range(&self) -> TextRange {
        TextRange::new(self.start, self.end)
    }
}

/// A proposed edit scoped to one contiguous byte range of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub id: String,
    pub file_path: PathBuf,
    pub original: OriginalSpan,
    pub replacement: String,
    #[serde(rename = "type")]
    pub category: Category,
    pub severity: Severity,
    pub confidence: f64,
    pub description: String,
    #[serde(default)]
    pub issue_id: Option<String>,
    /// Enclosing named function, used to synthesize a test
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Transformation {
    /// Create a transformation replacing `source[start..end]`.
    ///
    /// Returns `None` for an empty or out-of-bounds range, or one that does
    /// not fall on char boundaries.
    #[allow(clippy::too_many_arguments)]
    pub fn replace(
        file_path: PathBuf,
        source: &str,
        start: usize,
        end: usize,
        replacement: impl Into<String>,
        category: Category,
        severity: Severity,
        confidence: f64,
        description: impl Into<String>,
    ) -> Option<Self> {
        if start >= end || end > source.len() {
            return None;
        }
        let text = source.get(start..end)?.to_string();
        let replacement = replacement.into();
        let id = deterministic_transformation_id(
            &file_path.to_string_lossy(),
            start,
            end,
            &replacement,
        );
        Some(Self {
            id,
            file_path,
            original: OriginalSpan { start, end, text },
            replacement,
            category,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            description: description.into(),
            issue_id: None,
            symbol: None,
        })
    }

    pub fn with_issue(mut self, issue_id: impl Into<String>) -> Self {
        self.issue_id = Some(issue_id.into());
        self
    }

    pub fn with_symbol(mut self, symbol: Option<String>) -> Self {
        self.symbol = symbol;
        self
    }

    pub fn range(&self) -> TextRange {
        self.original.range()
    }

    /// Apply this edit to `text`, without checking the original text
    pub fn apply_to(&self, text: &str) -> Option<String> {
        let head = text.get(..self.original.start)?;
        let tail = text.get(self.original.end..)?;
        let mut out = String::with_capacity(head.len() + self.replacement.len() + tail.len());
        out.push_str(head);
        out.push_str(&self.replacement);
        out.push_str(tail);
        Some(out)
    }

    /// Whether `text` still holds `original.text` at `original.start..original.end`
    pub fn matches(&self, text: &str) -> bool {
        text.get(self.original.start..self.original.end) == Some(self.original.text.as_str())
    }
}

/// Which validation stage raised an issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationIssueKind {
    Stale,
    Syntax,
    Runtime,
    Test,
    Behavior,
}

impl std::fmt::Display for ValidationIssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationIssueKind::Stale => "stale",
            ValidationIssueKind::Syntax => "syntax",
            ValidationIssueKind::Runtime => "runtime",
            ValidationIssueKind::Test => "test",
            ValidationIssueKind::Behavior => "behavior",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub kind: ValidationIssueKind,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn critical(kind: ValidationIssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn warning(kind: ValidationIssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Minor,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Apply,
    Review,
    Reject,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recommendation::Apply => write!(f, "apply"),
            Recommendation::Review => write!(f, "review"),
            Recommendation::Reject => write!(f, "reject"),
        }
    }
}

/// Outcome of validating one transformation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub transformation_id: String,
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
    #[serde(default)]
    pub test_results: Option<TestResults>,
    pub recommendation: Recommendation,
    #[serde(default)]
    pub duration_ms: u64,
}

impl ValidationResult {
    /// Derive validity and recommendation from the collected issues.
    ///
    /// Any critical issue rejects; only warnings ask for review; no issues
    /// recommends applying unless `cap_at_review` is set.
    pub fn from_issues(
        transformation_id: impl Into<String>,
        issues: Vec<ValidationIssue>,
        test_results: Option<TestResults>,
        cap_at_review: bool,
    ) -> Self {
        let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
        let recommendation = if has_critical {
            Recommendation::Reject
        } else if !issues.is_empty() || cap_at_review {
            Recommendation::Review
        } else {
            Recommendation::Apply
        };
        Self {
            transformation_id: transformation_id.into(),
            valid: !has_critical,
            issues,
            test_results,
            recommendation,
            duration_ms: 0,
        }
    }

    /// Pair a transformation with this result if it may be applied.
    ///
    /// This is the only way to build an [`ApprovedTransformation`].
    pub fn approve(&self, transformation: &Transformation) -> Option<ApprovedTransformation> {
        if self.valid
            && self.recommendation == Recommendation::Apply
            && self.transformation_id == transformation.id
        {
            Some(ApprovedTransformation {
                transformation: transformation.clone(),
            })
        } else {
            None
        }
    }
}

/// A transformation whose validation result was `valid` with an `apply` recommendation
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedTransformation {
    transformation: Transformation,
}

impl ApprovedTransformation {
    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }
}

impl std::ops::Deref for ApprovedTransformation {
    type Target = Transformation;

    fn deref(&self) -> &Transformation {
        &self.transformation
    }
}

/// One record in the learning log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningEntry {
    #[serde(rename = "type")]
    pub category: Category,
    pub description: String,
    pub succeeded: bool,
    pub reason: String,
}

/// Aggregate statistics for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub run_id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub success: bool,
    pub cancelled: bool,
    pub files_analyzed: usize,
    pub files_skipped: usize,
    pub issues_found: usize,
    pub transformations_proposed: usize,
    pub transformations_validated: usize,
    pub transformations_applied: usize,
    pub transformations_rejected: usize,
    pub score_before: f64,
    pub score_after: f64,
    pub score_delta: f64,
    pub final_stage: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl OptimizationOutcome {
    pub fn start() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now(),
            finished_at: None,
            success: true,
            cancelled: false,
            files_analyzed: 0,
            files_skipped: 0,
            issues_found: 0,
            transformations_proposed: 0,
            transformations_validated: 0,
            transformations_applied: 0,
            transformations_rejected: 0,
            score_before: 0.0,
            score_after: 0.0,
            score_delta: 0.0,
            final_stage: String::new(),
            error: None,
        }
    }

    pub fn finish(&mut self, stage: impl Into<String>) {
        self.score_delta = self.score_after - self.score_before;
        self.final_stage = stage.into();
        self.finished_at = Some(chrono::Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(source: &str, start: usize, end: usize, replacement: &str) -> Transformation {
        Transformation::replace(
            PathBuf::from("/repo/a.js"),
            source,
            start,
            end,
            replacement,
            Category::Maintainability,
            Severity::Minor,
            0.9,
            "test",
        )
        .expect("valid range")
    }

    #[test]
    fn test_issue_id_is_deterministic() {
        let a = deterministic_issue_id("EVAL_USAGE", "a.js", 3, 5, "eval");
        let b = deterministic_issue_id("EVAL_USAGE", "a.js", 3, 5, "eval");
        let c = deterministic_issue_id("EVAL_USAGE", "a.js", 4, 5, "eval");
        let d = deterministic_issue_id("EVAL_USAGE", "a.js", 3, 9, "eval");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_severity_rank_puts_critical_first() {
        let mut all = vec![Severity::Info, Severity::Critical, Severity::Minor, Severity::Major];
        all.sort_by_key(|s| s.rank());
        assert_eq!(all, Severity::all());
    }

    #[test]
    fn test_severity_aliases() {
        let s: Severity = serde_json::from_str("\"warning\"").expect("alias");
        assert_eq!(s, Severity::Minor);
        let s: Severity = serde_json::from_str("\"error\"").expect("alias");
        assert_eq!(s, Severity::Major);
    }

    #[test]
    fn test_cycle_severity_by_length() {
        assert_eq!(CycleSeverity::from_len(2), CycleSeverity::High);
        assert_eq!(CycleSeverity::from_len(3), CycleSeverity::High);
        assert_eq!(CycleSeverity::from_len(4), CycleSeverity::Medium);
        assert_eq!(CycleSeverity::from_len(5), CycleSeverity::Medium);
        assert_eq!(CycleSeverity::from_len(6), CycleSeverity::Low);
    }

    #[test]
    fn test_transformation_rejects_empty_range() {
        let none = Transformation::replace(
            PathBuf::from("a.js"),
            "abc",
            2,
            2,
            "x",
            Category::Security,
            Severity::Critical,
            1.0,
            "",
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_apply_round_trip() {
        let source = "let a = eval(x);";
        let t = sample(source, 8, 15, "JSON.parse(x)");
        let out = t.apply_to(source).expect("in bounds");
        let start = t.original.start;
        assert_eq!(&out[start..start + t.replacement.len()], "JSON.parse(x)");
        assert!(t.matches(source));
        assert!(!t.matches(&out));
    }

    #[test]
    fn test_only_valid_apply_results_approve() {
        let t = sample("var x = 1;", 0, 3, "let");
        let ok = ValidationResult::from_issues(t.id.clone(), vec![], None, false);
        assert!(ok.approve(&t).is_some());

        let capped = ValidationResult::from_issues(t.id.clone(), vec![], None, true);
        assert_eq!(capped.recommendation, Recommendation::Review);
        assert!(capped.approve(&t).is_none());

        let bad = ValidationResult::from_issues(
            t.id.clone(),
            vec![ValidationIssue::critical(ValidationIssueKind::Syntax, "broken")],
            None,
            false,
        );
        assert!(!bad.valid);
        assert_eq!(bad.recommendation, Recommendation::Reject);
        assert!(bad.approve(&t).is_none());
    }

    #[test]
    fn test_transformation_serializes_type_field() {
        let t = sample("var x = 1;", 0, 3, "let");
        let json = serde_json::to_value(&t).expect("serialize");
        assert_eq!(json["type"], "maintainability");
        assert_eq!(json["original"]["text"], "var");
    }
}

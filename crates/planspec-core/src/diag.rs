use std::cmp::Ordering;
use std::fmt;

use crate::path::Path;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// A passing check, kept so reports can show what was verified.
    Info = 0,
    Error = 1,
}

/// A pass/fail record stamped with the location it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub path: Path,
    /// Short, fixed description. Empty for per-leaf assertion results.
    pub summary: String,
    pub detail: String,
}

impl Diagnostic {
    /// Creates an info diagnostic for a value that matched.
    pub fn success(path: Path, detail: impl fmt::Display) -> Self {
        Self {
            severity: Severity::Info,
            path,
            summary: String::new(),
            detail: detail.to_string(),
        }
    }

    /// Creates an error diagnostic for a leaf that differs from its
    /// expectation, rendered as `got != expected`.
    pub fn mismatch(path: Path, expected: impl fmt::Display, got: impl fmt::Display) -> Self {
        Self::error(path, format!("{} != {}", got, expected))
    }

    /// Creates an error diagnostic with a free-form detail.
    pub fn error(path: Path, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path,
            summary: String::new(),
            detail: detail.into(),
        }
    }

    /// Creates an error diagnostic for a failure that prevented a check
    /// from running at all (missing resource, connection failure, ...).
    pub fn technical(path: Path, summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path,
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    /// Returns true if this is an error-level diagnostic.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = match self.severity {
            Severity::Info => "=",
            Severity::Error => ":",
        };
        if !self.path.is_empty() {
            write!(f, "{} {} ", self.path, sep)?;
        }
        match (self.summary.is_empty(), self.detail.is_empty()) {
            (true, _) => write!(f, "{}", self.detail),
            (false, true) => write!(f, "{}", self.summary),
            (false, false) => write!(f, "{}; {}", self.summary, self.detail),
        }
    }
}

/// An ordered collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty diagnostics collection.
    pub fn new() -> Self {
        Self { diags: Vec::new() }
    }

    /// Adds a diagnostic.
    pub fn add(&mut self, diag: Diagnostic) {
        self.diags.push(diag);
    }

    /// Adds an error diagnostic.
    pub fn error(&mut self, path: Path, detail: impl Into<String>) {
        self.add(Diagnostic::error(path, detail));
    }

    /// Adds an info diagnostic.
    pub fn success(&mut self, path: Path, detail: impl fmt::Display) {
        self.add(Diagnostic::success(path, detail));
    }

    /// Extends with another collection of diagnostics.
    pub fn extend(&mut self, other: Diagnostics) {
        self.diags.extend(other.diags);
    }

    /// Returns true if any error-level diagnostics are present.
    pub fn has_errors(&self) -> bool {
        self.diags.iter().any(|d| d.is_error())
    }

    /// Returns the number of error-level diagnostics.
    pub fn error_count(&self) -> usize {
        self.diags.iter().filter(|d| d.is_error()).count()
    }

    /// Ranks two collections by their number of errors only. `Less` means
    /// `self` is the closer match.
    pub fn compare_errors(&self, other: &Diagnostics) -> Ordering {
        self.error_count().cmp(&other.error_count())
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// Returns the number of diagnostics.
    pub fn len(&self) -> usize {
        self.diags.len()
    }

    /// Returns an iterator over the diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diags
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diag: Diagnostic) -> Self {
        Self { diags: vec![diag] }
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            diags: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diags.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diags.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diag in &self.diags {
            writeln!(f, "{}", diag)?;
        }
        Ok(())
    }
}

/// Computes the edit distance between two strings (Levenshtein distance).
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    let m = a_bytes.len();
    let n = b_bytes.len();

    let mut prev = (0..=n).collect::<Vec<_>>();
    let mut curr = vec![0; n + 1];

    for i in 1..=m {
        curr[0] = i;
        for j in 1..=n {
            let cost = usize::from(a_bytes[i - 1] != b_bytes[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[n]
}

/// Returns the candidate closest to `target`, if any is within a third of
/// the target's length.
pub fn closest_match<'a>(candidates: impl IntoIterator<Item = &'a str>, target: &str) -> Option<&'a str> {
    let limit = (target.len() / 3).max(1);
    candidates
        .into_iter()
        .map(|c| (edit_distance(c, target), c))
        .filter(|(d, _)| *d <= limit)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c)
}

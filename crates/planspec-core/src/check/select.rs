use crate::check::compare::compare;
use crate::diag::Diagnostics;
use crate::path::Path;
use crate::value::Value;

/// A declared record that can be scored against an actual value.
pub trait Candidate {
    /// Declared type, possibly module-qualified (`module.net.aws_vpc`).
    fn type_name(&self) -> &str;
    /// The value compared against the actual one.
    fn declared(&self) -> &Value;
}

/// Returns true if a declared type answers calls for `call_type`. A
/// module-qualified declaration matches on its last segment.
pub fn type_matches(declared: &str, call_type: &str) -> bool {
    declared == call_type
        || declared
            .strip_suffix(call_type)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Picks the candidate whose declared value is closest to `actual`.
///
/// Only candidates whose type matches `type_name` are scored. The one with
/// the fewest errors wins, the first one on ties. A zero-error candidate is
/// returned immediately. Returns `None` when no candidate has the type.
pub fn select_closest<'a, C, I>(type_name: &str, candidates: I, actual: &Value) -> Option<(&'a C, Diagnostics)>
where
    C: Candidate + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let mut best: Option<(&'a C, Diagnostics)> = None;

    for candidate in candidates {
        if !type_matches(candidate.type_name(), type_name) {
            continue;
        }
        let diags = compare(&Path::root(), candidate.declared(), actual);
        let better = match &best {
            None => true,
            Some((_, current)) => diags.compare_errors(current).is_lt(),
        };
        if better {
            let done = !diags.has_errors();
            best = Some((candidate, diags));
            if done {
                break;
            }
        }
    }

    best
}

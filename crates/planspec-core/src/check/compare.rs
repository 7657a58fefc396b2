use crate::check::reject::check_reject;
use crate::diag::{Diagnostic, Diagnostics};
use crate::path::Path;
use crate::value::Value;

/// Attribute name that turns a nested block of an expected value into a
/// rejection of its parent.
pub const REJECT_KEY: &str = "reject";

/// Compares an expected value against an actual one, producing one
/// diagnostic per expected leaf.
///
/// Null (or all-null) expectations are skipped. Named children are found by
/// key in `actual`; unnamed children are matched positionally, sets
/// included.
pub fn compare(path: &Path, expected: &Value, actual: &Value) -> Diagnostics {
    let mut diags = Diagnostics::new();

    if expected.is_primitive() {
        if actual.is_known() && expected == actual {
            diags.add(Diagnostic::success(path.clone(), actual));
        } else {
            diags.add(Diagnostic::mismatch(path.clone(), expected, actual));
        }
        return diags;
    }

    if !expected.is_composite() {
        return diags;
    }
    if !actual.is_composite() {
        diags.error(path.clone(), "Element doesn't have multiple properties");
        return diags;
    }

    let rejectable = matches!(expected, Value::Object(_));
    let mut positional = actual.elements().iter();
    let mut child_index = 0usize;

    for (key, value) in expected.children() {
        if rejectable && key == Some(REJECT_KEY) {
            diags.extend(check_reject(&path.attr(REJECT_KEY), value, actual));
            continue;
        }
        if value.is_absent() {
            continue;
        }
        match key {
            Some(name) => {
                let found = actual.get_attr(name).unwrap_or(&Value::Null);
                diags.extend(compare(&path.attr(name), value, found));
            }
            None => match positional.next() {
                Some(found) => diags.extend(compare(&path.index(child_index), value, found)),
                None => diags.error(
                    path.index(child_index),
                    format!("Could not find child at index {}", child_index),
                ),
            },
        }
        child_index += 1;
    }

    diags
}

/// Unwraps a planned output's one-element sequence.
pub fn planned_output<'a>(path: &Path, planned: &'a Value) -> Result<&'a Value, Diagnostic> {
    if !planned.is_collection() {
        return Err(Diagnostic::error(path.clone(), "Cannot parse planned output"));
    }
    planned
        .elements()
        .first()
        .ok_or_else(|| Diagnostic::error(path.clone(), "Planned output is empty"))
}

/// Checks an output assertion. The expected value must carry a `value`
/// attribute; the planned value is a one-element sequence wrapping the
/// output's after-value.
pub fn check_output(path: &Path, expected: &Value, planned: &Value) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let value = match planned_output(path, planned) {
        Ok(value) => value,
        Err(unreadable) => {
            diags.add(unreadable);
            return diags;
        }
    };
    match expected.get_attr("value") {
        Some(exp) if !exp.is_null() => compare(path, exp, value),
        _ => {
            diags.error(
                path.clone(),
                "Bad Assertion : Assertion on outputs should have a value parameter",
            );
            diags
        }
    }
}

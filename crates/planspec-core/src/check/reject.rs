use crate::check::compare::compare;
use crate::diag::{Diagnostic, Diagnostics};
use crate::path::Path;
use crate::value::Value;

/// Checks that none of the attributes declared in `shape` match `actual`.
///
/// Every diagnostic is stamped with `path`, one per rejected attribute (or
/// per rejected element for collections). A match is an error.
pub fn check_reject(path: &Path, shape: &Value, actual: &Value) -> Diagnostics {
    let mut diags = Diagnostics::new();

    for (key, rejected) in shape.children() {
        let Some(key) = key else {
            continue;
        };
        let found = actual.get_attr(key).unwrap_or(&Value::Null);

        if rejected.is_absent() {
            if found.is_absent() {
                diags.add(not_found(path, key));
            } else {
                diags.add(found_rejected(path, key, rejected, found));
            }
        } else if rejected.is_collection() {
            for element in rejected.elements() {
                if element.is_absent() {
                    continue;
                }
                let matched = found
                    .elements()
                    .iter()
                    .any(|candidate| !compare(path, element, candidate).has_errors());
                if matched {
                    diags.add(found_rejected(path, key, element, found));
                } else {
                    diags.add(not_found(path, key));
                }
            }
        } else if compare(path, rejected, found).has_errors() {
            diags.add(not_found(path, key));
        } else {
            diags.add(found_rejected(path, key, rejected, found));
        }
    }

    diags
}

fn not_found(path: &Path, key: &str) -> Diagnostic {
    Diagnostic::success(path.clone(), format!("No attribute matching {} definition", key))
}

fn found_rejected(path: &Path, key: &str, rejected: &Value, found: &Value) -> Diagnostic {
    Diagnostic::error(
        path.clone(),
        format!("{} matches rejected definition {} : found {}", key, rejected, found),
    )
}

use crate::value::Value;

/// Overlays `overlay` onto `original`.
///
/// The overlay wins wherever it supplies a concrete value. Objects merge
/// attribute by attribute over the original's attributes; collections and
/// maps are replaced whole when the overlay has at least one element.
pub fn merge(original: &Value, overlay: &Value) -> Value {
    match original {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| {
                    let merged = match overlay.get_attr(name) {
                        Some(over) if !over.is_null() && over.is_known() => merge(value, over),
                        _ => value.clone(),
                    };
                    (name.clone(), merged)
                })
                .collect(),
        ),
        Value::List(_) | Value::Set(_) | Value::Map(_) => {
            if overlay.children().next().is_some() {
                overlay.clone()
            } else {
                original.clone()
            }
        }
        _ => {
            if overlay.is_null() || !overlay.is_known() {
                original.clone()
            } else {
                overlay.clone()
            }
        }
    }
}

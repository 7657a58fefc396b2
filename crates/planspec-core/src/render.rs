//! HCL rendering of values, used in fixture usage reports and plan display.
//!
//! Null, unknown and all-null members are left out, so a rendered query
//! shows only what the caller actually sent.

use hcl::expr::{Expression, Object, ObjectKey};
use hcl::{Attribute, Block, Body, Identifier, Number};

use crate::value::Value;

/// Builds an HCL body from an object or map value. Nested objects become
/// blocks, lists and sets of objects become repeated blocks.
pub fn body(value: &Value) -> Body {
    let mut builder = Body::builder();
    for (key, child) in value.children() {
        let Some(key) = key else {
            continue;
        };
        if !renderable(child) {
            continue;
        }
        match child {
            Value::Object(_) => {
                builder = builder.add_block(Block::builder(ident(key)).add_structures(body(child)).build());
            }
            Value::List(items) | Value::Set(items) if items.iter().all(|v| matches!(v, Value::Object(_))) => {
                for item in items.iter().filter(|v| renderable(v)) {
                    builder = builder.add_block(Block::builder(ident(key)).add_structures(body(item)).build());
                }
            }
            _ => {
                if let Some(expr) = expression(child) {
                    builder = builder.add_attribute(Attribute::new(ident(key), expr));
                }
            }
        }
    }
    builder.build()
}

/// Renders a value as HCL attributes and blocks.
pub fn to_hcl(value: &Value) -> String {
    format_body(&body(value))
}

/// Renders a value as a single labelled block, e.g.
/// `resource "aws_instance" "web" { ... }`.
pub fn to_block(identifier: &str, labels: &[&str], value: &Value) -> String {
    let mut builder = Block::builder(ident(identifier));
    for label in labels {
        builder = builder.add_label(*label);
    }
    let block = builder.add_structures(body(value)).build();
    format_body(&Body::builder().add_block(block).build())
}

fn format_body(body: &Body) -> String {
    match hcl::format::to_string(body) {
        Ok(s) => s,
        Err(err) => {
            tracing::debug!(error = %err, "falling back to plain rendering");
            body.iter().map(|s| format!("{:?}\n", s)).collect()
        }
    }
}

fn renderable(value: &Value) -> bool {
    value.is_known() && !value.is_absent()
}

fn ident(key: &str) -> Identifier {
    Identifier::sanitized(key)
}

fn expression(value: &Value) -> Option<Expression> {
    if !renderable(value) {
        return None;
    }
    let expr = match value {
        Value::Bool(b) => Expression::Bool(*b),
        Value::Number(n) => Expression::Number(number(*n)?),
        Value::String(s) => Expression::String(s.clone()),
        Value::List(items) | Value::Set(items) => {
            Expression::Array(items.iter().filter_map(expression).collect())
        }
        Value::Object(fields) | Value::Map(fields) => {
            let object: Object<ObjectKey, Expression> = fields
                .iter()
                .filter_map(|(k, v)| Some((ObjectKey::Expression(Expression::String(k.clone())), expression(v)?)))
                .collect();
            Expression::Object(object)
        }
        Value::Null | Value::Unknown => return None,
    };
    Some(expr)
}

fn number(n: f64) -> Option<Number> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Some(Number::from(n as i64))
    } else {
        Number::from_f64(n)
    }
}

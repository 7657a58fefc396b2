pub mod check;
pub mod diag;
pub mod harness;
pub mod path;
pub mod plan;
pub mod protobuf;
pub mod provider;
pub mod registry;
pub mod render;
pub mod spec;
pub mod value;

pub use diag::{Diagnostic, Diagnostics, Severity};
pub use path::{Path, PathStep};
pub use value::Value;

/// Normalizes a gRPC address string for tonic connection.
/// Ensures the address has an `http://` scheme unless it already has one
/// or uses a Unix socket.
pub fn normalize_grpc_address(addr: &str) -> String {
    if addr.starts_with("unix:") || addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

//! Test case discovery and loading.
//!
//! A case is a directory holding a `spec` document and, beside it, the
//! `plan` recording it is checked against. Both may be YAML or JSON.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use planspec_core::spec::Spec;

use crate::replay::RecordedPlan;

const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

#[derive(Debug, Error)]
pub enum CaseError {
    #[error("No test case found in {0} directory")]
    NoCases(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no plan recording found in {0}")]
    MissingPlan(PathBuf),
}

/// One discovered test case.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub dir: PathBuf,
    pub spec_file: PathBuf,
    pub plan_file: Option<PathBuf>,
}

impl Case {
    /// The case name, taken from its directory.
    pub fn name(&self) -> String {
        self.dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.dir.display().to_string())
    }

    /// Reads and decodes the spec and plan documents.
    pub fn load(&self) -> Result<(Spec, RecordedPlan), CaseError> {
        let spec: Spec = load_document(&self.spec_file)?;
        let plan_file = self
            .plan_file
            .as_ref()
            .ok_or_else(|| CaseError::MissingPlan(self.dir.clone()))?;
        let plan: RecordedPlan = load_document(plan_file)?;
        Ok((spec, plan))
    }
}

/// Finds the cases under `root`: `root` itself, then each immediate
/// sub-directory in name order, wherever a spec document is present.
pub fn discover(root: &Path) -> Result<Vec<Case>, CaseError> {
    let read_err = |source| CaseError::Read {
        path: root.to_path_buf(),
        source,
    };

    let mut dirs = vec![root.to_path_buf()];
    let mut children = Vec::new();
    for entry in std::fs::read_dir(root).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            children.push(path);
        }
    }
    children.sort();
    dirs.extend(children);

    let cases: Vec<Case> = dirs
        .into_iter()
        .filter_map(|dir| {
            let spec_file = find_document(&dir, "spec")?;
            let plan_file = find_document(&dir, "plan");
            Some(Case {
                dir,
                spec_file,
                plan_file,
            })
        })
        .collect();

    if cases.is_empty() {
        return Err(CaseError::NoCases(root.to_path_buf()));
    }
    tracing::debug!(root = %root.display(), count = cases.len(), "test cases discovered");
    Ok(cases)
}

fn find_document(dir: &Path, stem: &str) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

/// Decodes a YAML or JSON document. JSON is read as YAML.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T, CaseError> {
    let source = std::fs::read_to_string(path).map_err(|source| CaseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&source).map_err(|source| CaseError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

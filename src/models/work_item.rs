//! Work item identity and argument derivation.

use std::path::{Path, PathBuf};

/// Template placeholder replaced by the work item path.
pub const WORK_ITEM_PLACEHOLDER: &str = "{work_item}";

/// Template placeholder replaced by the signal identity token.
pub const SIGNAL_NAME_PLACEHOLDER: &str = "{signal_name}";

/// One unit of supervision: a descriptor file that parameterizes a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    path: PathBuf,
    name: String,
    signal_name: String,
}

impl WorkItem {
    /// Build a work item owned by the current supervisor process.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_owner(path, std::process::id())
    }

    /// Build a work item whose identity token embeds `owner_id`.
    ///
    /// The token is `<name>-<owner_id>` restricted to `[A-Za-z0-9_-]`, so it
    /// is a valid local socket name on every platform and distinguishes two
    /// supervisors running the same work item.
    #[must_use]
    pub fn with_owner(path: impl Into<PathBuf>, owner_id: u32) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map_or_else(|| "worker".to_owned(), |s| s.to_string_lossy().into_owned());
        let signal_name = format!("{}-{owner_id}", sanitize(&name));
        Self {
            path,
            name,
            signal_name,
        }
    }

    /// Path to the descriptor file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Human-readable worker name (descriptor file stem).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unique identity token used to address the out-of-band terminate signal.
    #[must_use]
    pub fn signal_name(&self) -> &str {
        &self.signal_name
    }

    /// File name of this worker's output log.
    #[must_use]
    pub fn log_file_name(&self) -> String {
        format!("{}.log", self.name)
    }

    /// Expand an argument template for this work item.
    ///
    /// Every occurrence of [`WORK_ITEM_PLACEHOLDER`] and
    /// [`SIGNAL_NAME_PLACEHOLDER`] is substituted; other text passes through.
    #[must_use]
    pub fn arguments(&self, template: &[String]) -> Vec<String> {
        let work_item = self.path.to_string_lossy();
        template
            .iter()
            .map(|arg| {
                arg.replace(WORK_ITEM_PLACEHOLDER, &work_item)
                    .replace(SIGNAL_NAME_PLACEHOLDER, &self.signal_name)
            })
            .collect()
    }
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "worker".to_owned()
    } else {
        cleaned
    }
}

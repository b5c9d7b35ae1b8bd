//! Playbook versions and the active-version precedence policy.

use serde::{Deserialize, Serialize};

/// One stored revision of the review playbook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookVersion {
    pub id: String,
    #[serde(default, rename = "version_label", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_note: Option<String>,
    /// ISO 8601 timestamp string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Pick the active version from a freshly fetched list.
///
/// Precedence: `preferred` if listed, then `stored` if listed, then the
/// first version. Returns `None` only for an empty list.
pub fn resolve_active<'a>(
    versions: &'a [PlaybookVersion],
    preferred: Option<&str>,
    stored: Option<&str>,
) -> Option<&'a PlaybookVersion> {
    let find = move |id: Option<&str>| id.and_then(|id| versions.iter().find(|v| v.id == id));
    find(preferred).or_else(|| find(stored)).or_else(|| versions.first())
}

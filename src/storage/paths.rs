use std::path::{Path, PathBuf};

/// Map an arbitrary identifier onto a safe single path component.
pub(crate) fn sanitize_component(s: &str) -> String {
    let out: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() { "_".to_string() } else { out }
}

pub(crate) fn collection_dir(root: &Path, collection: &str) -> PathBuf {
    root.join(sanitize_component(collection))
}

pub(crate) fn record_path(root: &Path, collection: &str, id: &str) -> PathBuf {
    collection_dir(root, collection).join(format!("{}.json", sanitize_component(id)))
}

//! Display names for downloaded images.

use std::path::Path;

const MAX_STEM_CHARS: usize = 30;
const MIN_STEM_CHARS: usize = 3;

/// Derive a file name for an image downloaded from `url`.
///
/// Takes the last path segment (query and fragment stripped), drops its
/// extension, keeps at most 30 characters, and appends the validated
/// `extension` (with dot). Stems shorter than 3 characters are replaced by
/// `img_<8 hex>`.
#[must_use]
pub fn name_from_url(url: &str, extension: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let segment = without_query.rsplit('/').next().unwrap_or_default();

    let stem = Path::new(segment)
        .file_stem()
        .map(|s| s.to_string_lossy().chars().take(MAX_STEM_CHARS).collect::<String>())
        .unwrap_or_default();

    if stem.chars().count() < MIN_STEM_CHARS {
        return format!("img_{}{extension}", short_id());
    }
    format!("{stem}{extension}")
}

/// Eight hex characters from a fresh UUID.
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Extension (with dot) of a client-supplied file name, lowercased.
#[must_use]
pub fn dotted_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

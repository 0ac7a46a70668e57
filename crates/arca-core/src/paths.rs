use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the primary configuration directory, or None if the user's home cannot be resolved.
pub fn try_arca_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("ARCA_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".arca"))
}

/// Repository list path: `~/.arca/repositories.toml`
pub fn repositories_path(home: &Path) -> PathBuf {
    home.join("repositories.toml")
}

/// Extract the filename from a URL or path.
pub fn filename_from_url(url: &str) -> &str {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
}

/// The archive suffix of an artifact file name, including the leading dot.
///
/// Compound suffixes such as `.tar.gz` are kept whole. Returns an empty
/// string when the name has no extension.
pub fn artifact_suffix(file_name: &str) -> &str {
    let lower = file_name.to_ascii_lowercase();
    for compound in [".tar.gz", ".tar.zst"] {
        if lower.ends_with(compound) {
            return &file_name[file_name.len() - compound.len()..];
        }
    }
    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(idx) => &file_name[idx..],
    }
}

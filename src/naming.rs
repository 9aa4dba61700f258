//! Filename resolution — derives a collision-free local filename for each
//! asset and tracks names claimed during the current run.

use std::collections::HashSet;
use std::path::Path;

use crate::catalog::AssetRef;

/// Extensions accepted as-is; anything else gets `.jpg` appended.
const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".webp", ".svg"];

/// Maximum filename stem length, keeping well under common filesystem limits
/// even with a collision suffix appended.
const MAX_STEM_LEN: usize = 100;

/// Run-scoped set of filenames already claimed in the destination directory.
/// Monotonic: grows only, never shrinks, for the duration of one run.
#[derive(Debug, Default)]
pub struct NamingState {
    claimed: HashSet<String>,
}

impl NamingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.claimed.contains(name)
    }

    fn claim(&mut self, name: &str) -> bool {
        self.claimed.insert(name.to_string())
    }
}

/// Outcome of name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub filename: String,
    /// The resolved file already exists non-empty in the destination — the
    /// orchestrator skips the asset without any network call.
    pub already_present: bool,
}

/// Resolve a collision-free filename for `asset` inside `directory`.
///
/// Base name is the last path segment of the source location with query and
/// fragment stripped; an empty segment falls back to the sanitized display
/// name. The winning name is claimed in `state` immediately and irrevocably.
///
/// The on-disk existence check runs before the collision loop: an unclaimed
/// candidate whose file already exists non-empty resolves to that name with
/// `already_present` set, which is what makes re-runs over a partially
/// completed directory cheap. Zero-byte leftovers instead trigger the `_N`
/// collision suffix so a fresh name is used.
pub fn resolve(asset: &AssetRef, directory: &Path, state: &mut NamingState) -> ResolvedName {
    let (stem, ext) = base_name(asset);

    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            format!("{stem}{ext}")
        } else {
            format!("{stem}_{counter}{ext}")
        };

        if !state.is_claimed(&candidate) {
            let on_disk = directory.join(&candidate);
            let disk_len = std::fs::metadata(&on_disk).map(|m| m.len()).ok();
            match disk_len {
                Some(len) if len > 0 => {
                    state.claim(&candidate);
                    return ResolvedName {
                        filename: candidate,
                        already_present: true,
                    };
                }
                Some(_) => {
                    // zero-byte leftover, fall through to the next suffix
                }
                None => {
                    state.claim(&candidate);
                    return ResolvedName {
                        filename: candidate,
                        already_present: false,
                    };
                }
            }
        }
        counter += 1;
    }
}

/// Split an asset's base name into (sanitized stem, extension).
fn base_name(asset: &AssetRef) -> (String, String) {
    let location = asset.source_location.as_str();

    // Last path segment, query string and fragment stripped.
    let no_query = location
        .split_once('?')
        .map_or(location, |(head, _)| head);
    let no_fragment = no_query.split_once('#').map_or(no_query, |(head, _)| head);
    let segment = no_fragment.rsplit('/').next().unwrap_or("");

    // Fallback chain: path segment, display name, then the catalog id so an
    // asset can never resolve to a bare ".jpg".
    let raw = if !segment.is_empty() {
        segment
    } else if !asset.display_name.is_empty() {
        asset.display_name.as_str()
    } else {
        asset.id.as_str()
    };
    let clean = sanitize(raw);

    match allowed_extension(&clean) {
        Some(ext) => {
            let stem = truncate(&clean[..clean.len() - ext.len()]);
            (stem, ext.to_ascii_lowercase())
        }
        None => (truncate(&clean), ".jpg".to_string()),
    }
}

/// Replace characters illegal in filenames with `_`.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// The trailing extension of `name` if it is in the allow-list.
fn allowed_extension(name: &str) -> Option<&str> {
    let dot = name.rfind('.')?;
    let ext = &name[dot..];
    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        .then_some(ext)
}

/// Truncate a stem to at most `MAX_STEM_LEN` characters, on a char boundary.
fn truncate(stem: &str) -> String {
    stem.chars().take(MAX_STEM_LEN).collect()
}

//! Artifact naming scheme.
//!
//! Produced names follow `{sanitized_base}_{tag}_{shortid}.{ext}`, where the
//! short id is the owning job's correlation token. Batch outputs live under a
//! directory named the same way minus the extension, with members indexed as
//! `{base}_page_{n}.{ext}`. Collisions across concurrent jobs are avoided
//! statistically by the short id, never detected or retried.

use std::path::Path;

/// Maximum length of a sanitized stem.
const MAX_STEM_LEN: usize = 200;

/// Maximum length of a preserved extension.
const MAX_EXT_LEN: usize = 10;

/// Sanitize a filename stem for safe filesystem usage.
///
/// Keeps alphanumerics, `-`, `_` and `.`, maps whitespace to `_`, and drops
/// everything else including path separators and control characters. Falls
/// back to `"unnamed_file"` when nothing survives.
pub fn sanitize_stem(filename: &str) -> String {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else if c.is_whitespace() {
                '_'
            } else {
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .take(MAX_STEM_LEN)
        .collect();

    if sanitized.is_empty() {
        "unnamed_file".to_string()
    } else {
        sanitized
    }
}

/// Extract a safe lowercase extension from a declared filename, without the
/// leading dot. Returns an empty string when there is none worth keeping.
pub fn sanitize_ext(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(MAX_EXT_LEN)
                .collect::<String>()
                .to_lowercase()
        })
        .unwrap_or_default()
}

/// Flat output name: `{base}_{tag}_{id}.{ext}` (no dot when `ext` is empty).
pub fn output_name(base: &str, tag: &str, id: &str, ext: &str) -> String {
    let stem = format!("{}_{}_{}", sanitize_stem(base), tag, id);
    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

/// Batch directory name: `{base}_{tag}_{id}`.
pub fn batch_dir_name(base: &str, tag: &str, id: &str) -> String {
    format!("{}_{}_{}", sanitize_stem(base), tag, id)
}

/// Indexed member name inside a batch directory: `{base}_page_{n}.{ext}`.
pub fn page_name(base: &str, index: usize, ext: &str) -> String {
    format!("{}_page_{}.{}", sanitize_stem(base), index, ext)
}

/// Whether a string is usable as a single path component. Rejects empty
/// strings, path separators, and the dot/dot-dot traversal components.
pub fn is_safe_component(component: &str) -> bool {
    !component.is_empty()
        && component != "."
        && component != ".."
        && !component.contains('/')
        && !component.contains('\\')
        && !component.contains('\0')
}

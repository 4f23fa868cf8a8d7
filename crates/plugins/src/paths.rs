//! Path and slug helpers shared by asset serving, markdown lookup and includes

use std::path::{Path, PathBuf};

/// Clean `path` as if it were rooted at `/` and return it relative to that root.
///
/// `..` can never climb above the root, so the result is always safe to join
/// onto a plugin directory. Backslashes count as separators too.
pub fn clean_rooted(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Join a cleaned relative path onto `base`.
pub fn join_clean(base: &Path, path: &str) -> PathBuf {
    let rel = clean_rooted(path);
    if rel.is_empty() {
        base.to_path_buf()
    } else {
        base.join(rel)
    }
}

/// Relative path of `path` under `base` using forward slashes.
pub fn relative_slash(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// URL slug: lowercase alphanumerics separated by single dashes.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut dash = false;
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if dash && !slug.is_empty() {
                slug.push('-');
            }
            dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            dash = true;
        }
    }
    slug
}

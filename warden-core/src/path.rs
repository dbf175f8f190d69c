//! # Path Naming
//!
//! Nodes live in a `/`-separated tree. Sequential nodes carry a store-assigned,
//! zero-padded decimal suffix (`c_0000000007`) that totally orders siblings
//! created under the same parent.

use crate::{CoordinationError, CoordinationResult};
use std::cmp::Ordering;

/// Checks that `path` is absolute, has no empty or relative segments and no
/// trailing slash (except for the root itself).
pub fn validate_path(path: &str) -> CoordinationResult<()> {
    if !path.starts_with('/') {
        return Err(CoordinationError::invalid_path(path, "must start with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(CoordinationError::invalid_path(path, "must not end with '/'"));
    }
    if path.contains('\0') {
        return Err(CoordinationError::invalid_path(path, "contains a null byte"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(CoordinationError::invalid_path(path, "empty segment")),
            "." | ".." => {
                return Err(CoordinationError::invalid_path(path, "relative segment"))
            }
            _ => {}
        }
    }
    Ok(())
}

/// Joins a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent of `path`, or `None` for the root.
pub fn parent_of(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`.
pub fn name_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Parses the trailing decimal run of a node name.
///
/// ```rust
/// use warden_core::sequence_of;
///
/// assert_eq!(sequence_of("c_0000000042"), Some(42));
/// assert_eq!(sequence_of("registry"), None);
/// ```
pub fn sequence_of(name: &str) -> Option<u64> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Sorts sibling names ascending by sequence number. Names without a suffix
/// go last, in lexical order.
pub fn sort_by_sequence(names: &mut [String]) {
    names.sort_by(|a, b| match (sequence_of(a), sequence_of(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}

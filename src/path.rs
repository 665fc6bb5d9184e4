//! Path helpers
//!
//! Every path handled by the dispatcher is a `/`-separated string rooted at the
//! storage root. These helpers put paths into one canonical form so that cache
//! keys built from them are unique per object.

/// Normalize a path: leading `/`, no `.`/`..` or empty segments, no trailing `/`
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return "/".to_string();
    }

    let mut out = String::with_capacity(path.len() + 1);
    for part in parts {
        out.push('/');
        out.push_str(part);
    }
    out
}

/// Join a child onto a parent and normalize the result
pub fn join(parent: &str, child: &str) -> String {
    normalize(&format!("{}/{}", parent, child))
}

/// Split a path into its parent directory and final name
///
/// The root splits into `("/", "")`.
pub fn split(path: &str) -> (String, String) {
    let path = normalize(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Whether `ancestor` equals `path` or contains it
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    let ancestor = normalize(ancestor);
    let path = normalize(path);
    if ancestor == "/" || ancestor == path {
        return true;
    }
    path.strip_prefix(&ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether `path` lies under `root` but under none of the `nested` roots
pub fn owns(root: &str, nested: &[String], path: &str) -> bool {
    is_ancestor(root, path) && !nested.iter().any(|n| is_ancestor(n, path))
}

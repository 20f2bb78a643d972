//! Mapping between local paths and bucket keys.
//!
//! Keys always use forward slashes, so both sides are normalized to `/`
//! before any comparison. That keeps the mapping identical on hosts that use
//! `\` as their separator.

use crate::SyncError;

/// Returns the bucket key for `local_path`, a file somewhere under
/// `source_root`.
///
/// `source_root` may carry a trailing separator or a leading `./`; neither
/// shows up in the result. An empty `dest_prefix` maps files to the bucket
/// root.
#[must_use]
pub fn remote_path(dest_prefix: &str, local_path: &str, source_root: &str) -> String {
    let relative = relative_path(&normalize(local_path), &normalize(source_root));
    if dest_prefix.is_empty() {
        relative
    } else {
        format!("{dest_prefix}/{relative}")
    }
}

/// Splits `bucket/key/prefix` into the bucket name and key prefix.
///
/// Everything before the first `/` is the bucket; everything after it
/// (possibly empty) is the prefix.
///
/// # Errors
///
/// Returns [`SyncError::InvalidDestination`] if `dest` is blank.
pub fn split_destination(dest: &str) -> Result<(String, String), SyncError> {
    let dest = dest.trim();
    if dest.is_empty() {
        return Err(SyncError::InvalidDestination {
            destination: dest.to_string(),
        });
    }

    Ok(dest.split_once('/').map_or_else(
        || (dest.to_string(), String::new()),
        |(bucket, prefix)| (bucket.to_string(), prefix.to_string()),
    ))
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// Lexical path components with `.` dropped and `..` folded where possible.
fn components(path: &str) -> (bool, Vec<&str>) {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }
    (absolute, parts)
}

/// `path` relative to `root`, both already using `/`. Paths outside `root`
/// come back with leading `..` components.
fn relative_path(path: &str, root: &str) -> String {
    let (_, path_parts) = components(path);
    let (_, root_parts) = components(root);

    let common = path_parts
        .iter()
        .zip(&root_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let parts: Vec<&str> = std::iter::repeat_n("..", root_parts.len() - common)
        .chain(path_parts[common..].iter().copied())
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_path_cases() {
        let cases = [
            (("", "a", ""), "a"),
            (("a", "b", ""), "a/b"),
            (("a", "b/c", "b"), "a/c"),
            (("a", "b/c/d/e", "b"), "a/c/d/e"),
            (("a", "b/c/d/e", "b/c/d"), "a/e"),
            (("", "./b", ""), "b"),
            (("", "./b", "./"), "b"),
            (("a", "./b", "./"), "a/b"),
            (("", "b\\c\\d", ""), "b/c/d"),
            (("", ".\\b\\c\\d", ".\\"), "b/c/d"),
            (("a/b", "c\\d", "."), "a/b/c/d"),
            (("a/b", "c\\d\\e", "c\\d"), "a/b/e"),
            (("", "/srv/site/x/y.html", "/srv/site/"), "x/y.html"),
        ];
        for ((prefix, local, root), expected) in cases {
            assert_eq!(
                remote_path(prefix, local, root),
                expected,
                "remote_path({prefix:?}, {local:?}, {root:?})"
            );
        }
    }

    #[test]
    fn stripping_the_prefix_recovers_the_relative_path() {
        let cases = [
            ("site", "public/a/b.html", "public", "a/b.html"),
            ("site/v2", ".\\public\\img\\x.png", ".\\public\\", "img/x.png"),
            ("p", "./root/./nested/../file", "./root", "file"),
        ];
        for (prefix, local, root, relative) in cases {
            let key = remote_path(prefix, local, root);
            let stripped = key.strip_prefix(&format!("{prefix}/")).unwrap();
            assert_eq!(stripped, relative);
        }
    }

    #[test]
    fn split_destination_cases() {
        let cases = [
            ("bucket/a/b/c", ("bucket", "a/b/c")),
            ("bucket/a/b/c/", ("bucket", "a/b/c/")),
            ("bucket/", ("bucket", "")),
            ("bucket", ("bucket", "")),
            ("  bucket/x  ", ("bucket", "x")),
            (
                "bucket/\u{767e}\u{5ea6}\u{4e91}",
                ("bucket", "\u{767e}\u{5ea6}\u{4e91}"),
            ),
        ];
        for (dest, (bucket, prefix)) in cases {
            assert_eq!(
                split_destination(dest).unwrap(),
                (bucket.to_string(), prefix.to_string())
            );
        }
    }

    #[test]
    fn split_destination_rejects_blank() {
        assert!(matches!(
            split_destination(""),
            Err(SyncError::InvalidDestination { .. })
        ));
        assert!(matches!(
            split_destination("   "),
            Err(SyncError::InvalidDestination { .. })
        ));
    }
}

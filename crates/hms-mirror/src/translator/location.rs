//! Namespace and path helpers for HCFS location strings.
//!
//! A location looks like `scheme://authority/path/segments`. The namespace is
//! the `scheme://authority` head (an HDFS nameservice, `host:port`, or an
//! object-store bucket). Everything else is the namespace-relative path.

use regex::Regex;
use std::sync::LazyLock;

static NAMESPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^/?#\s]*").expect("namespace pattern is valid")
});

/// The `scheme://authority` prefix of a location, if it has one.
///
/// `hdfs://nameservice1/user/hive` yields `hdfs://nameservice1`;
/// `hdfs://host:8020/warehouse` keeps the port.
pub fn namespace(location: &str) -> Option<&str> {
    NAMESPACE.find(location.trim()).map(|m| m.as_str())
}

/// Remove the namespace, returning an absolute relative path without a
/// trailing slash. A location consisting of only a namespace yields `/`.
pub fn strip_namespace(location: &str) -> String {
    let trimmed = location.trim();
    let rest = match namespace(trimmed) {
        Some(ns) => &trimmed[ns.len()..],
        None => trimmed,
    };
    normalize_path(rest)
}

/// Swap the namespace of `location` for `new_namespace`.
pub fn replace_namespace(location: &str, new_namespace: &str) -> String {
    let path = strip_namespace(location);
    join_namespace(new_namespace, &path)
}

/// Join a namespace and an absolute path, normalizing the slash between them.
pub fn join_namespace(namespace: &str, path: &str) -> String {
    let ns = namespace.trim().trim_end_matches('/');
    let path = normalize_path(path);
    if path == "/" {
        ns.to_string()
    } else {
        format!("{ns}{path}")
    }
}

/// Ensure a single leading slash and no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Remove the trailing `level` path segments of a URL-like string.
///
/// Trailing slashes are tolerated and stripping never reaches into the
/// namespace: `hdfs://ns/a/b/` reduced by 5 is `hdfs://ns`.
pub fn reduce_url_by(url: &str, level: usize) -> String {
    let mut current = url.trim().trim_end_matches('/').to_string();
    let floor = namespace(&current).map(str::len).unwrap_or(0);

    for _ in 0..level {
        match current.rfind('/') {
            Some(idx) if idx >= floor && idx + 1 < current.len() => {
                current.truncate(idx);
                let trimmed_len = current.trim_end_matches('/').len();
                current.truncate(trimmed_len.max(floor));
            }
            _ => break,
        }
    }
    current
}

/// Final non-empty path segment, ignoring any query string.
pub fn last_directory(url: &str) -> Option<String> {
    let trimmed = url.trim();
    let floor = namespace(trimmed).map(str::len).unwrap_or(0);
    let path = trimmed[floor..].split('?').next().unwrap_or_default();
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Parent directory of a location (the location reduced by one segment).
pub fn parent_directory(url: &str) -> String {
    reduce_url_by(url, 1)
}

/// Replace the final path segment with `segment`.
pub fn with_last_segment(path: &str, segment: &str) -> String {
    let parent = parent_directory(path);
    format!("{}/{}", parent.trim_end_matches('/'), segment)
}

/// True when `prefix` equals `path` or is a whole-segment prefix of it.
pub fn is_path_prefix(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path == prefix
        || (path.starts_with(prefix) && path.as_bytes().get(prefix.len()) == Some(&b'/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_detection() {
        assert_eq!(
            namespace("hdfs://nameservice1/user/hive/warehouse"),
            Some("hdfs://nameservice1")
        );
        assert_eq!(
            namespace("hdfs://nameservice1:8020/user/hive"),
            Some("hdfs://nameservice1:8020")
        );
        assert_eq!(namespace("s3a://my-bucket/data"), Some("s3a://my-bucket"));
        assert_eq!(namespace("ofs://ozone1.vol/bucket"), Some("ofs://ozone1.vol"));
        assert_eq!(namespace("/warehouse/tablespace"), None);
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(
            strip_namespace("hdfs://LEFT/apps/hive/warehouse/tpcds_09.db"),
            "/apps/hive/warehouse/tpcds_09.db"
        );
        assert_eq!(strip_namespace("hdfs://LEFT/tpcds_base_dir/"), "/tpcds_base_dir");
        assert_eq!(strip_namespace("hdfs://LEFT"), "/");
        assert_eq!(strip_namespace("relative/path"), "/relative/path");
    }

    #[test]
    fn test_replace_namespace() {
        assert_eq!(
            replace_namespace("hdfs://LEFT/apps/hive/warehouse/tpcds_09.db", "hdfs://RIGHT/"),
            "hdfs://RIGHT/apps/hive/warehouse/tpcds_09.db"
        );
        assert_eq!(
            replace_namespace("/warehouse/t1", "s3a://bucket"),
            "s3a://bucket/warehouse/t1"
        );
    }

    #[test]
    fn test_reduce_url_with_trailing_slash() {
        assert_eq!(
            reduce_url_by("hdfs://ns/warehouse/my.db/call/", 1),
            "hdfs://ns/warehouse/my.db"
        );
    }

    #[test]
    fn test_reduce_url_by_levels() {
        let url = "hdfs://apps/hive/warehouse/my.db/call";
        assert_eq!(reduce_url_by(url, 0), url);
        assert_eq!(reduce_url_by(url, 1), "hdfs://apps/hive/warehouse/my.db");
        assert_eq!(reduce_url_by(url, 2), "hdfs://apps/hive/warehouse");
        assert_eq!(reduce_url_by(url, 10), "hdfs://apps");
        assert_eq!(reduce_url_by("/a/b/c", 2), "/a");
        assert_eq!(reduce_url_by("/a/b//c/", 1), "/a/b");
    }

    #[test]
    fn test_last_and_parent_directory() {
        let url = "hdfs://apps/hive/warehouse/my.db/call";
        assert_eq!(last_directory(url).as_deref(), Some("call"));
        assert_eq!(last_directory("hdfs://ns/a/b/?x=1").as_deref(), Some("b"));
        assert_eq!(last_directory("hdfs://ns"), None);
        assert_eq!(parent_directory(url), "hdfs://apps/hive/warehouse/my.db");
    }

    #[test]
    fn test_with_last_segment() {
        assert_eq!(with_last_segment("/data/old_name", "new_name"), "/data/new_name");
        assert_eq!(with_last_segment("/only", "renamed"), "/renamed");
    }

    #[test]
    fn test_is_path_prefix_respects_segments() {
        assert!(is_path_prefix("/tpcds_base_dir", "/tpcds_base_dir"));
        assert!(is_path_prefix("/tpcds_base_dir/", "/tpcds_base_dir/web"));
        assert!(!is_path_prefix("/tpcds_base_dir", "/tpcds_base_dir2/web"));
    }
}

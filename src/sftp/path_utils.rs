//! Remote path utilities for SFTP operations
//!
//! Remote SFTP paths always use `/` as separator (per SFTP protocol), even
//! on Windows SSH servers.

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Directory containing `path`, or `None` when there is nothing to create
/// (a bare file name or the root itself).
pub fn parent_remote_path(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = trimmed[..idx].trim_end_matches('/');
    if parent.is_empty() {
        // "/file" lives directly under the root
        return None;
    }
    Some(parent.to_string())
}

/// Every directory from the top down to `dir` itself
///
/// `"/srv/app/conf"` yields `["/srv", "/srv/app", "/srv/app/conf"]`.
pub fn remote_ancestors(dir: &str) -> Vec<String> {
    let mut current = if is_absolute_remote_path(dir) {
        String::from("/")
    } else {
        String::new()
    };

    let mut out = Vec::new();
    for component in dir.split('/').filter(|c| !c.is_empty() && *c != ".") {
        current = if current.is_empty() {
            component.to_string()
        } else {
            join_remote_path(&current, component)
        };
        out.push(current.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_absolute_remote_path() {
        assert!(is_absolute_remote_path("/home/user"));
        assert!(is_absolute_remote_path("/"));
        assert!(!is_absolute_remote_path("relative/path"));
        assert!(!is_absolute_remote_path("C:\\Windows")); // Not a remote absolute path
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/home", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/home/", "file.txt"), "/home/file.txt");
        assert_eq!(join_remote_path("/", "home"), "/home");
    }

    #[test]
    fn test_parent_remote_path() {
        assert_eq!(parent_remote_path("/etc/app/app.conf").as_deref(), Some("/etc/app"));
        assert_eq!(parent_remote_path("conf/app.conf").as_deref(), Some("conf"));
        assert_eq!(parent_remote_path("/etc//app.conf").as_deref(), Some("/etc"));
        assert_eq!(parent_remote_path("/app.conf"), None);
        assert_eq!(parent_remote_path("app.conf"), None);
        assert_eq!(parent_remote_path("/"), None);
    }

    #[test]
    fn test_remote_ancestors() {
        assert_eq!(
            remote_ancestors("/srv/app/conf"),
            vec!["/srv", "/srv/app", "/srv/app/conf"]
        );
        assert_eq!(remote_ancestors("a/./b"), vec!["a", "a/b"]);
        assert!(remote_ancestors("/").is_empty());
    }
}

//! Request path resolution confined to the output directory
//!
//! A request target is split into segments, each segment is percent-decoded
//! and must decode to a single plain path component. Anything else (`..`,
//! encoded separators, NUL bytes, drive prefixes) sends the request to the
//! SPA fallback. The joined path is canonicalized and must still live under
//! the canonical root, which also catches symlinks that point outside.

use percent_encoding::percent_decode_str;
use std::io;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Outcome of resolving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A regular file inside the root
    File(PathBuf),
    /// Serve the entry document instead
    Fallback,
}

/// Maps request targets onto files below a canonical root
#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
    entry: PathBuf,
}

impl Resolver {
    /// Canonicalizes `root`; fails when it does not exist.
    pub fn new(root: &Path, entry: &str) -> io::Result<Self> {
        let root = root.canonicalize()?;
        let entry = root.join(entry);
        Ok(Self { root, entry })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the entry document
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    pub fn resolve(&self, target: &str) -> Resolution {
        let relative = match relative_path(target) {
            Some(relative) => relative,
            None => return Resolution::Fallback,
        };
        if relative.as_os_str().is_empty() {
            return Resolution::File(self.entry.clone());
        }

        let candidate = self.root.join(relative);
        match candidate.canonicalize() {
            Ok(path) if path.starts_with(&self.root) && path.is_file() => Resolution::File(path),
            _ => Resolution::Fallback,
        }
    }
}

/// Converts a raw request target into a relative path, or `None` when the
/// target contains anything but plain segments.
pub fn relative_path(target: &str) -> Option<PathBuf> {
    let path = if target.starts_with("http://") || target.starts_with("https://") {
        Url::parse(target).ok()?.path().to_string()
    } else {
        let end = target.find(['?', '#']).unwrap_or(target.len());
        target[..end].to_string()
    };

    let mut relative = PathBuf::new();
    for raw in path.split('/') {
        let segment = percent_decode_str(raw).decode_utf8().ok()?;
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment.contains(['/', '\\', '\0']) {
            return None;
        }
        let mut components = Path::new(&*segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return None,
        }
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn site() -> (tempfile::TempDir, Resolver) {
        let dir = tempdir().unwrap();
        let dist = dir.path().join("dist");
        fs::create_dir_all(dist.join("assets")).unwrap();
        fs::write(dist.join("index.html"), "<div id=\"root\"></div>").unwrap();
        fs::write(dist.join("assets").join("app.js"), "console.log(1)").unwrap();
        fs::write(dist.join("résumé.pdf"), "%PDF").unwrap();
        fs::write(dir.path().join("secret.txt"), "top secret").unwrap();
        let resolver = Resolver::new(&dist, "index.html").unwrap();
        (dir, resolver)
    }

    #[test]
    fn root_maps_to_entry() {
        let (_dir, r) = site();
        assert_eq!(r.resolve("/"), Resolution::File(r.entry().to_path_buf()));
        assert_eq!(r.resolve(""), Resolution::File(r.entry().to_path_buf()));
        assert_eq!(r.resolve("/?utm_source=x"), Resolution::File(r.entry().to_path_buf()));
    }

    #[test]
    fn existing_asset_resolves() {
        let (_dir, r) = site();
        assert_eq!(r.resolve("/assets/app.js"), Resolution::File(r.root().join("assets").join("app.js")));
        assert_eq!(r.resolve("/assets/./app.js?v=3#x"), Resolution::File(r.root().join("assets").join("app.js")));
    }

    #[test]
    fn percent_encoded_names_are_decoded() {
        let (_dir, r) = site();
        assert_eq!(r.resolve("/r%C3%A9sum%C3%A9.pdf"), Resolution::File(r.root().join("résumé.pdf")));
    }

    #[test]
    fn unknown_route_falls_back() {
        let (_dir, r) = site();
        assert_eq!(r.resolve("/not-a-real-route"), Resolution::Fallback);
        assert_eq!(r.resolve("/projects/42"), Resolution::Fallback);
    }

    #[test]
    fn directories_fall_back() {
        let (_dir, r) = site();
        assert_eq!(r.resolve("/assets"), Resolution::Fallback);
        assert_eq!(r.resolve("/assets/"), Resolution::Fallback);
    }

    #[test]
    fn traversal_never_leaves_root() {
        let (_dir, r) = site();
        for target in [
            "/../secret.txt",
            "/assets/../../secret.txt",
            "/%2e%2e/secret.txt",
            "/%2E%2E/secret.txt",
            "/assets/..%2f..%2fsecret.txt",
            "/..%5csecret.txt",
            "/secret.txt%00.html",
        ] {
            assert_eq!(r.resolve(target), Resolution::Fallback, "target {target}");
        }
    }

    #[test]
    fn absolute_form_targets_use_the_path() {
        let (_dir, r) = site();
        assert_eq!(
            r.resolve("http://127.0.0.1:4173/assets/app.js"),
            Resolution::File(r.root().join("assets").join("app.js"))
        );
        assert_eq!(r.resolve("http://127.0.0.1:4173/../secret.txt"), Resolution::Fallback);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_falls_back() {
        let (dir, r) = site();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), r.root().join("leak.txt")).unwrap();
        assert_eq!(r.resolve("/leak.txt"), Resolution::Fallback);
    }

    #[test]
    fn relative_path_rejects_dot_dot() {
        assert_eq!(relative_path("/a/../b"), None);
        assert_eq!(relative_path("/a/b"), Some(PathBuf::from("a").join("b")));
        assert_eq!(relative_path("//a///b/"), Some(PathBuf::from("a").join("b")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Resolver::new(&dir.path().join("nope"), "index.html").is_err());
    }
}

//! Trace instances.
//!
//! The root instance is the tracefs mount itself. Child instances live under
//! `<root>/instances/<name>` and are created and removed with plain `mkdir` and
//! `rmdir`; the kernel populates and tears down their contents. An [`Instance`]
//! is only a descriptor, it holds no open files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fsio;

/// Name reported for the root instance.
pub const ROOT_INSTANCE_NAME: &str = "*Default*";

const INSTANCES_DIR: &str = "instances";

/// Reject names that would not stay a single entry below their parent
/// directory once joined onto it.
pub(crate) fn check_name(op: &'static str, what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::invalid_op(op, format!("invalid {} name {:?}", what, name)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    is_root: bool,
    path: PathBuf,
    name: String,
}

impl Instance {
    /// The root instance for a tracefs mounted at `path`.
    pub fn root(path: impl Into<PathBuf>) -> Self {
        Instance {
            is_root: true,
            path: path.into(),
            name: ROOT_INSTANCE_NAME.to_string(),
        }
    }

    fn child(root: &Path, name: &str) -> Self {
        Instance {
            is_root: false,
            path: root.join(INSTANCES_DIR).join(name),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Path of a control file relative to this instance.
    pub(crate) fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// List the child instances. Order follows the directory listing and is
    /// not sorted.
    pub fn child_instances(&self) -> Result<Vec<Instance>> {
        if !self.is_root {
            return Err(Error::invalid_op(
                "child_instances",
                "cannot get child instances of a non-root instance",
            ));
        }

        let names = fsio::list_dir(&self.path.join(INSTANCES_DIR))?;
        Ok(names
            .iter()
            .map(|name| Instance::child(&self.path, name))
            .collect())
    }

    /// Create a new child instance. Only valid on the root instance.
    pub fn new_instance(&self, name: &str) -> Result<Instance> {
        if !self.is_root {
            return Err(Error::invalid_op(
                "new_instance",
                "must be called on a root instance",
            ));
        }

        check_name("new_instance", "instance", name)?;
        let child = Instance::child(&self.path, name);
        fsio::make_dir(&child.path)?;
        tracing::info!("Created trace instance {} at {}", name, child.path.display());
        Ok(child)
    }

    /// Descriptor for an existing child instance, without creating it.
    pub fn instance(&self, name: &str) -> Result<Instance> {
        if !self.is_root {
            return Err(Error::invalid_op(
                "instance",
                "must be called on a root instance",
            ));
        }

        check_name("instance", "instance", name)?;
        let child = Instance::child(&self.path, name);
        fsio::metadata(&child.path)?;
        Ok(child)
    }

    /// Remove this instance. The root instance cannot be destroyed.
    pub fn destroy(&self) -> Result<()> {
        if self.is_root {
            return Err(Error::invalid_op(
                "destroy",
                "cannot destroy the root instance",
            ));
        }

        if let Err(err) = fsio::remove_dir(&self.path) {
            if err.io_error().and_then(|e| e.raw_os_error()) == Some(libc::EBUSY) {
                tracing::warn!(
                    "Instance {} is busy, close any open trace_pipe readers first",
                    self.name
                );
            }
            return Err(err);
        }
        tracing::info!("Destroyed trace instance {}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_root() -> (TempDir, Instance) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("instances")).unwrap();
        let root = Instance::root(dir.path());
        (dir, root)
    }

    #[test]
    fn test_root_instance() {
        let root = Instance::root("/sys/kernel/tracing");
        assert!(root.is_root());
        assert_eq!(root.name(), ROOT_INSTANCE_NAME);
        assert_eq!(root.path(), Path::new("/sys/kernel/tracing"));
    }

    #[test]
    fn test_new_instance_path() {
        let (_dir, root) = fake_root();
        let child = root.new_instance("probe1").unwrap();
        assert!(!child.is_root());
        assert_eq!(child.name(), "probe1");
        assert_eq!(child.path(), root.path().join("instances").join("probe1"));
        assert!(child.path().is_dir());
    }

    #[test]
    fn test_new_instance_twice_fails() {
        let (_dir, root) = fake_root();
        root.new_instance("dup").unwrap();
        let err = root.new_instance("dup").unwrap_err();
        assert_eq!(
            err.io_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::AlreadyExists)
        );
    }

    #[test]
    fn test_child_operations_on_non_root() {
        let (_dir, root) = fake_root();
        let child = root.new_instance("a").unwrap();
        assert!(child.child_instances().unwrap_err().is_invalid_operation());
        assert!(child.new_instance("b").unwrap_err().is_invalid_operation());
        assert!(child.instance("a").unwrap_err().is_invalid_operation());
    }

    #[test]
    fn test_child_instances_on_non_root_without_mount() {
        // No filesystem behind the path at all, the check happens first.
        let child = Instance::child(Path::new("/nonexistent/tracing"), "x");
        assert!(child.child_instances().unwrap_err().is_invalid_operation());
    }

    #[test]
    fn test_child_instances_lists_entries() {
        let (_dir, root) = fake_root();
        root.new_instance("one").unwrap();
        root.new_instance("two").unwrap();
        let mut names: Vec<String> = root
            .child_instances()
            .unwrap()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["one", "two"]);
        for child in root.child_instances().unwrap() {
            assert!(!child.is_root());
            assert_eq!(child.path(), root.path().join("instances").join(child.name()));
        }
    }

    #[test]
    fn test_child_instances_missing_mount() {
        let root = Instance::root("/nonexistent/tracing");
        let err = root.child_instances().unwrap_err();
        assert!(err.io_error().is_some());
    }

    #[test]
    fn test_destroy_root_fails() {
        let (dir, root) = fake_root();
        assert!(root.destroy().unwrap_err().is_invalid_operation());
        assert!(dir.path().join("instances").is_dir());
    }

    #[test]
    fn test_destroy_leaves_siblings() {
        let (_dir, root) = fake_root();
        let a = root.new_instance("a").unwrap();
        root.new_instance("b").unwrap();
        a.destroy().unwrap();
        let names: Vec<String> = root
            .child_instances()
            .unwrap()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        assert_eq!(names, vec!["b"]);
        assert!(a.destroy().is_err());
    }

    #[test]
    fn test_bad_instance_names() {
        let (dir, root) = fake_root();
        let outside = TempDir::new().unwrap();
        let absolute = outside.path().join("victim");
        let absolute = absolute.to_str().unwrap();
        for name in [absolute, "/tmp/x", "../x", "..", ".", "", "a/b"] {
            let err = root.new_instance(name).unwrap_err();
            assert!(err.is_invalid_operation(), "{:?} should be rejected", name);
            let err = root.instance(name).unwrap_err();
            assert!(err.is_invalid_operation(), "{:?} should be rejected", name);
        }
        assert!(!outside.path().join("victim").exists());
        assert!(!dir.path().join("x").exists());
        assert!(root.child_instances().unwrap().is_empty());
    }

    #[test]
    fn test_lookup_instance() {
        let (_dir, root) = fake_root();
        root.new_instance("existing").unwrap();
        let found = root.instance("existing").unwrap();
        assert_eq!(found.name(), "existing");
        assert!(root.instance("missing").unwrap_err().io_error().is_some());
    }
}

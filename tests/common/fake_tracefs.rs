//! A directory tree shaped like a tracefs mount.
//!
//! The real kernel creates the per-instance control files when an instance
//! directory is made, and the `events/` tree when a uprobe is registered. The
//! fake tree does neither on its own, tests call `populate_instance` and
//! `register_event_dir` to stand in for the kernel.
//!
//! # Example
//!
//! ```ignore
//! let fake = FakeTracefs::new();
//! let root = fake.root();
//! let child = root.new_instance("probe1")?;
//! fake.populate_instance(child.path());
//! ```

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use tracefs::{Instance, TracefsConfig};

pub struct FakeTracefs {
    dir: TempDir,
}

impl FakeTracefs {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("instances")).expect("Failed to create instances dir");
        let fake = FakeTracefs { dir };
        fake.populate_instance(fake.path());
        fs::write(
            fake.path().join("available_tracers"),
            "hwlat blk mmiotrace function_graph wakeup_dl wakeup_rt wakeup function nop\n",
        )
        .unwrap();
        fake
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> TracefsConfig {
        TracefsConfig::new(self.path())
    }

    pub fn root(&self) -> Instance {
        self.config().root_instance()
    }

    /// Create the control files the kernel provides in every instance.
    pub fn populate_instance(&self, path: &Path) {
        fs::write(path.join("current_tracer"), "nop\n").unwrap();
        fs::write(path.join("tracing_on"), "1\n").unwrap();
        fs::write(path.join("uprobe_events"), "").unwrap();
        fs::write(path.join("trace"), "# tracer: nop\n").unwrap();
        fs::write(path.join("trace_pipe"), "").unwrap();
        fs::create_dir_all(path.join("events")).unwrap();
    }

    /// Stand-in for the kernel creating an event directory with its switches.
    pub fn register_event_dir(&self, enable_path: &Path) {
        let dir = enable_path.parent().unwrap();
        fs::create_dir_all(dir).unwrap();
        fs::write(enable_path, "0\n").unwrap();
        fs::write(dir.join("filter"), "none\n").unwrap();
    }

    /// Stand-in for the kernel tearing down an instance's contents on rmdir.
    pub fn depopulate_instance(&self, path: &Path) {
        for entry in fs::read_dir(path).unwrap() {
            let entry = entry.unwrap().path();
            if entry.is_dir() {
                fs::remove_dir_all(&entry).unwrap();
            } else {
                fs::remove_file(&entry).unwrap();
            }
        }
    }
}

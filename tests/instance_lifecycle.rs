//! Integration tests for the instance and uprobe workflow.
//!
//! Most tests run against a fake tracefs tree in a temp dir. The tests
//! touching the real mount need root and are marked as `#[ignore]`.
//!
//! To run the live tests:
//! ```
//! sudo cargo test --test instance_lifecycle -- --ignored
//! ```

mod common;

use std::fs;
use std::io::Read;
use std::path::Path;

use common::FakeTracefs;
use tracefs::{FetchArg, Tracer, TracefsConfig, UprobeEvent, UprobeRule};

#[test]
fn test_probe_instance_end_to_end() {
    let fake = FakeTracefs::new();
    let root = fake.root();

    let child = root.new_instance("probe1").unwrap();
    assert!(!child.is_root());
    assert!(child.path().ends_with("instances/probe1"));
    fake.populate_instance(child.path());

    let probe = UprobeEvent {
        return_probe: true,
        ..UprobeEvent::new("/bin/true", 256)
    };
    child.add_uprobe_event(&probe).unwrap();
    assert_eq!(
        fs::read_to_string(child.path().join("uprobe_events")).unwrap(),
        "r /bin/true:0x0000000000000100\n"
    );

    let enable = child.uprobe_enable_path(&probe).unwrap();
    assert!(enable.ends_with("events/uprobes/enable"));
    fake.register_event_dir(&enable);
    child.enable_uprobe(&probe).unwrap();
    assert_eq!(fs::read_to_string(&enable).unwrap(), "1");

    let names: Vec<String> = root
        .child_instances()
        .unwrap()
        .iter()
        .map(|i| i.name().to_string())
        .collect();
    assert_eq!(names, vec!["probe1"]);

    fake.depopulate_instance(child.path());
    child.destroy().unwrap();
    assert!(!child.path().exists());
    assert!(root.child_instances().unwrap().is_empty());
}

#[test]
fn test_structural_misuse() {
    let fake = FakeTracefs::new();
    let root = fake.root();
    let child = root.new_instance("child").unwrap();

    assert!(child.child_instances().unwrap_err().is_invalid_operation());
    assert!(child.new_instance("grandchild").unwrap_err().is_invalid_operation());
    assert!(!child.path().join("instances").exists());

    assert!(root.destroy().unwrap_err().is_invalid_operation());
    assert!(fake.path().join("current_tracer").exists());
}

#[test]
fn test_tracer_control_per_instance() {
    let fake = FakeTracefs::new();
    let root = fake.root();
    let a = root.new_instance("a").unwrap();
    let b = root.new_instance("b").unwrap();
    fake.populate_instance(a.path());
    fake.populate_instance(b.path());

    a.set_tracer(&Tracer::FunctionGraph).unwrap();
    a.disable().unwrap();
    assert_eq!(a.current_tracer().unwrap(), Tracer::FunctionGraph);
    assert!(!a.on().unwrap());

    // Siblings and the root are untouched.
    assert_eq!(b.current_tracer().unwrap(), Tracer::Nop);
    assert!(b.on().unwrap());
    assert_eq!(root.current_tracer().unwrap(), Tracer::Nop);

    assert_eq!(root.available_tracers().unwrap().len(), Tracer::KNOWN.len());
}

#[test]
fn test_named_uprobes_in_groups() {
    let fake = FakeTracefs::new();
    let root = fake.root();

    let grouped = UprobeEvent {
        group: "app".to_string(),
        event: "handle_request".to_string(),
        fetch_args: vec![
            FetchArg::register("%di"),
            "len=%si:u32".parse().unwrap(),
        ],
        ..UprobeEvent::new("/opt/app/bin/server", 0x4f2a0)
    };
    let ungrouped = UprobeEvent {
        event: "readline".to_string(),
        ..UprobeEvent::new("/bin/bash", 0x4245c0)
    };
    root.add_uprobe_event(&grouped).unwrap();
    root.add_uprobe_event(&ungrouped).unwrap();

    let rules = root.uprobe_events().unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(
        rules[0],
        UprobeRule {
            return_probe: false,
            group: Some("app".to_string()),
            event: Some("handle_request".to_string()),
            path: "/opt/app/bin/server".to_string(),
            offset: 0x4f2a0,
            fetch_args: vec!["%di".to_string(), "len=%si:u32".to_string()],
        }
    );
    assert_eq!(rules[0].to_event().unwrap(), grouped);
    assert_eq!(rules[1].to_event().unwrap(), ungrouped);

    assert_eq!(
        root.uprobe_enable_path(&grouped).unwrap(),
        fake.path().join("events/app/handle_request/enable")
    );
    assert_eq!(
        root.uprobe_enable_path(&ungrouped).unwrap(),
        fake.path().join("events/uprobes/readline/enable")
    );

    // Not registered with a kernel, so there is no switch to flip.
    assert!(root.enable_uprobe(&grouped).unwrap_err().io_error().is_some());

    fake.register_event_dir(&root.uprobe_enable_path(&grouped).unwrap());
    root.enable_uprobe(&grouped).unwrap();
    root.set_uprobe_filter(&grouped, "len > 64").unwrap();
    root.disable_uprobe(&grouped).unwrap();
    assert_eq!(
        fs::read_to_string(fake.path().join("events/app/handle_request/filter")).unwrap(),
        "len > 64"
    );
}

#[test]
fn test_trace_pipe_stream() {
    let fake = FakeTracefs::new();
    let root = fake.root();
    fs::write(
        fake.path().join("trace_pipe"),
        "bash-4242 [003] ..... 512.000001: readline: (0x4245c0)\n",
    )
    .unwrap();

    let mut pipe = root.trace_pipe().unwrap();
    let mut out = String::new();
    pipe.read_to_string(&mut out).unwrap();
    pipe.close();
    assert!(out.contains("readline: (0x4245c0)"));

    root.clear_trace().unwrap();
    assert!(root.read_trace().unwrap().is_empty());
}

#[test]
#[ignore] // Requires root and a mounted tracefs
fn test_live_instance_lifecycle() {
    let config = TracefsConfig::discover().expect("tracefs is not mounted");
    let root = config.root_instance();
    let name = format!("tracefs_test_{}", std::process::id());

    let child = root.new_instance(&name).expect("Failed to create instance");
    assert!(child.path().join("trace_pipe").exists());
    assert_eq!(child.current_tracer().unwrap(), Tracer::Nop);

    child.disable().unwrap();
    assert!(!child.on().unwrap());
    child.enable().unwrap();
    assert!(child.on().unwrap());

    let probe = UprobeEvent {
        event: format!("true_{}", std::process::id()),
        ..UprobeEvent::new("/bin/true", 0)
    };
    if Path::new("/bin/true").exists() && child.add_uprobe_event(&probe).is_ok() {
        // Dynamic events are global, the switch shows up in every instance.
        assert!(child.uprobe_enable_path(&probe).unwrap().exists());
        child.enable_uprobe(&probe).unwrap();
        child.disable_uprobe(&probe).unwrap();
        child.remove_uprobe_event(&probe).unwrap();
    }

    child.destroy().expect("Failed to destroy instance");
    assert!(!root
        .child_instances()
        .unwrap()
        .iter()
        .any(|i| i.name() == name));
}

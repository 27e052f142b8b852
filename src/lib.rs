//! tracefs library - control the kernel's tracing filesystem.
//!
//! This library is used by the `tracefs` binary and can be embedded by tools
//! that want to set up trace instances and uprobes without shelling out.
//!
//! # Modules
//!
//! - [`config`] - Locating the tracefs mount
//! - [`instance`] - Root and child trace instances
//! - [`tracer`] - Tracer selection and the global capture switch
//! - [`uprobe`] - The uprobe_events rule protocol and enable switches
//! - [`stream`] - Reading the trace pipe
//! - [`probes`] - JSON probe sets applied to an instance
//!
//! # Example
//!
//! ```no_run
//! use tracefs::{FetchArg, TracefsConfig, UprobeEvent};
//!
//! let root = TracefsConfig::discover()?.root_instance();
//! let instance = root.new_instance("probe1")?;
//!
//! let probe = UprobeEvent {
//!     event: "bash_readline".to_string(),
//!     fetch_args: vec![FetchArg::register("%ax")],
//!     ..UprobeEvent::new("/bin/bash", 0x4245c0)
//! };
//! instance.add_uprobe_event(&probe)?;
//! instance.enable_uprobe(&probe)?;
//! let pipe = instance.trace_pipe()?;
//! # drop(pipe);
//! # Ok::<(), tracefs::Error>(())
//! ```

pub mod config;
pub mod error;
mod fsio;
pub mod instance;
pub mod probes;
pub mod stream;
pub mod tracer;
pub mod uprobe;

pub use config::TracefsConfig;
pub use error::{Error, Result};
pub use instance::Instance;
pub use probes::ProbeSet;
pub use stream::TracePipe;
pub use tracer::Tracer;
pub use uprobe::{FetchArg, UprobeEvent, UprobeRule};

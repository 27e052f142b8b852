//! Uprobe events.
//!
//! A [`UprobeEvent`] is encoded into a single line of the kernel's
//! `uprobe_events` grammar:
//!
//! ```text
//! <p|r>[:[<group>/]<event>] <path>:0x<offset, 16 hex digits> [<fetch arg> ...]
//! ```
//!
//! Registering a probe appends that line to the instance's `uprobe_events`
//! file. Nothing is tracked in memory, the kernel table is the only record of
//! what has been registered.
//!
//! Probes without an explicit group are filed by the kernel under the
//! `uprobes` group, which is also where the enable switches live:
//!
//! - `events/<group>/<event>/enable` with both a group and an event
//! - `events/uprobes/<event>/enable` with only an event
//! - `events/uprobes/enable` for anonymous probes, toggling all of them

mod fetch;

pub use fetch::FetchArg;

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::fsio;
use crate::instance::{check_name, Instance};

const UPROBE_EVENTS: &str = "uprobe_events";
const EVENTS_DIR: &str = "events";

/// Group the kernel assigns to uprobes registered without one.
pub const DEFAULT_GROUP: &str = "uprobes";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UprobeEvent {
    pub return_probe: bool,
    // Only used when `event` is set as well.
    pub group: String,
    pub event: String,
    pub path: String,
    pub offset: u64,
    pub fetch_args: Vec<FetchArg>,
}

impl UprobeEvent {
    pub fn new(path: impl Into<String>, offset: u64) -> Self {
        UprobeEvent {
            path: path.into(),
            offset,
            ..Default::default()
        }
    }

    /// The rule line written to `uprobe_events`.
    pub fn rule(&self) -> String {
        self.to_string()
    }

    fn probe_type(&self) -> char {
        if self.return_probe {
            'r'
        } else {
            'p'
        }
    }

    /// The group is silently dropped from the rule when no event name is
    /// given.
    pub fn drops_group(&self) -> bool {
        !self.group.is_empty() && self.event.is_empty()
    }
}

impl fmt::Display for UprobeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.probe_type())?;
        if !self.event.is_empty() {
            if !self.group.is_empty() {
                write!(f, ":{}/{}", self.group, self.event)?;
            } else {
                write!(f, ":{}", self.event)?;
            }
        }
        write!(f, " {}:0x{:016x}", self.path, self.offset)?;
        for arg in self.fetch_args.iter() {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Parse a probe offset, either decimal or `0x` prefixed hex.
pub fn parse_offset(s: &str) -> Result<u64> {
    fetch::parse_u64(s).ok_or_else(|| Error::InvalidRule {
        rule: s.to_string(),
        message: "bad offset".to_string(),
    })
}

/// A rule line taken apart, either one we produced or one read back from the
/// kernel's `uprobe_events` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UprobeRule {
    pub return_probe: bool,
    pub group: Option<String>,
    pub event: Option<String>,
    pub path: String,
    pub offset: u64,
    pub fetch_args: Vec<String>,
}

fn rule_regex() -> &'static Regex {
    static RULE_RE: OnceLock<Regex> = OnceLock::new();
    RULE_RE.get_or_init(|| {
        // The kernel echoes uprobes with a reference counter as
        // "<path>:0x<offset>(0x<ref_ctr_offset>)", which we accept and ignore.
        Regex::new(
            r"^([pr])(?::(?:([^/\s]+)/)?([^/\s]+))?\s+(\S+):0x([0-9a-fA-F]{1,16})(?:\(0x[0-9a-fA-F]+\))?((?:\s+\S+)*)\s*$",
        )
        .unwrap()
    })
}

impl UprobeRule {
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = |message: &str| Error::InvalidRule {
            rule: line.to_string(),
            message: message.to_string(),
        };
        let caps = rule_regex()
            .captures(line)
            .ok_or_else(|| invalid("does not match the uprobe rule format"))?;

        let offset = u64::from_str_radix(&caps[5], 16).map_err(|_| invalid("bad offset"))?;
        let fetch_args: Vec<String> = caps
            .get(6)
            .map(|m| m.as_str().split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        Ok(UprobeRule {
            return_probe: &caps[1] == "r",
            group: caps.get(2).map(|m| m.as_str().to_string()),
            event: caps.get(3).map(|m| m.as_str().to_string()),
            path: caps[4].to_string(),
            offset,
            fetch_args,
        })
    }

    /// Turn the parsed rule back into an event, parsing its fetch arguments.
    pub fn to_event(&self) -> Result<UprobeEvent> {
        let fetch_args = self
            .fetch_args
            .iter()
            .map(|arg| arg.parse::<FetchArg>())
            .collect::<Result<Vec<_>>>()?;
        Ok(UprobeEvent {
            return_probe: self.return_probe,
            group: self.group.clone().unwrap_or_default(),
            event: self.event.clone().unwrap_or_default(),
            path: self.path.clone(),
            offset: self.offset,
            fetch_args,
        })
    }
}

impl Instance {
    /// Append the rule for `event` to this instance's `uprobe_events`.
    pub fn add_uprobe_event(&self, event: &UprobeEvent) -> Result<()> {
        if event.drops_group() {
            tracing::warn!(
                "Uprobe group '{}' ignored for {}:0x{:x}, an event name is required to use a group",
                event.group,
                event.path,
                event.offset
            );
        }
        let rule = event.rule();
        fsio::append_line(&self.file(UPROBE_EVENTS), &rule)?;
        tracing::info!("Registered uprobe on {}: {}", self.name(), rule);
        Ok(())
    }

    /// The rules currently registered, as the kernel reports them.
    pub fn uprobe_events(&self) -> Result<Vec<UprobeRule>> {
        let data = fsio::read(&self.file(UPROBE_EVENTS))?;
        String::from_utf8_lossy(&data)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(UprobeRule::parse)
            .collect()
    }

    /// Remove a named uprobe from the kernel table. Anonymous probes have no
    /// name to address, use `clear_uprobe_events` for those.
    pub fn remove_uprobe_event(&self, event: &UprobeEvent) -> Result<()> {
        if event.event.is_empty() {
            return Err(Error::invalid_op(
                "remove_uprobe_event",
                "cannot remove an anonymous uprobe",
            ));
        }
        let group = if event.group.is_empty() {
            DEFAULT_GROUP
        } else {
            event.group.as_str()
        };
        let command = format!("-:{}/{}", group, event.event);
        fsio::append_line(&self.file(UPROBE_EVENTS), &command)?;
        tracing::info!("Removed uprobe {}/{} from {}", group, event.event, self.name());
        Ok(())
    }

    /// Drop every uprobe registered on this instance. The kernel refuses while
    /// any of them is enabled.
    pub fn clear_uprobe_events(&self) -> Result<()> {
        fsio::write(&self.file(UPROBE_EVENTS), b"")?;
        tracing::info!("Cleared uprobe events on {}", self.name());
        Ok(())
    }

    fn uprobe_event_dir(&self, op: &'static str, event: &UprobeEvent) -> Result<PathBuf> {
        let events = self.path().join(EVENTS_DIR);
        if event.event.is_empty() {
            return Ok(events.join(DEFAULT_GROUP));
        }
        check_name(op, "uprobe event", &event.event)?;
        if event.group.is_empty() {
            return Ok(events.join(DEFAULT_GROUP).join(&event.event));
        }
        check_name(op, "uprobe group", &event.group)?;
        Ok(events.join(&event.group).join(&event.event))
    }

    /// The `enable` switch controlling `event`. Always below `events/`, group
    /// and event names that are not a single path entry are rejected.
    pub fn uprobe_enable_path(&self, event: &UprobeEvent) -> Result<PathBuf> {
        Ok(self.uprobe_event_dir("uprobe_enable_path", event)?.join("enable"))
    }

    /// The `filter` file next to the enable switch of `event`.
    pub fn uprobe_filter_path(&self, event: &UprobeEvent) -> Result<PathBuf> {
        Ok(self.uprobe_event_dir("uprobe_filter_path", event)?.join("filter"))
    }

    pub fn enable_uprobe(&self, event: &UprobeEvent) -> Result<()> {
        let path = self.uprobe_event_dir("enable_uprobe", event)?.join("enable");
        fsio::write(&path, b"1")?;
        tracing::debug!("Enabled {}", path.display());
        Ok(())
    }

    pub fn disable_uprobe(&self, event: &UprobeEvent) -> Result<()> {
        let path = self.uprobe_event_dir("disable_uprobe", event)?.join("enable");
        fsio::write(&path, b"0")?;
        tracing::debug!("Disabled {}", path.display());
        Ok(())
    }

    /// Install an event filter expression, e.g. `arg1 > 10`. An empty
    /// expression resets the filter.
    pub fn set_uprobe_filter(&self, event: &UprobeEvent, filter: &str) -> Result<()> {
        let path = self.uprobe_event_dir("set_uprobe_filter", event)?.join("filter");
        let filter = if filter.is_empty() { "0" } else { filter };
        fsio::write(&path, filter.as_bytes())
    }
}

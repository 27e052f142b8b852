// Probe set files describe an instance setup to apply in one go.
//
// The JSON format is
// {
//   "instance": "instance_name",
//   "tracer": "nop",
//   "tracing_on": true,
//   "uprobes": [
//     {
//       "path": "/usr/lib/libc.so.6",
//       "offset": 614624,
//       "return_probe": false,
//       "group": "libc",
//       "event": "malloc",
//       "fetch_args": ["size=%di:u64"],
//       "filter": "size > 4096",
//       "enable": true
//     }
//   ]
// }
//
// Everything but the uprobe path and offset is optional. Without "instance"
// the set is applied to the root instance. Named uprobes can't be duplicated
// within a set.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::instance::Instance;
use crate::tracer::Tracer;
use crate::uprobe::{FetchArg, UprobeEvent, DEFAULT_GROUP};

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ProbeSet {
    pub instance: Option<String>,
    pub tracer: Option<String>,
    pub tracing_on: Option<bool>,
    #[serde(default)]
    pub uprobes: Vec<ProbeSetUprobe>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ProbeSetUprobe {
    pub path: String,
    pub offset: u64,
    #[serde(default)]
    pub return_probe: bool,
    pub group: Option<String>,
    pub event: Option<String>,
    #[serde(default)]
    pub fetch_args: Vec<String>,
    pub filter: Option<String>,
    #[serde(default)]
    pub enable: bool,
}

impl ProbeSetUprobe {
    pub fn to_event(&self) -> Result<UprobeEvent> {
        let fetch_args = self
            .fetch_args
            .iter()
            .map(|arg| arg.parse::<FetchArg>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid fetch args for {}", self.path))?;
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

impl ProbeSet {
    pub fn from_json(buf: &str) -> Result<Self> {
        let set: ProbeSet = serde_json::from_str(buf)?;
        set.validate()?;
        Ok(set)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let buf = fs::read_to_string(path)
            .with_context(|| format!("Failed to read probe set {}", path.display()))?;
        Self::from_json(&buf).with_context(|| format!("Invalid probe set {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for uprobe in self.uprobes.iter() {
            let event = uprobe.to_event()?;
            if event.event.is_empty() {
                continue;
            }
            let group = if event.group.is_empty() {
                DEFAULT_GROUP
            } else {
                event.group.as_str()
            };
            let name = format!("{}/{}", group, event.event);
            if !names.insert(name.clone()) {
                Err(anyhow::anyhow!("Uprobe {} already exists", name))?;
            }
        }
        Ok(())
    }

    pub fn events(&self) -> Result<Vec<UprobeEvent>> {
        self.uprobes.iter().map(|u| u.to_event()).collect()
    }

    /// Apply the set under `root`, creating the instance if it does not exist
    /// yet. Returns the instance the probes were registered on.
    pub fn apply(&self, root: &Instance) -> Result<Instance> {
        let instance = match &self.instance {
            Some(name) => match root.instance(name) {
                Ok(instance) => instance,
                Err(err)
                    if err.io_error().map(|e| e.kind()) == Some(ErrorKind::NotFound) =>
                {
                    root.new_instance(name)?
                }
                Err(err) => return Err(err.into()),
            },
            None => root.clone(),
        };

        if let Some(tracer) = &self.tracer {
            instance.set_tracer(&Tracer::from(tracer.as_str()))?;
        }

        for uprobe in self.uprobes.iter() {
            let event = uprobe.to_event()?;
            instance
                .add_uprobe_event(&event)
                .with_context(|| format!("Failed to register {}", event.rule()))?;
            if let Some(filter) = &uprobe.filter {
                instance.set_uprobe_filter(&event, filter)?;
            }
            if uprobe.enable {
                instance.enable_uprobe(&event)?;
            }
        }

        match self.tracing_on {
            Some(true) => instance.enable()?,
            Some(false) => instance.disable()?,
            None => {}
        }

        tracing::info!(
            "Applied {} uprobes to instance {}",
            self.uprobes.len(),
            instance.name()
        );
        Ok(instance)
    }
}

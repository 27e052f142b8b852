use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::fsio;
use crate::instance::Instance;

const CURRENT_TRACER: &str = "current_tracer";
const AVAILABLE_TRACERS: &str = "available_tracers";
const TRACING_ON: &str = "tracing_on";

/// A kernel tracer backend as named in `current_tracer`.
///
/// Names outside the known set are carried verbatim in `Other`; the kernel
/// decides whether it supports them when they are written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tracer {
    Nop,
    Function,
    Wakeup,
    WakeupRt,
    WakeupDl,
    FunctionGraph,
    MmioTrace,
    Blk,
    HwLat,
    Other(String),
}

impl Tracer {
    pub const KNOWN: [Tracer; 9] = [
        Tracer::Nop,
        Tracer::Function,
        Tracer::Wakeup,
        Tracer::WakeupRt,
        Tracer::WakeupDl,
        Tracer::FunctionGraph,
        Tracer::MmioTrace,
        Tracer::Blk,
        Tracer::HwLat,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Tracer::Nop => "nop",
            Tracer::Function => "function",
            Tracer::Wakeup => "wakeup",
            Tracer::WakeupRt => "wakeup_rt",
            Tracer::WakeupDl => "wakeup_dl",
            Tracer::FunctionGraph => "function_graph",
            Tracer::MmioTrace => "mmiotrace",
            Tracer::Blk => "blk",
            Tracer::HwLat => "hwlat",
            Tracer::Other(name) => name,
        }
    }

    /// Whether this is one of the tracers the kernel is known to provide.
    pub fn is_known(&self) -> bool {
        !matches!(self, Tracer::Other(_))
    }
}

impl From<&str> for Tracer {
    fn from(name: &str) -> Self {
        Tracer::KNOWN
            .iter()
            .find(|t| t.as_str() == name)
            .cloned()
            .unwrap_or_else(|| Tracer::Other(name.to_string()))
    }
}

impl FromStr for Tracer {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Tracer::from(s))
    }
}

impl fmt::Display for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Instance {
    /// The tracer currently selected in `current_tracer`.
    pub fn current_tracer(&self) -> Result<Tracer> {
        let name = fsio::read_trimmed(&self.file(CURRENT_TRACER))?;
        Ok(Tracer::from(name.as_str()))
    }

    /// Select a tracer. The name is written as-is, no validation is done here.
    pub fn set_tracer(&self, tracer: &Tracer) -> Result<()> {
        if !tracer.is_known() {
            tracing::debug!("Setting unrecognized tracer '{}'", tracer);
        }
        fsio::write(&self.file(CURRENT_TRACER), tracer.as_str().as_bytes())?;
        tracing::info!("Set tracer of {} to {}", self.name(), tracer);
        Ok(())
    }

    /// Tracers compiled into the running kernel.
    pub fn available_tracers(&self) -> Result<Vec<Tracer>> {
        let list = fsio::read_trimmed(&self.file(AVAILABLE_TRACERS))?;
        Ok(list.split_whitespace().map(Tracer::from).collect())
    }

    /// Whether trace capture is switched on in `tracing_on`.
    pub fn on(&self) -> Result<bool> {
        let path = self.file(TRACING_ON);
        let value = fsio::read_trimmed(&path)?;
        match value.as_str() {
            "0" => Ok(false),
            "1" => Ok(true),
            _ => Err(Error::UnexpectedValue { path, value }),
        }
    }

    /// Switch capture on. Writing the current state again is a no-op.
    pub fn enable(&self) -> Result<()> {
        fsio::write(&self.file(TRACING_ON), b"1")?;
        tracing::debug!("Tracing enabled on {}", self.name());
        Ok(())
    }

    /// Switch capture off. Writing the current state again is a no-op.
    pub fn disable(&self) -> Result<()> {
        fsio::write(&self.file(TRACING_ON), b"0")?;
        tracing::debug!("Tracing disabled on {}", self.name());
        Ok(())
    }
}

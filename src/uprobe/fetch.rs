// Fetch arguments, the trailing `[NAME=]FETCHARG[:TYPE]` fields of a uprobe
// rule telling the kernel what to record when the probe fires.
//
// Format is
// %<reg>            register, written verbatim
// @<addr>           memory at an absolute address
// @+<offset>        memory at a file offset of the probed binary
// $stack<N>         Nth entry of the stack
// $stack            stack address
// $retval           return value (return probes only)
// $comm             current task comm
// \<imm>            immediate value
// +|-<offs>(<arg>)  dereference <arg> plus <offs>

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchArg {
    Register(String),
    Memory(u64),
    FileOffset(u64),
    StackSlot(u32),
    Stack,
    Retval,
    Comm,
    Immediate(i64),
    Deref {
        offset: i64,
        base: Box<FetchArg>,
    },
    /// A fetch argument with an explicit field name and/or kernel type.
    Annotated {
        name: Option<String>,
        fetch_type: Option<String>,
        arg: Box<FetchArg>,
    },
}

impl FetchArg {
    pub fn register(name: impl Into<String>) -> Self {
        FetchArg::Register(name.into())
    }

    /// Short tag naming the kind of argument.
    pub fn type_tag(&self) -> &'static str {
        match self {
            FetchArg::Register(_) => "register",
            FetchArg::Memory(_) => "memory",
            FetchArg::FileOffset(_) => "file_offset",
            FetchArg::StackSlot(_) => "stack_slot",
            FetchArg::Stack => "stack",
            FetchArg::Retval => "retval",
            FetchArg::Comm => "comm",
            FetchArg::Immediate(_) => "immediate",
            FetchArg::Deref { .. } => "deref",
            FetchArg::Annotated { arg, .. } => arg.type_tag(),
        }
    }

    /// Kernel fetch type (`u32`, `string`, ...) if one was given.
    pub fn fetch_type(&self) -> Option<&str> {
        match self {
            FetchArg::Annotated { fetch_type, .. } => fetch_type.as_deref(),
            _ => None,
        }
    }

    /// Text of this argument as it appears in a rule.
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FetchArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchArg::Register(name) => write!(f, "{}", name),
            FetchArg::Memory(addr) => write!(f, "@0x{:x}", addr),
            FetchArg::FileOffset(offset) => write!(f, "@+0x{:x}", offset),
            FetchArg::StackSlot(n) => write!(f, "$stack{}", n),
            FetchArg::Stack => write!(f, "$stack"),
            FetchArg::Retval => write!(f, "$retval"),
            FetchArg::Comm => write!(f, "$comm"),
            FetchArg::Immediate(val) => write!(f, "\\{}", val),
            FetchArg::Deref { offset, base } => write!(f, "{:+}({})", offset, base),
            FetchArg::Annotated {
                name,
                fetch_type,
                arg,
            } => {
                if let Some(name) = name {
                    write!(f, "{}=", name)?;
                }
                write!(f, "{}", arg)?;
                if let Some(fetch_type) = fetch_type {
                    write!(f, ":{}", fetch_type)?;
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn parse_u64(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse::<u64>().ok(),
    }
}

fn parse_i64(s: &str) -> Option<i64> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let magnitude = i128::from(parse_u64(digits)?);
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_core(arg: &str, orig: &str) -> Result<FetchArg> {
    let invalid = |message: &str| Error::InvalidFetchArg {
        arg: orig.to_string(),
        message: message.to_string(),
    };

    if arg.starts_with('%') {
        if arg.len() == 1 {
            return Err(invalid("empty register name"));
        }
        return Ok(FetchArg::Register(arg.to_string()));
    }
    if let Some(rest) = arg.strip_prefix("@+") {
        return parse_u64(rest)
            .map(FetchArg::FileOffset)
            .ok_or_else(|| invalid("bad file offset"));
    }
    if let Some(rest) = arg.strip_prefix('@') {
        return parse_u64(rest)
            .map(FetchArg::Memory)
            .ok_or_else(|| invalid("bad address"));
    }
    if let Some(rest) = arg.strip_prefix('\\') {
        return parse_i64(rest)
            .map(FetchArg::Immediate)
            .ok_or_else(|| invalid("bad immediate"));
    }
    match arg {
        "$stack" => return Ok(FetchArg::Stack),
        "$retval" => return Ok(FetchArg::Retval),
        "$comm" => return Ok(FetchArg::Comm),
        _ => {}
    }
    if let Some(rest) = arg.strip_prefix("$stack") {
        return rest
            .parse::<u32>()
            .map(FetchArg::StackSlot)
            .map_err(|_| invalid("bad stack slot"));
    }
    if arg.starts_with('+') || arg.starts_with('-') {
        let (offset, inner) = arg
            .split_once('(')
            .ok_or_else(|| invalid("dereference needs a base argument"))?;
        let inner = inner
            .strip_suffix(')')
            .ok_or_else(|| invalid("unbalanced parenthesis"))?;
        let offset = parse_i64(offset).ok_or_else(|| invalid("bad dereference offset"))?;
        let base = parse_core(inner, orig)?;
        return Ok(FetchArg::Deref {
            offset,
            base: Box::new(base),
        });
    }
    Err(invalid("unknown fetch argument"))
}

impl FromStr for FetchArg {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s;
        let mut name = None;
        if let Some((lhs, rhs)) = rest.split_once('=') {
            if is_identifier(lhs) {
                name = Some(lhs.to_string());
                rest = rhs;
            }
        }

        let mut fetch_type = None;
        if let Some((lhs, rhs)) = rest.rsplit_once(':') {
            if !rhs.is_empty() && !rhs.contains(')') {
                fetch_type = Some(rhs.to_string());
                rest = lhs;
            }
        }

        let arg = parse_core(rest, s)?;
        if name.is_none() && fetch_type.is_none() {
            return Ok(arg);
        }
        Ok(FetchArg::Annotated {
            name,
            fetch_type,
            arg: Box::new(arg),
        })
    }
}

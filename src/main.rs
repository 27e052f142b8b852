use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tracefs::uprobe::parse_offset;
use tracefs::{FetchArg, Instance, ProbeSet, Tracer, TracefsConfig, UprobeEvent};

#[derive(Debug, Parser)]
#[command(name = "tracefs")]
#[command(about = "Control tracefs instances, tracers and uprobes")]
#[command(version)]
struct Command {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// tracefs mount point, located automatically when not given
    #[arg(long, env = "TRACEFS_ROOT", global = true)]
    root: Option<PathBuf>,
    /// Operate on this child instance instead of the root instance
    #[arg(short, long, global = true)]
    instance: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List child instances
    Instances,
    /// Create a child instance
    Create { name: String },
    /// Destroy a child instance
    Destroy { name: String },
    /// Show the current tracer, or select one
    Tracer { name: Option<String> },
    /// List the tracers the kernel provides
    Tracers,
    /// Show tracer and capture state
    Status,
    /// Turn trace capture on
    Enable,
    /// Turn trace capture off
    Disable,
    /// Manage uprobe events
    #[command(subcommand)]
    Uprobe(UprobeCommand),
    /// Apply a JSON probe set
    Load { path: PathBuf },
    /// Stream the trace pipe to stdout until Ctrl-C
    Pipe,
    /// Print the trace buffer
    Trace {
        /// Clear the buffer instead of printing it
        #[arg(long)]
        clear: bool,
    },
}

#[derive(Debug, Subcommand)]
enum UprobeCommand {
    /// Register a uprobe
    Add {
        #[command(flatten)]
        name: ProbeName,
        /// Register a return probe
        #[arg(short, long)]
        ret: bool,
        /// Enable the probe after registering it
        #[arg(long)]
        enable: bool,
        /// Binary or library to probe
        path: String,
        /// Offset into the file, decimal or 0x prefixed
        #[arg(value_parser = parse_offset)]
        offset: u64,
        /// Fetch arguments in kernel syntax, e.g. %ax, -8(%sp) or name=+0(%di):string
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        fetch_args: Vec<String>,
    },
    /// Remove a named uprobe
    Remove {
        #[command(flatten)]
        name: ProbeName,
    },
    /// Enable a uprobe, all anonymous ones when no event is given
    Enable {
        #[command(flatten)]
        name: ProbeName,
    },
    /// Disable a uprobe, all anonymous ones when no event is given
    Disable {
        #[command(flatten)]
        name: ProbeName,
    },
    /// List registered uprobes
    List,
    /// Remove all uprobes
    Clear,
}

#[derive(Debug, Args)]
struct ProbeName {
    #[arg(short, long, default_value = "")]
    group: String,
    #[arg(short, long, default_value = "")]
    event: String,
}

impl ProbeName {
    fn to_event(&self) -> UprobeEvent {
        UprobeEvent {
            group: self.group.clone(),
            event: self.event.clone(),
            ..Default::default()
        }
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn target_instance(root: &Instance, name: &Option<String>) -> Result<Instance> {
    match name {
        Some(name) => root
            .instance(name)
            .with_context(|| format!("No instance named {}", name)),
        None => Ok(root.clone()),
    }
}

fn uprobe(instance: &Instance, cmd: UprobeCommand) -> Result<()> {
    match cmd {
        UprobeCommand::Add {
            name,
            ret,
            enable,
            path,
            offset,
            fetch_args,
        } => {
            let fetch_args = fetch_args
                .iter()
                .map(|arg| arg.parse::<FetchArg>())
                .collect::<Result<Vec<_>, _>>()?;
            let mut event = name.to_event();
            event.return_probe = ret;
            event.path = path;
            event.offset = offset;
            event.fetch_args = fetch_args;
            instance.add_uprobe_event(&event)?;
            if enable {
                instance.enable_uprobe(&event)?;
            }
            println!("{}", event.rule());
        }
        UprobeCommand::Remove { name } => instance.remove_uprobe_event(&name.to_event())?,
        UprobeCommand::Enable { name } => instance.enable_uprobe(&name.to_event())?,
        UprobeCommand::Disable { name } => instance.disable_uprobe(&name.to_event())?,
        UprobeCommand::List => {
            for rule in instance.uprobe_events()? {
                let kind = if rule.return_probe { "r" } else { "p" };
                println!(
                    "{} {}/{} {}:0x{:x} {}",
                    kind,
                    rule.group.as_deref().unwrap_or("-"),
                    rule.event.as_deref().unwrap_or("-"),
                    rule.path,
                    rule.offset,
                    rule.fetch_args.join(" ")
                );
            }
        }
        UprobeCommand::Clear => instance.clear_uprobe_events()?,
    }
    Ok(())
}

fn pipe(instance: &Instance) -> Result<()> {
    let mut trace_pipe = instance.trace_pipe()?;
    let (stop_tx, stop_rx) = channel();

    let reader_tx = stop_tx.clone();
    thread::Builder::new()
        .name("trace_pipe".to_string())
        .spawn(move || {
            let mut buf = vec![0u8; 64 * 1024];
            let stdout = io::stdout();
            loop {
                match trace_pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut out = stdout.lock();
                        if out.write_all(&buf[..n]).and_then(|_| out.flush()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Failed to read trace pipe: {}", e);
                        break;
                    }
                }
            }
            let _ = reader_tx.send(());
        })?;

    let _ = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    });

    eprintln!("Streaming {}, press Ctrl-C to stop", instance.name());
    let _ = stop_rx.recv();
    tracing::debug!("Stopping trace pipe reader");
    Ok(())
}

fn main() -> Result<()> {
    let opts = Command::parse();
    init_logging(opts.verbose);

    let config = match &opts.root {
        Some(root) => TracefsConfig::new(root),
        None => TracefsConfig::discover().context("Is tracefs mounted?")?,
    };
    let root = config.root_instance();
    let instance = || target_instance(&root, &opts.instance);

    match opts.command {
        Commands::Instances => {
            for child in root.child_instances()? {
                println!("{}", child.name());
            }
        }
        Commands::Create { name } => {
            let child = root.new_instance(&name)?;
            println!("{}", child.path().display());
        }
        Commands::Destroy { name } => root.instance(&name)?.destroy()?,
        Commands::Tracer { name: None } => println!("{}", instance()?.current_tracer()?),
        Commands::Tracer { name: Some(name) } => {
            let tracer = Tracer::from(name.as_str());
            if !tracer.is_known() {
                tracing::warn!("{} is not a known tracer, passing it through", tracer);
            }
            instance()?.set_tracer(&tracer)?;
        }
        Commands::Tracers => {
            for tracer in instance()?.available_tracers()? {
                println!("{}", tracer);
            }
        }
        Commands::Status => {
            let instance = instance()?;
            println!("instance: {}", instance.name());
            println!("tracer:   {}", instance.current_tracer()?);
            println!("tracing:  {}", if instance.on()? { "on" } else { "off" });
        }
        Commands::Enable => instance()?.enable()?,
        Commands::Disable => instance()?.disable()?,
        Commands::Uprobe(cmd) => uprobe(&instance()?, cmd)?,
        Commands::Load { path } => {
            if opts.instance.is_some() {
                bail!("--instance can't be combined with load, name the instance in the probe set");
            }
            let set = ProbeSet::load(&path)?;
            let applied = set.apply(&root)?;
            println!("{}", applied.path().display());
        }
        Commands::Pipe => pipe(&instance()?)?,
        Commands::Trace { clear: true } => instance()?.clear_trace()?,
        Commands::Trace { clear: false } => {
            io::stdout().write_all(&instance()?.read_trace()?)?;
        }
    }
    Ok(())
}

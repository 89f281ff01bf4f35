use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;

use weaver_model::Accessor;

use crate::ui::UIType;

#[derive(Parser, Debug)]
#[clap(name = "weaver")]
pub struct Opt {
    /// The project file to weave
    pub project: PathBuf,

    /// Which UI to use, available UIS are: print, json.
    ///
    /// Note that the JSON api is not stable yet.
    #[clap(long = "ui", default_value = "print")]
    pub ui: UIType,

    /// Trace the calls of a linked member, e.g. App.Service.Foo or App.Service.Count:get
    ///
    /// The markers emitted following the proceed chain are printed, in call order.
    #[clap(long = "trace")]
    pub trace: Vec<TraceTarget>,

    /// The number of threads used for linking
    #[clap(long = "num-cores")]
    pub num_cores: Option<usize>,

    #[clap(flatten, next_help_heading = Some("LOGGING"))]
    pub logger: LoggerOpt,
}

#[derive(Parser, Debug, Clone)]
pub struct LoggerOpt {
    /// Verbose mode (-v, -vv, -vvv, etc.)
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl LoggerOpt {
    pub fn enable_log(&self) {
        if self.verbose > 0 {
            std::env::set_var("RUST_BACKTRACE", "1");
            match self.verbose {
                0 => unreachable!(),
                1 => std::env::set_var("RUST_LOG", "info"),
                2 => std::env::set_var("RUST_LOG", "debug"),
                _ => std::env::set_var("RUST_LOG", "trace"),
            }
        }

        env_logger::Builder::from_default_env()
            .format_timestamp_nanos()
            .init();
        better_panic::install();
    }
}

/// A member of the linked output to trace: `Namespace.Type.Member[:accessor]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceTarget {
    pub member: String,
    pub accessor: Accessor,
}

impl FromStr for TraceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (member, accessor) = match s.rsplit_once(':') {
            Some((member, accessor)) => (member, Accessor::from_str(accessor)?),
            None => (s, Accessor::Invoke),
        };
        if !member.contains('.') {
            return Err(format!("Expecting Type.Member, found {}", member));
        }
        Ok(TraceTarget {
            member: member.to_string(),
            accessor,
        })
    }
}

impl std::fmt::Display for TraceTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.member, self.accessor)
    }
}

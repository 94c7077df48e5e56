/// `jobexporter` -- Export the running jobs of a Slurm cluster as Prometheus metrics
///
/// Every invocation runs one collection cycle: squeue is run (or a captured listing is read), the
/// listing is cleaned up and parsed, and the result is printed.  There is no server and no poll
/// loop.  For scraping, either run it from a cron job with --output pointing into the directory of
/// node-exporter's textfile collector, or wrap it in whatever serves command output over http.
///
/// Quirks
///
/// A listing that has a line we can't make sense of numerically (elapsed time, node count) is
/// rejected entirely, and nothing is written.  The previous --output file, if any, is left as it
/// was, so a scraper will see stale data rather than wrong data.  Lines with too few fields are
/// dropped with a warning, they are not fatal.
///
/// The `jobs` and `expand` commands are mainly for checking what the exporter sees.
mod configs;
mod format;
mod listing;
mod metrics;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use slurmutils::{compress_hostnames, expand_hostlist_counted};
use squeuelog::collect_jobs;
use std::io::{self, Write};
use std::process;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Collect running jobs and print them as Prometheus metrics
    Metrics(MetricsCmdArgs),

    /// Collect running jobs and print them as a table
    Jobs(JobsCmdArgs),

    /// Expand Slurm host lists, one host name per line.  A range with more than 100000 members is
    /// malformed and is ignored
    Expand(ExpandCmdArgs),
}

#[derive(Args, Debug)]
pub struct MetricsCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    /// Do not export jobs of this user (repeatable) [default: none, or from the config file]
    #[arg(long)]
    exclude_user: Vec<String>,

    /// Write the metrics to this file, replacing it atomically [default: stdout]
    #[arg(long, short)]
    output: Option<String>,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct JobsCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: JobsPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ExpandCmdArgs {
    /// Compress the host names into host lists instead
    #[arg(long, default_value_t = false)]
    compress: bool,

    /// Host lists (or host names, with --compress).  Ranges larger than 100000 are ignored
    hostlists: Vec<String>,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// The squeue program to run [default: $JOBEXPORTER_SQUEUE, or squeue]
    #[arg(long)]
    squeue: Option<String>,

    /// Comma-separated Slurm job states to list [default: R]
    #[arg(long)]
    states: Option<String>,

    /// Seconds to wait for squeue [default: 30]
    #[arg(long)]
    timeout: Option<u64>,

    /// Read squeue output from this file instead of running squeue
    #[arg(long)]
    input_file: Option<String>,

    /// File containing JSON data with exporter settings [default: none]
    #[arg(long)]
    config_file: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct JobsPrintArgs {
    /// Select fields and format for the output, or `help`
    /// [default: job,user,partition,state,time,nodes,nodelist]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Log debug information to stderr
    #[arg(long, short, default_value_t = false)]
    verbose: bool,

    /// Print unformatted data (for developers)
    #[arg(long, default_value_t = false)]
    raw: bool,
}

fn main() {
    match jobexporter() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {:#}", msg);
            process::exit(1);
        }
    }
}

fn jobexporter() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax: space-separated components of the form keyword(value), after the program name.
        println!("jobexporter version({})", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if let Commands::Jobs(ref jobs_args) = cli.command {
        if format::maybe_help(&jobs_args.print_args.fmt, listing::fmt_help) {
            return Ok(());
        }
    }

    let meta_args = match cli.command {
        Commands::Metrics(ref args) => &args.meta_args,
        Commands::Jobs(ref args) => &args.meta_args,
        Commands::Expand(ref args) => &args.meta_args,
        Commands::Version => bail!("Unexpected command"),
    };
    init_logging(meta_args.verbose);

    match cli.command {
        Commands::Version => bail!("Unexpected command"),

        Commands::Metrics(ref args) => {
            let settings = configs::resolve_settings(&cli_settings(
                &args.source_args,
                &args.exclude_user,
            ))?;
            let source = settings.job_source();
            info!("Collecting from {}", source.describe());
            let text = metrics::collect_and_render(source.as_ref(), &settings.exclude_user)?;
            metrics::write_metrics(args.output.as_deref(), &text)
        }

        Commands::Jobs(ref args) => {
            let settings = configs::resolve_settings(&cli_settings(&args.source_args, &[]))?;
            let source = settings.job_source();
            info!("Collecting from {}", source.describe());
            let jobs = collect_jobs(source.as_ref())?;
            listing::print_jobs(&mut io::stdout(), &args.print_args, meta_args, jobs)
        }

        Commands::Expand(ref args) => print_expanded(&mut io::stdout(), args),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn cli_settings(source_args: &SourceArgs, exclude_user: &[String]) -> configs::CliSettings {
    configs::CliSettings {
        squeue: source_args.squeue.clone(),
        states: source_args.states.clone(),
        timeout: source_args.timeout,
        exclude_user: exclude_user.to_vec(),
        input_file: source_args.input_file.clone(),
        config_file: source_args.config_file.clone(),
    }
}

// One name per line, like `scontrol show hostnames`.  Malformed parts of a host list are reported
// but not fatal, as in the parser.

fn print_expanded(output: &mut dyn Write, args: &ExpandCmdArgs) -> Result<()> {
    if args.compress {
        for h in compress_hostnames(&args.hostlists) {
            writeln!(output, "{h}")?;
        }
        return Ok(());
    }
    for hostlist in &args.hostlists {
        let (hosts, malformed) = expand_hostlist_counted(hostlist);
        if malformed > 0 {
            warn!("{hostlist}: {malformed} malformed item(s) ignored");
        }
        for h in hosts {
            writeln!(output, "{h}")?;
        }
    }
    Ok(())
}

#[test]
fn test_cli_parse() {
    let cli = Cli::try_parse_from([
        "jobexporter",
        "metrics",
        "--states=R,CG",
        "--timeout",
        "5",
        "--exclude-user",
        "root",
        "--exclude-user",
        "slurm",
        "-o",
        "/tmp/jobs.prom",
        "-v",
    ])
    .unwrap();
    let Commands::Metrics(args) = cli.command else {
        panic!("Expected metrics command")
    };
    let s = cli_settings(&args.source_args, &args.exclude_user);
    assert!(s.states == Some("R,CG".to_string()));
    assert!(s.timeout == Some(5));
    assert!(s.exclude_user == vec!["root", "slurm"]);
    assert!(args.output == Some("/tmp/jobs.prom".to_string()));
    assert!(args.meta_args.verbose);

    assert!(Cli::try_parse_from(["jobexporter", "metrics", "--timeout", "soon"]).is_err());
}

#[test]
fn test_print_expanded() {
    let args = ExpandCmdArgs {
        compress: false,
        hostlists: vec!["c[1-2],login".to_string(), "gpu-[08-10]".to_string()],
        meta_args: MetaArgs::default(),
    };
    let mut out = Vec::new();
    print_expanded(&mut out, &args).unwrap();
    assert!(String::from_utf8(out).unwrap() == "c1\nc2\nlogin\ngpu-08\ngpu-09\ngpu-10\n");

    let args = ExpandCmdArgs {
        compress: true,
        hostlists: vec!["c2".to_string(), "c1".to_string(), "c3".to_string()],
        meta_args: MetaArgs::default(),
    };
    let mut out = Vec::new();
    print_expanded(&mut out, &args).unwrap();
    assert!(String::from_utf8(out).unwrap() == "c[1-3]\n");

    // 100001 members is one too many; the rest of the list is still expanded.
    let args = ExpandCmdArgs {
        compress: false,
        hostlists: vec!["big[0-100000],c[1-100000]".to_string()],
        meta_args: MetaArgs::default(),
    };
    let mut out = Vec::new();
    print_expanded(&mut out, &args).unwrap();
    let s = String::from_utf8(out).unwrap();
    assert!(!s.contains("big"));
    assert!(s.lines().count() == 100000);
}

/// Sources of raw job listings, and the collection cycle that reads one.
///
/// The source is passed in to `collect_jobs` rather than being baked into it, so that the same
/// pipeline runs on the output of `squeue`, on a file captured from it earlier, or on test data.
use crate::{parse_jobs, CollectError, JobMap, SourceError};

use log::debug;
use slurmutils::run_with_timeout;
use std::env;
use std::fs;
use std::path::PathBuf;

/// The squeue output format: job id, partition, name, user, state, start time, elapsed time, node
/// count, node list.

pub const SQUEUE_FORMAT: &str = "%i|%P|%j|%u|%T|%S|%M|%D|%N";

/// Job states to list if none are given: running jobs only.

pub const DEFAULT_STATES: &[&str] = &["R"];

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Environment variable naming the squeue program, for testing with a fake one.

pub const SQUEUE_ENV: &str = "JOBEXPORTER_SQUEUE";

pub trait JobSource {
    /// Produce the raw listing.
    fn fetch(&self) -> Result<Vec<u8>, SourceError>;

    /// Something to put in log messages.
    fn describe(&self) -> String;
}

/// Run squeue.

#[derive(Debug, Clone)]
pub struct SqueueSource {
    program: String,
    args: Vec<String>,
    timeout_seconds: u64,
}

impl SqueueSource {
    /// `states` is a list of Slurm job state names or abbreviations; if empty, DEFAULT_STATES is
    /// used.

    pub fn new(program: &str, states: &[String], timeout_seconds: u64) -> SqueueSource {
        let states = if states.is_empty() {
            DEFAULT_STATES.join(",")
        } else {
            states.join(",")
        };
        SqueueSource {
            program: program.to_string(),
            args: vec![
                "-h".to_string(),
                format!("--states={states}"),
                "-o".to_string(),
                SQUEUE_FORMAT.to_string(),
            ],
            timeout_seconds,
        }
    }

    /// The program to run if none is configured: $JOBEXPORTER_SQUEUE, or else `squeue` from the
    /// path.

    pub fn default_program() -> String {
        env::var(SQUEUE_ENV).unwrap_or_else(|_| "squeue".to_string())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }
}

impl JobSource for SqueueSource {
    fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        Ok(run_with_timeout(
            &self.program,
            &self.args,
            self.timeout_seconds,
        )?)
    }

    fn describe(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Read a file holding squeue output.

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> FileSource {
        FileSource { path: path.into() }
    }
}

impl JobSource for FileSource {
    fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        fs::read(&self.path).map_err(|source| SourceError::Read {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Bytes in memory.

#[derive(Debug, Clone, Default)]
pub struct StaticSource(pub Vec<u8>);

impl JobSource for StaticSource {
    fn fetch(&self) -> Result<Vec<u8>, SourceError> {
        Ok(self.0.clone())
    }

    fn describe(&self) -> String {
        format!("<{} bytes>", self.0.len())
    }
}

/// Run one collection cycle: obtain a listing from `source` and parse it.  Failure to obtain the
/// listing and failure to parse it are both errors; there is no partial result.

pub fn collect_jobs(source: &dyn JobSource) -> Result<JobMap, CollectError> {
    let bytes = source.fetch()?;
    let (jobs, discarded) = parse_jobs(&bytes)?;
    debug!(
        "{}: {} bytes, {} jobs, {} lines discarded",
        source.describe(),
        bytes.len(),
        jobs.len(),
        discarded
    );
    Ok(jobs)
}

#[test]
fn test_squeue_args() {
    let s = SqueueSource::new("squeue", &[], 5);
    assert!(s.args() == ["-h", "--states=R", "-o", "%i|%P|%j|%u|%T|%S|%M|%D|%N"]);
    assert!(s.timeout_seconds() == 5);
    let s = SqueueSource::new("/opt/slurm/bin/squeue", &["R".to_string(), "CG".to_string()], 5);
    assert!(s.program() == "/opt/slurm/bin/squeue");
    assert!(s.args()[1] == "--states=R,CG");
}

#[test]
fn test_collect_static() {
    let src = StaticSource(
        b"42|gpu|train|alice|RUNNING|2024-01-01T00:00:00|01:02:03|2|node[01-02]\n".to_vec(),
    );
    let jobs = collect_jobs(&src).unwrap();
    assert!(jobs.len() == 1);
    assert!(jobs["42"].node_list_expanded == vec!["node01", "node02"]);

    // Fresh every time, nothing retained.
    let again = collect_jobs(&src).unwrap();
    assert!(jobs == again);
    assert!(collect_jobs(&StaticSource::default()).unwrap().is_empty());
}

#[test]
fn test_collect_file() {
    let jobs = collect_jobs(&FileSource::new("../tests/squeuelog/squeue-running.txt")).unwrap();
    assert!(jobs.len() == 6);
    assert!(matches!(
        collect_jobs(&FileSource::new("../tests/squeuelog/no-such-file.txt")),
        Err(CollectError::Source(SourceError::Read { .. }))
    ));
}

#[test]
fn test_collect_command_failure() {
    // `false` runs but exits nonzero: a transport failure, not an empty listing.
    let src = SqueueSource::new("false", &[], 10);
    assert!(matches!(
        collect_jobs(&src),
        Err(CollectError::Source(SourceError::Command(_)))
    ));
}

#[test]
fn test_collect_parse_failure() {
    // `echo` just prints its arguments, which look like a job with a bogus elapsed time ("%M").
    let src = SqueueSource::new("echo", &[], 10);
    assert!(matches!(collect_jobs(&src), Err(CollectError::Parse(_))));
}

#[test]
fn test_collect_pipes_dedup() {
    // End to end through a real process.
    let line = "42|gpu|train|alice|RUNNING|2024-01-01T00:00:00|01:02:03|2|node[01-02]";
    let src = SqueueSource {
        program: "printf".to_string(),
        args: vec![format!("{line}\\n{line}\\n\\n")],
        timeout_seconds: 10,
    };
    let jobs = collect_jobs(&src).unwrap();
    assert!(jobs.len() == 1);
    assert!(jobs["42"].running_time_sec == 3723);
}

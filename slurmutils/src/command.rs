// Execute a command with a timeout and safe handling of the communication.
//
// The command is run directly, not through a shell, so arguments need no quoting.

use log::{debug, trace};
use std::io;
use std::time::Duration;
use subprocess::{Exec, ExitStatus, PopenError, Redirection};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: PopenError,
    },

    #[error("{program} timed out after {seconds}s")]
    Timeout { program: String, seconds: u64 },

    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Communication with {program} failed: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// Run `program` with `args`, wait at most `timeout_seconds` for it to finish, and return its
/// standard output.  The child is terminated if it runs over time.  Exiting with a nonzero status
/// is an error whose text is the child's standard error output.

pub fn run_with_timeout(
    program: &str,
    args: &[String],
    timeout_seconds: u64,
) -> Result<Vec<u8>, CommandError> {
    debug!("Running {} {:?}", program, args);
    let mut p = Exec::cmd(program)
        .args(args)
        .stdout(Redirection::Pipe)
        .stderr(Redirection::Pipe)
        .popen()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    // The pipes have a limited capacity and the child stops when they fill up, so we must drain
    // them while we wait for the child, or large outputs will look like hangs.  See
    //
    //   https://github.com/rust-lang/rust/issues/45572
    //
    // The communicator does that for us, and it also gives us the time limit.

    let mut comm = p
        .communicate_start(None)
        .limit_time(Duration::new(timeout_seconds, 0));
    let mut stdout_result = vec![];
    let mut stderr_result = vec![];
    let failure = loop {
        match comm.read() {
            Ok((Some(stdout), Some(stderr))) => {
                if stdout.is_empty() && stderr.is_empty() {
                    // EOF on both; timeouts are signaled as Err()
                    break None;
                }
                stdout_result.extend_from_slice(&stdout);
                stderr_result.extend_from_slice(&stderr);
            }
            Ok((_, _)) => {
                break Some(io::Error::new(
                    io::ErrorKind::Other,
                    "Output pipe was not captured",
                ));
            }
            Err(e) => {
                if e.error.kind() == io::ErrorKind::TimedOut {
                    // Command is hung
                    let _ = p.terminate();
                    let _ = p.wait();
                    return Err(CommandError::Timeout {
                        program: program.to_string(),
                        seconds: timeout_seconds,
                    });
                }
                break Some(e.error);
            }
        }
    };

    let status = p.wait().map_err(|e| CommandError::Io {
        program: program.to_string(),
        source: io::Error::new(io::ErrorKind::Other, e.to_string()),
    })?;
    if let Some(source) = failure {
        return Err(CommandError::Io {
            program: program.to_string(),
            source,
        });
    }
    trace!("{} produced {} bytes", program, stdout_result.len());

    match status {
        ExitStatus::Exited(0) => Ok(stdout_result),
        status => Err(CommandError::Failed {
            program: program.to_string(),
            status: format!("{:?}", status),
            stderr: String::from_utf8_lossy(&stderr_result).trim_end().to_string(),
        }),
    }
}

#[test]
fn test_run_ok() {
    let out = run_with_timeout("echo", &["hello".to_string(), "there".to_string()], 10).unwrap();
    assert!(out == b"hello there\n");
}

#[test]
fn test_run_large_output() {
    // More than a pipe's worth of output must not look like a hang.
    let out = run_with_timeout("seq", &["1".to_string(), "100000".to_string()], 10).unwrap();
    assert!(out.ends_with(b"99999\n100000\n"));
}

#[test]
fn test_run_failed() {
    let args = ["-c".to_string(), "echo oops >&2; exit 3".to_string()];
    match run_with_timeout("sh", &args, 10) {
        Err(CommandError::Failed { stderr, .. }) => assert!(stderr == "oops"),
        _ => assert!(false),
    }
}

#[test]
fn test_run_missing_program() {
    assert!(matches!(
        run_with_timeout("/no/such/program", &[], 10),
        Err(CommandError::Spawn { .. })
    ));
}

#[test]
fn test_run_timeout() {
    assert!(matches!(
        run_with_timeout("sleep", &["10".to_string()], 1),
        Err(CommandError::Timeout { seconds: 1, .. })
    ));
}

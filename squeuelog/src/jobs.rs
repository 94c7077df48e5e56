/// Parser for the squeue job listing, see lib.rs for the format.
///
/// NOTE:
///
/// - A line with fewer than NUM_FIELDS fields is dropped and counted, with a warning.  This is
///   what a truncated or otherwise corrupted line looks like, and it can't be a job.
///
/// - A line with more than NUM_FIELDS fields has `|` in the job name, since that is the only
///   free-form field.  The other fields are found by counting from either end.
///
/// - A non-numeric elapsed time or node count fails the parse.  See lib.rs.
///
/// - If a job id appears on more than one (distinct) line the last one in sorted order wins.
use crate::{sort_and_dedup, JobMap, JobRecord, JobsError};

use log::{debug, warn};
use slurmutils::{expand_hostlist_counted, parse_elapsed};
use ustr::Ustr;

pub const NUM_FIELDS: usize = 9;

/// Parse a raw squeue listing into a map from job id to record.  Returns the map and the number of
/// discarded lines, or an error if a numeric field could not be read.  Blank lines are ignored and
/// not counted.  The input need not be UTF-8, bad bytes are replaced.

pub fn parse_jobs(input: &[u8]) -> Result<(JobMap, usize), JobsError> {
    let text = String::from_utf8_lossy(input);
    let mut jobs = JobMap::new();
    let mut discarded = 0;

    let lines = sort_and_dedup(text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)));
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let fields = line.split('|').collect::<Vec<&str>>();
        if fields.len() < NUM_FIELDS || fields[0].is_empty() {
            warn!(
                "Skipping malformed squeue line ({} fields): {}",
                fields.len(),
                line
            );
            discarded += 1;
            continue;
        }
        let job = parse_fields(&fields)?;
        if let Some(old) = jobs.insert(job.job_id.clone(), job) {
            debug!("Job {} is listed more than once, keeping the last", old.job_id);
        }
    }

    Ok((jobs, discarded))
}

// `fields` has at least NUM_FIELDS elements.  The start time (fields[n-4]) is not used.

fn parse_fields(fields: &[&str]) -> Result<JobRecord, JobsError> {
    let n = fields.len();
    let job_id = fields[0].to_string();
    let name = fields[2..n - 6].join("|");
    let elapsed = fields[n - 3];
    let count = fields[n - 2];
    let node_list = fields[n - 1];

    let running_time_sec = parse_elapsed(elapsed).map_err(|source| JobsError::ElapsedTime {
        job: job_id.clone(),
        source,
    })?;
    let node_count = parse_count(count).ok_or_else(|| JobsError::NodeCount {
        job: job_id.clone(),
        value: count.to_string(),
    })?;

    let (node_list_expanded, malformed) = expand_hostlist_counted(node_list);
    if malformed > 0 {
        warn!(
            "Job {}: dropped {} malformed item(s) from node list {}",
            job_id, malformed, node_list
        );
    }
    if node_list_expanded.len() as u64 != node_count {
        debug!(
            "Job {}: node list {} has {} hosts but node count is {}",
            job_id,
            node_list,
            node_list_expanded.len(),
            node_count
        );
    }

    Ok(JobRecord {
        job_id,
        partition: Ustr::from(fields[1]),
        name,
        user: Ustr::from(fields[n - 6]),
        state: Ustr::from(fields[n - 5]),
        running_time_sec,
        node_count,
        node_list: node_list.to_string(),
        node_list_expanded,
    })
}

// Plain decimal digits only: no sign, no blanks.

fn parse_count(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()
}

#[cfg(test)]
fn hosts(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|x| x.to_string()).collect()
}

#[test]
fn test_parse_one_job() {
    let input = b"42|gpu|train|alice|RUNNING|2024-01-01T00:00:00|01:02:03|2|node[01-02]\n";
    let (jobs, discarded) = parse_jobs(input).unwrap();
    assert!(discarded == 0);
    assert!(jobs.len() == 1);
    let j = &jobs["42"];
    assert!(j.job_id == "42");
    assert!(j.partition.as_str() == "gpu");
    assert!(j.name == "train");
    assert!(j.user.as_str() == "alice");
    assert!(j.state.as_str() == "RUNNING");
    assert!(j.running_time_sec == 3723);
    assert!(j.node_count == 2);
    assert!(j.node_list == "node[01-02]");
    assert!(j.node_list_expanded == hosts(&["node01", "node02"]));
}

#[test]
fn test_parse_duplicates_collapse() {
    let line = "42|gpu|train|alice|RUNNING|2024-01-01T00:00:00|01:02:03|2|node[01-02]";
    let input = format!("{line}\n{line}\n\n{line}\n");
    let (jobs, discarded) = parse_jobs(input.as_bytes()).unwrap();
    assert!(discarded == 0);
    assert!(jobs.len() == 1);
    assert!(jobs["42"].running_time_sec == 3723);
}

#[test]
fn test_parse_last_write_wins() {
    // Same job, different elapsed time (a volatile field).  Sorted order puts 01:02:04 last.
    let input = "7|p|n|u|RUNNING|x|01:02:04|1|c1\n7|p|n|u|RUNNING|x|01:02:03|1|c1\n";
    let (jobs, _) = parse_jobs(input.as_bytes()).unwrap();
    assert!(jobs.len() == 1);
    assert!(jobs["7"].running_time_sec == 3724);
}

#[test]
fn test_parse_short_lines_skipped() {
    let input = "\
1|batch|a|bob|RUNNING|2024-01-01T00:00:00|10:00|1|c1
2|batch|b|bob|RUNNING
garbage
|batch|c|bob|RUNNING|2024-01-01T00:00:00|10:00|1|c1
3|batch|d|bob|RUNNING|2024-01-01T00:00:00|1-00:00:00|3|c[2-4]
";
    let (jobs, discarded) = parse_jobs(input.as_bytes()).unwrap();
    assert!(discarded == 3);
    assert!(jobs.len() == 2);
    assert!(jobs["1"].running_time_sec == 600);
    assert!(jobs["3"].running_time_sec == 86400);
    assert!(jobs["3"].node_list_expanded == hosts(&["c2", "c3", "c4"]));
}

#[test]
fn test_parse_pipe_in_name() {
    let input = b"9|long|a|b||c|carol|RUNNING|2024-01-01T00:00:00|05:00|1|c7";
    let (jobs, discarded) = parse_jobs(input).unwrap();
    assert!(discarded == 0);
    let j = &jobs["9"];
    assert!(j.name == "a|b||c");
    assert!(j.user.as_str() == "carol");
    assert!(j.running_time_sec == 300);
    assert!(j.node_list_expanded == hosts(&["c7"]));
}

#[test]
fn test_parse_crlf_and_no_trailing_newline() {
    let input = b"1|p|n|u|RUNNING|x|00:10|1|c1\r\n2|p|n|u|RUNNING|x|00:20|1|c2";
    let (jobs, discarded) = parse_jobs(input).unwrap();
    assert!(discarded == 0);
    assert!(jobs["1"].node_list == "c1");
    assert!(jobs["2"].running_time_sec == 20);
}

#[test]
fn test_parse_empty() {
    let (jobs, discarded) = parse_jobs(b"").unwrap();
    assert!(jobs.is_empty() && discarded == 0);
    let (jobs, discarded) = parse_jobs(b"\n\n").unwrap();
    assert!(jobs.is_empty() && discarded == 0);
}

#[test]
fn test_parse_bad_elapsed_is_fatal() {
    let input = "\
1|p|n|u|RUNNING|x|00:10|1|c1
2|p|n|u|RUNNING|x|INVALID|1|c2
";
    match parse_jobs(input.as_bytes()) {
        Err(JobsError::ElapsedTime { job, .. }) => assert!(job == "2"),
        _ => assert!(false),
    }
}

#[test]
fn test_parse_bad_node_count_is_fatal() {
    let input = b"1|p|n|u|RUNNING|x|00:10|one|c1\n";
    match parse_jobs(input) {
        Err(JobsError::NodeCount { job, value, .. }) => assert!(job == "1" && value == "one"),
        _ => assert!(false),
    }
    // A sign is not part of a count, even if Rust's integer parser would take it.
    let input = b"1|p|n|u|RUNNING|x|00:10|+2|c[1-2]\n";
    match parse_jobs(input) {
        Err(JobsError::NodeCount { value, .. }) => assert!(value == "+2"),
        _ => assert!(false),
    }
    for count in ["", " 2", "-1", "99999999999999999999"] {
        let input = format!("1|p|n|u|RUNNING|x|00:10|{count}|c1\n");
        assert!(matches!(parse_jobs(input.as_bytes()), Err(JobsError::NodeCount { .. })));
    }
    // Nor is it part of an elapsed time.
    let input = b"1|p|n|u|RUNNING|x|+1:+02|1|c1\n";
    assert!(matches!(parse_jobs(input), Err(JobsError::ElapsedTime { .. })));
}

#[test]
fn test_parse_count_mismatch_is_kept() {
    // The count and the list disagree, and a range is malformed; neither is an error.
    let input = b"5|p|n|u|RUNNING|x|00:10|4|c[1-2,9-3]\n";
    let (jobs, discarded) = parse_jobs(input).unwrap();
    assert!(discarded == 0);
    assert!(jobs["5"].node_count == 4);
    assert!(jobs["5"].node_list_expanded == hosts(&["c1", "c2"]));
}

#[test]
fn test_parse_deterministic() {
    let input = std::fs::read("../tests/squeuelog/squeue-running.txt").unwrap();
    let (a, da) = parse_jobs(&input).unwrap();
    let (b, db) = parse_jobs(&input).unwrap();
    assert!(a == b);
    assert!(da == db);
}

#[test]
fn test_parse_fixture() {
    let input = std::fs::read("../tests/squeuelog/squeue-running.txt").unwrap();
    let (jobs, discarded) = parse_jobs(&input).unwrap();
    assert!(discarded == 1);
    assert!(jobs.len() == 6);

    let j = &jobs["1042"];
    assert!(j.partition.as_str() == "normal");
    assert!(j.name == "relax-md");
    assert!(j.user.as_str() == "ec-hpc");
    assert!(j.running_time_sec == 2 * 86400 + 3 * 3600 + 4 * 60 + 5);
    assert!(j.node_count == 16);
    assert!(j.node_list_expanded.len() == 16);
    assert!(j.node_list_expanded[0] == "c1-08");
    assert!(j.node_list_expanded[2] == "c1-10");
    assert!(j.node_list_expanded[15] == "c3-1");

    let j = &jobs["1050_3"];
    assert!(j.state.as_str() == "COMPLETING");
    assert!(j.running_time_sec == 59);
    assert!(j.node_list_expanded == hosts(&["gpu-4"]));
}

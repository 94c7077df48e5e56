/// An `squeue` job listing is a line-oriented text: one line per job, fields separated by `|`, in
/// the order given by the format string `%i|%P|%j|%u|%T|%S|%M|%D|%N`, that is,
///
///   job id | partition | job name | user | state | start time | elapsed time | node count | nodes
///
/// The listing is produced by an external program that we run once per *collection cycle*.  The
/// output is irregular in several ways:
///
/// - the same line can appear more than once (eg for array jobs or heterogeneous jobs, depending
///   on the Slurm version and flags), and there is usually a blank line at the end
///
/// - the elapsed time has a width that varies with the magnitude, MM:SS up to D-HH:MM:SS
///
/// - the node list is compressed, eg `c[01-04,9]`
///
/// - job names are chosen by users and can contain `|`
///
/// This library has as its fundamental task to turn such a listing into a clean set of job
/// records, one per job id.  The task breaks down into a number of subtasks:
///
/// - Obtain the raw listing from some source: normally by running `squeue`, but a file or a byte
///   buffer will do, which is what tests use.
///
/// - Sort the lines and remove duplicates.
///
/// - Split each line into fields and normalize the fields: times to seconds, node lists to host
///   names.
///
/// The policy for bad input is per kind of field.  A line with too few fields is dropped and
/// counted, since it can't be a job.  A node list that does not parse is expanded as well as we
/// can.  But a number we can't read fails the entire parse: we would rather report nothing than
/// report a wrong time or node count.
///
/// The record set is rebuilt from scratch every time and nothing is retained between cycles.

mod dedup;
mod error;
mod jobs;
mod source;

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use ustr::Ustr;

// Sort a set of raw lines and remove duplicates.

pub use dedup::sort_and_dedup;

// Parse an squeue listing into a JobMap, returning also the number of discarded lines.

pub use jobs::parse_jobs;

// The number of `|`-separated fields on a well-formed line.

pub use jobs::NUM_FIELDS;

// Error taxonomy: bad numeric fields, failure to obtain the listing, either of those.

pub use error::CollectError;
pub use error::JobsError;
pub use error::SourceError;

// Something that can produce the raw bytes of an squeue listing.

pub use source::JobSource;

// Sources: run squeue, read a file, or just hand over some bytes.

pub use source::FileSource;
pub use source::SqueueSource;
pub use source::StaticSource;

// Defaults for running squeue.

pub use source::DEFAULT_STATES;
pub use source::DEFAULT_TIMEOUT_SECONDS;
pub use source::SQUEUE_ENV;
pub use source::SQUEUE_FORMAT;

// Run one collection cycle: fetch from a source and parse.

pub use source::collect_jobs;

/// The JobRecord holds normalized data for one job.
///
/// The partition, user and state are interned since there are few distinct values of those and
/// many jobs.

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    /// Slurm's job id, eg `1234` or `1234_7` for an array task.  Key of the JobMap.
    pub job_id: String,

    #[serde(serialize_with = "serialize_ustr")]
    pub partition: Ustr,

    pub name: String,

    #[serde(serialize_with = "serialize_ustr")]
    pub user: Ustr,

    /// Eg RUNNING, COMPLETING.  Kept as text, not interpreted.
    #[serde(serialize_with = "serialize_ustr")]
    pub state: Ustr,

    /// Elapsed time converted to seconds.
    pub running_time_sec: u64,

    /// Number of allocated nodes, as reported by Slurm.
    pub node_count: u64,

    /// The node list as received, eg `c[01-04]`.
    pub node_list: String,

    /// The node list expanded to one host name per node.  Normally this has `node_count`
    /// elements, but nothing guarantees it: the two come from different fields.
    pub node_list_expanded: Vec<String>,
}

/// Map from job id to the job's record.

pub type JobMap = HashMap<String, JobRecord>;

fn serialize_ustr<S: Serializer>(u: &Ustr, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(u.as_str())
}

#[test]
fn test_serialize_record() {
    let (jobs, _) = parse_jobs(b"42|gpu|train|alice|RUNNING|x|01:02:03|2|node[01-02]\n").unwrap();
    let v = serde_json::to_value(&jobs["42"]).unwrap();
    assert!(v["partition"] == "gpu");
    assert!(v["user"] == "alice");
    assert!(v["state"] == "RUNNING");
    assert!(v["running_time_sec"].as_u64() == Some(3723));
    assert!(v["node_list_expanded"][0] == "node01");
}

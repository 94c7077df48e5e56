/// Print the job record set as a table.  The rows are ordered by job id.
use crate::format;
use crate::{JobsPrintArgs, MetaArgs};

use anyhow::Result;
use slurmutils::compress_hostnames;
use squeuelog::{JobMap, JobRecord};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::io;

pub fn print_jobs(
    output: &mut dyn io::Write,
    print_args: &JobsPrintArgs,
    meta_args: &MetaArgs,
    jobs: JobMap,
) -> Result<()> {
    let mut records = jobs.into_values().collect::<Vec<JobRecord>>();
    records.sort_by(|a, b| compare_job_ids(&a.job_id, &b.job_id));

    if meta_args.raw {
        for r in &records {
            serde_json::to_writer(&mut *output, r)?;
            output.write_all(b"\n")?;
        }
        return Ok(());
    }

    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt.as_str()
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let opts = format::standard_options(&others);
    format::format_data(output, &fields, &formatters, &opts, records, &false)
}

// Ids sort by their leading number, so that 9 comes before 10 and an array task 1050_3 comes
// after 1046, and then as text.  Ids without a leading number come first.

fn compare_job_ids(a: &str, b: &str) -> Ordering {
    leading_number(a)
        .cmp(&leading_number(b))
        .then_with(|| a.cmp(b))
}

fn leading_number(id: &str) -> Option<u64> {
    let end = id.find(|c: char| !c.is_ascii_digit()).unwrap_or(id.len());
    id[..end].parse::<u64>().ok()
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters.keys().cloned().collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "job,user,partition,state,time,nodes,nodelist";

type JobDatum<'a> = &'a JobRecord;
type JobCtx<'a> = &'a bool;

#[allow(clippy::type_complexity)]
fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(JobDatum, JobCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(JobDatum, JobCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();

    formatters.insert("job".to_string(), &format_job);
    formatters.insert("partition".to_string(), &format_partition);
    formatters.insert("name".to_string(), &format_name);
    formatters.insert("user".to_string(), &format_user);
    formatters.insert("state".to_string(), &format_state);
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("runtime".to_string(), &format_runtime);
    formatters.insert("nodes".to_string(), &format_nodes);
    formatters.insert("nodelist".to_string(), &format_nodelist);
    formatters.insert("hosts".to_string(), &format_hosts);

    aliases.insert(
        "all".to_string(),
        [
            "job", "partition", "name", "user", "state", "time", "runtime", "nodes", "nodelist",
            "hosts",
        ]
        .iter()
        .map(|x| x.to_string())
        .collect(),
    );
    aliases.insert(
        "default".to_string(),
        FMT_DEFAULTS.split(',').map(|x| x.to_string()).collect(),
    );

    (formatters, aliases)
}

fn format_job(d: JobDatum, _: JobCtx) -> String {
    d.job_id.clone()
}

fn format_partition(d: JobDatum, _: JobCtx) -> String {
    d.partition.to_string()
}

fn format_name(d: JobDatum, _: JobCtx) -> String {
    d.name.clone()
}

fn format_user(d: JobDatum, _: JobCtx) -> String {
    d.user.to_string()
}

fn format_state(d: JobDatum, _: JobCtx) -> String {
    d.state.to_string()
}

fn format_time(d: JobDatum, _: JobCtx) -> String {
    d.running_time_sec.to_string()
}

// Slurm's own D-HH:MM:SS notation, days only when nonzero.

fn format_runtime(d: JobDatum, _: JobCtx) -> String {
    let t = d.running_time_sec;
    let (days, hours, minutes, seconds) = (t / 86400, (t / 3600) % 24, (t / 60) % 60, t % 60);
    if days > 0 {
        format!("{days}-{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    }
}

fn format_nodes(d: JobDatum, _: JobCtx) -> String {
    d.node_count.to_string()
}

fn format_nodelist(d: JobDatum, _: JobCtx) -> String {
    d.node_list.clone()
}

// The expanded list, recompressed.  Differs from `nodelist` only if that was not in canonical
// form, or had malformed parts.

fn format_hosts(d: JobDatum, _: JobCtx) -> String {
    compress_hostnames(&d.node_list_expanded).join(",")
}

#[cfg(test)]
fn print_string(fmt: Option<&str>, raw: bool) -> String {
    let input = std::fs::read("../tests/squeuelog/squeue-running.txt").unwrap();
    let jobs = squeuelog::parse_jobs(&input).unwrap().0;
    let print_args = JobsPrintArgs {
        fmt: fmt.map(|s| s.to_string()),
    };
    let meta_args = MetaArgs {
        verbose: false,
        raw,
    };
    let mut out = Vec::new();
    print_jobs(&mut out, &print_args, &meta_args, jobs).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_compare_job_ids() {
    assert!(compare_job_ids("9", "10") == Ordering::Less);
    assert!(compare_job_ids("10", "10") == Ordering::Equal);
    assert!(compare_job_ids("1050_3", "1046") == Ordering::Greater);
    assert!(compare_job_ids("10", "10_1") == Ordering::Less);
    assert!(compare_job_ids("x", "1") == Ordering::Less);
}

#[test]
fn test_format_runtime() {
    let input = b"1|p|n|u|RUNNING|x|1-02:03:04|1|c1\n2|p|n|u|RUNNING|x|00:59|1|c1\n";
    let jobs = squeuelog::parse_jobs(input).unwrap().0;
    assert!(format_runtime(&jobs["1"], &false) == "1-02:03:04");
    assert!(format_runtime(&jobs["2"], &false) == "00:00:59");
}

#[test]
fn test_print_awk() {
    let s = print_string(Some("job,user,nodes,hosts,awk"), false);
    let lines = s.lines().collect::<Vec<&str>>();
    assert!(
        lines
            == vec![
                "1042 ec-hpc 16 c1-[08-19],c2-[1-3],c3-1",
                "1043 ec-ml 2 gpu-[1-2]",
                "1044 ec-bio 1 hugemem-1",
                "1045 ec-hpc 1 c5-33",
                "1046 ec-chem 4 c[101-104]",
                "1050_3 ec-ml 1 gpu-4",
            ]
    );
}

#[test]
fn test_print_csv_named() {
    let s = print_string(Some("job,name,runtime,csvnamed"), false);
    let first = s.lines().next().unwrap();
    assert!(first == "job=1042,name=relax-md,runtime=2-03:04:05");
    assert!(s.contains("job=1046,name=array|x,runtime=10:00:00"));
}

#[test]
fn test_print_default_fixed() {
    let s = print_string(None, false);
    let lines = s.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 7);
    assert!(lines[0].starts_with("job"));
    assert!(lines[0].ends_with("nodelist"));
    assert!(lines[6].starts_with("1050_3"));
}

#[test]
fn test_print_raw() {
    let s = print_string(None, true);
    let lines = s.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 6);
    let v: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert!(v["job_id"] == "1043");
    assert!(v["user"] == "ec-ml");
    assert!(v["running_time_sec"].as_u64() == Some(13 * 3600 + 37 * 60));
    assert!(v["node_list_expanded"][1] == "gpu-2");
}

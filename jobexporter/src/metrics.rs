/// Turn a job record set into Prometheus gauges and render them in the text exposition format.
///
/// Every rendering starts from a fresh registry, so a job that has ended simply disappears from
/// the next rendering; no series are retained.
use anyhow::{Context, Result};
use log::debug;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use squeuelog::{collect_jobs, JobMap, JobSource};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process;

pub const RUNNING_SEC: &str = "job_running_sec";
pub const RUNNING_NODESCOUNT: &str = "job_running_nodescount";

const LABELS: [&str; 6] = [
    "job",
    "partition",
    "name",
    "user",
    "nodeslist",
    "nodelistexpanded",
];

/// Run one collection cycle against `source` and render the result.  An error from the source or
/// the parser fails the whole rendering; there is no partial output.

pub fn collect_and_render(source: &dyn JobSource, exclude_user: &[String]) -> Result<String> {
    let jobs = collect_jobs(source)?;
    render_metrics(&jobs, exclude_user)
}

/// Render one sample per job per gauge, skipping jobs owned by users in `exclude_user`.

pub fn render_metrics(jobs: &JobMap, exclude_user: &[String]) -> Result<String> {
    let registry = Registry::new();
    let running_sec = GaugeVec::new(
        Opts::new(
            RUNNING_SEC,
            "Time a running job has spent running until now, in seconds",
        ),
        &LABELS,
    )?;
    let nodescount = GaugeVec::new(
        Opts::new(
            RUNNING_NODESCOUNT,
            "Number of nodes a running job has allocated",
        ),
        &LABELS,
    )?;
    registry.register(Box::new(running_sec.clone()))?;
    registry.register(Box::new(nodescount.clone()))?;

    let mut excluded = 0;
    for job in jobs.values() {
        if exclude_user.iter().any(|u| u.as_str() == job.user.as_str()) {
            excluded += 1;
            continue;
        }
        let expanded = job.node_list_expanded.join(", ");
        let labels = [
            job.job_id.as_str(),
            job.partition.as_str(),
            job.name.as_str(),
            job.user.as_str(),
            job.node_list.as_str(),
            expanded.as_str(),
        ];
        running_sec
            .with_label_values(&labels)
            .set(job.running_time_sec as f64);
        nodescount
            .with_label_values(&labels)
            .set(job.node_count as f64);
    }
    debug!("{} jobs exported, {} excluded", jobs.len() - excluded, excluded);

    let mut buffer = vec![];
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Write the rendering to stdout, or to `path` if given.  A file is replaced atomically, since a
/// textfile collector may read it at any time.

pub fn write_metrics(path: Option<&str>, text: &str) -> Result<()> {
    if let Some(path) = path {
        let path = Path::new(path);
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            path.file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_default(),
            process::id()
        ));
        fs::write(&tmp, text).with_context(|| format!("Could not write {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Could not replace {}", path.display()));
        }
    } else {
        let mut stdout = std::io::stdout();
        stdout.write_all(text.as_bytes())?;
        stdout.flush()?;
    }
    Ok(())
}

#[cfg(test)]
use squeuelog::StaticSource;

#[test]
fn test_render_one_job() {
    let src = StaticSource(
        b"42|gpu|train|alice|RUNNING|2024-01-01T00:00:00|01:02:03|2|node[01-02]\n".to_vec(),
    );
    let text = collect_and_render(&src, &[]).unwrap();
    assert!(text.contains(
        "# HELP job_running_sec Time a running job has spent running until now, in seconds"
    ));
    assert!(text.contains("# TYPE job_running_sec gauge"));
    assert!(text.contains("# TYPE job_running_nodescount gauge"));

    let samples = text
        .lines()
        .filter(|l| !l.starts_with('#'))
        .collect::<Vec<&str>>();
    assert!(samples.len() == 2);
    for s in &samples {
        assert!(s.contains("job=\"42\""));
        assert!(s.contains("partition=\"gpu\""));
        assert!(s.contains("name=\"train\""));
        assert!(s.contains("user=\"alice\""));
        assert!(s.contains("nodeslist=\"node[01-02]\""));
        assert!(s.contains("nodelistexpanded=\"node01, node02\""));
    }
    assert!(samples.iter().any(|s| s.starts_with("job_running_sec{") && s.ends_with(" 3723")));
    assert!(samples.iter().any(|s| s.starts_with("job_running_nodescount{") && s.ends_with(" 2")));
}

#[test]
fn test_render_exclude_user() {
    let input = std::fs::read("../tests/squeuelog/squeue-running.txt").unwrap();
    let jobs = squeuelog::parse_jobs(&input).unwrap().0;
    let text = render_metrics(&jobs, &[]).unwrap();
    assert!(text.lines().filter(|l| l.starts_with("job_running_sec{")).count() == 6);

    let text = render_metrics(&jobs, &["ec-ml".to_string()]).unwrap();
    assert!(text.lines().filter(|l| l.starts_with("job_running_sec{")).count() == 4);
    assert!(!text.contains("user=\"ec-ml\""));

    // The record set is not touched.
    assert!(jobs.len() == 6);
}

#[test]
fn test_render_fresh_each_time() {
    let two = StaticSource(
        b"1|p|a|u|RUNNING|x|00:10|1|c1\n2|p|b|u|RUNNING|x|00:20|1|c2\n".to_vec(),
    );
    let one = StaticSource(b"2|p|b|u|RUNNING|x|00:30|1|c2\n".to_vec());
    let text = collect_and_render(&two, &[]).unwrap();
    assert!(text.contains("job=\"1\""));
    let text = collect_and_render(&one, &[]).unwrap();
    assert!(!text.contains("job=\"1\""));
    assert!(text.lines().any(|l| l.starts_with("job_running_sec{") && l.ends_with(" 30")));
}

#[test]
fn test_render_fails_on_bad_input() {
    let src = StaticSource(b"1|p|a|u|RUNNING|x|soon|1|c1\n".to_vec());
    assert!(collect_and_render(&src, &[]).is_err());
}

#[test]
fn test_write_metrics_file() {
    let dir = std::env::temp_dir().join(format!("jobexporter-test-{}", process::id()));
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("jobs.prom");
    let path = path.to_str().unwrap();
    write_metrics(Some(path), "first\n").unwrap();
    write_metrics(Some(path), "second\n").unwrap();
    assert!(fs::read_to_string(path).unwrap() == "second\n");
    // No temporary files left behind.
    assert!(fs::read_dir(&dir).unwrap().count() == 1);
    fs::remove_dir_all(&dir).unwrap();
}

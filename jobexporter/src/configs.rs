/// Read exporter configuration from a json file, and merge it with the command line and the
/// environment.
///
/// File format:
///
/// An object { ... } with the following named fields and value types, all optional:
///
///   squeue - string, the path of the squeue program to run
///   states - array of strings, the Slurm job states to list, eg ["R"] or ["R", "CG"]
///   timeout - unsigned integer, seconds to wait for squeue before giving up
///   exclude-user - array of strings, user names whose jobs should not be exported
///
/// Any field name starting with '#' is reserved for arbitrary comments.  Any other field name is
/// an error, so that misspellings are caught.
///
/// A setting on the command line overrides the same setting in the file, which overrides the
/// environment ($JOBEXPORTER_SQUEUE for the program), which overrides the built-in default.
use anyhow::{bail, Context, Result};
use serde_json::Value;
use squeuelog::{
    FileSource, JobSource, SqueueSource, DEFAULT_STATES, DEFAULT_TIMEOUT_SECONDS,
};
use std::fs::File;
use std::io::BufReader;
use std::path;

// See above comment block for field documentation.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub squeue: Option<String>,
    pub states: Vec<String>,
    pub timeout: Option<u64>,
    pub exclude_user: Vec<String>,
}

const KNOWN_FIELDS: [&str; 4] = ["squeue", "states", "timeout", "exclude-user"];

/// Since the input is human-generated and has optional fields, I've opted to use the generic JSON
/// parser followed by explicit decoding of the fields, rather than a (derived) strongly-typed
/// parser.

pub fn read_exporter_config(filename: &str) -> Result<ExporterConfig> {
    let file = File::open(path::Path::new(filename))
        .with_context(|| format!("Could not open config file {filename}"))?;
    let reader = BufReader::new(file);
    let v: Value = serde_json::from_reader(reader)
        .with_context(|| format!("Could not parse config file {filename}"))?;
    let Value::Object(fields) = v else {
        bail!("Config file {filename}: expected an object value")
    };
    for name in fields.keys() {
        if !name.starts_with('#') && !KNOWN_FIELDS.contains(&name.as_str()) {
            bail!("Config file {filename}: unknown field '{name}'")
        }
    }
    Ok(ExporterConfig {
        squeue: grab_string_opt(&fields, "squeue")?,
        states: grab_strings_opt(&fields, "states")?,
        timeout: grab_u64_opt(&fields, "timeout")?,
        exclude_user: grab_strings_opt(&fields, "exclude-user")?,
    })
}

fn grab_string_opt(
    fields: &serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<String>> {
    if let Some(val) = fields.get(name) {
        if let Value::String(s) = val {
            Ok(Some(s.to_string()))
        } else {
            bail!("Field '{name}' must have a string value");
        }
    } else {
        Ok(None)
    }
}

fn grab_strings_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Vec<String>> {
    let mut result = vec![];
    if let Some(val) = fields.get(name) {
        let Value::Array(vals) = val else {
            bail!("Field '{name}' must have an array value");
        };
        for v in vals {
            if let Value::String(s) = v {
                result.push(s.to_string());
            } else {
                bail!("Field '{name}' must have string values");
            }
        }
    }
    Ok(result)
}

fn grab_u64_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<u64>> {
    if let Some(val) = fields.get(name) {
        if let Some(n) = val.as_u64() {
            Ok(Some(n))
        } else {
            bail!("Field '{name}' must have unsigned integer value")
        }
    } else {
        Ok(None)
    }
}

/// The settings that are in effect after merging the sources of configuration.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub squeue: String,
    pub states: Vec<String>,
    pub timeout: u64,
    pub exclude_user: Vec<String>,
    pub input_file: Option<String>,
}

/// Settings given on the command line, None or empty when absent.

#[derive(Debug, Default, Clone)]
pub struct CliSettings {
    pub squeue: Option<String>,
    pub states: Option<String>,
    pub timeout: Option<u64>,
    pub exclude_user: Vec<String>,
    pub input_file: Option<String>,
    pub config_file: Option<String>,
}

pub fn resolve_settings(cli: &CliSettings) -> Result<Settings> {
    let config = if let Some(ref filename) = cli.config_file {
        read_exporter_config(filename)?
    } else {
        ExporterConfig::default()
    };
    Ok(merge_settings(cli, config))
}

fn merge_settings(cli: &CliSettings, config: ExporterConfig) -> Settings {
    let squeue = cli
        .squeue
        .clone()
        .or(config.squeue)
        .unwrap_or_else(SqueueSource::default_program);

    let states = if let Some(ref s) = cli.states {
        s.split(',')
            .filter(|x| !x.is_empty())
            .map(|x| x.to_string())
            .collect::<Vec<String>>()
    } else {
        config.states
    };
    let states = if states.is_empty() {
        DEFAULT_STATES.iter().map(|x| x.to_string()).collect()
    } else {
        states
    };

    let timeout = cli
        .timeout
        .or(config.timeout)
        .unwrap_or(DEFAULT_TIMEOUT_SECONDS);

    let exclude_user = if !cli.exclude_user.is_empty() {
        cli.exclude_user.clone()
    } else {
        config.exclude_user
    };

    Settings {
        squeue,
        states,
        timeout,
        exclude_user,
        input_file: cli.input_file.clone(),
    }
}

impl Settings {
    /// An input file replaces squeue entirely.

    pub fn job_source(&self) -> Box<dyn JobSource> {
        if let Some(ref filename) = self.input_file {
            Box::new(FileSource::new(filename))
        } else {
            Box::new(SqueueSource::new(&self.squeue, &self.states, self.timeout))
        }
    }
}

#[test]
fn test_config() {
    let conf = read_exporter_config("../tests/jobexporter/whitebox-config.json").unwrap();
    assert!(conf.squeue == Some("/opt/slurm/bin/squeue".to_string()));
    assert!(conf.states == vec!["R", "CG"]);
    assert!(conf.timeout == Some(10));
    assert!(conf.exclude_user == vec!["root", "slurm"]);

    let conf = read_exporter_config("../tests/jobexporter/empty-config.json").unwrap();
    assert!(conf == ExporterConfig::default());
}

#[test]
fn test_config_errors() {
    let e = read_exporter_config("../tests/jobexporter/bad-field-config.json").unwrap_err();
    assert!(e.to_string().contains("unknown field 'exclude_user'"));
    let e = read_exporter_config("../tests/jobexporter/bad-type-config.json").unwrap_err();
    assert!(e.to_string().contains("'timeout'"));
    assert!(read_exporter_config("../tests/jobexporter/no-such-config.json").is_err());
}

#[test]
fn test_merge_precedence() {
    let config = ExporterConfig {
        squeue: Some("/from/config".to_string()),
        states: vec!["CG".to_string()],
        timeout: Some(10),
        exclude_user: vec!["root".to_string()],
    };

    // Config file wins over defaults.
    let s = merge_settings(&CliSettings::default(), config.clone());
    assert!(s.squeue == "/from/config");
    assert!(s.states == vec!["CG"]);
    assert!(s.timeout == 10);
    assert!(s.exclude_user == vec!["root"]);

    // Command line wins over config file.
    let cli = CliSettings {
        squeue: Some("/from/cli".to_string()),
        states: Some("R,PD".to_string()),
        timeout: Some(3),
        exclude_user: vec!["nobody".to_string()],
        ..Default::default()
    };
    let s = merge_settings(&cli, config);
    assert!(s.squeue == "/from/cli");
    assert!(s.states == vec!["R", "PD"]);
    assert!(s.timeout == 3);
    assert!(s.exclude_user == vec!["nobody"]);

    // Defaults.
    let s = merge_settings(&CliSettings::default(), ExporterConfig::default());
    assert!(s.states == vec!["R"]);
    assert!(s.timeout == DEFAULT_TIMEOUT_SECONDS);
    assert!(s.exclude_user.is_empty());
}

// The only test that touches $JOBEXPORTER_SQUEUE, so it can't race with another test reading it.

#[test]
fn test_squeue_from_environment() {
    std::env::set_var(squeuelog::SQUEUE_ENV, "/from/env");
    assert!(SqueueSource::default_program() == "/from/env");

    // Environment wins over the built-in default.
    let s = merge_settings(&CliSettings::default(), ExporterConfig::default());
    assert!(s.squeue == "/from/env");

    // Config file wins over environment.
    let config = ExporterConfig {
        squeue: Some("/from/config".to_string()),
        ..Default::default()
    };
    let s = merge_settings(&CliSettings::default(), config.clone());
    assert!(s.squeue == "/from/config");

    // Command line wins over both.
    let cli = CliSettings {
        squeue: Some("/from/cli".to_string()),
        ..Default::default()
    };
    let s = merge_settings(&cli, config);
    assert!(s.squeue == "/from/cli");

    std::env::remove_var(squeuelog::SQUEUE_ENV);
    assert!(SqueueSource::default_program() == "squeue");
    let s = merge_settings(&CliSettings::default(), ExporterConfig::default());
    assert!(s.squeue == "squeue");
}

#[test]
fn test_job_source() {
    let cli = CliSettings {
        input_file: Some("../tests/squeuelog/squeue-running.txt".to_string()),
        ..Default::default()
    };
    let s = resolve_settings(&cli).unwrap();
    let jobs = squeuelog::collect_jobs(s.job_source().as_ref()).unwrap();
    assert!(jobs.len() == 6);
}

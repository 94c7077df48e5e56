/// Expander and compressor for Slurm host lists.
///
/// A host list is what `squeue -o %N` and friends print for the nodes of a job.  Grammar:
///
///  hostlist ::= group ("," group)*
///  group ::= name range?
///  name ::= <word character, '-' or '.'> +
///  range ::= '[' item ("," item)* ']'
///  item ::= suffix | number "-" number
///
/// A range item `first-last` stands for every number in the closed interval, each zero-padded to
/// the width of the text of `last`, so `c[8-10]` is c08, c09, c10.  A suffix item is appended to
/// the name verbatim.
///
/// Expansion is forgiving: a malformed item (reversed or non-numeric bounds, an absurdly large
/// range, an empty item) expands to nothing, and nested or unbalanced brackets give some output
/// rather than a failure.  The caller gets a count of the dropped items and decides whether that
/// is worth talking about.

use itertools::Itertools;
use regex::Regex;
use std::sync::OnceLock;

/// A single range item may not expand to more names than this.  Anything larger is certainly a
/// corrupted record and we don't want to allocate for it.

pub const MAX_RANGE_SIZE: u64 = 100_000;

fn group_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\w.]+\[.*?\]|[-\w.]+").unwrap())
}

/// Expand a host list into the host names it denotes, in order.

pub fn expand_hostlist(collapsed: &str) -> Vec<String> {
    expand_hostlist_counted(collapsed).0
}

/// Expand a host list into the host names it denotes, in order, and also return the number of
/// range items that were dropped because they were malformed.
///
/// The empty string and Slurm's "(null)" placeholder are the empty list.

pub fn expand_hostlist_counted(collapsed: &str) -> (Vec<String>, usize) {
    let mut output = vec![];
    let mut malformed = 0;
    if collapsed.is_empty() || collapsed == "(null)" {
        return (output, malformed);
    }

    for group in group_regex().find_iter(collapsed) {
        let group = group.as_str();
        // The regex guarantees that a group with a '[' ends with ']' and that the name before the
        // first '[' is nonempty.
        match group.split_once('[') {
            None => output.push(group.to_string()),
            Some((prefix, rest)) => {
                let set = &rest[..rest.len() - 1];
                for item in set.split(',') {
                    if !expand_item(prefix, item, &mut output) {
                        malformed += 1;
                    }
                }
            }
        }
    }

    (output, malformed)
}

// Push the expansion of one item onto `output`, returning false if the item is malformed.

fn expand_item(prefix: &str, item: &str, output: &mut Vec<String>) -> bool {
    if item.is_empty() {
        return false;
    }
    let Some((first, last)) = item.split_once('-') else {
        output.push(format!("{prefix}{item}"));
        return true;
    };
    let (Some(lo), Some(hi)) = (parse_bound(first), parse_bound(last)) else {
        return false;
    };
    if lo > hi || hi - lo >= MAX_RANGE_SIZE {
        return false;
    }
    let width = last.len();
    for n in lo..=hi {
        output.push(format!("{prefix}{n:0width$}"));
    }
    true
}

fn parse_bound(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<u64>().ok()
}

#[test]
fn test_expand_simple() {
    assert!(expand_hostlist("node[01-03]") == vec!["node01", "node02", "node03"]);
    assert!(expand_hostlist("node1,node2") == vec!["node1", "node2"]);
    assert!(expand_hostlist("node[1,3-4]") == vec!["node1", "node3", "node4"]);
    assert!(expand_hostlist("login-1.hpc") == vec!["login-1.hpc"]);
}

#[test]
fn test_expand_width_boundary() {
    // Every member is padded to the width of the upper bound.
    assert!(
        expand_hostlist("node[8-12]") == vec!["node08", "node09", "node10", "node11", "node12"]
    );
    assert!(expand_hostlist("c[098-101]") == vec!["c098", "c099", "c100", "c101"]);
    // ...and only to that width, even if the lower bound is written wider.
    assert!(expand_hostlist("c[001-3]") == vec!["c1", "c2", "c3"]);
}

#[test]
fn test_expand_groups() {
    // Order is preserved group by group, not sorted.
    assert!(
        expand_hostlist("gpu[3-4],cpu[1,7],bigmem")
            == vec!["gpu3", "gpu4", "cpu1", "cpu7", "bigmem"]
    );
    // Hyphens and dots belong to the name.
    assert!(expand_hostlist("c1-[23-24]") == vec!["c1-23", "c1-24"]);
    assert!(expand_hostlist("a.b[1-2],a.c") == vec!["a.b1", "a.b2", "a.c"]);
    // Suffix items are taken verbatim.
    assert!(expand_hostlist("n[007,x]") == vec!["n007", "nx"]);
}

#[test]
fn test_expand_empty() {
    assert!(expand_hostlist("").is_empty());
    assert!(expand_hostlist("(null)").is_empty());
}

#[test]
fn test_expand_malformed() {
    assert!(expand_hostlist_counted("node[5-3]") == (vec![], 1));
    assert!(
        expand_hostlist_counted("node[1-2,5-3,7]")
            == (
                vec!["node1".to_string(), "node2".to_string(), "node7".to_string()],
                1
            )
    );
    assert!(expand_hostlist_counted("node[+1-2]") == (vec![], 1));
    assert!(expand_hostlist_counted("node[1-+2]") == (vec![], 1));
    assert!(expand_hostlist_counted("node[a-b]") == (vec![], 1));
    assert!(expand_hostlist_counted("node[1-]") == (vec![], 1));
    assert!(expand_hostlist_counted("node[]") == (vec![], 1));
    assert!(expand_hostlist_counted("node[1-2000000]") == (vec![], 1));
}

#[test]
fn test_expand_nested_does_not_panic() {
    // Undefined output, but there must be output and no crash.
    let _ = expand_hostlist("a[1,[2-3]]");
    let _ = expand_hostlist("a[1-3");
    let _ = expand_hostlist("]a[[");
    let _ = expand_hostlist("[1-2]");
    let _ = expand_hostlist(",,,");
}

/// `compress_hostnames()` takes a list of host names and returns a list of host list groups s.t.
/// expanding the groups yields the input names (as a set; the output is sorted and duplicates are
/// dropped).
///
/// Names are merged when they end in a digit string and share the text before it, which fits the
/// typical naming on a supercomputer, `<name><number>` or `<name>-<number>`.  Zero padding is
/// preserved: numbers are only put in the same range if their digit strings have the same width,
/// since expansion pads every member of a range to the width of its upper bound.

pub fn compress_hostnames<S: AsRef<str>>(hosts: &[S]) -> Vec<String> {
    // Split every name into (prefix, Some((number, digits))) or (name, None), then sort so that
    // names that can be merged are adjacent and ascending.
    let mut splits = hosts
        .iter()
        .map(|h| split_numeric_suffix(h.as_ref()))
        .collect::<Vec<(&str, Option<(u64, &str)>)>>();
    splits.sort_by(|a, b| match (a.1, b.1) {
        (Some((x, xs)), Some((y, ys))) => a.0.cmp(b.0).then(x.cmp(&y)).then(xs.cmp(ys)),
        _ => a.0.cmp(b.0).then(a.1.is_some().cmp(&b.1.is_some())),
    });
    splits.dedup();

    let mut results = vec![];
    let mut i = 0;
    while i < splits.len() {
        let (prefix, suffix) = splits[i];
        let Some((_, digits)) = suffix else {
            results.push(prefix.to_string());
            i += 1;
            continue;
        };
        let mut j = i + 1;
        while j < splits.len() && splits[j].0 == prefix && splits[j].1.is_some() {
            j += 1;
        }
        if j == i + 1 {
            results.push(format!("{prefix}{digits}"));
        } else {
            let suffixes = splits[i..j]
                .iter()
                .filter_map(|(_, s)| *s)
                .collect::<Vec<(u64, &str)>>();
            results.push(format!("{}[{}]", prefix, combine(&suffixes)));
        }
        i = j;
    }

    results
}

// Runs of consecutive numbers with equal digit width become `first-last`, everything else is
// listed singly.  The input is sorted by number.

fn combine(suffixes: &[(u64, &str)]) -> String {
    let mut items = vec![];
    let mut k = 0;
    while k < suffixes.len() {
        let mut m = k + 1;
        while m < suffixes.len()
            && suffixes[m].0 == suffixes[m - 1].0 + 1
            && suffixes[m].1.len() == suffixes[k].1.len()
        {
            m += 1;
        }
        if m == k + 1 {
            items.push(suffixes[k].1.to_string());
        } else {
            items.push(format!("{}-{}", suffixes[k].1, suffixes[m - 1].1));
        }
        k = m;
    }
    items.iter().join(",")
}

// A name can take part in a range if it ends with a digit string and there is a nonempty prefix
// before the digit string.

fn split_numeric_suffix(name: &str) -> (&str, Option<(u64, &str)>) {
    let xs = name.as_bytes();
    let mut i = xs.len();
    while i > 0 && xs[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == 0 || i == xs.len() {
        return (name, None);
    }
    match name[i..].parse::<u64>() {
        Ok(n) => (&name[..i], Some((n, &name[i..]))),
        Err(_) => (name, None),
    }
}

#[test]
fn test_compress_hostnames() {
    assert!(compress_hostnames(&["a1", "a3", "a2", "a5"]).join(",") == "a[1-3,5]");
    assert!(compress_hostnames(&["node02", "node01", "node03"]).join(",") == "node[01-03]");
    assert!(compress_hostnames(&["login", "c1", "c1"]).join(",") == "c1,login");
    assert!(compress_hostnames(&["c1-23", "c1-24", "c2-1"]).join(",") == "c1-[23-24],c2-1");
    assert!(compress_hostnames::<&str>(&[]).is_empty());
}

#[test]
fn test_compress_width_boundary() {
    // Unpadded names crossing a width boundary cannot share a range.
    assert!(compress_hostnames(&["n8", "n9", "n10", "n11"]).join(",") == "n[8-9,10-11]");
    // Padded ones can.
    assert!(compress_hostnames(&["n08", "n09", "n10"]).join(",") == "n[08-10]");
}

#[test]
fn test_compress_then_expand() {
    let hosts = ["gpu-1", "gpu-3", "gpu-2", "n08", "n09", "n10", "n9", "head"];
    let mut expected = hosts.iter().map(|s| s.to_string()).collect::<Vec<String>>();
    expected.sort();
    let mut expanded = expand_hostlist(&compress_hostnames(&hosts).join(","));
    expanded.sort();
    assert!(expanded == expected);
}

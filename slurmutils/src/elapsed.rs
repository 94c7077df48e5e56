/// Parser for Slurm elapsed-time strings, as printed by `squeue -o %M` and `sacct`.
///
/// The width of the value depends on how long the job has been running: `MM:SS`, then
/// `HH:MM:SS`, then `D-HH:MM:SS`.  We split on any run of `-`, `,`, `:` and white space and look
/// at the number of parts, so we need not know in advance which form we have.
///
/// Every part must be a number.  A value we can't read is an error and not a zero, since a bogus
/// time is worse than no time.  A readable value with an unexpected number of parts is zero.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ElapsedError {
    #[error("Invalid elapsed time {value:?}: {token:?} is not a number")]
    BadToken { value: String, token: String },

    #[error("Elapsed time {value:?} is out of range")]
    Overflow { value: String },
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-,:\s]+").unwrap())
}

/// Convert an elapsed-time string to seconds.

pub fn parse_elapsed(input: &str) -> Result<u64, ElapsedError> {
    let mut parts = vec![];
    for token in separator_regex().split(input) {
        // u64::from_str takes a leading `+`, which is not a digit.
        if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ElapsedError::BadToken {
                value: input.to_string(),
                token: token.to_string(),
            });
        }
        // All digits, so the only possible failure is overflow.
        match token.parse::<u64>() {
            Ok(n) => parts.push(n),
            Err(_) => {
                return Err(ElapsedError::Overflow {
                    value: input.to_string(),
                })
            }
        }
    }

    let weights: &[u64] = match parts.len() {
        2 => &[MINUTE, 1],
        3 => &[HOUR, MINUTE, 1],
        4 => &[DAY, HOUR, MINUTE, 1],
        _ => return Ok(0),
    };

    let mut seconds = 0u64;
    for (n, w) in parts.iter().zip(weights) {
        seconds = n
            .checked_mul(*w)
            .and_then(|x| x.checked_add(seconds))
            .ok_or_else(|| ElapsedError::Overflow {
                value: input.to_string(),
            })?;
    }
    Ok(seconds)
}

#[test]
fn test_parse_elapsed() {
    assert!(parse_elapsed("00:00") == Ok(0));
    assert!(parse_elapsed("02:03") == Ok(123));
    assert!(parse_elapsed("59:59") == Ok(3599));
    assert!(parse_elapsed("01:02:03") == Ok(3723));
    assert!(parse_elapsed("1-02:03:04") == Ok(93784));
    assert!(parse_elapsed("12-00:00:00") == Ok(12 * 86400));
}

#[test]
fn test_parse_elapsed_closed_form() {
    for t0 in [0u64, 1, 7, 23, 59, 366] {
        for t1 in [0u64, 9, 59] {
            assert!(parse_elapsed(&format!("{t0}:{t1:02}")) == Ok(t0 * 60 + t1));
            for t2 in [0u64, 30, 59] {
                assert!(
                    parse_elapsed(&format!("{t0}:{t1:02}:{t2:02}"))
                        == Ok(t0 * 3600 + t1 * 60 + t2)
                );
                assert!(
                    parse_elapsed(&format!("{t0}-{t1:02}:{t2:02}:{t1:02}"))
                        == Ok(t0 * 86400 + t1 * 3600 + t2 * 60 + t1)
                );
            }
        }
    }
}

#[test]
fn test_parse_elapsed_separators() {
    // Any run of separator characters counts as one separator.
    assert!(parse_elapsed("1 - 02 :03: 04") == Ok(93784));
    assert!(parse_elapsed("1,02,03") == Ok(3723));
    assert!(parse_elapsed("01::02") == Ok(62));
}

#[test]
fn test_parse_elapsed_other_widths() {
    assert!(parse_elapsed("5") == Ok(0));
    assert!(parse_elapsed("1-2:3:4:5") == Ok(0));
}

#[test]
fn test_parse_elapsed_errors() {
    assert!(matches!(parse_elapsed(""), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("INVALID"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("1:x2"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed(":01:02"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("-1:00"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("+1:02"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("+1:+02"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(parse_elapsed("1:0x"), Err(ElapsedError::BadToken { .. })));
    // `-` is a separator, so this is 1:0 and not a negative number.
    assert!(parse_elapsed("1:-0").unwrap() == 60);
    assert!(matches!(parse_elapsed("01:02:+3"), Err(ElapsedError::BadToken { .. })));
    assert!(matches!(
        parse_elapsed("99999999999999999999:00"),
        Err(ElapsedError::Overflow { .. })
    ));
    assert!(matches!(
        parse_elapsed("999999999999999-00:00:00"),
        Err(ElapsedError::Overflow { .. })
    ));
    if let Err(e) = parse_elapsed("1:x2") {
        assert!(e.to_string() == "Invalid elapsed time \"1:x2\": \"x2\" is not a number");
    }
}

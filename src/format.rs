//! printf-style positional substitution into resolved templates.
//!
//! Supported conversions: `%s`, `%d`, `%f` (with optional precision such as
//! `%.2f`), explicit positions (`%2$s`) and the literal `%%`. Any other `%`
//! sequence is copied verbatim. Sequential conversions consume arguments in
//! order; explicit positions do not advance the sequence. Surplus arguments
//! are ignored.

use std::fmt;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::error::FormatError;

/// A value substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => f.write_str(s),
            Arg::Int(i) => write!(f, "{i}"),
            Arg::Float(x) => write!(f, "{x}"),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}

impl From<i32> for Arg {
    fn from(i: i32) -> Self {
        Arg::Int(i64::from(i))
    }
}

impl From<u32> for Arg {
    fn from(i: u32) -> Self {
        Arg::Int(i64::from(i))
    }
}

impl From<f64> for Arg {
    fn from(x: f64) -> Self {
        Arg::Float(x)
    }
}

/// Default `%f` precision.
const FLOAT_PRECISION: usize = 6;

fn directive_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(?:(\d+)\$)?(?:\.(\d+))?([sdf%])").expect("static regex"))
}

/// Substitute `args` into `template`. Argument indices in errors are 1-based.
pub fn format_template(template: &str, args: &[Arg]) -> Result<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next_sequential = 0usize;

    for caps in directive_regex().captures_iter(template) {
        let whole = caps.get(0).expect("group 0 always matches");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let conversion = &caps[3];
        if conversion == "%" {
            out.push('%');
            continue;
        }

        let position = match positional_index(&caps) {
            Some(position) => position,
            None => {
                next_sequential += 1;
                next_sequential
            }
        };
        let arg = position
            .checked_sub(1)
            .and_then(|i| args.get(i))
            .ok_or(FormatError::MissingArgument {
                index: position,
                supplied: args.len(),
            })?;
        let precision = caps
            .get(2)
            .and_then(|p| p.as_str().parse::<usize>().ok());

        render(&mut out, conversion, arg, position, precision)?;
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn positional_index(caps: &Captures<'_>) -> Option<usize> {
    caps.get(1).and_then(|m| m.as_str().parse().ok())
}

fn render(
    out: &mut String,
    conversion: &str,
    arg: &Arg,
    position: usize,
    precision: Option<usize>,
) -> Result<(), FormatError> {
    match conversion {
        "d" => {
            let value = match arg {
                Arg::Int(i) => *i,
                Arg::Float(x) => x.trunc() as i64,
                Arg::Str(s) => parse_int(s).ok_or(FormatError::TypeMismatch {
                    index: position,
                    expected: "integer",
                })?,
            };
            out.push_str(&value.to_string());
        }
        "f" => {
            let value = match arg {
                Arg::Int(i) => *i as f64,
                Arg::Float(x) => *x,
                Arg::Str(s) => s.trim().parse::<f64>().map_err(|_| FormatError::TypeMismatch {
                    index: position,
                    expected: "float",
                })?,
            };
            let precision = precision.unwrap_or(FLOAT_PRECISION);
            out.push_str(&format!("{value:.precision$}"));
        }
        _ => match (arg, precision) {
            // `%.3s` truncates like printf
            (Arg::Str(s), Some(max)) => out.extend(s.chars().take(max)),
            _ => out.push_str(&arg.to_string()),
        },
    }
    Ok(())
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().map(|x| x.trunc() as i64))
}

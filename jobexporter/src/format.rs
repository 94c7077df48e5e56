/// Generic formatting code for a set of data extracted from a data structure to be presented
/// columnar, as csv, as json, or as awk-friendly lines, and (except for json and awk) with or
/// without a header and with or without named fields.
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io;

pub struct Help {
    pub fields: Vec<String>,
    pub aliases: Vec<(String, Vec<String>)>,
    pub defaults: String,
}

/// If `fmt` asks for help then print the help text from `f` and return true.

pub fn maybe_help<F>(fmt: &Option<String>, f: F) -> bool
where
    F: Fn() -> Help,
{
    if let Some(ref s) = fmt {
        if s.starts_with("help") {
            print!("{}", help_text(f()));
            return true;
        }
    }
    false
}

fn help_text(mut help: Help) -> String {
    let mut s = "Syntax:\n  --fmt=(field|alias|control),...\n".to_string();
    s += "\nFields:\n";
    help.fields.sort();
    for f in help.fields {
        s += &format!("  {f}\n");
    }
    if !help.aliases.is_empty() {
        s += "\nAliases:\n";
        help.aliases.sort();
        for (name, fields) in help.aliases {
            s += &format!("  {name} --> {}\n", fields.join(","));
        }
    }
    s += &format!("\nDefaults:\n  {}\n", help.defaults);
    s += "\nControl:\n  awk\n  csv\n  csvnamed\n  fixed\n  json\n";
    s += "  header\n  noheader\n  tag:<tagvalue>\n";
    s
}

/// Return a vector of the known fields in `spec` wrt the formatters, and a HashSet of any other
/// strings found in `spec`.  It returns an error if zero output fields were selected.

pub fn parse_fields<'a, DataT, FmtT, CtxT>(
    spec: &'a str,
    formatters: &HashMap<String, FmtT>,
    aliases: &'a HashMap<String, Vec<String>>,
) -> Result<(Vec<&'a str>, HashSet<&'a str>)>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    let mut others = HashSet::new();
    let mut fields = vec![];
    for x in spec.split(',') {
        if formatters.contains_key(x) {
            fields.push(x);
        } else if let Some(aliases) = aliases.get(x) {
            for alias in aliases {
                if formatters.contains_key(alias) {
                    fields.push(alias.as_ref());
                } else {
                    others.insert(alias.as_ref());
                }
            }
        } else {
            others.insert(x);
        }
    }
    if fields.is_empty() {
        bail!("No output fields were selected")
    }
    Ok((fields, others))
}

pub struct FormatOptions {
    pub tag: Option<String>,
    pub json: bool,   // json explicitly requested
    pub csv: bool,    // csv or csvnamed explicitly requested
    pub awk: bool,    // awk explicitly requested
    pub named: bool,  // csvnamed explicitly requested
    pub header: bool, // true if nothing requested b/c fixed+header is default
}

pub fn standard_options(others: &HashSet<&str>) -> FormatOptions {
    let csvnamed = others.contains("csvnamed");
    let csv = others.contains("csv") || csvnamed;
    let json = others.contains("json") && !csv;
    let awk = others.contains("awk") && !csv && !json;
    // json and awk get no header, even if one is requested
    let header = (!csv && !json && !awk && !others.contains("noheader"))
        || (csv && others.contains("header"));
    let tag = others
        .iter()
        .find_map(|x| x.strip_prefix("tag:"))
        .map(|t| t.to_string());
    FormatOptions {
        csv,
        json,
        awk,
        header,
        tag,
        named: csvnamed,
    }
}

/// The `fields` are the names of formatting functions to get from the `formatters`, these are
/// applied to the `data`.  Set `opts.header` to true to print a first row with field names as a
/// header (independent of csv).  Set `opts.csv` to true to get CSV output instead of fixed-format.
/// Set `opts.tag` to Some(s) to print a tag=s field in the output.

pub fn format_data<'a, DataT, FmtT, CtxT>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    formatters: &HashMap<String, FmtT>,
    opts: &FormatOptions,
    data: Vec<DataT>,
    ctx: CtxT,
) -> Result<()>
where
    FmtT: Fn(&DataT, CtxT) -> String,
    CtxT: Copy,
{
    if fields.is_empty() {
        return Ok(());
    }
    let mut fmts = vec![];
    for kwd in fields {
        match formatters.get(*kwd) {
            Some(f) => fmts.push(f),
            None => bail!("Unknown field {kwd}"),
        }
    }

    let mut cols = Vec::<Vec<String>>::new();
    cols.resize(fields.len(), vec![]);
    for x in &data {
        for (i, f) in fmts.iter().enumerate() {
            cols[i].push(f(x, ctx));
        }
    }

    if opts.csv {
        format_csv(output, fields, opts, cols)
    } else if opts.json {
        format_json(output, fields, opts, cols)
    } else if opts.awk {
        format_awk(output, fields, opts, cols)
    } else {
        format_fixed_width(output, fields, opts, cols)
    }
}

fn format_fixed_width<'a>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    // The column width is the max across all the entries in the column (including header,
    // if present).  If there's a tag, it is printed in the last column.
    let mut widths = vec![];
    widths.resize(fields.len() + if opts.tag.is_some() { 1 } else { 0 }, 0);

    if opts.header {
        for (i, kwd) in fields.iter().enumerate() {
            widths[i] = usize::max(widths[i], kwd.len());
        }
        if opts.tag.is_some() {
            widths[fields.len()] = usize::max(widths[fields.len()], "tag".len());
        }
    }

    let nrows = cols[0].len();
    for row in 0..nrows {
        for col in 0..fields.len() {
            widths[col] = usize::max(widths[col], cols[col][row].len());
        }
        if let Some(ref tag) = opts.tag {
            widths[fields.len()] = usize::max(widths[fields.len()], tag.len());
        }
    }

    if opts.header {
        let mut s = "".to_string();
        for (i, kwd) in fields.iter().enumerate() {
            let w = widths[i];
            s += format!("{:w$}  ", kwd).as_str();
        }
        if opts.tag.is_some() {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", "tag").as_str();
        }
        output.write_all(s.trim_end().as_bytes())?;
        output.write_all(b"\n")?;
    }

    for row in 0..nrows {
        let mut s = "".to_string();
        for col in 0..fields.len() {
            let w = widths[col];
            s += format!("{:w$}  ", cols[col][row]).as_str();
        }
        if let Some(ref tag) = opts.tag {
            let w = widths[fields.len()];
            s += format!("{:w$}  ", tag).as_str();
        }
        output.write_all(s.trim_end().as_bytes())?;
        output.write_all(b"\n")?;
    }
    Ok(())
}

fn format_csv<'a>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(output);

    if opts.header {
        let mut out_fields = fields.iter().map(|f| f.to_string()).collect::<Vec<String>>();
        if opts.tag.is_some() {
            out_fields.push("tag".to_string());
        }
        writer.write_record(out_fields)?;
    }

    for row in 0..cols[0].len() {
        let mut out_fields = Vec::new();
        for col in 0..fields.len() {
            let val = &cols[col][row];
            if opts.named {
                out_fields.push(format!("{}={}", fields[col], val));
            } else {
                out_fields.push(val.clone());
            }
        }
        if let Some(ref tag) = opts.tag {
            if opts.named {
                out_fields.push(format!("tag={tag}"));
            } else {
                out_fields.push(tag.clone());
            }
        }
        writer.write_record(out_fields)?;
    }

    writer.flush()?;
    Ok(())
}

fn format_json<'a>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    let mut objects = vec![];
    for row in 0..cols[0].len() {
        let mut obj = json::JsonValue::new_object();
        for col in 0..fields.len() {
            obj[fields[col]] = cols[col][row].clone().into();
        }
        if let Some(ref tag) = opts.tag {
            obj["tag"] = tag.to_string().into();
        }
        objects.push(obj);
    }
    output.write_all(json::stringify(objects).as_bytes())?;
    output.write_all(b"\n")?;
    Ok(())
}

// awk output: fields are space-separated and spaces are not allowed within fields, they
// are replaced by `_`.

fn format_awk<'a>(
    output: &mut dyn io::Write,
    fields: &[&'a str],
    opts: &FormatOptions,
    cols: Vec<Vec<String>>,
) -> Result<()> {
    for row in 0..cols[0].len() {
        let mut line = "".to_string();
        for col in 0..fields.len() {
            if !line.is_empty() {
                line += " ";
            }
            line += cols[col][row].replace(' ', "_").as_str();
        }
        if let Some(ref tag) = opts.tag {
            if !line.is_empty() {
                line += " ";
            }
            line += tag;
        }
        line += "\n";
        output.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
fn test_formatters() -> (
    HashMap<String, &'static dyn Fn(&(&str, u64), &bool) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(&(&str, u64), &bool) -> String> =
        HashMap::new();
    formatters.insert("name".to_string(), &test_format_name);
    formatters.insert("n".to_string(), &test_format_n);
    let mut aliases = HashMap::new();
    aliases.insert("both".to_string(), vec!["name".to_string(), "n".to_string()]);
    (formatters, aliases)
}

#[cfg(test)]
fn test_format_name(d: &(&str, u64), _: &bool) -> String {
    d.0.to_string()
}

#[cfg(test)]
fn test_format_n(d: &(&str, u64), _: &bool) -> String {
    d.1.to_string()
}

#[cfg(test)]
fn format_string(spec: &str, data: Vec<(&str, u64)>) -> String {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields(spec, &formatters, &aliases).unwrap();
    let opts = standard_options(&others);
    let mut out = Vec::new();
    format_data(&mut out, &fields, &formatters, &opts, data, &false).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn test_parse_fields() {
    let (formatters, aliases) = test_formatters();
    let (fields, others) = parse_fields("both,csv,tag:x", &formatters, &aliases).unwrap();
    assert!(fields == vec!["name", "n"]);
    assert!(others.contains("csv") && others.contains("tag:x"));
    assert!(parse_fields("csv,header", &formatters, &aliases).is_err());
}

#[test]
fn test_standard_options() {
    let opts = standard_options(&HashSet::new());
    assert!(opts.header && !opts.csv && !opts.json && !opts.awk);
    let opts = standard_options(&HashSet::from(["csvnamed", "json"]));
    assert!(opts.csv && opts.named && !opts.json && !opts.header);
    let opts = standard_options(&HashSet::from(["awk", "tag:abc"]));
    assert!(opts.awk && !opts.header && opts.tag == Some("abc".to_string()));
}

#[test]
fn test_format_fixed() {
    let s = format_string("name,n", vec![("a", 1), ("long name", 200)]);
    assert!(s == "name       n\na          1\nlong name  200\n");
    let s = format_string("name,n,noheader", vec![("a", 1)]);
    assert!(s == "a  1\n");
}

#[test]
fn test_format_csv() {
    let s = format_string("both,csv,header", vec![("a,b", 1)]);
    assert!(s == "name,n\n\"a,b\",1\n");
    let s = format_string("n,csvnamed,tag:t", vec![("a", 7)]);
    assert!(s == "n=7,tag=t\n");
}

#[test]
fn test_format_json_awk() {
    let s = format_string("both,json", vec![("a", 1)]);
    assert!(s == "[{\"name\":\"a\",\"n\":\"1\"}]\n");
    let s = format_string("both,awk", vec![("a b", 1), ("c", 2)]);
    assert!(s == "a_b 1\nc 2\n");
}

#[test]
fn test_format_tag() {
    let s = format_string("name,n,tag:x", vec![("a", 1)]);
    assert!(s == "name  n  tag\na     1  x\n");
    let s = format_string("name,n,csv,header,tag:x", vec![("a", 1)]);
    assert!(s == "name,n,tag\na,1,x\n");
    let s = format_string("n,json,tag:x", vec![("a", 1)]);
    assert!(s == "[{\"n\":\"1\",\"tag\":\"x\"}]\n");
    let s = format_string("n,awk,tag:x", vec![("a", 1)]);
    assert!(s == "1 x\n");
}

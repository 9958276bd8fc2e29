//! RFC 4180 export of test steps.
use std::{fs, path::Path};

use tracing::{debug, info};

use crate::{error::ReportError, step::TestStep, tree::ReportTree};

/// Write `steps` to `path`.
///
/// The header is the union of every step's columns in first-seen order; missing cells stay
/// empty. With `hierarchy_order` rows are grouped module by module (then by extra fields),
/// otherwise they keep insertion order.
pub fn write_csv(steps: &[TestStep], path: &Path, hierarchy_order: bool) -> Result<(), ReportError> {
    let text = render(steps, hierarchy_order);
    fs::write(path, text).map_err(|e| ReportError::io(path, e))?;
    info!("Writing results to: {}", path.display());
    Ok(())
}

fn render(steps: &[TestStep], hierarchy_order: bool) -> String {
    let rows: Vec<Vec<(String, String)>> = if hierarchy_order {
        ReportTree::build(steps)
            .ordered_steps()
            .into_iter()
            .map(TestStep::columns)
            .collect()
    } else {
        steps.iter().map(TestStep::columns).collect()
    };

    let mut header: Vec<&str> = Vec::new();
    for row in &rows {
        for (key, _) in row {
            if !header.contains(&key.as_str()) {
                header.push(key);
            }
        }
    }
    debug!(?header, "csv header");

    let mut out = String::new();
    push_record(&mut out, header.iter().copied());
    for row in &rows {
        push_record(
            &mut out,
            header.iter().map(|h| {
                row.iter()
                    .find(|(k, _)| k == h)
                    .map_or("", |(_, v)| v.as_str())
            }),
        );
    }
    out
}

fn push_record<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_cell(out, cell);
    }
    out.push_str("\r\n");
}

fn push_cell(out: &mut String, cell: &str) {
    if cell.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&cell.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(cell);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, module: &str, fields: &[(&str, &str)], result: bool, comments: &str) -> TestStep {
        let mut s = TestStep::new(name, module);
        for (k, v) in fields {
            s.set_field(*k, *v);
        }
        s.set_result(Some(result), comments);
        s
    }

    fn sample() -> Vec<TestStep> {
        vec![
            step("a", "RADIO", &[("component", "rx")], true, ""),
            step("b", "MODEM", &[], false, "said \"no\", twice"),
            step("c", "RADIO", &[("component", "rx"), ("section", "gain")], true, "multi\nline"),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, s)| s.with_index(i + 1))
        .collect()
    }

    #[test]
    fn header_is_union_in_first_seen_order() {
        let text = render(&sample(), false);
        let header = text.lines().next().unwrap();
        assert_eq!(header, "module,index,component,test,duration,result,Comments,section");
    }

    #[test]
    fn cells_are_quoted_per_rfc4180() {
        let text = render(&sample(), false);
        assert!(text.contains("\"said \"\"no\"\", twice\""));
        assert!(text.contains("\"multi\nline\""));
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn hierarchy_order_groups_modules() {
        let text = render(&sample(), true);
        let modules: Vec<_> = text
            .split("\r\n")
            .skip(1)
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split(',').nth(1))
            .collect();
        assert_eq!(modules, ["1", "3", "2"]);

        let flat = render(&sample(), false);
        let idx: Vec<_> = flat
            .split("\r\n")
            .skip(1)
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split(',').nth(1))
            .collect();
        assert_eq!(idx, ["1", "2", "3"]);
    }

    #[test]
    fn writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("results.csv");
        write_csv(&sample(), &path, true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().starts_with("module,index"));
    }
}

//! LaTeX export of a [`ReportTree`].
//!
//! The user header must load `inputenc`, `multirow` and `ltablex`, open the document and
//! define `\kresTrue`, `\kresFalse`, `\kresNone`, `\ktestsend`, `\ktestcheck` and
//! `\ktestcheckfail`. The generated body ends the document.
use std::{collections::HashMap, fmt::Write as _, fs, path::Path, sync::Arc};

use tracing::info;

use crate::{error::ReportError, step::TestStep, tree::{Node, ReportTree}};

/// Renders the text of one step row. Receives the part of the test name after `prefix:`.
pub type StepFormatter = Arc<dyn Fn(&str, &TestStep) -> String + Send + Sync>;

pub struct Transcriptor {
    header: String,
    formatters: HashMap<String, StepFormatter>,
}

impl Transcriptor {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            formatters: HashMap::new(),
        }
    }

    pub fn from_header_file(path: &Path) -> Result<Self, ReportError> {
        let header = fs::read_to_string(path).map_err(|e| ReportError::io(path, e))?;
        Ok(Self::new(header))
    }

    /// Use `f` for steps whose test name starts with `prefix:` (or equals `prefix`).
    pub fn formatter<F>(mut self, prefix: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str, &TestStep) -> String + Send + Sync + 'static,
    {
        self.formatters.insert(prefix.into(), Arc::new(f));
        self
    }

    pub fn write(&self, tree: &ReportTree, path: &Path) -> Result<(), ReportError> {
        fs::write(path, self.render(tree)).map_err(|e| ReportError::io(path, e))?;
        info!("Writing tex report to: {}", path.display());
        Ok(())
    }

    pub fn render(&self, tree: &ReportTree) -> String {
        let mut body = String::new();
        recap(&mut body, "overall", tree.result(), tree.modules(), "chapter", true);
        for (module, node) in tree.modules() {
            let _ = writeln!(body, "\\chapter{{{module}}}\n");
            recap(&mut body, module, node.result(), node.children(), "section", false);
            self.reports(&mut body, node);
        }

        let mut tex = self.header.clone();
        tex.push_str(&body.replace('_', "\\_"));
        tex.push_str("\\end{document}");
        tex
    }

    fn reports(&self, out: &mut String, module: &Node) {
        for (comp, node) in module.children() {
            let _ = writeln!(out, "\\section{{{comp}}}\n");
            let _ = writeln!(out, "The test {comp} status is {}\n", kres(Some(node.result())));
            if node.steps().is_empty() {
                for (sect, sub) in node.children() {
                    let _ = writeln!(out, "\\subsection{{{sect}}}\n");
                    if sub.is_description() {
                        for step in sub.steps() {
                            let _ = writeln!(out, "\\paragraph{{{}}}", step.comments());
                        }
                    } else {
                        self.steps_table(out, sub.steps());
                    }
                }
            } else {
                self.steps_table(out, node.steps());
            }
        }
    }

    fn steps_table(&self, out: &mut String, steps: &[TestStep]) {
        out.push_str("\\begin{tabularx} {\\textwidth} {|X|c|}\n");
        out.push_str("  \\hline\n");
        for step in steps {
            let _ = writeln!(
                out,
                " \\begin{{minipage}}{{8cm}} {} \\end{{minipage}} & {} \\\\",
                self.step_text(step),
                kres(step.result())
            );
            if step.result().is_some() {
                out.push_str("  \\hline\n");
            }
        }
        out.push_str("  \\hline\n");
        out.push_str("\\end{tabularx}\n\n");
    }

    fn step_text(&self, step: &TestStep) -> String {
        let (prefix, rest) = step.name().split_once(':').unwrap_or((step.name(), ""));
        match self.formatters.get(prefix) {
            Some(f) => f(rest, step),
            None if step.comments().is_empty() => step.name().to_string(),
            None => format!("{} ({})", step.name(), step.comments()),
        }
    }
}

fn kres(result: Option<bool>) -> &'static str {
    match result {
        Some(true) => "\\kresTrue",
        Some(false) => "\\kresFalse",
        None => "\\kresNone",
    }
}

/// Summary block with a pass ratio and one table row per child.
///
/// At the top level the ratio counts the grandchildren (components across modules).
fn recap<'a>(
    out: &mut String,
    name: &str,
    result: bool,
    children: impl Iterator<Item = (&'a str, &'a Node)> + Clone,
    level: &str,
    nested: bool,
) {
    let _ = writeln!(out, "\\{level}{{summary}}\n");
    let _ = writeln!(out, "The {name} status is {}\n", kres(Some(result)));

    let (passed, total) = children
        .clone()
        .flat_map(|(_, node)| -> Box<dyn Iterator<Item = &'a Node> + 'a> {
            if nested {
                Box::new(node.children().map(|(_, n)| n))
            } else {
                Box::new(std::iter::once(node))
            }
        })
        .fold((0usize, 0usize), |(p, t), n| (p + usize::from(n.result()), t + 1));
    let _ = writeln!(out, "There are {passed}/{total} tests passed.\n");

    out.push_str("\\begin{tabular} {|l|l|l|r|}\n");
    for (child, node) in children {
        out.push_str("  \\hline\n");
        out.push_str("  \\begin{minipage}{8cm}\n");
        let _ = writeln!(out, "  {child} \\end{{minipage}} & {} \\\\", kres(Some(node.result())));
    }
    out.push_str("  \\hline\n");
    out.push_str("\\end{tabular}\n\n");
}

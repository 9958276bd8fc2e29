use std::path::Path;

use hilt_observe::{LoggerConfig, logger_init};
use hilt_report::{ResultHandler, TestStep, Transcriptor};
use tracing::info;

const TEX_HEADER: &str = "\\documentclass{report}
\\usepackage[utf8]{inputenc}
\\usepackage{multirow}
\\usepackage{ltablex}
\\usepackage[dvipsnames]{xcolor}
\\newcommand\\kresTrue{\\textbf{\\colorbox{green}{\\textcolor{ForestGreen}{PASSED}}}}
\\newcommand\\kresFalse{\\textbf{\\colorbox{red}{\\textcolor{BrickRed}{FAILED}}}}
\\newcommand\\kresNone{\\-}
\\newcommand\\ktestsend[1]{\\textbf{\\textcolor{NavyBlue}{#1}}}
\\newcommand\\ktestcheck[1]{\\textbf{\\colorbox{ForestGreen}{#1}}}
\\newcommand\\ktestcheckfail[1]{\\textbf{\\colorbox{red}{#1}}}
\\title{my fake test}
\\begin{document}
\\maketitle
";

fn main() -> anyhow::Result<()> {
    logger_init(&LoggerConfig::default().with_file("log_my_fake_test.txt"))?;

    let rh = ResultHandler::new();

    // Standalone step appended to the handler
    let mut step = TestStep::new("Test name", "my module");
    step.fail("My test comment");
    rh.append_test(step);

    // Step driven by the handler itself
    rh.set_step("test name", "my module", [("component", "handler")]);
    rh.set_result(Some(true), "my test comment from rh")?;

    // Custom field
    let mut step = TestStep::new("my custom field test", "my module")
        .with_field("my_new_field", "field value");
    step.fail("My custom test comment");
    rh.append_test(step);

    rh.write_csv(Path::new("my_fake_test.csv"), true)?;
    rh.write_json(Path::new("my_fake_test.json"))?;
    Transcriptor::new(TEX_HEADER)
        .formatter("send", |rest, _| format!("\\ktestsend{{{rest}}}"))
        .write(&rh.tree(), Path::new("my_fake_test.tex"))?;

    info!(result = rh.global_result(), "report written");
    std::process::exit(if rh.global_result() { 0 } else { 1 });
}

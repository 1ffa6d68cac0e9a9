//! JUnit XML report
//!
//! One file per phase, `TEST-SDCcc_<phase>.xml`, in the test run
//! directory. When the run is invalid, or the storage saw encoding or MIME
//! type errors, a synthetic test case carrying the reasons is appended.

use crate::engine::{ExecutionListener, TestCase, TestOutcome, TestPlan, TestResult};
use crate::observer::RunObserver;
use crate::storage::MessageStorage;
use sdccc_types::Phase;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

const SUITE_NAME: &str = "SDCcc Test Run";
const INVALID_RUN_NAME: &str = "SDCccInvalidTestRun";
const INVALID_RUN_CLASS: &str = "com.draeger.medical.sdccc.TestSuite";
const INVALID_RUN_MESSAGE: &str = "SDCcc test run was marked as invalid";
const INVALID_RUN_TYPE: &str = "InvalidTestRun";
const VALIDITY_NAME: &str = "SDCcc Test Run Validity";
const VALIDITY_ID: &str = "SDCccTestRunValidity";

/// Path of the report file of `phase` inside `dir`
pub fn report_path(dir: &Path, phase: Phase) -> PathBuf {
    dir.join(format!("TEST-SDCcc_{}.xml", phase.report_suffix()))
}

/// Validity data rendered as the synthetic test case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunValidity {
    pub invalid: bool,
    pub reasons: Vec<String>,
    pub encoding_errors: u64,
    pub mime_type_errors: u64,
}

impl RunValidity {
    pub fn capture(observer: &RunObserver, storage: &dyn MessageStorage) -> Self {
        let state = observer.snapshot();
        Self {
            invalid: state.invalid,
            reasons: state.reasons,
            encoding_errors: storage.message_encoding_error_count(),
            mime_type_errors: storage.invalid_mime_type_error_count(),
        }
    }

    fn needs_entry(&self) -> bool {
        self.invalid || self.encoding_errors > 0 || self.mime_type_errors > 0
    }

    fn detail(&self) -> String {
        let mut detail = format!("{} for the following reasons:", INVALID_RUN_MESSAGE);
        if self.encoding_errors > 0 {
            let _ = write!(
                detail,
                "\n- {} MessageEncodingError(s) were observed.",
                self.encoding_errors
            );
        }
        if self.mime_type_errors > 0 {
            let _ = write!(
                detail,
                "\n- {} InvalidMimeTypeError(s) were observed.",
                self.mime_type_errors
            );
        }
        for reason in &self.reasons {
            let _ = write!(detail, "\n- {}", reason);
        }
        detail
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' => escaped.push_str("&#10;"),
            '\r' => escaped.push_str("&#13;"),
            '\t' => escaped.push_str("&#9;"),
            c if (c as u32) < 0x20 => {}
            c => escaped.push(c),
        }
    }
    escaped
}

fn cdata(value: &str) -> String {
    format!("<![CDATA[{}]]>", value.replace("]]>", "]]]]><![CDATA[>"))
}

fn seconds(duration: Duration) -> String {
    format!("{}.{:03}", duration.as_secs(), duration.subsec_millis())
}

fn push_metadata(xml: &mut String, display_name: &str, description: &str, unique_id: &str, identifier: &str) {
    let _ = writeln!(xml, "    <display-name>{}</display-name>", cdata(display_name));
    let _ = writeln!(xml, "    <test-description>{}</test-description>", cdata(description));
    let _ = writeln!(xml, "    <unique-id>{}</unique-id>", cdata(unique_id));
    let _ = writeln!(xml, "    <test-identifier>{}</test-identifier>", cdata(identifier));
}

/// Render a complete report document
pub fn render(
    results: &[TestResult],
    validity: &RunValidity,
    elapsed: Duration,
    version: &str,
) -> String {
    let with_validity = validity.needs_entry();
    let tests = results.len() + usize::from(with_validity);
    let failures = results
        .iter()
        .filter(|r| matches!(r.outcome, TestOutcome::Failed(_)))
        .count();
    let errors = results
        .iter()
        .filter(|r| matches!(r.outcome, TestOutcome::Errored { .. } | TestOutcome::Aborted(_)))
        .count()
        + usize::from(with_validity);

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        xml,
        "<testsuite name=\"{}\" tests=\"{}\" skipped=\"0\" failures=\"{}\" errors=\"{}\" time=\"{}\">",
        SUITE_NAME,
        tests,
        failures,
        errors,
        seconds(elapsed)
    );
    xml.push_str("  <properties>\n");
    let _ = writeln!(
        xml,
        "    <property name=\"SDCcc version\" value=\"{}\"/>",
        escape_attribute(version)
    );
    xml.push_str("  </properties>\n");

    for result in results {
        let _ = writeln!(
            xml,
            "  <testcase name=\"{}\" classname=\"{}\" time=\"{}\">",
            escape_attribute(&result.name),
            escape_attribute(&result.class_name),
            seconds(result.duration)
        );
        match &result.outcome {
            TestOutcome::Passed => {}
            TestOutcome::Failed(failure) => {
                let _ = writeln!(
                    xml,
                    "    <failure message=\"{}\" type=\"{}\">{}</failure>",
                    escape_attribute(&failure.to_string()),
                    failure.type_name(),
                    cdata(&failure.to_string())
                );
            }
            TestOutcome::Errored { type_name, message } => {
                let _ = writeln!(
                    xml,
                    "    <error message=\"{}\" type=\"{}\">{}</error>",
                    escape_attribute(message),
                    escape_attribute(type_name),
                    cdata(message)
                );
            }
            TestOutcome::Aborted(reason) => {
                let _ = writeln!(
                    xml,
                    "    <error message=\"{}\" type=\"TestAborted\">{}</error>",
                    escape_attribute(reason),
                    cdata(reason)
                );
            }
        }
        let _ = writeln!(
            xml,
            "    <system-out>{}</system-out>",
            cdata(&format!("unique-id: {}", result.unique_id))
        );
        push_metadata(
            &mut xml,
            &result.name,
            &result.description,
            &result.unique_id,
            result.identifier.as_str(),
        );
        xml.push_str("  </testcase>\n");
    }

    if with_validity {
        let _ = writeln!(
            xml,
            "  <testcase name=\"{}\" classname=\"{}\" time=\"0\">",
            INVALID_RUN_NAME, INVALID_RUN_CLASS
        );
        let _ = writeln!(
            xml,
            "    <error message=\"{}\" type=\"{}\">{}</error>",
            INVALID_RUN_MESSAGE,
            INVALID_RUN_TYPE,
            cdata(&validity.detail())
        );
        push_metadata(
            &mut xml,
            VALIDITY_NAME,
            VALIDITY_NAME,
            &format!("[class:{}]", VALIDITY_ID),
            VALIDITY_ID,
        );
        xml.push_str("  </testcase>\n");
    }

    xml.push_str("</testsuite>\n");
    xml
}

/// Listener writing the report when its plan finishes
pub struct XmlReportListener {
    dir: PathBuf,
    version: String,
    observer: RunObserver,
    storage: Arc<dyn MessageStorage>,
    results: Vec<TestResult>,
    started: Option<Instant>,
}

impl XmlReportListener {
    pub fn new(
        dir: impl Into<PathBuf>,
        version: impl Into<String>,
        observer: RunObserver,
        storage: Arc<dyn MessageStorage>,
    ) -> Self {
        Self {
            dir: dir.into(),
            version: version.into(),
            observer,
            storage,
            results: Vec::new(),
            started: None,
        }
    }
}

impl ExecutionListener for XmlReportListener {
    fn plan_started(&mut self, _plan: &TestPlan) {
        self.results.clear();
        self.started = Some(Instant::now());
    }

    fn test_finished(&mut self, _case: &TestCase, result: &TestResult) {
        self.results.push(result.clone());
    }

    fn plan_finished(&mut self, plan: &TestPlan) {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        let validity = RunValidity::capture(&self.observer, self.storage.as_ref());
        let document = render(&self.results, &validity, elapsed, &self.version);
        let path = report_path(&self.dir, plan.phase);
        match std::fs::write(&path, document) {
            Ok(()) => info!(path = %path.display(), "Wrote test report"),
            Err(err) => error!(path = %path.display(), error = %err, "Could not write test report"),
        }
    }
}

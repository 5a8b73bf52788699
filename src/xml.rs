//! Result file serialization.
//!
//! # Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <?xml-stylesheet type="text/xsl" href="compatibility-result.xsl"?>
//! <Result start="2015-05-14 00:00:01.000" end="..." suite-name="CTS" ...>
//!   <Build DEVICE_INFO_GENERIC_ro.build.type="user"/>
//!   <Summary pass="2" failed="1" not-executed="1"/>
//!   <Module name="ModuleA" abi="mips64" device="device123">
//!     <TestCase name="android.test.Foo">
//!       <Test result="fail" name="testBlah" start="..." end="...">
//!         <Failure message="Something small is not alright">
//!           <StackTrace>...</StackTrace>
//!         </Failure>
//!       </Test>
//!       <Test result="pass" name="testMetrics" start="..." end="...">
//!         <Summary>
//!           <Metric source="..." message="..." score-type="higher_better" score-unit="score">
//!             <Value>9001</Value>
//!           </Metric>
//!         </Summary>
//!         <Detail>
//!           <Metric ...>...</Metric>
//!         </Detail>
//!       </Test>
//!     </TestCase>
//!   </Module>
//! </Result>
//! ```
//!
//! Timestamps are UTC with millisecond precision. Metric values use the
//! shortest representation that parses back to the same `f64`, so `NaN`
//! and the infinities survive a round trip.

use std::collections::BTreeMap;
use std::io;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::result::{
    InvocationResult, Metric, ModuleResult, ReportLog, ScoreType, ScoreUnit, TestResult,
    TestStatus,
};

/// Version of the result file format written by this crate.
pub const REPORT_VERSION: &str = "5.0";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIME_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const STYLESHEET: &str = r#"xml-stylesheet type="text/xsl" href="compatibility-result.xsl""#;

const RESULT_TAG: &str = "Result";
const BUILD_TAG: &str = "Build";
const SUMMARY_TAG: &str = "Summary";
const MODULE_TAG: &str = "Module";
const CASE_TAG: &str = "TestCase";
const TEST_TAG: &str = "Test";
const FAILURE_TAG: &str = "Failure";
const STACK_TAG: &str = "StackTrace";
const DETAIL_TAG: &str = "Detail";
const METRIC_TAG: &str = "Metric";
const VALUE_TAG: &str = "Value";

/// Errors reading or writing harness XML documents.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Expected root element <{expected}>, found <{found}>")]
    UnexpectedRoot { expected: String, found: String },

    #[error("Document has no <{0}> element")]
    MissingRoot(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid value '{value}' for attribute '{attribute}'")]
    InvalidValue { attribute: String, value: String },
}

pub type XmlResult<T> = Result<T, XmlError>;

/// Returns the local name of an element as a string.
pub(crate) fn element_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.name().as_ref()).into_owned()
}

/// Collects an element's attributes, unescaped, in document order.
pub(crate) fn attributes(element: &BytesStart<'_>) -> XmlResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for attr in element.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

/// Takes a required attribute out of `attrs`.
pub(crate) fn required(
    attrs: &mut BTreeMap<String, String>,
    element: &str,
    attribute: &str,
) -> XmlResult<String> {
    attrs
        .remove(attribute)
        .ok_or_else(|| XmlError::MissingAttribute {
            element: element.to_string(),
            attribute: attribute.to_string(),
        })
}

fn parse_value<T: std::str::FromStr>(attribute: &str, value: &str) -> XmlResult<T> {
    value.parse().map_err(|_| XmlError::InvalidValue {
        attribute: attribute.to_string(),
        value: value.to_string(),
    })
}

/// Formats epoch milliseconds as a UTC timestamp.
pub fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format(TIME_FORMAT)
        .to_string()
}

/// Parses a timestamp written by [`format_time`]. Fractional seconds are
/// optional.
pub fn parse_time(value: &str) -> XmlResult<i64> {
    NaiveDateTime::parse_from_str(value, TIME_PARSE_FORMAT)
        .map(|time| time.and_utc().timestamp_millis())
        .map_err(|_| XmlError::InvalidValue {
            attribute: "time".to_string(),
            value: value.to_string(),
        })
}

/// Serializes an invocation result to a complete XML document.
pub fn write_result(result: &InvocationResult) -> XmlResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::PI(BytesPI::new(STYLESHEET)))?;

    let mut root = BytesStart::new(RESULT_TAG);
    root.push_attribute(("start", format_time(result.start).as_str()));
    root.push_attribute(("end", format_time(result.end).as_str()));
    root.push_attribute(("suite-name", result.suite_name.as_str()));
    root.push_attribute(("suite-version", result.suite_version.as_str()));
    root.push_attribute(("suite-plan", result.suite_plan.as_str()));
    root.push_attribute(("report-version", REPORT_VERSION));
    root.push_attribute(("host-name", result.host_name.as_str()));
    root.push_attribute(("os-name", result.os_name.as_str()));
    root.push_attribute(("os-arch", result.os_arch.as_str()));
    root.push_attribute(("harness-version", result.harness_version.as_str()));
    let devices: Vec<&str> = result.device_serials().collect();
    root.push_attribute(("devices", devices.join(",").as_str()));
    if let Some(session) = result.retry_session {
        root.push_attribute(("retry-session", session.to_string().as_str()));
    }
    writer.write_event(Event::Start(root))?;

    if !result.build_attributes.is_empty() {
        let mut build = BytesStart::new(BUILD_TAG);
        for (key, value) in &result.build_attributes {
            build.push_attribute((key.as_str(), value.as_str()));
        }
        writer.write_event(Event::Empty(build))?;
    }

    let mut summary = BytesStart::new(SUMMARY_TAG);
    summary.push_attribute(("pass", result.count_results(TestStatus::Pass).to_string().as_str()));
    summary.push_attribute(("failed", result.count_results(TestStatus::Fail).to_string().as_str()));
    summary.push_attribute((
        "not-executed",
        result.count_results(TestStatus::NotExecuted).to_string().as_str(),
    ));
    writer.write_event(Event::Empty(summary))?;

    for module in result.modules() {
        write_module(&mut writer, module)?;
    }

    writer.write_event(Event::End(BytesEnd::new(RESULT_TAG)))?;

    let mut xml = String::from_utf8_lossy(&writer.into_inner()).into_owned();
    xml.push('\n');
    Ok(xml)
}

fn write_module<W: io::Write>(writer: &mut Writer<W>, module: &ModuleResult) -> XmlResult<()> {
    let mut element = BytesStart::new(MODULE_TAG);
    element.push_attribute(("name", module.name()));
    element.push_attribute(("abi", module.abi()));
    element.push_attribute(("device", module.device().unwrap_or_default()));
    writer.write_event(Event::Start(element))?;

    for case in module.cases() {
        let mut element = BytesStart::new(CASE_TAG);
        element.push_attribute(("name", case.name()));
        writer.write_event(Event::Start(element))?;
        for test in case.results() {
            write_test(writer, test)?;
        }
        writer.write_event(Event::End(BytesEnd::new(CASE_TAG)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(MODULE_TAG)))?;
    Ok(())
}

fn write_test<W: io::Write>(writer: &mut Writer<W>, test: &TestResult) -> XmlResult<()> {
    // Tests that never reported an outcome are not part of the record.
    let Some(status) = test.status() else {
        return Ok(());
    };

    let mut element = BytesStart::new(TEST_TAG);
    element.push_attribute(("result", status.as_str()));
    element.push_attribute(("name", test.name()));
    element.push_attribute(("start", format_time(test.start()).as_str()));
    element.push_attribute(("end", format_time(test.end()).as_str()));

    let failure = status == TestStatus::Fail
        && (test.message().is_some() || test.stack_trace().is_some());
    let report = test.report_log().filter(|log| !log.is_empty());
    if !failure && report.is_none() {
        writer.write_event(Event::Empty(element))?;
        return Ok(());
    }
    writer.write_event(Event::Start(element))?;

    if failure {
        let mut element = BytesStart::new(FAILURE_TAG);
        if let Some(message) = test.message() {
            element.push_attribute(("message", message));
        }
        writer.write_event(Event::Start(element))?;
        if let Some(trace) = test.stack_trace() {
            writer.write_event(Event::Start(BytesStart::new(STACK_TAG)))?;
            writer.write_event(Event::Text(BytesText::new(trace)))?;
            writer.write_event(Event::End(BytesEnd::new(STACK_TAG)))?;
        }
        writer.write_event(Event::End(BytesEnd::new(FAILURE_TAG)))?;
    }

    if let Some(report) = report {
        if let Some(summary) = &report.summary {
            writer.write_event(Event::Start(BytesStart::new(SUMMARY_TAG)))?;
            write_metric(writer, summary)?;
            writer.write_event(Event::End(BytesEnd::new(SUMMARY_TAG)))?;
        }
        if !report.details.is_empty() {
            writer.write_event(Event::Start(BytesStart::new(DETAIL_TAG)))?;
            for metric in &report.details {
                write_metric(writer, metric)?;
            }
            writer.write_event(Event::End(BytesEnd::new(DETAIL_TAG)))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new(TEST_TAG)))?;
    Ok(())
}

fn write_metric<W: io::Write>(writer: &mut Writer<W>, metric: &Metric) -> XmlResult<()> {
    let mut element = BytesStart::new(METRIC_TAG);
    element.push_attribute(("source", metric.source.as_str()));
    element.push_attribute(("message", metric.message.as_str()));
    element.push_attribute(("score-type", metric.score_type.as_str()));
    element.push_attribute(("score-unit", metric.unit.as_str()));
    writer.write_event(Event::Start(element))?;
    for value in &metric.values {
        writer.write_event(Event::Start(BytesStart::new(VALUE_TAG)))?;
        writer.write_event(Event::Text(BytesText::new(&value.to_string())))?;
        writer.write_event(Event::End(BytesEnd::new(VALUE_TAG)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(METRIC_TAG)))?;
    Ok(())
}

#[derive(Default)]
struct ParseState {
    seen_root: bool,
    module: Option<String>,
    case: Option<String>,
    test: Option<String>,
    failure_message: Option<String>,
    stack_trace: Option<String>,
    report: ReportLog,
    in_detail: bool,
    metric: Option<Metric>,
    text: Option<String>,
}

impl ParseState {
    fn current_test<'a>(&self, result: &'a mut InvocationResult) -> Option<&'a mut TestResult> {
        let module = self.module.as_deref()?;
        let case = self.case.as_deref()?;
        let test = self.test.as_deref()?;
        Some(
            result
                .get_or_create_module(module)
                .get_or_create_case(case)
                .get_or_create_result(test),
        )
    }

    fn open(&mut self, result: &mut InvocationResult, element: &BytesStart<'_>) -> XmlResult<()> {
        let name = element_name(element);
        if !self.seen_root {
            if name != RESULT_TAG {
                return Err(XmlError::UnexpectedRoot {
                    expected: RESULT_TAG.to_string(),
                    found: name,
                });
            }
            self.seen_root = true;
            return read_root(result, element);
        }

        let mut attrs = attributes(element)?;
        match name.as_str() {
            BUILD_TAG => result.build_attributes.extend(attrs),
            MODULE_TAG => {
                let module_name = required(&mut attrs, MODULE_TAG, "name")?;
                let abi = required(&mut attrs, MODULE_TAG, "abi")?;
                let id = crate::abi::create_id(&abi, &module_name);
                let module = result.get_or_create_module(&id);
                if let Some(device) = attrs.remove("device").filter(|d| !d.is_empty()) {
                    module.set_device(device);
                }
                self.module = Some(id);
            }
            CASE_TAG => {
                let case = required(&mut attrs, CASE_TAG, "name")?;
                if let Some(module) = &self.module {
                    result.get_or_create_module(module).get_or_create_case(&case);
                }
                self.case = Some(case);
            }
            TEST_TAG => {
                self.test = Some(required(&mut attrs, TEST_TAG, "name")?);
                self.report = ReportLog::default();
                self.failure_message = None;
                self.stack_trace = None;
                let status: TestStatus =
                    parse_value("result", &required(&mut attrs, TEST_TAG, "result")?)?;
                let start = attrs.remove("start").map(|v| parse_time(&v)).transpose()?;
                let end = attrs.remove("end").map(|v| parse_time(&v)).transpose()?;
                if let Some(test) = self.current_test(result) {
                    test.reset();
                    test.set_status(status);
                    test.set_start(start.unwrap_or_default());
                    test.set_end(end.unwrap_or_default());
                }
            }
            FAILURE_TAG => self.failure_message = attrs.remove("message"),
            STACK_TAG | VALUE_TAG => self.text = Some(String::new()),
            DETAIL_TAG => self.in_detail = true,
            METRIC_TAG => {
                let score_type: ScoreType = parse_value(
                    "score-type",
                    &required(&mut attrs, METRIC_TAG, "score-type")?,
                )?;
                let unit: ScoreUnit = parse_value(
                    "score-unit",
                    &required(&mut attrs, METRIC_TAG, "score-unit")?,
                )?;
                self.metric = Some(Metric::new(
                    attrs.remove("source").unwrap_or_default(),
                    attrs.remove("message").unwrap_or_default(),
                    score_type,
                    unit,
                    Vec::new(),
                ));
            }
            // The run-level <Summary> only repeats counts derived from tests.
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, result: &mut InvocationResult, name: &str) -> XmlResult<()> {
        match name {
            MODULE_TAG => self.module = None,
            CASE_TAG => self.case = None,
            TEST_TAG => {
                let message = self.failure_message.take();
                let trace = self.stack_trace.take();
                let report = std::mem::take(&mut self.report);
                if let Some(test) = self.current_test(result) {
                    if message.is_some() || trace.is_some() {
                        test.set_failure(message, trace);
                    }
                    if !report.is_empty() {
                        test.set_report_log(report);
                    }
                }
                self.test = None;
            }
            STACK_TAG => self.stack_trace = self.text.take(),
            VALUE_TAG => {
                let text = self.text.take().unwrap_or_default();
                let value: f64 = parse_value(VALUE_TAG, text.trim())?;
                if let Some(metric) = &mut self.metric {
                    metric.values.push(value);
                }
            }
            METRIC_TAG => {
                if let Some(metric) = self.metric.take() {
                    if self.in_detail {
                        self.report.details.push(metric);
                    } else {
                        self.report.summary = Some(metric);
                    }
                }
            }
            DETAIL_TAG => self.in_detail = false,
            _ => {}
        }
        Ok(())
    }
}

fn read_root(result: &mut InvocationResult, element: &BytesStart<'_>) -> XmlResult<()> {
    let mut attrs = attributes(element)?;
    if let Some(start) = attrs.remove("start") {
        result.start = parse_time(&start)?;
    }
    if let Some(end) = attrs.remove("end") {
        result.end = parse_time(&end)?;
    }
    result.suite_name = attrs.remove("suite-name").unwrap_or_default();
    result.suite_version = attrs.remove("suite-version").unwrap_or_default();
    result.suite_plan = attrs.remove("suite-plan").unwrap_or_default();
    result.report_version = attrs.remove("report-version").unwrap_or_default();
    result.host_name = attrs.remove("host-name").unwrap_or_default();
    result.os_name = attrs.remove("os-name").unwrap_or_default();
    result.os_arch = attrs.remove("os-arch").unwrap_or_default();
    result.harness_version = attrs.remove("harness-version").unwrap_or_default();
    if let Some(devices) = attrs.remove("devices") {
        for serial in devices.split(',').filter(|s| !s.is_empty()) {
            result.add_device_serial(serial);
        }
    }
    if let Some(session) = attrs.remove("retry-session") {
        result.retry_session = Some(parse_value("retry-session", &session)?);
    }
    Ok(())
}

/// Parses a result document produced by [`write_result`].
///
/// # Errors
///
/// Fails on malformed XML, a root element other than `<Result>`, or
/// attribute values that do not parse.
pub fn parse_result(xml: &str) -> XmlResult<InvocationResult> {
    let mut reader = Reader::from_str(xml);
    let mut result = InvocationResult::new();
    let mut state = ParseState::default();

    loop {
        match reader.read_event()? {
            Event::Start(element) => state.open(&mut result, &element)?,
            Event::Empty(element) => {
                state.open(&mut result, &element)?;
                state.close(&mut result, &element_name(&element))?;
            }
            Event::End(element) => {
                let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
                state.close(&mut result, &name)?;
            }
            Event::Text(text) => {
                if let Some(buffer) = &mut state.text {
                    buffer.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(buffer) = &mut state.text {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !state.seen_root {
        return Err(XmlError::MissingRoot(RESULT_TAG.to_string()));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const START_MS: i64 = 1431586801000;
    const END_MS: i64 = 1431673199123;
    const STACK_TRACE: &str =
        "Something small is not alright\n at four.big.insects.Marley.sing(Marley.java:10)";

    fn sample() -> InvocationResult {
        let mut result = InvocationResult::new();
        result.start = START_MS;
        result.end = END_MS;
        result.suite_name = "CTS".to_string();
        result.suite_version = "5.0".to_string();
        result.suite_plan = "cts".to_string();
        result.host_name = "host".to_string();
        result.retry_session = Some(3);
        result.add_device_serial("device123");
        result
            .build_attributes
            .insert("DEVICE_INFO_GENERIC_ro.build.type".to_string(), "user".to_string());

        let module_a = result.get_or_create_module("mips64 ModuleA");
        module_a.set_device("device123");
        let test = module_a.get_or_create_result("android.test.Foo#testBlah1");
        test.set_start(START_MS);
        test.passed(None);
        test.set_end(END_MS);
        module_a
            .get_or_create_result("android.test.Foo#testBlah2")
            .not_executed();

        let module_b = result.get_or_create_module("mips64 ModuleB");
        let test = module_b.get_or_create_result("android.test.Bar#testBlah3");
        test.failed("Something small is not alright & <broken>", STACK_TRACE);
        let report = ReportLog {
            summary: Some(Metric::new(
                "android.test.Bar#testBlah4:20",
                "Headline",
                ScoreType::HigherBetter,
                ScoreUnit::Score,
                vec![9001.0],
            )),
            details: vec![Metric::new(
                "android.test.Bar#testBlah4:18",
                "Deats",
                ScoreType::LowerBetter,
                ScoreUnit::Ms,
                vec![14.0, 0.1 + 0.2, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0],
            )],
        };
        module_b
            .get_or_create_result("android.test.Bar#testBlah4")
            .passed(Some(report));
        result
    }

    fn bits(values: &[f64]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn test_round_trip() {
        let original = sample();
        let xml = write_result(&original).unwrap();
        let parsed = parse_result(&xml).unwrap();

        assert_eq!(parsed.start, START_MS);
        assert_eq!(parsed.end, END_MS);
        assert_eq!(parsed.suite_plan, "cts");
        assert_eq!(parsed.report_version, REPORT_VERSION);
        assert_eq!(parsed.retry_session, Some(3));
        assert_eq!(parsed.build_attributes, original.build_attributes);
        assert_eq!(parsed.device_serials().collect::<Vec<_>>(), vec!["device123"]);

        for status in TestStatus::ALL {
            assert_eq!(parsed.count_results(status), original.count_results(status));
        }

        let module_a = parsed.module("mips64 ModuleA").unwrap();
        assert_eq!(module_a.device(), Some("device123"));
        let test = module_a.case("android.test.Foo").unwrap().result("testBlah1").unwrap();
        assert_eq!(test.status(), Some(TestStatus::Pass));
        assert_eq!(test.start(), START_MS);
        assert_eq!(test.end(), END_MS);

        let module_b = parsed.module("mips64 ModuleB").unwrap();
        let case = module_b.case("android.test.Bar").unwrap();
        let failed = case.result("testBlah3").unwrap();
        assert_eq!(failed.status(), Some(TestStatus::Fail));
        assert_eq!(failed.message(), Some("Something small is not alright & <broken>"));
        assert_eq!(failed.stack_trace(), Some(STACK_TRACE));

        let expected = original.module("mips64 ModuleB").unwrap().case("android.test.Bar").unwrap()
            .result("testBlah4").unwrap().report_log().unwrap();
        let report = case.result("testBlah4").unwrap().report_log().unwrap();
        let summary = report.summary.as_ref().unwrap();
        assert_eq!(summary.source, "android.test.Bar#testBlah4:20");
        assert_eq!(summary.score_type, ScoreType::HigherBetter);
        assert_eq!(summary.unit, ScoreUnit::Score);
        assert_eq!(bits(&summary.values), bits(&[9001.0]));
        assert_eq!(report.details.len(), 1);
        assert_eq!(report.details[0].unit, ScoreUnit::Ms);
        assert_eq!(bits(&report.details[0].values), bits(&expected.details[0].values));
    }

    #[test]
    fn test_written_document_shape() {
        let xml = write_result(&sample()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("compatibility-result.xsl"));
        assert!(xml.contains(r#"<Summary pass="2" failed="1" not-executed="1"/>"#));
        assert!(xml.contains(r#"<Module name="ModuleA" abi="mips64" device="device123">"#));
        assert!(xml.contains(r#"start="2015-05-14 07:00:01.000""#));
    }

    #[test]
    fn test_parse_without_fractional_seconds() {
        let xml = r#"<?xml version='1.0' encoding='UTF-8' standalone='no' ?>
<?xml-stylesheet type="text/xsl" href="compatibility-result.xsl"?>
<Result start="2015-05-14 00:00:01" end="2015-05-14 23:59:59" suite-name="CTS" suite-plan="cts">
  <Summary pass="1" failed="0" not-executed="0" />
  <Module name="ModuleA" abi="mips64" device="device123">
    <TestCase name="android.test.Foo">
      <Test result="pass" name="testBlah1" start="2015-05-14 00:00:01" end="2015-05-14 23:59:59" />
    </TestCase>
  </Module>
</Result>"#;
        let result = parse_result(xml).unwrap();
        assert_eq!(result.start, 1431561601000);
        assert_eq!(result.end, 1431647999000);
        assert_eq!(result.count_results(TestStatus::Pass), 1);
    }

    #[test]
    fn test_wrong_root_is_an_error() {
        let err = parse_result("<TestPlan name=\"cts\"/>").unwrap_err();
        assert!(matches!(err, XmlError::UnexpectedRoot { .. }));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_result("<Result><Module></Result>").is_err());
        assert!(matches!(parse_result(""), Err(XmlError::MissingRoot(_))));
    }

    #[test]
    fn test_time_round_trip() {
        for millis in [0, START_MS, END_MS, 1_700_000_000_001] {
            assert_eq!(parse_time(&format_time(millis)).unwrap(), millis);
        }
    }
}

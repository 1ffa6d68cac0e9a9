//! Tests run against stored messages only

use super::preconditions::ReportObservingPrecondition;
use crate::engine::{TestContext, TestFailure};
use crate::precondition::BufferedObserver;
use crate::storage::MessageQuery;
use futures::future::BoxFuture;
use sdccc_types::{soap, soap::action, MessageContent, Transport};

type Outcome<'a> = BoxFuture<'a, Result<(), TestFailure>>;

const SOAP_MIME_TYPE: &str = "application/soap+xml";

fn require_data<T>(items: &[T], what: &str) -> Result<(), TestFailure> {
    if items.is_empty() {
        return Err(TestFailure::NoTestData(format!(
            "No {} seen during test run, test failed",
            what
        )));
    }
    Ok(())
}

fn relates_to_present(message: &MessageContent) -> bool {
    soap::element_text(&message.body_text(), "RelatesTo").is_some_and(|text| !text.is_empty())
}

pub(super) fn responses_carry_relates_to(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let responses = ctx.storage.inbound_soap_responses().await?.into_vec();
        require_data(&responses, "SOAP responses")?;
        for response in &responses {
            if !relates_to_present(response) {
                return Err(TestFailure::Assertion(format!(
                    "Response {} with action {} has no RelatesTo header",
                    response.id,
                    response.action().unwrap_or_default()
                )));
            }
        }
        Ok(())
    })
}

pub(super) fn faults_carry_relates_to(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let faults: Vec<MessageContent> = ctx
            .storage
            .inbound_soap_responses()
            .await?
            .into_iter()
            .filter(|m| soap::is_fault(&m.body_text()))
            .collect();
        require_data(&faults, "SOAP faults")?;
        for fault in &faults {
            if !relates_to_present(fault) {
                return Err(TestFailure::Assertion(format!(
                    "Fault {} has no RelatesTo header",
                    fault.id
                )));
            }
        }
        Ok(())
    })
}

pub(super) fn http_messages_use_soap_mime_type(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        if ctx.run_info.archive_service_present() {
            return Err(TestFailure::Aborted(
                "The DUT hosts an archive service, whose responses may use a different media type"
                    .into(),
            ));
        }
        let messages = ctx
            .storage
            .messages(&MessageQuery::inbound_soap().with_transport(Transport::Http))
            .await?
            .into_vec();
        require_data(&messages, "inbound HTTP messages")?;
        for message in &messages {
            let mime = message
                .content_type()
                .and_then(|ct| ct.split(';').next())
                .map(|m| m.trim().to_ascii_lowercase());
            if mime.as_deref() != Some(SOAP_MIME_TYPE) {
                return Err(TestFailure::Assertion(format!(
                    "Message {} uses media type {:?} instead of {}",
                    message.id, mime, SOAP_MIME_TYPE
                )));
            }
        }
        Ok(())
    })
}

pub(super) fn hello_carries_xaddrs(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let hellos = ctx
            .storage
            .inbound_messages_by_action(action::HELLO)
            .await?
            .into_vec();
        require_data(&hellos, "Hello messages")?;
        for hello in &hellos {
            let body = hello.body_text();
            let xaddrs = soap::element_text(&body, "XAddrs").unwrap_or_default();
            if xaddrs.split_whitespace().next().is_none() {
                return Err(TestFailure::Assertion(format!(
                    "Hello {} does not announce any XAddrs",
                    hello.id
                )));
            }
        }
        Ok(())
    })
}

pub(super) fn description_modification_has_mdib_version(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let reports = ctx
            .storage
            .inbound_messages_by_action(action::DESCRIPTION_MODIFICATION_REPORT)
            .await?
            .into_vec();
        require_data(&reports, "DescriptionModificationReports")?;
        for report in &reports {
            let body = report.body_text();
            let version = soap::find_element(&body, "DescriptionModificationReport")
                .and_then(|e| e.attribute("MdibVersion"))
                .and_then(|v| v.parse::<u64>().ok());
            if version.is_none() {
                return Err(TestFailure::Assertion(format!(
                    "DescriptionModificationReport {} has no valid MdibVersion",
                    report.id
                )));
            }
        }
        Ok(())
    })
}

pub(super) fn observed_changes_have_reports(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let observing = ctx
            .preconditions
            .get::<BufferedObserver<ReportObservingPrecondition>>()
            .ok_or_else(|| {
                TestFailure::Error("ReportObservingPrecondition is not registered".into())
            })?;
        observing.drain().await;

        let kinds = observing.processor().observed_kinds();
        require_data(&kinds, "device changes")?;
        for kind in kinds {
            let reports = ctx
                .storage
                .inbound_messages_by_action(kind.report_action())
                .await?;
            if !reports.are_objects_present() {
                return Err(TestFailure::Assertion(format!(
                    "A {:?} change was observed but no {} was stored",
                    kind,
                    kind.report_element()
                )));
            }
        }
        Ok(())
    })
}

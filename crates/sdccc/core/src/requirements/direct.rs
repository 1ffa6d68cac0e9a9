//! Tests run against the live connection

use crate::client::PortType;
use crate::engine::{TestContext, TestFailure};
use futures::future::BoxFuture;
use sdccc_types::soap;

type Outcome<'a> = BoxFuture<'a, Result<(), TestFailure>>;

pub(super) fn get_mdib_status_is_success(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let response = ctx.generator.get_mdib().await?;
        if !(200..300).contains(&response.status) {
            return Err(TestFailure::Assertion(format!(
                "GetMdib was answered with status {}",
                response.status
            )));
        }
        Ok(())
    })
}

pub(super) fn get_mdib_contains_md_state(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        let response = ctx.generator.get_mdib().await?;
        if response.is_fault() {
            return Err(TestFailure::Assertion("GetMdib was answered with a fault".into()));
        }
        if !soap::contains_element(&response.body, "MdState") {
            return Err(TestFailure::Assertion(
                "GetMdibResponse does not contain an MdState".into(),
            ));
        }
        Ok(())
    })
}

pub(super) fn get_service_is_hosted(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        if !ctx.generator.hosts(PortType::Get)? {
            return Err(TestFailure::Assertion(format!(
                "No hosted service of {} implements the {} port type",
                ctx.client.target_epr(),
                PortType::Get
            )));
        }
        Ok(())
    })
}

pub(super) fn empty_context_state_request_succeeds(ctx: &TestContext) -> Outcome<'_> {
    Box::pin(async move {
        if !ctx.generator.has_context_service()? {
            return Err(TestFailure::NoTestData(
                "The DUT does not host a context service".into(),
            ));
        }
        let response = ctx.generator.get_context_states(vec![]).await?;
        if response.is_fault() {
            return Err(TestFailure::Assertion(
                "GetContextStates with an empty handle list was answered with a fault".into(),
            ));
        }
        Ok(())
    })
}

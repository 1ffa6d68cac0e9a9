//! Preconditions used by the invariant tests

use crate::precondition::{
    ChangeProcessor, ManipulationPrecondition, PreconditionContext, PreconditionError,
    SimplePrecondition,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sdccc_types::{soap::action, DeviceChange, ReportKind};
use std::collections::BTreeSet;

/// The DUT must have announced itself with a Hello
#[derive(Debug, Default)]
pub struct HelloMessagePrecondition;

#[async_trait]
impl SimplePrecondition for HelloMessagePrecondition {
    async fn check(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
        Ok(ctx
            .storage
            .inbound_messages_by_action(action::HELLO)
            .await?
            .are_objects_present())
    }

    async fn manipulation(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
        Ok(ctx.manipulations.send_hello().await.is_success())
    }
}

/// At least one episodic metric report must have been received
#[derive(Debug, Default)]
pub struct MetricReportPrecondition;

#[async_trait]
impl SimplePrecondition for MetricReportPrecondition {
    async fn check(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
        Ok(ctx
            .storage
            .inbound_messages_by_action(action::EPISODIC_METRIC_REPORT)
            .await?
            .are_objects_present())
    }

    async fn manipulation(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
        Ok(ctx
            .manipulations
            .trigger_report(ReportKind::Metric)
            .await
            .is_success())
    }
}

/// Causes a description modification
#[derive(Debug, Default)]
pub struct DescriptionModificationPrecondition;

#[async_trait]
impl ManipulationPrecondition for DescriptionModificationPrecondition {
    async fn manipulation(&self, ctx: &PreconditionContext) -> Result<bool, PreconditionError> {
        Ok(ctx
            .manipulations
            .trigger_descriptor_update()
            .await
            .is_success())
    }
}

/// Remembers which kinds of changes the DUT reported while connected
#[derive(Debug, Default)]
pub struct ReportObservingPrecondition {
    observed: Mutex<BTreeSet<ReportKind>>,
}

impl ReportObservingPrecondition {
    pub fn observed_kinds(&self) -> Vec<ReportKind> {
        self.observed.lock().iter().copied().collect()
    }
}

#[async_trait]
impl ChangeProcessor for ReportObservingPrecondition {
    async fn process_change(&self, change: DeviceChange) -> Result<(), PreconditionError> {
        self.observed.lock().insert(change.kind);
        Ok(())
    }
}

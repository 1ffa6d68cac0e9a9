//! Manipulation recording

use crate::client::Manipulations;
use crate::storage::MessageStorage;
use async_trait::async_trait;
use chrono::Utc;
use sdccc_types::{ManipulationInfo, ManipulationResult, ReportKind};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Stores a [`ManipulationInfo`] for every call before returning its result
pub struct RecordingManipulations {
    inner: Arc<dyn Manipulations>,
    storage: Arc<dyn MessageStorage>,
}

impl RecordingManipulations {
    pub fn new(inner: Arc<dyn Manipulations>, storage: Arc<dyn MessageStorage>) -> Self {
        Self { inner, storage }
    }

    async fn record<F>(
        &self,
        method_name: &str,
        parameters: Vec<(String, String)>,
        call: F,
    ) -> ManipulationResult
    where
        F: Future<Output = ManipulationResult>,
    {
        let started_at = Utc::now();
        let result = call.await;
        info!(manipulation = method_name, %result, "Manipulation finished");
        self.storage.add_manipulation(ManipulationInfo::new(
            method_name,
            parameters,
            result,
            started_at,
            Utc::now(),
        ));
        result
    }
}

#[async_trait]
impl Manipulations for RecordingManipulations {
    async fn send_hello(&self) -> ManipulationResult {
        self.record("send_hello", vec![], self.inner.send_hello()).await
    }

    async fn trigger_report(&self, kind: ReportKind) -> ManipulationResult {
        let parameters = vec![("report".to_string(), kind.report_element().to_string())];
        self.record("trigger_report", parameters, self.inner.trigger_report(kind))
            .await
    }

    async fn trigger_descriptor_update(&self) -> ManipulationResult {
        self.record(
            "trigger_descriptor_update",
            vec![],
            self.inner.trigger_descriptor_update(),
        )
        .await
    }

    async fn set_patient_association(&self, associated: bool) -> ManipulationResult {
        let parameters = vec![("associated".to_string(), associated.to_string())];
        self.record(
            "set_patient_association",
            parameters,
            self.inner.set_patient_association(associated),
        )
        .await
    }
}

//! Baseline traffic before direct tests
//!
//! Issues every read-only request the DUT supports once so the message
//! storage holds traffic for the invariant tests. Nothing here asserts;
//! individual failures are logged and the check moves on.

use crate::client::{ClientResult, SoapResponse};
use crate::generator::MessageGenerator;
use crate::observer::RunObserver;
use std::future::Future;
use tracing::{debug, info, instrument, warn};

/// Best-effort GET pass over all hosted services
pub struct BasicMessagingCheck {
    generator: MessageGenerator,
    observer: RunObserver,
}

/// Counts of a finished check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    pub attempted: usize,
    pub failed: usize,
}

impl BasicMessagingCheck {
    pub fn new(generator: MessageGenerator, observer: RunObserver) -> Self {
        Self {
            generator,
            observer,
        }
    }

    async fn attempt<F>(&self, outcome: &mut CheckOutcome, label: &str, request: F)
    where
        F: Future<Output = ClientResult<SoapResponse>>,
    {
        outcome.attempted += 1;
        match request.await {
            Ok(response) if response.is_fault() => {
                debug!(request = label, status = response.status, "Request answered with a fault");
            }
            Ok(_) => debug!(request = label, "Request succeeded"),
            Err(err) => {
                outcome.failed += 1;
                warn!(request = label, error = %err, "Request failed during basic messaging check");
            }
        }
    }

    fn supports(&self, label: &str, probe: ClientResult<bool>) -> bool {
        match probe {
            Ok(hosted) => hosted,
            Err(err) => {
                warn!(service = label, error = %err, "Could not determine whether service is hosted");
                false
            }
        }
    }

    /// Run the check. Never fails; failures are counted in the outcome.
    #[instrument(skip_all)]
    pub async fn run(&self) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let generator = &self.generator;

        self.attempt(&mut outcome, "GetMdib", generator.get_mdib()).await;
        self.attempt(
            &mut outcome,
            "GetMdDescription",
            generator.get_md_description(vec![]),
        )
        .await;
        self.attempt(&mut outcome, "GetMdState", generator.get_md_state(vec![]))
            .await;

        if self.supports("ContextService", generator.has_context_service()) {
            self.attempt(
                &mut outcome,
                "GetContextStates",
                generator.get_context_states(vec![]),
            )
            .await;
        }

        if self.supports(
            "ContainmentTreeService",
            generator.has_containment_tree_service(),
        ) {
            self.attempt(
                &mut outcome,
                "GetContainmentTree",
                generator.get_containment_tree(vec![]),
            )
            .await;
            self.attempt(&mut outcome, "GetDescriptor", generator.get_descriptor(vec![]))
                .await;
        }

        if self.supports("LocalizationService", generator.has_localization_service()) {
            self.attempt(&mut outcome, "GetLocalizedText", generator.get_localized_texts())
                .await;
            self.attempt(
                &mut outcome,
                "GetSupportedLanguages",
                generator.get_supported_languages(),
            )
            .await;
        }

        if self.observer.is_invalid() {
            info!("SDC Basic Messaging Check completed with errors.");
        } else {
            info!("SDC Basic Messaging Check completed successfully.");
        }
        outcome
    }
}

//! Requirement test catalog

mod direct;
mod invariant;
pub mod preconditions;

use crate::engine::{TestBody, TestCase};
use crate::precondition::PreconditionSpec;
use preconditions::{
    DescriptionModificationPrecondition, HelloMessagePrecondition, MetricReportPrecondition,
    ReportObservingPrecondition,
};
use sdccc_types::{Phase, TestIdentifier, TypesResult};

fn test(
    id: &str,
    phase: Phase,
    class_name: &'static str,
    name: &'static str,
    description: &'static str,
    body: TestBody,
) -> TypesResult<TestCase> {
    Ok(TestCase::new(TestIdentifier::parse(id)?, phase, class_name, name, body)
        .with_description(description))
}

/// Every requirement test known to the suite, in execution order
pub fn catalog() -> TypesResult<Vec<TestCase>> {
    Ok(vec![
        test(
            "DPWS.R0013",
            Phase::Direct,
            "DirectDPWSTest",
            "testRequirementR0013",
            "Sends a GetMdib request and checks that the binding answers with a success status.",
            direct::get_mdib_status_is_success,
        )?,
        test(
            "BICEPS.R0021",
            Phase::Direct,
            "DirectBICEPSTest",
            "testRequirementR0021",
            "Sends a GetMdib request and checks that the MDIB contains an MdState.",
            direct::get_mdib_contains_md_state,
        )?,
        test(
            "BICEPS.R0062",
            Phase::Direct,
            "DirectBICEPSTest",
            "testRequirementR0062",
            "Checks that the DUT hosts a service implementing the GetService port type.",
            direct::get_service_is_hosted,
        )?,
        test(
            "BICEPS.R5039",
            Phase::Direct,
            "DirectBICEPSTest",
            "testRequirementR5039",
            "Sends GetContextStates without handles and checks that no fault is returned.",
            direct::empty_context_state_request_succeeds,
        )?,
        test(
            "DPWS.R0019",
            Phase::Invariant,
            "InvariantDPWSTest",
            "testRequirementR0019",
            "Checks that every response received from the DUT carries a RelatesTo header.",
            invariant::responses_carry_relates_to,
        )?,
        test(
            "DPWS.R0040",
            Phase::Invariant,
            "InvariantDPWSTest",
            "testRequirementR0040",
            "Checks that every SOAP fault received from the DUT carries a RelatesTo header.",
            invariant::faults_carry_relates_to,
        )?,
        test(
            "MDPWS.R0006",
            Phase::Invariant,
            "InvariantMDPWSTest",
            "testRequirementR0006",
            "Checks that every HTTP message from the DUT uses the application/soap+xml media type.",
            invariant::http_messages_use_soap_mime_type,
        )?,
        test(
            "MDPWS.R0008",
            Phase::Invariant,
            "InvariantMDPWSTest",
            "testRequirementR0008",
            "Checks that every Hello sent by the DUT announces its transport addresses.",
            invariant::hello_carries_xaddrs,
        )?
        .with_precondition(PreconditionSpec::simple::<HelloMessagePrecondition>()),
        test(
            "GLUE.R0056",
            Phase::Invariant,
            "InvariantGLUETest",
            "testRequirementR0056",
            "Checks that every DescriptionModificationReport carries an MdibVersion.",
            invariant::description_modification_has_mdib_version,
        )?
        .with_precondition(PreconditionSpec::manipulation::<DescriptionModificationPrecondition>()),
        test(
            "GLUE.R0036",
            Phase::Invariant,
            "InvariantGLUETest",
            "testRequirementR0036",
            "Checks that every kind of change observed while connected was delivered with an episodic report.",
            invariant::observed_changes_have_reports,
        )?
        .with_precondition(PreconditionSpec::buffered::<ReportObservingPrecondition>())
        .with_precondition(PreconditionSpec::simple::<MetricReportPrecondition>()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_is_well_formed() {
        let catalog = catalog().unwrap();
        assert_eq!(catalog.len(), 10);

        let ids: HashSet<&str> = catalog.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(ids.len(), catalog.len());
        assert!(catalog.iter().all(|c| c.description.is_some()));
        assert!(catalog
            .iter()
            .filter(|c| c.phase == Phase::Direct)
            .all(|c| c.preconditions.is_empty()));
    }

    #[test]
    fn test_precondition_declarations() {
        let catalog = catalog().unwrap();
        let glue = catalog
            .iter()
            .find(|c| c.identifier.as_str() == "GLUE.R0036")
            .unwrap();
        let names: Vec<&str> = glue.preconditions.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["ReportObservingPrecondition", "MetricReportPrecondition"]);
    }
}

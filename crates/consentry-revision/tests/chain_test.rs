//! Revision chain behaviour over the in-memory store.

use std::{sync::Arc, time::Duration};

use consentry_core::{
    Actor, ConsentRecord, ConsentState, CoreError, DataAgreement, DataAttribute, IndividualId,
    LawfulBasis, Lifecycle, OrganisationId, Policy, SchemaName, TestClock,
};
use consentry_revision::{
    storage::mock::MockRevisionStore, verify_chain, ChainFault, RevisionChain,
    RevisionChainConfig, RevisionError,
};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn policy(id: &str, version: u32) -> Policy {
    Policy {
        id: id.to_string(),
        name: "Retention policy".to_string(),
        version: version.to_string(),
        url: "https://example.org/policy".to_string(),
        jurisdiction: "EU".to_string(),
        industry_sector: "Healthcare".to_string(),
        data_retention_period_days: 90,
        geographic_restriction: "EEA".to_string(),
        storage_location: "Ireland".to_string(),
        third_party_data_sharing: true,
    }
}

fn data_agreement(id: &str) -> DataAgreement {
    DataAgreement {
        id: id.to_string(),
        version: "1.0.0".to_string(),
        controller_id: "ctrl-1".to_string(),
        controller_name: "Acme".to_string(),
        controller_url: "https://acme.example".to_string(),
        policy: policy("pol-da", 1),
        purpose: "Marketing".to_string(),
        purpose_description: "Newsletters about new products".to_string(),
        lawful_basis: LawfulBasis::Consent,
        method_of_use: "data_source".to_string(),
        dpia_date: "2024-01-01".to_string(),
        dpia_summary_url: "https://acme.example/dpia".to_string(),
        active: true,
        forgettable: false,
        compatible_with_version_id: String::new(),
        lifecycle: Lifecycle::Complete,
        data_attributes: vec![DataAttribute {
            id: "attr-1".to_string(),
            name: "email".to_string(),
            description: "Contact address".to_string(),
            sensitivity: false,
            category: "contact".to_string(),
        }],
        organisation_id: OrganisationId::new(),
    }
}

fn chain(store: &MockRevisionStore, retries: u32) -> RevisionChain {
    RevisionChain::new(
        Arc::new(store.clone()),
        Arc::new(TestClock::new()),
        RevisionChainConfig { max_conflict_retries: retries },
    )
}

#[tokio::test]
async fn data_agreement_and_consent_record_round_trip() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 3);
    let admin = Actor::Other("admin-1".to_string());

    let agreement = data_agreement("da-1");
    let da_revision = chain.record(&agreement, &admin).await.unwrap();
    assert_eq!(da_revision.authorized_by_other_id, "admin-1");

    let individual = IndividualId::new();
    let record = ConsentRecord {
        id: "cr-1".to_string(),
        data_agreement_id: agreement.id.clone(),
        data_agreement_revision_id: da_revision.id,
        data_agreement_revision_hash: da_revision.serialized_hash.clone(),
        individual_id: individual,
        opt_in: true,
        state: ConsentState::Unsigned,
        signature_id: None,
        organisation_id: agreement.organisation_id,
    };
    let cr_revision =
        chain.record(&record, &Actor::Individual(individual.to_string())).await.unwrap();
    assert_eq!(cr_revision.authorized_by_individual_id, individual.to_string());
    assert!(cr_revision.authorized_by_other_id.is_empty());

    let recreated_agreement: DataAgreement = chain.recreate(da_revision.id).await.unwrap();
    let recreated_record: ConsentRecord = chain.recreate(cr_revision.id).await.unwrap();
    assert_eq!(recreated_agreement, agreement);
    assert_eq!(recreated_record, record);
}

#[tokio::test]
async fn lookup_is_scoped_to_schema() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 3);

    let revision = chain.record(&policy("p", 1), &Actor::Other("a".into())).await.unwrap();

    let err = chain.get_by_id_and_schema(revision.id, SchemaName::DataAgreement).await.unwrap_err();
    assert!(err.is_not_found());

    let err = chain.recreate::<DataAgreement>(revision.id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn concurrent_writers_never_fork_the_chain() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 64);
    let actor = Actor::Other("admin".to_string());

    let writers = (0..16).map(|version| {
        let chain = chain.clone();
        let actor = actor.clone();
        tokio::spawn(async move { chain.record(&policy("shared", version), &actor).await })
    });
    let results = futures::future::join_all(writers).await;

    for result in results {
        result.expect("writer task panicked").expect("record failed");
    }

    let verified = chain.verify("shared", SchemaName::Policy).await.unwrap();
    assert_eq!(verified.len(), 16);
    assert_eq!(store.all().await.iter().filter(|r| r.is_head()).count(), 1);
}

#[tokio::test]
async fn exhausted_retries_report_chain_conflict() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 0);
    store.inject_append_error(CoreError::Conflict("raced".into())).await;

    let err = chain.record(&policy("p", 1), &Actor::Other("a".into())).await.unwrap_err();

    match err {
        RevisionError::ChainConflict { object_id, schema, attempts } => {
            assert_eq!(object_id, "p");
            assert_eq!(schema, SchemaName::Policy);
            assert_eq!(attempts, 1);
        },
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(store.all().await.is_empty());
}

#[tokio::test]
async fn broken_successor_link_fails_verification() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 3);
    let actor = Actor::Other("a".into());

    let first = chain.record(&policy("p", 1), &actor).await.unwrap();
    chain.record(&policy("p", 2), &actor).await.unwrap();

    let mut unlinked = chain.get(first.id).await.unwrap();
    unlinked.successor_id = None;
    store.tamper(unlinked).await;

    assert!(matches!(
        chain.verify("p", SchemaName::Policy).await.unwrap_err(),
        RevisionError::Integrity(_)
    ));
}

#[tokio::test]
async fn rewritten_columns_fail_verification_even_with_an_intact_hash() {
    let store = MockRevisionStore::new();
    let chain = chain(&store, 3);

    let revision = chain.record(&policy("p", 1), &Actor::Other("admin".into())).await.unwrap();

    let mut forged = revision.clone();
    forged.object_data = "{\"v\":999}".to_string();
    forged.authorized_by_other_id = "mallory".to_string();
    store.tamper(forged).await;

    match chain.verify("p", SchemaName::Policy).await.unwrap_err() {
        RevisionError::Integrity(ChainFault::SnapshotMismatch { id }) => assert_eq!(id, revision.id),
        other => panic!("unexpected error: {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 24, failure_persistence: None, ..ProptestConfig::default() })]

    #[test]
    fn recorded_history_always_verifies(versions in prop::collection::vec(0u32..1000, 1..10), gaps in prop::collection::vec(0u64..3, 10)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let store = MockRevisionStore::new();
            let clock = TestClock::new();
            let chain = RevisionChain::new(
                Arc::new(store.clone()),
                Arc::new(clock.clone()),
                RevisionChainConfig::default(),
            );
            let actor = Actor::Other("admin".to_string());

            let mut recorded = Vec::new();
            for (version, gap) in versions.iter().zip(gaps.iter().cycle()) {
                clock.advance(Duration::from_secs(*gap));
                recorded.push(chain.record(&policy("p", *version), &actor).await.unwrap());
            }

            let ordered = chain.verify("p", SchemaName::Policy).await.unwrap();
            assert!(verify_chain(&ordered).is_ok());
            assert_eq!(
                ordered.iter().map(|r| r.id).collect::<Vec<_>>(),
                recorded.iter().map(|r| r.id).collect::<Vec<_>>()
            );

            let newest = chain.list_all("p", SchemaName::Policy).await.unwrap();
            assert_eq!(newest.first().map(|r| r.id), recorded.last().map(|r| r.id));
        });
    }
}

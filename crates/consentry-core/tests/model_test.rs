//! Property-based tests for revision and delivery model invariants.

use chrono::{TimeZone, Utc};
use consentry_core::{
    models::revision::sha1_hex, Actor, DeliveryStatus, Revision, RevisionSnapshot, SchemaName,
    WebhookEventType,
};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};

fn proptest_config() -> ProptestConfig {
    ProptestConfig { cases: 64, failure_persistence: None, ..ProptestConfig::default() }
}

fn schema_strategy() -> impl Strategy<Value = SchemaName> {
    prop::sample::select(vec![SchemaName::Policy, SchemaName::DataAgreement, SchemaName::ConsentRecord])
}

fn actor_strategy() -> impl Strategy<Value = Actor> {
    (any::<bool>(), "[a-z0-9-]{1,24}")
        .prop_map(|(individual, id)| if individual { Actor::Individual(id) } else { Actor::Other(id) })
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn hash_is_sha1_of_snapshot(
        object_id in "[a-zA-Z0-9-]{1,36}",
        schema in schema_strategy(),
        actor in actor_strategy(),
        payload in prop::collection::btree_map("[a-z]{1,8}", ".{0,32}", 0..6),
        secs in 0i64..4_000_000_000,
    ) {
        let ts = Utc.timestamp_opt(secs, 0).unwrap();
        let mut revision = Revision::init_at(object_id, &actor, schema, ts);
        revision.create_revision(&payload).unwrap();

        prop_assert_eq!(&revision.serialized_hash, &sha1_hex(revision.serialized_snapshot.as_bytes()));
        prop_assert_eq!(RevisionSnapshot::parse(&revision.serialized_snapshot).unwrap(), revision.snapshot());
        prop_assert_eq!(revision.object_data, serde_json::to_string(&payload).unwrap());
    }

    #[test]
    fn successive_updates_form_a_linked_list(versions in prop::collection::vec(any::<u32>(), 1..12)) {
        let actor = Actor::Other("admin".to_string());
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut chain: Vec<Revision> = Vec::new();

        for version in &versions {
            let mut next = Revision::init_at("obj", &actor, SchemaName::Policy, ts);
            next.update_revision(chain.last_mut(), version).unwrap();
            chain.push(next);
        }

        prop_assert!(chain[0].predecessor_hash.is_empty());
        for pair in chain.windows(2) {
            prop_assert_eq!(&pair[1].predecessor_hash, &pair[0].serialized_hash);
            prop_assert_eq!(pair[0].successor_id, Some(pair[1].id));
        }
        prop_assert!(chain.last().unwrap().successor_id.is_none());
    }

    #[test]
    fn delivery_success_window(code in 100u16..600) {
        let expected = (200..=208).contains(&code) || code == 226;
        let delivery = consentry_core::WebhookDelivery {
            id: Default::default(),
            webhook_id: Default::default(),
            user_id: String::new(),
            webhook_event_type: WebhookEventType::ConsentAllowed,
            request_headers: Default::default(),
            request_payload: String::new(),
            response_headers: Default::default(),
            response_body: String::new(),
            response_status_code: Some(code),
            response_status_str: String::new(),
            execution_start_timestamp: Utc::now(),
            execution_end_timestamp: Utc::now(),
            status: DeliveryStatus::Completed,
            status_description: String::new(),
        };

        prop_assert_eq!(delivery.is_successful(), expected);
    }
}

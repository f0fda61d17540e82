mod common;

use ceremony_census::backfill::{self, BackfillOptions, DerivedField};
use ceremony_census::dataset::DatasetStore;
use ceremony_census::merge::InvalidAddressPolicy;
use ceremony_census::pipeline;
use ceremony_census::rpc::{BlockHeight, ChainReader};
use ceremony_census::transcript::{self, TranscriptDocument};
use ceremony_census::CensusError;
use common::{StubChain, address, eth_id, transcript_json};

/// Two contributors behind the anchor. A reads a zero balance, B's node
/// errors. The balance pass stops on B, A's value is already on disk and the
/// nonce pass never starts.
#[test]
fn test_transport_error_stops_run_after_persisting_earlier_rows() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = DatasetStore::new(temp_dir.path().join("participants.bin"));

    let doc = TranscriptDocument::from_json(&transcript_json(&[eth_id(0xa), eth_id(0xb)])).unwrap();
    assert_eq!(transcript::parse(&doc).unwrap().len(), 2);

    let a = address(0xa).parse().unwrap();
    let b = address(0xb).parse().unwrap();
    let mut chain = StubChain::new();
    chain.balances.insert(a, 0);
    chain.transport_failures.insert(b);

    let options = BackfillOptions::new(BlockHeight(15_537_393));
    let stub: &mut dyn ChainReader = &mut chain;
    let result = pipeline::run(&store, &doc, InvalidAddressPolicy::Abort, Some((stub, &options)));

    assert!(matches!(result, Err(CensusError::RpcTransport(_))));
    assert!(chain.calls_for("nonce").is_empty(), "nonce pass must not start");
    assert!(chain.calls_for("ens").is_empty());

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved.get(&eth_id(0xa)).unwrap().balance, Some(0));
    assert_eq!(saved.get(&eth_id(0xb)).unwrap().balance, None);
}

/// A name lookup that returns garbage is recorded as an empty name and is
/// never asked again.
#[test]
fn test_decode_error_is_recorded_and_not_refetched() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = DatasetStore::new(temp_dir.path().join("participants.bin"));
    let doc = TranscriptDocument::from_json(&transcript_json(&[eth_id(0xc), eth_id(0xd)])).unwrap();
    let (mut dataset, _) = pipeline::ingest(&store, &doc, InvalidAddressPolicy::Abort).unwrap();

    let c = address(0xc).parse().unwrap();
    let d = address(0xd).parse().unwrap();
    let mut chain = StubChain::new();
    chain.decode_failures.insert(c);
    chain.names.insert(d, "dee.eth".to_string());
    let options = BackfillOptions::new(BlockHeight(1));

    let first =
        backfill::backfill_field(&mut dataset, DerivedField::Ens, &mut chain, &store, &options)
            .unwrap();
    assert_eq!(first.fetched, 2);
    assert_eq!(first.empty_names, 1);
    assert_eq!(dataset.get(&eth_id(0xc)).unwrap().ens.as_deref(), Some(""));
    assert_eq!(dataset.get(&eth_id(0xd)).unwrap().ens.as_deref(), Some("dee.eth"));

    let mut reloaded = store.load().unwrap().unwrap();
    let mut second_chain = StubChain::new();
    let second = backfill::backfill_field(
        &mut reloaded,
        DerivedField::Ens,
        &mut second_chain,
        &store,
        &options,
    )
    .unwrap();
    assert_eq!(second.missing, 0);
    assert!(second_chain.calls.is_empty());
}

/// Rows from other sign-in providers never reach the chain.
#[test]
fn test_rows_without_address_are_never_fetched() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = DatasetStore::new(temp_dir.path().join("participants.bin"));
    let ids = vec![eth_id(1), "git|1234".to_string(), "email|someone".to_string()];
    let doc = TranscriptDocument::from_json(&transcript_json(&ids)).unwrap();

    let mut chain = StubChain::new();
    let options = BackfillOptions::new(BlockHeight(1));
    let stub: &mut dyn ChainReader = &mut chain;
    let (dataset, outcome) =
        pipeline::run(&store, &doc, InvalidAddressPolicy::Abort, Some((stub, &options))).unwrap();

    assert_eq!(outcome.backfill.len(), 3);
    assert!(outcome.backfill.iter().all(|r| r.fetched == 1));
    assert_eq!(chain.calls.len(), 3);
    let git = dataset.get("git|1234").unwrap();
    assert_eq!((git.balance, git.nonce, git.ens.clone()), (None, None, None));
}

/// Only name resolution treats a decode failure as an empty answer. A balance
/// that cannot be decoded stops the run like any transport failure.
#[test]
fn test_balance_decode_error_is_fatal() {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = DatasetStore::new(temp_dir.path().join("participants.bin"));
    let doc = TranscriptDocument::from_json(&transcript_json(&[eth_id(0xe)])).unwrap();
    let (mut dataset, _) = pipeline::ingest(&store, &doc, InvalidAddressPolicy::Abort).unwrap();

    let mut chain = StubChain::new();
    chain.balance_decode_failures.insert(address(0xe).parse().unwrap());
    let options = BackfillOptions::new(BlockHeight(1));

    let result = backfill::backfill_all(&mut dataset, &mut chain, &store, &options);

    assert!(matches!(result, Err(CensusError::RpcDecode(_))), "{:?}", result.map(|r| r.len()));
    assert_eq!(dataset.get(&eth_id(0xe)).unwrap().balance, None);
    assert!(chain.calls_for("nonce").is_empty());
    assert!(chain.calls_for("ens").is_empty());
    assert_eq!(store.load().unwrap().unwrap().get(&eth_id(0xe)).unwrap().balance, None);
}

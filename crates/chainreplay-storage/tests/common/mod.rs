//! Scenarios every entity store backend must pass.

#![allow(dead_code)]

use futures::{StreamExt, TryStreamExt};
use num_bigint::BigUint;
use serde_json::json;

use chainreplay_core::codec;
use chainreplay_core::{
    drive_reader_by_index, object_codec, BlockIdentifier, EncodingError, Entity, EntityDefinitions,
    EntityStore, EntityWithMetadata, IndexDefinition, IndexKey, IndexScanArgs, IndexerError,
    PageRequest, ReaderExt,
};

// ─── Entities ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub tokens_owned: BigUint,
}

object_codec! {
    pub struct AddressCodec for Address {
        tokens_owned as "tokensOwned": codec::big_number(),
    }
}

impl Entity for Address {
    const NAME: &'static str = "Address";
    type Codec = AddressCodec;

    fn indexes() -> Vec<IndexDefinition<Self>> {
        vec![IndexDefinition::new("byTokensOwned", |a: &Address| {
            Ok(IndexKey::new().natural_descending(&a.tokens_owned))
        })]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    pub proposal: String,
    pub voter: String,
    pub weight: BigUint,
}

object_codec! {
    pub struct VoteCodec for Vote {
        proposal: codec::text(),
        voter: codec::text(),
        weight: codec::big_number(),
    }
}

impl Entity for Vote {
    const NAME: &'static str = "Vote";
    type Codec = VoteCodec;

    fn indexes() -> Vec<IndexDefinition<Self>> {
        vec![IndexDefinition::new("byProposalByVotes", |v: &Vote| {
            Ok(IndexKey::new().text(&v.proposal).natural(&v.weight))
        })]
    }
}

/// Index derivation fails for the label `"boom"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragile {
    pub label: String,
}

object_codec! {
    pub struct FragileCodec for Fragile {
        label: codec::text(),
    }
}

impl Entity for Fragile {
    const NAME: &'static str = "Fragile";
    type Codec = FragileCodec;

    fn indexes() -> Vec<IndexDefinition<Self>> {
        vec![IndexDefinition::new("byLabel", |f: &Fragile| {
            if f.label == "boom" {
                return Err(EncodingError::Malformed("label cannot be indexed".into()));
            }
            Ok(IndexKey::new().text(&f.label))
        })]
    }
}

pub fn definitions() -> EntityDefinitions {
    EntityDefinitions::new()
        .with::<Address>()
        .with::<Vote>()
        .with::<Fragile>()
}

pub fn vote(proposal: &str, voter: &str, weight: u64) -> Vote {
    Vote {
        proposal: proposal.into(),
        voter: voter.into(),
        weight: BigUint::from(weight),
    }
}

pub fn vote_update(id: &str, vote: &Vote) -> EntityWithMetadata {
    EntityWithMetadata::new(id, vote).unwrap()
}

fn block(n: u64) -> BlockIdentifier {
    BlockIdentifier::new(format!("0x{n:x}"), n)
}

async fn vote_weights<S: EntityStore>(store: &S, args: IndexScanArgs) -> Vec<u64> {
    let votes: Vec<_> = store
        .entities_by_index::<Vote>("byProposalByVotes", args)
        .try_collect()
        .await
        .unwrap();
    votes
        .into_iter()
        .map(|v| v.value.weight.try_into().unwrap())
        .collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

pub async fn empty_store_has_no_checkpoint<S: EntityStore>(store: &S) {
    assert_eq!(store.get_finalized_block().await.unwrap(), None);
    assert_eq!(store.get_latest_block(), None);
    assert!(store.entity::<Vote>("1").await.unwrap().is_none());
}

pub async fn single_entity_flush<S: EntityStore>(store: &S) {
    let checkpoint = BlockIdentifier::new("0x1", 10);
    let update = EntityWithMetadata {
        entity: "Address".into(),
        id: "0xabc".into(),
        value: json!({ "tokensOwned": "100" }),
    };
    store
        .flush_updates(&checkpoint, &definitions(), vec![update])
        .await
        .unwrap();

    let address = store.entity::<Address>("0xabc").await.unwrap().unwrap();
    assert_eq!(address.tokens_owned, BigUint::from(100u32));
    assert_eq!(store.get_finalized_block().await.unwrap(), Some(checkpoint.clone()));
    assert_eq!(store.get_latest_block(), Some(checkpoint));

    let all: Vec<_> = store.get_entities().try_collect().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].entity, "Address");
    assert_eq!(all[0].value, json!({ "tokensOwned": "100" }));
}

pub async fn later_update_in_batch_wins<S: EntityStore>(store: &S) {
    let updates = vec![
        vote_update("v1", &vote("7", "0xa", 1)),
        vote_update("v1", &vote("7", "0xa", 2)),
    ];
    store.flush_updates(&block(1), &definitions(), updates).await.unwrap();

    assert_eq!(store.entity::<Vote>("v1").await.unwrap(), Some(vote("7", "0xa", 2)));
    assert_eq!(vote_weights(store, IndexScanArgs::all()).await, vec![2]);
}

pub async fn failed_flush_changes_nothing<S: EntityStore>(store: &S) {
    let defs = definitions();
    store
        .flush_updates(&block(1), &defs, vec![vote_update("v1", &vote("7", "0xa", 5))])
        .await
        .unwrap();

    let updates = vec![
        vote_update("v1", &vote("7", "0xa", 50)),
        vote_update("v2", &vote("7", "0xb", 1)),
        EntityWithMetadata::new("f", &Fragile { label: "boom".into() }).unwrap(),
    ];
    let err = store.flush_updates(&block(2), &defs, updates).await.unwrap_err();
    assert!(matches!(err, IndexerError::Encoding(_)), "{err}");

    assert_eq!(store.get_latest_block(), Some(block(1)));
    assert_eq!(store.get_finalized_block().await.unwrap(), Some(block(1)));
    assert_eq!(store.entity::<Vote>("v1").await.unwrap(), Some(vote("7", "0xa", 5)));
    assert_eq!(store.entity::<Vote>("v2").await.unwrap(), None);
    assert_eq!(vote_weights(store, IndexScanArgs::all()).await, vec![5]);
}

pub async fn unknown_entity_is_rejected<S: EntityStore>(store: &S) {
    let update = EntityWithMetadata {
        entity: "Delegate".into(),
        id: "x".into(),
        value: json!({}),
    };
    let err = store
        .flush_updates(&block(3), &definitions(), vec![update])
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::UnknownEntity(ref name) if name == "Delegate"));
    assert_eq!(store.get_latest_block(), None);
}

pub async fn prefix_scan_orders_by_weight<S: EntityStore>(store: &S) {
    let updates = vec![
        vote_update("a", &vote("7", "0xa", 5)),
        vote_update("b", &vote("7", "0xb", 3)),
        vote_update("c", &vote("7", "0xc", 9)),
        vote_update("d", &vote("8", "0xd", 1)),
        vote_update("e", &vote("6", "0xe", 100)),
    ];
    store.flush_updates(&block(4), &definitions(), updates).await.unwrap();

    let prefix = IndexKey::new().text("7");
    let scan = chainreplay_core::take_while_prefix(
        store.entities_by_index::<Vote>("byProposalByVotes", IndexScanArgs::from_key(prefix.clone())),
        prefix,
    );
    let votes: Vec<_> = scan.try_collect().await.unwrap();
    let ids: Vec<_> = votes.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a", "c"]);

    let err = store
        .entities_by_index::<Vote>("byVoter", IndexScanArgs::all())
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(matches!(err, IndexerError::UnknownIndex { .. }));
}

pub async fn descending_index_puts_largest_first<S: EntityStore>(store: &S) {
    let updates = [("0x1", 10u32), ("0x2", 1_000), ("0x3", 0)]
        .iter()
        .map(|(id, tokens)| {
            EntityWithMetadata::new(
                *id,
                &Address {
                    tokens_owned: BigUint::from(*tokens),
                },
            )
            .unwrap()
        })
        .collect();
    store.flush_updates(&block(5), &definitions(), updates).await.unwrap();

    let holders: Vec<_> = store
        .entities_by_index::<Address>("byTokensOwned", IndexScanArgs::all())
        .try_collect()
        .await
        .unwrap();
    let ids: Vec<_> = holders.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["0x2", "0x1", "0x3"]);
}

pub async fn overwrite_drops_stale_index_entries<S: EntityStore>(store: &S) {
    let defs = definitions();
    store
        .flush_updates(&block(1), &defs, vec![vote_update("v", &vote("7", "0xa", 5))])
        .await
        .unwrap();
    store
        .flush_updates(&block(2), &defs, vec![vote_update("v", &vote("8", "0xa", 6))])
        .await
        .unwrap();

    let prefix = IndexKey::new().text("7");
    let stale: Vec<_> = chainreplay_core::take_while_prefix(
        store.entities_by_index::<Vote>("byProposalByVotes", IndexScanArgs::from_key(prefix.clone())),
        prefix,
    )
    .try_collect()
    .await
    .unwrap();
    assert!(stale.is_empty());
    assert_eq!(vote_weights(store, IndexScanArgs::all()).await, vec![6]);
    assert_eq!(store.get_latest_block(), Some(block(2)));
}

/// Page through all votes `first` at a time; every vote appears exactly once,
/// in index order.
pub async fn pagination_covers_index_once<S: EntityStore>(store: &S, weights: &[u64], first: usize) {
    let updates: Vec<_> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| vote_update(&format!("v{i:03}"), &vote("7", "0xa", *w)))
        .collect();
    store.flush_updates(&block(1), &definitions(), updates).await.unwrap();

    let mut expected: Vec<(u64, String)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| (*w, format!("v{i:03}")))
        .collect();
    expected.sort();

    let mut seen = Vec::new();
    let mut request = PageRequest::new(first);
    loop {
        let page = drive_reader_by_index::<Vote, _>(store, "byProposalByVotes", request.clone())
            .await
            .unwrap();
        assert!(page.edges.len() <= first);
        for edge in &page.edges {
            let weight: u64 = edge.node.weight.clone().try_into().unwrap();
            let id = chainreplay_core::Cursor::decode(&edge.cursor).unwrap().id;
            seen.push((weight, id));
        }
        match page.page_info.end_cursor {
            Some(end) if page.page_info.has_next_page => request = PageRequest::new(first).after(end),
            _ => break,
        }
    }
    assert_eq!(seen, expected);
}

/// A scan that is already running keeps reading the state it started on,
/// while point reads and flushes proceed.
pub async fn open_scan_keeps_its_snapshot<S: EntityStore>(store: &S) {
    let defs = definitions();
    let first = vec![
        vote_update("a", &vote("7", "0xa", 1)),
        vote_update("b", &vote("7", "0xb", 2)),
    ];
    store.flush_updates(&block(1), &defs, first).await.unwrap();

    let mut scan = store.entities_by_index::<Vote>("byProposalByVotes", IndexScanArgs::all());
    let head = scan.next().await.unwrap().unwrap();
    assert_eq!(head.id, "a");

    let second = vec![
        vote_update("b", &vote("7", "0xb", 0)),
        vote_update("c", &vote("7", "0xc", 3)),
    ];
    store.flush_updates(&block(2), &defs, second).await.unwrap();
    assert_eq!(store.entity::<Vote>("c").await.unwrap(), Some(vote("7", "0xc", 3)));
    assert_eq!(store.get_latest_block(), Some(block(2)));

    let rest: Vec<_> = scan.try_collect().await.unwrap();
    let rest: Vec<_> = rest.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(rest, vec!["b"]);

    assert_eq!(vote_weights(store, IndexScanArgs::all()).await, vec![0, 1, 3]);
}

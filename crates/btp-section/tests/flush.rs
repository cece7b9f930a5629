//! Persistence: idempotent flush, content-addressed keys, message round-trip.

use std::sync::Arc;

use btp_section::{
    register_builtin_modules, sha3_256, BtpSection, DecodedBtpDigest, EthModule, HashesCat,
    IconModule, MemoryStore, Network, NetworkDigest, NetworkType, NetworkTypeModule,
    SectionBuilder, SectionStore,
};

fn module_of(uid: &str) -> Box<dyn NetworkTypeModule> {
    match uid {
        "icon" => Box::new(IconModule),
        "eth" => Box::new(EthModule),
        other => panic!("unexpected uid {}", other),
    }
}

fn sample_section() -> BtpSection {
    register_builtin_modules();
    let mut b = SectionBuilder::new();
    b.ensure_network_type(0, NetworkType::new("icon", b"icon pc".to_vec()));
    b.ensure_network_type(2, NetworkType::new("eth", b"eth pc".to_vec()));
    b.ensure_network(0, 1, Network::new(3)).unwrap();
    b.ensure_network(0, 4, Network::new(0)).unwrap();
    b.ensure_network(2, 9, Network::new(1)).unwrap();
    for m in [&b"alpha"[..], b"beta", b"gamma"] {
        b.send_message(0, 1, m.to_vec()).unwrap();
    }
    b.send_message(2, 9, b"delta".to_vec()).unwrap();
    b.build().unwrap()
}

#[tokio::test]
async fn test_flush_writes_digest_blob() {
    let bs = sample_section();
    let store = MemoryStore::new();
    bs.flush(&store).await.unwrap();

    let blob = store
        .get("BytesByHash", bs.digest().hash())
        .await
        .unwrap()
        .expect("digest blob persisted");
    assert_eq!(blob, bs.digest().bytes());
}

#[tokio::test]
async fn test_every_key_is_hash_of_value() {
    let bs = sample_section();
    let store = MemoryStore::new();
    bs.flush(&store).await.unwrap();

    for (bucket, entries) in store.snapshot() {
        for (key, value) in entries {
            if bucket == "BytesByHash" {
                assert_eq!(key, sha3_256(&value), "bucket {}", bucket);
            } else if let Some(uid) = bucket.strip_prefix("BytesByHash_") {
                assert_eq!(key, module_of(uid).hash(&value), "bucket {}", bucket);
            } else if let Some(uid) = bucket.strip_prefix("ListByMerkleRoot_") {
                let module = module_of(uid);
                let cat = HashesCat::from_bytes(value, module.hash_len()).unwrap();
                assert_eq!(key, module.merkle_root(&cat), "bucket {}", bucket);
            } else {
                panic!("unexpected bucket {}", bucket);
            }
        }
    }
}

#[tokio::test]
async fn test_flush_is_idempotent() {
    let bs = sample_section();
    let store = MemoryStore::new();
    bs.flush(&store).await.unwrap();
    let first = store.snapshot();
    bs.flush(&store).await.unwrap();
    assert_eq!(store.snapshot(), first);
}

#[tokio::test]
async fn test_message_round_trip() {
    let bs = sample_section();
    let store = Arc::new(MemoryStore::new());
    bs.flush(store.as_ref()).await.unwrap();

    let ns = bs
        .network_type_section_for(0)
        .unwrap()
        .network_section_for(1)
        .unwrap();
    let list = ns
        .message_list(store.clone())
        .await
        .unwrap()
        .expect("list flushed");
    assert_eq!(list.len(), 3);
    let expected: [&[u8]; 3] = [b"alpha", b"beta", b"gamma"];
    for (i, want) in expected.iter().enumerate() {
        assert_eq!(list.get(i).await.unwrap(), Some(want.to_vec()), "message {}", i);
        assert_eq!(list.hash(i).unwrap(), IconModule.hash(want));
    }
    assert_eq!(list.get(3).await.unwrap(), None);
}

#[tokio::test]
async fn test_message_list_none_before_flush() {
    let bs = sample_section();
    let store = Arc::new(MemoryStore::new());
    let ns = bs
        .network_type_section_for(0)
        .unwrap()
        .network_section_for(1)
        .unwrap();
    assert!(ns.message_list(store).await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_network_section_round_trip() {
    let bs = sample_section();
    let store = Arc::new(MemoryStore::new());
    bs.flush(store.as_ref()).await.unwrap();

    // network 4 produced no messages; its list exists and is empty
    let ns = bs
        .network_type_section_for(0)
        .unwrap()
        .network_section_for(4)
        .unwrap();
    let list = ns
        .message_list(store)
        .await
        .unwrap()
        .expect("empty list flushed");
    assert!(list.is_empty());
    assert_eq!(list.get(0).await.unwrap(), None);
}

#[tokio::test]
async fn test_section_readable_from_persisted_digest() {
    let bs = sample_section();
    let store = Arc::new(MemoryStore::new());
    bs.flush(store.as_ref()).await.unwrap();

    // a later block loads the digest blob by hash and walks it
    let blob = store
        .get("BytesByHash", bs.digest().hash())
        .await
        .unwrap()
        .unwrap();
    let decoded = DecodedBtpDigest::from_bytes(blob).unwrap();
    assert_eq!(decoded.hash(), bs.digest().hash());

    let live = bs
        .network_type_section_for(2)
        .unwrap()
        .network_section_for(9)
        .unwrap();
    let nd = decoded
        .network_type_digest_for(2)
        .unwrap()
        .network_digest_for(9)
        .unwrap();
    assert_eq!(nd.network_section_hash(), live.hash());
    assert_eq!(nd.messages_root(), live.messages_root());
}

#[tokio::test]
async fn test_decoded_digest_loads_messages() {
    let bs = sample_section();
    let store = Arc::new(MemoryStore::new());
    bs.flush(store.as_ref()).await.unwrap();

    let blob = store
        .get("BytesByHash", bs.digest().hash())
        .await
        .unwrap()
        .unwrap();
    let decoded = DecodedBtpDigest::from_bytes(blob).unwrap();

    // the caller's state view maps type 2 to the eth module
    let nd = decoded
        .network_type_digest_for(2)
        .unwrap()
        .network_digest_for(9)
        .unwrap();
    let list = nd
        .message_list(store.clone(), Arc::new(EthModule))
        .await
        .unwrap()
        .expect("list flushed");
    assert_eq!(list.len(), 1);
    assert_eq!(list.get(0).await.unwrap(), Some(b"delta".to_vec()));
    assert_eq!(list.hash(0).unwrap(), EthModule.hash(b"delta"));

    let mut cat = HashesCat::new();
    cat.append(list.hash(0).unwrap()).unwrap();
    assert_eq!(EthModule.merkle_root(&cat), nd.messages_root());
}

//! End-to-end section building scenarios and cross-build invariants.

use btp_section::{
    register_builtin_modules, sha3_256, BtpSection, EthModule, IconModule, ListEncoder, Network,
    NetworkType, NetworkTypeModule, SectionBuilder,
};

fn build_single(
    uid: &str,
    network_id: i64,
    messages: &[&[u8]],
    network: Network,
) -> BtpSection {
    register_builtin_modules();
    let mut b = SectionBuilder::new();
    b.ensure_network_type(0, NetworkType::new(uid, b"proof context".to_vec()));
    b.ensure_network(0, network_id, network).unwrap();
    for m in messages {
        b.send_message(0, network_id, m.to_vec()).unwrap();
    }
    b.build().unwrap()
}

mod scenarios {
    use super::*;

    #[test]
    fn empty_block() {
        register_builtin_modules();
        let bs = SectionBuilder::new().build().unwrap();
        let digest = bs.digest();

        assert_eq!(digest.bytes(), ListEncoder::new().encode());
        assert_eq!(digest.hash(), sha3_256(&ListEncoder::new().encode()));
        assert!(digest.network_type_digests().is_empty());
        assert!(digest
            .network_section_filter()
            .bytes()
            .iter()
            .all(|&b| b == 0));
    }

    #[test]
    fn single_message() {
        let bs = build_single("icon", 7, &[&[0xaa]], Network::new(1));
        let nts = bs.network_type_section_for(0).unwrap();
        let ns = nts.network_section_for(7).unwrap();

        assert_eq!(ns.update_number(), 0);
        assert_eq!(ns.first_message_sn(), 0);
        assert!(!ns.next_proof_context_changed());
        assert!(ns.prev_hash().is_empty());
        assert_eq!(ns.message_count(), 1);
        // single leaf: the merkle root is the message hash itself
        assert_eq!(ns.messages_root(), IconModule.hash(&[0xaa]));

        let filter = bs.digest().network_section_filter();
        for i in 0..filter.bits() as i64 {
            assert_eq!(filter.test(i), i == 7, "bit {}", i);
        }
    }

    #[test]
    fn proof_context_change_sets_low_bit() {
        let bs = build_single(
            "icon",
            7,
            &[&[0xaa]],
            Network::new(1).with_proof_context_changed(),
        );
        let ns = bs
            .network_type_section_for(0)
            .unwrap()
            .network_section_for(7)
            .unwrap();
        assert_eq!(ns.update_number(), 1);
        assert_eq!(ns.first_message_sn(), 0);
        assert!(ns.next_proof_context_changed());
    }

    #[test]
    fn unsorted_input_normalizes() {
        register_builtin_modules();
        let build = |first: i64, second: i64| {
            let mut b = SectionBuilder::new();
            b.ensure_network_type(0, NetworkType::new("icon", b"pc".to_vec()));
            b.ensure_network(0, first, Network::new(1)).unwrap();
            b.ensure_network(0, second, Network::new(1)).unwrap();
            b.send_message(0, first, b"x".to_vec()).unwrap();
            b.send_message(0, second, b"y".to_vec()).unwrap();
            b.build().unwrap()
        };

        let unsorted = build(9, 3);
        let sorted = build(3, 9);

        let ids: Vec<i64> = unsorted.network_type_sections()[0]
            .network_sections()
            .iter()
            .map(|ns| ns.network_id())
            .collect();
        assert_eq!(ids, vec![3, 9]);
        assert_eq!(
            unsorted.network_type_sections()[0].hash(),
            sorted.network_type_sections()[0].hash()
        );
        assert_eq!(unsorted.digest().hash(), sorted.digest().hash());
    }

    #[test]
    fn two_network_types_use_own_modules() {
        register_builtin_modules();
        let mut b = SectionBuilder::new();
        b.ensure_network_type(0, NetworkType::new("icon", b"icon pc".to_vec()));
        b.ensure_network_type(1, NetworkType::new("eth", b"eth pc".to_vec()));
        b.ensure_network(0, 1, Network::new(1)).unwrap();
        b.ensure_network(1, 2, Network::new(1)).unwrap();
        b.send_message(0, 1, b"to icon".to_vec()).unwrap();
        b.send_message(1, 2, b"to eth".to_vec()).unwrap();
        let bs = b.build().unwrap();

        for (ntid, module) in [
            (0i64, &IconModule as &dyn NetworkTypeModule),
            (1i64, &EthModule as &dyn NetworkTypeModule),
        ] {
            let nts = bs.network_type_section_for(ntid).unwrap();
            let mut e = ListEncoder::new();
            e.write_bytes(nts.next_proof_context().hash())
                .write_bytes(nts.network_sections_root());
            assert_eq!(nts.hash(), module.hash(&e.encode()), "type {}", ntid);
        }

        // the outer digest hash stays SHA3-256 regardless of module mix
        assert_eq!(bs.digest().hash(), sha3_256(bs.digest().bytes()));
    }

    #[test]
    fn decision_tuple() {
        let bs = build_single("eth", 1, &[b"m"], Network::new(1));
        let nts = bs.network_type_section_for(0).unwrap();
        let decision = nts.new_decision(100, 2);

        let mut e = ListEncoder::new();
        e.write_bytes(b"icon")
            .write_int(0)
            .write_int(100)
            .write_int(2)
            .write_bytes(nts.hash());
        assert_eq!(decision.bytes(), e.encode());
        // hashed with the destination type's module
        assert_eq!(decision.hash(), EthModule.hash(decision.bytes()));
        assert_eq!(decision.height(), 100);
        assert_eq!(decision.round(), 2);
        assert_eq!(decision.src_network_id(), b"icon");
    }
}

mod invariants {
    use super::*;

    #[test]
    fn first_message_sn_derivation() {
        for (sn, count, changed) in [(5i64, 3usize, false), (3, 3, true), (100, 0, false)] {
            let messages: Vec<Vec<u8>> = (0..count).map(|i| vec![i as u8]).collect();
            let refs: Vec<&[u8]> = messages.iter().map(|m| m.as_slice()).collect();
            let mut network = Network::new(sn);
            if changed {
                network = network.with_proof_context_changed();
            }
            let bs = build_single("icon", 1, &refs, network);
            let ns = bs
                .network_type_section_for(0)
                .unwrap()
                .network_section_for(1)
                .unwrap();

            assert_eq!(ns.first_message_sn(), sn - count as i64);
            assert_eq!(ns.update_number() >> 1, ns.first_message_sn());
            assert_eq!(ns.next_proof_context_changed(), changed);
            assert_eq!(ns.message_count(), count as i64);
        }
    }

    #[test]
    fn build_is_deterministic_across_insertion_orders() {
        register_builtin_modules();
        let build = |type_order: &[i64]| {
            let mut b = SectionBuilder::new();
            for &ntid in type_order {
                let uid = if ntid == 0 { "icon" } else { "eth" };
                b.ensure_network_type(ntid, NetworkType::new(uid, b"pc".to_vec()));
            }
            for &ntid in type_order {
                for nid in [4, 2] {
                    let nid = nid + ntid * 10;
                    b.ensure_network(ntid, nid, Network::new(2)).unwrap();
                    b.send_message(ntid, nid, format!("m{}", nid).into_bytes())
                        .unwrap();
                    b.send_message(ntid, nid, format!("n{}", nid).into_bytes())
                        .unwrap();
                }
            }
            b.build().unwrap()
        };

        let a = build(&[1, 0]);
        let b = build(&[0, 1]);
        assert_eq!(a.digest().bytes(), b.digest().bytes());
        assert_eq!(a.digest().hash(), b.digest().hash());
    }

    #[test]
    fn filter_tracks_every_network_section() {
        register_builtin_modules();
        let mut b = SectionBuilder::new();
        b.ensure_network_type(0, NetworkType::new("icon", b"pc".to_vec()));
        b.ensure_network_type(1, NetworkType::new("eth", b"pc".to_vec()));
        let ids = [0i64, 7, 63, 255];
        b.ensure_network(0, ids[0], Network::new(0)).unwrap();
        b.ensure_network(0, ids[1], Network::new(0)).unwrap();
        b.ensure_network(1, ids[2], Network::new(0)).unwrap();
        b.ensure_network(1, ids[3], Network::new(0)).unwrap();
        let bs = b.build().unwrap();

        let filter = bs.digest().network_section_filter();
        for i in 0..filter.bits() as i64 {
            assert_eq!(filter.test(i), ids.contains(&i), "bit {}", i);
        }
    }

    #[test]
    fn digest_products_are_memoized() {
        let bs = build_single("icon", 3, &[b"m1", b"m2"], Network::new(2));
        let digest = bs.digest();

        assert_eq!(digest.bytes().as_ptr(), digest.bytes().as_ptr());
        assert_eq!(digest.hash().as_ptr(), digest.hash().as_ptr());
        assert_eq!(digest.bytes(), digest.bytes().to_vec());
        assert_eq!(digest.hash(), digest.hash().to_vec());
        assert_eq!(
            digest.network_section_filter().bytes(),
            digest.network_section_filter().bytes().to_vec()
        );

        let a: Vec<i64> = digest
            .network_type_digests()
            .iter()
            .map(|d| d.network_type_id())
            .collect();
        let b: Vec<i64> = digest
            .network_type_digests()
            .iter()
            .map(|d| d.network_type_id())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_digest_reads_agree() {
        use std::sync::Arc;
        use std::thread;

        let bs = Arc::new(build_single("icon", 3, &[b"m1", b"m2"], Network::new(2)));
        let results: Vec<_> = (0..8)
            .map(|_| {
                let bs = bs.clone();
                thread::spawn(move || {
                    (
                        bs.digest().bytes().to_vec(),
                        bs.digest().hash().to_vec(),
                        bs.digest().network_section_filter().bytes().to_vec(),
                    )
                })
            })
            .map(|h| h.join().unwrap())
            .collect();

        for r in &results[1..] {
            assert_eq!(r, &results[0]);
        }
    }
}

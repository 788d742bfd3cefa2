use chrono::DateTime;
use cloudkey_cloud::{deserialize_entries, serialize_entries, CloudEntry, EntryMeta};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_entry() -> impl Strategy<Value = CloudEntry> {
    (
        "[a-zA-Z0-9._-]{1,24}",
        proptest::collection::vec(any::<u8>(), 0..128),
        0i64..4_102_444_800_000,
        0i64..4_102_444_800_000,
        proptest::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..4),
    )
        .prop_map(|(name, data, created, modified, meta)| CloudEntry {
            name,
            data,
            creation_date: DateTime::from_timestamp_millis(created).unwrap_or_default(),
            modification_date: DateTime::from_timestamp_millis(modified).unwrap_or_default(),
            meta,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn entry_sets_survive_serialization(entries in proptest::collection::vec(arb_entry(), 0..8)) {
        let unique: BTreeMap<String, CloudEntry> = entries
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        let bytes = serialize_entries(unique.values()).unwrap();
        let mut parsed = deserialize_entries(&bytes).unwrap();
        parsed.sort_by(|a, b| a.name.cmp(&b.name));

        let expected: Vec<CloudEntry> = unique.into_values().collect();
        prop_assert_eq!(parsed, expected);
    }
}

#[test]
fn wire_format_uses_names_as_keys() {
    let entry = CloudEntry {
        name: "device-key".into(),
        data: b"\x01\x02".to_vec(),
        creation_date: DateTime::from_timestamp_millis(1_000).unwrap(),
        modification_date: DateTime::from_timestamp_millis(2_000).unwrap(),
        meta: EntryMeta::new(),
    };

    let bytes = serialize_entries([&entry]).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["device-key"]["data"], "AQI=");
    assert_eq!(json["device-key"]["creation_date"], 1_000);
    assert_eq!(json["device-key"]["modification_date"], 2_000);
    assert_eq!(json["device-key"]["meta"], serde_json::json!({}));
}

/*!
 * Launcher-File Codec Tests
 * Round-trip law and malformed-artifact handling
 */

use desk_kernel::catalog::{MetaInfo, Resource, ResourceContent};
use desk_kernel::codec::{decode, decode_header, encode, DecodeError, PayloadLocation};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn content_strategy() -> impl Strategy<Value = ResourceContent> {
    prop_oneof![
        "\\PC{0,64}".prop_map(ResourceContent::Single),
        prop::collection::btree_map("[a-z]{1,8}", "\\PC{0,32}", 1..4)
            .prop_map(ResourceContent::Bundle),
    ]
}

fn resource_strategy() -> impl Strategy<Value = Resource> {
    (
        "[a-z0-9-]{1,16}",
        "[A-Za-z][A-Za-z0-9 ]{0,15}",
        content_strategy(),
        prop::option::of("\\PC{0,48}"),
    )
        .prop_map(|(id, name, content, logic)| Resource {
            id: format!("app-{}", id),
            name,
            is_bundle: content.is_bundle(),
            content,
            logic,
            meta_info: MetaInfo::default(),
        })
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(resource in resource_strategy()) {
        let decoded = decode(&encode(&resource)).unwrap();
        prop_assert_eq!(&decoded.header.resource_id, &resource.id);
        prop_assert_eq!(decoded.header.name.as_deref(), Some(resource.name.as_str()));
        prop_assert_eq!(decoded.header.is_bundle, resource.is_bundle);
        prop_assert_eq!(decoded.location, PayloadLocation::Exact);
        prop_assert_eq!(decoded.content.as_ref(), Some(&resource.content));

        let expected_logic = resource
            .logic
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        prop_assert_eq!(decoded.logic, expected_logic);
    }
}

#[test]
fn test_payload_containing_anchor_text() {
    let tricky = ";//resourceId:app-1; and more";
    let resource = Resource {
        id: "app-1".into(),
        name: "Tricky".into(),
        is_bundle: true,
        content: ResourceContent::Bundle(BTreeMap::from([
            ("layout".to_string(), tricky.to_string()),
            ("home".to_string(), "/* app logic */".to_string()),
        ])),
        logic: Some("let initialState = {};".into()),
        meta_info: MetaInfo::default(),
    };
    let decoded = decode(&encode(&resource)).unwrap();
    assert_eq!(decoded.content, Some(resource.content.clone()));
    assert_eq!(decoded.logic.as_deref(), Some("let initialState = {};"));
    assert_eq!(decoded.into_resource().unwrap().name, "Tricky");
}

#[test]
fn test_meta_info_survives() {
    let mut meta_info = MetaInfo::default();
    meta_info.author_name = Some("Ada".into());
    meta_info.custom.insert("hasShortcut".into(), serde_json::json!(true));
    let resource = Resource {
        id: "app-2".into(),
        name: "Meta".into(),
        is_bundle: false,
        content: ResourceContent::Single("x".into()),
        logic: None,
        meta_info: meta_info.clone(),
    };
    assert_eq!(decode(&encode(&resource)).unwrap().meta_info, Some(meta_info));
}

#[test]
fn test_missing_header_is_decode_error() {
    assert!(matches!(
        decode_header("const ORIGIN_COMPONENT = {};"),
        Err(DecodeError::MissingHeader(_))
    ));
    assert!(decode("").is_err());
    assert!(decode_header("const SYS_CONFIG = {\"resourceId\":\"\"};").is_err());
}

#[test]
fn test_oversized_payload_length_falls_back_to_anchor() {
    let text = concat!(
        "const SYS_CONFIG = {\"resourceId\":\"app-1\",\"name\":\"N\",\"isBundle\":false,\"payloadBytes\":18446744073709551615};\n",
        "const ORIGIN_COMPONENT = \"still here\";//resourceId:app-1;\n",
    );
    let decoded = decode(text).unwrap();
    assert_eq!(decoded.location, PayloadLocation::Anchored);
    assert_eq!(
        decoded.content,
        Some(ResourceContent::Single("still here".into()))
    );
}

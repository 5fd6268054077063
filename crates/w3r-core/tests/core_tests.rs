use w3r_core::{AttributeNode, Error, Guid, ReadLevel, Scalar, WriteOpts};

fn tag(v: &str) -> AttributeNode {
    AttributeNode::leaf("MapPinTag", "CName", Scalar::Str(v.to_string()))
}

fn entry(guid: Guid, status: &str) -> AttributeNode {
    AttributeNode::group(
        "JEntryStatus",
        vec![
            AttributeNode::leaf("primaryGUID", "CGUID", Scalar::Guid(guid)),
            AttributeNode::leaf("status", "EJournalStatus", Scalar::Str(status.to_string())),
        ],
    )
}

fn guid(n: u8) -> Guid {
    Guid::from_bytes([n; 16])
}

// Small but realistic tree: unrelated blocks around the two we read.
fn sample_tree() -> AttributeNode {
    AttributeNode::group(
        "",
        vec![
            AttributeNode::group(
                "CGameWorld",
                vec![
                    AttributeNode::leaf("worldId", "Int32", Scalar::Int(-7)),
                    AttributeNode::leaf("paused", "Bool", Scalar::Bool(false)),
                ],
            ),
            AttributeNode::group(
                "CCommonMapManager",
                vec![
                    tag("TagA"),
                    AttributeNode::leaf("Other", "Uint32", Scalar::UInt(1)),
                    tag("TagB"),
                    tag("TagA"),
                    AttributeNode::group("MapPinTag_Extra", vec![]),
                ],
            ),
            AttributeNode::group(
                "CJournalManager",
                vec![
                    AttributeNode::leaf("version", "Uint16", Scalar::UInt(3)),
                    AttributeNode::group(
                        "JStatuses",
                        vec![entry(guid(1), "JS_Active"), entry(guid(2), "JS_Success")],
                    ),
                ],
            ),
            AttributeNode::leaf("playTime", "Double", Scalar::Float(1234.5)),
        ],
    )
}

#[test]
fn write_then_read_preserves_tree() {
    let root = sample_tree();
    let bytes = w3r_core::write_save(&root, WriteOpts::default()).expect("write");
    let save = w3r_core::read_save(&bytes, ReadLevel::Full).expect("read");
    assert_eq!(save.root, root);
    assert_eq!(save.header.type_codes, [0, 0, 0]);
}

#[test]
fn small_chunks_decode_the_same() {
    let root = sample_tree();
    let opts = WriteOpts {
        type_codes: [1, 2, 3],
        chunk_size: 17,
    };
    let bytes = w3r_core::write_save(&root, opts).expect("write");
    let save = w3r_core::read_save(&bytes, ReadLevel::Quick).expect("read");
    assert_eq!(save.root, root);
    assert_eq!(save.header.type_codes, [1, 2, 3]);
}

#[test]
fn read_save_file_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("QuickSave.sav");
    w3r_core::write_save_file(&p, &sample_tree(), WriteOpts::default()).expect("write");

    let save = w3r_core::read_save_file(&p, ReadLevel::Quick).expect("read");
    let report = save.report().expect("report");
    assert_eq!(report.map_pin_tags, vec!["TagA", "TagB", "TagA"]);
    assert_eq!(report.quests.len(), 2);
    assert_eq!(report.quests[0].primary_guid, guid(1).to_string());
    assert_eq!(report.quests[0].status, w3r_core::QuestStatus::Active);
    assert_eq!(report.quests[1].status, w3r_core::QuestStatus::Succeeded);
}

#[test]
fn opaque_values_depend_on_read_level() {
    let root = AttributeNode::group(
        "",
        vec![AttributeNode::leaf(
            "inventory",
            "array:2,0,SItemUniqueId",
            Scalar::Bytes(vec![1, 2, 3, 4]),
        )],
    );
    let bytes = w3r_core::write_save(&root, WriteOpts::default()).unwrap();

    let full = w3r_core::read_save(&bytes, ReadLevel::Full).unwrap();
    assert_eq!(
        full.root.children()[0].value(),
        Some(&Scalar::Bytes(vec![1, 2, 3, 4]))
    );

    let quick = w3r_core::read_save(&bytes, ReadLevel::Quick).unwrap();
    let inv = &quick.root.children()[0];
    assert_eq!(inv.type_name(), Some("array:2,0,SItemUniqueId"));
    assert_eq!(inv.value(), None);
}

#[test]
fn save_without_journal_decodes_but_cannot_report() {
    let root = AttributeNode::group(
        "",
        vec![AttributeNode::group("CCommonMapManager", vec![tag("OnlyTag")])],
    );
    let bytes = w3r_core::write_save(&root, WriteOpts::default()).unwrap();
    let save = w3r_core::read_save(&bytes, ReadLevel::Quick).unwrap();
    assert!(save.quests().unwrap().is_none());
    assert!(matches!(save.report(), Err(Error::StructureMismatch(_))));
}

#[test]
fn malformed_journal_decodes_but_fails_report() {
    let root = AttributeNode::group(
        "",
        vec![
            AttributeNode::group("CCommonMapManager", vec![tag("TagA")]),
            AttributeNode::group(
                "CJournalManager",
                vec![AttributeNode::group(
                    "JStatuses",
                    vec![entry(guid(9), "JS_Unknown")],
                )],
            ),
        ],
    );
    let bytes = w3r_core::write_save(&root, WriteOpts::default()).unwrap();
    let save = w3r_core::read_save(&bytes, ReadLevel::Quick).expect("tree decodes");
    assert_eq!(save.root, root);
    assert!(matches!(save.quests(), Err(Error::StructureMismatch(_))));
    let err = save.report().unwrap_err();
    assert!(matches!(err, Error::StructureMismatch(_)), "{err}");
}

#[test]
fn wrong_container_magic_is_decode_failure() {
    let mut bytes = w3r_core::write_save(&sample_tree(), WriteOpts::default()).unwrap();
    bytes[0] = b'X';
    let err = w3r_core::read_save(&bytes, ReadLevel::Quick).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
}

#[test]
fn truncated_save_is_decode_failure() {
    let bytes = w3r_core::write_save(&sample_tree(), WriteOpts::default()).unwrap();
    for len in [0, 4, 12, bytes.len() / 2, bytes.len() - 1] {
        let err = w3r_core::read_save(&bytes[..len], ReadLevel::Quick).unwrap_err();
        assert!(matches!(err, Error::Decode(_)), "len {len}: {err}");
    }
}

#[test]
fn corrupt_inner_image_is_decode_failure() {
    // poke bytes in the decompressed image
    let root = sample_tree();
    let good = w3r_core::write_save(&root, WriteOpts::default()).unwrap();
    let (image, header_size) = w3r_core::binfmt::decompress_container(&good).unwrap();

    let mut bad_magic = image.clone();
    bad_magic[header_size] = b'X';
    let err =
        w3r_core::binfmt::parse_image(&bad_magic, header_size, ReadLevel::Quick).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");

    let mut bad_footer = image.clone();
    let last = bad_footer.len() - 1;
    bad_footer[last] = b'X';
    let err =
        w3r_core::binfmt::parse_image(&bad_footer, header_size, ReadLevel::Quick).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
}

fn read_i32_at(image: &[u8], at: usize) -> usize {
    i32::from_le_bytes(image[at..at + 4].try_into().unwrap()) as usize
}

fn write_i32_at(image: &mut [u8], at: usize, v: usize) {
    image[at..at + 4].copy_from_slice(&(v as i32).to_le_bytes());
}

fn var_table_offset(image: &[u8]) -> usize {
    read_i32_at(image, image.len() - 6)
}

#[test]
fn full_read_rejects_rb_entry_without_variable() {
    let good = w3r_core::write_save(&sample_tree(), WriteOpts::default()).unwrap();
    let (mut image, header_size) = w3r_core::binfmt::decompress_container(&good).unwrap();

    // string footer: NM offset, RB offset
    let rb_offset = read_i32_at(&image, var_table_offset(&image) - 10 + 4);
    // "RB", count, then { size i16, offset i32 }
    let first_entry = rb_offset + 2 + 4 + 2;
    write_i32_at(&mut image, first_entry, header_size + 1);

    let err = w3r_core::binfmt::parse_image(&image, header_size, ReadLevel::Full).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
    let (_, root) = w3r_core::binfmt::parse_image(&image, header_size, ReadLevel::Quick).unwrap();
    assert_eq!(root, sample_tree());
}

#[test]
fn nested_block_past_parent_end_is_decode_failure() {
    let root = AttributeNode::group(
        "",
        vec![
            AttributeNode::group(
                "Outer",
                vec![AttributeNode::group(
                    "Inner",
                    vec![AttributeNode::leaf("x", "Int32", Scalar::Int(1))],
                )],
            ),
            AttributeNode::leaf("After", "Int32", Scalar::Int(2)),
        ],
    );
    let good = w3r_core::write_save(&root, WriteOpts::default()).unwrap();
    let (mut image, header_size) = w3r_core::binfmt::decompress_container(&good).unwrap();
    assert!(w3r_core::binfmt::parse_image(&image, header_size, ReadLevel::Quick).is_ok());

    // table entries are written children first: x, Inner, Outer, After
    let entries = var_table_offset(&image) + 4;
    let inner_size_at = entries + 8 + 4;
    let outer_size = read_i32_at(&image, entries + 2 * 8 + 4);
    write_i32_at(&mut image, inner_size_at, outer_size + 16);

    let err = w3r_core::binfmt::parse_image(&image, header_size, ReadLevel::Quick).unwrap_err();
    assert!(matches!(err, Error::Decode(_)), "{err}");
}

#[test]
fn top_level_block_over_32k_round_trips() {
    let root = AttributeNode::group(
        "",
        vec![
            AttributeNode::group(
                "CBigBlock",
                vec![AttributeNode::leaf(
                    "blob",
                    "String",
                    Scalar::Str("x".repeat(40_000)),
                )],
            ),
            AttributeNode::leaf("tail", "Int32", Scalar::Int(5)),
        ],
    );
    let bytes = w3r_core::write_save(&root, WriteOpts::default()).unwrap();
    let save = w3r_core::read_save(&bytes, ReadLevel::Full).unwrap();
    assert_eq!(save.root, root);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = w3r_core::read_save_file(&dir.path().join("nope.sav"), ReadLevel::Quick)
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn guid_display_and_parse() {
    let g = Guid::from_bytes([
        0x78, 0x56, 0x34, 0x12, 0x34, 0x12, 0x78, 0x56, 0x9a, 0xbc, 0xde, 0xf0, 0x01, 0x02, 0x03,
        0x04,
    ]);
    let s = g.to_string();
    assert_eq!(s, "12345678-1234-5678-9abc-def001020304");
    assert_eq!(s.parse::<Guid>().unwrap(), g);
    assert_eq!(
        "12345678-1234-5678-9ABC-DEF001020304".parse::<Guid>().unwrap(),
        g
    );
    assert!("not-a-guid".parse::<Guid>().is_err());
}

#[test]
fn dump_tree_json() {
    let root = sample_tree();
    let v = w3r_core::json::tree_to_json_value(&root, w3r_core::json::JsonOpts::default());
    let map = &v["$children"][1];
    assert_eq!(map["$name"], "CCommonMapManager");
    assert_eq!(map["$children"][0]["value"], "TagA");
    assert_eq!(map["$children"][1]["$type"], "Uint32");

    let opts = w3r_core::json::JsonOpts {
        max_children: 1,
        ..Default::default()
    };
    let v = w3r_core::json::tree_to_json_value(&root, opts);
    assert_eq!(v["$children"][1]["$truncated"], true);
    assert_eq!(v["$children"][1]["$omitted"], 3);
}

#[test]
fn find_and_latest_save_files() {
    use std::fs;
    use std::time::{Duration, SystemTime};

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.txt"), "x").unwrap();
    fs::create_dir(dir.path().join("nested.sav")).unwrap();
    let old = dir.path().join("AutoSave_0001.sav");
    let new = dir.path().join("ManualSave_0002.sav");
    fs::write(&old, b"a").unwrap();
    fs::write(&new, b"b").unwrap();
    let past = SystemTime::now() - Duration::from_secs(3600);
    fs::File::options()
        .write(true)
        .open(&old)
        .unwrap()
        .set_modified(past)
        .unwrap();

    let found = w3r_core::saves::find_save_files(dir.path()).unwrap();
    let names: Vec<_> = found
        .iter()
        .map(|s| s.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["AutoSave_0001.sav", "ManualSave_0002.sav"]);

    let latest = w3r_core::saves::latest_save(dir.path()).unwrap().unwrap();
    assert_eq!(latest.path, new);
}

use super::*;

use tempfile::tempdir;

use crate::logical::Logical;

fn specs() -> &'static str {
    "name C(25); age N(3,0); wisdom M"
}

fn sample(table: &Table, name: &str, age: i64) -> Record {
    table
        .append_with(&[("name", Value::from(name)), ("age", Value::from(age))], false)
        .unwrap()
}

#[test]
fn create_writes_the_documented_layout() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();

    assert_eq!(table.version(), 0x83);
    assert_eq!(table.record_length(), 1 + 25 + 3 + 10);
    assert_eq!(table.field_names(), vec!["name", "age", "wisdom"]);
    assert_eq!(table.codepage().name, "cp1252");

    let start = 32 + 3 * 32 + 1;
    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk.len(), start + 1); // empty table keeps its 0x1A tail
    assert_eq!(on_disk[0], 0x83);
    assert_eq!(on_disk[start], 0x1a);
    assert_eq!(&on_disk[8..10], &(start as u16).to_le_bytes());
    assert_eq!(&on_disk[10..12], &39u16.to_le_bytes());
    assert_eq!(on_disk[32 + 3 * 32], 0x0d);
    // memo side-file exists with its header block
    assert!(table.memo_path().unwrap().exists());
}

#[test]
fn file_size_tracks_record_count() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("size.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    let start = 32 + 3 * 32 + 1;
    for count in 1..=3u64 {
        sample(&table, "someone", 20 + count as i64);
        let size = fs::metadata(&path).unwrap().len();
        assert_eq!(size, start as u64 + count * 39 + 1);
    }
}

#[test]
fn round_trip_through_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trip.dbf");
    {
        let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
        table
            .append_with(
                &[
                    ("name", Value::from("Ethan")),
                    ("age", Value::from(29)),
                    ("wisdom", Value::from("timeless")),
                ],
                false,
            )
            .unwrap();
        table.close(false, false).unwrap();
    }
    let table = Table::open(&path, Dialect::Db3).unwrap();
    assert_eq!(table.len(), 1);
    let record = table.record(0).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Ethan"));
    assert_eq!(record.get("age").unwrap(), Value::from(29));
    assert_eq!(record.get("wisdom").unwrap(), Value::from("timeless"));
}

#[test]
fn open_rejects_foreign_version_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vfp.dbf");
    Table::create(&path, "name C(10)", Dialect::Vfp).unwrap();
    let err = Table::open(&path, Dialect::Db3).unwrap_err();
    assert!(err.to_string().contains("0x30"));
}

#[test]
fn open_detect_picks_a_dialect() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("detect.dbf");
    Table::create(&path, "name C(10)", Dialect::Vfp).unwrap();
    let table = Table::open_detect(&path).unwrap();
    assert_eq!(table.dialect(), Dialect::Vfp);
}

#[test]
fn append_rolls_back_completely_on_failure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rollback.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    sample(&table, "Ethan", 29);
    let size_before = fs::metadata(&path).unwrap().len();

    let err = table
        .append_with(&[("name", Value::from("x")), ("age", Value::from(5_000))], false)
        .unwrap_err();
    assert!(matches!(err, DbfError::DataOverflow { .. }));
    assert_eq!(table.len(), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), size_before);
    // unknown fields roll back the same way
    assert!(table.append_with(&[("salary", Value::from(1))], false).is_err());
    assert_eq!(table.len(), 1);
}

#[test]
fn append_multiple_shares_memo_blocks() {
    let dir = tempdir().unwrap();
    let table =
        Table::create(dir.path().join("multi.dbf"), specs(), Dialect::Db3).unwrap();
    let newest = table
        .append_multiple(&[("wisdom", Value::from("shared words"))], false, 3)
        .unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(newest.record_number(), 2);
    // one memo allocation serves every copy
    assert_eq!(table.memo_next_free().unwrap(), 2);
    for record in table.iter() {
        assert_eq!(record.unwrap().get("wisdom").unwrap(), Value::from("shared words"));
    }
    assert_eq!(table.current_index(), 2);
}

#[test]
fn cursor_walks_and_signals_the_ends() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1);
    sample(&table, "b", 2);
    sample(&table, "c", 3);

    table.top();
    assert_eq!(table.current_index(), -1);
    assert!(matches!(table.current().unwrap_err(), DbfError::Bof));
    assert_eq!(table.next().unwrap().get("age").unwrap(), Value::from(1));
    assert_eq!(table.next().unwrap().get("age").unwrap(), Value::from(2));
    assert_eq!(table.next().unwrap().get("age").unwrap(), Value::from(3));
    assert!(matches!(table.next().unwrap_err(), DbfError::Eof));
    assert!(matches!(table.current().unwrap_err(), DbfError::Eof));
    assert_eq!(table.prev().unwrap().get("age").unwrap(), Value::from(3));

    assert_eq!(table.first().unwrap().get("age").unwrap(), Value::from(1));
    assert_eq!(table.last().unwrap().get("age").unwrap(), Value::from(3));
    assert_eq!(table.goto(-2).unwrap().get("age").unwrap(), Value::from(2));
    assert!(table.goto(3).is_err());
}

#[test]
fn cursor_honors_use_deleted() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1);
    sample(&table, "b", 2);
    sample(&table, "c", 3);
    table.record(1).unwrap().delete().unwrap();

    table.set_use_deleted(false);
    table.top();
    assert_eq!(table.next().unwrap().get("age").unwrap(), Value::from(1));
    assert_eq!(table.next().unwrap().get("age").unwrap(), Value::from(3));
    assert!(table.next().is_err());

    let survivors: Vec<_> = table.iter().collect::<Result<_>>().unwrap();
    assert_eq!(survivors.len(), 2);

    table.set_use_deleted(true);
    assert_eq!(table.iter().count(), 3);
}

#[test]
fn first_on_all_deleted_is_bof() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1).delete().unwrap();
    table.set_use_deleted(false);
    assert!(matches!(table.first().unwrap_err(), DbfError::Bof));
    assert!(matches!(table.last().unwrap_err(), DbfError::Eof));
}

#[test]
fn locate_advances_and_restores() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "Ethan", 29);
    sample(&table, "Allison", 20);
    sample(&table, "Ethan", 40);

    table.top();
    let found = table
        .locate(&[Criterion { value: Value::from("Allison"), field: "name", transform: None }])
        .unwrap();
    assert_eq!(found.record_number(), 1);
    assert_eq!(table.current_index(), 1);

    // transforms apply before comparison
    let upper = |v: Value| match v {
        Value::Character(s) => Value::Character(s.to_ascii_uppercase()),
        other => other,
    };
    table.top();
    table.set_current(0);
    let found = table
        .locate(&[Criterion { value: Value::from("ETHAN"), field: "name", transform: Some(&upper) }])
        .unwrap();
    assert_eq!(found.record_number(), 0);

    table.goto(2).unwrap();
    assert!(table
        .locate(&[Criterion { value: Value::from("Allison"), field: "name", transform: None }])
        .is_err());
    // cursor restored on a miss
    assert_eq!(table.current_index(), 2);
}

#[test]
fn delete_then_pack_compacts_the_table() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pack.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1);
    sample(&table, "b", 2);
    sample(&table, "c", 3);

    let doomed = table.record(1).unwrap();
    doomed.delete().unwrap();
    doomed.write().unwrap();
    assert_eq!(table.len(), 3);
    table.set_use_deleted(false);
    assert_eq!(table.iter().count(), 2);

    table.pack().unwrap();
    assert_eq!(table.len(), 2);
    let start = 32 + 3 * 32 + 1;
    assert_eq!(fs::metadata(&path).unwrap().len(), start as u64 + 2 * 39 + 1);
    // the former record 2 is now record 1
    let record = table.record(1).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("c"));
    assert_eq!(record.record_number(), 1);
    for (recno, record) in table.iter().enumerate() {
        let record = record.unwrap();
        assert!(!record.is_deleted());
        assert_eq!(record.record_number(), recno as i64);
    }
}

#[test]
fn zap_requires_confirmation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("zap.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1);
    assert!(table.zap(false).is_err());
    assert_eq!(table.len(), 1);
    table.zap(true).unwrap();
    assert_eq!(table.len(), 0);
    let start = 32 + 3 * 32 + 1;
    assert_eq!(fs::metadata(&path).unwrap().len(), start as u64 + 1);
}

#[test]
fn close_modes_gate_access() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("modes.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    sample(&table, "Ethan", 29);

    table.close(true, false).unwrap();
    assert_eq!(table.mode(), Mode::ReadOnly);
    let record = table.record(0).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Ethan"));
    assert!(record.set("name", Value::from("nope")).is_err());
    assert!(table.append().is_err());
    assert!(table.pack().is_err());

    table.close(false, false).unwrap();
    assert_eq!(table.mode(), Mode::MetaOnly);
    assert_eq!(table.field_names(), vec!["name", "age", "wisdom"]);

    table.reopen().unwrap();
    assert_eq!(table.mode(), Mode::ReadWrite);
    sample(&table, "Allison", 20);
    assert_eq!(table.len(), 2);
}

#[test]
fn meta_only_drops_record_access() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meta.dbf");
    {
        let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
        sample(&table, "Ethan", 29);
    }
    let table = Table::open_with(
        &path,
        Dialect::Db3,
        &OpenOptions { meta_only: true, ..OpenOptions::default() },
    )
    .unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.record(0).is_err());
}

#[test]
fn read_only_keeps_memos_on_request() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("keepmemo.dbf");
    {
        let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
        table
            .append_with(&[("wisdom", Value::from("remembered"))], false)
            .unwrap();
    }
    let table = Table::open_with(
        &path,
        Dialect::Db3,
        &OpenOptions { read_only: true, keep_memos: true, ..OpenOptions::default() },
    )
    .unwrap();
    assert_eq!(table.mode(), Mode::ReadOnly);
    assert_eq!(table.record(0).unwrap().get("wisdom").unwrap(), Value::from("remembered"));

    // without keep_memos the payload is gone but reads stay clean
    let table = Table::open_with(
        &path,
        Dialect::Db3,
        &OpenOptions { read_only: true, ..OpenOptions::default() },
    )
    .unwrap();
    assert_eq!(table.record(0).unwrap().get("wisdom").unwrap(), Value::from(""));
}

#[test]
fn ignore_memos_reads_empty_and_writes_block_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ignore.dbf");
    {
        let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
        table.append_with(&[("wisdom", Value::from("hidden"))], false).unwrap();
    }
    let table = Table::open_with(
        &path,
        Dialect::Db3,
        &OpenOptions { ignore_memos: true, ..OpenOptions::default() },
    )
    .unwrap();
    let record = table.record(0).unwrap();
    assert_eq!(record.get("wisdom").unwrap(), Value::from(""));
    record.set("wisdom", Value::from("discarded")).unwrap();
    assert_eq!(record.get("wisdom").unwrap(), Value::from(""));
}

#[test]
fn add_fields_grows_every_record() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("grow.dbf");
    let table = Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    table.append_with(&[("name", Value::from("Ethan"))], false).unwrap();

    table.add_fields("age N(3,0); active L").unwrap();
    assert_eq!(table.field_names(), vec!["name", "age", "active"]);
    assert_eq!(table.record_length(), 1 + 10 + 3 + 1);
    let record = table.record(0).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Ethan"));
    assert_eq!(record.get("age").unwrap(), Value::from(0));
    assert_eq!(record.get("active").unwrap(), Value::Logical(Logical::False));

    // survives a reopen
    table.close(false, false).unwrap();
    table.reopen().unwrap();
    assert_eq!(table.record(0).unwrap().get("name").unwrap(), Value::from("Ethan"));
    assert_eq!(table.record_length(), 15);
}

#[test]
fn add_memo_field_instantiates_the_store() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("latememo.dbf");
    let table = Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    assert_eq!(table.version(), 0x03);
    assert!(!table.memo_path().unwrap().exists());

    table.add_fields("wisdom M").unwrap();
    assert_eq!(table.version(), 0x83);
    assert!(table.memo_path().unwrap().exists());
    let record = table.append().unwrap();
    record.set("wisdom", Value::from("fresh store")).unwrap();
    assert_eq!(record.get("wisdom").unwrap(), Value::from("fresh store"));
}

#[test]
fn delete_fields_splices_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shrink.dbf");
    let table = Table::create(&path, "name C(10); age N(3,0); city C(8)", Dialect::Db3).unwrap();
    table
        .append_with(
            &[
                ("name", Value::from("Ethan")),
                ("age", Value::from(29)),
                ("city", Value::from("Portland")),
            ],
            false,
        )
        .unwrap();

    table.delete_fields("age").unwrap();
    assert_eq!(table.field_names(), vec!["name", "city"]);
    assert_eq!(table.record_length(), 1 + 10 + 8);
    let record = table.record(0).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Ethan"));
    assert_eq!(record.get("city").unwrap(), Value::from("Portland"));
    assert!(record.get("age").is_err());

    assert!(table.delete_fields("ghost").is_err());
}

#[test]
fn resize_field_preserves_leading_bytes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("resize.dbf");
    let table = Table::create(&path, "name C(8); age N(3,0)", Dialect::Db3).unwrap();
    table
        .append_with(&[("name", Value::from("Evelynne")), ("age", Value::from(30))], false)
        .unwrap();

    table.resize_field("name", 4).unwrap();
    assert_eq!(table.record_length(), 1 + 4 + 3);
    let record = table.record(0).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Evel"));
    assert_eq!(record.get("age").unwrap(), Value::from(30));

    table.resize_field("name", 10).unwrap();
    assert_eq!(record.get("name").unwrap(), Value::from("Evel"));
    assert_eq!(record.get("age").unwrap(), Value::from(30));
    assert!(table.resize_field("name", 0).is_err());
    assert!(table.resize_field("name", 256).is_err());
}

#[test]
fn rename_field_rewrites_descriptors_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rename.dbf");
    let table = Table::create(&path, "name C(10); age N(3,0)", Dialect::Db3).unwrap();
    sample_no_memo(&table, "Ethan", 29);
    table.rename_field("name", "fullname").unwrap();
    assert_eq!(table.field_names(), vec!["fullname", "age"]);
    assert_eq!(table.record(0).unwrap().get("fullname").unwrap(), Value::from("Ethan"));
    assert!(table.rename_field("fullname", "age").is_err());
    assert!(table.rename_field("fullname", "_bad").is_err());
    assert!(table.rename_field("ghost", "ok").is_err());

    table.close(false, false).unwrap();
    table.reopen().unwrap();
    assert_eq!(table.field_names(), vec!["fullname", "age"]);
}

fn sample_no_memo(table: &Table, name: &str, age: i64) {
    table
        .append_with(&[("name", Value::from(name)), ("age", Value::from(age))], false)
        .unwrap();
}

#[test]
fn structural_mutations_write_a_backup() {
    // leaked on purpose: other tests may resolve $DBF_TEMP while
    // this one runs, and the directory must outlive them
    let dir = tempdir().unwrap().into_path();
    env::set_var("DBF_TEMP", &dir);
    let path = dir.join("backed.dbf");
    let table = Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    table.append_with(&[("name", Value::from("Ethan"))], false).unwrap();
    table.add_fields("age N(3,0)").unwrap();
    env::remove_var("DBF_TEMP");
    let backup = dir.join("backed_backup.dbf");
    assert!(backup.exists());
    // the backup still has the old layout
    let copy = Table::open(&backup, Dialect::Db3).unwrap();
    assert_eq!(copy.field_names(), vec!["name"]);
}

#[test]
fn explicit_backup_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orig.dbf");
    let table = Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    let target = dir.path().join("copy.dbf");
    let written = table.create_backup(Some(&target), false).unwrap();
    assert_eq!(written, Some(target.clone()));
    assert!(target.exists());
}

#[test]
fn codepage_change_rewrites_header_byte() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cp.dbf");
    let table = Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    assert_eq!(table.codepage().byte, 0x03);
    table.set_codepage(0xc9).unwrap();
    assert_eq!(table.codepage().name, "cp1251");
    let on_disk = fs::read(&path).unwrap();
    assert_eq!(on_disk[29], 0xc9);
    assert!(table.set_codepage(0x42).is_err());
}

#[test]
fn unsupported_codepage_fails_at_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("badcp.dbf");
    Table::create(&path, "name C(10)", Dialect::Db3).unwrap();
    let mut bytes = fs::read(&path).unwrap();
    bytes[29] = 0x01; // cp437 has no decoder in this build
    fs::write(&path, &bytes).unwrap();
    let err = Table::open(&path, Dialect::Db3).unwrap_err();
    assert!(err.to_string().contains("0x01"));
}

#[test]
fn missing_memo_file_is_structural_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gone.dbf");
    let table = Table::create(&path, specs(), Dialect::Db3).unwrap();
    let memo_path = table.memo_path().unwrap();
    table.close(false, false).unwrap();
    fs::remove_file(&memo_path).unwrap();
    let err = Table::open(&path, Dialect::Db3).unwrap_err();
    assert!(err.to_string().contains("memo"));
    // ignore_memos opens it anyway
    let table = Table::open_with(
        &path,
        Dialect::Db3,
        &OpenOptions { ignore_memos: true, ..OpenOptions::default() },
    )
    .unwrap();
    assert_eq!(table.len(), 0);
}

#[test]
fn structure_and_new_like() {
    let dir = tempdir().unwrap();
    let table =
        Table::create(dir.path().join("orig.dbf"), specs(), Dialect::Db3).unwrap();
    assert_eq!(
        table.structure(None).unwrap(),
        vec!["name C(25)", "age N(3,0)", "wisdom M"]
    );
    assert_eq!(table.structure(Some(&["age"])).unwrap(), vec!["age N(3,0)"]);

    let clone = table.new_like(dir.path().join("clone.dbf")).unwrap();
    assert_eq!(clone.field_names(), table.field_names());
    assert_eq!(clone.record_length(), table.record_length());
    assert_eq!(clone.len(), 0);
}

#[test]
fn find_returns_a_registered_list() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "Ethan", 29);
    sample(&table, "Allison", 20);
    sample(&table, "Ethan", 40);
    let hits = table
        .find(|record| record.get("name").ok() == Some(Value::from("Ethan")))
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits.get(1).unwrap().get("age").unwrap(), Value::from(40));
}

#[test]
fn export_csv_quotes_non_numeric_values() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.dbf");
    let table = Table::create(&path, "name C(10); age N(3,0)", Dialect::Db3).unwrap();
    sample_no_memo(&table, "Ethan", 29);
    sample_no_memo(&table, "Al \"Big\"", 40);
    let written = table
        .export(None, None, None, crate::export::ExportFormat::Csv, true)
        .unwrap();
    assert_eq!(written, 2);
    let text = fs::read_to_string(dir.path().join("out.csv")).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), "\"name\",\"age\"");
    assert_eq!(lines.next().unwrap(), "\"Ethan\",29");
    assert_eq!(lines.next().unwrap(), "\"Al \"\"Big\"\"\",40");
}

#[test]
fn memory_tables_do_everything_but_touch_disk() {
    let table = Table::in_memory(specs(), Dialect::Db3).unwrap();
    sample(&table, "a", 1);
    sample(&table, "b", 2);
    table.record(0).unwrap().delete().unwrap();
    table.pack().unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.record(0).unwrap().get("name").unwrap(), Value::from("b"));
    assert!(table.path().is_none());
    assert!(table.reopen().is_err());
    let record = table.record(0).unwrap();
    record.set("wisdom", Value::from("kept in memory")).unwrap();
    assert_eq!(record.get("wisdom").unwrap(), Value::from("kept in memory"));
}

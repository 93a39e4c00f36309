//! Integration tests for the record-store-sqlite crate.

use chrono::{DateTime, Utc};
use record_store_core::interchange::{RecordReader, join_row, split_record};
use record_store_core::{
    ConverterRegistry, CoreError, Entity, EnumValue, F64Converter, Result as CoreResult,
    RowReader, RowWriter, SchemaDescriptor, SqlValue, StorageClass, TableDescriptor,
    TypeConverter, UpgradeStrategy,
};
use record_store_sqlite::{
    MigrationCodec, OpenOutcome, RecordStore, SchemaManager, SqliteError, export_to_writer,
    import_from_reader, table_exists, user_version,
};
use rusqlite::Connection;

const GOLDEN: f64 = 1.618_033_988_749_895;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Rank {
    #[default]
    Low,
    Mid,
    High,
}

impl EnumValue for Rank {
    fn name(&self) -> &'static str {
        match self {
            Rank::Low => "LOW",
            Rank::Mid => "MID",
            Rank::High => "HIGH",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "LOW" => Some(Rank::Low),
            "MID" => Some(Rank::Mid),
            "HIGH" => Some(Rank::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Latitude(f64);

struct LatitudeConverter;

impl TypeConverter for LatitudeConverter {
    type Value = Latitude;

    fn storage_class(&self) -> StorageClass {
        StorageClass::Real
    }

    fn to_sql(&self, value: &Latitude) -> CoreResult<SqlValue> {
        F64Converter.to_sql(&value.0)
    }

    fn from_sql(&self, value: &SqlValue) -> CoreResult<Latitude> {
        F64Converter.from_sql(value).map(Latitude)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct SimpleEntity {
    id: i64,
    bool_field: bool,
    byte_field: i8,
    short_field: i16,
    int_field: i32,
    long_field: i64,
    char_field: char,
    float_field: f32,
    double_field: f64,
    string_field: String,
    blob_field: Vec<u8>,
    date_field: DateTime<Utc>,
    rank: Rank,
    latitude: Latitude,
    note: Option<String>,
    score: Option<i32>,
}

impl Entity for SimpleEntity {
    fn describe(registry: &ConverterRegistry) -> CoreResult<TableDescriptor> {
        TableDescriptor::builder("simple_entity", registry)
            .id("id")
            .field::<bool>("bool_field")
            .field::<i8>("byte_field")
            .field::<i16>("short_field")
            .field::<i32>("int_field")
            .field::<i64>("long_field")
            .field::<char>("char_field")
            .field::<f32>("float_field")
            .field::<f64>("double_field")
            .field::<String>("string_field")
            .field::<Vec<u8>>("blob_field")
            .field::<DateTime<Utc>>("date_field")
            .field::<Rank>("rank")
            .field::<Latitude>("latitude")
            .nullable::<String>("note")
            .nullable::<i32>("score")
            .build()
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn to_row(&self, registry: &ConverterRegistry) -> CoreResult<Vec<SqlValue>> {
        let mut row = RowWriter::new(registry);
        row.push(&self.id)?
            .push(&self.bool_field)?
            .push(&self.byte_field)?
            .push(&self.short_field)?
            .push(&self.int_field)?
            .push(&self.long_field)?
            .push(&self.char_field)?
            .push(&self.float_field)?
            .push(&self.double_field)?
            .push(&self.string_field)?
            .push(&self.blob_field)?
            .push(&self.date_field)?
            .push(&self.rank)?
            .push(&self.latitude)?
            .push_opt(self.note.as_ref())?
            .push_opt(self.score.as_ref())?;
        Ok(row.finish())
    }

    fn from_row(registry: &ConverterRegistry, row: &[SqlValue]) -> CoreResult<Self> {
        let mut row = RowReader::new(registry, row);
        Ok(SimpleEntity {
            id: row.next()?,
            bool_field: row.next()?,
            byte_field: row.next()?,
            short_field: row.next()?,
            int_field: row.next()?,
            long_field: row.next()?,
            char_field: row.next()?,
            float_field: row.next()?,
            double_field: row.next()?,
            string_field: row.next()?,
            blob_field: row.next()?,
            date_field: row.next()?,
            rank: row.next()?,
            latitude: row.next()?,
            note: row.next_opt()?,
            score: row.next_opt()?,
        })
    }
}

/// Earlier shape of `simple_entity`: `obsolete` was removed later and most
/// other columns were added later.
#[derive(Debug, Clone, PartialEq, Default)]
struct SimpleEntityV1 {
    id: i64,
    string_field: String,
    int_field: i32,
    double_field: f64,
    obsolete: String,
}

impl Entity for SimpleEntityV1 {
    fn describe(registry: &ConverterRegistry) -> CoreResult<TableDescriptor> {
        TableDescriptor::builder("simple_entity", registry)
            .id("id")
            .field::<String>("string_field")
            .field::<i32>("int_field")
            .field::<f64>("double_field")
            .field::<String>("obsolete")
            .build()
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn to_row(&self, registry: &ConverterRegistry) -> CoreResult<Vec<SqlValue>> {
        let mut row = RowWriter::new(registry);
        row.push(&self.id)?
            .push(&self.string_field)?
            .push(&self.int_field)?
            .push(&self.double_field)?
            .push(&self.obsolete)?;
        Ok(row.finish())
    }

    fn from_row(registry: &ConverterRegistry, row: &[SqlValue]) -> CoreResult<Self> {
        let mut row = RowReader::new(registry, row);
        Ok(SimpleEntityV1 {
            id: row.next()?,
            string_field: row.next()?,
            int_field: row.next()?,
            double_field: row.next()?,
            obsolete: row.next()?,
        })
    }
}

fn registry() -> ConverterRegistry {
    let mut registry = ConverterRegistry::with_builtins();
    registry.register_enum::<Rank>().unwrap();
    registry.register(LatitudeConverter).unwrap();
    registry
}

fn create_table(conn: &Connection, table: &TableDescriptor) {
    conn.execute_batch(&format!("{};", table.create_sql()))
        .unwrap();
}

fn date(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn sample(seed: i32) -> SimpleEntity {
    SimpleEntity {
        id: 0,
        bool_field: seed % 2 == 0,
        byte_field: -(seed as i8),
        short_field: 300 + seed as i16,
        int_field: seed,
        long_field: (1 << 40) | i64::from(seed),
        char_field: 'é',
        float_field: 1.618_034,
        double_field: GOLDEN,
        string_field: format!("row {seed}, \"quoted\"\nsecond line"),
        blob_field: vec![0, 1, 2, 0xff, seed as u8],
        date_field: date(1_700_000_000_123 + i64::from(seed)),
        rank: Rank::Mid,
        latitude: Latitude(-33.865_143),
        note: Some(String::new()),
        score: None,
    }
}

#[test]
fn test_insert_assigns_id_and_get_round_trips() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut first = sample(1);
    let mut second = sample(2);
    let id1 = store.insert(&mut first).unwrap();
    let id2 = store.insert(&mut second).unwrap();

    assert!(id1 > 0);
    assert!(id2 > id1);
    assert_eq!(first.id, id1);
    assert_eq!(store.get(id1).unwrap(), Some(first));
    assert_eq!(store.get(id2).unwrap(), Some(second));
    assert_eq!(store.get(id2 + 100).unwrap(), None);
}

#[test]
fn test_empty_text_and_null_stay_distinct() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut empty = SimpleEntity {
        note: Some(String::new()),
        ..Default::default()
    };
    let mut absent = SimpleEntity::default();
    store.insert(&mut empty).unwrap();
    store.insert(&mut absent).unwrap();

    assert_eq!(store.get(empty.id).unwrap().unwrap().note, Some(String::new()));
    assert_eq!(store.get(absent.id).unwrap().unwrap().note, None);
}

#[test]
fn test_floats_are_bit_exact_through_the_database() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let doubles = [
        0.0,
        f64::MAX,
        f64::MIN,
        f64::MIN_POSITIVE,
        f64::from_bits(1),
        GOLDEN,
        -1.5e-300,
    ];
    let floats = [
        0.0,
        f32::MAX,
        f32::MIN,
        f32::MIN_POSITIVE,
        f32::from_bits(1),
        1.618_034,
        -2.5e-38,
    ];
    for (double, float) in doubles.iter().zip(&floats) {
        let mut record = SimpleEntity {
            double_field: *double,
            float_field: *float,
            ..Default::default()
        };
        store.insert(&mut record).unwrap();
        let loaded = store.get(record.id).unwrap().unwrap();
        assert_eq!(loaded.double_field.to_bits(), double.to_bits());
        assert_eq!(loaded.float_field.to_bits(), float.to_bits());
    }
}

#[test]
fn test_update_save_and_delete() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut record = sample(5);
    store.save(&mut record).unwrap();
    assert_ne!(record.id, 0);

    record.string_field = "changed".to_string();
    record.score = Some(9);
    assert_eq!(store.update(&record).unwrap(), 1);
    store.save(&mut record).unwrap();
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.get(record.id).unwrap().unwrap().score, Some(9));

    let mut pinned = SimpleEntity {
        id: 500,
        int_field: 3,
        ..Default::default()
    };
    assert_eq!(store.save(&mut pinned).unwrap(), 500);
    assert_eq!(store.get(500).unwrap().unwrap().int_field, 3);

    assert_eq!(store.delete(None).unwrap(), 0);
    assert_eq!(store.delete(Some(record.id)).unwrap(), 1);
    assert_eq!(store.delete(Some(record.id)).unwrap(), 0);
    assert_eq!(store.count().unwrap(), 1);
    assert_eq!(store.delete_all().unwrap(), 1);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_insert_many_is_all_or_nothing() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut records: Vec<SimpleEntity> = (0..4).map(sample).collect();
    records[0].id = 100;
    records[2].id = 100;

    let err = store.insert_many(&mut records).unwrap_err();
    assert!(matches!(err, SqliteError::BatchFailed { row: 2, .. }));
    assert_eq!(store.count().unwrap(), 0);
    assert_eq!(records[1].id, 0);

    records[2].id = 0;
    assert_eq!(store.insert_many(&mut records).unwrap(), 4);
    assert_eq!(store.count().unwrap(), 4);
    assert_eq!(records[0].id, 100);
    assert!(records.iter().all(|r| r.id != 0));
    assert_eq!(store.list_all().unwrap(), records);
}

#[test]
fn test_by_example_uses_only_changed_fields() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut records: Vec<SimpleEntity> = [0, 21, 21, 7].into_iter().map(sample).collect();
    records[2].string_field = "other".to_string();
    store.insert_many(&mut records).unwrap();

    let by_21 = SimpleEntity {
        int_field: 21,
        ..Default::default()
    };
    assert_eq!(store.list_by_example(&by_21).unwrap().len(), 2);

    // Zero is the default, so it matches every row.
    let by_0 = SimpleEntity::default();
    assert_eq!(store.list_by_example(&by_0).unwrap().len(), 4);

    let by_21_other = SimpleEntity {
        int_field: 21,
        string_field: "other".to_string(),
        ..Default::default()
    };
    let found = store.get_by_example(&by_21_other).unwrap().unwrap();
    assert_eq!(found.id, records[2].id);

    let by_rank = SimpleEntity {
        rank: Rank::Mid,
        ..Default::default()
    };
    assert_eq!(store.list_by_example(&by_rank).unwrap().len(), 4);
}

#[test]
fn test_get_by_example_rejects_duplicates() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    for _ in 0..2 {
        let mut record = SimpleEntity {
            string_field: "dup".to_string(),
            ..Default::default()
        };
        store.insert(&mut record).unwrap();
    }

    let example = SimpleEntity {
        string_field: "dup".to_string(),
        ..Default::default()
    };
    let err = store.get_by_example(&example).unwrap_err();
    assert!(matches!(err, SqliteError::TooManyResults { count: 2, .. }));
    assert_eq!(store.list_by_example(&example).unwrap().len(), 2);
}

#[test]
fn test_by_example_refuses_real_and_blob_fields() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let by_double = SimpleEntity {
        double_field: GOLDEN,
        ..Default::default()
    };
    let err = store.list_by_example(&by_double).unwrap_err();
    assert!(matches!(
        err,
        SqliteError::CoreError(CoreError::UnsupportedPredicate {
            class: StorageClass::Real,
            ..
        })
    ));

    let by_blob = SimpleEntity {
        blob_field: vec![1],
        ..Default::default()
    };
    let err = store.get_by_example(&by_blob).unwrap_err();
    assert!(matches!(
        err,
        SqliteError::CoreError(CoreError::UnsupportedPredicate {
            class: StorageClass::Blob,
            ..
        })
    ));
}

#[test]
fn test_query_builder_filters_and_orders() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut records: Vec<SimpleEntity> = (1..=5).map(sample).collect();
    records[0].rank = Rank::High;
    records[3].rank = Rank::Low;
    store.insert_many(&mut records).unwrap();

    let int_field = store.column("int_field").unwrap();
    let rank = store.column("rank").unwrap();
    let flag = store.column("bool_field").unwrap();

    let found = store
        .filter()
        .eq(&int_field, &3)
        .unwrap()
        .get()
        .unwrap()
        .unwrap();
    assert_eq!(found, records[2]);

    let ranked: Vec<i32> = store
        .filter()
        .in_values(&rank, &[Rank::High, Rank::Low])
        .unwrap()
        .order(&["int_field DESC"])
        .unwrap()
        .list()
        .unwrap()
        .into_iter()
        .map(|r| r.int_field)
        .collect();
    assert_eq!(ranked, vec![4, 1]);

    let even = store
        .filter()
        .eq(&flag, &true)
        .unwrap()
        .in_list(&int_field, &["2", "3", "4"])
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(even, 2);

    let unfiltered = store.filter().in_values::<i32>(&int_field, &[]).unwrap();
    assert!(unfiltered.where_clause().is_none());
    assert_eq!(unfiltered.count().unwrap(), 5);
}

#[test]
fn test_query_builder_rejects_bad_predicates() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let other = SimpleEntityV1::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let int_field = store.column("int_field").unwrap();
    let err = store.filter().eq(&int_field, &3_i64).err().unwrap();
    assert!(matches!(
        err,
        SqliteError::CoreError(CoreError::TypeMismatch { .. })
    ));

    let double_field = store.column("double_field").unwrap();
    let err = store.filter().eq(&double_field, &GOLDEN).err().unwrap();
    assert!(matches!(
        err,
        SqliteError::CoreError(CoreError::UnsupportedPredicate { .. })
    ));

    let foreign = record_store_core::Column {
        table: "elsewhere".to_string(),
        ..other.column("int_field").unwrap()
    };
    let err = store.filter().eq(&foreign, &3).err().unwrap();
    assert!(matches!(err, SqliteError::InvalidQuery(_)));

    assert!(matches!(
        store.column("missing").unwrap_err(),
        SqliteError::CoreError(CoreError::UnknownColumn { .. })
    ));
    assert!(matches!(
        store.filter().order(&[]).err().unwrap(),
        SqliteError::InvalidQuery(_)
    ));
    assert!(matches!(
        store.filter().order(&["int_field sideways"]).err().unwrap(),
        SqliteError::InvalidQuery(_)
    ));
    assert!(matches!(
        store.filter().order(&["missing"]).err().unwrap(),
        SqliteError::CoreError(CoreError::UnknownColumn { .. })
    ));
}

#[test]
fn test_scoped_query_with_raw_clause() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);
    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);

    let mut records: Vec<SimpleEntity> = (1..=6).map(sample).collect();
    store.insert_many(&mut records).unwrap();

    let ints = store
        .query(
            Some("int_field > ?"),
            &["3".to_string()],
            Some("int_field DESC"),
            |cursor| {
                cursor
                    .map(|r| r.map(|e| e.int_field))
                    .collect::<record_store_sqlite::Result<Vec<_>>>()
            },
        )
        .unwrap();
    assert_eq!(ints, vec![6, 5, 4]);

    let err = store
        .query(None, &[], None, |cursor| cursor.as_object())
        .unwrap_err();
    assert!(matches!(err, SqliteError::TooManyResults { count: 6, .. }));
}

#[test]
fn test_export_header_permutation_imports_identically() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let source = Connection::open_in_memory().unwrap();
    create_table(&source, &table);
    let store = RecordStore::<SimpleEntity>::new(&source, &registry, &table);
    let mut records: Vec<SimpleEntity> = (1..=3).map(sample).collect();
    records[1].note = None;
    records[2].score = Some(-4);
    store.insert_many(&mut records).unwrap();

    let mut exported = Vec::new();
    assert_eq!(export_to_writer(&source, &table, &mut exported).unwrap(), 3);

    let mut reversed = String::new();
    for record in RecordReader::new(exported.as_slice()) {
        let mut fields = split_record(&record.unwrap());
        fields.reverse();
        reversed.push_str(&join_row(&fields));
        reversed.push('\n');
    }

    let target = Connection::open_in_memory().unwrap();
    create_table(&target, &table);
    assert_eq!(
        import_from_reader(&target, &table, reversed.as_bytes()).unwrap(),
        3
    );
    let imported = RecordStore::<SimpleEntity>::new(&target, &registry, &table);
    assert_eq!(imported.list_all().unwrap(), records);
}

#[test]
fn test_import_fills_missing_columns_and_ignores_extra() {
    let registry = registry();
    let table = SimpleEntity::table_descriptor(&registry).unwrap();
    let conn = Connection::open_in_memory().unwrap();
    create_table(&conn, &table);

    let input = "string_field,unknown,int_field\n\"hello, world\",zzz,7\n,,8\n";
    assert_eq!(import_from_reader(&conn, &table, input.as_bytes()).unwrap(), 2);

    let store = RecordStore::<SimpleEntity>::new(&conn, &registry, &table);
    let rows = store.list_all().unwrap();
    assert_eq!(
        rows,
        vec![
            SimpleEntity {
                id: 1,
                string_field: "hello, world".to_string(),
                int_field: 7,
                ..Default::default()
            },
            SimpleEntity {
                id: 2,
                int_field: 8,
                ..Default::default()
            },
        ]
    );
}

fn schema_v1(registry: &ConverterRegistry) -> SchemaDescriptor {
    let mut schema = SchemaDescriptor::new("records", 1).unwrap();
    schema
        .add_table(SimpleEntityV1::table_descriptor(registry).unwrap())
        .unwrap();
    schema
}

fn schema_v2(registry: &ConverterRegistry) -> SchemaDescriptor {
    let mut schema = SchemaDescriptor::new("records", 2).unwrap();
    schema
        .add_table(SimpleEntity::table_descriptor(registry).unwrap())
        .unwrap();
    schema
}

fn seed_v1(dir: &std::path::Path, registry: &ConverterRegistry) -> Connection {
    let conn = Connection::open(dir.join("records.db")).unwrap();
    let codec = MigrationCodec::new(dir.join("backups"), "records");
    let mut manager = SchemaManager::new(conn, schema_v1(registry), codec).unwrap();
    assert_eq!(manager.open().unwrap(), OpenOutcome::Created);

    let table = manager.table("simple_entity").unwrap().clone();
    let store = RecordStore::<SimpleEntityV1>::new(manager.connection(), registry, &table);
    let mut records = vec![
        SimpleEntityV1 {
            id: 0,
            string_field: "first, with comma".to_string(),
            int_field: 21,
            double_field: GOLDEN,
            obsolete: "gone".to_string(),
        },
        SimpleEntityV1 {
            id: 0,
            string_field: "line\nbreak \"q\"".to_string(),
            int_field: -5,
            double_field: f64::MIN_POSITIVE,
            obsolete: String::new(),
        },
    ];
    store.insert_many(&mut records).unwrap();
    manager.into_connection()
}

fn expected_after_upgrade() -> Vec<SimpleEntity> {
    vec![
        SimpleEntity {
            id: 1,
            string_field: "first, with comma".to_string(),
            int_field: 21,
            double_field: GOLDEN,
            ..Default::default()
        },
        SimpleEntity {
            id: 2,
            string_field: "line\nbreak \"q\"".to_string(),
            int_field: -5,
            double_field: f64::MIN_POSITIVE,
            ..Default::default()
        },
    ]
}

#[test]
fn test_backup_restore_upgrade_survives_schema_drift() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let conn = seed_v1(dir.path(), &registry);

    let codec = MigrationCodec::new(dir.path().join("backups"), "records");
    let mut manager = SchemaManager::new(conn, schema_v2(&registry), codec).unwrap();
    let OpenOutcome::Upgraded(report) = manager.open().unwrap() else {
        panic!("expected an upgrade");
    };
    assert!(report.is_clean());
    assert_eq!(report.tables[0].exported, Some(2));
    assert_eq!(report.tables[0].imported, Some(2));
    assert_eq!(manager.stored_version().unwrap(), 2);
    assert!(
        dir.path()
            .join("backups")
            .join("records.v1.simple_entity.csv")
            .exists()
    );

    let table = manager.table("simple_entity").unwrap().clone();
    let store = RecordStore::<SimpleEntity>::new(manager.connection(), &registry, &table);
    let rows = store.list_all().unwrap();
    assert_eq!(rows, expected_after_upgrade());
    assert_eq!(rows[0].double_field.to_bits(), GOLDEN.to_bits());

    assert_eq!(manager.open().unwrap(), OpenOutcome::Current);
}

#[test]
fn test_interrupted_upgrade_reuses_existing_backup() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let conn = seed_v1(dir.path(), &registry);

    // Simulate a run that exported and recreated the table, then stopped.
    let codec = MigrationCodec::new(dir.path().join("backups"), "records");
    let v1_table = SimpleEntityV1::table_descriptor(&registry).unwrap();
    assert_eq!(codec.export_table(&conn, &v1_table, 1).unwrap(), 2);
    conn.execute("DELETE FROM simple_entity", []).unwrap();

    let mut manager = SchemaManager::new(conn, schema_v2(&registry), codec).unwrap();
    let OpenOutcome::Upgraded(report) = manager.open().unwrap() else {
        panic!("expected an upgrade");
    };
    assert_eq!(report.tables[0].exported, None);
    assert_eq!(report.tables[0].imported, Some(2));

    let table = manager.table("simple_entity").unwrap().clone();
    let store = RecordStore::<SimpleEntity>::new(manager.connection(), &registry, &table);
    assert_eq!(store.list_all().unwrap(), expected_after_upgrade());
}

#[test]
fn test_failed_export_leaves_table_and_version_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let conn = seed_v1(dir.path(), &registry);

    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "occupied").unwrap();
    let codec = MigrationCodec::new(&blocker, "records");
    let mut manager = SchemaManager::new(conn, schema_v2(&registry), codec).unwrap();

    let OpenOutcome::Upgraded(report) = manager.open().unwrap() else {
        panic!("expected an upgrade");
    };
    assert!(!report.is_clean());
    assert_eq!(report.failures().count(), 1);
    assert!(report.tables[0].error.is_some());
    assert_eq!(manager.stored_version().unwrap(), 1);

    let conn = manager.into_connection();
    let v1_table = SimpleEntityV1::table_descriptor(&registry).unwrap();
    let store = RecordStore::<SimpleEntityV1>::new(&conn, &registry, &v1_table);
    assert_eq!(store.count().unwrap(), 2);
    assert_eq!(store.list_all().unwrap()[0].obsolete, "gone");
}

#[test]
fn test_recreate_empty_strategy_discards_rows() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let conn = seed_v1(dir.path(), &registry);

    let codec = MigrationCodec::new(dir.path().join("backups"), "records");
    let mut manager = SchemaManager::new(conn, schema_v2(&registry), codec)
        .unwrap()
        .with_strategy(UpgradeStrategy::RecreateEmpty);
    assert!(matches!(manager.open().unwrap(), OpenOutcome::Upgraded(_)));

    let status = manager.status().unwrap();
    assert!(status.is_current());
    assert_eq!(status.tables[0].row_count, 0);
    assert!(table_exists(manager.connection(), "simple_entity").unwrap());
    assert_eq!(user_version(manager.connection()).unwrap(), 2);
    assert!(!dir.path().join("backups").exists());
}

#[test]
fn test_backup_and_restore_all_tables() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry();
    let conn = Connection::open(dir.path().join("records.db")).unwrap();
    let codec = MigrationCodec::new(dir.path().join("backups"), "records");
    let mut manager = SchemaManager::new(conn, schema_v2(&registry), codec).unwrap();
    manager.open().unwrap();

    let table = manager.table("simple_entity").unwrap().clone();
    {
        let store = RecordStore::<SimpleEntity>::new(manager.connection(), &registry, &table);
        let mut records: Vec<SimpleEntity> = (1..=3).map(sample).collect();
        store.insert_many(&mut records).unwrap();
    }

    let backed_up = manager.backup_all_tables(2);
    assert_eq!(backed_up[0].exported, Some(3));

    let store = RecordStore::<SimpleEntity>::new(manager.connection(), &registry, &table);
    let before = store.list_all().unwrap();
    store.delete_all().unwrap();

    let restored = manager.restore_all_tables(2);
    assert_eq!(restored[0].imported, Some(3));
    assert_eq!(store.list_all().unwrap(), before);
}

use quiver::{Chunk, DataChunk, Engine, Error, LogicalType, QueryResult, TypeTag, Value};
use quiver_engine_memory::live_handles;

/// BIGINT chunks holding consecutive row numbers, split at `sizes`.
fn numbered_result<'e>(engine: &'e Engine, ty: &LogicalType<'_>, sizes: &[usize]) -> QueryResult<'e> {
    let mut next = 0i64;
    let chunks = sizes
        .iter()
        .map(|&size| {
            let mut chunk = DataChunk::new(engine, std::slice::from_ref(ty)).unwrap();
            let values: Vec<_> = (next..next + size as i64).map(Some).collect();
            next += size as i64;
            chunk.encode_column(0, &values).unwrap();
            chunk
        })
        .collect();
    QueryResult::from_chunks(engine, &[("row", ty)], chunks).unwrap()
}

#[test]
fn materialized_addressing_matches_forward_scan() {
    let engine = Engine::in_memory();
    let v = engine.vector_size();
    assert_eq!(v, 2048);
    let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();

    let scanned: Vec<Option<i64>> = numbered_result(&engine, &ty, &[v, v, 5])
        .into_cursor()
        .flat_map(|chunk| chunk.decode_column::<i64>(0).unwrap())
        .collect();
    assert_eq!(scanned.len(), 2 * v + 5);

    let materialized = numbered_result(&engine, &ty, &[v, v, 5]).materialize().unwrap();
    assert_eq!(materialized.row_count(), 2 * v + 5);
    assert_eq!(materialized.chunk_count(), 3);
    assert_eq!(materialized.vector_size(), v);

    for row in [0, v - 1, v, v + 1, 2 * v - 1, 2 * v, 2 * v + 4] {
        assert_eq!(materialized.get::<i64>(0, row).unwrap(), scanned[row], "row {row}");
        assert_eq!(materialized.row(row).unwrap(), vec![Value::from(scanned[row])]);
    }
    assert_eq!(materialized.column::<i64>(0).unwrap(), scanned);
    assert!(matches!(
        materialized.value(0, 2 * v + 5),
        Err(Error::OutOfBounds { what: "row", .. })
    ));
}

#[test]
fn early_dropped_cursor_frees_everything() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
    let before = live_handles();

    let mut cursor = numbered_result(&engine, &ty, &[3, 3, 3]).into_cursor();
    let first = cursor.next_chunk().unwrap();
    assert!(cursor.has_next());
    // One chunk in hand, one prefetched, one still queued in the result.
    assert_eq!(live_handles().chunks, before.chunks + 3);
    assert_eq!(live_handles().results, before.results + 1);

    drop(cursor);
    assert_eq!(live_handles().chunks, before.chunks + 1);
    assert_eq!(first.decode_column::<i64>(0).unwrap(), vec![Some(0), Some(1), Some(2)]);
    drop(first);
    assert_eq!(live_handles(), before);
}

#[test]
fn empty_result_materializes_to_nothing() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::BigInt).unwrap();
    let result = numbered_result(&engine, &ty, &[]);
    assert_eq!(result.column_count(), 1);

    let mut cursor = result.into_cursor();
    assert!(!cursor.has_next());
    assert!(matches!(cursor.next_chunk(), Err(Error::Exhausted)));

    let materialized = numbered_result(&engine, &ty, &[]).materialize().unwrap();
    assert_eq!(materialized.row_count(), 0);
    assert!(matches!(materialized.row(0), Err(Error::OutOfBounds { .. })));
    assert_eq!(materialized.to_json().unwrap(), serde_json::json!([]));
}

#[test]
fn result_column_metadata() {
    let engine = Engine::in_memory();
    let int = LogicalType::new(&engine, TypeTag::Integer).unwrap();
    let list = LogicalType::list(&int).unwrap();
    let chunk = DataChunk::new(&engine, &[int.try_clone().unwrap(), list.try_clone().unwrap()]).unwrap();
    let result = QueryResult::from_chunks(&engine, &[("id", &int), ("tags", &list)], vec![chunk]).unwrap();

    assert_eq!(result.column_names().unwrap(), ["id", "tags"]);
    assert_eq!(result.column_type(1).unwrap().to_string(), "INTEGER[]");
    assert!(matches!(
        result.column_type(2),
        Err(Error::OutOfBounds { what: "column", index: 2, len: 2 })
    ));
}

use quiver::{
    Chunk, DataChunk, Date, Decode, Encode, Engine, Error, Interval, LogicalType, Time, Timestamp, TimestampTz,
    TypeTag, Value, Vector, VectorHandle, VectorHandleMut, decode, decode_values, encode, encode_values,
};
use quiver_abi::StringElement;

fn round_trip<T>(engine: &Engine, tag: TypeTag, values: &[Option<T>])
where
    T: Decode + Encode + Clone + PartialEq + std::fmt::Debug,
{
    let ty = LogicalType::new(engine, tag).unwrap();
    let mut vector = Vector::new(engine, &ty, values.len()).unwrap();
    encode(&mut vector, values, 0).unwrap();
    assert_eq!(decode::<T>(&vector, values.len(), 0).unwrap(), values, "{tag}");
}

macro_rules! extremes {
    ($engine:expr, $($ty:ty => $tag:ident),* $(,)?) => {
        $( round_trip::<$ty>($engine, TypeTag::$tag, &[Some(<$ty>::MIN), Some(0 as $ty), Some(<$ty>::MAX), None]); )*
    };
}

#[test]
fn fixed_width_extremes_round_trip() {
    let engine = Engine::in_memory();
    extremes!(&engine,
        i8 => TinyInt,
        i16 => SmallInt,
        i32 => Integer,
        i64 => BigInt,
        u8 => UTinyInt,
        u16 => USmallInt,
        u32 => UInteger,
        u64 => UBigInt,
        f32 => Float,
        f64 => Double,
    );
    round_trip(&engine, TypeTag::Boolean, &[Some(false), Some(true), None]);
    round_trip(
        &engine,
        TypeTag::Date,
        &[Some(Date { days: i32::MIN }), Some(Date::default()), Some(Date { days: i32::MAX })],
    );
    round_trip(
        &engine,
        TypeTag::Time,
        &[Some(Time { micros: 0 }), Some(Time { micros: 86_399_999_999 }), None],
    );
    round_trip(
        &engine,
        TypeTag::Timestamp,
        &[Some(Timestamp { micros: i64::MIN }), Some(Timestamp::default()), Some(Timestamp { micros: i64::MAX })],
    );
    round_trip(
        &engine,
        TypeTag::TimestampTz,
        &[Some(TimestampTz { micros: i64::MIN }), None, Some(TimestampTz { micros: i64::MAX })],
    );
    round_trip(
        &engine,
        TypeTag::Interval,
        &[
            Some(Interval { months: i32::MIN, days: i32::MIN, micros: i64::MIN }),
            Some(Interval::default()),
            Some(Interval { months: i32::MAX, days: i32::MAX, micros: i64::MAX }),
        ],
    );
}

#[test]
fn strings_around_the_inline_limit() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::Varchar).unwrap();
    let mut vector = Vector::new(&engine, &ty, 4).unwrap();
    let values: Vec<Option<String>> = [0, 11, 12, 13]
        .iter()
        .map(|&n| Some("x".repeat(n)))
        .collect();
    encode(&mut vector, &values, 0).unwrap();

    let elements = vector.data::<StringElement>().unwrap();
    let inlined: Vec<bool> = elements.iter().map(StringElement::is_inlined).collect();
    assert_eq!(inlined, [true, true, true, false]);
    let lengths: Vec<usize> = elements.iter().map(StringElement::len).collect();
    assert_eq!(lengths, [0, 11, 12, 13]);

    assert_eq!(decode::<String>(&vector, 4, 0).unwrap(), values);
}

#[test]
fn all_valid_vector_keeps_null_bitmap() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::Double).unwrap();
    let mut vector = Vector::new(&engine, &ty, 3).unwrap();
    encode(&mut vector, &[Some(1.5f64), Some(-0.0), Some(2.0)], 0).unwrap();
    assert!(vector.validity().words().is_none());
    assert_eq!(
        decode::<f64>(&vector, 3, 0).unwrap(),
        vec![Some(1.5), Some(-0.0), Some(2.0)]
    );

    vector.set_null(2).unwrap();
    assert!(vector.validity().words().is_some());
    assert_eq!(decode::<f64>(&vector, 3, 0).unwrap()[2], None);
}

fn bigint_list(engine: &Engine) -> LogicalType<'_> {
    let int = LogicalType::new(engine, TypeTag::BigInt).unwrap();
    LogicalType::list(&int).unwrap()
}

#[test]
fn list_rows_with_null_and_empty() {
    let engine = Engine::in_memory();
    let list = bigint_list(&engine);
    let mut chunk = DataChunk::new(&engine, &[list]).unwrap();
    let rows = vec![Some(vec![Some(1i64), Some(2)]), None, Some(vec![]), Some(vec![Some(3)])];
    chunk.encode_column(0, &rows).unwrap();

    assert_eq!(chunk.len(), 4);
    assert_eq!(chunk.decode_column::<Vec<Option<i64>>>(0).unwrap(), rows);
    assert_eq!(
        chunk.values(0).unwrap(),
        vec![
            Value::List(vec![Value::BigInt(1), Value::BigInt(2)]),
            Value::Null,
            Value::List(vec![]),
            Value::List(vec![Value::BigInt(3)]),
        ]
    );
    assert_eq!(chunk.vector(0).unwrap().list_size().unwrap(), 3);
}

#[test]
fn nested_lists_round_trip() {
    let engine = Engine::in_memory();
    let inner = bigint_list(&engine);
    let outer = LogicalType::list(&inner).unwrap();
    let mut vector = Vector::new(&engine, &outer, 3).unwrap();
    let rows = vec![
        Some(vec![Some(vec![Some(1i64), None]), None, Some(vec![])]),
        None,
        Some(vec![Some(vec![Some(4i64)])]),
    ];
    encode(&mut vector, &rows, 0).unwrap();
    assert_eq!(decode::<Vec<Option<Vec<Option<i64>>>>>(&vector, 3, 0).unwrap(), rows);

    // Appending more rows extends the child after the existing elements.
    let more = vec![Some(vec![Some(vec![Some(9i64)])])];
    encode(&mut vector, &more, 1).unwrap();
    assert_eq!(decode::<Vec<Option<Vec<Option<i64>>>>>(&vector, 1, 1).unwrap(), more);
    assert_eq!(decode::<Vec<Option<Vec<Option<i64>>>>>(&vector, 1, 0).unwrap()[0], rows[0]);
}

#[test]
fn decode_against_wrong_type_yields_nothing() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::Double).unwrap();
    let vector = Vector::new(&engine, &ty, 2).unwrap();
    let err = decode::<i32>(&vector, 2, 0).unwrap_err();
    assert!(matches!(
        err,
        Error::TypeMismatch { expected: TypeTag::Integer, actual: TypeTag::Double }
    ));
    assert_eq!(err.to_string(), "type mismatch: expected INTEGER, vector holds DOUBLE");
}

#[test]
fn dynamic_values_round_trip_through_json() {
    let engine = Engine::in_memory();
    let list = bigint_list(&engine);
    let text = LogicalType::new(&engine, TypeTag::Varchar).unwrap();
    let mut chunk = DataChunk::new(&engine, &[list, text]).unwrap();
    chunk
        .encode_values(0, &[Value::List(vec![Value::BigInt(7), Value::Null]), Value::Null])
        .unwrap();
    chunk
        .encode_values(1, &[Value::from("long enough to leave the inline buffer"), Value::from("a")])
        .unwrap();

    let rows: Vec<_> = (0..chunk.len())
        .map(|row| Value::List(chunk.row_values(row).unwrap()).to_json())
        .collect();
    assert_eq!(
        rows,
        [
            serde_json::json!([[7, null], "long enough to leave the inline buffer"]),
            serde_json::json!([null, "a"]),
        ]
    );

    let mut vector = chunk.vector_mut(1).unwrap();
    assert!(matches!(
        encode_values(&mut vector, &[Value::Integer(1)], 0),
        Err(Error::TypeMismatch { expected: TypeTag::Varchar, actual: TypeTag::Integer })
    ));
}

#[test]
fn sql_null_column_decodes_as_nulls() {
    let engine = Engine::in_memory();
    let ty = LogicalType::new(&engine, TypeTag::SqlNull).unwrap();
    let vector = Vector::new(&engine, &ty, 2).unwrap();
    assert_eq!(decode_values(&vector, 2, 0).unwrap(), vec![Value::Null, Value::Null]);
}

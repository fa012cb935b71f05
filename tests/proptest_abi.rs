//! Property-based tests for canonical ABI roundtrip correctness.
//!
//! These tests verify that lift(lower(x)) == x for random inputs, both
//! through the memory layout and through the flattened calling convention.

use proptest::prelude::*;
use wit_bind::{FlatReader, LinearMemory, TypeDescriptor, TypeRef, Value};

fn roundtrip(ty: &TypeRef, value: &Value) -> Value {
    let mut memory = LinearMemory::new();
    let bytes = ty.lower(value, &mut memory).unwrap();
    ty.lift(&bytes, &memory).unwrap()
}

fn flat_roundtrip(ty: &TypeRef, value: &Value) -> Value {
    let mut memory = LinearMemory::new();
    let mut flat = Vec::new();
    ty.lower_flat(value, &mut memory, &mut flat).unwrap();
    ty.lift_flat(&mut FlatReader::new(&flat), &memory).unwrap()
}

proptest! {
    #[test]
    fn roundtrip_u8(val in any::<u8>()) {
        let ty = TypeDescriptor::u8();
        prop_assert_eq!(roundtrip(&ty, &Value::U8(val)), Value::U8(val));
    }

    #[test]
    fn roundtrip_u16(val in any::<u16>()) {
        let ty = TypeDescriptor::u16();
        prop_assert_eq!(roundtrip(&ty, &Value::U16(val)), Value::U16(val));
    }

    #[test]
    fn roundtrip_u32(val in any::<u32>()) {
        let ty = TypeDescriptor::u32();
        prop_assert_eq!(roundtrip(&ty, &Value::U32(val)), Value::U32(val));
    }

    #[test]
    fn roundtrip_s32(val in any::<i32>()) {
        let ty = TypeDescriptor::s32();
        prop_assert_eq!(roundtrip(&ty, &Value::S32(val)), Value::S32(val));
    }

    #[test]
    fn roundtrip_u64(val in any::<u64>()) {
        let ty = TypeDescriptor::u64();
        prop_assert_eq!(roundtrip(&ty, &Value::U64(val)), Value::U64(val));
    }

    #[test]
    fn roundtrip_s64(val in any::<i64>()) {
        let ty = TypeDescriptor::s64();
        prop_assert_eq!(roundtrip(&ty, &Value::S64(val)), Value::S64(val));
    }

    #[test]
    fn roundtrip_f64(val in any::<f64>().prop_filter("NaN is not reflexive", |v| !v.is_nan())) {
        let ty = TypeDescriptor::f64();
        prop_assert_eq!(roundtrip(&ty, &Value::F64(val)), Value::F64(val));
    }

    #[test]
    fn roundtrip_char(val in any::<char>()) {
        let ty = TypeDescriptor::char();
        prop_assert_eq!(roundtrip(&ty, &Value::Char(val)), Value::Char(val));
    }

    #[test]
    fn roundtrip_string(val in ".*") {
        let ty = TypeDescriptor::string();
        let value = Value::String(val);
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn roundtrip_list_of_u32(vals in prop::collection::vec(any::<u32>(), 0..64)) {
        let ty = TypeDescriptor::list(TypeDescriptor::u32());
        let value = Value::List(vals.into_iter().map(Value::U32).collect());
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn roundtrip_list_of_strings(vals in prop::collection::vec(".*", 0..16)) {
        let ty = TypeDescriptor::list(TypeDescriptor::string());
        let value = Value::List(vals.into_iter().map(Value::String).collect());
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn roundtrip_record(x in any::<u32>(), y in any::<i64>(), label in ".*") {
        let ty = TypeDescriptor::record([
            ("x", TypeDescriptor::u32()),
            ("y", TypeDescriptor::s64()),
            ("label", TypeDescriptor::string()),
        ]);
        let value = Value::record([
            ("x", Value::U32(x)),
            ("y", Value::S64(y)),
            ("label", Value::String(label)),
        ]);
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn roundtrip_option_of_string(val in prop::option::of(".*")) {
        let ty = TypeDescriptor::option(TypeDescriptor::string());
        let value = Value::Option(val.map(|s| Box::new(Value::String(s))));
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn roundtrip_result(ok in any::<bool>(), num in any::<u32>(), msg in ".*") {
        let ty = TypeDescriptor::result(
            Some(TypeDescriptor::u32()),
            Some(TypeDescriptor::string()),
        );
        let value = if ok {
            Value::Result(Ok(Some(Box::new(Value::U32(num)))))
        } else {
            Value::Result(Err(Some(Box::new(Value::String(msg)))))
        };
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    // Raw flag words survive a roundtrip bit-for-bit, including bits with
    // no locally known name.
    #[test]
    fn roundtrip_flags_preserves_raw_words(w0 in any::<u32>(), w1 in any::<u32>()) {
        let ty = TypeDescriptor::flags((0..40).map(|i| format!("f{i}")));
        let value = Value::Flags(vec![w0, w1]);
        prop_assert_eq!(roundtrip(&ty, &value), value);
    }

    #[test]
    fn flat_roundtrip_scalar_tuple(a in any::<u32>(), b in any::<i64>(), c in any::<bool>()) {
        let ty = TypeDescriptor::tuple([
            TypeDescriptor::u32(),
            TypeDescriptor::s64(),
            TypeDescriptor::bool(),
        ]);
        let value = Value::Tuple(vec![Value::U32(a), Value::S64(b), Value::Bool(c)]);
        prop_assert_eq!(flat_roundtrip(&ty, &value), value);
    }

    #[test]
    fn flat_roundtrip_string_and_list(s in ".*", vals in prop::collection::vec(any::<u8>(), 0..64)) {
        let ty = TypeDescriptor::tuple([
            TypeDescriptor::string(),
            TypeDescriptor::list(TypeDescriptor::u8()),
        ]);
        let value = Value::Tuple(vec![
            Value::String(s),
            Value::List(vals.into_iter().map(Value::U8).collect()),
        ]);
        prop_assert_eq!(flat_roundtrip(&ty, &value), value);
    }

    #[test]
    fn flat_roundtrip_variant(pick in any::<bool>(), num in any::<u64>(), real in any::<f64>().prop_filter("NaN is not reflexive", |v| !v.is_nan())) {
        let ty = TypeDescriptor::variant([
            ("num", Some(TypeDescriptor::u64())),
            ("real", Some(TypeDescriptor::f64())),
        ]);
        let value = if pick {
            Value::variant("num", Some(Value::U64(num)))
        } else {
            Value::variant("real", Some(Value::F64(real)))
        };
        prop_assert_eq!(flat_roundtrip(&ty, &value), value);
    }
}

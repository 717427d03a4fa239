use super::helpers::*;
use proptest::prelude::*;

#[test]
fn test_refer_aliases_both_ways() {
    let mut w = program();
    let k5 = w.constant(Value::Long(5));
    let k10 = w.constant(Value::Long(10));
    let (one, k1) = literal(&mut w, Value::Long(1));
    let a = w.slot(&[tag::NONE]);
    let r = w.slot(&[tag::NONE]);
    let snapshot = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, k5])
        .op(OpCode::LoadConst, &[one, k1])
        .op(OpCode::Refer, &[r, a])
        .op(OpCode::Add, &[r, r, one])
        .op(OpCode::Equal, &[snapshot, a])
        .op(OpCode::LoadConst, &[a, k10]);

    let vm = execute(w, main).unwrap();
    assert_eq!(read(&vm, snapshot), Value::Long(6));
    assert_eq!(read(&vm, r), Value::Long(10));
}

#[test]
fn test_refer_binds_to_origin() {
    // r2 aliases r1's target, not r1 itself
    let mut w = program();
    let (a, ka) = literal(&mut w, Value::Long(1));
    let (b, kb) = literal(&mut w, Value::Long(2));
    let r1 = w.slot(&[tag::NONE]);
    let r2 = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::LoadConst, &[b, kb])
        .op(OpCode::Refer, &[r1, a])
        .op(OpCode::Refer, &[r2, r1])
        .op(OpCode::Refer, &[r1, b]);

    let vm = execute(w, main).unwrap();
    assert_eq!(read(&vm, r1), Value::Long(2));
    assert_eq!(read(&vm, r2), Value::Long(1));
}

#[test]
fn test_const_alias_rejects_writes() {
    let mut w = program();
    let (a, ka) = literal(&mut w, Value::Long(5));
    let c = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::Const, &[c, a])
        .op(OpCode::LoadConst, &[c, ka]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::ConstViolation(slot)) if slot == c));
}

#[test]
fn test_const_alias_cannot_be_rebound() {
    let mut w = program();
    let (a, ka) = literal(&mut w, Value::Long(5));
    let (b, kb) = literal(&mut w, Value::Long(6));
    let c = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::LoadConst, &[b, kb])
        .op(OpCode::Const, &[c, a])
        .op(OpCode::Refer, &[c, b]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::ConstViolation(slot)) if slot == c));
}

#[test]
fn test_const_source_stays_writable() {
    let mut w = program();
    let k5 = w.constant(Value::Long(5));
    let k7 = w.constant(Value::Long(7));
    let a = w.slot(&[tag::NONE]);
    let c = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, k5])
        .op(OpCode::Const, &[c, a])
        .op(OpCode::LoadConst, &[a, k7]);

    let vm = execute(w, main).unwrap();
    assert_eq!(read(&vm, c), Value::Long(7));
}

#[test]
fn test_reference_cycle_is_fatal() {
    let mut w = program();
    let a = w.slot(&[tag::NONE]);
    let b = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::Refer, &[a, b])
        .op(OpCode::Refer, &[b, a]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::ReferenceCycle(slot)) if slot == b));
}

#[test]
fn test_declared_value_slot_cannot_become_reference() {
    let mut w = program();
    let (a, ka) = literal(&mut w, Value::Long(5));
    let d = w.slot(&[tag::LONG]);
    let main = entry()
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::Refer, &[d, a]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::NotAReference(slot)) if slot == d));
}

#[test]
fn test_declared_reference_checks_referent_type() {
    let mut w = program();
    let (s, ks) = literal(&mut w, Value::Str("text".into()));
    let r = w.slot(&[tag::REF, tag::LONG]);
    let main = entry()
        .op(OpCode::LoadConst, &[s, ks])
        .op(OpCode::Refer, &[r, s]);

    let result = execute(w, main);
    assert!(matches!(
        result,
        Err(VmError::ReferenceTypeMismatch {
            declared: tag::LONG,
            got: tag::STRING
        })
    ));
}

#[test]
fn test_unbound_reference_read_is_fatal() {
    let mut w = program();
    let r = w.slot(&[tag::REF, tag::LONG]);
    let out = w.slot(&[tag::NONE]);
    let main = entry().op(OpCode::Add, &[out, r, r]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::UnboundReference(slot)) if slot == r));
}

#[test]
fn test_convert_between_numbers_and_strings() {
    let mut w = program();
    let (n, kn) = literal(&mut w, Value::Long(42));
    let (t, kt) = literal(&mut w, Value::Str(" 17 ".into()));
    let as_string = w.slot(&[tag::STRING]);
    let as_long = w.slot(&[tag::LONG]);
    let as_byte = w.slot(&[tag::BYTE]);
    let untyped = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[n, kn])
        .op(OpCode::LoadConst, &[t, kt])
        .op(OpCode::Convert, &[as_string, n])
        .op(OpCode::Convert, &[as_long, t])
        .op(OpCode::Convert, &[as_byte, n])
        .op(OpCode::Convert, &[untyped, t]);

    let vm = execute(w, main).unwrap();
    assert_eq!(read(&vm, as_string), Value::Str("42".into()));
    assert_eq!(read(&vm, as_long), Value::Long(17));
    assert_eq!(read(&vm, as_byte), Value::Byte(42));
    assert_eq!(read(&vm, untyped), Value::Str(" 17 ".into()));
}

#[test]
fn test_convert_unparseable_string_is_fatal() {
    let mut w = program();
    let (t, kt) = literal(&mut w, Value::Str("seven".into()));
    let n = w.slot(&[tag::LONG]);
    let main = entry()
        .op(OpCode::LoadConst, &[t, kt])
        .op(OpCode::Convert, &[n, t]);

    assert!(matches!(execute(w, main), Err(VmError::TypeError { .. })));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_equal_copies_the_value(first in any::<i64>(), second in any::<i64>()) {
        let mut w = program();
        let k1 = w.constant(Value::Long(first));
        let k2 = w.constant(Value::Long(second));
        let a = w.slot(&[tag::NONE]);
        let b = w.slot(&[tag::NONE]);
        let main = entry()
            .op(OpCode::LoadConst, &[a, k1])
            .op(OpCode::Equal, &[b, a])
            .op(OpCode::LoadConst, &[a, k2]);

        let vm = execute(w, main).unwrap();
        prop_assert_eq!(read(&vm, b), Value::Long(first));
        prop_assert_eq!(read(&vm, a), Value::Long(second));
    }
}

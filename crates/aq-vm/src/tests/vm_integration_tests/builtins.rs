use super::helpers::*;

/// Call builtin `name` on `arg` and return the return slot's value and the
/// printed text
fn call_builtin(name: &str, arg: Value) -> Result<(Value, String), VmError> {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str(name.into()));
    let (a, ka) = literal(&mut w, arg);
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(f, &[r, a]);
    w.class(ClassWriter::new(START_CLASS).method(main));

    let out = SharedBuffer::default();
    let vm = run_in(VM::new().with_output(out.clone()), &w)?;
    Ok((read(&vm, r), out.text()))
}

#[test]
fn test_print_writes_and_returns_length() {
    let (written, text) = call_builtin("__builtin_print", Value::Str("hello".into())).unwrap();
    assert_eq!(text, "hello");
    assert_eq!(written, Value::Long(5));

    let (written, text) = call_builtin("__builtin_print", Value::Long(-42)).unwrap();
    assert_eq!(text, "-42");
    assert_eq!(written, Value::Long(3));
}

#[test]
fn test_abs() {
    let cases = [
        (Value::Long(-5), Value::Long(5)),
        (Value::Byte(-7), Value::Byte(7)),
        (Value::Byte(i8::MIN), Value::Long(128)),
        (Value::Long(i64::MIN), Value::U64(1 << 63)),
        (Value::Double(-2.5), Value::Double(2.5)),
        (Value::U64(3), Value::U64(3)),
    ];
    for (input, expected) in cases {
        let (result, _) = call_builtin("__builtin_abs", input.clone()).unwrap();
        assert_eq!(result, expected, "abs({:?})", input);
    }
}

#[test]
fn test_abs_rejects_strings() {
    let result = call_builtin("__builtin_abs", Value::Str("-1".into()));
    assert!(matches!(result, Err(VmError::TypeError { .. })));
}

#[test]
fn test_builtin_arity_is_checked() {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str("__builtin_print".into()));
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .invoke(f, &[r]);

    let result = execute(w, main);
    assert!(matches!(
        result,
        Err(VmError::ArityMismatch {
            expected: 2,
            got: 1,
            ..
        })
    ));
}

#[test]
fn test_builtins_shadow_program_functions() {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str("__builtin_abs".into()));
    let (a, ka) = literal(&mut w, Value::Long(-3));
    let k99 = w.constant(Value::Long(99));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let x = w.slot(&[tag::NONE]);

    let shadowed = MethodWriter::new("__builtin_abs")
        .params(&[ret, x])
        .op(OpCode::LoadConst, &[ret, k99]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(f, &[r, a]);

    let vm = execute_start(
        w,
        ClassWriter::new(START_CLASS).method(main).method(shadowed),
    )
    .unwrap();
    assert_eq!(read(&vm, r), Value::Long(3));
}

#[test]
fn test_invoke_method_reaches_builtins() {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str("__builtin_abs".into()));
    let (a, ka) = literal(&mut w, Value::Double(-0.5));
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke_method(0, f, &[r, a]);

    let vm = execute(w, main).unwrap();
    assert_eq!(read(&vm, r), Value::Double(0.5));
}

fn triple(vm: &mut VM, args: &[Slot]) -> Result<(), VmError> {
    let value = vm.store_mut().get_long(args[1])?;
    vm.store_mut().set_long(args[0], value * 3)
}

#[test]
fn test_host_registered_builtin() {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str("triple".into()));
    let (a, ka) = literal(&mut w, Value::Byte(14));
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(f, &[r, a]);
    w.class(ClassWriter::new(START_CLASS).method(main));

    let mut vm = VM::new().with_output(std::io::sink());
    vm.register_builtin("triple", triple, 1);
    let vm = run_in(vm, &w).unwrap();
    assert_eq!(read(&vm, r), Value::Long(42));
}

#[test]
fn test_print_rejects_arrays() {
    let mut w = program();
    let (f, kf) = literal(&mut w, Value::Str("__builtin_print".into()));
    let (size, ksize) = literal(&mut w, Value::Long(1));
    let arr = w.slot(&[tag::NONE]);
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[f, kf])
        .op(OpCode::LoadConst, &[size, ksize])
        .op(OpCode::New, &[arr, size, 0])
        .invoke(f, &[r, arr]);

    assert!(matches!(execute(w, main), Err(VmError::Builtin { .. })));
}

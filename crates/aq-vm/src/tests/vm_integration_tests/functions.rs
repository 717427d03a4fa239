use super::helpers::*;
use crate::config::VmConfig;

/// Program whose top-level class holds `main` plus `functions`
fn with_functions(mut w: ModuleWriter, main: MethodWriter, functions: Vec<MethodWriter>) -> ModuleWriter {
    let class = functions
        .into_iter()
        .fold(ClassWriter::new(START_CLASS).method(main), |class, f| {
            class.method(f)
        });
    w.class(class);
    w
}

fn run(w: &ModuleWriter) -> Result<VM, VmError> {
    run_in(VM::new().with_output(std::io::sink()), w)
}

#[test]
fn test_invoke_returns_through_first_slot() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("add".into()));
    let (a, ka) = literal(&mut w, Value::Long(2));
    let (b, kb) = literal(&mut w, Value::Long(3));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let x = w.slot(&[tag::NONE]);
    let y = w.slot(&[tag::NONE]);

    let add = MethodWriter::new("add")
        .params(&[ret, x, y])
        .op(OpCode::Add, &[ret, x, y]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::LoadConst, &[b, kb])
        .invoke(name, &[r, a, b]);

    let vm = run(&with_functions(w, main, vec![add])).unwrap();
    assert_eq!(read(&vm, r), Value::Long(5));
    assert_eq!(read(&vm, a), Value::Long(2));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_value_parameter_is_a_copy() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("clobber".into()));
    let (a, ka) = literal(&mut w, Value::Long(2));
    let k9 = w.constant(Value::Long(9));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let p = w.slot(&[tag::NONE]);

    let clobber = MethodWriter::new("clobber")
        .params(&[ret, p])
        .op(OpCode::LoadConst, &[p, k9]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(name, &[r, a]);

    let vm = run(&with_functions(w, main, vec![clobber])).unwrap();
    assert_eq!(read(&vm, a), Value::Long(2));
    assert_eq!(read(&vm, r), Value::None);
}

#[test]
fn test_reference_parameter_aliases_argument() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("inc".into()));
    let (a, ka) = literal(&mut w, Value::Long(4));
    let k1 = w.constant(Value::Long(1));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let p = w.slot(&[tag::REF, tag::LONG]);
    let one = w.slot(&[tag::NONE]);

    let inc = MethodWriter::new("inc")
        .params(&[ret, p])
        .op(OpCode::LoadConst, &[one, k1])
        .op(OpCode::Add, &[p, p, one]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(name, &[r, a])
        .invoke(name, &[r, a]);

    let vm = run(&with_functions(w, main, vec![inc])).unwrap();
    assert_eq!(read(&vm, a), Value::Long(6));
}

#[test]
fn test_const_reference_parameter_rejects_writes() {
    for tags in [&[tag::REF, tag::CONST, tag::LONG][..], &[tag::CONST, tag::LONG][..]] {
        let mut w = program();
        let (name, kname) = literal(&mut w, Value::Str("inc".into()));
        let (a, ka) = literal(&mut w, Value::Long(4));
        let r = w.slot(&[tag::NONE]);
        let ret = w.slot(&[tag::NONE]);
        let p = w.slot(tags);

        let inc = MethodWriter::new("inc")
            .params(&[ret, p])
            .op(OpCode::Add, &[p, p, p]);
        let main = entry()
            .op(OpCode::LoadConst, &[name, kname])
            .op(OpCode::LoadConst, &[a, ka])
            .invoke(name, &[r, a]);

        let result = run(&with_functions(w, main, vec![inc]));
        assert!(
            matches!(result, Err(VmError::ConstViolation(slot)) if slot == p),
            "formal declared {:?}",
            tags
        );
    }
}

#[test]
fn test_variadic_collects_rest_into_array() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("show".into()));
    let (print, kprint) = literal(&mut w, Value::Str("__builtin_vaprint".into()));
    let (a, ka) = literal(&mut w, Value::Long(1));
    let (b, kb) = literal(&mut w, Value::Long(22));
    let (c, kc) = literal(&mut w, Value::Str("x".into()));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let rest = w.slot(&[tag::NONE]);

    let show = MethodWriter::new("show")
        .variadic()
        .params(&[ret, rest])
        .op(OpCode::LoadConst, &[print, kprint])
        .invoke(print, &[ret, rest]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[a, ka])
        .op(OpCode::LoadConst, &[b, kb])
        .op(OpCode::LoadConst, &[c, kc])
        .invoke(name, &[r, a, b, c]);

    let out = SharedBuffer::default();
    let w = with_functions(w, main, vec![show]);
    let vm = run_in(VM::new().with_output(out.clone()), &w).unwrap();
    assert_eq!(out.text(), "122x");
    assert_eq!(read(&vm, r), Value::Long(4));
}

#[test]
fn test_variadic_accepts_empty_rest() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("show".into()));
    let (print, kprint) = literal(&mut w, Value::Str("__builtin_vaprint".into()));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let rest = w.slot(&[tag::NONE]);

    let show = MethodWriter::new("show")
        .variadic()
        .params(&[ret, rest])
        .op(OpCode::LoadConst, &[print, kprint])
        .invoke(print, &[ret, rest]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .invoke(name, &[r]);

    let vm = run(&with_functions(w, main, vec![show])).unwrap();
    assert_eq!(read(&vm, r), Value::Long(0));
}

#[test]
fn test_argument_count_must_match() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("add".into()));
    let (a, ka) = literal(&mut w, Value::Long(2));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let x = w.slot(&[tag::NONE]);
    let y = w.slot(&[tag::NONE]);

    let add = MethodWriter::new("add")
        .params(&[ret, x, y])
        .op(OpCode::Add, &[ret, x, y]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[a, ka])
        .invoke(name, &[r, a]);

    let result = run(&with_functions(w, main, vec![add]));
    assert!(matches!(
        result,
        Err(VmError::ArityMismatch {
            expected: 3,
            got: 2,
            ..
        })
    ));
}

#[test]
fn test_unknown_function_is_fatal() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("missing".into()));
    let r = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .invoke(name, &[r]);

    let result = execute(w, main);
    assert!(matches!(result, Err(VmError::FunctionNotFound(f)) if f == "missing"));
}

#[test]
fn test_recursion_limit() {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("down".into()));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);

    let down = MethodWriter::new("down")
        .params(&[ret])
        .op(OpCode::LoadConst, &[name, kname])
        .invoke(name, &[ret]);
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .invoke(name, &[r]);
    let w = with_functions(w, main, vec![down]);

    let config = VmConfig {
        max_call_depth: 16,
        ..VmConfig::default()
    };
    let mut vm = VM::with_config(config).with_output(std::io::sink());
    let result = vm.run(&w.finish());
    assert!(matches!(result, Err(VmError::CallDepthExceeded(16))));
    assert_eq!(vm.depth(), 0);
}

#[test]
fn test_recursive_factorial() {
    // fact(n) = n < 2 ? 1 : n * fact(n - 1)
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str("fact".into()));
    let (n0, kn0) = literal(&mut w, Value::Long(10));
    let k1 = w.constant(Value::Long(1));
    let k2 = w.constant(Value::Long(2));
    let r = w.slot(&[tag::NONE]);
    let ret = w.slot(&[tag::NONE]);
    let n = w.slot(&[tag::NONE]);
    let one = w.slot(&[tag::NONE]);
    let two = w.slot(&[tag::NONE]);
    let cond = w.slot(&[tag::NONE]);
    let m = w.slot(&[tag::NONE]);

    // Every activation shares the module heap. A call to fact(k) leaves k in
    // `n`, so the caller restores its own `n` by adding one.
    let fact = MethodWriter::new("fact")
        .params(&[ret, n])
        .op(OpCode::LoadConst, &[name, kname]) // 0
        .op(OpCode::LoadConst, &[one, k1]) // 1
        .op(OpCode::LoadConst, &[two, k2]) // 2
        .op(OpCode::Cmp, &[cond, 4, n, two]) // 3
        .op(OpCode::If, &[cond, 5, 7]) // 4
        .op(OpCode::Equal, &[ret, one]) // 5
        .op(OpCode::If, &[one, 12, 12]) // 6
        .op(OpCode::Sub, &[m, n, one]) // 7
        .invoke(name, &[ret, m]) // 8
        .op(OpCode::LoadConst, &[one, k1]) // 9
        .op(OpCode::Add, &[n, n, one]) // 10
        .op(OpCode::Mul, &[ret, ret, n]); // 11
    let main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[n0, kn0])
        .invoke(name, &[r, n0]);

    let vm = run(&with_functions(w, main, vec![fact])).unwrap();
    assert_eq!(read(&vm, r), Value::Long(3_628_800));
}

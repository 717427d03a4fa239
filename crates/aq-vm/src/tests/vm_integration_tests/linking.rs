use super::helpers::*;
use crate::config::VmConfig;
use crate::registry::{MemorySource, ModuleSource};

/// Library module `b.aqbc`:
///
/// - class `Foo { v: long }` whose constructor sets `v` to 7
/// - top-level `quad(x) = 4 * x` and `eight(x) = quad(x) + quad(x)`
fn library() -> Vec<u8> {
    let mut w = program();
    let kv = w.constant(Value::Str("v".into()));
    let k7 = w.constant(Value::Long(7));
    let k4 = w.constant(Value::Long(4));
    let kquad = w.constant(Value::Str("quad".into()));
    let ret = w.slot(&[tag::NONE]);
    let x = w.slot(&[tag::NONE]);
    let four = w.slot(&[tag::NONE]);
    let name = w.slot(&[tag::NONE]);
    let t = w.slot(&[tag::NONE]);
    let member = w.slot(&[tag::NONE]);

    w.class(
        ClassWriter::new("Foo").member("v", &[tag::LONG]).method(
            MethodWriter::new("@constructor")
                .op(OpCode::LoadConst, &[name, kv])
                .op(OpCode::LoadMember, &[member, 0, name])
                .op(OpCode::LoadConst, &[member, k7]),
        ),
    );
    w.class(
        ClassWriter::new(START_CLASS)
            .method(
                MethodWriter::new("quad")
                    .params(&[ret, x])
                    .op(OpCode::LoadConst, &[four, k4])
                    .op(OpCode::Mul, &[ret, x, four]),
            )
            .method(
                MethodWriter::new("eight")
                    .params(&[ret, x])
                    .op(OpCode::LoadConst, &[name, kquad])
                    .invoke(name, &[t, x])
                    .op(OpCode::Add, &[ret, t, t]),
            ),
    );
    w.finish()
}

/// Program that allocates `count` instances of `class` into `obj`
fn allocate(class: &str, count: usize) -> (ModuleWriter, usize) {
    let mut w = program();
    let (name, kname) = literal(&mut w, Value::Str(class.into()));
    let (zero, kzero) = literal(&mut w, Value::Long(0));
    let obj = w.slot(&[tag::NONE]);
    let mut main = entry()
        .op(OpCode::LoadConst, &[name, kname])
        .op(OpCode::LoadConst, &[zero, kzero]);
    for _ in 0..count {
        main = main.op(OpCode::New, &[obj, zero, name]);
    }
    w.class(ClassWriter::new(START_CLASS).method(main));
    (w, obj)
}

fn member_v(vm: &VM, obj: usize) -> Value {
    let Value::Instance(instance) = read(vm, obj) else {
        panic!("slot {} holds no instance", obj);
    };
    vm.store().value(Slot::new(instance, 1)).unwrap()
}

#[test]
fn test_qualified_class_loads_module_once() {
    let source = MemorySource::new();
    source.insert("b.aqbc", library());
    let (w, obj) = allocate("~b.aqbc~Foo", 2);

    let vm = run_in(VM::new().with_source(source.clone()), &w).unwrap();
    assert_eq!(member_v(&vm, obj), Value::Long(7));
    assert_eq!(source.load_count("b.aqbc"), 1);
    assert!(vm.registry().is_loaded("b.aqbc"));
}

#[test]
fn test_module_classes_are_qualified() {
    let source = MemorySource::new();
    source.insert("b.aqbc", library());
    let (w, _) = allocate("Foo", 1);

    let result = run_in(VM::new().with_source(source), &w);
    assert!(matches!(result, Err(VmError::ClassNotFound(name)) if name == "Foo"));
}

#[test]
fn test_module_top_level_functions() {
    let source = MemorySource::new();
    source.insert("b.aqbc", library());

    let mut w = program();
    let (class, kclass) = literal(&mut w, Value::Str("~b.aqbc~.!__start".into()));
    let (quad, kquad) = literal(&mut w, Value::Str("quad".into()));
    let (eight, keight) = literal(&mut w, Value::Str("eight".into()));
    let (zero, kzero) = literal(&mut w, Value::Long(0));
    let (x, kx) = literal(&mut w, Value::Long(5));
    let lib = w.slot(&[tag::NONE]);
    let r1 = w.slot(&[tag::NONE]);
    let r2 = w.slot(&[tag::NONE]);
    let main = entry()
        .op(OpCode::LoadConst, &[class, kclass])
        .op(OpCode::LoadConst, &[quad, kquad])
        .op(OpCode::LoadConst, &[eight, keight])
        .op(OpCode::LoadConst, &[zero, kzero])
        .op(OpCode::LoadConst, &[x, kx])
        .op(OpCode::New, &[lib, zero, class])
        .invoke_method(lib, quad, &[r1, x])
        .invoke_method(lib, eight, &[r2, x]);
    w.class(ClassWriter::new(START_CLASS).method(main));

    let vm = run_in(VM::new().with_source(source.clone()), &w).unwrap();
    assert_eq!(read(&vm, r1), Value::Long(20));
    assert_eq!(read(&vm, r2), Value::Long(40));
    assert_eq!(read(&vm, x), Value::Long(5));
    assert_eq!(source.load_count("b.aqbc"), 1);
}

#[test]
fn test_missing_module_is_a_load_error() {
    let (w, _) = allocate("~nowhere.aqbc~Foo", 1);
    let result = run_in(VM::new().with_source(MemorySource::new()), &w);

    let error = result.err().unwrap();
    assert!(matches!(error, VmError::Io { ref name, .. } if name == "nowhere.aqbc"));
    assert!(error.is_load_error());
}

#[test]
fn test_malformed_qualified_name() {
    let (w, _) = allocate("~broken", 1);
    let result = run_in(VM::new().with_source(MemorySource::new()), &w);
    assert!(matches!(result, Err(VmError::InvalidClassName(name)) if name == "~broken"));
}

#[test]
fn test_modules_read_from_module_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("b.aqbc"), library()).unwrap();
    let config = VmConfig {
        module_dir: dir.path().to_path_buf(),
        ..VmConfig::default()
    };
    let (w, obj) = allocate("~b.aqbc~Foo", 1);

    let vm = run_in(VM::with_config(config), &w).unwrap();
    assert_eq!(member_v(&vm, obj), Value::Long(7));
}

#[test]
fn test_memory_source_counts_misses() {
    let source = MemorySource::new();
    assert!(source.load("a.aqbc").is_err());
    assert!(source.load("a.aqbc").is_err());
    assert_eq!(source.load_count("a.aqbc"), 2);
}

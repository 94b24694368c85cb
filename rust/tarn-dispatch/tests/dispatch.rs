use tarn_core::diagnostics::Token;
use tarn_core::types::{TypeRegistry, ValueType};
use tarn_core::values::Value;
use tarn_dispatch::{make_function_trees, Argument, BuildError, Function, FunctionTable, Parameter, Signature, TypeSystem};

fn sig(params: &[(&str, &str)]) -> Signature {
    Signature::new(
        params
            .iter()
            .map(|(n, t)| if *t == "bling" { Parameter::bling(n) } else { Parameter::new(n, t) })
            .collect(),
    )
}

fn args(types: &[&str]) -> Vec<Argument> {
    types.iter().map(|t| Argument::of_type(t)).collect()
}

fn entry_for(table: &FunctionTable, name: &str, call: &[Argument]) -> Option<u32> {
    let ts = TypeSystem::with_builtins();
    let groups = make_function_trees(table, &ts).unwrap();
    groups[name].resolve(call, &ts).map(|f| f.entry)
}

// ─── Most specific wins ───

#[test]
fn e2e_specific_overload_beats_general() {
    let mut table = FunctionTable::new();
    table.add(Function::new("show", sig(&[("x", "int")]), 100));
    table.add(Function::new("show", sig(&[("x", "any")]), 200));
    assert_eq!(entry_for(&table, "show", &args(&["int"])), Some(100));
    assert_eq!(entry_for(&table, "show", &args(&["string"])), Some(200));
    assert_eq!(entry_for(&table, "show", &args(&["null"])), None);
}

#[test]
fn e2e_general_leaf_does_not_overwrite_specific() {
    let mut table = FunctionTable::new();
    table.add(Function::new("add", sig(&[("a", "int"), ("b", "int")]), 1));
    table.add(Function::new("add", sig(&[("a", "any"), ("b", "any")]), 2));
    assert_eq!(entry_for(&table, "add", &args(&["int", "int"])), Some(1));
    assert_eq!(entry_for(&table, "add", &args(&["int", "float"])), Some(2));
    assert_eq!(entry_for(&table, "add", &args(&["float", "int"])), Some(2));
    assert_eq!(entry_for(&table, "add", &args(&["int"])), None);
}

#[test]
fn e2e_nullable_any_catches_null() {
    let mut table = FunctionTable::new();
    table.add(Function::new("describe", sig(&[("x", "string")]), 1));
    table.add(Function::new("describe", sig(&[("x", "any?")]), 2));
    assert_eq!(entry_for(&table, "describe", &args(&["null"])), Some(2));
    assert_eq!(entry_for(&table, "describe", &args(&["string"])), Some(1));
}

#[test]
fn e2e_zero_arguments_need_an_empty_signature() {
    let ts = TypeSystem::with_builtins();
    let mut table = FunctionTable::new();
    table.add(Function::new("f", sig(&[("x", "int")]), 1));
    assert_eq!(table.find("f", &[], false, &ts).unwrap_err().code(), "sig");
    table.add(Function::new("f", Signature::default(), 2));
    assert_eq!(table.find("f", &[], false, &ts).unwrap().entry, 2);
}

// ─── Tuples and bling ───

#[test]
fn e2e_trailing_tuple_absorbs_arguments() {
    let mut table = FunctionTable::new();
    table.add(Function::new("log", sig(&[("level", "int"), ("items", "tuple")]), 7));
    assert_eq!(entry_for(&table, "log", &args(&["int"])), Some(7));
    assert_eq!(entry_for(&table, "log", &args(&["int", "string", "bool"])), Some(7));
    assert_eq!(entry_for(&table, "log", &args(&["string"])), None);
}

#[test]
fn e2e_bling_selects_overload() {
    let mut table = FunctionTable::new();
    table.add(Function::new("move", sig(&[("x", "int"), ("to", "bling"), ("y", "int")]), 1));
    table.add(Function::new("move", sig(&[("x", "int"), ("from", "bling"), ("y", "int")]), 2));
    let to = vec![Argument::of_type("int"), Argument::bling("to"), Argument::of_type("int")];
    let from = vec![Argument::of_type("int"), Argument::bling("from"), Argument::of_type("int")];
    let neither = vec![Argument::of_type("int"), Argument::bling("by"), Argument::of_type("int")];
    assert_eq!(entry_for(&table, "move", &to), Some(1));
    assert_eq!(entry_for(&table, "move", &from), Some(2));
    assert_eq!(entry_for(&table, "move", &neither), None);
}

#[test]
fn e2e_arguments_from_runtime_values() {
    let mut reg = TypeRegistry::new();
    let color = reg.add_enum("Color", "", &["RED", "BLUE"], false);
    let mut ts = TypeSystem::with_builtins();
    ts.add_user_type("Color", &[]);
    let mut table = FunctionTable::new();
    table.add(Function::new("paint", sig(&[("c", "Color")]), 5));
    table.add(Function::new("paint", sig(&[("c", "any")]), 6));
    let groups = make_function_trees(&table, &ts).unwrap();
    let red = Argument::from_value(&Value::enum_element(color, 0), &reg);
    let one = Argument::from_value(&Value::int(1), &reg);
    assert_eq!(groups["paint"].resolve(&[red], &ts).map(|f| f.entry), Some(5));
    assert_eq!(groups["paint"].resolve(&[one], &ts).map(|f| f.entry), Some(6));
    let kw = Argument::from_value(&Value::bling("to"), &reg);
    assert_eq!(kw, Argument::bling("to"));
    assert_eq!(reg.declone(color), color);
    assert!(color >= ValueType::FIRST_USER);
}

// ─── Reference prefixes ───

#[test]
fn e2e_ref_prefix_is_recorded() {
    let mut table = FunctionTable::new();
    table.add(Function::new("inc", sig(&[("x", "ref"), ("n", "int")]), 1));
    table.add(Function::new("inc", sig(&[("x", "ref"), ("n", "float")]), 2));
    let groups = make_function_trees(&table, &TypeSystem::with_builtins()).unwrap();
    assert_eq!(groups["inc"].ref_count, 1);
}

#[test]
fn e2e_mismatched_ref_prefix_is_fatal() {
    let mut table = FunctionTable::new();
    table.add(Function::new("inc", sig(&[("x", "ref"), ("n", "int")]), 1));
    table.add(Function::new("inc", sig(&[("n", "float")]), 2).at(Token::new("inc", 4, 1, "lib.tn")));
    let err = make_function_trees(&table, &TypeSystem::with_builtins()).unwrap_err();
    let BuildError::RefPrefix { expected, found, token, .. } = err;
    assert_eq!((expected, found), (1, 0));
    assert_eq!(token.line, 4);
}

// ─── Outline ───

#[test]
fn e2e_outline_lists_edges() {
    let mut table = FunctionTable::new();
    table.add(Function::new("f", sig(&[("x", "int")]), 1));
    table.add(Function::new("f", sig(&[("x", "string")]), 2));
    let groups = make_function_trees(&table, &TypeSystem::with_builtins()).unwrap();
    let outline = groups["f"].tree.outline();
    assert_eq!(outline, "\nint -> f(x int)\nstring -> f(x string)");
}

/*!
 * Limits Tests
 * Hostile sources fail with structured errors instead of exhausting the host
 */

use desk_kernel::sandbox::parser::MAX_NESTING;
use desk_kernel::sandbox::{Cancellation, CompileError, Engine, RuntimeError, Value};
use std::thread;
use std::time::Duration;

fn assert_too_deep(source: &str) {
    match Engine::new().compile(source) {
        Err(CompileError::Invalid { message, .. }) => assert!(message.contains("nesting")),
        other => panic!("expected a nesting error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_deep_array_literal() {
    let depth = 200_000;
    assert_too_deep(&format!("let x = {}1{};", "[".repeat(depth), "]".repeat(depth)));
}

#[test]
fn test_deep_blocks_and_prefix_operators() {
    let depth = 200_000;
    assert_too_deep(&format!("{}{}", "{".repeat(depth), "}".repeat(depth)));
    assert_too_deep(&format!("let x = {}true;", "!".repeat(depth)));
    assert_too_deep(&format!("let x = {}1{};", "(".repeat(depth), ")".repeat(depth)));
}

#[test]
fn test_long_operator_chain() {
    assert_too_deep(&format!("let x = 1{};", " + 1".repeat(200_000)));
    assert_too_deep(&format!("let x = a{};", ".b".repeat(200_000)));
}

#[test]
fn test_ordinary_nesting_still_compiles() {
    let depth = MAX_NESTING / 4;
    let source = format!(
        "let x = {}1{}; let y = 1{};",
        "[".repeat(depth),
        "]".repeat(depth),
        " + 1".repeat(depth)
    );
    assert!(Engine::new().compile(&source).is_ok());
}

#[test]
fn test_cancellation_from_another_thread() {
    let engine = Engine::new();
    let factory = engine
        .compile("fn spin(n) { if (n > 0) { spin(n - 1); spin(n - 1); } }")
        .unwrap();
    let cancel = Cancellation::new();
    let module = factory
        .load_cancellable(&Value::empty_object(), cancel.clone())
        .unwrap();

    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        cancel.cancel();
    });
    let spin = module.binding("spin").unwrap();
    let err = module.call(&spin, vec![Value::Number(60.0)]).err();
    stopper.join().unwrap();
    assert_eq!(err, Some(RuntimeError::Cancelled));
}

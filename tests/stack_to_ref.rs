mod harness;

use harness::{instructions, static_field, static_method, TestHarness};
use kasm_ir::jvm::*;
use kasm_ir::refs::{LineNumber, LocalId};
use kasm_ir::stack::{Instruction, StackBodyBuilder};
use kasm_ir::util::ArenaKey;
use kasm_ir::{Error, ShapeErrorKind};

#[test]
fn constant_arithmetic() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    builder
        .push_all(vec![
            Instruction::Push(Constant::Int(1)),
            Instruction::Push(Constant::Int(2)),
            Instruction::Arithmetic(ArithmeticOp::Add, NumericType::Int),
            Instruction::Return(Some(JvmType::Int)),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(converted.lines(), vec!["return (1 + 2)"]);
    assert!(converted.locals.is_empty());
    assert_eq!(
        instructions(&harness.to_stack(&converted).unwrap()),
        instructions(&body)
    );
}

#[test]
fn repeated_loads_need_no_temporary() {
    let harness = TestHarness::new(vec![FieldType::int()]);
    let loads_twice = {
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        builder
            .push_all(vec![
                Instruction::Load(JvmType::Int, param),
                Instruction::Load(JvmType::Int, param),
                Instruction::Arithmetic(ArithmeticOp::Mul, NumericType::Int),
                Instruction::Return(Some(JvmType::Int)),
            ])
            .unwrap();
        builder.finish().unwrap()
    };
    let duplicates = {
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        builder
            .push_all(vec![
                Instruction::Load(JvmType::Int, param),
                Instruction::Dup,
                Instruction::Arithmetic(ArithmeticOp::Mul, NumericType::Int),
                Instruction::Return(Some(JvmType::Int)),
            ])
            .unwrap();
        builder.finish().unwrap()
    };

    for body in [loads_twice, duplicates] {
        let converted = harness.to_ref(&body).unwrap();
        assert_eq!(converted.lines(), vec!["return (l0 * l0)"]);
        assert_eq!(converted.locals.len(), 1);
    }
}

#[test]
fn duplicated_calls_run_once() {
    let harness = TestHarness::new(vec![]);
    let next = static_method("next", Some(FieldType::int()));
    let mut builder = StackBodyBuilder::new(false, 0);
    builder
        .push_all(vec![
            Instruction::Invoke(InvokeType::Static, next.clone()),
            Instruction::Dup,
            Instruction::Arithmetic(ArithmeticOp::Mul, NumericType::Int),
            Instruction::Return(Some(JvmType::Int)),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(
        converted.lines(),
        vec!["l0 = demo/Main.next()", "return (l0 * l0)"]
    );
    assert_eq!(
        converted.locals[LocalId::from_index(0)].ty,
        Some(FieldType::int())
    );

    let calls = instructions(&harness.to_stack(&converted).unwrap())
        .into_iter()
        .filter(|instruction| matches!(instruction, Instruction::Invoke(..)))
        .count();
    assert_eq!(calls, 1);
}

#[test]
fn dead_code_is_left_out() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    let (live, dead) = (builder.fresh_label(), builder.fresh_label());
    builder.place_label(live).unwrap();
    builder.line_number(live, 3);
    builder.push(Instruction::Push(Constant::Int(1))).unwrap();
    builder.push(Instruction::Return(Some(JvmType::Int))).unwrap();
    builder.place_label(dead).unwrap();
    builder.line_number(dead, 9);
    builder.push(Instruction::Push(Constant::Int(2))).unwrap();
    builder.push(Instruction::Return(Some(JvmType::Int))).unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(converted.lines(), vec!["return 1"]);
    let first = converted.statements.first().unwrap();
    assert_eq!(
        converted.line_numbers,
        vec![LineNumber {
            start: first,
            line: 3
        }]
    );
}

#[test]
fn caught_exceptions_get_a_local() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    let local = builder.new_local();
    let (start, end, handler) = (
        builder.fresh_label(),
        builder.fresh_label(),
        builder.fresh_label(),
    );
    builder.place_label(start).unwrap();
    builder
        .push(Instruction::Invoke(
            InvokeType::Static,
            static_method("tick", None),
        ))
        .unwrap();
    builder.place_label(end).unwrap();
    builder.push(Instruction::Return(None)).unwrap();
    builder.place_label(handler).unwrap();
    builder
        .push_all(vec![
            Instruction::Store(JvmType::Reference, local),
            Instruction::Load(JvmType::Reference, local),
            Instruction::Throw,
        ])
        .unwrap();
    builder.try_catch(start, end, handler, None);
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(
        converted.lines(),
        vec!["demo/Main.tick()", "return", "l0 = l1", "throw l0"]
    );
    let statements: Vec<_> = converted.statements.keys().collect();
    let block = &converted.try_catch_blocks[0];
    assert_eq!(
        (block.first, block.last, block.handler),
        (statements[0], statements[0], statements[2])
    );
    assert_eq!(block.local, LocalId::from_index(1));
    let throwable = Some(FieldType::object(BinaryName::THROWABLE));
    assert_eq!(converted.locals[block.local].ty, throwable);
    assert_eq!(converted.locals[LocalId::from_index(0)].ty, throwable);
}

#[test]
fn disjoint_uses_get_separate_locals() {
    // if (arg != 0) { s = "seven"; name = s } else { s = 7; count = s }
    let harness = TestHarness::new(vec![FieldType::int()]);
    let mut builder = StackBodyBuilder::new(false, 1);
    let param = builder.parameter_local(0).unwrap();
    let shared = builder.new_local();
    let other = builder.fresh_label();
    builder
        .push_all(vec![
            Instruction::Load(JvmType::Int, param),
            Instruction::If(OrdComparison::NE, other),
            Instruction::Push(Constant::Int(7)),
            Instruction::Store(JvmType::Int, shared),
            Instruction::Load(JvmType::Int, shared),
            Instruction::PutStatic(static_field("count", FieldType::int())),
            Instruction::Return(None),
        ])
        .unwrap();
    builder.place_label(other).unwrap();
    builder
        .push_all(vec![
            Instruction::Push(Constant::String(String::from("seven"))),
            Instruction::Store(JvmType::Reference, shared),
            Instruction::Load(JvmType::Reference, shared),
            Instruction::PutStatic(static_field(
                "name",
                FieldType::object(BinaryName::STRING),
            )),
            Instruction::Return(None),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(
        converted.lines(),
        vec![
            "if (l0 != 0) goto 4",
            "l1 = 7",
            "demo/Main.count = l1",
            "return",
            "l2 = \"seven\"",
            "demo/Main.name = l2",
            "return"
        ]
    );
    let types: Vec<_> = converted
        .locals
        .iter()
        .map(|(_, local)| local.ty.clone())
        .collect();
    assert_eq!(
        types,
        vec![
            Some(FieldType::int()),
            Some(FieldType::int()),
            Some(FieldType::object(BinaryName::STRING))
        ]
    );

    // Without partitioning, the local cannot be given a single type
    let raw = harness.to_raw_ref(&body).unwrap();
    assert_eq!(raw.locals.len(), 2);
    assert!(raw.locals[LocalId::from_index(1)].ty.is_none());
}

#[test]
fn malformed_bodies_are_reported() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    builder
        .push_all(vec![Instruction::Pop, Instruction::Return(None)])
        .unwrap();
    let error = harness.to_ref(&builder.finish().unwrap()).unwrap_err();
    assert!(matches!(
        error.root(),
        Error::StackShape {
            kind: ShapeErrorKind::EmptyStack,
            ..
        }
    ));
    assert!(error.to_string().starts_with("in demo/Main(): "));

    let mut builder = StackBodyBuilder::new(false, 0);
    builder.push(Instruction::Push(Constant::Int(1))).unwrap();
    let error = harness.to_ref(&builder.finish().unwrap()).unwrap_err();
    assert!(matches!(error.root(), Error::UnexpectedEnd { .. }));
}

/// `1 / 0` then `null.length`, both of which throw
fn throwing_pair() -> Vec<Instruction<kasm_ir::stack::Label>> {
    vec![
        Instruction::Push(Constant::Int(1)),
        Instruction::Push(Constant::Int(0)),
        Instruction::Arithmetic(ArithmeticOp::Div, NumericType::Int),
        Instruction::Push(Constant::Null),
        Instruction::ArrayLength,
    ]
}

#[test]
fn swapped_values_keep_their_evaluation_order() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    builder.push_all(throwing_pair()).unwrap();
    builder
        .push_all(vec![
            Instruction::Swap,
            Instruction::Arithmetic(ArithmeticOp::Sub, NumericType::Int),
            Instruction::Return(Some(JvmType::Int)),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let expected = vec!["l0 = (1 / 0)", "return (null.length - l0)"];
    assert_eq!(harness.to_raw_ref(&body).unwrap().lines(), expected);
    assert_eq!(harness.to_ref(&body).unwrap().lines(), expected);
}

#[test]
fn swapping_past_pure_values_needs_no_temporary() {
    let harness = TestHarness::new(vec![FieldType::int()]);
    let mut builder = StackBodyBuilder::new(false, 1);
    let param = builder.parameter_local(0).unwrap();
    builder
        .push_all(vec![
            Instruction::Load(JvmType::Int, param),
            Instruction::Push(Constant::Null),
            Instruction::ArrayLength,
            Instruction::Swap,
            Instruction::Arithmetic(ArithmeticOp::Sub, NumericType::Int),
            Instruction::Return(Some(JvmType::Int)),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_raw_ref(&body).unwrap();
    assert_eq!(converted.lines(), vec!["return (null.length - l0)"]);
    assert_eq!(converted.locals.len(), 1);
}

#[test]
fn values_duplicated_below_keep_their_evaluation_order() {
    let harness = TestHarness::new(vec![]);
    let mut builder = StackBodyBuilder::new(false, 0);
    builder.push_all(throwing_pair()).unwrap();
    builder
        .push_all(vec![
            Instruction::DupX1,
            Instruction::Arithmetic(ArithmeticOp::Sub, NumericType::Int),
            Instruction::Arithmetic(ArithmeticOp::Sub, NumericType::Int),
            Instruction::Return(Some(JvmType::Int)),
        ])
        .unwrap();
    let body = builder.finish().unwrap();

    let converted = harness.to_ref(&body).unwrap();
    assert_eq!(
        converted.lines(),
        vec![
            "l0 = (1 / 0)",
            "l1 = null.length",
            "return (l1 - (l0 - l1))"
        ]
    );
    let lowered = instructions(&harness.to_stack(&converted).unwrap());
    let division = lowered
        .iter()
        .position(|insn| matches!(insn, Instruction::Arithmetic(ArithmeticOp::Div, _)))
        .unwrap();
    let length = lowered
        .iter()
        .position(|insn| matches!(insn, Instruction::ArrayLength))
        .unwrap();
    assert!(division < length);
}

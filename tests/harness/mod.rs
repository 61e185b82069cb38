#![allow(dead_code)]

use kasm_ir::analysis::StackEmulator;
use kasm_ir::jvm::*;
use kasm_ir::refs::RefBody;
use kasm_ir::stack::{Instruction, StackBody};
use kasm_ir::{ref_to_stack, stack_to_ref, stack_to_ref_with, Error, Pipeline};

/// Converts the bodies of one method of `demo/Main` back and forth
pub struct TestHarness {
    owner: BinaryName,
    parameters: Vec<FieldType>,
}

impl TestHarness {
    pub fn new(parameters: Vec<FieldType>) -> TestHarness {
        let _ = env_logger::builder().is_test(true).try_init();
        TestHarness {
            owner: BinaryName::from_str("demo/Main").unwrap(),
            parameters,
        }
    }

    pub fn to_ref(&self, body: &StackBody) -> Result<RefBody, Error> {
        stack_to_ref(&self.owner, &self.parameters, body)
    }

    /// Convert without running any post-processing passes
    pub fn to_raw_ref(&self, body: &StackBody) -> Result<RefBody, Error> {
        stack_to_ref_with(&self.owner, &self.parameters, body, &Pipeline::new())
    }

    pub fn to_stack(&self, body: &RefBody) -> Result<StackBody, Error> {
        ref_to_stack(&self.owner, &self.parameters, body)
    }

    /// Convert to statements and back, checking the result still has consistent stack shapes
    pub fn round_trip(&self, body: &StackBody) -> Result<(RefBody, StackBody), Error> {
        let converted = self.to_ref(body)?;
        let lowered = self.to_stack(&converted)?;
        StackEmulator::run(&lowered)?;
        Ok((converted, lowered))
    }
}

/// Static method of `demo/Main` taking no arguments
pub fn static_method(name: &str, return_type: Option<FieldType>) -> MethodRef {
    MethodRef {
        owner: BinaryName::from_str("demo/Main").unwrap(),
        name: UnqualifiedName::from_str(name).unwrap(),
        descriptor: MethodDescriptor {
            parameters: vec![],
            return_type,
        },
        is_interface: false,
    }
}

pub fn static_field(name: &str, descriptor: FieldType) -> FieldRef {
    FieldRef {
        owner: BinaryName::from_str("demo/Main").unwrap(),
        name: UnqualifiedName::from_str(name).unwrap(),
        descriptor,
    }
}

pub fn instructions(body: &StackBody) -> Vec<Instruction> {
    body.instructions
        .iter()
        .map(|(_, instruction)| instruction.clone())
        .collect()
}

/// Stack shape before each instruction, in body order
pub fn shapes(body: &StackBody) -> Result<Vec<Option<Vec<JvmType>>>, Error> {
    let frames = StackEmulator::run(body)?;
    Ok(body
        .instructions
        .keys()
        .map(|insn| frames.before(insn).map(|stack| stack.to_vec()))
        .collect())
}

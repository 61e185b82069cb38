//! Conversions between stack bodies and ref bodies
//!
//! Converting to a ref body happens in two phases: a direct translation of the instructions,
//! followed by a [`Pipeline`] of post-processing passes which clean up temporaries, split locals
//! holding unrelated values, and assign every local a type.

mod passes;
mod ref2stack;
mod stack2ref;

pub use passes::*;

use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, RenderDescriptor};
use crate::refs::RefBody;
use crate::stack::StackBody;

/// Method whose body is being converted
#[derive(Clone, PartialEq, Debug)]
pub struct MethodContext {
    /// Class declaring the method (the type of `this`, if there is one)
    pub owner: BinaryName,

    /// Types of the parameters, not including `this`
    pub parameters: Vec<FieldType>,
}

impl MethodContext {
    pub fn new(owner: BinaryName, parameters: Vec<FieldType>) -> MethodContext {
        MethodContext { owner, parameters }
    }

    /// Owner and parameter descriptors, eg. `demo/Main(IJLjava/lang/String;)`
    pub fn describe(&self) -> String {
        let mut rendered = format!("{}(", self.owner);
        for parameter in &self.parameters {
            parameter.render_to(&mut rendered);
        }
        rendered.push(')');
        rendered
    }
}

/// Convert a stack body into a fully typed ref body, using the standard passes
pub fn stack_to_ref(
    owner: &BinaryName,
    parameters: &[FieldType],
    body: &StackBody,
) -> Result<RefBody, Error> {
    stack_to_ref_with(owner, parameters, body, &Pipeline::standard())
}

/// Convert a stack body into a ref body, post-processing it with a custom pipeline
pub fn stack_to_ref_with(
    owner: &BinaryName,
    parameters: &[FieldType],
    body: &StackBody,
    pipeline: &Pipeline,
) -> Result<RefBody, Error> {
    let context = MethodContext::new(owner.clone(), parameters.to_vec());
    log::debug!("Converting {} to statements", context.describe());

    let mut converted =
        stack2ref::convert(&context, body).map_err(|error| error.in_method(context.describe()))?;
    pipeline
        .run(&mut converted)
        .map_err(|error| error.in_method(context.describe()))?;
    Ok(converted)
}

/// Convert a ref body back into a stack body
pub fn ref_to_stack(
    owner: &BinaryName,
    parameters: &[FieldType],
    body: &RefBody,
) -> Result<StackBody, Error> {
    let context = MethodContext::new(owner.clone(), parameters.to_vec());
    log::debug!("Converting {} to instructions", context.describe());
    ref2stack::convert(&context, body).map_err(|error| error.in_method(context.describe()))
}

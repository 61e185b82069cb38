use super::ControlFlow;
use crate::errors::{Error, ShapeErrorKind};
use crate::jvm::*;
use crate::stack::{InsnId, Instruction, StackBody};
use crate::util::Width;
use std::collections::HashMap;
use std::fmt::Debug;

/// Stack contract of an instruction that does not shuffle the stack
#[derive(Clone, PartialEq, Debug)]
pub struct Signature {
    /// Types popped, listed from deepest to top of stack
    pub pops: Vec<JvmType>,
    pub push: Option<JvmType>,
}

impl Signature {
    fn new(pops: Vec<JvmType>, push: Option<JvmType>) -> Signature {
        Signature { pops, push }
    }
}

fn method_signature(
    receiver: bool,
    descriptor: &MethodDescriptor,
) -> Signature {
    let mut pops = vec![];
    if receiver {
        pops.push(JvmType::Reference);
    }
    pops.extend(descriptor.parameters.iter().map(JvmType::from));
    Signature::new(pops, descriptor.return_type.as_ref().map(JvmType::from))
}

/// Stack contract of an instruction
///
/// Returns `None` for the stack shuffles (`pop`, `dup`, `swap`, and variants), whose behaviour
/// depends on the widths of what is on the stack.
pub fn signature<T>(insn: &Instruction<T>) -> Option<Signature> {
    use Instruction::*;
    use JvmType::{Int, Long, Reference};

    let signature = match insn {
        Push(constant) => Signature::new(vec![], Some(constant.jvm_type())),
        Neg(ty) => {
            let ty = JvmType::from(*ty);
            Signature::new(vec![ty], Some(ty))
        }
        Arithmetic(_, ty) => {
            let ty = JvmType::from(*ty);
            Signature::new(vec![ty, ty], Some(ty))
        }
        Bitwise(_, ty) => {
            let ty = JvmType::from(*ty);
            Signature::new(vec![ty, ty], Some(ty))
        }
        Shift(_, ty) => {
            let ty = JvmType::from(*ty);
            Signature::new(vec![ty, Int], Some(ty))
        }
        LCmp => Signature::new(vec![Long, Long], Some(Int)),
        FCmp(_, ty) => {
            let ty = JvmType::from(*ty);
            Signature::new(vec![ty, ty], Some(Int))
        }
        NewArray { dimensions, .. } => {
            Signature::new(vec![Int; usize::from(*dimensions)], Some(Reference))
        }
        ArrayLength => Signature::new(vec![Reference], Some(Int)),
        ArrayLoad(element) => {
            Signature::new(vec![Reference, Int], Some(JvmType::from(*element)))
        }
        ArrayStore(element) => {
            Signature::new(vec![Reference, Int, JvmType::from(*element)], None)
        }
        Swap | Pop | Pop2 | Dup | DupX1 | DupX2 | Dup2 | Dup2X1 | Dup2X2 => return None,
        Load(ty, _) => Signature::new(vec![], Some(*ty)),
        Store(ty, _) => Signature::new(vec![*ty], None),
        Increment(_, _) => Signature::new(vec![], None),
        New(_) => Signature::new(vec![], Some(Reference)),
        InstanceOf(_) => Signature::new(vec![Reference], Some(Int)),
        PrimitiveCast { from, to } => {
            Signature::new(vec![JvmType::from(*from)], Some(JvmType::from(*to)))
        }
        CheckCast(_) => Signature::new(vec![Reference], Some(Reference)),
        Return(ty) => Signature::new(ty.iter().copied().collect(), None),
        Throw | MonitorEnter | MonitorExit => Signature::new(vec![Reference], None),
        GetField(field) => {
            Signature::new(vec![Reference], Some(JvmType::from(&field.descriptor)))
        }
        PutField(field) => {
            Signature::new(vec![Reference, JvmType::from(&field.descriptor)], None)
        }
        GetStatic(field) => Signature::new(vec![], Some(JvmType::from(&field.descriptor))),
        PutStatic(field) => Signature::new(vec![JvmType::from(&field.descriptor)], None),
        Invoke(invoke_type, method) => {
            method_signature(invoke_type.has_receiver(), &method.descriptor)
        }
        InvokeDynamic(call_site) => method_signature(false, &call_site.descriptor),
        Goto(_) => Signature::new(vec![], None),
        If(_, _) | Switch { .. } => Signature::new(vec![Int], None),
        IfICmp(_, _) => Signature::new(vec![Int, Int], None),
        IfACmp(_, _) => Signature::new(vec![Reference, Reference], None),
        IfNull(_, _) => Signature::new(vec![Reference], None),
    };
    Some(signature)
}

fn pop_stack<V>(stack: &mut Vec<V>) -> Result<V, ShapeErrorKind> {
    stack.pop().ok_or(ShapeErrorKind::EmptyStack)
}

fn pop_stack_expecting_width<V: Width>(
    stack: &mut Vec<V>,
    expected_width: usize,
) -> Result<V, ShapeErrorKind> {
    let value = pop_stack(stack)?;
    let found_width = value.width();
    if found_width == expected_width {
        Ok(value)
    } else {
        Err(ShapeErrorKind::InvalidWidth(found_width))
    }
}

/// Apply a stack shuffle to a stack of values
///
/// The form of the wider shuffles (eg. `dup2` duplicating one `long` versus two `int`s) is chosen
/// from the widths of the values on the stack. Instructions which are not shuffles are ignored.
pub fn shuffle<T, V: Clone + Width>(
    insn: &Instruction<T>,
    stack: &mut Vec<V>,
) -> Result<(), ShapeErrorKind> {
    use Instruction::*;

    match insn {
        Pop => {
            pop_stack_expecting_width(stack, 1)?;
        }

        Pop2 => {
            let arg1 = pop_stack(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    pop_stack_expecting_width(stack, 1)?;
                }

                // Form 2
                2 => (),

                other => return Err(ShapeErrorKind::InvalidWidth(other)),
            }
        }

        Dup => {
            let arg1 = pop_stack_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg1);
        }

        DupX1 => {
            let arg1 = pop_stack_expecting_width(stack, 1)?;
            let arg2 = pop_stack_expecting_width(stack, 1)?;
            stack.push(arg1.clone());
            stack.push(arg2);
            stack.push(arg1);
        }

        DupX2 => {
            let arg1 = pop_stack_expecting_width(stack, 1)?;
            let arg2 = pop_stack(stack)?;
            match arg2.width() {
                // Form 1
                1 => {
                    let arg3 = pop_stack_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(ShapeErrorKind::InvalidWidth(other)),
            }
        }

        Dup2 => {
            let arg1 = pop_stack(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_stack_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    stack.push(arg1.clone());
                    stack.push(arg1);
                }

                other => return Err(ShapeErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X1 => {
            let arg1 = pop_stack(stack)?;
            match arg1.width() {
                // Form 1
                1 => {
                    let arg2 = pop_stack_expecting_width(stack, 1)?;
                    let arg3 = pop_stack_expecting_width(stack, 1)?;
                    stack.push(arg2.clone());
                    stack.push(arg1.clone());
                    stack.push(arg3);
                    stack.push(arg2);
                    stack.push(arg1);
                }

                // Form 2
                2 => {
                    let arg2 = pop_stack_expecting_width(stack, 1)?;
                    stack.push(arg1.clone());
                    stack.push(arg2);
                    stack.push(arg1);
                }

                other => return Err(ShapeErrorKind::InvalidWidth(other)),
            }
        }

        Dup2X2 => {
            let arg1 = pop_stack(stack)?;
            match arg1.width() {
                1 => {
                    let arg2 = pop_stack_expecting_width(stack, 1)?;
                    let arg3 = pop_stack(stack)?;
                    match arg3.width() {
                        // Form 1
                        1 => {
                            let arg4 = pop_stack_expecting_width(stack, 1)?;
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg4);
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 3
                        2 => {
                            stack.push(arg2.clone());
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(ShapeErrorKind::InvalidWidth(other)),
                    }
                }

                2 => {
                    let arg2 = pop_stack(stack)?;
                    match arg2.width() {
                        // Form 2
                        1 => {
                            let arg3 = pop_stack_expecting_width(stack, 1)?;
                            stack.push(arg1.clone());
                            stack.push(arg3);
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        // Form 4
                        2 => {
                            stack.push(arg1.clone());
                            stack.push(arg2);
                            stack.push(arg1);
                        }

                        other => return Err(ShapeErrorKind::InvalidWidth(other)),
                    }
                }

                other => return Err(ShapeErrorKind::InvalidWidth(other)),
            }
        }

        Swap => {
            let arg1 = pop_stack_expecting_width(stack, 1)?;
            let arg2 = pop_stack_expecting_width(stack, 1)?;
            stack.push(arg1);
            stack.push(arg2);
        }

        _ => (),
    }
    Ok(())
}

/// Pop values matching the types in a signature
///
/// The values are returned from deepest to top of stack.
pub fn pop_expecting<V>(
    stack: &mut Vec<V>,
    expected: &[JvmType],
    type_of: impl Fn(&V) -> JvmType,
) -> Result<Vec<V>, ShapeErrorKind> {
    let mut popped = Vec::with_capacity(expected.len());
    for expected_type in expected.iter().rev() {
        let value = pop_stack(stack)?;
        let found = type_of(&value);
        if found != *expected_type {
            return Err(ShapeErrorKind::InvalidType {
                expected: *expected_type,
                found,
            });
        }
        popped.push(value);
    }
    popped.reverse();
    Ok(popped)
}

/// Update a stack shape to reflect the effects of an instruction
pub fn step<T>(insn: &Instruction<T>, stack: &mut Vec<JvmType>) -> Result<(), ShapeErrorKind> {
    match signature(insn) {
        None => shuffle(insn, stack),
        Some(Signature { pops, push }) => {
            pop_expecting(stack, &pops, |ty| *ty)?;
            if let Instruction::Throw = insn {
                stack.clear();
                stack.push(JvmType::Reference);
            } else if let Some(ty) = push {
                stack.push(ty);
            }
            Ok(())
        }
    }
}

/// Stack shapes before every reachable instruction
#[derive(Debug, Default)]
pub struct Frames {
    before: HashMap<InsnId, Vec<JvmType>>,
}

impl Frames {
    /// Stack shape right before the instruction executes (`None` for dead code)
    pub fn before(&self, insn: InsnId) -> Option<&[JvmType]> {
        self.before.get(&insn).map(|stack| stack.as_slice())
    }

    pub fn is_reachable(&self, insn: InsnId) -> bool {
        self.before.contains_key(&insn)
    }

    pub fn reachable_count(&self) -> usize {
        self.before.len()
    }
}

/// Forward abstract interpreter over stack shapes
///
/// Execution starts at the first instruction with an empty stack and at every handler (with just
/// the thrown exception on the stack) whose protected region contains a reachable instruction.
pub struct StackEmulator<'a> {
    body: &'a StackBody,
    frames: Frames,
    worklist: Vec<(InsnId, Vec<JvmType>)>,
}

impl<'a> StackEmulator<'a> {
    pub fn new(body: &'a StackBody) -> StackEmulator<'a> {
        StackEmulator {
            body,
            frames: Frames::default(),
            worklist: vec![],
        }
    }

    /// Compute the frames of a body
    pub fn run(body: &'a StackBody) -> Result<Frames, Error> {
        let mut emulator = StackEmulator::new(body);
        emulator.emulate()?;
        Ok(emulator.frames)
    }

    fn emulate(&mut self) -> Result<(), Error> {
        let regions = self.body.regions()?;
        if let Some(entry) = self.body.entry() {
            self.enqueue(entry, vec![])?;
        }

        loop {
            while let Some((insn, stack)) = self.worklist.pop() {
                self.visit(insn, stack)?;
            }

            for (covered, handler) in &regions {
                let live = covered.iter().any(|insn| self.frames.is_reachable(*insn));
                if live {
                    self.enqueue(*handler, vec![JvmType::Reference])?;
                }
            }
            if self.worklist.is_empty() {
                break;
            }
        }

        log::trace!(
            "Emulated {} of {} instructions",
            self.frames.reachable_count(),
            self.body.instructions.len()
        );
        Ok(())
    }

    /// Queue a visit, unless the instruction was already visited with the same stack
    fn enqueue(&mut self, insn: InsnId, stack: Vec<JvmType>) -> Result<(), Error> {
        match self.frames.before(insn) {
            None => {
                self.frames.before.insert(insn, stack.clone());
                self.worklist.push((insn, stack));
                Ok(())
            }
            Some(existing) if existing == stack.as_slice() => Ok(()),
            Some(existing) => Err(Error::StackShape {
                instruction: self.body.describe(insn),
                kind: ShapeErrorKind::IncompatibleShapes(existing.to_vec(), stack),
            }),
        }
    }

    fn visit(&mut self, insn: InsnId, mut stack: Vec<JvmType>) -> Result<(), Error> {
        let instruction = self
            .body
            .instructions
            .get(insn)
            .ok_or_else(|| Error::DanglingReference(insn.to_string()))?;
        step(instruction, &mut stack).map_err(|kind| Error::StackShape {
            instruction: self.body.describe(insn),
            kind,
        })?;
        for successor in self.body.successors(insn)? {
            self.enqueue(successor, stack.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack::StackBodyBuilder;
    use JvmType::*;

    fn shape_after(
        insns: Vec<Instruction>,
        start: Vec<JvmType>,
    ) -> Result<Vec<JvmType>, ShapeErrorKind> {
        let mut stack = start;
        for insn in &insns {
            step(insn, &mut stack)?;
        }
        Ok(stack)
    }

    #[test]
    fn wide_shuffles() {
        assert_eq!(
            shape_after(vec![Instruction::Dup2], vec![Int, Float]).unwrap(),
            vec![Int, Float, Int, Float]
        );
        assert_eq!(
            shape_after(vec![Instruction::Dup2], vec![Long]).unwrap(),
            vec![Long, Long]
        );
        assert_eq!(
            shape_after(vec![Instruction::Dup2X1], vec![Int, Double]).unwrap(),
            vec![Double, Int, Double]
        );
        assert_eq!(
            shape_after(vec![Instruction::Dup2X2], vec![Long, Double]).unwrap(),
            vec![Double, Long, Double]
        );
        assert_eq!(
            shape_after(vec![Instruction::DupX2], vec![Long, Int]).unwrap(),
            vec![Int, Long, Int]
        );
        assert_eq!(
            shape_after(vec![Instruction::Pop2], vec![Int, Int, Long]).unwrap(),
            vec![Int, Int]
        );
        assert!(matches!(
            shape_after(vec![Instruction::Pop], vec![Double]),
            Err(ShapeErrorKind::InvalidWidth(2))
        ));
        assert!(matches!(
            shape_after(vec![Instruction::Swap], vec![Int]),
            Err(ShapeErrorKind::EmptyStack)
        ));
    }

    #[test]
    fn typed_pops() {
        let insns = vec![
            Instruction::Push(Constant::Long(1)),
            Instruction::Push(Constant::Int(2)),
            Instruction::Shift(ShiftType::Left, IntegralType::Long),
        ];
        assert_eq!(shape_after(insns, vec![]).unwrap(), vec![Long]);
        assert!(matches!(
            shape_after(
                vec![Instruction::Arithmetic(ArithmeticOp::Add, NumericType::Int)],
                vec![Int, Float]
            ),
            Err(ShapeErrorKind::InvalidType {
                expected: Int,
                found: Float
            })
        ));
    }

    #[test]
    fn frames_with_handlers() {
        let mut builder = StackBodyBuilder::new(false, 0);
        let (start, end, handler) = (
            builder.fresh_label(),
            builder.fresh_label(),
            builder.fresh_label(),
        );
        builder.place_label(start).unwrap();
        builder.push(Instruction::Push(Constant::Int(1))).unwrap();
        builder.push(Instruction::Push(Constant::Int(0))).unwrap();
        builder
            .push(Instruction::Arithmetic(ArithmeticOp::Div, NumericType::Int))
            .unwrap();
        builder.push(Instruction::Return(Some(Int))).unwrap();
        builder.place_label(end).unwrap();
        builder.push(Instruction::Push(Constant::Null)).unwrap();
        builder.place_label(handler).unwrap();
        builder.push(Instruction::Throw).unwrap();
        builder.try_catch(start, end, handler, None);
        let body = builder.finish().unwrap();
        let ids: Vec<InsnId> = body.instructions.keys().collect();

        let frames = StackEmulator::run(&body).unwrap();
        assert_eq!(frames.before(ids[2]), Some(&[Int, Int][..]));
        assert_eq!(frames.before(ids[4]), None);
        assert_eq!(frames.before(ids[5]), Some(&[Reference][..]));
    }

    #[test]
    fn incompatible_join() {
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        let join = builder.fresh_label();
        builder.push(Instruction::Push(Constant::Int(1))).unwrap();
        builder.push(Instruction::Load(Int, param)).unwrap();
        builder.push(Instruction::If(OrdComparison::EQ, join)).unwrap();
        builder.push(Instruction::Pop).unwrap();
        builder.place_label(join).unwrap();
        builder.push(Instruction::Return(None)).unwrap();
        let body = builder.finish().unwrap();

        assert!(matches!(
            StackEmulator::run(&body),
            Err(Error::StackShape {
                kind: ShapeErrorKind::IncompatibleShapes(_, _),
                ..
            })
        ));
    }

    #[test]
    fn running_off_the_end() {
        let mut builder = StackBodyBuilder::new(false, 0);
        builder.push(Instruction::Push(Constant::Int(1))).unwrap();
        let body = builder.finish().unwrap();
        assert!(matches!(
            StackEmulator::run(&body),
            Err(Error::UnexpectedEnd { .. })
        ));
    }
}

//! Storage images, image atomics and stage barriers.

use spirv::{ImageOperands, Op};
use tessera_ir::{
    Barrier, Handle, ImageOp, Instruction, Operation, Scalar, ScalarKind, Type, UnaryOp,
};

use crate::ParseError;
use crate::builder::{Builder, InsertPoint};
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::SsaValue;
use crate::value::{ImagePointer, Value};

impl Builder<'_> {
    pub(crate) fn handle_image(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        match inst.op {
            Op::ImageTexelPointer => {
                let id = inst.word(2)?;
                let (image, _) = self.values.deref(inst.word(3)?)?;
                let image = image.clone();
                let coordinate = self.image_coordinate(inst.word(4)?)?;
                let sample = self.ssa_leaf(inst.word(5)?)?;
                self.values.push(
                    id,
                    Value::ImagePointer(ImagePointer {
                        image,
                        coordinate,
                        sample,
                    }),
                )
            }
            Op::ImageRead => {
                let (_, ty) = self.result_type(inst)?;
                let id = inst.word(2)?;
                let (image, _) = self.values.deref(inst.word(3)?)?;
                let image = image.clone();
                let coordinate = self.image_coordinate(inst.word(4)?)?;
                let sample = self.image_sample(inst, 5)?;
                let def = self.emit(
                    Operation::Image {
                        op: ImageOp::Load,
                        image,
                        coordinate,
                        sample,
                        args: Vec::new(),
                    },
                    ty,
                )?;
                let value = self.new_ssa(SsaValue::leaf(ty, def))?;
                self.push_ssa(id, value)
            }
            Op::ImageWrite => {
                let (image, _) = self.values.deref(inst.word(1)?)?;
                let image = image.clone();
                let coordinate = self.image_coordinate(inst.word(2)?)?;
                let texel = self.ssa_leaf(inst.word(3)?)?;
                let sample = self.image_sample(inst, 4)?;
                self.emit_void(Operation::Image {
                    op: ImageOp::Store,
                    image,
                    coordinate,
                    sample,
                    args: vec![texel],
                })?;
                Ok(())
            }
            other => Err(crate::malformed(format!("{other:?} is not an image instruction"))),
        }
    }

    /// A coordinate widened to four components by repeating its last one.
    fn image_coordinate(&mut self, id: u32) -> Result<Handle<Instruction>, ParseError> {
        let coordinate = self.ssa_leaf(id)?;
        let components = self.def_components(coordinate)?;
        let scalar = self.def_scalar(coordinate)?;
        let ty = self.vector_type(scalar, 4);
        let pattern = (0..4).map(|i| i.min(components - 1)).collect();
        self.emit(
            Operation::Swizzle {
                vector: coordinate,
                pattern,
            },
            ty,
        )
    }

    /// The `Sample` image operand at word `index`, or an undefined sample
    /// index when the operand is absent.
    fn image_sample(
        &mut self,
        inst: &SpvInstruction<'_>,
        index: usize,
    ) -> Result<Handle<Instruction>, ParseError> {
        if index < inst.count() {
            let mask = inst.word(index)?;
            if mask == ImageOperands::SAMPLE.bits() {
                return self.ssa_leaf(inst.word(index + 1)?);
            }
            if mask != 0 {
                return Err(crate::unsupported(format!(
                    "image operands {mask:#x} on a storage image"
                )));
            }
        }
        let ty = self.scalar_type(Scalar::I32);
        self.insert(InsertPoint::Preamble, Operation::Undef, Some(ty))
    }

    pub(crate) fn handle_atomic(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        // Every atomic but OpAtomicStore names its pointer in word 3.
        let pointer_word = if inst.op == Op::AtomicStore { 1 } else { 3 };
        let pointer_id = inst.word(pointer_word)?;
        let pointer = match *self.values.get_untyped(pointer_id)? {
            Value::ImagePointer(ref pointer) => pointer.clone(),
            _ => return Err(crate::unsupported("atomics on non-image memory")),
        };

        if inst.op == Op::AtomicStore {
            let value = self.ssa_leaf(inst.word(4)?)?;
            self.emit_void(Operation::Image {
                op: ImageOp::Store,
                image: pointer.image,
                coordinate: pointer.coordinate,
                sample: pointer.sample,
                args: vec![value],
            })?;
            return Ok(());
        }

        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;
        let (op, args) = match inst.op {
            Op::AtomicLoad => (ImageOp::Load, Vec::new()),
            Op::AtomicIIncrement => (ImageOp::AtomicAdd, vec![self.atomic_constant(ty, 1)?]),
            Op::AtomicIDecrement => (ImageOp::AtomicAdd, vec![self.atomic_constant(ty, u32::MAX)?]),
            Op::AtomicISub => {
                let value = self.ssa_leaf(inst.word(6)?)?;
                let negated = self.emit(
                    Operation::Unary {
                        op: UnaryOp::Negate,
                        kind: ScalarKind::Sint,
                        value,
                    },
                    ty,
                )?;
                (ImageOp::AtomicAdd, vec![negated])
            }
            Op::AtomicCompareExchange | Op::AtomicCompareExchangeWeak => {
                let value = self.ssa_leaf(inst.word(7)?)?;
                let comparator = self.ssa_leaf(inst.word(8)?)?;
                (ImageOp::AtomicCompareExchange, vec![comparator, value])
            }
            other => {
                let op = match other {
                    Op::AtomicExchange => ImageOp::AtomicExchange,
                    Op::AtomicIAdd => ImageOp::AtomicAdd,
                    Op::AtomicSMin => ImageOp::AtomicSMin,
                    Op::AtomicUMin => ImageOp::AtomicUMin,
                    Op::AtomicSMax => ImageOp::AtomicSMax,
                    Op::AtomicUMax => ImageOp::AtomicUMax,
                    Op::AtomicAnd => ImageOp::AtomicAnd,
                    Op::AtomicOr => ImageOp::AtomicOr,
                    Op::AtomicXor => ImageOp::AtomicXor,
                    _ => {
                        return Err(crate::malformed(format!(
                            "{other:?} is not an atomic instruction"
                        )));
                    }
                };
                (op, vec![self.ssa_leaf(inst.word(6)?)?])
            }
        };

        let def = self.emit(
            Operation::Image {
                op,
                image: pointer.image,
                coordinate: pointer.coordinate,
                sample: pointer.sample,
                args,
            },
            ty,
        )?;
        let value = self.new_ssa(SsaValue::leaf(ty, def))?;
        self.push_ssa(id, value)
    }

    fn atomic_constant(
        &mut self,
        ty: Handle<Type>,
        word: u32,
    ) -> Result<Handle<Instruction>, ParseError> {
        self.insert(InsertPoint::Preamble, Operation::Constant(vec![word]), Some(ty))
    }

    pub(crate) fn handle_barrier(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let op = match inst.op {
            Op::EmitVertex => Operation::EmitVertex { stream: 0 },
            Op::EndPrimitive => Operation::EndPrimitive { stream: 0 },
            Op::EmitStreamVertex => Operation::EmitVertex {
                stream: self.stream(inst)?,
            },
            Op::EndStreamPrimitive => Operation::EndPrimitive {
                stream: self.stream(inst)?,
            },
            Op::MemoryBarrier => Operation::Barrier(Barrier::Memory),
            Op::ControlBarrier => Operation::Barrier(Barrier::Control),
            other => return Err(crate::malformed(format!("{other:?} is not a barrier"))),
        };
        self.emit_void(op)?;
        Ok(())
    }

    fn stream(&self, inst: &SpvInstruction<'_>) -> Result<u32, ParseError> {
        let (_, constant) = self.values.constant(inst.word(1)?)?;
        self.scalar_constant(constant)
    }
}

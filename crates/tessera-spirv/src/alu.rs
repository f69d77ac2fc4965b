//! Arithmetic, logic, comparison and conversion instructions.

use spirv::Op;
use tessera_ir::{
    BinaryOp, DerivativeAxis, DerivativeControl, Handle, Instruction, MathFunction, Operation,
    RelationalFunction, ScalarKind, Type, UnaryOp,
};

use crate::ParseError;
use crate::builder::{Builder, InsertPoint};
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::SsaValue;

/// How a binary opcode maps onto the IR.
#[derive(Clone, Copy)]
enum Kind {
    /// The kind of the first operand.
    Operand,
    Fixed(ScalarKind),
}

fn binary_op(op: Op) -> Option<(BinaryOp, Kind)> {
    use ScalarKind::*;
    let fixed = Kind::Fixed;
    Some(match op {
        Op::IAdd => (BinaryOp::Add, Kind::Operand),
        Op::FAdd => (BinaryOp::Add, fixed(Float)),
        Op::ISub => (BinaryOp::Subtract, Kind::Operand),
        Op::FSub => (BinaryOp::Subtract, fixed(Float)),
        Op::IMul => (BinaryOp::Multiply, Kind::Operand),
        Op::FMul => (BinaryOp::Multiply, fixed(Float)),
        Op::UDiv => (BinaryOp::Divide, fixed(Uint)),
        Op::SDiv => (BinaryOp::Divide, fixed(Sint)),
        Op::FDiv => (BinaryOp::Divide, fixed(Float)),
        Op::UMod => (BinaryOp::Modulo, fixed(Uint)),
        Op::SMod => (BinaryOp::Modulo, fixed(Sint)),
        Op::FMod => (BinaryOp::Modulo, fixed(Float)),
        Op::SRem => (BinaryOp::Remainder, fixed(Sint)),
        Op::FRem => (BinaryOp::Remainder, fixed(Float)),

        Op::ShiftRightLogical => (BinaryOp::ShiftRight, fixed(Uint)),
        Op::ShiftRightArithmetic => (BinaryOp::ShiftRight, fixed(Sint)),
        Op::ShiftLeftLogical => (BinaryOp::ShiftLeft, Kind::Operand),
        Op::BitwiseOr => (BinaryOp::BitwiseOr, Kind::Operand),
        Op::BitwiseXor => (BinaryOp::BitwiseXor, Kind::Operand),
        Op::BitwiseAnd => (BinaryOp::BitwiseAnd, Kind::Operand),

        Op::LogicalOr => (BinaryOp::LogicalOr, fixed(Bool)),
        Op::LogicalAnd => (BinaryOp::LogicalAnd, fixed(Bool)),
        Op::LogicalEqual => (BinaryOp::Equal, fixed(Bool)),
        Op::LogicalNotEqual => (BinaryOp::NotEqual, fixed(Bool)),

        Op::IEqual => (BinaryOp::Equal, Kind::Operand),
        Op::INotEqual => (BinaryOp::NotEqual, Kind::Operand),
        Op::ULessThan => (BinaryOp::Less, fixed(Uint)),
        Op::SLessThan => (BinaryOp::Less, fixed(Sint)),
        Op::UGreaterThan => (BinaryOp::Greater, fixed(Uint)),
        Op::SGreaterThan => (BinaryOp::Greater, fixed(Sint)),
        Op::ULessThanEqual => (BinaryOp::LessEqual, fixed(Uint)),
        Op::SLessThanEqual => (BinaryOp::LessEqual, fixed(Sint)),
        Op::UGreaterThanEqual => (BinaryOp::GreaterEqual, fixed(Uint)),
        Op::SGreaterThanEqual => (BinaryOp::GreaterEqual, fixed(Sint)),

        // Ordered and unordered comparisons are not distinguished.
        Op::FOrdEqual | Op::FUnordEqual => (BinaryOp::Equal, fixed(Float)),
        Op::FOrdNotEqual | Op::FUnordNotEqual => (BinaryOp::NotEqual, fixed(Float)),
        Op::FOrdLessThan | Op::FUnordLessThan => (BinaryOp::Less, fixed(Float)),
        Op::FOrdGreaterThan | Op::FUnordGreaterThan => (BinaryOp::Greater, fixed(Float)),
        Op::FOrdLessThanEqual | Op::FUnordLessThanEqual => (BinaryOp::LessEqual, fixed(Float)),
        Op::FOrdGreaterThanEqual | Op::FUnordGreaterThanEqual => {
            (BinaryOp::GreaterEqual, fixed(Float))
        }
        _ => return None,
    })
}

fn derivative(op: Op) -> Option<(DerivativeAxis, DerivativeControl)> {
    Some(match op {
        Op::DPdx => (DerivativeAxis::X, DerivativeControl::None),
        Op::DPdy => (DerivativeAxis::Y, DerivativeControl::None),
        Op::DPdxFine => (DerivativeAxis::X, DerivativeControl::Fine),
        Op::DPdyFine => (DerivativeAxis::Y, DerivativeControl::Fine),
        Op::DPdxCoarse => (DerivativeAxis::X, DerivativeControl::Coarse),
        Op::DPdyCoarse => (DerivativeAxis::Y, DerivativeControl::Coarse),
        _ => return None,
    })
}

impl Builder<'_> {
    pub(crate) fn handle_alu(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;
        if !self.module.types[ty].inner.is_vector_or_scalar() {
            return Err(crate::unsupported(format!("{:?} on composite values", inst.op)));
        }

        let def = if let Some((op, kind)) = binary_op(inst.op) {
            let left = self.ssa_leaf(inst.word(3)?)?;
            let right = self.ssa_leaf(inst.word(4)?)?;
            let kind = match kind {
                Kind::Operand => self.def_scalar(left)?.kind,
                Kind::Fixed(kind) => kind,
            };
            self.emit(Operation::Binary { op, kind, left, right }, ty)?
        } else if let Some((axis, control)) = derivative(inst.op) {
            let value = self.ssa_leaf(inst.word(3)?)?;
            self.emit(Operation::Derivative { axis, control, value }, ty)?
        } else {
            self.alu_special(inst, ty)?
        };

        let value = self.new_ssa(SsaValue::leaf(ty, def))?;
        self.push_ssa(id, value)
    }

    fn alu_special(
        &mut self,
        inst: &SpvInstruction<'_>,
        ty: Handle<Type>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let unary = |op, kind, value| Operation::Unary { op, kind, value };
        Ok(match inst.op {
            Op::SNegate => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                self.emit(unary(UnaryOp::Negate, ScalarKind::Sint, value), ty)?
            }
            Op::FNegate => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                self.emit(unary(UnaryOp::Negate, ScalarKind::Float, value), ty)?
            }
            Op::Not => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                let kind = self.def_scalar(value)?.kind;
                self.emit(unary(UnaryOp::BitwiseNot, kind, value), ty)?
            }
            Op::LogicalNot => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                self.emit(unary(UnaryOp::LogicalNot, ScalarKind::Bool, value), ty)?
            }

            Op::Any | Op::All => {
                let argument = self.ssa_leaf(inst.word(3)?)?;
                if self.def_components(argument)? == 1 {
                    argument
                } else {
                    let fun = if inst.op == Op::Any {
                        RelationalFunction::Any
                    } else {
                        RelationalFunction::All
                    };
                    self.emit(Operation::Relational { fun, argument }, ty)?
                }
            }

            Op::Dot => {
                let left = self.ssa_leaf(inst.word(3)?)?;
                let right = self.ssa_leaf(inst.word(4)?)?;
                if self.def_components(left)? != self.def_components(right)? {
                    return Err(crate::malformed("OpDot of vectors of different sizes"));
                }
                let op = if self.def_components(left)? == 1 {
                    Operation::Binary {
                        op: BinaryOp::Multiply,
                        kind: ScalarKind::Float,
                        left,
                        right,
                    }
                } else {
                    Operation::Math {
                        fun: MathFunction::Dot,
                        kind: ScalarKind::Float,
                        args: vec![left, right],
                    }
                };
                self.emit(op, ty)?
            }

            Op::VectorTimesScalar => {
                let vector = self.ssa_leaf(inst.word(3)?)?;
                let scalar = self.ssa_leaf(inst.word(4)?)?;
                let components = self.def_components(vector)?;
                let right = self.splat(scalar, components)?;
                self.emit(
                    Operation::Binary {
                        op: BinaryOp::Multiply,
                        kind: ScalarKind::Float,
                        left: vector,
                        right,
                    },
                    ty,
                )?
            }

            Op::Select => {
                let condition = self.ssa_leaf(inst.word(3)?)?;
                let accept = self.ssa_leaf(inst.word(4)?)?;
                let reject = self.ssa_leaf(inst.word(5)?)?;
                let components = self.def_components(accept)?;
                let condition = if self.def_components(condition)? == 1 {
                    self.splat(condition, components)?
                } else {
                    condition
                };
                self.emit(
                    Operation::Select {
                        condition,
                        accept,
                        reject,
                    },
                    ty,
                )?
            }

            Op::ConvertFToU
            | Op::ConvertFToS
            | Op::ConvertSToF
            | Op::ConvertUToF
            | Op::FConvert => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                let to = self.module.types[ty]
                    .inner
                    .scalar()
                    .ok_or_else(|| crate::malformed("conversion to a non-numeric type"))?;
                self.emit(Operation::Convert { value, to }, ty)?
            }
            // Every integer is 32 bits wide, so width conversions only
            // reinterpret.
            Op::Bitcast | Op::UConvert | Op::SConvert => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                self.emit(Operation::Bitcast(value), ty)?
            }

            Op::Fwidth | Op::FwidthFine | Op::FwidthCoarse => {
                let control = match inst.op {
                    Op::FwidthFine => DerivativeControl::Fine,
                    Op::FwidthCoarse => DerivativeControl::Coarse,
                    _ => DerivativeControl::None,
                };
                let value = self.ssa_leaf(inst.word(3)?)?;
                let mut terms = [value; 2];
                for (term, axis) in terms.iter_mut().zip([DerivativeAxis::X, DerivativeAxis::Y]) {
                    let derivative = self.emit(Operation::Derivative { axis, control, value }, ty)?;
                    *term = self.emit(
                        Operation::Math {
                            fun: MathFunction::Abs,
                            kind: ScalarKind::Float,
                            args: vec![derivative],
                        },
                        ty,
                    )?;
                }
                self.emit(
                    Operation::Binary {
                        op: BinaryOp::Add,
                        kind: ScalarKind::Float,
                        left: terms[0],
                        right: terms[1],
                    },
                    ty,
                )?
            }

            Op::IsNan => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                self.emit(
                    Operation::Binary {
                        op: BinaryOp::NotEqual,
                        kind: ScalarKind::Float,
                        left: value,
                        right: value,
                    },
                    ty,
                )?
            }
            Op::IsInf => {
                let value = self.ssa_leaf(inst.word(3)?)?;
                let value_ty = self.def_type(value)?;
                let components = self.def_components(value)?;
                let magnitude = self.emit(
                    Operation::Math {
                        fun: MathFunction::Abs,
                        kind: ScalarKind::Float,
                        args: vec![value],
                    },
                    value_ty,
                )?;
                let infinity = self.insert(
                    InsertPoint::Preamble,
                    Operation::Constant(vec![f32::INFINITY.to_bits(); usize::from(components)]),
                    Some(value_ty),
                )?;
                self.emit(
                    Operation::Binary {
                        op: BinaryOp::Equal,
                        kind: ScalarKind::Float,
                        left: magnitude,
                        right: infinity,
                    },
                    ty,
                )?
            }

            other => return Err(crate::unsupported(format!("{other:?}"))),
        })
    }
}

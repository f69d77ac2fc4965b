//! The `GLSL.std.450` extended instruction set.

use spirv::GLOp;
use tessera_ir::{MathFunction, Operation, ScalarKind};

use crate::ParseError;
use crate::builder::Builder;
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::SsaValue;
use crate::value::ExtendedSet;

fn math_function(op: GLOp) -> Option<(MathFunction, ScalarKind)> {
    use MathFunction as Mf;
    use ScalarKind::{Float, Sint, Uint};
    Some(match op {
        GLOp::Round => (Mf::Round, Float),
        GLOp::RoundEven => (Mf::RoundEven, Float),
        GLOp::Trunc => (Mf::Trunc, Float),
        GLOp::FAbs => (Mf::Abs, Float),
        GLOp::SAbs => (Mf::Abs, Sint),
        GLOp::FSign => (Mf::Sign, Float),
        GLOp::SSign => (Mf::Sign, Sint),
        GLOp::Floor => (Mf::Floor, Float),
        GLOp::Ceil => (Mf::Ceil, Float),
        GLOp::Fract => (Mf::Fract, Float),
        GLOp::Radians => (Mf::Radians, Float),
        GLOp::Degrees => (Mf::Degrees, Float),
        GLOp::Sin => (Mf::Sin, Float),
        GLOp::Cos => (Mf::Cos, Float),
        GLOp::Tan => (Mf::Tan, Float),
        GLOp::Asin => (Mf::Asin, Float),
        GLOp::Acos => (Mf::Acos, Float),
        GLOp::Atan => (Mf::Atan, Float),
        GLOp::Sinh => (Mf::Sinh, Float),
        GLOp::Cosh => (Mf::Cosh, Float),
        GLOp::Tanh => (Mf::Tanh, Float),
        GLOp::Asinh => (Mf::Asinh, Float),
        GLOp::Acosh => (Mf::Acosh, Float),
        GLOp::Atanh => (Mf::Atanh, Float),
        GLOp::Atan2 => (Mf::Atan2, Float),
        GLOp::Pow => (Mf::Pow, Float),
        GLOp::Exp => (Mf::Exp, Float),
        GLOp::Log => (Mf::Log, Float),
        GLOp::Exp2 => (Mf::Exp2, Float),
        GLOp::Log2 => (Mf::Log2, Float),
        GLOp::Sqrt => (Mf::Sqrt, Float),
        GLOp::InverseSqrt => (Mf::InverseSqrt, Float),
        GLOp::FMin => (Mf::Min, Float),
        GLOp::UMin => (Mf::Min, Uint),
        GLOp::SMin => (Mf::Min, Sint),
        GLOp::FMax => (Mf::Max, Float),
        GLOp::UMax => (Mf::Max, Uint),
        GLOp::SMax => (Mf::Max, Sint),
        GLOp::FClamp => (Mf::Clamp, Float),
        GLOp::UClamp => (Mf::Clamp, Uint),
        GLOp::SClamp => (Mf::Clamp, Sint),
        GLOp::FMix => (Mf::Mix, Float),
        GLOp::Step => (Mf::Step, Float),
        GLOp::SmoothStep => (Mf::SmoothStep, Float),
        GLOp::Fma => (Mf::Fma, Float),
        GLOp::Length => (Mf::Length, Float),
        GLOp::Distance => (Mf::Distance, Float),
        GLOp::Cross => (Mf::Cross, Float),
        GLOp::Normalize => (Mf::Normalize, Float),
        GLOp::FaceForward => (Mf::FaceForward, Float),
        GLOp::Reflect => (Mf::Reflect, Float),
        GLOp::Refract => (Mf::Refract, Float),
        _ => return None,
    })
}

/// Number of operands each function takes.
fn arity(fun: MathFunction) -> usize {
    match fun {
        MathFunction::Atan2
        | MathFunction::Pow
        | MathFunction::Min
        | MathFunction::Max
        | MathFunction::Step
        | MathFunction::Dot
        | MathFunction::Cross
        | MathFunction::Distance
        | MathFunction::Reflect => 2,
        MathFunction::Clamp
        | MathFunction::Mix
        | MathFunction::SmoothStep
        | MathFunction::Fma
        | MathFunction::FaceForward
        | MathFunction::Refract => 3,
        _ => 1,
    }
}

impl Builder<'_> {
    pub(crate) fn handle_ext_inst(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;
        match self.values.extended_set(inst.word(3)?)? {
            ExtendedSet::Glsl450 => {}
        }

        let number = inst.word(4)?;
        let op = GLOp::from_u32(number)
            .ok_or_else(|| crate::malformed(format!("unknown GLSL.std.450 instruction {number}")))?;
        let (fun, kind) =
            math_function(op).ok_or_else(|| crate::unsupported(format!("GLSL.std.450 {op:?}")))?;

        let operands = inst.words_from(5);
        if operands.len() != arity(fun) {
            return Err(crate::malformed(format!(
                "GLSL.std.450 {op:?} takes {} operands, got {}",
                arity(fun),
                operands.len()
            )));
        }
        let args = operands
            .iter()
            .map(|&operand| self.ssa_leaf(operand))
            .collect::<Result<Vec<_>, _>>()?;

        let def = self.emit(Operation::Math { fun, kind, args }, ty)?;
        let value = self.new_ssa(SsaValue::leaf(ty, def))?;
        self.push_ssa(id, value)
    }
}

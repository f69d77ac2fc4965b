//! SSA instructions.

use crate::arena::Handle;
use crate::func::{Block, Function};
use crate::global::Variable;
use crate::types::{ImageDimension, Scalar, ScalarKind, Type};

/// Canonical encoding of boolean `true` in constants and loads.
pub const TRUE: u32 = !0;
/// Canonical encoding of boolean `false`.
pub const FALSE: u32 = 0;

/// One instruction in a function's instruction arena.
///
/// `ty` is the type of the value the instruction defines, or `None` for
/// instructions executed only for their side effects.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub op: Operation,
    pub ty: Option<Handle<Type>>,
}

/// An operation performed by an [`Instruction`].
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// A scalar or vector constant; one 32-bit word per component.
    Constant(Vec<u32>),
    /// An undefined value.
    Undef,
    /// A value selected by the predecessor the block was entered from.
    Phi(Vec<PhiSource>),

    /// A vector built from individual lanes of other values.
    Compose(Vec<Lane>),
    /// Selects components of a vector, in order.
    Swizzle {
        vector: Handle<Instruction>,
        pattern: Vec<u8>,
    },
    Unary {
        op: UnaryOp,
        kind: ScalarKind,
        value: Handle<Instruction>,
    },
    Binary {
        op: BinaryOp,
        kind: ScalarKind,
        left: Handle<Instruction>,
        right: Handle<Instruction>,
    },
    /// Component-wise `condition ? accept : reject`.
    Select {
        condition: Handle<Instruction>,
        accept: Handle<Instruction>,
        reject: Handle<Instruction>,
    },
    Math {
        fun: MathFunction,
        kind: ScalarKind,
        args: Vec<Handle<Instruction>>,
    },
    /// Reduces a boolean vector to a scalar.
    Relational {
        fun: RelationalFunction,
        argument: Handle<Instruction>,
    },
    Derivative {
        axis: DerivativeAxis,
        control: DerivativeControl,
        value: Handle<Instruction>,
    },
    /// Numeric conversion to another scalar kind.
    Convert {
        value: Handle<Instruction>,
        to: Scalar,
    },
    /// Reinterprets the bits of a value.
    Bitcast(Handle<Instruction>),

    LoadVariable(Deref),
    StoreVariable {
        deref: Deref,
        value: Handle<Instruction>,
        mask: WriteMask,
    },
    CopyVariable {
        dst: Deref,
        src: Deref,
    },
    /// Resolves a descriptor set, binding and array index to a buffer.
    ResourceIndex {
        set: u32,
        binding: u32,
        kind: BufferKind,
        array_index: Handle<Instruction>,
    },
    /// Loads a scalar or vector at a byte offset of an external block.
    LoadBuffer {
        kind: BufferKind,
        resource: Option<Handle<Instruction>>,
        offset: Handle<Instruction>,
    },
    StoreBuffer {
        resource: Handle<Instruction>,
        offset: Handle<Instruction>,
        value: Handle<Instruction>,
        mask: WriteMask,
    },

    Texture(Box<TextureQuery>),
    Image {
        op: ImageOp,
        image: Deref,
        coordinate: Handle<Instruction>,
        sample: Handle<Instruction>,
        args: Vec<Handle<Instruction>>,
    },

    Call {
        function: Handle<Function>,
        arguments: Vec<Deref>,
        result: Option<Deref>,
    },
    EmitVertex {
        stream: u32,
    },
    EndPrimitive {
        stream: u32,
    },
    Barrier(Barrier),
}

/// The value a phi takes when entered from `block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhiSource {
    pub block: Handle<Block>,
    pub value: Handle<Instruction>,
}

/// Component `index` of `value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lane {
    pub value: Handle<Instruction>,
    pub index: u8,
}

impl Lane {
    pub fn new(value: Handle<Instruction>, index: u8) -> Self {
        Self { value, index }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Result takes the sign of the divisor (`Uint` and `Float` modulo are
    /// the usual unsigned and floored forms).
    Modulo,
    /// Result takes the sign of the dividend.
    Remainder,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    ShiftLeft,
    /// Logical for `Uint`, arithmetic for `Sint`.
    ShiftRight,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum MathFunction {
    Abs,
    Sign,
    Min,
    Max,
    Clamp,
    Floor,
    Ceil,
    Round,
    RoundEven,
    Trunc,
    Fract,
    Radians,
    Degrees,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Pow,
    Exp,
    Exp2,
    Log,
    Log2,
    Sqrt,
    InverseSqrt,
    Mix,
    Step,
    SmoothStep,
    Fma,
    Dot,
    Cross,
    Length,
    Distance,
    Normalize,
    FaceForward,
    Reflect,
    Refract,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum RelationalFunction {
    /// `true` if any component is `true`.
    Any,
    /// `true` if every component is `true`.
    All,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum DerivativeAxis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum DerivativeControl {
    None,
    Fine,
    Coarse,
}

/// Which kind of external block a buffer access goes to.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum BufferKind {
    Uniform,
    Storage,
    PushConstant,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum Barrier {
    /// Orders memory accesses of the invocation.
    Memory,
    /// Waits for every invocation of the work group.
    Control,
}

bitflags::bitflags! {
    /// Components written by a store.
    #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
    pub struct WriteMask: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
        const W = 1 << 3;
    }
}

impl WriteMask {
    /// The mask covering the first `components` components.
    pub fn first(components: u8) -> Self {
        Self::from_bits_truncate((1u8 << components.min(4)) - 1)
    }
}

/// A path from a variable to one of its sub-objects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deref {
    pub variable: Handle<Variable>,
    pub path: Vec<DerefStep>,
}

/// One selector of a [`Deref`] path, with the type it reaches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DerefStep {
    pub access: Access,
    pub ty: Handle<Type>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Array element, matrix column or vector component.
    Index(ArrayIndex),
    /// Struct member.
    Member(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrayIndex {
    Direct(u32),
    Indirect(Handle<Instruction>),
}

impl Deref {
    pub fn new(variable: Handle<Variable>) -> Self {
        Self {
            variable,
            path: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum TextureOp {
    Sample,
    SampleBias,
    SampleLod,
    SampleGrad,
    Fetch,
    FetchMultisample,
    Gather,
    QuerySize,
    QueryLod,
    QueryLevels,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum TextureSourceKind {
    Coordinate,
    DepthReference,
    Bias,
    Lod,
    Ddx,
    Ddy,
    Offset,
    SampleIndex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSource {
    pub kind: TextureSourceKind,
    pub value: Handle<Instruction>,
}

/// A texture sample, fetch or query.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureQuery {
    pub op: TextureOp,
    /// Separate image, when the sampler was paired with one explicitly.
    pub texture: Option<Deref>,
    pub sampler: Deref,
    pub sources: Vec<TextureSource>,
    pub dim: ImageDimension,
    pub arrayed: bool,
    pub shadow: bool,
    pub coordinate_components: u8,
    /// Component selected by a gather.
    pub component: u8,
    pub result_kind: ScalarKind,
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ImageOp {
    Load,
    Store,
    AtomicAdd,
    AtomicSMin,
    AtomicUMin,
    AtomicSMax,
    AtomicUMax,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    AtomicExchange,
    /// `args` are the comparator followed by the new value.
    AtomicCompareExchange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_mask_first_components() {
        assert_eq!(WriteMask::first(1), WriteMask::X);
        assert_eq!(WriteMask::first(3), WriteMask::X | WriteMask::Y | WriteMask::Z);
        assert_eq!(WriteMask::first(4), WriteMask::all());
    }

    #[test]
    fn boolean_encoding() {
        assert_eq!(TRUE, 0xFFFF_FFFF);
        assert_eq!(FALSE, 0);
    }
}

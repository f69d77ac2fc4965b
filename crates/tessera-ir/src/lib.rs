//! Tessera intermediate representation.
//!
//! A strongly-typed SSA IR for translated shader programs. Types are
//! deduplicated in a [`UniqueArena`]; variables, functions, blocks and
//! instructions live in [`Arena`]s and refer to each other by [`Handle`].
//! Each function is a control-flow graph of basic blocks whose
//! instructions define SSA values; merges are expressed with phis.

pub mod arena;
mod display;
mod error;
mod func;
mod global;
mod info;
mod instr;
pub mod slots;
mod types;
mod verify;

pub use arena::{Arena, Handle, UniqueArena};
pub use display::{dump_function, dump_module, format_type};
pub use error::IrError;
pub use func::{Block, Function, Merge, SwitchCase, Terminator};
pub use global::{ConstantValue, Interpolation, Variable, VariableData, VariableMode};
pub use info::{DepthLayout, FragmentInfo, GeometryInfo, OutputPrimitive, ShaderInfo, ShaderStage};
pub use instr::{
    Access, ArrayIndex, Barrier, BinaryOp, BufferKind, Deref, DerefStep, DerivativeAxis,
    DerivativeControl, FALSE, ImageOp, Instruction, Lane, MathFunction, Operation, PhiSource,
    RelationalFunction, TRUE, TextureOp, TextureQuery, TextureSource, TextureSourceKind, UnaryOp,
    WriteMask,
};
pub use types::{
    ArraySize, Bytes, ImageDimension, Scalar, ScalarKind, StorageFormat, StructMember, Type,
    TypeInner, VectorSize, child_type, transposed_type, vector_type,
};

/// A translated shader module.
#[derive(Clone, Debug)]
pub struct Module {
    pub info: ShaderInfo,
    /// Deduplicated type arena.
    pub types: UniqueArena<Type>,
    /// Every variable, of any mode.
    pub variables: Arena<Variable>,
    /// Shader-scope variables declared by the module, in declaration order.
    /// Interface block variables are accessed through buffer instructions
    /// and are not listed.
    pub globals: Vec<Handle<Variable>>,
    pub functions: Arena<Function>,
}

impl Module {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            info: ShaderInfo::new(stage),
            types: UniqueArena::new(),
            variables: Arena::new(),
            globals: Vec::new(),
            functions: Arena::new(),
        }
    }

    /// Inserts an unnamed type.
    pub fn insert_type(&mut self, inner: TypeInner) -> Handle<Type> {
        self.types.insert(Type { name: None, inner })
    }

    /// The type reached by `deref`.
    pub fn deref_type(&self, deref: &Deref) -> Handle<Type> {
        match deref.path.last() {
            Some(step) => step.ty,
            None => self.variables[deref.variable].ty,
        }
    }
}

/// The result of translating one entry point.
#[derive(Clone, Debug)]
pub struct Shader {
    pub module: Module,
    pub entry_point: Handle<Function>,
}

impl Shader {
    pub fn entry_function(&self) -> &Function {
        &self.module.functions[self.entry_point]
    }
}

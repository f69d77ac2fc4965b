//! Translation driver: the builder context and its passes.

use std::collections::HashMap;
use std::mem;

use spirv::{Capability, ExecutionMode, ExecutionModel, Op};
use tessera_ir::{
    self as ir, Arena, BufferKind, DepthLayout, Handle, Instruction, Module, Operation,
    OutputPrimitive, Scalar, Shader, ShaderStage, Type, TypeInner, Variable, VariableMode,
};

use crate::cfg::FunctionBody;
use crate::constant::Constant;
use crate::decoration::{Decoration, Scope};
use crate::phi::PendingPhi;
use crate::reader::{Header, Instruction as SpvInstruction};
use crate::ssa::{SsaKind, SsaValue};
use crate::types::SpvType;
use crate::value::{ExtendedSet, Value, ValueTable};
use crate::{Options, ParseError};

/// Capabilities the front-end can translate.
const SUPPORTED_CAPABILITIES: &[Capability] = &[
    Capability::Matrix,
    Capability::Shader,
    Capability::Geometry,
    Capability::Sampled1D,
    Capability::Image1D,
    Capability::SampledBuffer,
    Capability::ImageBuffer,
    Capability::SampledRect,
    Capability::ImageRect,
    Capability::SampledCubeArray,
    Capability::ImageCubeArray,
    Capability::ImageQuery,
    Capability::DerivativeControl,
    Capability::StorageImageExtendedFormats,
];

/// Largest value tree, in nodes, that a composite type may expand to.
pub(crate) const MAX_TREE_NODES: u64 = 1 << 16;

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// The entry point selected by name.
#[derive(Clone, Debug)]
pub(crate) struct EntryPoint {
    pub id: u32,
}

/// A variable backed by an external block, accessed by byte offset.
#[derive(Clone, Copy, Debug)]
pub(crate) struct External {
    pub kind: BufferKind,
    /// Front-end type of the variable, with its layout.
    pub root: Handle<SpvType>,
}

/// Where new instructions go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InsertPoint {
    /// After the last instruction of a block.
    End(Handle<ir::Block>),
    /// Top of the entry block, before anything emitted by the body.
    Preamble,
    /// Start of a block, after its phis.
    BlockStart(Handle<ir::Block>),
}

/// State of the function whose body is being emitted.
pub(crate) struct FunctionCtx {
    pub function: ir::Function,
    pub ssa: Arena<SsaValue>,
    /// Constants materialized in this function.
    pub const_table: HashMap<Handle<Constant>, Handle<SsaValue>>,
    pub cursor: Option<Handle<ir::Block>>,
    /// Number of instructions emitted at [`InsertPoint::Preamble`].
    preamble: usize,
    pub phis: Vec<PendingPhi>,
}

impl FunctionCtx {
    pub(crate) fn new(function: ir::Function) -> Self {
        Self {
            function,
            ssa: Arena::new(),
            const_table: HashMap::new(),
            cursor: None,
            preamble: 0,
            phis: Vec::new(),
        }
    }

    pub fn insert(
        &mut self,
        at: InsertPoint,
        inst: Instruction,
    ) -> Result<Handle<Instruction>, ParseError> {
        let handle = self.function.instructions.append(inst);
        match at {
            InsertPoint::End(block) => self.function.blocks[block].instructions.push(handle),
            InsertPoint::Preamble => {
                let entry = self
                    .function
                    .entry_block()
                    .ok_or_else(|| crate::malformed("function has no blocks"))?;
                let position = self.preamble;
                self.function.blocks[entry].instructions.insert(position, handle);
                self.preamble += 1;
            }
            InsertPoint::BlockStart(block) => {
                let position = self.function.phis(block).count();
                self.function.blocks[block].instructions.insert(position, handle);
            }
        }
        Ok(handle)
    }
}

pub(crate) struct Builder<'a> {
    instructions: &'a [SpvInstruction<'a>],
    entry_name: &'a str,
    pub options: &'a Options,
    pub values: ValueTable,
    pub types: Arena<SpvType>,
    pub constants: Arena<Constant>,
    pub module: Module,
    pub entry: Option<EntryPoint>,
    /// Builtin variables by builtin and mode.
    pub builtins: HashMap<(u32, VariableMode), Handle<Variable>>,
    pub externals: HashMap<Handle<Variable>, External>,
    pub bodies: Vec<FunctionBody>,
    pub func: Option<FunctionCtx>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

impl<'a> Builder<'a> {
    pub fn new(
        header: Header,
        instructions: &'a [SpvInstruction<'a>],
        entry_name: &'a str,
        options: &'a Options,
    ) -> Result<Self, ParseError> {
        Ok(Self {
            instructions,
            entry_name,
            options,
            values: ValueTable::new(header.bound)?,
            types: Arena::new(),
            constants: Arena::new(),
            module: Module::new(ShaderStage::Vertex),
            entry: None,
            builtins: HashMap::new(),
            externals: HashMap::new(),
            bodies: Vec::new(),
            func: None,
        })
    }

    pub fn translate(mut self) -> Result<Shader, ParseError> {
        let insts = self.instructions;

        let mut index = self.preamble_pass(insts)?;
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| ParseError::MissingEntryPoint(self.entry_name.to_string()))?;
        self.module.info.name = Some(self.entry_name.to_string());
        self.apply_execution_modes(entry.id)?;

        index = self.declarations_pass(insts, index)?;
        self.build_cfg(insts, index)?;

        for body in mem::take(&mut self.bodies) {
            self.emit_function(insts, &body)?;
        }

        let entry_point = self.values.function(entry.id)?;
        log::debug!(
            "translated `{}`: {} functions, {} variables, {} types",
            self.entry_name,
            self.module.functions.len(),
            self.module.variables.len(),
            self.module.types.len()
        );
        Ok(Shader {
            module: self.module,
            entry_point,
        })
    }
}

// ---------------------------------------------------------------------------
// Preamble
// ---------------------------------------------------------------------------

impl Builder<'_> {
    /// Handles the debug and annotation sections; returns the index of the
    /// first instruction that declares a type, constant or variable.
    fn preamble_pass(&mut self, insts: &[SpvInstruction<'_>]) -> Result<usize, ParseError> {
        for (index, inst) in insts.iter().enumerate() {
            if !self.handle_preamble_instruction(inst)? {
                return Ok(index);
            }
        }
        Ok(insts.len())
    }

    fn handle_preamble_instruction(
        &mut self,
        inst: &SpvInstruction<'_>,
    ) -> Result<bool, ParseError> {
        match inst.op {
            Op::Source
            | Op::SourceContinued
            | Op::SourceExtension
            | Op::ModuleProcessed
            | Op::Line
            | Op::NoLine => {}
            Op::String => {
                let (text, _) = inst.string(2)?;
                self.values.push(inst.word(1)?, Value::String(text))?;
            }
            Op::Name => {
                let (name, _) = inst.string(2)?;
                self.values.slot_mut(inst.word(1)?)?.name = Some(name);
            }
            Op::MemberName => {
                let member = inst.word(2)?;
                let (name, _) = inst.string(3)?;
                self.values
                    .slot_mut(inst.word(1)?)?
                    .member_names
                    .push((member, name));
            }
            Op::Capability => {
                let word = inst.word(1)?;
                match Capability::from_u32(word) {
                    Some(cap) if SUPPORTED_CAPABILITIES.contains(&cap) => {}
                    Some(cap) if self.options.strict_capabilities => {
                        return Err(ParseError::UnsupportedCapability(cap));
                    }
                    Some(cap) => log::warn!("ignoring unsupported capability {cap:?}"),
                    None => return Err(crate::malformed(format!("unknown capability {word}"))),
                }
            }
            Op::Extension => {
                let (name, _) = inst.string(1)?;
                if self.options.strict_capabilities {
                    return Err(ParseError::UnsupportedExtension(name));
                }
                log::warn!("ignoring extension `{name}`");
            }
            Op::ExtInstImport => {
                let (name, _) = inst.string(2)?;
                if name != "GLSL.std.450" {
                    return Err(ParseError::UnsupportedExtInstSet(name));
                }
                self.values
                    .push(inst.word(1)?, Value::ExtensionImport(ExtendedSet::Glsl450))?;
            }
            Op::MemoryModel => {
                let addressing = inst.word(1)?;
                let memory = inst.word(2)?;
                if addressing != spirv::AddressingModel::Logical as u32
                    || memory != spirv::MemoryModel::GLSL450 as u32
                {
                    return Err(crate::unsupported(format!(
                        "memory model {addressing}/{memory}"
                    )));
                }
            }
            Op::EntryPoint => self.handle_entry_point(inst)?,
            Op::ExecutionMode | Op::ExecutionModeId => {
                inst.expect_at_least(3)?;
                let decoration =
                    Decoration::new(Scope::ExecutionMode, inst.word(2)?, inst.words_from(3));
                self.values.add_decoration(inst.word(1)?, decoration)?;
            }
            Op::DecorationGroup => self.values.push(inst.word(1)?, Value::DecorationGroup)?,
            Op::Decorate | Op::DecorateId | Op::DecorateString => {
                inst.expect_at_least(3)?;
                let decoration = Decoration::new(Scope::Value, inst.word(2)?, inst.words_from(3));
                self.values.add_decoration(inst.word(1)?, decoration)?;
            }
            Op::MemberDecorate | Op::MemberDecorateString => {
                inst.expect_at_least(4)?;
                let decoration = Decoration::new(
                    Scope::Member(inst.word(2)?),
                    inst.word(3)?,
                    inst.words_from(4),
                );
                self.values.add_decoration(inst.word(1)?, decoration)?;
            }
            Op::GroupDecorate => {
                let group = inst.word(1)?;
                for &target in inst.words_from(2) {
                    self.values.add_group(target, Scope::Value, group)?;
                }
            }
            Op::GroupMemberDecorate => {
                let group = inst.word(1)?;
                let pairs = inst.words_from(2);
                if pairs.len() % 2 != 0 {
                    return Err(crate::malformed("OpGroupMemberDecorate with an odd operand count"));
                }
                for pair in pairs.chunks_exact(2) {
                    self.values.add_group(pair[0], Scope::Member(pair[1]), group)?;
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn handle_entry_point(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let (name, _) = inst.string(3)?;
        if name != self.entry_name {
            return Ok(());
        }
        if self.entry.is_some() {
            return Err(ParseError::DuplicateEntryPoint(name));
        }
        let model = inst.word(1)?;
        let stage = match ExecutionModel::from_u32(model) {
            Some(ExecutionModel::Vertex) => ShaderStage::Vertex,
            Some(ExecutionModel::Geometry) => ShaderStage::Geometry,
            Some(ExecutionModel::Fragment) => ShaderStage::Fragment,
            Some(ExecutionModel::GLCompute) => ShaderStage::Compute,
            Some(other) => {
                return Err(crate::unsupported(format!("execution model {other:?}")));
            }
            None => return Err(crate::malformed(format!("unknown execution model {model}"))),
        };
        log::debug!("entry point `{name}` is a {stage} shader");
        self.module.info = ir::ShaderInfo::new(stage);
        self.entry = Some(EntryPoint { id: inst.word(2)? });
        Ok(())
    }

    fn apply_execution_modes(&mut self, entry: u32) -> Result<(), ParseError> {
        let stage = self.module.info.stage;
        for mode in self.values.execution_modes(entry)? {
            let word = mode.kind;
            let Some(kind) = ExecutionMode::from_u32(word) else {
                return Err(crate::malformed(format!("unknown execution mode {word}")));
            };
            let require = |expected: ShaderStage| {
                if stage == expected {
                    Ok(())
                } else {
                    Err(crate::malformed(format!(
                        "execution mode {kind:?} in a {stage} shader"
                    )))
                }
            };
            let info = &mut self.module.info;
            match kind {
                ExecutionMode::OriginUpperLeft | ExecutionMode::OriginLowerLeft => {
                    require(ShaderStage::Fragment)?;
                    info.fragment.origin_upper_left = kind == ExecutionMode::OriginUpperLeft;
                }
                ExecutionMode::EarlyFragmentTests => {
                    require(ShaderStage::Fragment)?;
                    info.fragment.early_fragment_tests = true;
                }
                ExecutionMode::DepthReplacing
                | ExecutionMode::DepthGreater
                | ExecutionMode::DepthLess
                | ExecutionMode::DepthUnchanged => {
                    require(ShaderStage::Fragment)?;
                    info.fragment.depth_layout = match kind {
                        ExecutionMode::DepthGreater => DepthLayout::Greater,
                        ExecutionMode::DepthLess => DepthLayout::Less,
                        ExecutionMode::DepthUnchanged => DepthLayout::Unchanged,
                        _ => DepthLayout::Any,
                    };
                }
                ExecutionMode::Invocations => {
                    require(ShaderStage::Geometry)?;
                    info.geometry.invocations = mode.literal(0)?.max(1);
                }
                ExecutionMode::OutputVertices => {
                    require(ShaderStage::Geometry)?;
                    info.geometry.vertices_out = mode.literal(0)?;
                }
                ExecutionMode::InputPoints
                | ExecutionMode::InputLines
                | ExecutionMode::InputLinesAdjacency
                | ExecutionMode::Triangles
                | ExecutionMode::InputTrianglesAdjacency => {
                    if stage != ShaderStage::Geometry {
                        return Err(crate::unsupported("tessellation execution modes"));
                    }
                    info.geometry.vertices_in = match kind {
                        ExecutionMode::InputPoints => 1,
                        ExecutionMode::InputLines => 2,
                        ExecutionMode::InputLinesAdjacency => 4,
                        ExecutionMode::Triangles => 3,
                        _ => 6,
                    };
                }
                ExecutionMode::OutputPoints
                | ExecutionMode::OutputLineStrip
                | ExecutionMode::OutputTriangleStrip => {
                    require(ShaderStage::Geometry)?;
                    info.geometry.output_primitive = Some(match kind {
                        ExecutionMode::OutputPoints => OutputPrimitive::Points,
                        ExecutionMode::OutputLineStrip => OutputPrimitive::LineStrip,
                        _ => OutputPrimitive::TriangleStrip,
                    });
                }
                ExecutionMode::LocalSize => {
                    require(ShaderStage::Compute)?;
                    info.local_size = [mode.literal(0)?, mode.literal(1)?, mode.literal(2)?];
                }
                ExecutionMode::LocalSizeHint
                | ExecutionMode::VecTypeHint
                | ExecutionMode::ContractionOff => {}
                other => return Err(crate::unsupported(format!("execution mode {other:?}"))),
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

impl Builder<'_> {
    /// Handles types, constants and module-scope variables; returns the
    /// index of the first `OpFunction`.
    fn declarations_pass(
        &mut self,
        insts: &[SpvInstruction<'_>],
        start: usize,
    ) -> Result<usize, ParseError> {
        for (index, inst) in insts.iter().enumerate().skip(start) {
            match inst.op {
                Op::Function => return Ok(index),
                Op::Line | Op::NoLine => {}
                Op::TypeVoid
                | Op::TypeBool
                | Op::TypeInt
                | Op::TypeFloat
                | Op::TypeVector
                | Op::TypeMatrix
                | Op::TypeArray
                | Op::TypeRuntimeArray
                | Op::TypeStruct
                | Op::TypeFunction
                | Op::TypePointer
                | Op::TypeImage
                | Op::TypeSampledImage
                | Op::TypeSampler
                | Op::TypeOpaque
                | Op::TypeEvent
                | Op::TypeDeviceEvent
                | Op::TypeReserveId
                | Op::TypeQueue
                | Op::TypePipe
                | Op::TypeForwardPointer => self.handle_type(inst)?,
                Op::ConstantTrue
                | Op::ConstantFalse
                | Op::Constant
                | Op::ConstantComposite
                | Op::ConstantNull
                | Op::ConstantSampler
                | Op::SpecConstantTrue
                | Op::SpecConstantFalse
                | Op::SpecConstant
                | Op::SpecConstantComposite
                | Op::SpecConstantOp => self.handle_constant(inst)?,
                Op::Variable => self.declare_variable(inst)?,
                Op::Undef => {
                    let ty = self.values.ty(inst.word(1)?)?;
                    self.values.push(inst.word(2)?, Value::Undef(ty))?;
                }
                other => {
                    return Err(crate::malformed(format!(
                        "{other:?} in the declarations section"
                    )));
                }
            }
        }
        Ok(insts.len())
    }
}

// ---------------------------------------------------------------------------
// Function bodies
// ---------------------------------------------------------------------------

impl Builder<'_> {
    fn emit_function(
        &mut self,
        insts: &[SpvInstruction<'_>],
        body: &FunctionBody,
    ) -> Result<(), ParseError> {
        let function = mem::replace(
            &mut self.module.functions[body.handle],
            ir::Function::new(None),
        );
        log::trace!("emitting function {:?}", function.name);
        self.func = Some(FunctionCtx::new(function));

        for inst in &insts[body.range.clone()] {
            match inst.op {
                Op::Label => {
                    let block = self.values.block(inst.word(1)?)?;
                    self.fx()?.cursor = Some(block);
                }
                Op::SelectionMerge | Op::LoopMerge => {}
                Op::Branch
                | Op::BranchConditional
                | Op::Switch
                | Op::Return
                | Op::ReturnValue
                | Op::Kill
                | Op::Unreachable => self.emit_terminator(inst, body)?,
                _ => self.handle_body_instruction(inst)?,
            }
        }

        self.resolve_phis()?;
        let ctx = self
            .func
            .take()
            .ok_or_else(|| crate::malformed("function context lost"))?;
        self.module.functions[body.handle] = ctx.function;
        Ok(())
    }

    fn handle_body_instruction(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        match inst.op {
            Op::Line | Op::NoLine | Op::Name => {}
            Op::Undef => {
                let ty = self.values.ty(inst.word(1)?)?;
                self.values.push(inst.word(2)?, Value::Undef(ty))?;
            }
            Op::Phi => self.handle_phi(inst)?,

            Op::Variable
            | Op::AccessChain
            | Op::InBoundsAccessChain
            | Op::Load
            | Op::Store
            | Op::CopyMemory
            | Op::CopyMemorySized
            | Op::ArrayLength
            | Op::FunctionCall => self.handle_variables(inst)?,

            Op::SampledImage
            | Op::ImageSampleImplicitLod
            | Op::ImageSampleExplicitLod
            | Op::ImageSampleDrefImplicitLod
            | Op::ImageSampleDrefExplicitLod
            | Op::ImageSampleProjImplicitLod
            | Op::ImageSampleProjExplicitLod
            | Op::ImageSampleProjDrefImplicitLod
            | Op::ImageSampleProjDrefExplicitLod
            | Op::ImageFetch
            | Op::ImageGather
            | Op::ImageDrefGather
            | Op::ImageQuerySizeLod
            | Op::ImageQuerySize
            | Op::ImageQueryLod
            | Op::ImageQueryLevels
            | Op::ImageQuerySamples => self.handle_texture(inst)?,

            Op::ImageRead | Op::ImageWrite | Op::ImageTexelPointer => self.handle_image(inst)?,

            Op::AtomicExchange
            | Op::AtomicCompareExchange
            | Op::AtomicCompareExchangeWeak
            | Op::AtomicIIncrement
            | Op::AtomicIDecrement
            | Op::AtomicIAdd
            | Op::AtomicISub
            | Op::AtomicSMin
            | Op::AtomicUMin
            | Op::AtomicSMax
            | Op::AtomicUMax
            | Op::AtomicAnd
            | Op::AtomicOr
            | Op::AtomicXor
            | Op::AtomicLoad
            | Op::AtomicStore => self.handle_atomic(inst)?,

            Op::EmitVertex
            | Op::EndPrimitive
            | Op::EmitStreamVertex
            | Op::EndStreamPrimitive
            | Op::MemoryBarrier
            | Op::ControlBarrier => self.handle_barrier(inst)?,

            Op::ExtInst => self.handle_ext_inst(inst)?,

            Op::Transpose
            | Op::OuterProduct
            | Op::MatrixTimesScalar
            | Op::VectorTimesMatrix
            | Op::MatrixTimesVector
            | Op::MatrixTimesMatrix => self.handle_matrix(inst)?,

            Op::VectorExtractDynamic
            | Op::VectorInsertDynamic
            | Op::VectorShuffle
            | Op::CompositeConstruct
            | Op::CompositeExtract
            | Op::CompositeInsert
            | Op::CopyObject => self.handle_composite(inst)?,

            _ => self.handle_alu(inst)?,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Emission helpers
// ---------------------------------------------------------------------------

impl Builder<'_> {
    /// The current function context.
    pub fn fx(&mut self) -> Result<&mut FunctionCtx, ParseError> {
        self.func
            .as_mut()
            .ok_or_else(|| crate::malformed("instruction outside of a function body"))
    }

    pub fn fx_ref(&self) -> Result<&FunctionCtx, ParseError> {
        self.func
            .as_ref()
            .ok_or_else(|| crate::malformed("instruction outside of a function body"))
    }

    pub fn insert(
        &mut self,
        at: InsertPoint,
        op: Operation,
        ty: Option<Handle<Type>>,
    ) -> Result<Handle<Instruction>, ParseError> {
        self.fx()?.insert(at, Instruction { op, ty })
    }

    fn cursor(&mut self) -> Result<InsertPoint, ParseError> {
        self.fx()?
            .cursor
            .map(InsertPoint::End)
            .ok_or_else(|| crate::malformed("instruction outside of a block"))
    }

    /// Emits a value-producing instruction at the cursor.
    pub fn emit(
        &mut self,
        op: Operation,
        ty: Handle<Type>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let at = self.cursor()?;
        self.insert(at, op, Some(ty))
    }

    /// Emits an instruction executed for its side effects.
    pub fn emit_void(&mut self, op: Operation) -> Result<Handle<Instruction>, ParseError> {
        let at = self.cursor()?;
        self.insert(at, op, None)
    }

    /// A `u32` constant at the top of the entry block.
    pub fn const_u32(&mut self, value: u32) -> Result<Handle<Instruction>, ParseError> {
        let ty = self.scalar_type(Scalar::U32);
        self.insert(InsertPoint::Preamble, Operation::Constant(vec![value]), Some(ty))
    }

    pub fn scalar_type(&mut self, scalar: Scalar) -> Handle<Type> {
        self.module.insert_type(TypeInner::Scalar(scalar))
    }

    pub fn vector_type(&mut self, scalar: Scalar, components: u8) -> Handle<Type> {
        ir::vector_type(&mut self.module.types, scalar, components)
    }

    pub fn ssa_node(&self, value: Handle<SsaValue>) -> Result<&SsaValue, ParseError> {
        Ok(&self.fx_ref()?.ssa[value])
    }

    pub fn new_ssa(&mut self, value: SsaValue) -> Result<Handle<SsaValue>, ParseError> {
        Ok(self.fx()?.ssa.append(value))
    }

    /// Emits `op` at the cursor and wraps it in a leaf.
    pub fn emit_leaf(
        &mut self,
        op: Operation,
        ty: Handle<Type>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let def = self.emit(op, ty)?;
        self.new_ssa(SsaValue::leaf(ty, def))
    }

    /// The IR type of a scalar or vector definition.
    pub fn def_type(&self, def: Handle<Instruction>) -> Result<Handle<Type>, ParseError> {
        self.fx_ref()?.function.instructions[def]
            .ty
            .ok_or_else(|| crate::malformed("use of an instruction without a result"))
    }

    pub fn def_inner(&self, def: Handle<Instruction>) -> Result<&TypeInner, ParseError> {
        let ty = self.def_type(def)?;
        Ok(&self.module.types[ty].inner)
    }

    pub fn def_components(&self, def: Handle<Instruction>) -> Result<u8, ParseError> {
        self.def_inner(def)?
            .components()
            .ok_or_else(|| crate::malformed("expected a scalar or vector value"))
    }

    pub fn def_scalar(&self, def: Handle<Instruction>) -> Result<Scalar, ParseError> {
        self.def_inner(def)?
            .scalar()
            .ok_or_else(|| crate::malformed("expected a numeric value"))
    }

    /// Number of nodes in a value tree shaped like `ty`, or `None` when it
    /// exceeds [`MAX_TREE_NODES`].
    pub fn tree_nodes(&self, ty: Handle<Type>) -> Option<u64> {
        let nodes = match self.module.types[ty].inner {
            TypeInner::Matrix { columns, .. } => 1 + columns as u64,
            TypeInner::Array {
                base,
                size: ir::ArraySize::Constant(len),
            } => u64::from(len)
                .checked_mul(self.tree_nodes(base)?)?
                .checked_add(1)?,
            TypeInner::Struct { ref members } => {
                let mut total = 1;
                for member in members {
                    total += self.tree_nodes(member.ty)?;
                    if total > MAX_TREE_NODES {
                        return None;
                    }
                }
                total
            }
            _ => 1,
        };
        (nodes <= MAX_TREE_NODES).then_some(nodes)
    }

    /// Rejects composite types whose values would expand past
    /// [`MAX_TREE_NODES`].
    pub fn check_tree_size(&self, ty: Handle<Type>) -> Result<(), ParseError> {
        match self.tree_nodes(ty) {
            Some(_) => Ok(()),
            None => Err(crate::unsupported(format!(
                "composite values of more than {MAX_TREE_NODES} nodes"
            ))),
        }
    }

    /// Child IR types of a composite type, in order.
    pub fn child_types(&mut self, ty: Handle<Type>) -> Result<Vec<Handle<Type>>, ParseError> {
        self.check_tree_size(ty)?;
        Ok(match self.module.types[ty].inner {
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column = self.vector_type(scalar, rows as u8);
                vec![column; columns as usize]
            }
            TypeInner::Array {
                base,
                size: ir::ArraySize::Constant(len),
            } => vec![base; len as usize],
            TypeInner::Struct { ref members } => members.iter().map(|m| m.ty).collect(),
            TypeInner::Array { .. } => {
                return Err(crate::unsupported("SSA values of runtime arrays"));
            }
            ref inner if inner.is_vector_or_scalar() => Vec::new(),
            _ => return Err(crate::malformed("type has no SSA representation")),
        })
    }

    /// Builds a tree shaped like `ty`, creating each leaf with `make`.
    pub fn create_tree(
        &mut self,
        ty: Handle<Type>,
        make: &mut dyn FnMut(&mut Self, Handle<Type>) -> Result<Handle<Instruction>, ParseError>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        if self.module.types[ty].inner.is_vector_or_scalar() {
            let def = make(self, ty)?;
            return self.new_ssa(SsaValue::leaf(ty, def));
        }
        let children = self
            .child_types(ty)?
            .into_iter()
            .map(|child| self.create_tree(child, make))
            .collect::<Result<Vec<_>, _>>()?;
        self.new_ssa(SsaValue::composite(ty, children))
    }

    /// An undefined value of type `ty`.
    pub fn undef_value(&mut self, ty: Handle<Type>) -> Result<Handle<SsaValue>, ParseError> {
        self.create_tree(ty, &mut |b, leaf_ty| {
            b.insert(InsertPoint::Preamble, Operation::Undef, Some(leaf_ty))
        })
    }

    /// Resolves `id` to an SSA value, materializing constants and undefs
    /// and loading through pointers.
    pub fn ssa_value(&mut self, id: u32) -> Result<Handle<SsaValue>, ParseError> {
        match self.values.get_untyped(id)?.clone() {
            Value::Ssa(value) => Ok(value),
            Value::Constant { ty, constant } => self.const_ssa_value(constant, self.types[ty].ty),
            Value::Undef(ty) => {
                let ty = self.types[ty].ty;
                self.undef_value(ty)
            }
            Value::Deref { chain, .. } => self.load(&chain),
            other => Err(ParseError::WrongValueKind {
                id,
                expected: crate::ValueKind::Ssa,
                found: other.kind(),
            }),
        }
    }

    /// Resolves `id` to a scalar or vector definition.
    pub fn ssa_leaf(&mut self, id: u32) -> Result<Handle<Instruction>, ParseError> {
        let value = self.ssa_value(id)?;
        self.ssa_node(value)?
            .as_leaf()
            .ok_or_else(|| crate::unsupported(format!("composite operand {id}")))
    }

    pub fn push_ssa(&mut self, id: u32, value: Handle<SsaValue>) -> Result<(), ParseError> {
        self.values.push(id, Value::Ssa(value))
    }

    /// Result type operand at word 1, as front-end and IR types.
    pub fn result_type(
        &self,
        inst: &SpvInstruction<'_>,
    ) -> Result<(Handle<SpvType>, Handle<Type>), ParseError> {
        let ty = self.values.ty(inst.word(1)?)?;
        Ok((ty, self.types[ty].ty))
    }

    /// Leaves of `value` in order, for trees whose leaves are all needed.
    pub fn leaf_defs(
        &self,
        value: Handle<SsaValue>,
    ) -> Result<Vec<Handle<Instruction>>, ParseError> {
        Ok(crate::ssa::leaves(&self.fx_ref()?.ssa, value))
    }

    /// Children of a composite tree; a leaf has none.
    pub fn ssa_children(
        &self,
        value: Handle<SsaValue>,
    ) -> Result<Vec<Handle<SsaValue>>, ParseError> {
        Ok(match self.ssa_node(value)?.kind {
            SsaKind::Leaf(_) => Vec::new(),
            SsaKind::Composite(ref children) => children.clone(),
        })
    }
}

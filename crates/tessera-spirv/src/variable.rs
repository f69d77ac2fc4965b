//! Variables, access chains, loads, stores and calls.
//!
//! Pointers are [`Deref`] chains. Loads and stores of ordinary variables
//! walk the IR type of the chain and touch one scalar or vector at a time.
//! Variables bound to external blocks (uniform, storage and push-constant
//! blocks) are addressed by byte offset through the front-end layout
//! instead.

use spirv::{BuiltIn, Decoration, Op, StorageClass};
use tessera_ir::{
    Access, ArrayIndex, ArraySize, BinaryOp, BufferKind, ConstantValue, Deref, DerefStep, Handle,
    Instruction, Interpolation, Lane, Operation, Scalar, ScalarKind, ShaderStage, Type, TypeInner,
    Variable, VariableMode, WriteMask,
};

use crate::ParseError;
use crate::builder::{Builder, External, InsertPoint};
use crate::builtins::{builtin_location, is_per_vertex};
use crate::reader::Instruction as SpvInstruction;
use crate::ssa::{SsaKind, SsaValue};
use crate::types::SpvType;
use crate::value::{SampledImage, Value};

/// Byte offset into a block, with the constant part kept folded.
#[derive(Clone, Copy, Debug, Default)]
struct Offset {
    constant: u32,
    dynamic: Option<Handle<Instruction>>,
}

/// Where a load or store lands inside an external block.
struct BlockAccess {
    kind: BufferKind,
    resource: Option<Handle<Instruction>>,
}

/// Composite shapes an access chain can step into.
#[derive(Clone, Copy)]
enum Shape {
    Struct,
    Array,
    Matrix,
    Vector,
    Other,
}

impl Shape {
    fn of(inner: &TypeInner) -> Self {
        match *inner {
            TypeInner::Struct { .. } => Self::Struct,
            TypeInner::Array { .. } => Self::Array,
            TypeInner::Matrix { .. } => Self::Matrix,
            TypeInner::Vector { .. } => Self::Vector,
            _ => Self::Other,
        }
    }
}

/// Builtin cache key: inputs and system values share a slot.
fn builtin_key(builtin: BuiltIn, mode: VariableMode) -> (u32, VariableMode) {
    let direction = match mode {
        VariableMode::ShaderOut => VariableMode::ShaderOut,
        _ => VariableMode::ShaderIn,
    };
    (builtin as u32, direction)
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

impl Builder<'_> {
    pub(crate) fn declare_variable(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let ty = self.values.ty(inst.word(1)?)?;
        let id = inst.word(2)?;
        let class_word = inst.word(3)?;
        let class = StorageClass::from_u32(class_word)
            .ok_or_else(|| crate::malformed(format!("unknown storage class {class_word}")))?;
        let ir_ty = self.types[ty].ty;

        let interface = self.interface_type(ty);
        let interface_inner = interface.map(|i| self.module.types[self.types[i].ty].inner.clone());
        let is_block = matches!(interface_inner, Some(TypeInner::Struct { .. }));

        let mut var = Variable::new(self.values.name(id), ir_ty, VariableMode::Global);
        var.interface_type = interface.map(|i| self.types[i].ty);
        let mut external = None;

        match class {
            StorageClass::Uniform | StorageClass::UniformConstant => {
                if interface.is_some_and(|i| self.types[i].buffer_block) {
                    var.mode = VariableMode::ShaderStorage;
                    self.module.info.num_ssbos += 1;
                    external = Some(BufferKind::Storage);
                } else {
                    var.mode = VariableMode::Uniform;
                    var.data.read_only = true;
                    match interface_inner {
                        Some(TypeInner::StorageImage { format, .. }) => {
                            self.module.info.num_images += 1;
                            var.data.format = Some(format);
                        }
                        Some(TypeInner::SampledImage { .. } | TypeInner::Sampler) => {
                            self.module.info.num_textures += 1;
                        }
                        Some(TypeInner::Struct { .. }) => {
                            self.module.info.num_ubos += 1;
                            external = Some(BufferKind::Uniform);
                        }
                        _ => {}
                    }
                }
            }
            StorageClass::PushConstant => {
                if !interface.is_some_and(|i| self.types[i].block) {
                    return Err(crate::malformed(format!(
                        "push constant variable {id} is not a block"
                    )));
                }
                if self.module.info.push_constant_size.is_some() {
                    return Err(crate::malformed("more than one push constant block"));
                }
                var.mode = VariableMode::Uniform;
                var.data.read_only = true;
                self.module.info.push_constant_size = Some(self.block_size(ty)?);
                external = Some(BufferKind::PushConstant);
            }
            StorageClass::Input => {
                var.mode = VariableMode::ShaderIn;
                var.data.read_only = true;
            }
            StorageClass::Output => var.mode = VariableMode::ShaderOut,
            StorageClass::Private => var.mode = VariableMode::Global,
            StorageClass::Function => {
                if self.func.is_none() {
                    return Err(crate::malformed(format!(
                        "function variable {id} declared outside of a function"
                    )));
                }
                var.mode = VariableMode::Local;
            }
            other => return Err(crate::unsupported(format!("storage class {other:?}"))),
        }

        if let Some(&init) = inst.words_from(4).first() {
            let (_, constant) = self.values.constant(init)?;
            var.initializer = Some(self.constant_value(constant));
        }

        // Decorated locations are relative to the stage's base; builtin slots
        // are final.
        let builtin = self.apply_variable_decorations(id, &mut var)?;
        if !var.data.explicit_location {
            let base = match (self.module.info.stage, var.mode) {
                (ShaderStage::Fragment, VariableMode::ShaderOut) => {
                    tessera_ir::slots::frag_result::DATA0
                }
                (ShaderStage::Vertex, VariableMode::ShaderIn) => {
                    tessera_ir::slots::vert_attrib::GENERIC0
                }
                (_, VariableMode::ShaderIn | VariableMode::ShaderOut) => {
                    tessera_ir::slots::varying::VAR0
                }
                _ => 0,
            };
            var.data.location += base;
        }
        if external == Some(BufferKind::PushConstant) {
            var.data.descriptor_set = None;
            var.data.binding = None;
        }

        let mode = var.mode;
        let builtin_block = self.types[self.innermost_element(ty)].builtin_block;
        let handle = self.module.variables.append(var);
        if let Some(builtin) = builtin {
            self.builtins.insert(builtin_key(builtin, mode), handle);
        }
        if let Some(kind) = external.filter(|_| is_block) {
            self.externals.insert(handle, External { kind, root: ty });
        }
        if mode == VariableMode::Local {
            self.fx()?.function.locals.push(handle);
        } else if !is_block && !builtin_block {
            self.module.globals.push(handle);
        }
        log::trace!("variable {id} ({class:?}) is {mode}");

        self.values.push(
            id,
            Value::Deref {
                chain: Deref::new(handle),
                ty,
            },
        )
    }

    /// The block, image or sampler type a variable binds, looking through
    /// one level of arrays.
    fn interface_type(&self, ty: Handle<SpvType>) -> Option<Handle<SpvType>> {
        let spv = &self.types[ty];
        let inner = &self.module.types[spv.ty].inner;
        if spv.is_interface(inner) {
            return Some(ty);
        }
        match (inner, spv.element) {
            (TypeInner::Array { .. }, Some(element))
                if self.types[element]
                    .is_interface(&self.module.types[self.types[element].ty].inner) =>
            {
                Some(element)
            }
            _ => None,
        }
    }

    /// Applies the decorations of variable `id`; returns the builtin it was
    /// bound to, if any.
    fn apply_variable_decorations(
        &self,
        id: u32,
        var: &mut Variable,
    ) -> Result<Option<BuiltIn>, ParseError> {
        let mut bound = None;
        for dec in self.values.decorations(id)? {
            if dec.member.is_some() {
                continue;
            }
            match dec.decoration {
                Decoration::NoPerspective => {
                    var.data.interpolation = Some(Interpolation::NoPerspective)
                }
                Decoration::Flat => var.data.interpolation = Some(Interpolation::Flat),
                Decoration::Centroid => var.data.centroid = true,
                Decoration::Sample => var.data.sample = true,
                Decoration::Invariant => var.data.invariant = true,
                Decoration::Constant => {
                    if var.initializer.is_none() {
                        return Err(crate::malformed(format!(
                            "constant variable {id} has no initializer"
                        )));
                    }
                    var.data.read_only = true;
                }
                Decoration::NonWritable => var.data.read_only = true,
                Decoration::Location => var.data.location = dec.literal(0)?,
                Decoration::Component => var.data.component = dec.literal(0)?,
                Decoration::Index => var.data.index = dec.literal(0)?,
                Decoration::Binding => var.data.binding = Some(dec.literal(0)?),
                Decoration::DescriptorSet => var.data.descriptor_set = Some(dec.literal(0)?),
                Decoration::BuiltIn => {
                    let word = dec.literal(0)?;
                    let builtin = BuiltIn::from_u32(word)
                        .ok_or_else(|| crate::malformed(format!("unknown builtin {word}")))?;
                    if builtin == BuiltIn::WorkgroupSize {
                        var.mode = VariableMode::Global;
                        var.data.read_only = true;
                        var.initializer = Some(ConstantValue {
                            values: self.module.info.local_size.to_vec(),
                            elements: Vec::new(),
                        });
                        continue;
                    }
                    self.bind_builtin(var, builtin)?;
                    bound = Some(builtin);
                }
                Decoration::RelaxedPrecision
                | Decoration::Block
                | Decoration::BufferBlock
                | Decoration::RowMajor
                | Decoration::ColMajor
                | Decoration::ArrayStride
                | Decoration::MatrixStride
                | Decoration::GLSLShared
                | Decoration::GLSLPacked
                | Decoration::CPacked
                | Decoration::Patch
                | Decoration::Restrict
                | Decoration::Aliased
                | Decoration::Volatile
                | Decoration::Coherent
                | Decoration::NonReadable
                | Decoration::Uniform
                | Decoration::SaturatedConversion
                | Decoration::Stream
                | Decoration::Offset
                | Decoration::XfbBuffer
                | Decoration::XfbStride
                | Decoration::NoContraction
                | Decoration::SpecId => {}
                other => return Err(crate::unsupported(format!("variable decoration {other:?}"))),
            }
        }
        Ok(bound)
    }

    /// Gives `var` the slot and mode of `builtin`.
    fn bind_builtin(&self, var: &mut Variable, builtin: BuiltIn) -> Result<(), ParseError> {
        let (location, mode) = builtin_location(builtin, self.module.info.stage, var.mode)?;
        var.data.location = location;
        var.data.explicit_location = true;
        var.mode = mode;
        if matches!(mode, VariableMode::ShaderIn | VariableMode::SystemValue) {
            var.data.read_only = true;
        }
        if matches!(builtin, BuiltIn::FragCoord | BuiltIn::SamplePosition) {
            var.data.origin_upper_left = self.module.info.fragment.origin_upper_left;
        }
        Ok(())
    }

    /// The variable standing for `builtin` in direction `mode`, created on
    /// first use.
    fn builtin_variable(
        &mut self,
        builtin: BuiltIn,
        mode: VariableMode,
        ty: Handle<Type>,
    ) -> Result<Handle<Variable>, ParseError> {
        let key = builtin_key(builtin, mode);
        if let Some(&var) = self.builtins.get(&key) {
            return Ok(var);
        }
        let mut var = Variable::new(Some(format!("{builtin:?}")), ty, mode);
        self.bind_builtin(&mut var, builtin)?;
        let handle = self.module.variables.append(var);
        self.module.globals.push(handle);
        self.builtins.insert(key, handle);
        log::trace!("created builtin variable {builtin:?}");
        Ok(handle)
    }

    fn local_variable(
        &mut self,
        name: &str,
        ty: Handle<Type>,
    ) -> Result<Handle<Variable>, ParseError> {
        let var = Variable::new(Some(name.to_string()), ty, VariableMode::Local);
        let handle = self.module.variables.append(var);
        self.fx()?.function.locals.push(handle);
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// Body instructions
// ---------------------------------------------------------------------------

impl Builder<'_> {
    pub(crate) fn handle_variables(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        match inst.op {
            Op::Variable => self.declare_variable(inst),
            Op::AccessChain | Op::InBoundsAccessChain => self.access_chain(inst),
            Op::Load => {
                let id = inst.word(2)?;
                let (chain, ty) = self.pointer(inst.word(3)?)?;
                if self.module.types[self.module.deref_type(&chain)].inner.is_opaque() {
                    return self.values.push(id, Value::Deref { chain, ty });
                }
                let value = self.load(&chain)?;
                self.push_ssa(id, value)
            }
            Op::Store => {
                let (chain, _) = self.pointer(inst.word(1)?)?;
                let value = self.ssa_value(inst.word(2)?)?;
                self.store(value, &chain)
            }
            Op::CopyMemory => {
                let (dst, _) = self.pointer(inst.word(1)?)?;
                let (src, _) = self.pointer(inst.word(2)?)?;
                self.copy_memory(&dst, &src)
            }
            Op::FunctionCall => self.function_call(inst),
            Op::CopyMemorySized => Err(crate::unsupported("OpCopyMemorySized")),
            Op::ArrayLength => Err(crate::unsupported("OpArrayLength")),
            other => Err(crate::malformed(format!("{other:?} is not a memory instruction"))),
        }
    }

    fn pointer(&self, id: u32) -> Result<(Deref, Handle<SpvType>), ParseError> {
        let (chain, ty) = self.values.deref(id)?;
        Ok((chain.clone(), ty))
    }

    fn access_chain(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let id = inst.word(2)?;
        let base = inst.word(3)?;
        let (mut chain, mut ty, sampler) = match self.values.get_untyped(base)?.clone() {
            Value::Deref { chain, ty } => (chain, ty, None),
            Value::SampledImage(SampledImage {
                image: Some(image),
                image_type: Some(image_type),
                sampler,
            }) => (image, image_type, Some(sampler)),
            other => {
                return Err(ParseError::WrongValueKind {
                    id: base,
                    expected: crate::ValueKind::Deref,
                    found: other.kind(),
                });
            }
        };

        for &index in inst.words_from(4) {
            let ir = self.types[ty].ty;
            let step = match Shape::of(&self.module.types[ir].inner) {
                Shape::Vector | Shape::Matrix | Shape::Array => {
                    let element = self.types[ty]
                        .element
                        .ok_or_else(|| crate::malformed("indexed type has no element type"))?;
                    let constant = match *self.values.get_untyped(index)? {
                        Value::Constant { constant, .. } => Some(constant),
                        _ => None,
                    };
                    let access = match constant {
                        Some(constant) => ArrayIndex::Direct(self.scalar_constant(constant)?),
                        None => ArrayIndex::Indirect(self.ssa_leaf(index)?),
                    };
                    ty = element;
                    Access::Index(access)
                }
                Shape::Struct => {
                    let (_, constant) = self.values.constant(index)?;
                    let member = self.scalar_constant(constant)?;
                    ty = *self.types[ty].members.get(member as usize).ok_or_else(|| {
                        crate::malformed(format!(
                            "access chain {id} selects missing member {member}"
                        ))
                    })?;
                    Access::Member(member)
                }
                Shape::Other => {
                    return Err(crate::malformed(format!(
                        "access chain {id} indexes a non-composite"
                    )));
                }
            };
            chain.path.push(DerefStep {
                access: step,
                ty: self.types[ty].ty,
            });

            if let Some(builtin) = self.types[ty].builtin {
                chain = self.redirect_to_builtin(chain, builtin, self.types[ty].ty)?;
            }
        }

        let value = match sampler {
            Some(sampler) => Value::SampledImage(SampledImage {
                image: Some(chain),
                image_type: Some(ty),
                sampler,
            }),
            None => Value::Deref { chain, ty },
        };
        self.values.push(id, value)
    }

    /// Replaces a chain into a builtin block member with one rooted at the
    /// builtin's own variable. Per-vertex geometry inputs keep their vertex
    /// index.
    fn redirect_to_builtin(
        &mut self,
        chain: Deref,
        builtin: BuiltIn,
        builtin_ty: Handle<Type>,
    ) -> Result<Deref, ParseError> {
        let base = &self.module.variables[chain.variable];
        let mode = base.mode;
        if !matches!(self.module.types[base.ty].inner, TypeInner::Array { .. }) {
            let var = self.builtin_variable(builtin, mode, builtin_ty)?;
            return Ok(Deref::new(var));
        }

        if self.module.info.stage != ShaderStage::Geometry || mode != VariableMode::ShaderIn {
            return Err(crate::malformed(format!(
                "array of {builtin:?} outside of geometry inputs"
            )));
        }
        if !is_per_vertex(builtin) {
            return Err(crate::malformed(format!("{builtin:?} is not stored per vertex")));
        }
        let vertices = self.module.info.geometry.vertices_in;
        if vertices == 0 {
            return Err(crate::malformed("per-vertex input without an input primitive"));
        }
        let vertex = match chain.path.first() {
            Some(&DerefStep {
                access: Access::Index(index),
                ..
            }) => index,
            _ => return Err(crate::malformed("per-vertex builtin without a vertex index")),
        };
        let array = self.module.insert_type(TypeInner::Array {
            base: builtin_ty,
            size: ArraySize::Constant(vertices),
        });
        let var = self.builtin_variable(builtin, mode, array)?;
        Ok(Deref {
            variable: var,
            path: vec![DerefStep {
                access: Access::Index(vertex),
                ty: builtin_ty,
            }],
        })
    }

    pub(crate) fn scalar_constant(
        &self,
        constant: Handle<crate::constant::Constant>,
    ) -> Result<u32, ParseError> {
        self.constants[constant]
            .values
            .first()
            .copied()
            .ok_or_else(|| crate::malformed("index constant is not a scalar"))
    }

    fn copy_memory(&mut self, dst: &Deref, src: &Deref) -> Result<(), ParseError> {
        let (_, src_component) = self.split_component(src)?;
        let (_, dst_component) = self.split_component(dst)?;
        let interface = self.module.variables[src.variable].interface_type.is_some();
        let external = self.externals.contains_key(&src.variable)
            || self.externals.contains_key(&dst.variable);
        if src_component.is_some() || dst_component.is_some() || interface || external {
            let value = self.load(src)?;
            return self.store(value, dst);
        }
        self.emit_void(Operation::CopyVariable {
            dst: dst.clone(),
            src: src.clone(),
        })?;
        Ok(())
    }

    fn function_call(&mut self, inst: &SpvInstruction<'_>) -> Result<(), ParseError> {
        let id = inst.word(2)?;
        let callee = self.values.function(inst.word(3)?)?;
        let (params, result) = {
            let function = &self.module.functions[callee];
            (function.parameters.len(), function.result)
        };
        let args = inst.words_from(4);
        if args.len() != params {
            return Err(crate::malformed(format!(
                "call {id} passes {} arguments to a function of {params}",
                args.len()
            )));
        }

        let mut arguments = Vec::with_capacity(args.len());
        for &arg in args {
            if let Value::Deref { chain, .. } = self.values.get_untyped(arg)? {
                arguments.push(chain.clone());
                continue;
            }
            let value = self.ssa_value(arg)?;
            let ty = self.ssa_node(value)?.ty;
            let tmp = Deref::new(self.local_variable("arg_tmp", ty)?);
            self.store(value, &tmp)?;
            arguments.push(tmp);
        }

        let out = match result {
            Some(ty) => Some(Deref::new(self.local_variable("out_tmp", ty)?)),
            None => None,
        };
        self.emit_void(Operation::Call {
            function: callee,
            arguments,
            result: out.clone(),
        })?;

        match out {
            Some(out) => {
                let value = self.load(&out)?;
                self.push_ssa(id, value)
            }
            None => {
                let ty = self.values.ty(inst.word(1)?)?;
                self.values.push(id, Value::Undef(ty))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Loads and stores
// ---------------------------------------------------------------------------

impl Builder<'_> {
    /// Splits a trailing vector component selector off `chain`.
    fn split_component(&self, chain: &Deref) -> Result<(Deref, Option<ArrayIndex>), ParseError> {
        let is_leaf = |ty: Handle<Type>| self.module.types[ty].inner.is_vector_or_scalar();
        let tail = if is_leaf(self.module.variables[chain.variable].ty) {
            Some(0)
        } else {
            chain.path.iter().position(|step| is_leaf(step.ty)).map(|i| i + 1)
        };
        match tail {
            Some(len) if len < chain.path.len() => {
                if len + 1 != chain.path.len() {
                    return Err(crate::malformed("access chain continues past a vector component"));
                }
                let Access::Index(index) = chain.path[len].access else {
                    return Err(crate::malformed("member access into a vector"));
                };
                let mut parent = chain.clone();
                parent.path.truncate(len);
                Ok((parent, Some(index)))
            }
            _ => Ok((chain.clone(), None)),
        }
    }

    pub(crate) fn load(&mut self, chain: &Deref) -> Result<Handle<SsaValue>, ParseError> {
        if let Some(&external) = self.externals.get(&chain.variable) {
            return self.block_load(chain, external);
        }
        let (mut parent, component) = self.split_component(chain)?;
        let ty = self.module.deref_type(&parent);
        let value = self.load_variable(&mut parent, ty)?;
        let Some(index) = component else {
            return Ok(value);
        };
        let vector = self.leaf_of(value)?;
        let def = match index {
            ArrayIndex::Direct(i) => self.vector_extract(vector, i)?,
            ArrayIndex::Indirect(i) => self.vector_extract_dynamic(vector, i)?,
        };
        let ty = self.def_type(def)?;
        self.new_ssa(SsaValue::leaf(ty, def))
    }

    pub(crate) fn store(
        &mut self,
        value: Handle<SsaValue>,
        chain: &Deref,
    ) -> Result<(), ParseError> {
        if let Some(&external) = self.externals.get(&chain.variable) {
            return self.block_store(value, chain, external);
        }
        let (mut parent, component) = self.split_component(chain)?;
        let Some(index) = component else {
            return self.store_variable(value, &mut parent);
        };
        let ty = self.module.deref_type(&parent);
        let current = self.load_variable(&mut parent, ty)?;
        let vector = self.leaf_of(current)?;
        let scalar = self.leaf_of(value)?;
        let def = match index {
            ArrayIndex::Direct(i) => self.vector_insert(vector, scalar, i)?,
            ArrayIndex::Indirect(i) => self.vector_insert_dynamic(vector, scalar, i)?,
        };
        let updated = self.new_ssa(SsaValue::leaf(ty, def))?;
        self.store_variable(updated, &mut parent)
    }

    fn leaf_of(&self, value: Handle<SsaValue>) -> Result<Handle<Instruction>, ParseError> {
        self.ssa_node(value)?
            .as_leaf()
            .ok_or_else(|| crate::malformed("expected a scalar or vector value"))
    }

    fn load_variable(
        &mut self,
        chain: &mut Deref,
        ty: Handle<Type>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let inner = self.module.types[ty].inner.clone();
        if let Some(scalar) = inner.scalar().filter(|_| inner.is_vector_or_scalar()) {
            let mut def = self.emit(Operation::LoadVariable(chain.clone()), ty)?;
            if scalar.kind == ScalarKind::Bool
                && self.module.variables[chain.variable].mode == VariableMode::Uniform
            {
                def = self.normalize_bool(def, ty)?;
            }
            return self.new_ssa(SsaValue::leaf(ty, def));
        }

        let is_struct = matches!(inner, TypeInner::Struct { .. });
        let mut elements = Vec::new();
        for (i, child) in self.child_types(ty)?.into_iter().enumerate() {
            chain.path.push(DerefStep {
                access: member_or_index(is_struct, i),
                ty: child,
            });
            let element = self.load_variable(chain, child);
            chain.path.pop();
            elements.push(element?);
        }
        self.new_ssa(SsaValue::composite(ty, elements))
    }

    fn store_variable(
        &mut self,
        value: Handle<SsaValue>,
        chain: &mut Deref,
    ) -> Result<(), ParseError> {
        match self.ssa_node(value)?.kind.clone() {
            SsaKind::Leaf(def) => {
                let components = self.def_components(def)?;
                self.emit_void(Operation::StoreVariable {
                    deref: chain.clone(),
                    value: def,
                    mask: WriteMask::first(components),
                })?;
                Ok(())
            }
            SsaKind::Composite(elements) => {
                let ty = self.module.deref_type(chain);
                let is_struct = matches!(self.module.types[ty].inner, TypeInner::Struct { .. });
                let child_types = self.child_types(ty)?;
                if child_types.len() != elements.len() {
                    return Err(crate::malformed("stored value does not match the pointer type"));
                }
                for (i, (element, child)) in elements.into_iter().zip(child_types).enumerate() {
                    chain.path.push(DerefStep {
                        access: member_or_index(is_struct, i),
                        ty: child,
                    });
                    let stored = self.store_variable(element, chain);
                    chain.path.pop();
                    stored?;
                }
                Ok(())
            }
        }
    }

    /// Turns a zero/nonzero boolean from external memory into a canonical one.
    fn normalize_bool(
        &mut self,
        def: Handle<Instruction>,
        ty: Handle<Type>,
    ) -> Result<Handle<Instruction>, ParseError> {
        let components = self.def_components(def)?;
        let uint = self.vector_type(Scalar::U32, components);
        let zero = self.insert(
            InsertPoint::Preamble,
            Operation::Constant(vec![0; components as usize]),
            Some(uint),
        )?;
        self.emit(
            Operation::Binary {
                op: BinaryOp::NotEqual,
                kind: ScalarKind::Uint,
                left: def,
                right: zero,
            },
            ty,
        )
    }
}

fn member_or_index(is_struct: bool, index: usize) -> Access {
    if is_struct {
        Access::Member(index as u32)
    } else {
        Access::Index(ArrayIndex::Direct(index as u32))
    }
}

// ---------------------------------------------------------------------------
// External blocks
// ---------------------------------------------------------------------------

impl Builder<'_> {
    /// Walks `chain` through the block layout: returns the buffer to access,
    /// the byte offset and the type found there, and the component stride
    /// when the value is a column of a row-major matrix.
    fn block_address(
        &mut self,
        chain: &Deref,
        external: External,
    ) -> Result<(BlockAccess, Handle<Instruction>, Handle<SpvType>, Option<u32>), ParseError> {
        let mut ty = external.root;
        let mut steps = chain.path.as_slice();

        let mut array_index = ArrayIndex::Direct(0);
        if let TypeInner::Array { .. } = self.module.types[self.types[ty].ty].inner {
            let Some((first, rest)) = steps.split_first() else {
                return Err(crate::unsupported("access to a whole array of blocks"));
            };
            let Access::Index(index) = first.access else {
                return Err(crate::malformed("member access into an array of blocks"));
            };
            array_index = index;
            ty = self.element(ty)?;
            steps = rest;
        }

        let mut offset = Offset::default();
        let mut component_stride = None;
        for step in steps {
            let spv = &self.types[ty];
            let (stride, row_major, element) = (spv.stride, spv.row_major, spv.element);
            let shape = Shape::of(&self.module.types[spv.ty].inner);
            match (shape, step.access) {
                (Shape::Struct, Access::Member(member)) => {
                    let member = member as usize;
                    let (Some(&member_offset), Some(&member_ty)) =
                        (spv.offsets.get(member), spv.members.get(member))
                    else {
                        return Err(crate::malformed("access chain selects a missing member"));
                    };
                    offset.constant = offset.constant.wrapping_add(member_offset);
                    ty = member_ty;
                }
                (Shape::Array, Access::Index(index)) => {
                    if stride == 0 {
                        return Err(crate::malformed("array in a block without a stride"));
                    }
                    self.add_scaled(&mut offset, index, stride)?;
                    ty = element.ok_or_else(|| crate::malformed("array without an element type"))?;
                }
                (Shape::Matrix, Access::Index(index)) => {
                    if stride == 0 {
                        return Err(crate::malformed("matrix in a block without a stride"));
                    }
                    if row_major {
                        self.add_scaled(&mut offset, index, 4)?;
                        component_stride = Some(stride);
                    } else {
                        self.add_scaled(&mut offset, index, stride)?;
                    }
                    ty = element.ok_or_else(|| crate::malformed("matrix without a column type"))?;
                }
                (Shape::Vector, Access::Index(index)) => {
                    let stride = component_stride.take().unwrap_or(4);
                    self.add_scaled(&mut offset, index, stride)?;
                    ty = element
                        .ok_or_else(|| crate::malformed("vector without a component type"))?;
                }
                _ => return Err(crate::malformed("access chain does not match the block layout")),
            }
        }

        let resource = match external.kind {
            BufferKind::PushConstant => None,
            kind => {
                let array_index = match array_index {
                    ArrayIndex::Direct(i) => self.const_u32(i)?,
                    ArrayIndex::Indirect(i) => i,
                };
                let data = &self.module.variables[chain.variable].data;
                let (set, binding) = (data.descriptor_set.unwrap_or(0), data.binding.unwrap_or(0));
                let uint = self.scalar_type(Scalar::U32);
                Some(self.emit(
                    Operation::ResourceIndex {
                        set,
                        binding,
                        kind,
                        array_index,
                    },
                    uint,
                )?)
            }
        };

        let offset = match offset.dynamic {
            None => self.const_u32(offset.constant)?,
            Some(dynamic) => self.offset_plus(dynamic, offset.constant)?,
        };
        let access = BlockAccess {
            kind: external.kind,
            resource,
        };
        Ok((access, offset, ty, component_stride))
    }

    fn element(&self, ty: Handle<SpvType>) -> Result<Handle<SpvType>, ParseError> {
        self.types[ty]
            .element
            .ok_or_else(|| crate::malformed("composite without an element type"))
    }

    fn add_scaled(
        &mut self,
        offset: &mut Offset,
        index: ArrayIndex,
        stride: u32,
    ) -> Result<(), ParseError> {
        match index {
            ArrayIndex::Direct(i) => {
                offset.constant = offset.constant.wrapping_add(i.wrapping_mul(stride));
            }
            ArrayIndex::Indirect(i) => {
                let uint = self.scalar_type(Scalar::U32);
                let stride = self.const_u32(stride)?;
                let scaled = self.emit(
                    Operation::Binary {
                        op: BinaryOp::Multiply,
                        kind: ScalarKind::Uint,
                        left: i,
                        right: stride,
                    },
                    uint,
                )?;
                offset.dynamic = Some(match offset.dynamic {
                    Some(previous) => self.emit(
                        Operation::Binary {
                            op: BinaryOp::Add,
                            kind: ScalarKind::Uint,
                            left: previous,
                            right: scaled,
                        },
                        uint,
                    )?,
                    None => scaled,
                });
            }
        }
        Ok(())
    }

    /// `base + bytes`, folded when `base` is a constant.
    fn offset_plus(
        &mut self,
        base: Handle<Instruction>,
        bytes: u32,
    ) -> Result<Handle<Instruction>, ParseError> {
        if bytes == 0 {
            return Ok(base);
        }
        if let Operation::Constant(ref words) = self.fx_ref()?.function.instructions[base].op {
            if let [word] = words[..] {
                return self.const_u32(word.wrapping_add(bytes));
            }
        }
        let uint = self.scalar_type(Scalar::U32);
        let bytes = self.const_u32(bytes)?;
        self.emit(
            Operation::Binary {
                op: BinaryOp::Add,
                kind: ScalarKind::Uint,
                left: base,
                right: bytes,
            },
            uint,
        )
    }

    fn block_load(
        &mut self,
        chain: &Deref,
        external: External,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let (access, offset, ty, component_stride) = self.block_address(chain, external)?;
        self.check_tree_size(self.types[ty].ty)?;
        self.block_load_value(&access, offset, ty, component_stride)
    }

    fn block_load_value(
        &mut self,
        access: &BlockAccess,
        offset: Handle<Instruction>,
        ty: Handle<SpvType>,
        component_stride: Option<u32>,
    ) -> Result<Handle<SsaValue>, ParseError> {
        let spv = self.types[ty].clone();
        let ir = spv.ty;
        match self.module.types[ir].inner.clone() {
            TypeInner::Scalar(scalar) | TypeInner::Vector { scalar, .. } => {
                let components = self.module.types[ir].inner.components().unwrap_or(1);
                let mut def = match component_stride {
                    Some(stride) if components > 1 => {
                        let scalar_ty = self.scalar_type(scalar);
                        let mut lanes = Vec::with_capacity(components as usize);
                        for i in 0..u32::from(components) {
                            let at = self.offset_plus(offset, i * stride)?;
                            let lane = self.buffer_load(access, at, scalar_ty)?;
                            lanes.push(Lane::new(lane, 0));
                        }
                        self.emit(Operation::Compose(lanes), ir)?
                    }
                    _ => self.buffer_load(access, offset, ir)?,
                };
                if scalar.kind == ScalarKind::Bool {
                    def = self.normalize_bool(def, ir)?;
                }
                self.new_ssa(SsaValue::leaf(ir, def))
            }
            TypeInner::Matrix {
                columns,
                rows,
                scalar,
            } => {
                let column_ty = self.element(ty)?;
                if !spv.row_major {
                    let mut elements = Vec::with_capacity(columns as usize);
                    for i in 0..columns as u32 {
                        let at = self.offset_plus(offset, i * spv.stride)?;
                        elements.push(self.block_load_value(access, at, column_ty, None)?);
                    }
                    return self.new_ssa(SsaValue::composite(ir, elements));
                }
                // Each stored row is a column of the transpose.
                let row_ty = self.vector_type(scalar, columns as u8);
                let transposed_ty = tessera_ir::transposed_type(&mut self.module.types, ir)
                    .ok_or_else(|| crate::malformed("row-major value is not a matrix"))?;
                let mut elements = Vec::with_capacity(rows as usize);
                for i in 0..rows as u32 {
                    let at = self.offset_plus(offset, i * spv.stride)?;
                    let def = self.buffer_load(access, at, row_ty)?;
                    elements.push(self.new_ssa(SsaValue::leaf(row_ty, def))?);
                }
                let transposed = self.new_ssa(SsaValue::composite(transposed_ty, elements))?;
                self.transpose(transposed)
            }
            TypeInner::Struct { .. } => {
                let mut elements = Vec::with_capacity(spv.members.len());
                for (&member, &member_offset) in spv.members.iter().zip(&spv.offsets) {
                    let at = self.offset_plus(offset, member_offset)?;
                    elements.push(self.block_load_value(access, at, member, None)?);
                }
                self.new_ssa(SsaValue::composite(ir, elements))
            }
            TypeInner::Array {
                size: ArraySize::Constant(len),
                ..
            } => {
                let element = self.element(ty)?;
                let mut elements = Vec::with_capacity(len as usize);
                for i in 0..len {
                    let at = self.offset_plus(offset, i.wrapping_mul(spv.stride))?;
                    elements.push(self.block_load_value(access, at, element, None)?);
                }
                self.new_ssa(SsaValue::composite(ir, elements))
            }
            TypeInner::Array { .. } => Err(crate::unsupported("loads of whole runtime arrays")),
            _ => Err(crate::malformed("type cannot be loaded from a block")),
        }
    }

    fn buffer_load(
        &mut self,
        access: &BlockAccess,
        offset: Handle<Instruction>,
        ty: Handle<Type>,
    ) -> Result<Handle<Instruction>, ParseError> {
        self.emit(
            Operation::LoadBuffer {
                kind: access.kind,
                resource: access.resource,
                offset,
            },
            ty,
        )
    }

    fn block_store(
        &mut self,
        value: Handle<SsaValue>,
        chain: &Deref,
        external: External,
    ) -> Result<(), ParseError> {
        if external.kind != BufferKind::Storage {
            let name = self.module.variables[chain.variable].name.clone();
            return Err(crate::malformed(format!(
                "store to read-only block {}",
                name.as_deref().unwrap_or("<unnamed>")
            )));
        }
        let (access, offset, ty, component_stride) = self.block_address(chain, external)?;
        self.check_tree_size(self.types[ty].ty)?;
        let resource = access
            .resource
            .ok_or_else(|| crate::malformed("storage block without a resource"))?;
        self.block_store_value(resource, value, offset, ty, component_stride)
    }

    fn block_store_value(
        &mut self,
        resource: Handle<Instruction>,
        value: Handle<SsaValue>,
        offset: Handle<Instruction>,
        ty: Handle<SpvType>,
        component_stride: Option<u32>,
    ) -> Result<(), ParseError> {
        let spv = self.types[ty].clone();
        let inner = self.module.types[spv.ty].inner.clone();
        if inner.is_vector_or_scalar() {
            let def = self.leaf_of(value)?;
            let components = self.def_components(def)?;
            match component_stride {
                Some(stride) if components > 1 => {
                    for i in 0..components {
                        let lane = self.vector_extract(def, u32::from(i))?;
                        let at = self.offset_plus(offset, u32::from(i) * stride)?;
                        self.buffer_store(resource, at, lane, 1)?;
                    }
                }
                _ => self.buffer_store(resource, offset, def, components)?,
            }
            return Ok(());
        }

        let layout: Vec<(Handle<SpvType>, u32)> = match inner {
            TypeInner::Matrix { .. } if spv.row_major => {
                let rows = self.transpose(value)?;
                for (i, row) in self.ssa_children(rows)?.into_iter().enumerate() {
                    let def = self.leaf_of(row)?;
                    let components = self.def_components(def)?;
                    let at = self.offset_plus(offset, (i as u32).wrapping_mul(spv.stride))?;
                    self.buffer_store(resource, at, def, components)?;
                }
                return Ok(());
            }
            TypeInner::Matrix { columns, .. } => {
                let column = self.element(ty)?;
                (0..columns as u32).map(|i| (column, i * spv.stride)).collect()
            }
            TypeInner::Array {
                size: ArraySize::Constant(len),
                ..
            } => {
                let element = self.element(ty)?;
                (0..len).map(|i| (element, i.wrapping_mul(spv.stride))).collect()
            }
            TypeInner::Struct { .. } => spv
                .members
                .iter()
                .copied()
                .zip(spv.offsets.iter().copied())
                .collect(),
            _ => return Err(crate::malformed("type cannot be stored in a block")),
        };

        let elements = self.ssa_children(value)?;
        if elements.len() != layout.len() {
            return Err(crate::malformed("stored value does not match the block layout"));
        }
        for (element, (element_ty, bytes)) in elements.into_iter().zip(layout) {
            let at = self.offset_plus(offset, bytes)?;
            self.block_store_value(resource, element, at, element_ty, None)?;
        }
        Ok(())
    }

    fn buffer_store(
        &mut self,
        resource: Handle<Instruction>,
        offset: Handle<Instruction>,
        value: Handle<Instruction>,
        components: u8,
    ) -> Result<(), ParseError> {
        self.emit_void(Operation::StoreBuffer {
            resource,
            offset,
            value,
            mask: WriteMask::first(components),
        })?;
        Ok(())
    }
}

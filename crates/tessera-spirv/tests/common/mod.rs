//! Shared helpers: a SPIR-V assembler for hand-written modules and an IR
//! interpreter for running the translated entry point.

pub mod eval;

use spirv::{
    Capability, Decoration, Dim, ExecutionMode, ExecutionModel, ImageFormat, Op, StorageClass,
};
use tessera_ir::Shader;
use tessera_spirv::{Options, ParseError};

/// Builds a SPIR-V module section by section, so instructions can be added
/// in whatever order a test finds natural.
#[allow(dead_code)]
#[derive(Default)]
pub struct Assembler {
    next_id: u32,
    capabilities: Vec<u32>,
    imports: Vec<u32>,
    memory_model: Vec<u32>,
    entry_points: Vec<u32>,
    execution_modes: Vec<u32>,
    debug: Vec<u32>,
    annotations: Vec<u32>,
    globals: Vec<u32>,
    functions: Vec<u32>,
    in_function: bool,
}

#[allow(dead_code)]
impl Assembler {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Emits `op` with raw operand words into the section it belongs to.
    pub fn op(&mut self, op: Op, operands: &[u32]) {
        let section = match op {
            Op::Capability => &mut self.capabilities,
            Op::Extension | Op::ExtInstImport => &mut self.imports,
            Op::MemoryModel => &mut self.memory_model,
            Op::EntryPoint => &mut self.entry_points,
            Op::ExecutionMode => &mut self.execution_modes,
            Op::Name | Op::MemberName | Op::Source | Op::String => &mut self.debug,
            Op::Decorate
            | Op::MemberDecorate
            | Op::DecorationGroup
            | Op::GroupDecorate
            | Op::GroupMemberDecorate => &mut self.annotations,
            Op::Function => {
                self.in_function = true;
                &mut self.functions
            }
            Op::FunctionEnd => {
                self.in_function = false;
                &mut self.functions
            }
            _ if is_declaration(op, operands) => &mut self.globals,
            _ if self.in_function => &mut self.functions,
            _ => &mut self.globals,
        };
        section.push(((operands.len() as u32 + 1) << 16) | op as u32);
        section.extend_from_slice(operands);
    }

    /// Emits `op` defining a fresh id of type `ty`; returns the id.
    pub fn value(&mut self, op: Op, ty: u32, operands: &[u32]) -> u32 {
        let id = self.id();
        let mut words = vec![ty, id];
        words.extend_from_slice(operands);
        self.op(op, &words);
        id
    }

    /// Emits `op` defining a fresh id without a type (types, labels).
    pub fn define(&mut self, op: Op, operands: &[u32]) -> u32 {
        let id = self.id();
        let mut words = vec![id];
        words.extend_from_slice(operands);
        self.op(op, &words);
        id
    }

    /// The module's words, header included.
    pub fn finish(&self) -> Vec<u32> {
        let mut words = vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, self.next_id, 0];
        for section in [
            &self.capabilities,
            &self.imports,
            &self.memory_model,
            &self.entry_points,
            &self.execution_modes,
            &self.debug,
            &self.annotations,
            &self.globals,
            &self.functions,
        ] {
            words.extend_from_slice(section);
        }
        words
    }

    // ---- module preamble ------------------------------------------------

    pub fn capability(&mut self, cap: Capability) {
        self.op(Op::Capability, &[cap as u32]);
    }

    pub fn glsl450(&mut self) -> u32 {
        let mut words = string("GLSL.std.450");
        let id = self.id();
        words.insert(0, id);
        self.op(Op::ExtInstImport, &words);
        id
    }

    pub fn memory_model(&mut self) {
        self.op(
            Op::MemoryModel,
            &[
                spirv::AddressingModel::Logical as u32,
                spirv::MemoryModel::GLSL450 as u32,
            ],
        );
    }

    pub fn entry_point(
        &mut self,
        model: ExecutionModel,
        function: u32,
        name: &str,
        interface: &[u32],
    ) {
        let mut words = vec![model as u32, function];
        words.extend(string(name));
        words.extend_from_slice(interface);
        self.op(Op::EntryPoint, &words);
    }

    pub fn execution_mode(&mut self, function: u32, mode: ExecutionMode, literals: &[u32]) {
        let mut words = vec![function, mode as u32];
        words.extend_from_slice(literals);
        self.op(Op::ExecutionMode, &words);
    }

    pub fn name(&mut self, id: u32, name: &str) {
        let mut words = vec![id];
        words.extend(string(name));
        self.op(Op::Name, &words);
    }

    pub fn decorate(&mut self, id: u32, decoration: Decoration, literals: &[u32]) {
        let mut words = vec![id, decoration as u32];
        words.extend_from_slice(literals);
        self.op(Op::Decorate, &words);
    }

    pub fn member_decorate(
        &mut self,
        id: u32,
        member: u32,
        decoration: Decoration,
        literals: &[u32],
    ) {
        let mut words = vec![id, member, decoration as u32];
        words.extend_from_slice(literals);
        self.op(Op::MemberDecorate, &words);
    }

    // ---- types and constants --------------------------------------------

    pub fn type_void(&mut self) -> u32 {
        self.define(Op::TypeVoid, &[])
    }

    pub fn type_bool(&mut self) -> u32 {
        self.define(Op::TypeBool, &[])
    }

    pub fn type_uint(&mut self) -> u32 {
        self.define(Op::TypeInt, &[32, 0])
    }

    pub fn type_int(&mut self) -> u32 {
        self.define(Op::TypeInt, &[32, 1])
    }

    pub fn type_float(&mut self) -> u32 {
        self.define(Op::TypeFloat, &[32])
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        self.define(Op::TypeVector, &[component, count])
    }

    pub fn type_matrix(&mut self, column: u32, count: u32) -> u32 {
        self.define(Op::TypeMatrix, &[column, count])
    }

    pub fn type_struct(&mut self, members: &[u32]) -> u32 {
        self.define(Op::TypeStruct, members)
    }

    /// `element[length]`, declaring the length as a `uint` constant of type
    /// `uint`.
    pub fn type_array(&mut self, element: u32, uint: u32, length: u32) -> u32 {
        let length = self.constant(uint, length);
        self.define(Op::TypeArray, &[element, length])
    }

    pub fn type_runtime_array(&mut self, element: u32) -> u32 {
        self.define(Op::TypeRuntimeArray, &[element])
    }

    /// A non-arrayed, single-sampled image; `sampled` is 1 for textures and
    /// 2 for storage images.
    pub fn type_image(
        &mut self,
        sampled_type: u32,
        dim: Dim,
        sampled: u32,
        format: ImageFormat,
    ) -> u32 {
        self.define(
            Op::TypeImage,
            &[sampled_type, dim as u32, 0, 0, 0, sampled, format as u32],
        )
    }

    pub fn type_sampled_image(&mut self, image: u32) -> u32 {
        self.define(Op::TypeSampledImage, &[image])
    }

    pub fn type_pointer(&mut self, class: StorageClass, pointee: u32) -> u32 {
        self.define(Op::TypePointer, &[class as u32, pointee])
    }

    pub fn type_function(&mut self, result: u32, params: &[u32]) -> u32 {
        let mut words = vec![result];
        words.extend_from_slice(params);
        self.define(Op::TypeFunction, &words)
    }

    pub fn constant(&mut self, ty: u32, word: u32) -> u32 {
        self.value(Op::Constant, ty, &[word])
    }

    pub fn constant_f32(&mut self, ty: u32, value: f32) -> u32 {
        self.constant(ty, value.to_bits())
    }

    pub fn composite(&mut self, ty: u32, parts: &[u32]) -> u32 {
        self.value(Op::ConstantComposite, ty, parts)
    }

    pub fn null(&mut self, ty: u32) -> u32 {
        self.value(Op::ConstantNull, ty, &[])
    }

    pub fn undef(&mut self, ty: u32) -> u32 {
        self.value(Op::Undef, ty, &[])
    }

    pub fn variable(&mut self, pointer: u32, class: StorageClass) -> u32 {
        self.value(Op::Variable, pointer, &[class as u32])
    }

    // ---- function bodies ------------------------------------------------

    /// Opens a function whose id was reserved with [`Assembler::id`].
    pub fn function(&mut self, id: u32, result: u32, ty: u32) {
        self.op(Op::Function, &[result, id, 0, ty]);
    }

    pub fn label(&mut self, id: u32) {
        self.op(Op::Label, &[id]);
    }

    pub fn function_end(&mut self) {
        self.op(Op::FunctionEnd, &[]);
    }

    pub fn store(&mut self, pointer: u32, value: u32) {
        self.op(Op::Store, &[pointer, value]);
    }

    pub fn load(&mut self, ty: u32, pointer: u32) -> u32 {
        self.value(Op::Load, ty, &[pointer])
    }

    pub fn access_chain(&mut self, ty: u32, base: u32, indices: &[u32]) -> u32 {
        let mut words = vec![base];
        words.extend_from_slice(indices);
        self.value(Op::AccessChain, ty, &words)
    }

    pub fn branch(&mut self, target: u32) {
        self.op(Op::Branch, &[target]);
    }

    pub fn branch_conditional(&mut self, condition: u32, accept: u32, reject: u32) {
        self.op(Op::BranchConditional, &[condition, accept, reject]);
    }

    pub fn selection_merge(&mut self, merge: u32) {
        self.op(Op::SelectionMerge, &[merge, 0]);
    }

    pub fn ret(&mut self) {
        self.op(Op::Return, &[]);
    }
}

/// Types, constants and module-scope variables, which always go to the
/// declarations section.
fn is_declaration(op: Op, operands: &[u32]) -> bool {
    match op {
        Op::TypeVoid
        | Op::TypeBool
        | Op::TypeInt
        | Op::TypeFloat
        | Op::TypeVector
        | Op::TypeMatrix
        | Op::TypeImage
        | Op::TypeSampler
        | Op::TypeSampledImage
        | Op::TypeArray
        | Op::TypeRuntimeArray
        | Op::TypeStruct
        | Op::TypePointer
        | Op::TypeFunction
        | Op::Constant
        | Op::ConstantTrue
        | Op::ConstantFalse
        | Op::ConstantComposite
        | Op::ConstantNull => true,
        Op::Variable => operands.get(2) != Some(&(StorageClass::Function as u32)),
        _ => false,
    }
}

/// A literal string operand: UTF-8, nul-terminated, padded to whole words.
#[allow(dead_code)]
pub fn string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Translates `main` and checks every resulting function is well formed.
#[allow(dead_code)]
pub fn translate(words: &[u32]) -> Shader {
    translate_with(words, &Options::default()).expect("module should translate")
}

#[allow(dead_code)]
pub fn translate_with(words: &[u32], options: &Options) -> Result<Shader, ParseError> {
    let shader = tessera_spirv::parse(words, "main", options)?;
    for (_, function) in shader.module.functions.iter() {
        if let Err(err) = function.verify() {
            panic!(
                "{} failed verification: {err}\n{}",
                function.name.as_deref().unwrap_or("<anonymous>"),
                tessera_ir::dump_module(&shader.module)
            );
        }
    }
    Ok(shader)
}

/// The common preamble of a compute shader storing into one storage buffer
/// of `uint`s or `float`s.
#[allow(dead_code)]
pub struct Compute {
    pub asm: Assembler,
    pub main: u32,
    pub void: u32,
    pub uint: u32,
    pub int: u32,
    pub float: u32,
    pub bool: u32,
    /// `buffer Output { <element> data[]; }` at set 0, binding 0.
    pub output: u32,
    /// Pointer to one output element.
    pub output_element: u32,
    pub zero: u32,
    pub int_zero: u32,
    /// Label of the entry block.
    pub entry: u32,
}

#[allow(dead_code)]
impl Compute {
    /// Starts a compute shader whose output buffer holds `uint`s, or
    /// `float`s when `float_output` is set. The entry function is left open
    /// at its entry label.
    pub fn new(float_output: bool) -> Self {
        Self::with_local_size(float_output, [1, 1, 1])
    }

    pub fn with_local_size(float_output: bool, local_size: [u32; 3]) -> Self {
        let mut asm = Assembler::new();
        asm.capability(Capability::Shader);
        asm.memory_model();
        let main = asm.id();
        asm.entry_point(ExecutionModel::GLCompute, main, "main", &[]);
        asm.execution_mode(main, ExecutionMode::LocalSize, &local_size);
        asm.name(main, "main");

        let void = asm.type_void();
        let bool = asm.type_bool();
        let uint = asm.type_uint();
        let int = asm.type_int();
        let float = asm.type_float();
        let element = if float_output { float } else { uint };

        let array = asm.type_runtime_array(element);
        asm.decorate(array, Decoration::ArrayStride, &[4]);
        let block = asm.type_struct(&[array]);
        asm.decorate(block, Decoration::BufferBlock, &[]);
        asm.member_decorate(block, 0, Decoration::Offset, &[0]);
        let block_ptr = asm.type_pointer(StorageClass::Uniform, block);
        let output = asm.variable(block_ptr, StorageClass::Uniform);
        asm.name(output, "output");
        asm.decorate(output, Decoration::DescriptorSet, &[0]);
        asm.decorate(output, Decoration::Binding, &[0]);
        let output_element = asm.type_pointer(StorageClass::Uniform, element);

        let zero = asm.constant(uint, 0);
        let int_zero = asm.constant(int, 0);
        let fn_ty = asm.type_function(void, &[]);
        asm.function(main, void, fn_ty);
        let entry = asm.id();
        asm.label(entry);

        Self {
            asm,
            main,
            void,
            uint,
            int,
            float,
            bool,
            output,
            output_element,
            zero,
            int_zero,
            entry,
        }
    }

    /// Stores `value` into `output.data[index]`.
    pub fn emit_output(&mut self, index: u32, value: u32) {
        let slot = self.asm.constant(self.uint, index);
        let int_zero = self.int_zero;
        let pointer = self
            .asm
            .access_chain(self.output_element, self.output, &[int_zero, slot]);
        self.asm.store(pointer, value);
    }

    /// Closes the entry function.
    pub fn end_main(&mut self) {
        self.asm.ret();
        self.asm.function_end();
    }

    /// Closes the entry function and returns the module words.
    pub fn finish(mut self) -> Vec<u32> {
        self.end_main();
        self.asm.finish()
    }
}

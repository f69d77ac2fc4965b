//! Display implementations and text dump for debugging.

use std::fmt::{self, Write as _};

use crate::Module;
use crate::arena::{Handle, UniqueArena};
use crate::func::{Block, Function, Merge, Terminator};
use crate::global::{Variable, VariableMode};
use crate::info::ShaderStage;
use crate::instr::{
    Access, ArrayIndex, BinaryOp, Deref, Instruction, MathFunction, Operation, UnaryOp,
};
use crate::types::{ArraySize, ImageDimension, Scalar, ScalarKind, Type, TypeInner, VectorSize};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Sint => write!(f, "sint"),
            Self::Uint => write!(f, "uint"),
            Self::Float => write!(f, "float"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Sint => write!(f, "i{}", self.width * 8),
            ScalarKind::Uint => write!(f, "u{}", self.width * 8),
            ScalarKind::Float => write!(f, "f{}", self.width * 8),
        }
    }
}

impl fmt::Display for VectorSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u32)
    }
}

impl fmt::Display for ImageDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::D1 => write!(f, "1d"),
            Self::D2 => write!(f, "2d"),
            Self::D3 => write!(f, "3d"),
            Self::Cube => write!(f, "cube"),
            Self::Rect => write!(f, "rect"),
            Self::Buffer => write!(f, "buffer"),
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Geometry => write!(f, "geometry"),
            Self::Fragment => write!(f, "fragment"),
            Self::Compute => write!(f, "compute"),
        }
    }
}

impl fmt::Display for VariableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ShaderIn => write!(f, "in"),
            Self::ShaderOut => write!(f, "out"),
            Self::SystemValue => write!(f, "system_value"),
            Self::Uniform => write!(f, "uniform"),
            Self::ShaderStorage => write!(f, "storage"),
            Self::Global => write!(f, "global"),
            Self::Local => write!(f, "local"),
            Self::Parameter => write!(f, "param"),
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Negate => write!(f, "neg"),
            Self::LogicalNot => write!(f, "not"),
            Self::BitwiseNot => write!(f, "inot"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Add => "add",
            Self::Subtract => "sub",
            Self::Multiply => "mul",
            Self::Divide => "div",
            Self::Modulo => "mod",
            Self::Remainder => "rem",
            Self::Equal => "eq",
            Self::NotEqual => "ne",
            Self::Less => "lt",
            Self::LessEqual => "le",
            Self::Greater => "gt",
            Self::GreaterEqual => "ge",
            Self::LogicalAnd => "and",
            Self::LogicalOr => "or",
            Self::BitwiseAnd => "iand",
            Self::BitwiseOr => "ior",
            Self::BitwiseXor => "ixor",
            Self::ShiftLeft => "shl",
            Self::ShiftRight => "shr",
        };
        f.write_str(name)
    }
}

impl fmt::Display for MathFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let debug = format!("{self:?}");
        f.write_str(&debug.to_lowercase())
    }
}

/// Formats a type as a compact string.
pub fn format_type(ty: &Type, types: &UniqueArena<Type>) -> String {
    match ty.name {
        Some(ref name) => format!("{name} = {}", format_type_inner(&ty.inner, types)),
        None => format_type_inner(&ty.inner, types),
    }
}

fn format_type_inner(inner: &TypeInner, types: &UniqueArena<Type>) -> String {
    match *inner {
        TypeInner::Void => "void".into(),
        TypeInner::Scalar(s) => format!("{s}"),
        TypeInner::Vector { size, scalar } => format!("vec{size}<{scalar}>"),
        TypeInner::Matrix {
            columns,
            rows,
            scalar,
        } => format!("mat{columns}x{rows}<{scalar}>"),
        TypeInner::Array { base, size } => {
            let base = type_ref(base, types);
            match size {
                ArraySize::Constant(n) => format!("array<{base}, {n}>"),
                ArraySize::Dynamic => format!("array<{base}>"),
            }
        }
        TypeInner::Struct { ref members } => {
            let fields: Vec<_> = members
                .iter()
                .map(|m| {
                    let name = m.name.as_deref().unwrap_or("_");
                    format!("@{} {name}: {}", m.offset, type_ref(m.ty, types))
                })
                .collect();
            format!("struct {{ {} }}", fields.join(", "))
        }
        TypeInner::Function {
            result,
            ref parameters,
        } => {
            let params: Vec<_> = parameters.iter().map(|&p| type_ref(p, types)).collect();
            format!("fn({}) -> {}", params.join(", "), type_ref(result, types))
        }
        TypeInner::SampledImage {
            dim,
            arrayed,
            shadow,
            kind,
        } => format!(
            "sampler{dim}{}{}<{kind}>",
            if arrayed { "_array" } else { "" },
            if shadow { "_shadow" } else { "" }
        ),
        TypeInner::StorageImage {
            dim,
            arrayed,
            kind,
            format,
        } => format!(
            "image{dim}{}<{kind}, {format:?}>",
            if arrayed { "_array" } else { "" }
        ),
        TypeInner::Sampler => "sampler".into(),
    }
}

fn type_ref(handle: Handle<Type>, types: &UniqueArena<Type>) -> String {
    match types.try_get(handle) {
        Some(Type {
            name: Some(name), ..
        }) => name.clone(),
        Some(ty) => format_type_inner(&ty.inner, types),
        None => format!("{handle:?}"),
    }
}

fn value(handle: Handle<Instruction>) -> String {
    format!("%{}", handle.index())
}

fn block_name(handle: Handle<Block>) -> String {
    format!("bb{}", handle.index())
}

fn format_deref(deref: &Deref, module: &Module) -> String {
    let mut out = match module.variables.try_get(deref.variable) {
        Some(Variable {
            name: Some(name), ..
        }) => format!("&{name}"),
        _ => format!("&var{}", deref.variable.index()),
    };
    for step in &deref.path {
        match step.access {
            Access::Index(ArrayIndex::Direct(i)) => {
                let _ = write!(out, "[{i}]");
            }
            Access::Index(ArrayIndex::Indirect(v)) => {
                let _ = write!(out, "[{}]", value(v));
            }
            Access::Member(m) => {
                let _ = write!(out, ".{m}");
            }
        }
    }
    out
}

fn format_operation(op: &Operation, module: &Module) -> String {
    match *op {
        Operation::Constant(ref words) => {
            let words: Vec<_> = words.iter().map(|w| format!("{w:#x}")).collect();
            format!("const({})", words.join(", "))
        }
        Operation::Undef => "undef".into(),
        Operation::Phi(ref sources) => {
            let srcs: Vec<_> = sources
                .iter()
                .map(|s| format!("{}: {}", block_name(s.block), value(s.value)))
                .collect();
            format!("phi [{}]", srcs.join(", "))
        }
        Operation::Compose(ref lanes) => {
            let lanes: Vec<_> = lanes
                .iter()
                .map(|l| format!("{}.{}", value(l.value), l.index))
                .collect();
            format!("compose({})", lanes.join(", "))
        }
        Operation::Swizzle {
            vector,
            ref pattern,
        } => {
            let pattern: String = pattern
                .iter()
                .map(|&c| ['x', 'y', 'z', 'w'].get(c as usize).copied().unwrap_or('?'))
                .collect();
            format!("{}.{pattern}", value(vector))
        }
        Operation::Unary {
            op,
            kind,
            value: v,
        } => format!("{op}.{kind} {}", value(v)),
        Operation::Binary {
            op,
            kind,
            left,
            right,
        } => format!("{op}.{kind} {}, {}", value(left), value(right)),
        Operation::Select {
            condition,
            accept,
            reject,
        } => format!(
            "select {}, {}, {}",
            value(condition),
            value(accept),
            value(reject)
        ),
        Operation::Math { fun, kind, ref args } => {
            let args: Vec<_> = args.iter().map(|&a| value(a)).collect();
            format!("{fun}.{kind}({})", args.join(", "))
        }
        Operation::Relational { fun, argument } => {
            format!("{}({})", format!("{fun:?}").to_lowercase(), value(argument))
        }
        Operation::Derivative {
            axis,
            control,
            value: v,
        } => format!("d{axis:?}.{control:?} {}", value(v)).to_lowercase(),
        Operation::Convert { value: v, to } => format!("convert {} to {to}", value(v)),
        Operation::Bitcast(v) => format!("bitcast {}", value(v)),
        Operation::LoadVariable(ref deref) => format!("load {}", format_deref(deref, module)),
        Operation::StoreVariable {
            ref deref,
            value: v,
            mask,
        } => format!(
            "store {}, {} mask={:#x}",
            format_deref(deref, module),
            value(v),
            mask.bits()
        ),
        Operation::CopyVariable { ref dst, ref src } => format!(
            "copy {}, {}",
            format_deref(dst, module),
            format_deref(src, module)
        ),
        Operation::ResourceIndex {
            set,
            binding,
            kind,
            array_index,
        } => format!(
            "resource_index {kind:?} set={set} binding={binding} [{}]",
            value(array_index)
        ),
        Operation::LoadBuffer {
            kind,
            resource,
            offset,
        } => match resource {
            Some(r) => format!("load_buffer {kind:?} {} + {}", value(r), value(offset)),
            None => format!("load_buffer {kind:?} {}", value(offset)),
        },
        Operation::StoreBuffer {
            resource,
            offset,
            value: v,
            mask,
        } => format!(
            "store_buffer {} + {}, {} mask={:#x}",
            value(resource),
            value(offset),
            value(v),
            mask.bits()
        ),
        Operation::Texture(ref tex) => {
            let srcs: Vec<_> = tex
                .sources
                .iter()
                .map(|s| format!("{:?}={}", s.kind, value(s.value)))
                .collect();
            let texture = match tex.texture {
                Some(ref t) => format!("{}, ", format_deref(t, module)),
                None => String::new(),
            };
            format!(
                "tex {:?} {texture}{} {}{} ({})",
                tex.op,
                format_deref(&tex.sampler, module),
                tex.dim,
                if tex.arrayed { "_array" } else { "" },
                srcs.join(", ")
            )
        }
        Operation::Image {
            op,
            ref image,
            coordinate,
            sample,
            ref args,
        } => {
            let args: Vec<_> = args.iter().map(|&a| value(a)).collect();
            format!(
                "image {op:?} {} coord={} sample={} ({})",
                format_deref(image, module),
                value(coordinate),
                value(sample),
                args.join(", ")
            )
        }
        Operation::Call {
            function,
            ref arguments,
            ref result,
        } => {
            let args: Vec<_> = arguments.iter().map(|a| format_deref(a, module)).collect();
            let callee = module
                .functions
                .try_get(function)
                .and_then(|f| f.name.clone())
                .unwrap_or_else(|| format!("fn{}", function.index()));
            match result {
                Some(r) => format!(
                    "call {callee}({}) -> {}",
                    args.join(", "),
                    format_deref(r, module)
                ),
                None => format!("call {callee}({})", args.join(", ")),
            }
        }
        Operation::EmitVertex { stream } => format!("emit_vertex stream={stream}"),
        Operation::EndPrimitive { stream } => format!("end_primitive stream={stream}"),
        Operation::Barrier(b) => format!("barrier {b:?}").to_lowercase(),
    }
}

fn format_terminator(term: &Terminator) -> String {
    match *term {
        Terminator::Branch { target } => format!("br {}", block_name(target)),
        Terminator::BranchConditional {
            condition,
            accept,
            reject,
        } => format!(
            "br_if {}, {}, {}",
            value(condition),
            block_name(accept),
            block_name(reject)
        ),
        Terminator::Switch {
            selector,
            ref cases,
            default,
        } => {
            let cases: Vec<_> = cases
                .iter()
                .map(|c| format!("{} => {}", c.value, block_name(c.target)))
                .collect();
            format!(
                "switch {} [{}] default {}",
                value(selector),
                cases.join(", "),
                block_name(default)
            )
        }
        Terminator::Return => "return".into(),
        Terminator::Kill => "kill".into(),
        Terminator::Unreachable => "unreachable".into(),
    }
}

/// Produces a text dump of one function.
pub fn dump_function(module: &Module, function: &Function) -> String {
    let mut out = String::new();
    let name = function.name.as_deref().unwrap_or("_");
    let params: Vec<_> = function
        .parameters
        .iter()
        .map(|&p| format_deref(&Deref::new(p), module))
        .collect();
    let ret = match function.result {
        Some(ty) => format!(" -> {}", type_ref(ty, &module.types)),
        None => String::new(),
    };
    let _ = writeln!(out, "fn {name}({}){ret} {{", params.join(", "));
    for &local in &function.locals {
        let var = &module.variables[local];
        let _ = writeln!(
            out,
            "  local {}: {}",
            var.name.as_deref().unwrap_or("_"),
            type_ref(var.ty, &module.types)
        );
    }
    for (handle, block) in function.blocks.iter() {
        let preds: Vec<_> = block.predecessors.iter().map(|&p| block_name(p)).collect();
        let label = match block.label {
            Some(id) => format!(" (label {id})"),
            None => String::new(),
        };
        let _ = writeln!(
            out,
            "{}{label}:  ; preds: [{}]",
            block_name(handle),
            preds.join(", ")
        );
        match block.merge {
            Some(Merge::Selection { merge }) => {
                let _ = writeln!(out, "    ; selection merge {}", block_name(merge));
            }
            Some(Merge::Loop { merge, continuing }) => {
                let _ = writeln!(
                    out,
                    "    ; loop merge {} continue {}",
                    block_name(merge),
                    block_name(continuing)
                );
            }
            None => {}
        }
        for (inst, instruction) in function.block_instructions(handle) {
            let op = format_operation(&instruction.op, module);
            match instruction.ty {
                Some(ty) => {
                    let _ = writeln!(
                        out,
                        "    {}: {} = {op}",
                        value(inst),
                        type_ref(ty, &module.types)
                    );
                }
                None => {
                    let _ = writeln!(out, "    {op}");
                }
            }
        }
        let _ = writeln!(out, "    {}", format_terminator(&block.terminator));
    }
    out.push_str("}\n");
    out
}

/// Produces a human-readable text dump of a [`Module`] for debugging.
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();
    let info = &module.info;
    let _ = writeln!(out, "Stage: {}", info.stage);
    match info.stage {
        ShaderStage::Compute => {
            let [x, y, z] = info.local_size;
            let _ = writeln!(out, "  local_size({x}, {y}, {z})");
        }
        ShaderStage::Geometry => {
            let g = &info.geometry;
            let _ = writeln!(
                out,
                "  vertices_in={} vertices_out={} invocations={} output={:?}",
                g.vertices_in, g.vertices_out, g.invocations, g.output_primitive
            );
        }
        ShaderStage::Fragment => {
            let fs = &info.fragment;
            let _ = writeln!(
                out,
                "  origin_upper_left={} early_fragment_tests={} depth={:?}",
                fs.origin_upper_left, fs.early_fragment_tests, fs.depth_layout
            );
        }
        ShaderStage::Vertex => {}
    }
    let _ = writeln!(
        out,
        "  textures={} images={} ubos={} ssbos={}",
        info.num_textures, info.num_images, info.num_ubos, info.num_ssbos
    );
    if let Some(size) = info.push_constant_size {
        let _ = writeln!(out, "  push_constants={size}");
    }

    out.push_str("\nTypes:\n");
    for (handle, ty) in module.types.iter() {
        let _ = writeln!(out, "  {handle:?} {}", format_type(ty, &module.types));
    }

    if !module.globals.is_empty() {
        out.push_str("\nGlobals:\n");
        for &handle in &module.globals {
            let var = &module.variables[handle];
            let name = var.name.as_deref().unwrap_or("_");
            let mut attrs = String::new();
            if let Some(set) = var.data.descriptor_set {
                let _ = write!(attrs, " set={set}");
            }
            if let Some(binding) = var.data.binding {
                let _ = write!(attrs, " binding={binding}");
            }
            if matches!(
                var.mode,
                VariableMode::ShaderIn | VariableMode::ShaderOut | VariableMode::SystemValue
            ) {
                let _ = write!(attrs, " location={}", var.data.location);
            }
            if var.data.read_only {
                attrs.push_str(" readonly");
            }
            let _ = writeln!(
                out,
                "  {handle:?} {} {name}: {}{attrs}",
                var.mode,
                type_ref(var.ty, &module.types)
            );
        }
    }

    for (_, function) in module.functions.iter() {
        out.push('\n');
        out.push_str(&dump_function(module, function));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::func::Block;

    #[test]
    fn display_scalar() {
        assert_eq!(format!("{}", Scalar::F32), "f32");
        assert_eq!(format!("{}", Scalar::U32), "u32");
        assert_eq!(format!("{}", Scalar::BOOL), "bool");
    }

    #[test]
    fn display_math_function() {
        assert_eq!(format!("{}", MathFunction::InverseSqrt), "inversesqrt");
        assert_eq!(format!("{}", BinaryOp::ShiftRight), "shr");
    }

    #[test]
    fn format_nested_types() {
        let mut module = Module::new(ShaderStage::Vertex);
        let f = module.insert_type(TypeInner::Scalar(Scalar::F32));
        let v4 = module.insert_type(TypeInner::Vector {
            size: VectorSize::Quad,
            scalar: Scalar::F32,
        });
        let arr = module.insert_type(TypeInner::Array {
            base: v4,
            size: ArraySize::Constant(3),
        });
        assert_eq!(format_type(&module.types[f], &module.types), "f32");
        assert_eq!(
            format_type(&module.types[arr], &module.types),
            "array<vec4<f32>, 3>"
        );
    }

    #[test]
    fn dump_function_lists_blocks_and_terminators() {
        let mut module = Module::new(ShaderStage::Fragment);
        let float = module.insert_type(TypeInner::Scalar(Scalar::F32));
        let mut func = Function::new(Some("main".into()));
        let entry = func.blocks.append(Block::new(Some(4)));
        let c = func.instructions.append(Instruction {
            op: Operation::Constant(vec![0x3f80_0000]),
            ty: Some(float),
        });
        func.blocks[entry].instructions.push(c);
        func.blocks[entry].terminator = Terminator::Return;
        let text = dump_function(&module, &func);
        assert!(text.contains("fn main()"));
        assert!(text.contains("bb0 (label 4):"));
        assert!(text.contains("%0: f32 = const(0x3f800000)"));
        assert!(text.contains("return"));

        module.functions.append(func);
        let dump = dump_module(&module);
        assert!(dump.starts_with("Stage: fragment"));
    }
}

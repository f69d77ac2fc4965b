//! A reference interpreter for translated IR.
//!
//! Runs one invocation of a function over word-addressed variable memory
//! and byte-addressed buffers. Only the operations the integration tests
//! produce are supported; anything else panics.

use std::collections::HashMap;

use tessera_ir::{
    Access, ArrayIndex, ArraySize, BinaryOp, BufferKind, ConstantValue, Deref, FALSE, Function,
    Handle, Instruction, MathFunction, Module, Operation, RelationalFunction, ScalarKind, TRUE,
    Terminator, Type, TypeInner, UnaryOp, Variable, WriteMask,
};

const STEP_LIMIT: usize = 100_000;

/// Contents of a variable: vectors and scalars as words, composites as
/// children.
#[derive(Clone, Debug, PartialEq)]
pub enum Memory {
    Leaf(Vec<u32>),
    Node(Vec<Memory>),
}

#[allow(dead_code)]
impl Memory {
    fn zero(module: &Module, ty: Handle<Type>) -> Self {
        match module.types[ty].inner {
            TypeInner::Scalar(_) => Self::Leaf(vec![0]),
            TypeInner::Vector { size, .. } => Self::Leaf(vec![0; size as usize]),
            TypeInner::Matrix { columns, rows, .. } => {
                Self::Node(vec![Self::Leaf(vec![0; rows as usize]); columns as usize])
            }
            TypeInner::Array {
                base,
                size: ArraySize::Constant(n),
            } => Self::Node(vec![Self::zero(module, base); n as usize]),
            TypeInner::Struct { ref members } => {
                Self::Node(members.iter().map(|m| Self::zero(module, m.ty)).collect())
            }
            _ => Self::Node(Vec::new()),
        }
    }

    fn from_constant(module: &Module, ty: Handle<Type>, value: &ConstantValue) -> Self {
        match module.types[ty].inner {
            TypeInner::Scalar(_) | TypeInner::Vector { .. } => Self::Leaf(value.values.clone()),
            TypeInner::Matrix { rows, .. } => Self::Node(
                value
                    .values
                    .chunks(rows as usize)
                    .map(|column| Self::Leaf(column.to_vec()))
                    .collect(),
            ),
            TypeInner::Array { base, .. } => Self::Node(
                value
                    .elements
                    .iter()
                    .map(|e| Self::from_constant(module, base, e))
                    .collect(),
            ),
            TypeInner::Struct { ref members } => Self::Node(
                members
                    .iter()
                    .zip(&value.elements)
                    .map(|(m, e)| Self::from_constant(module, m.ty, e))
                    .collect(),
            ),
            _ => Self::Node(Vec::new()),
        }
    }

    /// The words of a scalar or vector.
    pub fn words(&self) -> &[u32] {
        match self {
            Self::Leaf(words) => words,
            Self::Node(_) => panic!("expected a scalar or vector, found {self:?}"),
        }
    }

    pub fn floats(&self) -> Vec<f32> {
        self.words().iter().map(|&w| f32::from_bits(w)).collect()
    }
}

/// Machine state for running a translated module.
#[allow(dead_code)]
pub struct Machine<'a> {
    module: &'a Module,
    memory: HashMap<Handle<Variable>, Memory>,
    /// Buffer contents keyed by descriptor set and binding.
    pub buffers: HashMap<(u32, u32), Vec<u8>>,
    pub push_constants: Vec<u8>,
    /// Buffers resolved by `ResourceIndex`, in the order they were resolved.
    resources: Vec<(u32, u32)>,
    steps: usize,
}

#[allow(dead_code)]
impl<'a> Machine<'a> {
    pub fn new(module: &'a Module) -> Self {
        let memory = module
            .variables
            .iter()
            .map(|(handle, var)| {
                let contents = match var.initializer {
                    Some(ref init) => Memory::from_constant(module, var.ty, init),
                    None => Memory::zero(module, var.ty),
                };
                (handle, contents)
            })
            .collect();
        Self {
            module,
            memory,
            buffers: HashMap::new(),
            push_constants: Vec::new(),
            resources: Vec::new(),
            steps: 0,
        }
    }

    pub fn variable(&self, name: &str) -> Handle<Variable> {
        self.module
            .variables
            .iter()
            .find(|(_, var)| var.name.as_deref() == Some(name))
            .map(|(handle, _)| handle)
            .unwrap_or_else(|| panic!("no variable named `{name}`"))
    }

    pub fn set(&mut self, name: &str, contents: Memory) {
        let var = self.variable(name);
        self.memory.insert(var, contents);
    }

    pub fn get(&self, name: &str) -> &Memory {
        &self.memory[&self.variable(name)]
    }

    pub fn set_buffer_words(&mut self, set: u32, binding: u32, words: &[u32]) {
        self.buffers.insert((set, binding), to_bytes(words));
    }

    pub fn buffer_words(&self, set: u32, binding: u32) -> Vec<u32> {
        from_bytes(&self.buffers[&(set, binding)])
    }

    /// Runs `function` to completion.
    pub fn run(&mut self, function: Handle<Function>) {
        let module = self.module;
        let func = &module.functions[function];
        let mut values: HashMap<Handle<Instruction>, Vec<u32>> = HashMap::new();
        let mut block = func.entry_block().expect("function has no body");
        let mut previous = None;

        loop {
            self.steps += 1;
            assert!(self.steps < STEP_LIMIT, "step limit exceeded");

            // Phis read their sources simultaneously, on entry.
            let mut incoming = Vec::new();
            for (handle, inst) in func.phis(block) {
                let Operation::Phi(ref sources) = inst.op else { unreachable!() };
                let source = sources
                    .iter()
                    .find(|s| Some(s.block) == previous)
                    .unwrap_or_else(|| panic!("phi {handle:?} has no source for {previous:?}"));
                incoming.push((handle, values[&source.value].clone()));
            }
            let phi_count = incoming.len();
            values.extend(incoming);

            for &handle in &func.blocks[block].instructions[phi_count..] {
                let inst = &func.instructions[handle];
                if let Some(result) = self.execute(func, inst, &values) {
                    values.insert(handle, result);
                }
            }

            previous = Some(block);
            block = match func.blocks[block].terminator {
                Terminator::Branch { target } => target,
                Terminator::BranchConditional {
                    condition,
                    accept,
                    reject,
                } => {
                    if values[&condition][0] != FALSE {
                        accept
                    } else {
                        reject
                    }
                }
                Terminator::Switch {
                    selector,
                    ref cases,
                    default,
                } => {
                    let selector = values[&selector][0];
                    cases
                        .iter()
                        .find(|case| case.value == selector)
                        .map_or(default, |case| case.target)
                }
                Terminator::Return | Terminator::Kill => return,
                Terminator::Unreachable => panic!("reached an unreachable block"),
            };
        }
    }

    fn execute(
        &mut self,
        func: &Function,
        inst: &Instruction,
        values: &HashMap<Handle<Instruction>, Vec<u32>>,
    ) -> Option<Vec<u32>> {
        let module = self.module;
        let value = |h: &Handle<Instruction>| values[h].clone();
        let result_components = || {
            inst.ty
                .and_then(|ty| module.types[ty].inner.components())
                .unwrap_or(1) as usize
        };

        Some(match inst.op {
            Operation::Constant(ref words) => words.clone(),
            Operation::Undef => vec![0; result_components()],
            Operation::Phi(_) => panic!("phi after the start of a block"),
            Operation::Compose(ref lanes) => lanes
                .iter()
                .map(|lane| values[&lane.value][lane.index as usize])
                .collect(),
            Operation::Swizzle {
                vector,
                ref pattern,
            } => pattern.iter().map(|&i| values[&vector][i as usize]).collect(),
            Operation::Unary { op, kind, value: v } => value(&v)
                .into_iter()
                .map(|x| unary(op, kind, x))
                .collect(),
            Operation::Binary {
                op,
                kind,
                left,
                right,
            } => {
                let (left, right) = (value(&left), value(&right));
                assert_eq!(left.len(), right.len(), "binary operands of different widths");
                left.into_iter()
                    .zip(right)
                    .map(|(a, b)| binary(op, kind, a, b))
                    .collect()
            }
            Operation::Select {
                condition,
                accept,
                reject,
            } => {
                let condition = value(&condition);
                let (accept, reject) = (value(&accept), value(&reject));
                (0..accept.len())
                    .map(|i| {
                        let c = condition[i.min(condition.len() - 1)];
                        if c != FALSE { accept[i] } else { reject[i] }
                    })
                    .collect()
            }
            Operation::Math { fun, kind, ref args } => {
                let args: Vec<Vec<u32>> = args.iter().map(value).collect();
                math(fun, kind, &args)
            }
            Operation::Relational { fun, argument } => {
                let argument = value(&argument);
                let result = match fun {
                    RelationalFunction::Any => argument.iter().any(|&x| x != FALSE),
                    RelationalFunction::All => argument.iter().all(|&x| x != FALSE),
                };
                vec![boolean(result)]
            }
            Operation::Convert { value: v, to } => {
                let from = scalar_kind(module, func, v);
                value(&v)
                    .into_iter()
                    .map(|x| convert(from, to.kind, x))
                    .collect()
            }
            Operation::Bitcast(v) => value(&v),
            Operation::LoadVariable(ref deref) => {
                self.resolve(deref, values).words().to_vec()
            }
            Operation::StoreVariable {
                ref deref,
                value: v,
                mask,
            } => {
                let words = value(&v);
                let target = self.resolve_mut(deref, values);
                let Memory::Leaf(current) = target else {
                    panic!("store to a composite");
                };
                for (i, word) in words.into_iter().enumerate() {
                    if mask.contains(WriteMask::from_bits_truncate(1 << i)) {
                        current[i] = word;
                    }
                }
                return None;
            }
            Operation::CopyVariable { ref dst, ref src } => {
                let contents = self.resolve(src, values).clone();
                *self.resolve_mut(dst, values) = contents;
                return None;
            }
            Operation::ResourceIndex {
                set,
                binding,
                array_index,
                ..
            } => {
                let index = values[&array_index][0];
                self.resources.push((set, binding + index));
                vec![self.resources.len() as u32 - 1]
            }
            Operation::LoadBuffer {
                kind,
                resource,
                offset,
            } => {
                let offset = values[&offset][0] as usize;
                let bytes = match (kind, resource) {
                    (BufferKind::PushConstant, _) => &self.push_constants,
                    (_, Some(resource)) => {
                        let key = self.resources[values[&resource][0] as usize];
                        &self.buffers[&key]
                    }
                    (_, None) => panic!("buffer load without a resource"),
                };
                from_bytes(&bytes[offset..offset + 4 * result_components()])
            }
            Operation::StoreBuffer {
                resource,
                offset,
                value: v,
                mask,
            } => {
                let key = self.resources[values[&resource][0] as usize];
                let offset = values[&offset][0] as usize;
                let buffer = self.buffers.get_mut(&key).expect("store to an unbound buffer");
                for (i, word) in value(&v).into_iter().enumerate() {
                    if mask.contains(WriteMask::from_bits_truncate(1 << i)) {
                        let at = offset + 4 * i;
                        buffer[at..at + 4].copy_from_slice(&word.to_le_bytes());
                    }
                }
                return None;
            }
            Operation::Call {
                function,
                ref arguments,
                ref result,
            } => {
                let callee = &module.functions[function];
                for (&param, arg) in callee.parameters.iter().zip(arguments) {
                    let contents = self.resolve(arg, values).clone();
                    self.memory.insert(param, contents);
                }
                self.run(function);
                for (&param, arg) in callee.parameters.iter().zip(arguments) {
                    let contents = self.memory[&param].clone();
                    *self.resolve_mut(arg, values) = contents;
                }
                if let (Some(result), Some(ret)) = (result, callee.return_variable) {
                    let contents = self.memory[&ret].clone();
                    *self.resolve_mut(result, values) = contents;
                }
                return None;
            }
            Operation::Barrier(_)
            | Operation::EmitVertex { .. }
            | Operation::EndPrimitive { .. } => {
                return None;
            }
            ref other => panic!("cannot evaluate {other:?}"),
        })
    }

    fn index(access: Access, values: &HashMap<Handle<Instruction>, Vec<u32>>) -> usize {
        match access {
            Access::Member(i) | Access::Index(ArrayIndex::Direct(i)) => i as usize,
            Access::Index(ArrayIndex::Indirect(h)) => values[&h][0] as usize,
        }
    }

    fn resolve(&self, deref: &Deref, values: &HashMap<Handle<Instruction>, Vec<u32>>) -> &Memory {
        let mut memory = &self.memory[&deref.variable];
        for step in &deref.path {
            let Memory::Node(children) = memory else {
                panic!("deref continues into a vector");
            };
            memory = &children[Self::index(step.access, values)];
        }
        memory
    }

    fn resolve_mut(
        &mut self,
        deref: &Deref,
        values: &HashMap<Handle<Instruction>, Vec<u32>>,
    ) -> &mut Memory {
        let mut memory = self
            .memory
            .get_mut(&deref.variable)
            .expect("unknown variable");
        for step in &deref.path {
            let Memory::Node(children) = memory else {
                panic!("deref continues into a vector");
            };
            memory = &mut children[Self::index(step.access, values)];
        }
        memory
    }
}

fn scalar_kind(module: &Module, func: &Function, value: Handle<Instruction>) -> ScalarKind {
    func.instructions[value]
        .ty
        .and_then(|ty| module.types[ty].inner.scalar())
        .map(|s| s.kind)
        .expect("conversion of an untyped value")
}

#[allow(dead_code)]
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[allow(dead_code)]
pub fn from_bytes(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Packs floats as words.
#[allow(dead_code)]
pub fn float_words(values: &[f32]) -> Vec<u32> {
    values.iter().map(|f| f.to_bits()).collect()
}

fn boolean(b: bool) -> u32 {
    if b { TRUE } else { FALSE }
}

fn f(x: u32) -> f32 {
    f32::from_bits(x)
}

fn unary(op: UnaryOp, kind: ScalarKind, x: u32) -> u32 {
    match (op, kind) {
        (UnaryOp::Negate, ScalarKind::Float) => (-f(x)).to_bits(),
        (UnaryOp::Negate, _) => (x as i32).wrapping_neg() as u32,
        (UnaryOp::LogicalNot, _) => boolean(x == FALSE),
        (UnaryOp::BitwiseNot, _) => !x,
    }
}

fn binary(op: BinaryOp, kind: ScalarKind, a: u32, b: u32) -> u32 {
    use BinaryOp as B;
    use ScalarKind::{Bool, Float, Sint, Uint};
    let (sa, sb) = (a as i32, b as i32);
    match (op, kind) {
        (B::Add, Float) => (f(a) + f(b)).to_bits(),
        (B::Add, _) => a.wrapping_add(b),
        (B::Subtract, Float) => (f(a) - f(b)).to_bits(),
        (B::Subtract, _) => a.wrapping_sub(b),
        (B::Multiply, Float) => (f(a) * f(b)).to_bits(),
        (B::Multiply, _) => a.wrapping_mul(b),
        (B::Divide, Float) => (f(a) / f(b)).to_bits(),
        (B::Divide, Sint) => sa.wrapping_div(sb) as u32,
        (B::Divide, _) => a / b,
        (B::Modulo, Float) => (f(a) - f(b) * (f(a) / f(b)).floor()).to_bits(),
        (B::Modulo, Sint) => {
            let r = sa.wrapping_rem(sb);
            if r != 0 && (r < 0) != (sb < 0) {
                (r + sb) as u32
            } else {
                r as u32
            }
        }
        (B::Modulo, _) => a % b,
        (B::Remainder, Float) => (f(a) % f(b)).to_bits(),
        (B::Remainder, Sint) => sa.wrapping_rem(sb) as u32,
        (B::Remainder, _) => a % b,
        (B::Equal, Float) => boolean(f(a) == f(b)),
        (B::Equal, Bool) => boolean((a != FALSE) == (b != FALSE)),
        (B::Equal, _) => boolean(a == b),
        (B::NotEqual, Float) => boolean(f(a) != f(b)),
        (B::NotEqual, Bool) => boolean((a != FALSE) != (b != FALSE)),
        (B::NotEqual, _) => boolean(a != b),
        (B::Less, Float) => boolean(f(a) < f(b)),
        (B::Less, Sint) => boolean(sa < sb),
        (B::Less, _) => boolean(a < b),
        (B::LessEqual, Float) => boolean(f(a) <= f(b)),
        (B::LessEqual, Sint) => boolean(sa <= sb),
        (B::LessEqual, _) => boolean(a <= b),
        (B::Greater, Float) => boolean(f(a) > f(b)),
        (B::Greater, Sint) => boolean(sa > sb),
        (B::Greater, _) => boolean(a > b),
        (B::GreaterEqual, Float) => boolean(f(a) >= f(b)),
        (B::GreaterEqual, Sint) => boolean(sa >= sb),
        (B::GreaterEqual, _) => boolean(a >= b),
        (B::LogicalAnd, _) => boolean(a != FALSE && b != FALSE),
        (B::LogicalOr, _) => boolean(a != FALSE || b != FALSE),
        (B::BitwiseAnd, _) => a & b,
        (B::BitwiseOr, _) => a | b,
        (B::BitwiseXor, _) => a ^ b,
        (B::ShiftLeft, _) => a.wrapping_shl(b),
        (B::ShiftRight, Sint) => sa.wrapping_shr(b) as u32,
        (B::ShiftRight, Uint) => a.wrapping_shr(b),
        (op, kind) => panic!("cannot evaluate {op:?} on {kind:?}"),
    }
}

fn math(fun: MathFunction, kind: ScalarKind, args: &[Vec<u32>]) -> Vec<u32> {
    use MathFunction as Mf;
    let lanes = args[0].len();
    let lane = |i: usize| -> Vec<u32> { args.iter().map(|a| a[i]).collect() };
    match (fun, kind) {
        (Mf::Dot, ScalarKind::Float) => {
            let sum: f32 = (0..lanes).map(|i| f(args[0][i]) * f(args[1][i])).sum();
            vec![sum.to_bits()]
        }
        (Mf::Length, ScalarKind::Float) => {
            let sum: f32 = args[0].iter().map(|&x| f(x) * f(x)).sum();
            vec![sum.sqrt().to_bits()]
        }
        _ => (0..lanes)
            .map(|i| {
                let x = lane(i);
                match (fun, kind) {
                    (Mf::Abs, ScalarKind::Float) => f(x[0]).abs().to_bits(),
                    (Mf::Abs, _) => (x[0] as i32).wrapping_abs() as u32,
                    (Mf::Floor, _) => f(x[0]).floor().to_bits(),
                    (Mf::Sqrt, _) => f(x[0]).sqrt().to_bits(),
                    (Mf::Min, ScalarKind::Float) => f(x[0]).min(f(x[1])).to_bits(),
                    (Mf::Max, ScalarKind::Float) => f(x[0]).max(f(x[1])).to_bits(),
                    (Mf::Min, ScalarKind::Sint) => (x[0] as i32).min(x[1] as i32) as u32,
                    (Mf::Max, ScalarKind::Sint) => (x[0] as i32).max(x[1] as i32) as u32,
                    (Mf::Min, _) => x[0].min(x[1]),
                    (Mf::Max, _) => x[0].max(x[1]),
                    (Mf::Clamp, ScalarKind::Float) => f(x[0]).clamp(f(x[1]), f(x[2])).to_bits(),
                    (Mf::Clamp, ScalarKind::Sint) => {
                        (x[0] as i32).clamp(x[1] as i32, x[2] as i32) as u32
                    }
                    (Mf::Clamp, _) => x[0].clamp(x[1], x[2]),
                    (Mf::Fma, _) => f(x[0]).mul_add(f(x[1]), f(x[2])).to_bits(),
                    (Mf::Mix, _) => (f(x[0]) + (f(x[1]) - f(x[0])) * f(x[2])).to_bits(),
                    (fun, kind) => panic!("cannot evaluate {fun:?} on {kind:?}"),
                }
            })
            .collect(),
    }
}

fn convert(from: ScalarKind, to: ScalarKind, x: u32) -> u32 {
    use ScalarKind::{Bool, Float, Sint, Uint};
    match (from, to) {
        (Float, Sint) => f(x) as i32 as u32,
        (Float, Uint) => f(x) as u32,
        (Sint, Float) => (x as i32 as f32).to_bits(),
        (Uint, Float) => (x as f32).to_bits(),
        (Bool, Float) => (if x != FALSE { 1.0f32 } else { 0.0 }).to_bits(),
        (Bool, _) => u32::from(x != FALSE),
        (_, Bool) => boolean(x != 0),
        _ => x,
    }
}

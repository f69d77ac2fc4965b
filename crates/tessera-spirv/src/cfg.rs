//! Control-flow graph construction and terminator translation.

use std::collections::HashMap;
use std::ops::Range;

use spirv::Op;
use tessera_ir::{
    self as ir, Block, Deref, Handle, Merge, SwitchCase, Terminator, TypeInner, Variable,
    VariableMode,
};

use crate::ParseError;
use crate::builder::Builder;
use crate::reader::Instruction;
use crate::value::{Value, ValueTable};

/// A discovered function whose body is emitted later.
#[derive(Debug)]
pub(crate) struct FunctionBody {
    pub handle: Handle<ir::Function>,
    /// Instructions from the first `OpLabel` up to `OpFunctionEnd`.
    pub range: Range<usize>,
    /// Edges routed through a split block, by source block and target label.
    pub redirects: HashMap<(Handle<Block>, u32), Handle<Block>>,
}

/// Labels named by a block's merge instruction and terminator.
#[derive(Default)]
struct Edges {
    merge: Option<(u32, Option<u32>)>,
    targets: Vec<u32>,
}

impl Builder<'_> {
    /// Discovers every function and block starting at `start`, so that
    /// bodies may refer to functions and blocks defined later.
    pub(crate) fn build_cfg(
        &mut self,
        insts: &[Instruction<'_>],
        start: usize,
    ) -> Result<(), ParseError> {
        let mut index = start;
        while index < insts.len() {
            let inst = &insts[index];
            index = match inst.op {
                Op::Function => self.discover_function(insts, index)?,
                Op::Line | Op::NoLine => index + 1,
                other => {
                    return Err(crate::malformed(format!(
                        "{other:?} between function definitions"
                    )));
                }
            };
        }
        Ok(())
    }

    /// Returns the index following the function's `OpFunctionEnd`.
    fn discover_function(
        &mut self,
        insts: &[Instruction<'_>],
        start: usize,
    ) -> Result<usize, ParseError> {
        let header = &insts[start];
        let id = header.word(2)?;
        let fn_type = self.values.ty(header.word(4)?)?;
        let signature = self.types[fn_type]
            .signature
            .clone()
            .ok_or_else(|| crate::malformed(format!("function {id} has a non-function type")))?;

        let mut function = ir::Function::new(self.values.name(id));
        let result = self.types[signature.result].ty;
        if self.module.types[result].inner != TypeInner::Void {
            function.result = Some(result);
            let var = Variable::new(Some("return".to_string()), result, VariableMode::Local);
            function.return_variable = Some(self.module.variables.append(var));
        }

        let mut index = start + 1;
        while let Some(param) = insts.get(index).filter(|i| i.op == Op::FunctionParameter) {
            let ty = self.values.ty(param.word(1)?)?;
            let param_id = param.word(2)?;
            let var = Variable::new(
                self.values.name(param_id),
                self.types[ty].ty,
                VariableMode::Parameter,
            );
            let var = self.module.variables.append(var);
            function.parameters.push(var);
            self.values.push(
                param_id,
                Value::Deref {
                    chain: Deref::new(var),
                    ty,
                },
            )?;
            index += 1;
        }
        if function.parameters.len() != signature.params.len() {
            return Err(crate::malformed(format!(
                "function {id} has {} parameters, its type has {}",
                function.parameters.len(),
                signature.params.len()
            )));
        }

        let body_start = index;
        let mut edges: Vec<(Handle<Block>, Edges)> = Vec::new();
        let body_end = loop {
            let inst = insts
                .get(index)
                .ok_or_else(|| crate::malformed(format!("function {id} has no OpFunctionEnd")))?;
            match inst.op {
                Op::FunctionEnd => break index,
                Op::Label => {
                    let label = inst.word(1)?;
                    let block = function.blocks.append(Block::new(Some(label)));
                    self.values.push(label, Value::Block(block))?;
                    edges.push((block, Edges::default()));
                }
                op => {
                    let (_, current) = edges.last_mut().ok_or_else(|| {
                        crate::malformed(format!("{op:?} before the first block of function {id}"))
                    })?;
                    match op {
                        Op::SelectionMerge => current.merge = Some((inst.word(1)?, None)),
                        Op::LoopMerge => {
                            current.merge = Some((inst.word(1)?, Some(inst.word(2)?)));
                        }
                        Op::Branch => current.targets.push(inst.word(1)?),
                        Op::BranchConditional => {
                            current.targets.push(inst.word(2)?);
                            current.targets.push(inst.word(3)?);
                        }
                        Op::Switch => {
                            current.targets.push(inst.word(2)?);
                            let pairs = inst.words_from(3);
                            if pairs.len() % 2 != 0 {
                                return Err(crate::unsupported(
                                    "switch selectors wider than 32 bits",
                                ));
                            }
                            current.targets.extend(pairs.chunks_exact(2).map(|p| p[1]));
                        }
                        _ => {}
                    }
                }
            }
            index += 1;
        };
        if edges.is_empty() {
            return Err(crate::unsupported(format!("function {id} has no body")));
        }

        for (block, edge) in &edges {
            if let Some((merge, continuing)) = edge.merge {
                let merge = local_block(&function, &self.values, merge)?;
                let metadata = match continuing {
                    Some(continuing) => Merge::Loop {
                        merge,
                        continuing: local_block(&function, &self.values, continuing)?,
                    },
                    None => Merge::Selection { merge },
                };
                function.blocks[*block].merge = Some(metadata);
            }
            let mut successors = Vec::new();
            for &label in &edge.targets {
                let target = local_block(&function, &self.values, label)?;
                if !successors.contains(&target) {
                    successors.push(target);
                }
            }
            for target in successors {
                let preds = &mut function.blocks[target].predecessors;
                if !preds.contains(block) {
                    preds.push(*block);
                }
            }
        }

        let redirects = if self.options.split_critical_edges {
            split_critical_edges(&mut function, &edges, &self.values)?
        } else {
            HashMap::new()
        };

        log::trace!(
            "function {id}: {} blocks, {} split edges",
            function.blocks.len(),
            redirects.len()
        );
        let handle = self.module.functions.append(function);
        self.values.push(id, Value::Function(handle))?;
        self.bodies.push(FunctionBody {
            handle,
            range: body_start..body_end,
            redirects,
        });
        Ok(body_end + 1)
    }

    /// Translates a block terminator.
    pub(crate) fn emit_terminator(
        &mut self,
        inst: &Instruction<'_>,
        body: &FunctionBody,
    ) -> Result<(), ParseError> {
        let source = self
            .fx()?
            .cursor
            .ok_or_else(|| crate::malformed("terminator outside of a block"))?;
        let target = |b: &Self, label: u32| -> Result<Handle<Block>, ParseError> {
            match body.redirects.get(&(source, label)) {
                Some(&split) => Ok(split),
                None => b.values.block(label),
            }
        };

        let terminator = match inst.op {
            Op::Branch => Terminator::Branch {
                target: target(&*self, inst.word(1)?)?,
            },
            Op::BranchConditional => Terminator::BranchConditional {
                condition: self.ssa_leaf(inst.word(1)?)?,
                accept: target(&*self, inst.word(2)?)?,
                reject: target(&*self, inst.word(3)?)?,
            },
            Op::Switch => {
                let selector = self.ssa_leaf(inst.word(1)?)?;
                let default = target(&*self, inst.word(2)?)?;
                let cases = inst
                    .words_from(3)
                    .chunks_exact(2)
                    .map(|pair| {
                        Ok(SwitchCase {
                            value: pair[0],
                            target: target(&*self, pair[1])?,
                        })
                    })
                    .collect::<Result<Vec<_>, ParseError>>()?;
                Terminator::Switch {
                    selector,
                    cases,
                    default,
                }
            }
            Op::Return => Terminator::Return,
            Op::ReturnValue => {
                let var = self
                    .fx()?
                    .function
                    .return_variable
                    .ok_or_else(|| crate::malformed("OpReturnValue in a void function"))?;
                let value = self.ssa_value(inst.word(1)?)?;
                self.store(value, &Deref::new(var))?;
                Terminator::Return
            }
            Op::Kill => Terminator::Kill,
            _ => Terminator::Unreachable,
        };

        let ctx = self.fx()?;
        ctx.function.blocks[source].terminator = terminator;
        ctx.cursor = None;
        Ok(())
    }
}

/// Looks up a label that must belong to `function`.
fn local_block(
    function: &ir::Function,
    values: &ValueTable,
    label: u32,
) -> Result<Handle<Block>, ParseError> {
    let block = values.block(label)?;
    match function.blocks.try_get(block) {
        Some(b) if b.label == Some(label) => Ok(block),
        _ => Err(crate::malformed(format!(
            "branch to block {label} of another function"
        ))),
    }
}

/// Routes every edge from a block with several successors into a block with
/// several predecessors through a new, unlabeled block.
fn split_critical_edges(
    function: &mut ir::Function,
    edges: &[(Handle<Block>, Edges)],
    values: &ValueTable,
) -> Result<HashMap<(Handle<Block>, u32), Handle<Block>>, ParseError> {
    let mut redirects = HashMap::new();
    for (source, edge) in edges {
        let mut labels: Vec<u32> = Vec::new();
        for &label in &edge.targets {
            if !labels.contains(&label) {
                labels.push(label);
            }
        }
        if labels.len() < 2 {
            continue;
        }
        for label in labels {
            let target = values.block(label)?;
            if function.blocks[target].predecessors.len() < 2 {
                continue;
            }
            let mut split = Block::new(None);
            split.predecessors.push(*source);
            split.terminator = Terminator::Branch { target };
            let split = function.blocks.append(split);
            for pred in &mut function.blocks[target].predecessors {
                if *pred == *source {
                    *pred = split;
                }
            }
            redirects.insert((*source, label), split);
        }
    }
    Ok(redirects)
}

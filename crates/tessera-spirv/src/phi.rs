//! Phi placement and source resolution.
//!
//! Phis are created in two passes. While a body is emitted each `OpPhi`
//! becomes a tree of sourceless phis. Once the whole function is emitted,
//! every phi receives one source per predecessor of its block. A
//! predecessor that the `OpPhi` does not name (a block created by edge
//! splitting, for instance) gets a phi of its own at its start, filled from
//! its own predecessors in turn.

use std::collections::HashMap;
use std::mem;

use tessera_ir::{Block, Handle, Operation, PhiSource};

use crate::ParseError;
use crate::builder::{Builder, InsertPoint};
use crate::reader::Instruction;
use crate::ssa::{SsaKind, SsaValue};
use crate::value::Value;

/// An `OpPhi` waiting for its sources.
#[derive(Debug)]
pub(crate) struct PendingPhi {
    pub block: Handle<Block>,
    pub value: Handle<SsaValue>,
    /// `(value id, parent label)` operand pairs.
    pub pairs: Vec<(u32, u32)>,
}

impl Builder<'_> {
    pub(crate) fn handle_phi(&mut self, inst: &Instruction<'_>) -> Result<(), ParseError> {
        let (_, ty) = self.result_type(inst)?;
        let id = inst.word(2)?;
        let operands = inst.words_from(3);
        if operands.len() % 2 != 0 {
            return Err(crate::malformed(format!("OpPhi {id} has an odd operand count")));
        }
        let block = self
            .fx()?
            .cursor
            .ok_or_else(|| crate::malformed("OpPhi outside of a block"))?;

        let value = self.create_tree(ty, &mut |b, leaf_ty| {
            b.insert(InsertPoint::End(block), Operation::Phi(Vec::new()), Some(leaf_ty))
        })?;
        self.fx()?.phis.push(PendingPhi {
            block,
            value,
            pairs: operands.chunks_exact(2).map(|p| (p[0], p[1])).collect(),
        });
        self.push_ssa(id, value)
    }

    /// Fills in the sources of every phi of the current function.
    pub(crate) fn resolve_phis(&mut self) -> Result<(), ParseError> {
        let pending = mem::take(&mut self.fx()?.phis);
        // Phis synthesized at a block on behalf of an `OpPhi`.
        let mut synthesized: HashMap<(Handle<Block>, usize), Handle<SsaValue>> = HashMap::new();
        let mut worklist: Vec<(usize, Handle<Block>, Handle<SsaValue>)> = pending
            .iter()
            .enumerate()
            .map(|(origin, phi)| (origin, phi.block, phi.value))
            .collect();

        while let Some((origin, block, phi)) = worklist.pop() {
            let preds = self.fx()?.function.blocks[block].predecessors.clone();
            for pred in preds {
                let label = self.fx()?.function.blocks[pred].label;
                let named = label.and_then(|label| {
                    pending[origin]
                        .pairs
                        .iter()
                        .find(|&&(_, parent)| parent == label)
                        .map(|&(value, _)| value)
                });
                let source = match named {
                    Some(value) => self.phi_operand(value)?,
                    None => match synthesized.get(&(pred, origin)) {
                        Some(&existing) => existing,
                        None => {
                            let ty = self.ssa_node(phi)?.ty;
                            let created = self.create_tree(ty, &mut |b, leaf_ty| {
                                b.insert(
                                    InsertPoint::BlockStart(pred),
                                    Operation::Phi(Vec::new()),
                                    Some(leaf_ty),
                                )
                            })?;
                            synthesized.insert((pred, origin), created);
                            worklist.push((origin, pred, created));
                            created
                        }
                    },
                };
                self.add_phi_source(phi, pred, source)?;
            }
        }
        log::trace!(
            "resolved {} phis, synthesized {}",
            pending.len(),
            synthesized.len()
        );
        Ok(())
    }

    /// An SSA value usable as a phi source; pointers cannot be merged.
    fn phi_operand(&mut self, id: u32) -> Result<Handle<SsaValue>, ParseError> {
        if let Value::Deref { .. } = self.values.get_untyped(id)? {
            return Err(crate::unsupported("phis of pointers"));
        }
        self.ssa_value(id)
    }

    /// Adds `source` to every leaf phi of `phi`, walking both trees.
    fn add_phi_source(
        &mut self,
        phi: Handle<SsaValue>,
        block: Handle<Block>,
        source: Handle<SsaValue>,
    ) -> Result<(), ParseError> {
        let ctx = self.fx()?;
        let mut stack = vec![(phi, source)];
        while let Some((phi, source)) = stack.pop() {
            match (&ctx.ssa[phi].kind, &ctx.ssa[source].kind) {
                (&SsaKind::Leaf(def), &SsaKind::Leaf(value)) => {
                    match ctx.function.instructions[def].op {
                        Operation::Phi(ref mut sources) => sources.push(PhiSource { block, value }),
                        _ => return Err(crate::malformed("phi source added to a non-phi")),
                    }
                }
                (SsaKind::Composite(phis), SsaKind::Composite(sources))
                    if phis.len() == sources.len() =>
                {
                    stack.extend(phis.iter().copied().zip(sources.iter().copied()));
                }
                _ => return Err(crate::malformed("phi source does not match the phi's type")),
            }
        }
        Ok(())
    }
}

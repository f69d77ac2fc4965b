//! Structural checks on translated functions.

use std::collections::BTreeSet;

use crate::arena::Handle;
use crate::error::IrError;
use crate::func::{Block, Function};
use crate::instr::Operation;

impl Function {
    /// Checks the control-flow graph and phi placement of the function.
    ///
    /// Verifies that branches target existing blocks, that every block's
    /// predecessor list matches the branches into it, that phis lead their
    /// block, and that each phi has exactly one source per predecessor.
    pub fn verify(&self) -> Result<(), IrError> {
        let mut actual: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.blocks.len()];
        for (handle, block) in self.blocks.iter() {
            for target in block.terminator.targets() {
                if !self.blocks.contains(target) {
                    return Err(IrError::BadHandle {
                        what: "block",
                        index: target.index(),
                        size: self.blocks.len(),
                    });
                }
                actual[target.index()].insert(handle.index());
            }
        }

        for (handle, block) in self.blocks.iter() {
            let listed: BTreeSet<usize> = block.predecessors.iter().map(|b| b.index()).collect();
            if listed.len() != block.predecessors.len() || listed != actual[handle.index()] {
                return Err(IrError::PredecessorMismatch {
                    block: handle.index(),
                    listed: block.predecessors.iter().map(|b| b.index()).collect(),
                    actual: actual[handle.index()].iter().copied().collect(),
                });
            }
            self.verify_phis(handle, block, &listed)?;
        }
        Ok(())
    }

    fn verify_phis(
        &self,
        handle: Handle<Block>,
        block: &Block,
        predecessors: &BTreeSet<usize>,
    ) -> Result<(), IrError> {
        let mut leading = true;
        for &inst in &block.instructions {
            let Some(instruction) = self.instructions.try_get(inst) else {
                return Err(IrError::BadHandle {
                    what: "instruction",
                    index: inst.index(),
                    size: self.instructions.len(),
                });
            };
            let Operation::Phi(ref sources) = instruction.op else {
                leading = false;
                continue;
            };
            if !leading {
                return Err(IrError::MisplacedPhi {
                    phi: inst.index(),
                    block: handle.index(),
                });
            }
            let blocks: Vec<usize> = sources.iter().map(|s| s.block.index()).collect();
            let unique: BTreeSet<usize> = blocks.iter().copied().collect();
            if unique.len() != blocks.len() || &unique != predecessors {
                return Err(IrError::PhiSourceMismatch {
                    phi: inst.index(),
                    block: handle.index(),
                    sources: blocks,
                    predecessors: predecessors.iter().copied().collect(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::UniqueArena;
    use crate::func::{Block, Function, Terminator};
    use crate::instr::{Instruction, Operation, PhiSource};
    use crate::types::{Scalar, Type, TypeInner};
    use crate::IrError;

    fn diamond() -> Function {
        let mut types = UniqueArena::new();
        let float = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::F32),
        });
        let mut func = Function::new(None);
        let entry = func.blocks.append(Block::new(Some(1)));
        let left = func.blocks.append(Block::new(Some(2)));
        let right = func.blocks.append(Block::new(Some(3)));
        let merge = func.blocks.append(Block::new(Some(4)));
        let cond = func.instructions.append(Instruction {
            op: Operation::Undef,
            ty: None,
        });
        let a = func.instructions.append(Instruction {
            op: Operation::Constant(vec![1.0f32.to_bits()]),
            ty: Some(float),
        });
        let b = func.instructions.append(Instruction {
            op: Operation::Constant(vec![2.0f32.to_bits()]),
            ty: Some(float),
        });
        func.blocks[entry].instructions = vec![cond, a, b];
        func.blocks[entry].terminator = Terminator::BranchConditional {
            condition: cond,
            accept: left,
            reject: right,
        };
        func.blocks[left].terminator = Terminator::Branch { target: merge };
        func.blocks[right].terminator = Terminator::Branch { target: merge };
        func.blocks[left].predecessors = vec![entry];
        func.blocks[right].predecessors = vec![entry];
        func.blocks[merge].predecessors = vec![left, right];
        let phi = func.instructions.append(Instruction {
            op: Operation::Phi(vec![
                PhiSource {
                    block: left,
                    value: a,
                },
                PhiSource {
                    block: right,
                    value: b,
                },
            ]),
            ty: Some(float),
        });
        func.blocks[merge].instructions.push(phi);
        func.blocks[merge].terminator = Terminator::Return;
        func
    }

    #[test]
    fn diamond_verifies() {
        diamond().verify().unwrap();
    }

    #[test]
    fn missing_phi_source_is_reported() {
        let mut func = diamond();
        let merge = func.blocks.handles().nth(3).unwrap();
        let phi = func.blocks[merge].instructions[0];
        if let Operation::Phi(ref mut sources) = func.instructions[phi].op {
            sources.pop();
        }
        assert!(matches!(
            func.verify(),
            Err(IrError::PhiSourceMismatch { .. })
        ));
    }

    #[test]
    fn stale_predecessor_list_is_reported() {
        let mut func = diamond();
        let merge = func.blocks.handles().nth(3).unwrap();
        func.blocks[merge].predecessors.pop();
        assert!(matches!(
            func.verify(),
            Err(IrError::PredecessorMismatch { .. })
        ));
    }
}

//! Functions and their control-flow graphs.

use crate::arena::{Arena, Handle};
use crate::global::Variable;
use crate::instr::{Instruction, Operation};
use crate::types::Type;

/// A function: a control-flow graph of [`Block`]s over one instruction arena.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: Option<String>,
    /// Result type; `None` for functions returning nothing.
    pub result: Option<Handle<Type>>,
    /// Parameters, passed as variables the callee reads and writes.
    pub parameters: Vec<Handle<Variable>>,
    /// Variable receiving the result before `Return`.
    pub return_variable: Option<Handle<Variable>>,
    /// Function-local variables.
    pub locals: Vec<Handle<Variable>>,
    pub instructions: Arena<Instruction>,
    /// Blocks; the first one is the entry block.
    pub blocks: Arena<Block>,
}

impl Function {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            result: None,
            parameters: Vec::new(),
            return_variable: None,
            locals: Vec::new(),
            instructions: Arena::new(),
            blocks: Arena::new(),
        }
    }

    /// The block control enters the function through, if the function has
    /// a body.
    pub fn entry_block(&self) -> Option<Handle<Block>> {
        self.blocks.handles().next()
    }

    /// Iterates over the instructions of `block` in execution order.
    pub fn block_instructions(
        &self,
        block: Handle<Block>,
    ) -> impl Iterator<Item = (Handle<Instruction>, &Instruction)> {
        self.blocks[block]
            .instructions
            .iter()
            .map(|&h| (h, &self.instructions[h]))
    }

    /// Iterates over the phis at the start of `block`.
    pub fn phis(
        &self,
        block: Handle<Block>,
    ) -> impl Iterator<Item = (Handle<Instruction>, &Instruction)> {
        self.block_instructions(block)
            .take_while(|(_, inst)| matches!(inst.op, Operation::Phi(_)))
    }
}

/// A basic block.
#[derive(Clone, Debug)]
pub struct Block {
    /// Label id in the source module; `None` for blocks created during
    /// translation.
    pub label: Option<u32>,
    /// Instructions in order, phis first.
    pub instructions: Vec<Handle<Instruction>>,
    /// Blocks branching here, without duplicates, in discovery order.
    pub predecessors: Vec<Handle<Block>>,
    pub merge: Option<Merge>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(label: Option<u32>) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            merge: None,
            terminator: Terminator::Unreachable,
        }
    }
}

/// Structured control-flow hint attached to a header block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Merge {
    Selection {
        merge: Handle<Block>,
    },
    Loop {
        merge: Handle<Block>,
        continuing: Handle<Block>,
    },
}

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminator {
    Branch {
        target: Handle<Block>,
    },
    BranchConditional {
        condition: Handle<Instruction>,
        accept: Handle<Block>,
        reject: Handle<Block>,
    },
    Switch {
        selector: Handle<Instruction>,
        cases: Vec<SwitchCase>,
        default: Handle<Block>,
    },
    Return,
    /// Discards the fragment.
    Kill,
    Unreachable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwitchCase {
    pub value: u32,
    pub target: Handle<Block>,
}

impl Terminator {
    /// Successor blocks, in operand order, possibly with repeats.
    pub fn targets(&self) -> Vec<Handle<Block>> {
        match *self {
            Self::Branch { target } => vec![target],
            Self::BranchConditional { accept, reject, .. } => vec![accept, reject],
            Self::Switch {
                ref cases, default, ..
            } => std::iter::once(default)
                .chain(cases.iter().map(|c| c.target))
                .collect(),
            Self::Return | Self::Kill | Self::Unreachable => Vec::new(),
        }
    }

    /// Redirects every edge to `from` towards `to`.
    pub fn retarget(&mut self, from: Handle<Block>, to: Handle<Block>) {
        let swap = |b: &mut Handle<Block>| {
            if *b == from {
                *b = to;
            }
        };
        match self {
            Self::Branch { target } => swap(target),
            Self::BranchConditional { accept, reject, .. } => {
                swap(accept);
                swap(reject);
            }
            Self::Switch { cases, default, .. } => {
                swap(default);
                for case in cases {
                    swap(&mut case.target);
                }
            }
            Self::Return | Self::Kill | Self::Unreachable => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_targets_start_with_default() {
        let mut blocks = Arena::new();
        let a = blocks.append(Block::new(Some(1)));
        let b = blocks.append(Block::new(Some(2)));
        let mut insts: Arena<Instruction> = Arena::new();
        let sel = insts.append(Instruction {
            op: Operation::Undef,
            ty: None,
        });
        let term = Terminator::Switch {
            selector: sel,
            cases: vec![SwitchCase { value: 7, target: b }],
            default: a,
        };
        assert_eq!(term.targets(), vec![a, b]);
    }

    #[test]
    fn retarget_rewrites_every_matching_edge() {
        let mut blocks = Arena::new();
        let a = blocks.append(Block::new(None));
        let b = blocks.append(Block::new(None));
        let c = blocks.append(Block::new(None));
        let mut insts: Arena<Instruction> = Arena::new();
        let cond = insts.append(Instruction {
            op: Operation::Undef,
            ty: None,
        });
        let mut term = Terminator::BranchConditional {
            condition: cond,
            accept: a,
            reject: b,
        };
        term.retarget(b, c);
        assert_eq!(term.targets(), vec![a, c]);
    }

    #[test]
    fn entry_block_is_first() {
        let mut func = Function::new(Some("main".into()));
        assert_eq!(func.entry_block(), None);
        let entry = func.blocks.append(Block::new(Some(5)));
        func.blocks.append(Block::new(Some(6)));
        assert_eq!(func.entry_block(), Some(entry));
    }
}

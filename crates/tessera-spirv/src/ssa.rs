//! Type-shaped trees of SSA definitions.

use tessera_ir::{Arena, Handle, Instruction, Type};

/// An SSA value of any type.
///
/// Scalars and vectors are a single instruction; matrices, arrays and
/// structs hold one tree per column, element or member.
#[derive(Clone, Debug)]
pub(crate) struct SsaValue {
    pub ty: Handle<Type>,
    pub kind: SsaKind,
    /// Cached transpose of a matrix value, linked in both directions.
    pub transposed: Option<Handle<SsaValue>>,
}

#[derive(Clone, Debug)]
pub(crate) enum SsaKind {
    Leaf(Handle<Instruction>),
    Composite(Vec<Handle<SsaValue>>),
}

impl SsaValue {
    pub fn leaf(ty: Handle<Type>, def: Handle<Instruction>) -> Self {
        Self {
            ty,
            kind: SsaKind::Leaf(def),
            transposed: None,
        }
    }

    pub fn composite(ty: Handle<Type>, children: Vec<Handle<SsaValue>>) -> Self {
        Self {
            ty,
            kind: SsaKind::Composite(children),
            transposed: None,
        }
    }

    pub fn as_leaf(&self) -> Option<Handle<Instruction>> {
        match self.kind {
            SsaKind::Leaf(def) => Some(def),
            SsaKind::Composite(_) => None,
        }
    }

    pub fn children(&self) -> &[Handle<SsaValue>] {
        match self.kind {
            SsaKind::Leaf(_) => &[],
            SsaKind::Composite(ref children) => children,
        }
    }
}

/// Copies the tree rooted at `value` so that the copy can be modified
/// without affecting the original. Leaves are shared.
pub(crate) fn deep_copy(arena: &mut Arena<SsaValue>, value: Handle<SsaValue>) -> Handle<SsaValue> {
    let ty = arena[value].ty;
    match arena[value].kind.clone() {
        SsaKind::Leaf(def) => arena.append(SsaValue::leaf(ty, def)),
        SsaKind::Composite(children) => {
            let copies = children
                .into_iter()
                .map(|child| deep_copy(arena, child))
                .collect();
            arena.append(SsaValue::composite(ty, copies))
        }
    }
}

/// Collects the leaves of `value` in depth-first order.
pub(crate) fn leaves(arena: &Arena<SsaValue>, value: Handle<SsaValue>) -> Vec<Handle<Instruction>> {
    let mut out = Vec::new();
    let mut stack = vec![value];
    while let Some(node) = stack.pop() {
        match arena[node].kind {
            SsaKind::Leaf(def) => out.push(def),
            SsaKind::Composite(ref children) => stack.extend(children.iter().rev()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::{Operation, Scalar, TypeInner, UniqueArena};

    #[test]
    fn deep_copy_shares_leaves_but_not_nodes() {
        let mut types = UniqueArena::new();
        let f = types.insert(Type {
            name: None,
            inner: TypeInner::Scalar(Scalar::F32),
        });
        let mut insts = Arena::new();
        let a = insts.append(Instruction {
            op: Operation::Constant(vec![1]),
            ty: Some(f),
        });
        let b = insts.append(Instruction {
            op: Operation::Constant(vec![2]),
            ty: Some(f),
        });

        let mut ssa = Arena::new();
        let la = ssa.append(SsaValue::leaf(f, a));
        let lb = ssa.append(SsaValue::leaf(f, b));
        let root = ssa.append(SsaValue::composite(f, vec![la, lb]));

        let copy = deep_copy(&mut ssa, root);
        assert_ne!(copy, root);
        assert!(ssa[copy].children().iter().all(|c| !ssa[root].children().contains(c)));
        assert_eq!(leaves(&ssa, copy), vec![a, b]);
        assert_eq!(leaves(&ssa, root), vec![a, b]);
    }
}

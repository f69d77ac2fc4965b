//! Integration test: build a diamond-shaped function by hand, verify it and
//! check the text dump.

use tessera_ir::*;

struct Diamond {
    module: Module,
    function: Function,
    merge: Handle<Block>,
    then_block: Handle<Block>,
    else_block: Handle<Block>,
}

fn emit(
    function: &mut Function,
    block: Handle<Block>,
    op: Operation,
    ty: Option<Handle<Type>>,
) -> Handle<Instruction> {
    let inst = function.instructions.append(Instruction { op, ty });
    function.blocks[block].instructions.push(inst);
    inst
}

/// ```text
/// bb0: br_if (3 < 5), bb1, bb2
/// bb1: br bb3
/// bb2: br bb3
/// bb3: out = phi [bb1: 5, bb2: 3]
/// ```
fn diamond() -> Diamond {
    let mut module = Module::new(ShaderStage::Compute);
    let uint = module.insert_type(TypeInner::Scalar(Scalar::U32));
    let boolean = module.insert_type(TypeInner::Scalar(Scalar::BOOL));
    let out = module
        .variables
        .append(Variable::new(Some("out".into()), uint, VariableMode::Global));
    module.globals.push(out);

    let mut function = Function::new(Some("select_max".into()));
    let entry = function.blocks.append(Block::new(Some(1)));
    let then_block = function.blocks.append(Block::new(Some(2)));
    let else_block = function.blocks.append(Block::new(Some(3)));
    let merge = function.blocks.append(Block::new(Some(4)));

    let small = emit(&mut function, entry, Operation::Constant(vec![3]), Some(uint));
    let large = emit(&mut function, entry, Operation::Constant(vec![5]), Some(uint));
    let less = emit(
        &mut function,
        entry,
        Operation::Binary {
            op: BinaryOp::Less,
            kind: ScalarKind::Uint,
            left: small,
            right: large,
        },
        Some(boolean),
    );
    let phi = emit(
        &mut function,
        merge,
        Operation::Phi(vec![
            PhiSource {
                block: then_block,
                value: large,
            },
            PhiSource {
                block: else_block,
                value: small,
            },
        ]),
        Some(uint),
    );
    emit(
        &mut function,
        merge,
        Operation::StoreVariable {
            deref: Deref::new(out),
            value: phi,
            mask: WriteMask::X,
        },
        None,
    );

    function.blocks[entry].merge = Some(Merge::Selection { merge });
    function.blocks[entry].terminator = Terminator::BranchConditional {
        condition: less,
        accept: then_block,
        reject: else_block,
    };
    for block in [then_block, else_block] {
        function.blocks[block].terminator = Terminator::Branch { target: merge };
        function.blocks[block].predecessors.push(entry);
    }
    function.blocks[merge].predecessors = vec![then_block, else_block];
    function.blocks[merge].terminator = Terminator::Return;

    Diamond {
        module,
        function,
        merge,
        then_block,
        else_block,
    }
}

#[test]
fn diamond_verifies_and_dumps() {
    let Diamond {
        mut module,
        function,
        ..
    } = diamond();
    function.verify().expect("diamond should verify");
    assert_eq!(function.phis(function.blocks.handles().nth(3).unwrap()).count(), 1);

    module.functions.append(function);
    let dump = dump_module(&module);
    assert!(dump.contains("Stage: compute"), "{dump}");
    assert!(dump.contains("local_size(1, 1, 1)"), "{dump}");
    assert!(dump.contains("fn select_max()"), "{dump}");
    assert!(dump.contains("; selection merge bb3"), "{dump}");
    assert!(dump.contains("phi [bb1: %1, bb2: %0]"), "{dump}");
    assert!(dump.contains("br_if %2, bb1, bb2"), "{dump}");
}

#[test]
fn missing_predecessor_is_reported() {
    let Diamond {
        mut function,
        merge,
        ..
    } = diamond();
    function.blocks[merge].predecessors.pop();
    assert!(matches!(
        function.verify(),
        Err(IrError::PredecessorMismatch { block: 3, .. })
    ));
}

#[test]
fn phi_without_a_source_per_predecessor_is_reported() {
    let Diamond {
        mut function,
        merge,
        else_block,
        ..
    } = diamond();
    let phi = function.blocks[merge].instructions[0];
    if let Operation::Phi(ref mut sources) = function.instructions[phi].op {
        sources.retain(|s| s.block != else_block);
    }
    assert!(matches!(
        function.verify(),
        Err(IrError::PhiSourceMismatch { block: 3, .. })
    ));
}

#[test]
fn phi_after_other_instructions_is_reported() {
    let Diamond {
        mut function,
        merge,
        then_block,
        ..
    } = diamond();
    function.blocks[merge].instructions.reverse();
    assert!(matches!(
        function.verify(),
        Err(IrError::MisplacedPhi { block: 3, .. })
    ));
    assert_eq!(function.blocks[then_block].predecessors.len(), 1);
}

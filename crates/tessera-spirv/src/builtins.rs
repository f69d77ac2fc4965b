//! Slot assignment for builtin variables.

use spirv::BuiltIn;
use tessera_ir::slots::{frag_result, system_value, varying};
use tessera_ir::{ShaderStage, VariableMode};

use crate::ParseError;

/// Returns the slot of `builtin` and the mode the variable takes, given the
/// mode it was declared with.
pub(crate) fn builtin_location(
    builtin: BuiltIn,
    stage: ShaderStage,
    mode: VariableMode,
) -> Result<(u32, VariableMode), ParseError> {
    use VariableMode as M;

    let per_vertex = |location| {
        let valid = match stage {
            ShaderStage::Vertex => mode == M::ShaderOut,
            ShaderStage::Geometry => matches!(mode, M::ShaderIn | M::ShaderOut),
            _ => false,
        };
        if valid {
            Ok((location, mode))
        } else {
            Err(crate::malformed(format!(
                "{builtin:?} used as a {stage} {mode}"
            )))
        }
    };
    let fragment = |location, expected: VariableMode| {
        if stage == ShaderStage::Fragment && mode == expected {
            Ok((location, mode))
        } else {
            Err(crate::malformed(format!(
                "{builtin:?} used as a {stage} {mode}"
            )))
        }
    };
    let system = |location| Ok((location, M::SystemValue));

    match builtin {
        BuiltIn::Position => per_vertex(varying::POS),
        BuiltIn::PointSize => per_vertex(varying::PSIZ),
        BuiltIn::ClipDistance => per_vertex(varying::CLIP_DIST0),
        // Vulkan's VertexId is zero based; the base vertex is separate.
        BuiltIn::VertexId | BuiltIn::VertexIndex => system(system_value::VERTEX_ID_ZERO_BASE),
        BuiltIn::InstanceId | BuiltIn::InstanceIndex => system(system_value::INSTANCE_ID),
        BuiltIn::InvocationId => system(system_value::INVOCATION_ID),
        BuiltIn::PrimitiveId => Ok((varying::PRIMITIVE_ID, M::ShaderOut)),
        BuiltIn::Layer => Ok((varying::LAYER, M::ShaderOut)),
        BuiltIn::FragCoord => fragment(varying::POS, M::ShaderIn),
        BuiltIn::PointCoord => fragment(varying::PNTC, M::ShaderIn),
        BuiltIn::FrontFacing => fragment(varying::FACE, M::ShaderIn),
        BuiltIn::FragDepth => fragment(frag_result::DEPTH, M::ShaderOut),
        BuiltIn::SampleId => system(system_value::SAMPLE_ID),
        BuiltIn::SamplePosition => system(system_value::SAMPLE_POS),
        BuiltIn::SampleMask if mode == M::ShaderOut => {
            fragment(frag_result::SAMPLE_MASK, M::ShaderOut)
        }
        BuiltIn::SampleMask => system(system_value::SAMPLE_MASK_IN),
        BuiltIn::NumWorkgroups => system(system_value::NUM_WORK_GROUPS),
        BuiltIn::WorkgroupId => system(system_value::WORK_GROUP_ID),
        BuiltIn::LocalInvocationId => system(system_value::LOCAL_INVOCATION_ID),
        BuiltIn::LocalInvocationIndex => system(system_value::LOCAL_INVOCATION_INDEX),
        BuiltIn::GlobalInvocationId => system(system_value::GLOBAL_INVOCATION_ID),
        BuiltIn::TessLevelOuter
        | BuiltIn::TessLevelInner
        | BuiltIn::TessCoord
        | BuiltIn::PatchVertices => Err(crate::unsupported("tessellation builtins")),
        other => Err(crate::unsupported(format!("builtin {other:?}"))),
    }
}

/// Whether `builtin` is stored per vertex, so that geometry inputs see one
/// copy per input vertex.
pub(crate) fn is_per_vertex(builtin: BuiltIn) -> bool {
    matches!(
        builtin,
        BuiltIn::Position | BuiltIn::PointSize | BuiltIn::ClipDistance
    )
}

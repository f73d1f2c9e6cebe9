//! Render pipelines: `pipe`-attributed types naming their stage functions,
//! and the bucketing of pipelines that can share a descriptor-set layout.
//! Grounded on `examples/original_source/sources/analyzer.c`'s
//! `find_pipeline_buckets`.
use crate::context::Context;
use crate::error::{DebugContext, Error, Result};
use crate::func::FunctionId;
use crate::ty::TypeId;

pub const PIPE_ATTRIBUTE: &str = "pipe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPipeline {
    pub ty: TypeId,
    pub vertex_shader: Option<FunctionId>,
    pub amplification_shader: Option<FunctionId>,
    pub mesh_shader: Option<FunctionId>,
    pub fragment_shader: Option<FunctionId>,
}

/// Every `pipe`-attributed type in `ctx`, resolved to its stage functions.
/// A pipeline must name a fragment shader and either a vertex or a mesh
/// shader (spec §4.3).
pub fn find_render_pipelines(ctx: &Context) -> Result<Vec<RenderPipeline>> {
    let pipe = match ctx.names.find(PIPE_ATTRIBUTE) {
        Some(n) => n,
        None => return Ok(Vec::new()),
    };

    let mut pipelines = Vec::new();

    for (ty_id, t) in ctx.types.iter() {
        if t.built_in || !ctx.types.has_attribute(ty_id, pipe) {
            continue;
        }

        let mut vertex_name = None;
        let mut amplification_name = None;
        let mut mesh_name = None;
        let mut fragment_name = None;

        for m in &t.members {
            let field = ctx.names.get(m.name).unwrap_or("");
            let target = match &m.value {
                Some(crate::ty::Literal::Name(n)) => Some(*n),
                _ => None,
            };
            match field {
                "vertex" => vertex_name = target,
                "amplification" => amplification_name = target,
                "mesh" => mesh_name = target,
                "fragment" => fragment_name = target,
                _ => {}
            }
        }

        let type_name = ctx.types.type_name(&ctx.names, ty_id);
        if vertex_name.is_none() && mesh_name.is_none() {
            return Err(Error::MissingStage { pipeline: type_name.clone(), ctx: DebugContext::default() });
        }
        if fragment_name.is_none() {
            return Err(Error::MissingStage { pipeline: type_name, ctx: DebugContext::default() });
        }

        pipelines.push(RenderPipeline {
            ty: ty_id,
            vertex_shader: vertex_name.and_then(|n| ctx.functions.find_function(n)),
            amplification_shader: amplification_name.and_then(|n| ctx.functions.find_function(n)),
            mesh_shader: mesh_name.and_then(|n| ctx.functions.find_function(n)),
            fragment_shader: fragment_name.and_then(|n| ctx.functions.find_function(n)),
        });
    }

    Ok(pipelines)
}

fn shares_a_stage(a: &RenderPipeline, b: &RenderPipeline) -> bool {
    (a.vertex_shader.is_some() && a.vertex_shader == b.vertex_shader)
        || (a.amplification_shader.is_some() && a.amplification_shader == b.amplification_shader)
        || (a.mesh_shader.is_some() && a.mesh_shader == b.mesh_shader)
        || (a.fragment_shader.is_some() && a.fragment_shader == b.fragment_shader)
}

/// Partitions `pipelines` into the fewest buckets such that no bucket
/// contains two pipelines sharing a stage function (spec §4.3), greedily
/// first-fitting each pipeline into the first bucket none of whose current
/// members it conflicts with, else opening a fresh bucket.
pub fn find_pipeline_buckets(pipelines: &[RenderPipeline]) -> Vec<Vec<usize>> {
    let mut buckets: Vec<Vec<usize>> = Vec::new();

    for index in 0..pipelines.len() {
        let pipeline = &pipelines[index];
        let home = buckets.iter_mut().find(|bucket| bucket.iter().all(|&b| !shares_a_stage(pipeline, &pipelines[b])));
        match home {
            Some(bucket) => bucket.push(index),
            None => buckets.push(vec![index]),
        }
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeRef;

    fn pipe(vs: Option<FunctionId>, fs: Option<FunctionId>) -> RenderPipeline {
        RenderPipeline {
            ty: crate::ty::NO_TYPE,
            vertex_shader: vs,
            amplification_shader: None,
            mesh_shader: None,
            fragment_shader: fs,
        }
    }

    /// No bucket may reuse a vertex or fragment function (spec §8 S5): five
    /// pipelines with vertex shaders {A,A,B,C,C} paired with fragments
    /// {X,Y,X,Y,Z} form a conflict graph with edges 0-1, 0-2, 1-3, 3-4 (a
    /// bipartite path), whose minimal coloring is exactly two buckets.
    #[test]
    fn pipelines_sharing_a_stage_split_into_conflict_free_buckets() {
        let mut ctx = Context::new();
        let vs_a = ctx.functions.add_function(ctx.names.intern("vs_a"), TypeRef::scalar(crate::ty::NO_TYPE));
        let vs_b = ctx.functions.add_function(ctx.names.intern("vs_b"), TypeRef::scalar(crate::ty::NO_TYPE));
        let vs_c = ctx.functions.add_function(ctx.names.intern("vs_c"), TypeRef::scalar(crate::ty::NO_TYPE));
        let fs_x = ctx.functions.add_function(ctx.names.intern("fs_x"), TypeRef::scalar(crate::ty::NO_TYPE));
        let fs_y = ctx.functions.add_function(ctx.names.intern("fs_y"), TypeRef::scalar(crate::ty::NO_TYPE));
        let fs_z = ctx.functions.add_function(ctx.names.intern("fs_z"), TypeRef::scalar(crate::ty::NO_TYPE));

        let pipelines = vec![
            pipe(Some(vs_a), Some(fs_x)),
            pipe(Some(vs_a), Some(fs_y)),
            pipe(Some(vs_b), Some(fs_x)),
            pipe(Some(vs_c), Some(fs_y)),
            pipe(Some(vs_c), Some(fs_z)),
        ];
        let buckets = find_pipeline_buckets(&pipelines);
        assert_eq!(buckets.len(), 2);
        for bucket in &buckets {
            for (i, &a) in bucket.iter().enumerate() {
                for &b in &bucket[i + 1..] {
                    assert!(!shares_a_stage(&pipelines[a], &pipelines[b]), "bucket {:?} reuses a stage function", bucket);
                }
            }
        }
    }

    #[test]
    fn disjoint_pipelines_share_one_bucket() {
        let mut ctx = Context::new();
        let vs_a = ctx.functions.add_function(ctx.names.intern("vs_a"), TypeRef::scalar(crate::ty::NO_TYPE));
        let fs_a = ctx.functions.add_function(ctx.names.intern("fs_a"), TypeRef::scalar(crate::ty::NO_TYPE));
        let vs_b = ctx.functions.add_function(ctx.names.intern("vs_b"), TypeRef::scalar(crate::ty::NO_TYPE));
        let fs_b = ctx.functions.add_function(ctx.names.intern("fs_b"), TypeRef::scalar(crate::ty::NO_TYPE));

        let pipelines = vec![pipe(Some(vs_a), Some(fs_a)), pipe(Some(vs_b), Some(fs_b))];
        let buckets = find_pipeline_buckets(&pipelines);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0], vec![0, 1]);
    }

    #[test]
    fn missing_fragment_shader_is_rejected() {
        let mut ctx = Context::new();
        ctx.names.intern(PIPE_ATTRIBUTE);
        let pipe_attr = ctx.names.find(PIPE_ATTRIBUTE).unwrap();
        let vs_name = ctx.names.intern("vs_main");
        ctx.functions.add_function(vs_name, TypeRef::scalar(crate::ty::NO_TYPE));

        let ty = ctx.types.add_type(Some(ctx.names.intern("BadPipeline")));
        ctx.types.get_mut(ty).unwrap().attributes.push(pipe_attr);
        ctx.types.add_struct_member_with_value(
            ty,
            ctx.names.intern("vertex"),
            TypeRef::scalar(crate::ty::NO_TYPE),
            crate::ty::Literal::Name(vs_name),
        );

        let err = find_render_pipelines(&ctx);
        assert!(matches!(err, Err(Error::MissingStage { .. })));
    }
}

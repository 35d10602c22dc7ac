#![allow(dead_code)]

use std::ops::Range;

use slot_ngin::{
    Context, MeshId, MeshSource, PipelineId, PipelineOptions, RendererConfig, ShaderSource,
    data_structures::model::{CharInstance, Instance, ModelVertex, Vertex2D},
    device::HeadlessDevice,
    render::RenderCommand,
};

pub(crate) type TestContext = Context<HeadlessDevice>;

pub(crate) fn headless_context() -> TestContext {
    context_with(RendererConfig::default())
}

pub(crate) fn context_with(config: RendererConfig) -> TestContext {
    let _ = env_logger::builder().is_test(true).try_init();
    Context::headless(config).expect("valid test configuration")
}

pub(crate) fn standard_pipeline(ctx: &mut TestContext, label: &str) -> PipelineId {
    ctx.create_pipeline(label, ShaderSource::standard(), PipelineOptions::standard())
        .expect("standard pipeline")
}

pub(crate) fn hud_pipeline(ctx: &mut TestContext, label: &str) -> PipelineId {
    ctx.create_pipeline(label, ShaderSource::hud(), PipelineOptions::hud())
        .expect("hud pipeline")
}

pub(crate) fn triangle() -> (Vec<ModelVertex>, Vec<u32>) {
    let normal = [0.0, 0.0, 1.0];
    (
        vec![
            ModelVertex::new([0.0, 0.0, 0.0], normal, [0.0, 0.0]),
            ModelVertex::new([1.0, 0.0, 0.0], normal, [1.0, 0.0]),
            ModelVertex::new([0.0, 1.0, 0.0], normal, [0.0, 1.0]),
        ],
        vec![0, 1, 2],
    )
}

/// `count` instances spread along the x axis.
pub(crate) fn row_of_instances(count: usize) -> Vec<Instance> {
    (0..count)
        .map(|i| Instance::from_position(cgmath::Vector3::new(i as f32, 0.0, 0.0)))
        .collect()
}

pub(crate) fn add_triangle(ctx: &mut TestContext, pipeline: PipelineId, instances: &[Instance]) -> MeshId {
    let (vertices, indices) = triangle();
    ctx.create_mesh(pipeline, MeshSource::new(&vertices, &indices, instances))
        .expect("triangle mesh")
}

pub(crate) fn add_text(ctx: &mut TestContext, pipeline: PipelineId, text: &str, capacity: usize) -> MeshId {
    let (vertices, indices) = Vertex2D::quad();
    let chars = CharInstance::from_text(text, 0);
    ctx.create_mesh(
        pipeline,
        MeshSource::new(&vertices, &indices, &chars).with_instance_capacity(capacity),
    )
    .expect("text mesh")
}

/// One `DrawIndexed` together with the state bound when it was issued.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Draw {
    pub pipeline: String,
    pub vertex_buffer: u32,
    pub instance_buffer: u32,
    pub index_buffer: u32,
    pub textures: Vec<u32>,
    pub indices: Range<u32>,
    pub instances: Range<u32>,
}

pub(crate) fn draws(commands: &[RenderCommand<HeadlessDevice>]) -> Vec<Draw> {
    let mut pipeline = None;
    let mut textures = Vec::new();
    let (mut vertex_buffer, mut instance_buffer, mut index_buffer) = (None, None, None);
    let mut out = Vec::new();
    for command in commands {
        match command {
            RenderCommand::SetPipeline(p) => pipeline = Some(p.label.clone()),
            RenderCommand::SetBindGroup { index: 1, bind_group } => {
                textures = bind_group.texture_ids().to_vec()
            }
            RenderCommand::SetBindGroup { .. } | RenderCommand::SetViewport(_) => {}
            RenderCommand::SetVertexBuffer { slot: 0, buffer } => vertex_buffer = Some(buffer.id),
            RenderCommand::SetVertexBuffer { buffer, .. } => instance_buffer = Some(buffer.id),
            RenderCommand::SetIndexBuffer(buffer) => index_buffer = Some(buffer.id),
            RenderCommand::DrawIndexed { indices, instances } => out.push(Draw {
                pipeline: pipeline.clone().expect("draw before SetPipeline"),
                vertex_buffer: vertex_buffer.expect("draw without vertex buffer"),
                instance_buffer: instance_buffer.expect("draw without instance buffer"),
                index_buffer: index_buffer.expect("draw without index buffer"),
                textures: textures.clone(),
                indices: indices.clone(),
                instances: instances.clone(),
            }),
        }
    }
    out
}

pub(crate) fn last_submission(ctx: &TestContext) -> Vec<RenderCommand<HeadlessDevice>> {
    ctx.device()
        .submissions()
        .last()
        .expect("at least one submitted frame")
        .to_vec()
}

/// Encode a mesh in the engine's binary mesh format.
pub(crate) fn encode_mesh_file(vertices: &[ModelVertex], indices: &[u32], bones: u32, frames: &[[f32; 16]]) -> Vec<u8> {
    let header_len = 7 * 4;
    let frame_count = if bones == 0 { 0 } else { frames.len() as u32 / bones };
    let vertex_offset = header_len as u32;
    let index_offset = vertex_offset + std::mem::size_of_val(vertices) as u32;
    let bones_offset = index_offset + std::mem::size_of_val(indices) as u32;
    let header = [
        vertices.len() as u32,
        indices.len() as u32,
        bones,
        frame_count,
        vertex_offset,
        index_offset,
        bones_offset,
    ];
    let mut bytes: Vec<u8> = header.iter().flat_map(|v| v.to_le_bytes()).collect();
    bytes.extend_from_slice(bytemuck::cast_slice(vertices));
    bytes.extend(indices.iter().flat_map(|i| i.to_le_bytes()));
    bytes.extend(frames.iter().flatten().flat_map(|f| f.to_le_bytes()));
    bytes
}

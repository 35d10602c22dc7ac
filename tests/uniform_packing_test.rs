mod common;

use common::test_utils::{add_triangle, context_with, headless_context, row_of_instances, standard_pipeline};
use slot_ngin::{EngineError, ErrorKind, RendererConfig};

#[test]
fn scalar_then_vec4_lands_on_the_next_16_byte_boundary() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");

    let brightness = ctx.add_uniform_value(pipeline, &1.5f32).unwrap();
    let tint = ctx.add_uniform_value(pipeline, &[1.0f32, 0.5, 0.25, 1.0]).unwrap();

    assert_eq!(brightness, 0);
    assert_eq!(tint, 16);
    assert_eq!(ctx.pipeline(pipeline).unwrap().uniforms().cursor(), 32);
}

#[test]
fn offsets_grow_and_respect_alignment() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");

    let sizes = [4usize, 8, 4, 64, 12, 8, 16, 4];
    let mut previous_end = 0;
    for size in sizes {
        let offset = ctx.add_uniform(pipeline, &vec![0xAB; size]).unwrap();
        let alignment = match size {
            0..=4 => 4,
            5..=8 => 8,
            _ => 16,
        };
        assert_eq!(offset % alignment, 0, "{size} byte value at {offset}");
        assert!(offset >= previous_end, "{offset} overlaps previous value ending at {previous_end}");
        previous_end = offset + size;
    }
}

#[test]
fn overflowing_value_is_rejected_without_changing_the_block() {
    let config = RendererConfig::default().with_uniform_capacity(32);
    let mut ctx = context_with(config);
    let pipeline = standard_pipeline(&mut ctx, "world");

    ctx.add_uniform_value(pipeline, &[1.0f32; 4]).unwrap();
    let before = ctx.pipeline(pipeline).unwrap().uniforms().clone();

    let err = ctx.add_uniform_value(pipeline, &[2.0f32; 8]).unwrap_err();
    assert!(matches!(err, EngineError::UniformCapacity { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Capacity);
    assert_eq!(ctx.pipeline(pipeline).unwrap().uniforms(), &before);

    // The remaining 16 bytes are still usable.
    assert_eq!(ctx.add_uniform_value(pipeline, &[3.0f32; 4]).unwrap(), 16);
}

#[test]
fn default_block_holds_exactly_1024_bytes() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");

    for i in 0..64 {
        let offset = ctx.add_uniform_value(pipeline, &[i as f32; 4]).unwrap();
        assert_eq!(offset, i * 16);
    }
    let full = ctx.pipeline(pipeline).unwrap().uniforms().clone();
    assert_eq!(full.cursor(), 1024);

    let err = ctx.add_uniform_value(pipeline, &1.0f32).unwrap_err();
    assert!(matches!(err, EngineError::UniformCapacity { .. }), "{err}");
    assert_eq!(ctx.pipeline(pipeline).unwrap().uniforms(), &full);
}

#[test]
fn updates_must_stay_inside_registered_bytes() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    let offset = ctx.add_uniform_value(pipeline, &[0.0f32; 4]).unwrap();

    ctx.set_uniform_value(pipeline, offset + 4, &7.0f32).unwrap();
    let err = ctx.set_uniform_value(pipeline, offset + 8, &[0.0f32; 4]).unwrap_err();
    assert!(matches!(err, EngineError::UniformOutOfRange { .. }), "{err}");
}

#[test]
fn whole_block_is_uploaded_when_the_pipeline_is_drawn() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    add_triangle(&mut ctx, pipeline, &row_of_instances(1));
    let brightness = ctx.add_uniform_value(pipeline, &0.5f32).unwrap();
    let tint = ctx.add_uniform_value(pipeline, &[1.0f32, 2.0, 3.0, 4.0]).unwrap();

    ctx.start_frame().unwrap();
    ctx.draw_pipeline(pipeline).unwrap();
    ctx.end_frame().unwrap();

    // Changes made after the draw only reach the GPU with the next draw.
    ctx.set_uniform_value(pipeline, brightness, &0.75f32).unwrap();
    let record = ctx.pipeline(pipeline).unwrap();
    let writes = ctx.device().writes_to(record.uniform_buffer());
    assert_eq!(writes.len(), 1);
    let uploaded = writes[0];
    assert_eq!(uploaded.len(), ctx.config().uniform_capacity);
    assert_eq!(&uploaded[brightness..brightness + 4], &0.5f32.to_ne_bytes());
    assert_eq!(&uploaded[tint..tint + 16], bytemuck::cast_slice::<f32, u8>(&[1.0, 2.0, 3.0, 4.0]));

    ctx.start_frame().unwrap();
    ctx.draw_pipeline(pipeline).unwrap();
    ctx.end_frame().unwrap();
    let record = ctx.pipeline(pipeline).unwrap();
    let writes = ctx.device().writes_to(record.uniform_buffer());
    assert_eq!(writes.len(), 2);
    assert_eq!(&writes[1][brightness..brightness + 4], &0.75f32.to_ne_bytes());
}

#[test]
fn uniforms_of_pipelines_are_independent() {
    let mut ctx = headless_context();
    let first = standard_pipeline(&mut ctx, "first");
    let second = standard_pipeline(&mut ctx, "second");

    ctx.add_uniform_value(first, &[0.0f32; 4]).unwrap();
    assert_eq!(ctx.add_uniform_value(second, &1.0f32).unwrap(), 0);
}

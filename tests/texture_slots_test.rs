mod common;

use common::test_utils::{add_triangle, context_with, draws, headless_context, last_submission, row_of_instances, standard_pipeline};
use slot_ngin::{EngineError, ErrorKind, RendererConfig, TextureSource};

const DEFAULT_TEXTURE: u32 = 0;

fn checker() -> Vec<u8> {
    [[255u8, 255, 255, 255], [0, 0, 0, 255], [0, 0, 0, 255], [255, 255, 255, 255]].concat()
}

fn rgba(pixels: &[u8]) -> TextureSource<'_> {
    TextureSource::Rgba {
        width: 2,
        height: 2,
        pixels,
    }
}

#[test]
fn new_pipeline_binds_the_default_texture_everywhere() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");

    let record = ctx.pipeline(pipeline).unwrap();
    assert!(record.textures().is_empty());
    assert_eq!(record.texture_bind_group().texture_ids(), &[DEFAULT_TEXTURE; 4]);
}

#[test]
fn added_texture_takes_the_next_slot() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    let pixels = checker();

    assert_eq!(ctx.add_texture(pipeline, rgba(&pixels)).unwrap(), 0);
    assert_eq!(ctx.add_texture(pipeline, rgba(&pixels)).unwrap(), 1);

    let record = ctx.pipeline(pipeline).unwrap();
    let ids: Vec<u32> = record.textures().iter().map(|texture| texture.id).collect();
    assert_eq!(
        record.texture_bind_group().texture_ids(),
        &[ids[0], ids[1], DEFAULT_TEXTURE, DEFAULT_TEXTURE]
    );
}

#[test]
fn one_texture_too_many_fails_and_keeps_the_bindings() {
    let mut ctx = context_with(RendererConfig::default().with_max_textures(2));
    let pipeline = standard_pipeline(&mut ctx, "world");
    let pixels = checker();
    ctx.add_texture(pipeline, rgba(&pixels)).unwrap();
    ctx.add_texture(pipeline, rgba(&pixels)).unwrap();
    let bindings = ctx.pipeline(pipeline).unwrap().texture_bind_group().clone();

    let err = ctx.add_texture(pipeline, rgba(&pixels)).unwrap_err();
    assert!(matches!(err, EngineError::TextureSlotsFull { max: 2, .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Capacity);

    let record = ctx.pipeline(pipeline).unwrap();
    assert_eq!(record.textures().len(), 2);
    assert_eq!(record.texture_bind_group(), &bindings);
}

#[test]
fn undecodable_texture_leaves_slots_untouched() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");

    let err = ctx
        .add_texture(pipeline, TextureSource::Binary(&[2, 0, 0, 0, 2, 0, 0, 0, 1, 2, 3]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Asset);
    assert!(ctx.pipeline(pipeline).unwrap().textures().is_empty());

    // The failed load did not use up a slot.
    assert_eq!(ctx.add_texture(pipeline, rgba(&checker())).unwrap(), 0);
}

#[test]
fn texture_beyond_the_device_limit_leaves_slots_untouched() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    ctx.device_mut().set_max_texture_dimension(1);
    let bindings = ctx.pipeline(pipeline).unwrap().texture_bind_group().clone();

    let err = ctx.add_texture(pipeline, rgba(&checker())).unwrap_err();
    assert!(matches!(err, EngineError::Asset(_)), "{err}");

    let record = ctx.pipeline(pipeline).unwrap();
    assert!(record.textures().is_empty());
    assert_eq!(record.texture_bind_group(), &bindings);

    let pixel = [255u8, 0, 0, 255];
    let one_pixel = TextureSource::Rgba {
        width: 1,
        height: 1,
        pixels: &pixel,
    };
    assert_eq!(ctx.add_texture(pipeline, one_pixel).unwrap(), 0);
}

#[test]
fn binary_texture_file_is_loaded_by_extension() {
    let dir = std::env::temp_dir().join(format!("slot-ngin-textures-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("checker.tex");
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&2i32.to_le_bytes());
    bytes.extend_from_slice(&2i32.to_le_bytes());
    bytes.extend_from_slice(&checker());
    std::fs::write(&path, bytes).unwrap();

    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    ctx.add_texture(pipeline, TextureSource::File(&path)).unwrap();

    let texture = ctx.pipeline(pipeline).unwrap().textures()[0];
    assert_eq!((texture.width, texture.height), (2, 2));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn draws_bind_the_textures_of_their_own_pipeline() {
    let mut ctx = headless_context();
    let textured = standard_pipeline(&mut ctx, "textured");
    let plain = standard_pipeline(&mut ctx, "plain");
    ctx.add_texture(textured, rgba(&checker())).unwrap();
    add_triangle(&mut ctx, textured, &row_of_instances(1));
    add_triangle(&mut ctx, plain, &row_of_instances(1));

    ctx.render_frame().unwrap();

    let texture_id = ctx.pipeline(textured).unwrap().textures()[0].id;
    let draws = draws(&last_submission(&ctx));
    assert_eq!(draws.len(), 2);
    assert_eq!(draws[0].textures, vec![texture_id, DEFAULT_TEXTURE, DEFAULT_TEXTURE, DEFAULT_TEXTURE]);
    assert_eq!(draws[1].textures, vec![DEFAULT_TEXTURE; 4]);
}

#[test]
fn texture_for_missing_pipeline_is_an_invalid_id() {
    let mut ctx = headless_context();
    let pipeline = standard_pipeline(&mut ctx, "world");
    ctx.destroy_pipeline(pipeline).unwrap();

    let err = ctx.add_texture(pipeline, rgba(&checker())).unwrap_err();
    assert!(matches!(err, EngineError::InvalidId { .. }), "{err}");
    assert_eq!(err.kind(), ErrorKind::Usage);
}

use panostitch_projection::{
    side_by_side, BlendWeights, BorderMode, FrameWarper, Interpolation, ProjectionMap, RgbFrame,
    StereoBlender, StitchConfig,
};
use proptest::prelude::*;

fn border_modes(fill: [u8; 3]) -> Vec<BorderMode> {
    vec![
        BorderMode::Reflect,
        BorderMode::Replicate,
        BorderMode::Constant(fill),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn map_shape_and_bounds(
        height in 2usize..40,
        side in 1usize..64,
        blend_frac in 0.0f64..1.0,
        aperture in 0.3f64..2.5,
    ) {
        let max_blend = (height - 1) / 2;
        let blend = ((max_blend as f64) * blend_frac) as usize;
        let map = ProjectionMap::build(height, side, blend, aperture).unwrap();

        prop_assert_eq!(map.height(), height);
        prop_assert_eq!(map.width(), height + 2 * blend);
        prop_assert_eq!(map.map_x().len(), height * (height + 2 * blend));

        let side = side as f32;
        for (&x, &y) in map.map_x().iter().zip(map.map_y()) {
            prop_assert!((0.0..=side).contains(&x), "x = {} outside [0, {}]", x, side);
            prop_assert!((0.0..=side).contains(&y), "y = {} outside [0, {}]", y, side);
        }
    }

    #[test]
    fn crossfade_weights_are_complementary(blend in 0usize..200) {
        let weights = BlendWeights::new(blend);
        prop_assert_eq!(weights.len(), 2 * blend);
        for (r, f) in weights.rising().iter().zip(weights.falling()) {
            prop_assert!((r + f - 1.0).abs() < 1e-6);
            prop_assert!((0.0..=1.0).contains(r));
        }
    }

    #[test]
    fn uniform_source_stays_uniform(
        height in 2usize..24,
        side in 1usize..32,
        blend_frac in 0.0f64..1.0,
        aperture in 0.3f64..2.5,
        rgb in any::<[u8; 3]>(),
        nearest in any::<bool>(),
    ) {
        let blend = (((height - 1) / 2) as f64 * blend_frac) as usize;
        let config = StitchConfig::new(height, blend, aperture).unwrap();
        let map = ProjectionMap::for_config(&config, side).unwrap();
        let source = RgbFrame::filled(side, side, rgb);
        let interpolation = if nearest { Interpolation::Nearest } else { Interpolation::Linear };

        // With a constant fill equal to the source color there is no
        // distinguishable border region at all.
        for border in border_modes(rgb) {
            let warper = FrameWarper::new(interpolation, border);
            let warped = warper.warp(&source, &map).unwrap();
            prop_assert!(warped.frame().as_bytes().chunks_exact(3).all(|px| px == rgb));

            let blended = StereoBlender::new(blend).blend(&warped, &warped).unwrap();
            prop_assert_eq!(blended.width(), 2 * height);
            prop_assert!(blended.as_bytes().chunks_exact(3).all(|px| px == rgb));
        }
    }

    #[test]
    fn side_by_side_is_two_lenses_wide(height in 1usize..32, rgb in any::<[u8; 3]>()) {
        let lens = RgbFrame::filled(height, height, rgb);
        let out = side_by_side(&lens, &lens).unwrap();
        prop_assert_eq!(out.width(), 2 * height);
        prop_assert_eq!(out.height(), height);
        prop_assert_eq!(out.as_bytes().len(), 2 * lens.as_bytes().len());
    }
}

#[test]
fn blend_output_width_is_two_lenses_minus_margins() {
    let config = StitchConfig::new(32, 5, 1.0).unwrap();
    let map = ProjectionMap::for_config(&config, 48).unwrap();
    let warper = FrameWarper::from_config(&config);
    let left = warper.warp(&RgbFrame::filled(48, 48, [200, 10, 10]), &map).unwrap();
    let right = warper.warp(&RgbFrame::filled(48, 48, [10, 10, 200]), &map).unwrap();

    let blender = StereoBlender::new(config.blend);
    let out = blender.blend(&left, &right).unwrap();
    assert_eq!(out.width(), 2 * (left.width() - 2 * config.blend));
    assert_eq!(out.width(), config.output_width());
    assert_eq!(out.as_bytes().len(), config.output_frame_bytes());

    // Bodies are untouched, seams fall strictly between the two colors.
    assert_eq!(out.pixel(config.blend + 3, 10), [200, 10, 10]);
    assert_eq!(out.pixel(32 + config.blend + 3, 10), [10, 10, 200]);
    let seam = out.pixel(32, 10);
    assert!(seam[0] < 200 && seam[0] > 10);
}

#[test]
fn constant_border_only_touches_the_rim() {
    // Lookups are clamped into [0, side]; the only out-of-range samples
    // come from coordinates on the far rim, everything else is source color.
    let side = 16;
    let map = ProjectionMap::build(12, side, 2, 1.0).unwrap();
    let warper = FrameWarper::new(Interpolation::Nearest, BorderMode::Constant([0, 0, 0]));
    let warped = warper
        .warp(&RgbFrame::filled(side, side, [90, 90, 90]), &map)
        .unwrap();

    for row in 0..map.height() {
        for col in 0..map.width() {
            let (x, y) = map.lookup(col, row);
            let inside = x.round() < side as f32 && y.round() < side as f32;
            let expected = if inside { [90, 90, 90] } else { [0, 0, 0] };
            assert_eq!(warped.frame().pixel(col, row), expected, "at ({col}, {row})");
        }
    }
}

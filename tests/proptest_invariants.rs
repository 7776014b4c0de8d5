//! Property-based invariant tests for the engine's building blocks.
//!
//! 1. One step of the map never leaves the [-2, 2] square, whichever
//!    evaluation strategy is used.
//! 2. The fast strategy tracks the precise one for moderate arguments.
//! 3. Fading never brightens a channel, at either strategy.
//! 4. Deposits saturate at 65535 whatever the display depth and report
//!    saturation exactly when blue is at the maximum.
//! 5. Every point lands on a cell inside the texture.
//! 6. The speed multiplier stays in [1, 30] and never falls as
//!    saturation grows.
//! 7. Knob writes stay inside each knob's range.

use dejong::buffer::SATURATED;
use dejong::controller::{speed_multiplier, MAX_SPEED};
use dejong::evaluator::step_fast;
use dejong::planes::PlaneMapper;
use dejong::{AccumulationBuffer, ChannelDepth, FadeStrategy, Knob, ShapeParameters, Tunables};
use proptest::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────────

fn shape_strategy() -> impl Strategy<Value = ShapeParameters> {
    (-10.0f64..10.0, -10.0f64..10.0, -10.0f64..10.0, -10.0f64..10.0)
        .prop_map(|(a, b, c, d)| ShapeParameters::new(a, b, c, d))
}

fn depth_strategy() -> impl Strategy<Value = ChannelDepth> {
    prop_oneof![Just(ChannelDepth::Eight), Just(ChannelDepth::Sixteen)]
}

fn strategy_strategy() -> impl Strategy<Value = FadeStrategy> {
    prop_oneof![Just(FadeStrategy::Vectorized), Just(FadeStrategy::Scalar)]
}

fn filled(size: usize, depth: ChannelDepth, values: &[u32]) -> AccumulationBuffer {
    let buffer = AccumulationBuffer::new(size, depth).unwrap();
    for (offset, v) in values.iter().enumerate().take(size * size) {
        buffer.deposit(offset, [*v, v / 2, v / 3]);
    }
    buffer
}

// ═════════════════════════════════════════════════════════════════════════
// 1–2. The map
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn precise_step_stays_in_the_square(
        shape in shape_strategy(),
        x in -2.0f64..=2.0,
        y in -2.0f64..=2.0,
    ) {
        let (x2, y2) = shape.step(x, y);
        prop_assert!(x2.abs() <= 2.0 && y2.abs() <= 2.0);
    }

    #[test]
    fn fast_step_stays_in_the_square(
        shape in shape_strategy(),
        x in -1e3f64..1e3,
        y in -1e3f64..1e3,
    ) {
        let (x2, y2) = step_fast(&shape, x, y);
        prop_assert!(x2.abs() <= 2.0 && y2.abs() <= 2.0);
    }

    #[test]
    fn fast_step_tracks_precise_step(
        shape in shape_strategy(),
        x in -2.0f64..=2.0,
        y in -2.0f64..=2.0,
    ) {
        let (px, py) = shape.step(x, y);
        let (fx, fy) = step_fast(&shape, x, y);
        prop_assert!((px - fx).abs() < 1e-4, "x: {} vs {}", px, fx);
        prop_assert!((py - fy).abs() < 1e-4, "y: {} vs {}", py, fy);
    }

    #[test]
    fn time_derived_shapes_are_bounded(t in 0.0f64..1e4) {
        let s = ShapeParameters::from_time(t);
        for v in [s.a, s.b, s.c, s.d].iter() {
            prop_assert!(v.abs() <= 4.0);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3–5. The texture
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn fade_never_brightens(
        values in proptest::collection::vec(0u32..70_000, 16),
        factor in -0.5f64..1.5,
        depth in depth_strategy(),
        strategy in strategy_strategy(),
    ) {
        let mut buffer = filled(4, depth, &values);
        let before: Vec<[u16; 4]> = (0..16).map(|i| buffer.cell(i % 4, i / 4)).collect();
        buffer.fade(factor, strategy);
        for (i, old) in before.iter().enumerate() {
            let new = buffer.cell(i % 4, i / 4);
            for c in 0..4 {
                prop_assert!(new[c] <= old[c]);
            }
        }
    }

    #[test]
    fn fade_strategies_agree(
        values in proptest::collection::vec(0u32..70_000, 16),
        factor in 0.01f64..0.99,
    ) {
        let mut vector = filled(4, ChannelDepth::Sixteen, &values);
        let mut scalar = filled(4, ChannelDepth::Sixteen, &values);
        vector.fade(factor, FadeStrategy::Vectorized);
        scalar.fade(factor, FadeStrategy::Scalar);
        for i in 0..16 {
            let (v, s) = (vector.cell(i % 4, i / 4), scalar.cell(i % 4, i / 4));
            for c in 0..4 {
                prop_assert!((i32::from(v[c]) - i32::from(s[c])).abs() <= 2);
            }
        }
    }

    #[test]
    fn deposits_saturate(
        adds in proptest::collection::vec((0u32..100_000, 0u32..100_000, 0u32..100_000), 1..20),
        depth in depth_strategy(),
    ) {
        let buffer = AccumulationBuffer::new(2, depth).unwrap();
        let max = SATURATED;
        for (r, g, b) in adds {
            let over = buffer.deposit(3, [r, g, b]);
            let cell = buffer.cell(1, 1);
            prop_assert!(cell.iter().all(|v| *v <= max));
            prop_assert_eq!(over, cell[2] == max);
            prop_assert_eq!(cell[3], 0);
        }
    }

    #[test]
    fn points_land_inside_the_texture(
        size in 1usize..2048,
        x in proptest::num::f64::ANY,
        y in proptest::num::f64::ANY,
    ) {
        let mapper = PlaneMapper::new(size);
        prop_assert!(mapper.point_to_offset(x, y) < size * size);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6–7. Control
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn speed_is_bounded_and_monotone(steps in 1usize..1_000_000, a in 0u64..1_000_000, b in 0u64..1_000_000) {
        let (low, high) = (a.min(b).min(steps as u64), a.max(b).min(steps as u64));
        let slow = speed_multiplier(low, steps);
        let fast = speed_multiplier(high, steps);
        prop_assert!(slow >= 1.0 && fast <= MAX_SPEED);
        prop_assert!(slow <= fast);
    }

    #[test]
    fn knob_writes_stay_in_range(index in 0usize..17, value in proptest::num::f64::ANY) {
        let knob = Knob::ALL[index];
        let mut tunables = Tunables::default();
        tunables.set(knob, value);
        let t = knob.tunable();
        let v = tunables.get(knob);
        prop_assert!(v >= t.min && v <= t.max);
    }
}

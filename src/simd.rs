//! Vectorized kernels: a four-lane approximate sine for the fast
//! evaluation path and a fixed-point multiply-high for the fade pass.
//!
//! On x86_64 both use SSE2, which every x86_64 CPU has.  Elsewhere the
//! same arithmetic runs lane by lane.

/// 4/π
const FOPI: f32 = 1.273_239_5;
// π/4 split in three parts for extended-precision range reduction.
const DP1: f32 = 0.785_156_25;
const DP2: f32 = 2.418_756_5e-4;
const DP3: f32 = 3.774_895e-8;
const SINCOF_P0: f32 = -1.951_529_6e-4;
const SINCOF_P1: f32 = 8.332_161e-3;
const SINCOF_P2: f32 = -1.666_665_5e-1;
const COSCOF_P0: f32 = 2.443_315_7e-5;
const COSCOF_P1: f32 = -1.388_731_6e-3;
const COSCOF_P2: f32 = 4.166_664_6e-2;

/// Approximate sine of four single-precision lanes at once.  Accurate
/// to a few ulp for the argument range the attractor produces (|x| up
/// to about 25); every lane is clamped to [-1, 1], NaN included.
#[inline]
pub fn sin4(v: [f32; 4]) -> [f32; 4] {
    #[cfg(target_arch = "x86_64")]
    {
        sse2::sin4(v)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        [sin_lane(v[0]), sin_lane(v[1]), sin_lane(v[2]), sin_lane(v[3])]
    }
}

/// One lane of `sin4`.  Same range reduction and polynomials.
#[inline]
pub fn sin_lane(x: f32) -> f32 {
    let mut negative = x.is_sign_negative();
    let x = x.abs();
    let j = (((x * FOPI) as i32).wrapping_add(1)) & !1;
    let y = j as f32;
    if j & 4 != 0 {
        negative = !negative;
    }
    let x = ((x - y * DP1) - y * DP2) - y * DP3;
    let z = x * x;
    let r = if j & 2 != 0 {
        ((COSCOF_P0 * z + COSCOF_P1) * z + COSCOF_P2) * z * z - 0.5 * z + 1.0
    } else {
        ((SINCOF_P0 * z + SINCOF_P1) * z + SINCOF_P2) * z * x + x
    };
    let r = if negative { -r } else { r };
    r.max(-1.0).min(1.0)
}

/// Scale a fade factor into the 16-bit fixed-point multiplier used by
/// `mulhi`.  Factors at or above one saturate to 65535.
pub fn fixed_point(factor: f64) -> u16 {
    num::clamp(factor * 65536.0, 0.0, 65535.0) as u16
}

/// High half of a 16x16 -> 32 bit multiply: `v * m / 65536`, rounded down.
#[inline]
pub fn mulhi(v: u16, m: u16) -> u16 {
    ((u32::from(v) * u32::from(m)) >> 16) as u16
}

/// Multiply every channel in place by `m / 65536`.
pub fn fade_mulhi(channels: &mut [u16], m: u16) {
    #[cfg(target_arch = "x86_64")]
    {
        sse2::fade_mulhi(channels, m)
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        for v in channels.iter_mut() {
            *v = mulhi(*v, m);
        }
    }
}

#[cfg(target_arch = "x86_64")]
mod sse2 {
    use super::*;
    use std::arch::x86_64::*;

    pub fn sin4(v: [f32; 4]) -> [f32; 4] {
        let mut out = [0.0_f32; 4];
        // SAFETY: SSE2 is part of the x86_64 baseline; loads and stores
        // are unaligned and stay within the two four-lane arrays.
        unsafe {
            let sign_mask = _mm_set1_ps(-0.0);
            let x = _mm_loadu_ps(v.as_ptr());
            let mut sign_bit = _mm_and_ps(x, sign_mask);
            let x = _mm_andnot_ps(sign_mask, x);

            let mut j = _mm_cvttps_epi32(_mm_mul_ps(x, _mm_set1_ps(FOPI)));
            j = _mm_add_epi32(j, _mm_set1_epi32(1));
            j = _mm_and_si128(j, _mm_set1_epi32(!1));
            let y = _mm_cvtepi32_ps(j);

            let swap = _mm_slli_epi32(_mm_and_si128(j, _mm_set1_epi32(4)), 29);
            sign_bit = _mm_xor_ps(sign_bit, _mm_castsi128_ps(swap));
            let sine_poly = _mm_castsi128_ps(_mm_cmpeq_epi32(
                _mm_and_si128(j, _mm_set1_epi32(2)),
                _mm_setzero_si128(),
            ));

            let mut x = _mm_sub_ps(x, _mm_mul_ps(y, _mm_set1_ps(DP1)));
            x = _mm_sub_ps(x, _mm_mul_ps(y, _mm_set1_ps(DP2)));
            x = _mm_sub_ps(x, _mm_mul_ps(y, _mm_set1_ps(DP3)));
            let z = _mm_mul_ps(x, x);

            let mut c = _mm_mul_ps(_mm_set1_ps(COSCOF_P0), z);
            c = _mm_mul_ps(_mm_add_ps(c, _mm_set1_ps(COSCOF_P1)), z);
            c = _mm_add_ps(c, _mm_set1_ps(COSCOF_P2));
            c = _mm_mul_ps(_mm_mul_ps(c, z), z);
            c = _mm_sub_ps(c, _mm_mul_ps(z, _mm_set1_ps(0.5)));
            c = _mm_add_ps(c, _mm_set1_ps(1.0));

            let mut s = _mm_mul_ps(_mm_set1_ps(SINCOF_P0), z);
            s = _mm_mul_ps(_mm_add_ps(s, _mm_set1_ps(SINCOF_P1)), z);
            s = _mm_add_ps(s, _mm_set1_ps(SINCOF_P2));
            s = _mm_add_ps(_mm_mul_ps(_mm_mul_ps(s, z), x), x);

            let r = _mm_or_ps(_mm_and_ps(sine_poly, s), _mm_andnot_ps(sine_poly, c));
            let r = _mm_xor_ps(r, sign_bit);
            let r = _mm_min_ps(_mm_max_ps(r, _mm_set1_ps(-1.0)), _mm_set1_ps(1.0));
            _mm_storeu_ps(out.as_mut_ptr(), r);
        }
        out
    }

    pub fn fade_mulhi(channels: &mut [u16], m: u16) {
        let mut chunks = channels.chunks_exact_mut(8);
        // SAFETY: SSE2 baseline; every load and store covers exactly the
        // eight channels of one chunk.
        unsafe {
            let mul = _mm_set1_epi16(m as i16);
            for chunk in &mut chunks {
                let ptr = chunk.as_mut_ptr() as *mut __m128i;
                let p = _mm_loadu_si128(ptr);
                _mm_storeu_si128(ptr, _mm_mulhi_epu16(p, mul));
            }
        }
        for v in chunks.into_remainder() {
            *v = mulhi(*v, m);
        }
    }
}

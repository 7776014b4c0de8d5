//! The accumulation buffer: a square texture of RGBA cells whose
//! channels are saturating brightness counters.
//!
//! Workers write into the buffer concurrently and without any
//! coordination.  Every channel is its own `AtomicU16` accessed with
//! `Relaxed` ordering, so a read-modify-write racing with another
//! worker on the same cell may lose an update but can never tear a
//! channel or push it past its maximum.  On the platforms we care
//! about a relaxed 16-bit load or store is an ordinary `mov`.
//!
//! Channels always count at 16-bit resolution and saturate at 65535,
//! whatever depth the display wants.  The depth only matters to
//! `snapshot`, which narrows an 8-bit frame by dropping the low byte,
//! so both depths saturate after the same number of hits.
//!
//! The fade pass runs only while no worker holds the buffer, so it
//! takes `&mut self` and works on plain `u16`s.

use crate::errors::{EngineError, Result};
use crate::planes::PlaneMapper;
use crate::simd;
use std::slice;
use std::sync::atomic::{AtomicU16, Ordering};

/// Channels per cell: red, green, blue and an unused alpha.
pub const CHANNELS: usize = 4;

/// Value at which every channel saturates, whatever the display depth.
pub const SATURATED: u16 = std::u16::MAX;

const RED: usize = 0;
const GREEN: usize = 1;
const BLUE: usize = 2;

/// Width of one colour channel as handed to the display.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelDepth {
    /// 8 bits per channel once narrowed for display.
    Eight,
    /// 16 bits per channel.
    Sixteen,
}

impl ChannelDepth {
    /// Largest channel value in a snapshot of this depth.
    pub fn max(self) -> u16 {
        match self {
            ChannelDepth::Eight => 255,
            ChannelDepth::Sixteen => 65535,
        }
    }

    /// Bits per channel.
    pub fn bits(self) -> u32 {
        match self {
            ChannelDepth::Eight => 8,
            ChannelDepth::Sixteen => 16,
        }
    }
}

/// Which implementation of the fade pass to run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FadeStrategy {
    /// Fixed-point multiply-high over whole vectors of channels.
    Vectorized,
    /// Floating-point multiply per channel.
    Scalar,
}

/// An owned copy of the buffer for the display side.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    /// Four bytes per cell.
    Rgba8 {
        /// Cells per side.
        size: usize,
        /// Row-major RGBA channels.
        pixels: Vec<u8>,
    },
    /// Four 16-bit words per cell.
    Rgba16 {
        /// Cells per side.
        size: usize,
        /// Row-major RGBA channels.
        pixels: Vec<u16>,
    },
}

impl Frame {
    /// Cells per side.
    pub fn size(&self) -> usize {
        match self {
            Frame::Rgba8 { size, .. } | Frame::Rgba16 { size, .. } => *size,
        }
    }
}

/// The shared texture.
#[derive(Debug)]
pub struct AccumulationBuffer {
    mapper: PlaneMapper,
    depth: ChannelDepth,
    channels: Vec<AtomicU16>,
}

impl AccumulationBuffer {
    /// Allocate a zeroed `size` by `size` texture.
    pub fn new(size: usize, depth: ChannelDepth) -> Result<Self> {
        if size == 0 {
            return Err(EngineError::InvalidTextureSize(size));
        }
        let len = size
            .checked_mul(size)
            .and_then(|cells| cells.checked_mul(CHANNELS))
            .ok_or(EngineError::Allocation(std::usize::MAX))?;
        let mut channels = Vec::new();
        channels
            .try_reserve_exact(len)
            .map_err(|_| EngineError::Allocation(len))?;
        channels.extend((0..len).map(|_| AtomicU16::new(0)));
        debug!(size, bits = depth.bits(), "allocated accumulation buffer");
        Ok(AccumulationBuffer {
            mapper: PlaneMapper::new(size),
            depth,
            channels,
        })
    }

    /// Cells per side.
    pub fn size(&self) -> usize {
        self.mapper.size()
    }

    /// Channel width.
    pub fn depth(&self) -> ChannelDepth {
        self.depth
    }

    /// The mapping from attractor coordinates to cells.
    pub fn mapper(&self) -> &PlaneMapper {
        &self.mapper
    }

    /// Read one cell.  Only meaningful between frames.
    pub fn cell(&self, left: usize, top: usize) -> [u16; CHANNELS] {
        let base = (top * self.size() + left) * CHANNELS;
        let mut out = [0; CHANNELS];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.channels[base + i].load(Ordering::Relaxed);
        }
        out
    }

    /// Add a colour contribution to the cell at `offset` (counted in
    /// cells), saturating every channel at `SATURATED`.  Returns true
    /// when the blue channel ends up saturated.
    #[inline]
    pub fn deposit(&self, offset: usize, rgb: [u32; 3]) -> bool {
        let max = u32::from(SATURATED);
        let cell = &self.channels[offset * CHANNELS..offset * CHANNELS + 3];
        let mut blue = 0;
        for (channel, add) in cell.iter().zip(rgb.iter()) {
            let v = u32::from(channel.load(Ordering::Relaxed))
                .saturating_add(*add)
                .min(max);
            channel.store(v as u16, Ordering::Relaxed);
            blue = v;
        }
        blue == max
    }

    /// Plot one step of a trajectory.  The cell is chosen by where the
    /// step lands; red and green grow with how far it moved along each
    /// axis and blue by a constant.  `brightness` is the contribution
    /// of a unit move.  Returns true when the cell's blue saturated.
    #[inline]
    pub fn plot(&self, from: (f64, f64), to: (f64, f64), brightness: f64) -> bool {
        let dr = (brightness * (to.0 - from.0).abs()) as u32;
        let dg = (brightness * (to.1 - from.1).abs()) as u32;
        let db = brightness as u32;
        let offset = self.mapper.point_to_offset(to.0, to.1);
        self.deposit(offset, [dr, dg, db])
    }

    /// Multiply every channel by `factor`.  Factors at or above one
    /// leave the buffer untouched and factors at or below zero clear it.
    pub fn fade(&mut self, factor: f64, strategy: FadeStrategy) {
        if factor >= 1.0 || factor.is_nan() {
            return;
        }
        let channels = self.channels_mut();
        if factor <= 0.0 {
            for v in channels.iter_mut() {
                *v = 0;
            }
            return;
        }
        match strategy {
            FadeStrategy::Vectorized => simd::fade_mulhi(channels, simd::fixed_point(factor)),
            FadeStrategy::Scalar => {
                for cell in channels.chunks_exact_mut(CHANNELS) {
                    cell[RED] = (f64::from(cell[RED]) * factor) as u16;
                    cell[GREEN] = (f64::from(cell[GREEN]) * factor) as u16;
                    cell[BLUE] = (f64::from(cell[BLUE]) * factor) as u16;
                }
            }
        }
    }

    /// Number of cells with any lit channel.
    pub fn lit_cells(&self) -> usize {
        self.channels
            .chunks_exact(CHANNELS)
            .filter(|cell| cell.iter().any(|c| c.load(Ordering::Relaxed) != 0))
            .count()
    }

    /// The brightest channel value anywhere in the texture.
    pub fn peak(&self) -> u16 {
        self.channels
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }

    /// Copy the texture out for display, narrowed to the buffer's depth.
    pub fn snapshot(&self) -> Frame {
        let size = self.size();
        let values = self.channels.iter().map(|c| c.load(Ordering::Relaxed));
        match self.depth {
            ChannelDepth::Eight => Frame::Rgba8 {
                size,
                pixels: values.map(|v| (v >> 8) as u8).collect(),
            },
            ChannelDepth::Sixteen => Frame::Rgba16 {
                size,
                pixels: values.collect(),
            },
        }
    }

    fn channels_mut(&mut self) -> &mut [u16] {
        let len = self.channels.len();
        // SAFETY: AtomicU16 has the same size, alignment and bit validity
        // as u16, and `&mut self` proves nobody else can observe the
        // channels while the plain view is alive.
        unsafe { slice::from_raw_parts_mut(self.channels.as_mut_ptr() as *mut u16, len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffers_are_black() {
        let buffer = AccumulationBuffer::new(16, ChannelDepth::Sixteen).unwrap();
        assert_eq!(buffer.lit_cells(), 0);
        assert_eq!(buffer.peak(), 0);
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(AccumulationBuffer::new(0, ChannelDepth::Eight).is_err());
    }

    #[test]
    fn deposits_saturate_at_full_resolution() {
        for depth in [ChannelDepth::Eight, ChannelDepth::Sixteen].iter() {
            let buffer = AccumulationBuffer::new(4, *depth).unwrap();
            let mut saturated = false;
            for _ in 0..10 {
                saturated = buffer.deposit(5, [40_000, 7, std::u32::MAX]);
            }
            let cell = buffer.cell(1, 1);
            assert_eq!(cell[0], SATURATED);
            assert_eq!(cell[1], 70);
            assert_eq!(cell[2], SATURATED);
            assert_eq!(cell[3], 0);
            assert!(saturated);
        }
    }

    #[test]
    fn deposit_reports_blue_saturation_only() {
        let buffer = AccumulationBuffer::new(4, ChannelDepth::Eight).unwrap();
        assert!(!buffer.deposit(0, [70_000, 70_000, 300]));
        assert!(buffer.deposit(0, [0, 0, 65_300]));
    }

    #[test]
    fn both_depths_saturate_after_the_same_hits() {
        // 1250 is the light of a step at the default brightness.
        let hits = |depth| {
            let buffer = AccumulationBuffer::new(4, depth).unwrap();
            (1..).find(|_| buffer.deposit(0, [0, 0, 1250])).unwrap()
        };
        assert_eq!(hits(ChannelDepth::Eight), 53);
        assert_eq!(hits(ChannelDepth::Sixteen), 53);
    }

    #[test]
    fn faint_light_still_counts_at_eight_bits() {
        // Brightness 0.1 gives 125 per step.
        let buffer = AccumulationBuffer::new(4, ChannelDepth::Eight).unwrap();
        buffer.deposit(0, [0, 0, 125]);
        assert_eq!(buffer.cell(0, 0)[2], 125);
        let saturated_at = (2..).find(|_| buffer.deposit(0, [0, 0, 125])).unwrap();
        assert_eq!(saturated_at, 525);
    }

    #[test]
    fn plot_scales_red_and_green_by_movement() {
        let buffer = AccumulationBuffer::new(144, ChannelDepth::Sixteen).unwrap();
        buffer.plot((0.0, 0.0), (0.5, -0.25), 1000.0);
        let pixel = buffer.mapper().point_to_pixel(0.5, -0.25);
        assert_eq!(buffer.cell(pixel.0, pixel.1), [500, 250, 1000, 0]);
    }

    #[test]
    fn both_fades_never_brighten_and_agree() {
        let mut vector = AccumulationBuffer::new(8, ChannelDepth::Sixteen).unwrap();
        let mut scalar = AccumulationBuffer::new(8, ChannelDepth::Sixteen).unwrap();
        for i in 0..64 {
            let add = [(i * 1000) as u32, (i * 17) as u32, 65535];
            vector.deposit(i, add);
            scalar.deposit(i, add);
        }
        let before = vector.snapshot();
        vector.fade(0.9, FadeStrategy::Vectorized);
        scalar.fade(0.9, FadeStrategy::Scalar);
        match (before, vector.snapshot(), scalar.snapshot()) {
            (
                Frame::Rgba16 { pixels: old, .. },
                Frame::Rgba16 { pixels: v, .. },
                Frame::Rgba16 { pixels: s, .. },
            ) => {
                for i in 0..old.len() {
                    assert!(v[i] <= old[i]);
                    assert!(s[i] <= old[i]);
                    // One fixed-point step of difference at most.
                    assert!((i32::from(v[i]) - i32::from(s[i])).abs() <= 2);
                }
            }
            _ => panic!("depth changed"),
        }
    }

    #[test]
    fn fade_converges_to_black() {
        let mut buffer = AccumulationBuffer::new(4, ChannelDepth::Sixteen).unwrap();
        buffer.deposit(3, [65535, 65535, 65535]);
        for _ in 0..400 {
            buffer.fade(0.95, FadeStrategy::Vectorized);
        }
        assert_eq!(buffer.peak(), 0);
    }

    #[test]
    fn unit_fade_is_identity() {
        let mut buffer = AccumulationBuffer::new(4, ChannelDepth::Sixteen).unwrap();
        buffer.deposit(3, [9, 99, 999]);
        buffer.fade(1.0, FadeStrategy::Vectorized);
        buffer.fade(1.0, FadeStrategy::Scalar);
        assert_eq!(buffer.cell(3, 0), [9, 99, 999, 0]);
    }

    #[test]
    fn concurrent_deposits_stay_in_range() {
        let buffer = AccumulationBuffer::new(8, ChannelDepth::Eight).unwrap();
        crossbeam::scope(|spawner| {
            for t in 0..4 {
                let buffer = &buffer;
                spawner.spawn(move |_| {
                    for i in 0..10_000 {
                        buffer.deposit((i + t) % 64, [300, 500, 700]);
                    }
                });
            }
        })
        .unwrap();
        // Lost updates are fine; a cell that was hit holds at least one hit.
        for offset in 0..64 {
            assert!(buffer.cell(offset % 8, offset / 8)[2] >= 700);
        }
    }

    #[test]
    fn eight_bit_snapshot_is_bytes() {
        let buffer = AccumulationBuffer::new(2, ChannelDepth::Eight).unwrap();
        buffer.deposit(1, [255, 512, 65_535]);
        assert_eq!(
            buffer.snapshot(),
            Frame::Rgba8 {
                size: 2,
                pixels: vec![0, 0, 0, 0, 0, 2, 255, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            }
        );
    }
}

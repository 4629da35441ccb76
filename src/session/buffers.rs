//! Render buffers.
//!
//! Every enabled pass accumulates the per-sample values of its pixels; reads
//! divide by the number of samples taken so far.

use glam::{Vec3, Vec4};

use super::tiles::Tile;
use crate::error::{HostError, HostResult};

/// Render pass. Discriminants are the boundary values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum PassType {
    Combined = 1,
    Depth = 2,
    Normal = 3,
    ObjectId = 4,
    DiffuseColor = 5,
}

impl PassType {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Combined),
            2 => Some(Self::Depth),
            3 => Some(Self::Normal),
            4 => Some(Self::ObjectId),
            5 => Some(Self::DiffuseColor),
            _ => None,
        }
    }

    /// Floats per pixel.
    pub fn channels(self) -> usize {
        match self {
            Self::Combined => 4,
            Self::Normal | Self::DiffuseColor => 3,
            Self::Depth | Self::ObjectId => 1,
        }
    }

    fn write(self, sample: &PixelSample, out: &mut [f32]) {
        match self {
            Self::Combined => out.copy_from_slice(&sample.color.to_array()),
            Self::Depth => out[0] = sample.depth,
            Self::Normal => out.copy_from_slice(&sample.normal.to_array()),
            Self::ObjectId => out[0] = sample.object_id,
            Self::DiffuseColor => out.copy_from_slice(&sample.albedo.to_array()),
        }
    }
}

/// One sample of one pixel, as produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    /// Radiance and alpha.
    pub color: Vec4,
    /// Distance along the primary ray, `f32::MAX` on a miss.
    pub depth: f32,
    pub normal: Vec3,
    pub object_id: f32,
    pub albedo: Vec3,
}

impl Default for PixelSample {
    fn default() -> Self {
        Self {
            color: Vec4::ZERO,
            depth: f32::MAX,
            normal: Vec3::ZERO,
            object_id: 0.0,
            albedo: Vec3::ZERO,
        }
    }
}

/// Region of the full image covered by the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferParams {
    pub width: u32,
    pub height: u32,
    pub full_x: u32,
    pub full_y: u32,
    pub full_width: u32,
    pub full_height: u32,
}

impl BufferParams {
    /// Buffers covering a whole `width` x `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            full_x: 0,
            full_y: 0,
            full_width: width,
            full_height: height,
        }
    }

    pub fn validate(&self) -> HostResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HostError::argument(format!(
                "buffer size {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.full_x + self.width > self.full_width || self.full_y + self.height > self.full_height
        {
            return Err(HostError::argument(format!(
                "region {}x{}+{}+{} exceeds the {}x{} image",
                self.width, self.height, self.full_x, self.full_y, self.full_width, self.full_height
            )));
        }
        Ok(())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Size description returned by [`RenderBuffers::info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    /// Floats in the combined pass.
    pub size: usize,
    /// Floats per pixel of the combined pass.
    pub stride: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct PassBuffer {
    pass: PassType,
    sums: Vec<f32>,
}

/// Accumulation buffers of one session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBuffers {
    params: BufferParams,
    passes: Vec<PassBuffer>,
    samples: u32,
}

impl RenderBuffers {
    /// Allocates zeroed buffers for `passes`. The combined pass is always
    /// present.
    pub fn new(params: BufferParams, passes: &[PassType]) -> HostResult<Self> {
        params.validate()?;
        let mut buffers = Self {
            params,
            passes: Vec::new(),
            samples: 0,
        };
        for &pass in std::iter::once(&PassType::Combined).chain(passes) {
            if !buffers.passes.iter().any(|p| p.pass == pass) {
                buffers.passes.push(PassBuffer {
                    pass,
                    sums: vec![0.0; params.pixel_count() * pass.channels()],
                });
            }
        }
        Ok(buffers)
    }

    pub fn params(&self) -> &BufferParams {
        &self.params
    }

    pub fn passes(&self) -> impl Iterator<Item = PassType> + '_ {
        self.passes.iter().map(|p| p.pass)
    }

    /// Samples accumulated so far.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Zeroes every pass.
    pub fn clear(&mut self) {
        for pass in &mut self.passes {
            pass.sums.fill(0.0);
        }
        self.samples = 0;
    }

    /// Adds one sample of `tile`, given row-major within the tile.
    pub fn accumulate(&mut self, tile: &Tile, pixels: &[PixelSample]) -> HostResult<()> {
        if pixels.len() != tile.pixel_count() {
            return Err(HostError::argument(format!(
                "tile {} has {} pixels, got {}",
                tile.index,
                tile.pixel_count(),
                pixels.len()
            )));
        }
        if tile.x + tile.w > self.params.width || tile.y + tile.h > self.params.height {
            return Err(HostError::argument(format!(
                "tile {} lies outside the buffer",
                tile.index
            )));
        }
        let width = self.params.width as usize;
        let mut scratch = [0.0f32; 4];
        for pass in &mut self.passes {
            let channels = pass.pass.channels();
            for (i, sample) in pixels.iter().enumerate() {
                let x = tile.x as usize + i % tile.w as usize;
                let y = tile.y as usize + i / tile.w as usize;
                let at = (y * width + x) * channels;
                let value = &mut scratch[..channels];
                pass.pass.write(sample, value);
                for (sum, v) in pass.sums[at..at + channels].iter_mut().zip(value.iter()) {
                    *sum += v;
                }
            }
        }
        Ok(())
    }

    /// Marks one full sample as accumulated.
    pub fn finish_sample(&mut self) {
        self.samples += 1;
    }

    /// Averaged pixels of `pass` for the whole buffer.
    pub fn pass_pixels(&self, pass: PassType) -> Option<Vec<f32>> {
        let buffer = self.passes.iter().find(|p| p.pass == pass)?;
        let scale = 1.0 / self.samples.max(1) as f32;
        Some(buffer.sums.iter().map(|v| v * scale).collect())
    }

    /// Averaged pixels of `pass` inside `tile`, row-major within the tile.
    /// `samples` is the number of samples the tile has accumulated.
    pub fn tile_pixels(&self, pass: PassType, tile: &Tile, samples: u32) -> Option<Vec<f32>> {
        let buffer = self.passes.iter().find(|p| p.pass == pass)?;
        let channels = pass.channels();
        let width = self.params.width as usize;
        let scale = 1.0 / samples.max(1) as f32;
        let mut out = Vec::with_capacity(tile.pixel_count() * channels);
        for y in tile.y as usize..(tile.y + tile.h) as usize {
            let start = (y * width + tile.x as usize) * channels;
            let end = start + tile.w as usize * channels;
            out.extend(buffer.sums.get(start..end)?.iter().map(|v| v * scale));
        }
        Some(out)
    }

    pub fn info(&self) -> BufferInfo {
        let stride = PassType::Combined.channels();
        BufferInfo {
            size: self.params.pixel_count() * stride,
            stride,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(color: f32) -> PixelSample {
        PixelSample {
            color: Vec4::new(color, color, color, 1.0),
            depth: 2.0,
            ..PixelSample::default()
        }
    }

    #[test]
    fn test_accumulate_and_average() {
        let mut buffers =
            RenderBuffers::new(BufferParams::full(2, 2), &[PassType::Depth]).unwrap();
        let tile = Tile { index: 0, x: 0, y: 0, w: 2, h: 2 };

        buffers.accumulate(&tile, &[sample(1.0); 4]).unwrap();
        buffers.finish_sample();
        buffers.accumulate(&tile, &[sample(0.0); 4]).unwrap();
        buffers.finish_sample();

        let combined = buffers.pass_pixels(PassType::Combined).unwrap();
        assert_eq!(combined.len(), 16);
        assert_eq!(&combined[..4], &[0.5, 0.5, 0.5, 1.0]);
        assert_eq!(buffers.pass_pixels(PassType::Depth).unwrap(), vec![2.0; 4]);
        assert!(buffers.pass_pixels(PassType::Normal).is_none());
    }

    #[test]
    fn test_tile_pixels_are_tile_local() {
        let mut buffers = RenderBuffers::new(BufferParams::full(4, 2), &[]).unwrap();
        let right = Tile { index: 1, x: 2, y: 0, w: 2, h: 2 };
        buffers.accumulate(&right, &[sample(1.0); 4]).unwrap();

        let pixels = buffers.tile_pixels(PassType::Combined, &right, 1).unwrap();
        assert_eq!(pixels, [1.0, 1.0, 1.0, 1.0].repeat(4));
        let left = Tile { index: 0, x: 0, y: 0, w: 2, h: 2 };
        assert_eq!(buffers.tile_pixels(PassType::Combined, &left, 1).unwrap(), vec![0.0; 16]);
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(RenderBuffers::new(BufferParams::full(0, 4), &[]).is_err());
        let params = BufferParams {
            full_x: 3,
            ..BufferParams::full(4, 4)
        };
        assert!(params.validate().is_err());

        let mut buffers = RenderBuffers::new(BufferParams::full(2, 2), &[]).unwrap();
        let tile = Tile { index: 0, x: 0, y: 0, w: 2, h: 2 };
        assert!(buffers.accumulate(&tile, &[sample(1.0); 3]).is_err());
    }

    #[test]
    fn test_info() {
        let buffers = RenderBuffers::new(BufferParams::full(8, 4), &[]).unwrap();
        assert_eq!(buffers.info(), BufferInfo { size: 128, stride: 4 });
    }
}

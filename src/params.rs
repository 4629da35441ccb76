//! Scene and session parameter blocks.
//!
//! Params are templates: a block is read when a scene or session is created
//! from it and never mutated by the engine. One block may seed any number of
//! scenes or sessions. The host stores each block behind a
//! `parking_lot::RwLock` so its setters can be called between creations.

use std::path::PathBuf;
use std::time::Duration;

/// Shading backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ShadingSystem {
    #[default]
    Svm = 0,
    Osl = 1,
}

impl ShadingSystem {
    /// Converts a boundary integer, falling back to SVM.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Osl,
            _ => Self::Svm,
        }
    }
}

/// BVH rebuild policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BvhType {
    #[default]
    Dynamic = 0,
    Static = 1,
}

impl BvhType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Static,
            _ => Self::Dynamic,
        }
    }
}

/// BVH node layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum BvhLayout {
    None = 0,
    Bvh2 = 1,
    Bvh4 = 2,
    #[default]
    Default = -1,
}

impl BvhLayout {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::Bvh2,
            2 => Self::Bvh4,
            _ => Self::Default,
        }
    }
}

/// Configuration blueprint for a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneParams {
    pub shading_system: ShadingSystem,
    pub bvh_type: BvhType,
    pub use_bvh_spatial_split: bool,
    pub bvh_layout: BvhLayout,
    pub use_qbvh: bool,
    pub persistent_data: bool,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            shading_system: ShadingSystem::Svm,
            bvh_type: BvhType::Dynamic,
            use_bvh_spatial_split: false,
            bvh_layout: BvhLayout::Default,
            use_qbvh: true,
            persistent_data: false,
        }
    }
}

impl SceneParams {
    #[must_use]
    pub fn with_shading_system(mut self, system: ShadingSystem) -> Self {
        self.shading_system = system;
        self
    }

    #[must_use]
    pub fn with_bvh_type(mut self, bvh_type: BvhType) -> Self {
        self.bvh_type = bvh_type;
        self
    }

    #[must_use]
    pub fn with_bvh_spatial_split(mut self, use_split: bool) -> Self {
        self.use_bvh_spatial_split = use_split;
        self
    }

    #[must_use]
    pub fn with_bvh_layout(mut self, layout: BvhLayout) -> Self {
        self.bvh_layout = layout;
        self
    }

    #[must_use]
    pub fn with_persistent_data(mut self, persistent: bool) -> Self {
        self.persistent_data = persistent;
        self
    }
}

/// Order in which tiles are handed out within a sample pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TileOrder {
    #[default]
    Center = 0,
    RightToLeft = 1,
    LeftToRight = 2,
    TopToBottom = 3,
    BottomToTop = 4,
    HilbertSpiral = 5,
}

impl TileOrder {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::RightToLeft,
            2 => Self::LeftToRight,
            3 => Self::TopToBottom,
            4 => Self::BottomToTop,
            5 => Self::HilbertSpiral,
            _ => Self::Center,
        }
    }
}

/// Configuration blueprint for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    /// Device ID (plain or multi) to render on.
    pub device: u32,
    /// Render without a display buffer.
    pub background: bool,
    pub progressive_refine: bool,
    pub output_path: PathBuf,
    pub progressive: bool,
    pub experimental: bool,
    /// Sample budget.
    pub samples: u32,
    /// Tile width and height in pixels.
    pub tile_size: (u32, u32),
    pub tile_order: TileOrder,
    /// Resolution of the first progressive pass, `None` for full resolution.
    pub start_resolution: Option<u32>,
    /// Worker threads, 0 for automatic.
    pub threads: u32,
    pub display_buffer_linear: bool,
    pub skip_linear_to_srgb_conversion: bool,
    /// Interval at which the background loop re-checks the cancel flag.
    pub cancel_timeout: Duration,
    /// Interval at which the background loop re-checks for a reset.
    pub reset_timeout: Duration,
    pub text_timeout: Duration,
    pub shading_system: ShadingSystem,
    pub pixel_size: u32,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            device: 0,
            background: true,
            progressive_refine: false,
            output_path: PathBuf::new(),
            progressive: false,
            experimental: false,
            samples: 1,
            tile_size: (64, 64),
            tile_order: TileOrder::Center,
            start_resolution: None,
            threads: 0,
            display_buffer_linear: false,
            skip_linear_to_srgb_conversion: false,
            cancel_timeout: Duration::from_millis(100),
            reset_timeout: Duration::from_millis(100),
            text_timeout: Duration::from_secs(1),
            shading_system: ShadingSystem::Svm,
            pixel_size: 1,
        }
    }
}

impl SessionParams {
    /// Default params rendering on `device`.
    pub fn for_device(device: u32) -> Self {
        Self {
            device,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    /// Sets the tile size. Zero dimensions are clamped to one pixel.
    #[must_use]
    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_size = (width.max(1), height.max(1));
        self
    }

    #[must_use]
    pub fn with_tile_order(mut self, order: TileOrder) -> Self {
        self.tile_order = order;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    #[must_use]
    pub fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    #[must_use]
    pub fn with_pixel_size(mut self, pixel_size: u32) -> Self {
        self.pixel_size = pixel_size.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_params_builders() {
        let params = SceneParams::default()
            .with_bvh_type(BvhType::Static)
            .with_bvh_layout(BvhLayout::from_raw(2))
            .with_persistent_data(true);
        assert_eq!(params.bvh_type, BvhType::Static);
        assert_eq!(params.bvh_layout, BvhLayout::Bvh4);
        assert!(params.persistent_data);
        assert_eq!(params.shading_system, ShadingSystem::Svm);
    }

    #[test]
    fn test_session_params_tile_size_clamps() {
        let params = SessionParams::for_device(2).with_tile_size(0, 32);
        assert_eq!(params.device, 2);
        assert_eq!(params.tile_size, (1, 32));
    }

    #[test]
    fn test_raw_enum_fallbacks() {
        assert_eq!(ShadingSystem::from_raw(9), ShadingSystem::Svm);
        assert_eq!(TileOrder::from_raw(5), TileOrder::HilbertSpiral);
        assert_eq!(TileOrder::from_raw(99), TileOrder::Center);
    }
}

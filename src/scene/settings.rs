//! Integrator, film and background settings.

use super::object::RayVisibility;
use crate::handle::ShaderId;

/// Low-discrepancy sequence used for sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SamplingPattern {
    #[default]
    Sobol = 0,
    CorrelatedMultiJitter = 1,
}

impl SamplingPattern {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Sobol),
            1 => Some(Self::CorrelatedMultiJitter),
            _ => None,
        }
    }
}

/// Path tracing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum IntegratorMethod {
    BranchedPath = 0,
    #[default]
    Path = 1,
}

impl IntegratorMethod {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::BranchedPath),
            1 => Some(Self::Path),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Integrator {
    pub min_bounce: i32,
    pub max_bounce: i32,
    pub max_diffuse_bounce: i32,
    pub max_glossy_bounce: i32,
    pub max_transmission_bounce: i32,
    pub max_volume_bounce: i32,
    pub transparent_min_bounce: i32,
    pub transparent_max_bounce: i32,
    pub no_caustics: bool,
    pub no_shadows: bool,
    pub caustics_reflective: bool,
    pub caustics_refractive: bool,
    pub aa_samples: i32,
    pub diffuse_samples: i32,
    pub glossy_samples: i32,
    pub transmission_samples: i32,
    pub ao_samples: i32,
    pub mesh_light_samples: i32,
    pub subsurface_samples: i32,
    pub volume_samples: i32,
    pub filter_glossy: f32,
    pub method: IntegratorMethod,
    pub sample_all_lights_direct: bool,
    pub sample_all_lights_indirect: bool,
    pub volume_step_size: f32,
    pub volume_max_steps: i32,
    pub seed: i32,
    pub sampling_pattern: SamplingPattern,
    pub sample_clamp_direct: f32,
    pub sample_clamp_indirect: f32,
    pub light_sampling_threshold: f32,
    pub(crate) dirty: bool,
}

impl Default for Integrator {
    fn default() -> Self {
        Self {
            min_bounce: 2,
            max_bounce: 7,
            max_diffuse_bounce: 7,
            max_glossy_bounce: 7,
            max_transmission_bounce: 7,
            max_volume_bounce: 7,
            transparent_min_bounce: 2,
            transparent_max_bounce: 7,
            no_caustics: false,
            no_shadows: false,
            caustics_reflective: true,
            caustics_refractive: true,
            aa_samples: 0,
            diffuse_samples: 1,
            glossy_samples: 1,
            transmission_samples: 1,
            ao_samples: 1,
            mesh_light_samples: 1,
            subsurface_samples: 1,
            volume_samples: 1,
            filter_glossy: 0.0,
            method: IntegratorMethod::Path,
            sample_all_lights_direct: true,
            sample_all_lights_indirect: true,
            volume_step_size: 0.1,
            volume_max_steps: 1024,
            seed: 0,
            sampling_pattern: SamplingPattern::Sobol,
            sample_clamp_direct: 0.0,
            sample_clamp_indirect: 0.0,
            light_sampling_threshold: 0.05,
            dirty: true,
        }
    }
}

impl Integrator {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}

/// Pixel reconstruction filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FilterType {
    Box = 0,
    Gaussian = 1,
    #[default]
    BlackmanHarris = 2,
}

impl FilterType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Box),
            1 => Some(Self::Gaussian),
            2 => Some(Self::BlackmanHarris),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Film {
    pub exposure: f32,
    pub filter_type: FilterType,
    pub filter_width: f32,
    pub use_sample_clamp: bool,
    pub(crate) dirty: bool,
}

impl Default for Film {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            filter_type: FilterType::BlackmanHarris,
            filter_width: 1.5,
            use_sample_clamp: false,
            dirty: true,
        }
    }
}

impl Film {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Background {
    /// World shader. `None` renders black.
    pub shader: Option<ShaderId>,
    pub transparent: bool,
    pub ao_factor: f32,
    pub ao_distance: f32,
    pub visibility: RayVisibility,
    pub(crate) dirty: bool,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            shader: None,
            transparent: false,
            ao_factor: 0.0,
            ao_distance: f32::MAX,
            visibility: RayVisibility::all(),
            dirty: true,
        }
    }
}

impl Background {
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn tag_update(&mut self) {
        self.dirty = true;
    }
}

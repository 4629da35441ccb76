//! Render Host - a multi-client front end for an offline path tracer
//!
//! Several independent clients share one render engine through opaque,
//! generation-checked handles:
//! - **Scenes** are built through a scene graph builder and guarded by a
//!   per-scene lock shared with the render worker
//! - **Sessions** drive progressive sampling through an explicit state
//!   machine, stepped by the client or by a background worker
//! - **Callbacks** are delivered on the client's thread from a worker
//!   event channel
//!
//! # Example
//! ```
//! use render_host::{HostConfig, RenderHost, SampleStatus, SceneParams, SessionParams};
//!
//! let host = RenderHost::preview(HostConfig::default());
//! let client = host.new_client();
//! let scene_params = host.scene_params_create(client, SceneParams::default()).unwrap();
//! let scene = host.scene_create(client, scene_params).unwrap();
//! host.camera_set_size(client, scene, 8, 8).unwrap();
//!
//! let params = host
//!     .session_params_create(client, SessionParams::default().with_samples(2))
//!     .unwrap();
//! let session = host.session_create(client, params).unwrap();
//! host.session_set_scene(client, session, scene).unwrap();
//! host.session_prepare_run(client, session).unwrap();
//! while host.session_sample(client, session).unwrap() == SampleStatus::Continue {}
//! host.session_end_run(client, session).unwrap();
//!
//! assert_eq!(host.session_copy_buffer(client, session).unwrap().len(), 8 * 8 * 4);
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod handle;
pub mod host;
pub mod lock;
pub mod logging;
pub mod params;
pub mod scene;
pub mod session;
pub mod shader;
pub mod strings;

pub use callback::{CallbackKinds, SessionEvent, TileView};
pub use config::{DebugFlags, HostConfig};
pub use device::{DeviceCapabilities, DeviceInfo, DeviceKind, DeviceMask};
pub use engine::{PreviewEngine, RenderEngine};
pub use error::{EngineError, HostError, HostResult, Sentinel};
pub use handle::{
    ClientId, HandleKind, LightId, MeshId, ObjectId, RawHandle, SceneId, SceneParamsId,
    SessionId, SessionParamsId, ShaderId,
};
pub use host::RenderHost;
#[cfg(not(target_arch = "wasm32"))]
pub use logging::init_logging;
pub use logging::LoggerSink;
pub use params::{SceneParams, SessionParams, TileOrder};
pub use scene::Scene;
pub use session::{BufferInfo, BufferParams, PassType, SampleStatus, SessionState};
pub use shader::ShaderNodeKind;
pub use strings::StringHolder;

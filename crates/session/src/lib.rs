//! EFV Session
//!
//! The capture session of the eyes-free videography extension. It sits
//! between the camera framework's request channel and the client: it keeps
//! the persistent capture parameters, issues sequenced requests, derives
//! the extension result metadata for every completed capture, and relays
//! preview frames from an internal image source to the client's surface.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    ExtensionSession                        │
//! │  ┌────────────────┐   snapshot   ┌──────────────────────┐  │
//! │  │ ParameterStore │─────────────▶│   CaptureSequencer   │──┼──▶ RequestProcessor
//! │  └────────────────┘              │  SequenceForwarder ◀─┼──┼─── request events
//! │                                  │  ResultSynthesizer   │──┼──▶ CaptureCallback
//! │                                  └──────────────────────┘  │
//! │  ┌─────────────┐  on_image_available  ┌────────────────┐   │
//! │  │ ImageSource │─────────────────────▶│   FrameRelay   │───┼──▶ OutputWriter
//! │  └─────────────┘    (single slot)     └────────────────┘   │
//! └───────────────────────────────────────────────────────────┘
//! ```

pub mod callback;
pub mod extender;
pub mod loopback;
pub mod params;
pub mod processor;
pub mod relay;
pub mod sequencer;
pub mod session;
pub mod surface;
pub mod synthesizer;

pub use callback::{CaptureCallback, CaptureEvent, SequenceId};
pub use extender::{select_extender, AdvancedExtender, CameraCharacteristics, ExtenderKind};
pub use params::ParameterStore;
pub use processor::{FailureReason, Request, RequestKind, RequestProcessor};
pub use relay::{FrameRelay, RelayStats};
pub use sequencer::{raw_sequence_id, CaptureSequencer, REJECTED_SEQUENCE_ID};
pub use session::*;
pub use surface::{OutputSurfaceConfig, SurfaceProvider};
pub use synthesizer::ResultSynthesizer;

//! Extension session lifecycle.
//!
//! ```text
//! Uninitialized ──init_session──▶ Configuring ──on_capture_session_start──▶ Active
//!                                                                            │
//!             Deinitialized ◀──deinit_session── Ending ◀──on_capture_session_end
//! ```
//!
//! `deinit_session` is also accepted from `Active` and is idempotent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use efv_common::config::SessionDefaults;
use efv_common::error::{EfvError, EfvResult};
use efv_metadata::{CaptureRequest, ExtensionCapabilities};
use serde::{Deserialize, Serialize};

use crate::callback::{CaptureCallback, SequenceId};
use crate::params::ParameterStore;
use crate::processor::{OutputId, RequestProcessor, CAPTURE_OUTPUT_ID, PREVIEW_OUTPUT_ID};
use crate::relay::{FrameRelay, RelayStats};
use crate::sequencer::CaptureSequencer;
use crate::surface::{ImageSource, OutputSurfaceConfig, SharedWriter, SurfaceProvider};

/// Session type reported to the capture stack.
pub const SESSION_TYPE_REGULAR: i32 = 0;

/// State of an extension session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, outputs not yet described.
    Uninitialized,
    /// Outputs allocated, waiting for the request channel.
    Configuring,
    /// Request channel bound, captures allowed.
    Active,
    /// Session end signaled, late events suppressed.
    Ending,
    /// All resources released.
    Deinitialized,
}

/// Resource settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the internal image source and the output writer.
    pub max_images: usize,

    /// Name of the frame relay worker thread.
    pub relay_thread_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionDefaults::default())
    }
}

impl From<&SessionDefaults> for SessionConfig {
    fn from(defaults: &SessionDefaults) -> Self {
        Self {
            max_images: defaults.max_images.max(1),
            relay_thread_name: defaults.relay_thread_name.clone(),
        }
    }
}

/// One output stream the capture stack should bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionOutputConfiguration {
    pub output_id: OutputId,
    pub surfaces: Vec<OutputSurfaceConfig>,
}

/// Output description returned by [`ExtensionSession::init_session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionConfiguration {
    pub session_type: i32,
    pub outputs: Vec<ExtensionOutputConfiguration>,
}

impl ExtensionConfiguration {
    pub fn output(&self, output_id: OutputId) -> Option<&ExtensionOutputConfiguration> {
        self.outputs.iter().find(|o| o.output_id == output_id)
    }
}

/// An eyes-free videography capture session.
pub struct ExtensionSession {
    capabilities: Arc<ExtensionCapabilities>,
    provider: Arc<dyn SurfaceProvider>,
    config: SessionConfig,
    state: SessionState,
    camera_id: Option<String>,
    params: Arc<ParameterStore>,
    end_flag: Arc<AtomicBool>,
    preview_target: Option<OutputSurfaceConfig>,
    capture_target: Option<OutputSurfaceConfig>,
    image_source: Option<Arc<dyn ImageSource>>,
    writer: SharedWriter,
    relay: Option<Arc<FrameRelay>>,
    sequencer: Option<CaptureSequencer>,
    final_relay_stats: RelayStats,
}

impl ExtensionSession {
    pub fn new(
        capabilities: Arc<ExtensionCapabilities>,
        provider: Arc<dyn SurfaceProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            params: Arc::new(ParameterStore::new(Arc::clone(&capabilities))),
            capabilities,
            provider,
            config,
            state: SessionState::Uninitialized,
            camera_id: None,
            end_flag: Arc::new(AtomicBool::new(false)),
            preview_target: None,
            capture_target: None,
            image_source: None,
            writer: SharedWriter::default(),
            relay: None,
            sequencer: None,
            final_relay_stats: RelayStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn capabilities(&self) -> &ExtensionCapabilities {
        &self.capabilities
    }

    /// Describe the outputs to bind and allocate the internal preview source.
    ///
    /// The preview output is redirected to an internal image source so frames
    /// pass through the relay before reaching `preview`.
    pub fn init_session(
        &mut self,
        camera_id: &str,
        preview: OutputSurfaceConfig,
        capture: OutputSurfaceConfig,
    ) -> EfvResult<ExtensionConfiguration> {
        self.expect_state("init_session", &[SessionState::Uninitialized])?;
        tracing::info!(camera_id, "Initializing extension session");

        let mut outputs = Vec::new();

        if capture.is_present() {
            outputs.push(ExtensionOutputConfiguration {
                output_id: CAPTURE_OUTPUT_ID,
                surfaces: vec![capture],
            });
            self.capture_target = Some(capture);
        }

        if preview.is_present() {
            let source = self.provider.create_image_source(
                preview.size,
                preview.format,
                self.config.max_images,
                preview.usage,
            )?;
            tracing::debug!(
                surface = source.surface_id(),
                size = %preview.size,
                format = ?preview.format,
                "Allocated internal preview source"
            );
            outputs.push(ExtensionOutputConfiguration {
                output_id: PREVIEW_OUTPUT_ID,
                surfaces: vec![OutputSurfaceConfig::new(
                    source.surface_id(),
                    preview.size,
                    preview.format,
                )],
            });
            self.image_source = Some(source);
            self.preview_target = Some(preview);
        }

        self.camera_id = Some(camera_id.to_string());
        self.state = SessionState::Configuring;

        Ok(ExtensionConfiguration {
            session_type: SESSION_TYPE_REGULAR,
            outputs,
        })
    }

    /// Bind the request channel and start relaying preview frames.
    pub fn on_capture_session_start(
        &mut self,
        processor: Arc<dyn RequestProcessor>,
    ) -> EfvResult<()> {
        self.expect_state("on_capture_session_start", &[SessionState::Configuring])?;

        if let (Some(target), Some(source)) = (self.preview_target, self.image_source.as_ref()) {
            if let Some(surface) = target.surface {
                let writer =
                    self.provider
                        .open_writer(surface, target.format, self.config.max_images)?;
                self.writer.install(writer);

                let relay = Arc::new(FrameRelay::start(
                    self.writer.clone(),
                    &self.config.relay_thread_name,
                )?);
                source.set_listener(Some(relay.clone()));
                self.relay = Some(relay);
            }
        }

        self.sequencer = Some(CaptureSequencer::new(
            processor,
            Arc::clone(&self.params),
            Arc::clone(&self.capabilities),
            Arc::clone(&self.end_flag),
        ));
        self.state = SessionState::Active;
        tracing::info!(preview = self.relay.is_some(), "Capture session started");
        Ok(())
    }

    /// Signal session end, abort outstanding requests and release the
    /// request channel.
    pub fn on_capture_session_end(&mut self) -> EfvResult<()> {
        self.expect_state("on_capture_session_end", &[SessionState::Active])?;
        self.end_capture();
        self.state = SessionState::Ending;
        tracing::info!("Capture session ending");
        Ok(())
    }

    /// Release every resource. Safe to call in any state and more than once.
    pub fn deinit_session(&mut self) {
        if self.state == SessionState::Deinitialized {
            return;
        }

        if self.sequencer.is_some() {
            self.end_capture();
        }

        if let Some(source) = self.image_source.take() {
            source.set_listener(None);
            source.close();
        }

        if let Some(relay) = self.relay.take() {
            relay.shutdown();
            self.final_relay_stats = relay.stats();
        }

        self.writer.release();
        self.params.clear();
        self.state = SessionState::Deinitialized;

        tracing::info!(
            forwarded = self.final_relay_stats.forwarded,
            dropped = self.final_relay_stats.dropped,
            failed = self.final_relay_stats.failed,
            "Extension session deinitialized"
        );
    }

    /// Merge supported parameters into the store. Returns how many applied.
    pub fn set_parameters(&self, request: &CaptureRequest) -> EfvResult<usize> {
        self.expect_state(
            "set_parameters",
            &[SessionState::Configuring, SessionState::Active],
        )?;
        Ok(self.params.set(request))
    }

    pub fn start_repeating(&self, callback: Arc<dyn CaptureCallback>) -> EfvResult<SequenceId> {
        self.active_sequencer("start_repeating")?
            .start_repeating(callback)
    }

    pub fn start_multi_frame_capture(
        &self,
        callback: Arc<dyn CaptureCallback>,
    ) -> EfvResult<SequenceId> {
        self.active_sequencer("start_multi_frame_capture")?
            .start_multi_frame_capture(callback)
    }

    pub fn start_trigger(
        &self,
        request: &CaptureRequest,
        callback: Arc<dyn CaptureCallback>,
    ) -> EfvResult<SequenceId> {
        self.active_sequencer("start_trigger")?
            .start_trigger(request, callback)
    }

    pub fn stop_repeating(&self) -> EfvResult<()> {
        self.active_sequencer("stop_repeating")?.stop_repeating();
        Ok(())
    }

    /// Relay counters; the final values once the session is deinitialized.
    pub fn relay_stats(&self) -> RelayStats {
        self.relay
            .as_ref()
            .map(|relay| relay.stats())
            .unwrap_or(self.final_relay_stats)
    }

    fn end_capture(&mut self) {
        self.end_flag.store(true, Ordering::Release);
        if let Some(sequencer) = self.sequencer.take() {
            sequencer.abort_all();
        }
    }

    fn active_sequencer(&self, operation: &'static str) -> EfvResult<&CaptureSequencer> {
        match (&self.sequencer, self.state) {
            (Some(sequencer), SessionState::Active) => Ok(sequencer),
            _ => Err(EfvError::invalid_state(operation, self.state)),
        }
    }

    fn expect_state(&self, operation: &'static str, allowed: &[SessionState]) -> EfvResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(EfvError::invalid_state(operation, self.state))
        }
    }
}

impl Drop for ExtensionSession {
    fn drop(&mut self) {
        self.deinit_session();
    }
}

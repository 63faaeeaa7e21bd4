//! The container-level encoding state machine.

use media_core::{ErrorKind, Result};
use mux::Muxer;
use tracing::{debug, info, warn};

use crate::codec::VideoCodec;
use crate::encoder::VideoEncoder;
use crate::raster::RasterSource;
use crate::stop::StopHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    Fresh,
    Ready,
    Stopped,
}

/// Identifies one encoder within its context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderId(usize);

/// Owns the output muxer and the encoders feeding it.
///
/// Lifecycle: `Fresh` (encoders opened, configured, and enabled) -> `Ready`
/// (container header written, frames flowing) -> `Stopped`. A cross-thread
/// [`StopHandle`] can interrupt from anywhere; every entry point observes it,
/// winds the context down, and reports `BadState`.
pub struct EncodingContext {
    muxer: Box<dyn Muxer>,
    encoders: Vec<VideoEncoder>,
    state: ContextState,
    stop: StopHandle,
}

impl EncodingContext {
    /// Bind the output target. The muxer must be freshly constructed; it is
    /// opened here and driven through its whole lifecycle by this context.
    pub fn new(mut muxer: Box<dyn Muxer>) -> Result<Self> {
        muxer.open()?;
        Ok(Self {
            muxer,
            encoders: Vec::new(),
            state: ContextState::Fresh,
            stop: StopHandle::new(),
        })
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Observe a pending cross-thread stop request. Winds the context down
    /// and reports `BadState` if one arrived.
    fn check_stop(&mut self) -> Result<()> {
        if self.state == ContextState::Stopped {
            return Err(ErrorKind::BadState.into());
        }
        if self.stop.is_stopped() {
            info!("stop requested, winding down");
            self.stop()?;
            return Err(ErrorKind::BadState.into());
        }
        Ok(())
    }

    /// Add an encoder over the given codec backend. Legal only before
    /// `ready`.
    pub fn open_video_encoder(&mut self, codec: Box<dyn VideoCodec>) -> Result<EncoderId> {
        self.check_stop()?;
        if self.state != ContextState::Fresh {
            return Err(ErrorKind::BadState.into());
        }
        let id = EncoderId(self.encoders.len());
        self.encoders.push(VideoEncoder::new(codec));
        debug!(encoder = id.0, "video encoder opened");
        Ok(id)
    }

    /// Access an encoder for configuration.
    pub fn encoder_mut(&mut self, id: EncoderId) -> Result<&mut VideoEncoder> {
        self.encoders
            .get_mut(id.0)
            .ok_or(ErrorKind::NoProcessor.into())
    }

    /// Enable an encoder with explicit source dimensions. Must happen while
    /// the context is still `Fresh`.
    pub fn enable(&mut self, id: EncoderId, source_width: i32, source_height: i32) -> Result<()> {
        self.check_stop()?;
        if self.state != ContextState::Fresh {
            return Err(ErrorKind::BadState.into());
        }
        let encoder = self
            .encoders
            .get_mut(id.0)
            .ok_or(ErrorKind::NoProcessor)?;
        encoder.enable(self.muxer.as_mut(), source_width, source_height)
    }

    /// Finalize the container header. Requires every opened encoder to be
    /// enabled.
    pub fn ready(&mut self) -> Result<()> {
        self.check_stop()?;
        if self.state != ContextState::Fresh {
            return Err(ErrorKind::BadState.into());
        }
        if self.encoders.is_empty() {
            warn!("ready called with no encoders");
            return Err(ErrorKind::NoProcessor.into());
        }
        if !self.encoders.iter().all(|e| e.is_enabled()) {
            return Err(ErrorKind::BadState.into());
        }
        self.muxer.ready()?;
        self.state = ContextState::Ready;
        Ok(())
    }

    /// Encode one raster through the given encoder.
    ///
    /// Convenience transitions: a `Fresh` encoder is enabled from the
    /// raster's own dimensions, and a `Fresh` context is made ready once all
    /// of its encoders are enabled. `rgb_hint` selects the RGB/BGR reading of
    /// three-channel data.
    pub fn encode(
        &mut self,
        id: EncoderId,
        raster: &dyn RasterSource,
        rgb_hint: bool,
    ) -> Result<()> {
        self.check_stop()?;
        let details = raster.extract_details(rgb_hint)?;

        let encoder = self
            .encoders
            .get_mut(id.0)
            .ok_or(ErrorKind::NoProcessor)?;
        if !encoder.is_enabled() {
            if self.state != ContextState::Fresh {
                return Err(ErrorKind::BadState.into());
            }
            encoder.enable(self.muxer.as_mut(), details.width, details.height)?;
        }
        if self.state == ContextState::Fresh {
            if !self.encoders.iter().all(|e| e.is_enabled()) {
                // other encoders still unconfigured; the header cannot be
                // finalized yet
                return Err(ErrorKind::BadState.into());
            }
            self.muxer.ready()?;
            self.state = ContextState::Ready;
        }
        self.encoders[id.0].encode(self.muxer.as_mut(), &details)
    }

    /// Stop every encoder (flushing tail packets), restore swapped stream
    /// configuration, and close the container. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if self.state == ContextState::Stopped {
            return Ok(());
        }
        self.state = ContextState::Stopped;

        // Enabled encoders hold swapped stream configuration even before the
        // header is finalized; they must unwind regardless of how far the
        // context got.
        let mut first_error = None;
        for encoder in &mut self.encoders {
            if let Err(e) = encoder.stop(self.muxer.as_mut()) {
                warn!("encoder failed to stop cleanly: {e}");
                first_error.get_or_insert(e);
            }
        }
        match self.muxer.close() {
            Ok(()) => {}
            Err(e) => {
                warn!("output failed to close cleanly: {e}");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for EncodingContext {
    fn drop(&mut self) {
        if self.state != ContextState::Stopped {
            // last-resort cleanup; errors here have nowhere to go
            let _ = self.stop();
        }
    }
}

//! Overlay channel state machine
//!
//! Composes the geometry planner, one overlay pipe session and one rotator
//! session into a single source-to-display path. `set_source` is designed to
//! be called once per frame: while the channel is up and the request matches
//! the active overlay it returns without touching hardware, and a mismatch is
//! torn down lazily on the next call rather than in place.

use crate::display::DisplayHandle;
use crate::geometry;
use crate::mdp::{
    color_format, is_3d_format, BufferPayload, Orientation, OverlayConfig, PixelFormat,
    RotatorConfig, RotatorData, MDP_OV_PIPE_SHARE, MDP_OV_PLAY_NOWAIT,
};
use crate::pipe::OverlayPipe;
use crate::rotator::RotatorSession;
use crate::transport::{Allocator, DeviceTransport};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error};

/// The primary display.
pub const FB_PRIMARY: u32 = 0;

/// Depth of the rotation output ring.
pub const ROTATOR_RING_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Up,
    /// A source mismatch was detected while up; the next `set_source` closes
    /// the channel before rebuilding it.
    PendingClose,
}

/// One source buffer stream, as described by the producer.
#[derive(Debug, Clone, Copy)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    /// HAL format; may carry 3D layout bits in the high bits.
    pub format: u32,
    /// Bytes per buffer, used to size the rotation ring.
    pub size: u32,
}

/// Process-level switches, passed in explicitly instead of read from ambient
/// properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelOptions {
    /// Force NOWAIT queueing (vsync wait administratively disabled).
    pub disable_vsync: bool,
}

/// Opaque descriptor for one source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle {
    pub memory_id: i32,
    pub offset: u32,
}

pub struct OverlayChannel {
    state: ChannelState,
    orientation: Orientation,
    fb_index: u32,
    options: ChannelOptions,
    pipe: OverlayPipe,
    rotator: RotatorSession,
}

impl OverlayChannel {
    pub fn new(
        transport: Arc<dyn DeviceTransport>,
        allocator: Arc<dyn Allocator>,
        options: ChannelOptions,
    ) -> Self {
        Self {
            state: ChannelState::Closed,
            orientation: Orientation::Identity,
            fb_index: FB_PRIMARY,
            options,
            pipe: OverlayPipe::new(transport.clone()),
            rotator: RotatorSession::new(transport, allocator),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Bind the channel to a source stream.
    ///
    /// While the channel is up and the request matches the active overlay
    /// this is a no-op; on a mismatch the channel moves to `PendingClose` and
    /// returns [`Error::Retry`], and the caller's next `set_source` performs
    /// the teardown and reopen.
    pub fn set_source(
        &mut self,
        info: SourceInfo,
        orientation: Orientation,
        use_vg_pipe: bool,
        ignore_fb: bool,
        fb_index: u32,
        z_order: Option<u32>,
    ) -> Result<()> {
        if is_3d_format(info.format) {
            return Err(Error::UnsupportedFormat(info.format));
        }
        let format = PixelFormat::from_hal(color_format(info.format))
            .filter(|f| f.is_rgb())
            .ok_or(Error::UnsupportedFormat(info.format))?;

        if self.state == ChannelState::PendingClose {
            self.close_channel();
        }

        if self.state == ChannelState::Up {
            match self.pipe.descriptor() {
                Ok(active)
                    if self.orientation == orientation
                        && self.fb_index == fb_index
                        && geometry::matches_active(
                            info.width,
                            info.height,
                            format,
                            orientation,
                            z_order,
                            &active,
                        ) =>
                {
                    return Ok(());
                }
                _ => {
                    debug!("active overlay no longer matches source, deferring close");
                    self.state = ChannelState::PendingClose;
                    return Err(Error::Retry);
                }
            }
        }

        self.orientation = orientation;
        let (mut overlay, rotator) =
            geometry::plan(info.width, info.height, format, orientation);

        let mut flags = 0;
        if ignore_fb {
            overlay.is_fg = true;
        } else {
            flags |= MDP_OV_PLAY_NOWAIT;
        }
        if self.options.disable_vsync {
            flags |= MDP_OV_PLAY_NOWAIT;
        }
        // Depth is last-known (zero before the first open); an unknown depth
        // counts as a mismatch.
        let fb_depth = self.pipe.display().bits_per_pixel();
        if use_vg_pipe
            || (fb_index == FB_PRIMARY && format.bytes_per_pixel() != Some(fb_depth / 8))
        {
            flags |= MDP_OV_PIPE_SHARE;
        }
        overlay.flags = flags;
        if let Some(z) = z_order {
            overlay.z_order = z;
        }

        self.start_channel(fb_index, overlay, rotator, info.size)
    }

    fn start_channel(
        &mut self,
        fb_index: u32,
        overlay: OverlayConfig,
        rotator: RotatorConfig,
        buffer_size: u32,
    ) -> Result<()> {
        self.pipe.start(overlay, fb_index)?;

        if self.orientation.requires_rotator() {
            if let Err(e) = self
                .rotator
                .start(rotator, buffer_size, ROTATOR_RING_DEPTH)
            {
                error!("start channel failed: {}", e);
                self.pipe.close();
                return Err(e);
            }
        }

        self.state = ChannelState::Up;
        self.fb_index = fb_index;
        Ok(())
    }

    /// Submit one source buffer, routing it through the rotator first when
    /// the channel has a rotation leg.
    pub fn queue_buffer(&mut self, buffer: &BufferHandle) -> Result<()> {
        if self.state != ChannelState::Up {
            return Err(Error::NotStarted);
        }

        let mut payload = BufferPayload {
            memory_id: buffer.memory_id,
            offset: buffer.offset,
        };
        if self.rotator.is_active() {
            let mut data = RotatorData::for_source(payload);
            self.rotator.rotate(&mut data).map_err(|e| {
                error!("rotator failed: {}", e);
                e
            })?;
            payload = data.dst;
        }

        self.pipe.queue_buffer(payload)
    }

    /// Reposition the overlay on screen.
    pub fn set_position(&mut self, x: i32, y: i32, w: u32, h: u32) -> Result<()> {
        self.pipe.set_position(x, y, w, h)
    }

    /// Descriptor of the active overlay pipe.
    pub fn descriptor(&self) -> Result<OverlayConfig> {
        self.pipe.descriptor()
    }

    pub fn display(&self) -> &DisplayHandle {
        self.pipe.display()
    }

    /// Close both sub-sessions and return to `Closed`. Callable from any
    /// state.
    pub fn close_channel(&mut self) {
        self.pipe.close();
        self.rotator.close();
        self.state = ChannelState::Closed;
    }
}

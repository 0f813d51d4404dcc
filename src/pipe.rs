//! Overlay pipe session
//!
//! One hardware overlay pipe bound to a display output. The session id lives
//! inside [`ActiveSession`]; `None` means not started, so there is no
//! sentinel id to compare against.

use crate::display::DisplayHandle;
use crate::mdp::{BufferPayload, OverlayConfig, OverlayData, Rect};
use crate::transport::{DeviceRequest, DeviceTransport};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, warn};

struct ActiveSession {
    id: u32,
    config: OverlayConfig,
}

pub struct OverlayPipe {
    transport: Arc<dyn DeviceTransport>,
    display: DisplayHandle,
    session: Option<ActiveSession>,
}

impl OverlayPipe {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        let display = DisplayHandle::new(transport.clone());
        Self {
            transport,
            display,
            session: None,
        }
    }

    /// Create the overlay on framebuffer `fb_index` with `config`.
    ///
    /// On driver rejection the just-opened display is closed again before
    /// returning, so a failed start leaves no resource behind.
    pub fn start(&mut self, mut config: OverlayConfig, fb_index: u32) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::AlreadyExists);
        }

        self.display.open(fb_index)?;
        let fd = self.display.fd()?;
        if let Err(e) = self
            .transport
            .request(fd, DeviceRequest::OverlaySet(&mut config))
        {
            warn!("overlay set failed on FB {}: {}", fb_index, e);
            self.display.close();
            return Err(Error::InvalidConfig("overlay set rejected".into()));
        }

        debug!("overlay session {} started on FB {}", config.id, fb_index);
        self.session = Some(ActiveSession {
            id: config.id,
            config,
        });
        Ok(())
    }

    /// Queue one buffer on the active overlay.
    pub fn queue_buffer(&self, payload: BufferPayload) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NotStarted)?;
        let data = OverlayData {
            id: session.id,
            data: payload,
        };
        self.transport
            .request(self.display.fd()?, DeviceRequest::OverlayPlay(&data))
            .map_err(|_| Error::InvalidConfig("overlay play rejected".into()))
    }

    /// Move / resize the overlay destination rectangle.
    ///
    /// Reads the live overlay state first and reprograms the pipe only when
    /// the requested rectangle differs, so repeated identical calls cost one
    /// readback and no update.
    pub fn set_position(&mut self, x: i32, y: i32, w: u32, h: u32) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::NotStarted)?;

        if x < 0 || y < 0 || x as u32 + w > self.display.width() {
            return Err(Error::InvalidConfig(format!(
                "position {x},{y} {w}x{h} outside FB width {}",
                self.display.width()
            )));
        }

        let fd = self.display.fd()?;
        let mut current = OverlayConfig {
            id: session.id,
            ..session.config
        };
        self.transport
            .request(fd, DeviceRequest::OverlayGet(&mut current))
            .map_err(|_| Error::InvalidConfig("overlay readback failed".into()))?;

        let requested = Rect {
            x: x as u32,
            y: y as u32,
            w,
            h,
        };
        if current.dst_rect != requested {
            current.dst_rect = requested;
            self.transport
                .request(fd, DeviceRequest::OverlaySet(&mut current))
                .map_err(|_| Error::InvalidConfig("overlay position update rejected".into()))?;
        }
        session.config = current;
        Ok(())
    }

    /// The cached descriptor of the active overlay.
    pub fn descriptor(&self) -> Result<OverlayConfig> {
        self.session
            .as_ref()
            .map(|s| s.config)
            .ok_or(Error::NotStarted)
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Release the overlay and its display. Idempotent; the unset request is
    /// best-effort.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Ok(fd) = self.display.fd() {
                let _ = self
                    .transport
                    .request(fd, DeviceRequest::OverlayUnset(session.id));
            }
            self.display.close();
            debug!("overlay session {} closed", session.id);
        }
    }
}

impl Drop for OverlayPipe {
    fn drop(&mut self) {
        self.close();
    }
}

//! Display output handle
//!
//! Owns the file descriptor for one framebuffer device and caches the
//! geometry reported at open time. Width/height/depth are only meaningful
//! while the descriptor is open; after a close they keep their last-known
//! values until the next open.

use crate::transport::{DeviceRequest, DeviceTransport};
use crate::{Error, Result};
use crate::mdp::ScreenInfo;
use std::os::unix::io::RawFd;
use std::sync::Arc;
use tracing::{debug, error};

const FB_DEVICE_TEMPLATE: &str = "/dev/graphics/fb";

pub struct DisplayHandle {
    transport: Arc<dyn DeviceTransport>,
    fd: Option<RawFd>,
    width: u32,
    height: u32,
    bits_per_pixel: u32,
}

impl DisplayHandle {
    pub fn new(transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            transport,
            fd: None,
            width: 0,
            height: 0,
            bits_per_pixel: 0,
        }
    }

    /// Open framebuffer `index` and query its geometry.
    pub fn open(&mut self, index: u32) -> Result<()> {
        if self.fd.is_some() {
            return Err(Error::AlreadyExists);
        }

        let path = format!("{FB_DEVICE_TEMPLATE}{index}");
        let fd = self.transport.open(&path).map_err(|e| {
            error!("failed to open FB {}: {}", index, e);
            e
        })?;

        let mut info = ScreenInfo::default();
        if self
            .transport
            .request(fd, DeviceRequest::QueryScreen(&mut info))
            .is_err()
        {
            error!("screen info query failed on FB {}", index);
            self.transport.close(fd);
            return Err(Error::QueryFailed(index));
        }

        debug!(
            "opened FB {}: {}x{} @ {}bpp",
            index, info.width, info.height, info.bits_per_pixel
        );
        self.fd = Some(fd);
        self.width = info.width;
        self.height = info.height;
        self.bits_per_pixel = info.bits_per_pixel;
        Ok(())
    }

    /// Release the descriptor. Closing an unopened handle is a no-op.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            self.transport.close(fd);
        }
    }

    pub fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    pub fn fd(&self) -> Result<RawFd> {
        self.fd.ok_or(Error::NotStarted)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bits_per_pixel(&self) -> u32 {
        self.bits_per_pixel
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.close();
    }
}

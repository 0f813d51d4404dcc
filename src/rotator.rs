//! Rotation engine session
//!
//! Owns one msm_rotator session and a ring of rotation output buffers
//! allocated from the platform allocator. Output slots are handed out
//! round-robin; a failed rotate still consumes its slot so the next call
//! never writes into a buffer the hardware may still be draining.

use crate::mdp::{RotatorConfig, RotatorData};
use crate::transport::{
    page_size, Allocation, Allocator, DeviceRequest, DeviceTransport, USAGE_ROTATOR_RING,
};
use crate::{Error, Result};
use std::os::unix::io::RawFd;
use std::sync::Arc;
use tracing::{debug, info, warn};

const ROTATOR_DEVICE: &str = "/dev/msm_rotator";

struct ActiveRotator {
    fd: RawFd,
    session_id: u32,
    ring: Allocation,
    offsets: Vec<u32>,
    cursor: usize,
}

pub struct RotatorSession {
    transport: Arc<dyn DeviceTransport>,
    allocator: Arc<dyn Allocator>,
    active: Option<ActiveRotator>,
}

impl RotatorSession {
    pub fn new(transport: Arc<dyn DeviceTransport>, allocator: Arc<dyn Allocator>) -> Self {
        Self {
            transport,
            allocator,
            active: None,
        }
    }

    /// Open the rotation engine, start a session with `config` and allocate
    /// `buffer_count` output buffers of `buffer_size` bytes each.
    ///
    /// Each failure leg rolls back everything opened before it: a rejected
    /// start closes the device, a failed allocation also finishes the
    /// session.
    pub fn start(&mut self, mut config: RotatorConfig, buffer_size: u32, buffer_count: usize) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::AlreadyExists);
        }
        if buffer_count == 0 || buffer_size == 0 {
            return Err(Error::InvalidConfig("rotator ring must hold at least one buffer".into()));
        }

        let fd = self.transport.open(ROTATOR_DEVICE)?;

        if let Err(e) = self
            .transport
            .request(fd, DeviceRequest::RotatorStart(&mut config))
        {
            warn!("rotator start rejected: {}", e);
            self.transport.close(fd);
            return Err(Error::InvalidConfig("rotator start rejected".into()));
        }

        let total = buffer_size as usize * buffer_count;
        let ring = match self
            .allocator
            .allocate(total, page_size(), USAGE_ROTATOR_RING)
        {
            Ok(ring) => ring,
            Err(e) => {
                warn!("rotator ring allocation failed: {}", e);
                let _ = self
                    .transport
                    .request(fd, DeviceRequest::RotatorFinish(config.session_id));
                self.transport.close(fd);
                return Err(e);
            }
        };

        let offsets = (0..buffer_count as u32).map(|i| i * buffer_size).collect();
        info!(
            "rotator session {} started, {} buffers of {} bytes",
            config.session_id, buffer_count, buffer_size
        );
        self.active = Some(ActiveRotator {
            fd,
            session_id: config.session_id,
            ring,
            offsets,
            cursor: 0,
        });
        Ok(())
    }

    /// Rotate one buffer into the next ring slot.
    ///
    /// Fills the destination side of `data` with the ring's memory id and the
    /// current slot offset, then issues the rotate. The cursor advances even
    /// when the driver rejects the transfer.
    pub fn rotate(&mut self, data: &mut RotatorData) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NotStarted)?;

        data.dst.memory_id = active.ring.memory_id;
        data.dst.offset = active.offsets[active.cursor];
        data.session_id = active.session_id;
        active.cursor = (active.cursor + 1) % active.offsets.len();

        self.transport
            .request(active.fd, DeviceRequest::RotatorRotate(data))
            .map_err(|_| Error::InvalidConfig("rotate rejected".into()))
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Finish the session, close the device and free the ring exactly once.
    /// Idempotent; the finish request is best-effort.
    pub fn close(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = self
                .transport
                .request(active.fd, DeviceRequest::RotatorFinish(active.session_id));
            self.transport.close(active.fd);
            self.allocator.free(&active.ring);
            debug!("rotator session {} closed", active.session_id);
        }
    }
}

impl Drop for RotatorSession {
    fn drop(&mut self) {
        self.close();
    }
}

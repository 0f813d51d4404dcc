//! Overlay channel management for MSM framebuffer displays
//!
//! This library drives exclusive hardware display-overlay channels: it
//! negotiates a buffer's geometry and pixel format against the overlay pipe's
//! constraints, programs a rotation stage when the orientation needs one, and
//! streams buffers through the resulting two-stage pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Caller (one per channel)                    │
//! │        set_source / queue_buffer / close_channel            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      OverlayChannel                         │
//! │   ┌───────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │   │ GeometryPlan  │  │ RotatorSess. │  │ OverlayPipe    │   │
//! │   │ (pure)        │  │ (ring bufs)  │  │ (display bound)│   │
//! │   └───────────────┘  └──────────────┘  └────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   DeviceTransport / Allocator
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │        msm_fb overlay ioctls      msm_rotator ioctls        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mdp_overlay::{ChannelOptions, DevTransport, Orientation, OverlayChannel, SourceInfo};
//! use std::sync::Arc;
//!
//! let mut channel = OverlayChannel::new(
//!     Arc::new(DevTransport::new()),
//!     allocator,
//!     ChannelOptions::default(),
//! );
//! channel.set_source(info, Orientation::Rot90, false, false, 0, None)?;
//! channel.queue_buffer(&buffer)?;
//! ```

pub mod channel;
pub mod display;
pub mod error;
pub mod geometry;
pub mod mdp;
pub mod pipe;
pub mod rotator;
pub mod transport;

pub use channel::{BufferHandle, ChannelOptions, ChannelState, OverlayChannel, SourceInfo};
pub use display::DisplayHandle;
pub use error::Error;
pub use mdp::{Orientation, OverlayConfig, PixelFormat};
pub use pipe::OverlayPipe;
pub use rotator::RotatorSession;
pub use transport::{Allocation, Allocator, DevTransport, DeviceRequest, DeviceTransport};

/// Result type for this crate
pub type Result<T> = std::result::Result<T, Error>;

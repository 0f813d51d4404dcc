//! Hardware-facing MDP overlay and rotator types
//!
//! These mirror the records the MSM framebuffer and rotator drivers consume.
//! The structs here are the idiomatic forms used throughout the crate; the
//! kernel ABI layouts live next to the real transport in [`crate::transport`].

/// Overlay id that asks the driver to allocate a new pipe session.
pub const MSMFB_NEW_REQUEST: u32 = u32::MAX;

/// Fully transparent mask, i.e. no transparent color keying.
pub const MDP_TRANSP_NOP: u32 = 0xffffffff;

/// Queue buffers without waiting for vsync.
pub const MDP_OV_PLAY_NOWAIT: u32 = 0x0020_0000;

/// Ask for a shared (VG) pipe instead of a dedicated RGB pipe.
pub const MDP_OV_PIPE_SHARE: u32 = 0x0080_0000;

/// MDP rotation codes programmed into the overlay and rotator.
pub const MDP_ROT_NOP: u32 = 0;
pub const MDP_FLIP_LR: u32 = 0x1;
pub const MDP_FLIP_UD: u32 = 0x2;
pub const MDP_ROT_90: u32 = 0x4;
pub const MDP_ROT_180: u32 = MDP_FLIP_UD | MDP_FLIP_LR;
pub const MDP_ROT_270: u32 = MDP_ROT_90 | MDP_ROT_180;

/// HAL pixel formats as handed to `set_source`
pub const HAL_PIXEL_FORMAT_RGBA_8888: u32 = 1;
pub const HAL_PIXEL_FORMAT_RGBX_8888: u32 = 2;
pub const HAL_PIXEL_FORMAT_RGB_888: u32 = 3;
pub const HAL_PIXEL_FORMAT_RGB_565: u32 = 4;
pub const HAL_PIXEL_FORMAT_BGRA_8888: u32 = 5;
pub const HAL_PIXEL_FORMAT_YCRCB_420_SP: u32 = 0x11;

/// High bits of a HAL format carrying stereoscopic (3D) layout information.
pub const FORMAT_3D_MASK: u32 = 0xff000;

/// Low bits of a HAL format carrying the color format proper.
pub const COLOR_FORMAT_MASK: u32 = 0xfff;

/// True if the HAL format encodes stereoscopic content.
pub fn is_3d_format(hal_format: u32) -> bool {
    hal_format & FORMAT_3D_MASK != 0
}

/// Strips 3D layout bits, leaving the color format.
pub fn color_format(hal_format: u32) -> u32 {
    hal_format & COLOR_FORMAT_MASK
}

/// MDP pixel formats (driver enum values)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb565 = 0,
    Rgb888 = 4,
    YCrCbH2V2 = 5,
    Rgba8888 = 9,
    Bgra8888 = 10,
    Rgbx8888 = 11,
}

impl PixelFormat {
    /// Map a HAL color format to its MDP equivalent.
    pub fn from_hal(hal_format: u32) -> Option<PixelFormat> {
        match hal_format {
            HAL_PIXEL_FORMAT_RGBA_8888 => Some(PixelFormat::Rgba8888),
            HAL_PIXEL_FORMAT_RGBX_8888 => Some(PixelFormat::Rgbx8888),
            HAL_PIXEL_FORMAT_RGB_888 => Some(PixelFormat::Rgb888),
            HAL_PIXEL_FORMAT_RGB_565 => Some(PixelFormat::Rgb565),
            HAL_PIXEL_FORMAT_BGRA_8888 => Some(PixelFormat::Bgra8888),
            HAL_PIXEL_FORMAT_YCRCB_420_SP => Some(PixelFormat::YCrCbH2V2),
            _ => None,
        }
    }

    /// Recover a format from a raw driver value (overlay readback path).
    pub fn from_mdp(value: u32) -> Option<PixelFormat> {
        match value {
            0 => Some(PixelFormat::Rgb565),
            4 => Some(PixelFormat::Rgb888),
            5 => Some(PixelFormat::YCrCbH2V2),
            9 => Some(PixelFormat::Rgba8888),
            10 => Some(PixelFormat::Bgra8888),
            11 => Some(PixelFormat::Rgbx8888),
            _ => None,
        }
    }

    /// True for the RGB families the overlay pipes accept.
    pub fn is_rgb(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888
                | PixelFormat::Bgra8888
                | PixelFormat::Rgbx8888
                | PixelFormat::Rgb565
        )
    }

    /// Bytes per pixel for the RGB families, `None` otherwise.
    pub fn bytes_per_pixel(self) -> Option<u32> {
        match self {
            PixelFormat::Rgba8888 | PixelFormat::Bgra8888 | PixelFormat::Rgbx8888 => Some(4),
            PixelFormat::Rgb565 => Some(2),
            _ => None,
        }
    }
}

/// Source orientation, HAL transform encoding
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Identity = 0,
    FlipH = 0x01,
    FlipV = 0x02,
    Rot180 = 0x03,
    Rot90 = 0x04,
    Rot90FlipH = 0x05,
    Rot90FlipV = 0x06,
    Rot270 = 0x07,
}

impl Orientation {
    /// Any non-identity orientation routes buffers through the rotator,
    /// even when the resolved rotation code ends up as a no-op.
    pub fn requires_rotator(self) -> bool {
        self != Orientation::Identity
    }

    /// True for the 90/270 family, whose crop is expressed in rotated
    /// coordinate space.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::Rot90
                | Orientation::Rot90FlipH
                | Orientation::Rot90FlipV
                | Orientation::Rot270
        )
    }

    /// Collapse flip-only orientations to identity and 90-plus-flip variants
    /// to plain 90 before resolving the hardware rotation code.
    pub fn normalized_for_rotator(self) -> Orientation {
        match self {
            Orientation::FlipH | Orientation::FlipV => Orientation::Identity,
            Orientation::Rot90FlipH | Orientation::Rot90FlipV => Orientation::Rot90,
            other => other,
        }
    }

    /// Resolve the MDP rotation code. Unsupported combinations normalize to
    /// "no rotation".
    pub fn mdp_rotation(self) -> u32 {
        match self.normalized_for_rotator() {
            Orientation::Identity => MDP_ROT_NOP,
            Orientation::Rot90 => MDP_ROT_90,
            Orientation::Rot180 => MDP_ROT_180,
            Orientation::Rot270 => MDP_ROT_270,
            _ => MDP_ROT_NOP,
        }
    }
}

/// A rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Source image description (width/height are pipe-aligned)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Overlay pipe configuration (mdp_overlay)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Session id; [`MSMFB_NEW_REQUEST`] asks the driver for a new pipe.
    pub id: u32,
    pub src: ImageInfo,
    pub src_rect: Rect,
    pub dst_rect: Rect,
    pub z_order: u32,
    pub is_fg: bool,
    pub alpha: u32,
    pub transp_mask: u32,
    pub flags: u32,
    /// MDP rotation code mirrored from the rotator leg.
    pub rotation: u32,
}

/// One buffer submission payload (msmfb_data)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferPayload {
    pub memory_id: i32,
    pub offset: u32,
}

/// Overlay play request (msmfb_overlay_data)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayData {
    pub id: u32,
    pub data: BufferPayload,
}

/// Rotator session configuration (msm_rotator_img_info)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotatorConfig {
    /// Assigned by the driver when the session starts.
    pub session_id: u32,
    pub src: ImageInfo,
    pub dst: ImageInfo,
    pub src_rect: Rect,
    pub rotation: u32,
    pub enable: bool,
}

/// Per-buffer rotate request (msm_rotator_data_info)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotatorData {
    pub session_id: u32,
    pub src: BufferPayload,
    pub dst: BufferPayload,
}

impl RotatorData {
    /// A transfer descriptor for one source buffer; the destination side is
    /// filled in by the rotator session.
    pub fn for_source(src: BufferPayload) -> Self {
        Self {
            session_id: 0,
            src,
            dst: BufferPayload::default(),
        }
    }
}

/// Framebuffer geometry reported by the display (fb_var_screeninfo subset)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
}

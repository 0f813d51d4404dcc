//! Geometry planning for overlay and rotator descriptors
//!
//! Pure functions: everything here is derivable from (width, height, format,
//! orientation) alone. The pipe requires source dimensions rounded up to a
//! multiple of 32, and the 90/270 family expresses its source crop in rotated
//! coordinate space, so crops and dimensions are swapped here before any
//! session is opened.

use crate::mdp::{
    ImageInfo, Orientation, OverlayConfig, PixelFormat, Rect, RotatorConfig, MDP_TRANSP_NOP,
    MSMFB_NEW_REQUEST,
};

/// Round up to the pipe's 32-pixel memory-tiling requirement.
pub fn align32(value: u32) -> u32 {
    (value + 31) & !31
}

fn swap_rot_dimensions(overlay: &mut OverlayConfig, rotator: &mut RotatorConfig) {
    std::mem::swap(&mut overlay.src.width, &mut overlay.src.height);
    std::mem::swap(&mut overlay.src_rect.w, &mut overlay.src_rect.h);
    std::mem::swap(&mut rotator.dst.width, &mut rotator.dst.height);
}

/// Compute the overlay and rotator descriptors for one source stream.
///
/// The overlay source crop stays at the requested (unaligned) size; the
/// rotator works on the full aligned surface for both legs. Flip bits in the
/// 90-degree family collapse to plain 90 for the rotation engine.
pub fn plan(
    width: u32,
    height: u32,
    format: PixelFormat,
    orientation: Orientation,
) -> (OverlayConfig, RotatorConfig) {
    let aligned_w = align32(width);
    let aligned_h = align32(height);

    let mut overlay = OverlayConfig {
        id: MSMFB_NEW_REQUEST,
        src: ImageInfo {
            width: aligned_w,
            height: aligned_h,
            format,
        },
        src_rect: Rect {
            x: 0,
            y: 0,
            w: width,
            h: height,
        },
        dst_rect: Rect::default(),
        z_order: 0,
        is_fg: false,
        alpha: 0xff,
        transp_mask: MDP_TRANSP_NOP,
        flags: 0,
        rotation: 0,
    };

    let mut rotator = RotatorConfig {
        session_id: 0,
        src: overlay.src,
        dst: overlay.src,
        src_rect: Rect {
            x: 0,
            y: 0,
            w: aligned_w,
            h: aligned_h,
        },
        rotation: 0,
        enable: false,
    };

    match orientation {
        Orientation::Rot90 | Orientation::Rot90FlipH | Orientation::Rot90FlipV => {
            let old_x = overlay.src_rect.x;
            overlay.src_rect.x =
                overlay.src.height - (overlay.src_rect.y + overlay.src_rect.h);
            overlay.src_rect.y = old_x;
            swap_rot_dimensions(&mut overlay, &mut rotator);
        }
        Orientation::Rot270 => {
            let old_y = overlay.src_rect.y;
            overlay.src_rect.y =
                overlay.src.width - (overlay.src_rect.x + overlay.src_rect.w);
            overlay.src_rect.x = old_y;
            swap_rot_dimensions(&mut overlay, &mut rotator);
        }
        _ => {}
    }

    let rotation = orientation.mdp_rotation();
    overlay.rotation = rotation;
    rotator.rotation = rotation;
    rotator.enable = rotation != 0;

    overlay.dst_rect.w = overlay.src_rect.w;
    overlay.dst_rect.h = overlay.src_rect.h;

    (overlay, rotator)
}

/// Whether an active overlay already displays the requested geometry.
///
/// Dimensions are compared after 32-alignment and the 90/270 swap; a `None`
/// z-order matches any active z-order.
pub fn matches_active(
    width: u32,
    height: u32,
    format: PixelFormat,
    orientation: Orientation,
    z_order: Option<u32>,
    active: &OverlayConfig,
) -> bool {
    let (w, h) = match orientation {
        Orientation::Rot90 | Orientation::Rot270 => (height, width),
        _ => (width, height),
    };

    let attrs_match = align32(w) == active.src.width
        && align32(h) == active.src.height
        && format == active.src.format;

    match z_order {
        None => attrs_match,
        Some(z) => attrs_match && active.z_order == z,
    }
}

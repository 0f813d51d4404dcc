//! Smoke test for the overlay channel against real MSM devices
//!
//! Opens a channel on the primary framebuffer, prints what the hardware
//! accepted and closes it again. Harmless on machines without the MSM
//! overlay drivers: every step just reports its failure.

use mdp_overlay::transport::{Allocation, Allocator};
use mdp_overlay::{
    ChannelOptions, DevTransport, Orientation, OverlayChannel, Result, SourceInfo,
};
use std::sync::Arc;

/// Identity-orientation smoke runs never allocate; rotation tests need a
/// platform allocator wired in here.
struct NoAllocator;

impl Allocator for NoAllocator {
    fn allocate(&self, _size: usize, _align: usize, _usage: u32) -> Result<Allocation> {
        Err(mdp_overlay::Error::OutOfMemory(
            "no platform allocator configured".into(),
        ))
    }

    fn free(&self, _allocation: &Allocation) {}
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    println!("=== MDP Overlay Channel Test ===");

    let mut channel = OverlayChannel::new(
        Arc::new(DevTransport::new()),
        Arc::new(NoAllocator),
        ChannelOptions::default(),
    );

    let info = SourceInfo {
        width: 640,
        height: 480,
        format: mdp_overlay::mdp::HAL_PIXEL_FORMAT_RGBA_8888,
        size: 640 * 480 * 4,
    };

    println!("Opening 640x480 RGBA channel on FB0...");
    match channel.set_source(info, Orientation::Identity, false, false, 0, None) {
        Ok(()) => {
            let display = channel.display();
            println!("Channel is up!");
            println!(
                "  Display: {}x{} @ {}bpp",
                display.width(),
                display.height(),
                display.bits_per_pixel()
            );

            match channel.descriptor() {
                Ok(desc) => {
                    println!("  Overlay session: {}", desc.id);
                    println!(
                        "  Source: {}x{} crop {}x{}",
                        desc.src.width, desc.src.height, desc.src_rect.w, desc.src_rect.h
                    );
                    println!("  Flags: 0x{:08x}", desc.flags);
                }
                Err(e) => println!("  Failed to read descriptor: {}", e),
            }

            println!("Moving overlay to 32,32...");
            if let Err(e) = channel.set_position(32, 32, 640, 480) {
                println!("  set_position failed: {}", e);
            }

            channel.close_channel();
            println!("Channel closed.");
        }
        Err(e) => {
            println!("Failed to open channel: {}", e);
            println!("(expected off-target; this binary needs /dev/graphics/fb0)");
        }
    }
}

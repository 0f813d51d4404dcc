//! Device transport and allocator seams
//!
//! Every hardware interaction in this crate goes through [`DeviceTransport`],
//! a thin tagged-request interface over the driver ioctls, and every rotation
//! buffer comes from an injected [`Allocator`]. Sessions never touch file
//! descriptors or memory directly, which keeps them testable against
//! deterministic doubles.
//!
//! [`DevTransport`] is the production implementation: libc open/ioctl/close
//! against the MSM framebuffer and rotator devices, with the kernel ABI
//! structs kept private to this module.

use crate::mdp::{OverlayConfig, OverlayData, RotatorConfig, RotatorData, ScreenInfo};
use crate::{Error, Result};
use std::os::unix::io::RawFd;

/// One hardware request, tagged with its payload.
///
/// Payloads the driver writes back through (assigned session ids, readback,
/// screen queries) are carried as mutable references.
#[derive(Debug)]
pub enum DeviceRequest<'a> {
    /// Create or reprogram an overlay pipe; the driver assigns `id`.
    OverlaySet(&'a mut OverlayConfig),
    /// Read back the live state of the overlay identified by `id`.
    OverlayGet(&'a mut OverlayConfig),
    /// Release the overlay pipe session.
    OverlayUnset(u32),
    /// Queue one buffer on an overlay pipe.
    OverlayPlay(&'a OverlayData),
    /// Query framebuffer geometry and depth.
    QueryScreen(&'a mut ScreenInfo),
    /// Start a rotator session; the driver assigns `session_id`.
    RotatorStart(&'a mut RotatorConfig),
    /// Finish the rotator session.
    RotatorFinish(u32),
    /// Rotate one buffer.
    RotatorRotate(&'a RotatorData),
}

/// Blocking transport to a display or rotator device.
pub trait DeviceTransport {
    fn open(&self, path: &str) -> Result<RawFd>;
    fn request(&self, fd: RawFd, request: DeviceRequest<'_>) -> Result<()>;
    fn close(&self, fd: RawFd);
}

/// A region handed out by the platform allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// Memory identifier the drivers address the region by.
    pub memory_id: i32,
    /// Base address of the mapping.
    pub base: usize,
    /// Total size in bytes.
    pub size: usize,
    /// Allocator-specific heap tag, passed back on free.
    pub kind: u32,
}

/// Usage hint for rotator ring allocations (contiguous, device-accessible).
pub const USAGE_ROTATOR_RING: u32 = 0x0300_0000;

/// Platform memory allocator for rotation buffers.
pub trait Allocator {
    fn allocate(&self, size: usize, align: usize, usage: u32) -> Result<Allocation>;
    fn free(&self, allocation: &Allocation);
}

/// System page size, the required alignment for rotator rings.
pub fn page_size() -> usize {
    // sysconf cannot fail for _SC_PAGESIZE on Linux
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Production transport: libc open/ioctl/close on the real device nodes.
#[derive(Debug, Default)]
pub struct DevTransport;

impl DevTransport {
    pub fn new() -> Self {
        DevTransport
    }

    fn ioctl<T>(&self, fd: RawFd, code: libc::c_ulong, payload: &mut T) -> Result<()> {
        let rc = unsafe { libc::ioctl(fd, code as _, payload as *mut T) };
        if rc < 0 {
            Err(Error::InvalidConfig(
                std::io::Error::last_os_error().to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

impl DeviceTransport for DevTransport {
    fn open(&self, path: &str) -> Result<RawFd> {
        let cpath = std::ffi::CString::new(path)
            .map_err(|_| Error::OpenFailed(path.into(), "embedded NUL in path".into()))?;
        let fd = unsafe { libc::open(cpath.as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            Err(Error::OpenFailed(
                path.into(),
                std::io::Error::last_os_error().to_string(),
            ))
        } else {
            Ok(fd)
        }
    }

    fn request(&self, fd: RawFd, request: DeviceRequest<'_>) -> Result<()> {
        match request {
            DeviceRequest::OverlaySet(config) => {
                let mut raw = sys::MdpOverlay::from(&*config);
                self.ioctl(fd, sys::MSMFB_OVERLAY_SET, &mut raw)?;
                config.id = raw.id;
                Ok(())
            }
            DeviceRequest::OverlayGet(config) => {
                let mut raw = sys::MdpOverlay::from(&*config);
                self.ioctl(fd, sys::MSMFB_OVERLAY_GET, &mut raw)?;
                *config = OverlayConfig::try_from(&raw)?;
                Ok(())
            }
            DeviceRequest::OverlayUnset(id) => {
                let mut id = id;
                self.ioctl(fd, sys::MSMFB_OVERLAY_UNSET, &mut id)
            }
            DeviceRequest::OverlayPlay(data) => {
                let mut raw = sys::MsmfbOverlayData::from(data);
                self.ioctl(fd, sys::MSMFB_OVERLAY_PLAY, &mut raw)
            }
            DeviceRequest::QueryScreen(info) => {
                let mut raw = sys::FbVarScreeninfo::default();
                self.ioctl(fd, sys::FBIOGET_VSCREENINFO, &mut raw)?;
                info.width = raw.xres;
                info.height = raw.yres;
                info.bits_per_pixel = raw.bits_per_pixel;
                Ok(())
            }
            DeviceRequest::RotatorStart(config) => {
                let mut raw = sys::RotatorImgInfo::from(&*config);
                self.ioctl(fd, sys::MSM_ROTATOR_IOCTL_START, &mut raw)?;
                config.session_id = raw.session_id;
                Ok(())
            }
            DeviceRequest::RotatorFinish(session_id) => {
                let mut session_id = session_id;
                self.ioctl(fd, sys::MSM_ROTATOR_IOCTL_FINISH, &mut session_id)
            }
            DeviceRequest::RotatorRotate(data) => {
                let mut raw = sys::RotatorDataInfo::from(data);
                self.ioctl(fd, sys::MSM_ROTATOR_IOCTL_ROTATE, &mut raw)
            }
        }
    }

    fn close(&self, fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }
}

/// Kernel ABI: ioctl codes and struct layouts for msm_mdp / msm_rotator / fb.
mod sys {
    use crate::mdp::{
        BufferPayload, ImageInfo, OverlayConfig, OverlayData, PixelFormat, Rect, RotatorConfig,
        RotatorData,
    };
    use crate::{Error, Result};
    use std::mem::size_of;

    const IOC_WRITE: u32 = 1;
    const IOC_READ: u32 = 2;

    const fn ioc(dir: u32, ty: u32, nr: u32, size: u32) -> libc::c_ulong {
        ((dir << 30) | (size << 16) | (ty << 8) | nr) as libc::c_ulong
    }

    const fn iow(ty: u32, nr: u32, size: u32) -> libc::c_ulong {
        ioc(IOC_WRITE, ty, nr, size)
    }

    const fn ior(ty: u32, nr: u32, size: u32) -> libc::c_ulong {
        ioc(IOC_READ, ty, nr, size)
    }

    const fn iowr(ty: u32, nr: u32, size: u32) -> libc::c_ulong {
        ioc(IOC_READ | IOC_WRITE, ty, nr, size)
    }

    const MSMFB_IOCTL_MAGIC: u32 = b'm' as u32;
    const MSM_ROTATOR_IOCTL_MAGIC: u32 = b'R' as u32;

    pub const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
    pub const MSMFB_OVERLAY_SET: libc::c_ulong =
        iowr(MSMFB_IOCTL_MAGIC, 135, size_of::<MdpOverlay>() as u32);
    pub const MSMFB_OVERLAY_UNSET: libc::c_ulong =
        iow(MSMFB_IOCTL_MAGIC, 136, size_of::<u32>() as u32);
    pub const MSMFB_OVERLAY_PLAY: libc::c_ulong =
        iow(MSMFB_IOCTL_MAGIC, 137, size_of::<MsmfbOverlayData>() as u32);
    pub const MSMFB_OVERLAY_GET: libc::c_ulong =
        ior(MSMFB_IOCTL_MAGIC, 140, size_of::<MdpOverlay>() as u32);
    pub const MSM_ROTATOR_IOCTL_START: libc::c_ulong =
        iowr(MSM_ROTATOR_IOCTL_MAGIC, 1, size_of::<RotatorImgInfo>() as u32);
    pub const MSM_ROTATOR_IOCTL_ROTATE: libc::c_ulong =
        iow(MSM_ROTATOR_IOCTL_MAGIC, 2, size_of::<RotatorDataInfo>() as u32);
    pub const MSM_ROTATOR_IOCTL_FINISH: libc::c_ulong =
        iow(MSM_ROTATOR_IOCTL_MAGIC, 3, size_of::<libc::c_int>() as u32);

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MdpRect {
        pub x: u32,
        pub y: u32,
        pub w: u32,
        pub h: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MsmfbImg {
        pub width: u32,
        pub height: u32,
        pub format: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MdpOverlay {
        pub src: MsmfbImg,
        pub src_rect: MdpRect,
        pub dst_rect: MdpRect,
        pub z_order: u32,
        pub is_fg: u32,
        pub alpha: u32,
        pub transp_mask: u32,
        pub flags: u32,
        pub id: u32,
        pub user_data: [u32; 8],
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MsmfbData {
        pub offset: u32,
        pub memory_id: i32,
        pub id: u32,
        pub flags: u32,
        pub priv_data: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct MsmfbOverlayData {
        pub id: u32,
        pub data: MsmfbData,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RotatorImgInfo {
        pub session_id: u32,
        pub src: MsmfbImg,
        pub dst: MsmfbImg,
        pub src_rect: MdpRect,
        pub dst_x: u32,
        pub dst_y: u32,
        pub enable: u8,
        pub downscale_ratio: u32,
        pub rotations: u32,
        pub secure: i32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct RotatorDataInfo {
        pub session_id: u32,
        pub src: MsmfbData,
        pub dst: MsmfbData,
        pub version_key: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FbBitfield {
        pub offset: u32,
        pub length: u32,
        pub msb_right: u32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FbVarScreeninfo {
        pub xres: u32,
        pub yres: u32,
        pub xres_virtual: u32,
        pub yres_virtual: u32,
        pub xoffset: u32,
        pub yoffset: u32,
        pub bits_per_pixel: u32,
        pub grayscale: u32,
        pub red: FbBitfield,
        pub green: FbBitfield,
        pub blue: FbBitfield,
        pub transp: FbBitfield,
        pub nonstd: u32,
        pub activate: u32,
        pub height: u32,
        pub width: u32,
        pub accel_flags: u32,
        pub pixclock: u32,
        pub left_margin: u32,
        pub right_margin: u32,
        pub upper_margin: u32,
        pub lower_margin: u32,
        pub hsync_len: u32,
        pub vsync_len: u32,
        pub sync: u32,
        pub vmode: u32,
        pub rotate: u32,
        pub colorspace: u32,
        pub reserved: [u32; 4],
    }

    impl From<&Rect> for MdpRect {
        fn from(r: &Rect) -> Self {
            MdpRect {
                x: r.x,
                y: r.y,
                w: r.w,
                h: r.h,
            }
        }
    }

    impl From<&MdpRect> for Rect {
        fn from(r: &MdpRect) -> Self {
            Rect {
                x: r.x,
                y: r.y,
                w: r.w,
                h: r.h,
            }
        }
    }

    impl From<&ImageInfo> for MsmfbImg {
        fn from(img: &ImageInfo) -> Self {
            MsmfbImg {
                width: img.width,
                height: img.height,
                format: img.format as u32,
            }
        }
    }

    impl From<&BufferPayload> for MsmfbData {
        fn from(p: &BufferPayload) -> Self {
            MsmfbData {
                offset: p.offset,
                memory_id: p.memory_id,
                ..MsmfbData::default()
            }
        }
    }

    impl From<&OverlayConfig> for MdpOverlay {
        fn from(config: &OverlayConfig) -> Self {
            let mut user_data = [0u32; 8];
            user_data[0] = config.rotation;
            MdpOverlay {
                src: MsmfbImg::from(&config.src),
                src_rect: MdpRect::from(&config.src_rect),
                dst_rect: MdpRect::from(&config.dst_rect),
                z_order: config.z_order,
                is_fg: config.is_fg as u32,
                alpha: config.alpha,
                transp_mask: config.transp_mask,
                flags: config.flags,
                id: config.id,
                user_data,
            }
        }
    }

    impl TryFrom<&MdpOverlay> for OverlayConfig {
        type Error = Error;

        fn try_from(raw: &MdpOverlay) -> Result<Self> {
            let format = PixelFormat::from_mdp(raw.src.format).ok_or_else(|| {
                Error::InvalidConfig(format!("driver reported format {}", raw.src.format))
            })?;
            Ok(OverlayConfig {
                id: raw.id,
                src: ImageInfo {
                    width: raw.src.width,
                    height: raw.src.height,
                    format,
                },
                src_rect: Rect::from(&raw.src_rect),
                dst_rect: Rect::from(&raw.dst_rect),
                z_order: raw.z_order,
                is_fg: raw.is_fg != 0,
                alpha: raw.alpha,
                transp_mask: raw.transp_mask,
                flags: raw.flags,
                rotation: raw.user_data[0],
            })
        }
    }

    impl From<&OverlayData> for MsmfbOverlayData {
        fn from(data: &OverlayData) -> Self {
            MsmfbOverlayData {
                id: data.id,
                data: MsmfbData::from(&data.data),
            }
        }
    }

    impl From<&RotatorConfig> for RotatorImgInfo {
        fn from(config: &RotatorConfig) -> Self {
            RotatorImgInfo {
                session_id: config.session_id,
                src: MsmfbImg::from(&config.src),
                dst: MsmfbImg::from(&config.dst),
                src_rect: MdpRect::from(&config.src_rect),
                enable: config.enable as u8,
                rotations: config.rotation,
                ..RotatorImgInfo::default()
            }
        }
    }

    impl From<&RotatorData> for RotatorDataInfo {
        fn from(data: &RotatorData) -> Self {
            RotatorDataInfo {
                session_id: data.session_id,
                src: MsmfbData::from(&data.src),
                dst: MsmfbData::from(&data.dst),
                version_key: 0,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Deterministic doubles for the transport and allocator seams.

    use super::*;
    use crate::mdp::MSMFB_NEW_REQUEST;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::sync::Arc;

    /// Request kinds, for scripting failures and counting traffic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Op {
        OverlaySet,
        OverlayGet,
        OverlayUnset,
        OverlayPlay,
        QueryScreen,
        RotatorStart,
        RotatorFinish,
        RotatorRotate,
    }

    /// Everything the transport was asked to do, in order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Recorded {
        Open(String),
        Close(RawFd),
        OverlaySet(OverlayConfig),
        OverlayGet(u32),
        OverlayUnset(u32),
        OverlayPlay(OverlayData),
        QueryScreen,
        RotatorStart(RotatorConfig),
        RotatorFinish(u32),
        RotatorRotate(RotatorData),
    }

    struct ScriptState {
        next_fd: RawFd,
        screen: ScreenInfo,
        fail_open: bool,
        fail: HashSet<Op>,
        next_overlay_id: u32,
        next_rotator_session: u32,
        active_overlay: Option<OverlayConfig>,
        log: Vec<Recorded>,
    }

    /// Records every request and answers with scripted results.
    pub struct ScriptedTransport {
        state: RefCell<ScriptState>,
    }

    impl ScriptedTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(ScriptedTransport {
                state: RefCell::new(ScriptState {
                    next_fd: 3,
                    screen: ScreenInfo {
                        width: 480,
                        height: 800,
                        bits_per_pixel: 32,
                    },
                    fail_open: false,
                    fail: HashSet::new(),
                    next_overlay_id: 1,
                    next_rotator_session: 0x1000,
                    active_overlay: None,
                    log: Vec::new(),
                }),
            })
        }

        pub fn set_screen(&self, screen: ScreenInfo) {
            self.state.borrow_mut().screen = screen;
        }

        pub fn fail_open(&self, fail: bool) {
            self.state.borrow_mut().fail_open = fail;
        }

        pub fn fail_on(&self, op: Op) {
            self.state.borrow_mut().fail.insert(op);
        }

        /// Number of hardware requests issued (opens and closes excluded).
        pub fn request_count(&self) -> usize {
            self.state
                .borrow()
                .log
                .iter()
                .filter(|r| !matches!(r, Recorded::Open(_) | Recorded::Close(_)))
                .count()
        }

        pub fn count(&self, op: Op) -> usize {
            self.state
                .borrow()
                .log
                .iter()
                .filter(|r| {
                    matches!(
                        (r, op),
                        (Recorded::OverlaySet(_), Op::OverlaySet)
                            | (Recorded::OverlayGet(_), Op::OverlayGet)
                            | (Recorded::OverlayUnset(_), Op::OverlayUnset)
                            | (Recorded::OverlayPlay(_), Op::OverlayPlay)
                            | (Recorded::QueryScreen, Op::QueryScreen)
                            | (Recorded::RotatorStart(_), Op::RotatorStart)
                            | (Recorded::RotatorFinish(_), Op::RotatorFinish)
                            | (Recorded::RotatorRotate(_), Op::RotatorRotate)
                    )
                })
                .count()
        }

        pub fn log(&self) -> Vec<Recorded> {
            self.state.borrow().log.clone()
        }

        /// The overlay configuration as last accepted by OverlaySet.
        pub fn active_overlay(&self) -> Option<OverlayConfig> {
            self.state.borrow().active_overlay
        }

        pub fn last_play(&self) -> Option<OverlayData> {
            self.state.borrow().log.iter().rev().find_map(|r| match r {
                Recorded::OverlayPlay(d) => Some(*d),
                _ => None,
            })
        }

        pub fn closed_fds(&self) -> Vec<RawFd> {
            self.state
                .borrow()
                .log
                .iter()
                .filter_map(|r| match r {
                    Recorded::Close(fd) => Some(*fd),
                    _ => None,
                })
                .collect()
        }
    }

    impl DeviceTransport for ScriptedTransport {
        fn open(&self, path: &str) -> Result<RawFd> {
            let mut state = self.state.borrow_mut();
            if state.fail_open {
                return Err(Error::OpenFailed(path.into(), "scripted failure".into()));
            }
            let fd = state.next_fd;
            state.next_fd += 1;
            state.log.push(Recorded::Open(path.into()));
            Ok(fd)
        }

        fn request(&self, _fd: RawFd, request: DeviceRequest<'_>) -> Result<()> {
            let mut state = self.state.borrow_mut();
            let (op, record) = match &request {
                DeviceRequest::OverlaySet(c) => (Op::OverlaySet, Recorded::OverlaySet(**c)),
                DeviceRequest::OverlayGet(c) => (Op::OverlayGet, Recorded::OverlayGet(c.id)),
                DeviceRequest::OverlayUnset(id) => (Op::OverlayUnset, Recorded::OverlayUnset(*id)),
                DeviceRequest::OverlayPlay(d) => (Op::OverlayPlay, Recorded::OverlayPlay(**d)),
                DeviceRequest::QueryScreen(_) => (Op::QueryScreen, Recorded::QueryScreen),
                DeviceRequest::RotatorStart(c) => (Op::RotatorStart, Recorded::RotatorStart(**c)),
                DeviceRequest::RotatorFinish(id) => {
                    (Op::RotatorFinish, Recorded::RotatorFinish(*id))
                }
                DeviceRequest::RotatorRotate(d) => (Op::RotatorRotate, Recorded::RotatorRotate(**d)),
            };
            state.log.push(record);
            if state.fail.contains(&op) {
                return Err(Error::InvalidConfig("scripted failure".into()));
            }
            match request {
                DeviceRequest::OverlaySet(config) => {
                    if config.id == MSMFB_NEW_REQUEST {
                        config.id = state.next_overlay_id;
                        state.next_overlay_id += 1;
                    }
                    state.active_overlay = Some(*config);
                }
                DeviceRequest::OverlayGet(config) => match state.active_overlay {
                    Some(active) if active.id == config.id => *config = active,
                    _ => return Err(Error::InvalidConfig("no active overlay".into())),
                },
                DeviceRequest::OverlayUnset(_) => {
                    state.active_overlay = None;
                }
                DeviceRequest::QueryScreen(info) => {
                    *info = state.screen;
                }
                DeviceRequest::RotatorStart(config) => {
                    config.session_id = state.next_rotator_session;
                    state.next_rotator_session += 1;
                }
                _ => {}
            }
            Ok(())
        }

        fn close(&self, fd: RawFd) {
            self.state.borrow_mut().log.push(Recorded::Close(fd));
        }
    }

    /// Counting allocator double; hands out a fixed memory id.
    pub struct TestAllocator {
        state: RefCell<AllocState>,
    }

    struct AllocState {
        fail: bool,
        allocated: usize,
        freed: usize,
    }

    pub const TEST_RING_MEMORY_ID: i32 = 77;

    impl TestAllocator {
        pub fn new() -> Arc<Self> {
            Arc::new(TestAllocator {
                state: RefCell::new(AllocState {
                    fail: false,
                    allocated: 0,
                    freed: 0,
                }),
            })
        }

        pub fn fail_next(&self, fail: bool) {
            self.state.borrow_mut().fail = fail;
        }

        pub fn allocated(&self) -> usize {
            self.state.borrow().allocated
        }

        pub fn freed(&self) -> usize {
            self.state.borrow().freed
        }
    }

    impl Allocator for TestAllocator {
        fn allocate(&self, size: usize, _align: usize, _usage: u32) -> Result<Allocation> {
            let mut state = self.state.borrow_mut();
            if state.fail {
                return Err(Error::OutOfMemory("scripted failure".into()));
            }
            state.allocated += 1;
            Ok(Allocation {
                memory_id: TEST_RING_MEMORY_ID,
                base: 0x4000_0000,
                size,
                kind: 0,
            })
        }

        fn free(&self, _allocation: &Allocation) {
            self.state.borrow_mut().freed += 1;
        }
    }
}

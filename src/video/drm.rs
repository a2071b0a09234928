mod sys;

use {
    crate::{
        utils::{errorfmt::ErrorFmt, oserror::OsError},
        video::drm::sys::{
            DRM_DISPLAY_MODE_LEN, DRM_MODE_OBJECT_BLOB, DRM_MODE_OBJECT_CONNECTOR,
            DRM_MODE_OBJECT_CRTC, DRM_MODE_OBJECT_ENCODER, DRM_MODE_OBJECT_FB,
            DRM_MODE_OBJECT_MODE, DRM_MODE_OBJECT_PLANE, DRM_MODE_OBJECT_PROPERTY, drm_event,
            drm_event_vblank, get_cap, mode_addfb2, mode_atomic, mode_create_blob,
            mode_create_dumb, mode_destroy_blob, mode_destroy_dumb, mode_get_resources,
            mode_getconnector, mode_getcrtc, mode_getencoder, mode_getplane,
            mode_getplaneresources, mode_getpropblob, mode_getproperty, mode_map_dumb,
            mode_obj_getproperties, mode_rmfb, mode_setcrtc, set_client_cap,
        },
    },
    bstr::{BString, ByteSlice},
    std::{
        fmt::{Debug, Display, Formatter},
        rc::Rc,
        time::Duration,
    },
    thiserror::Error,
    uapi::{OwnedFd, c},
};

pub use sys::{
    CONNECTOR_STATUS_CONNECTED, DRM_CAP_CURSOR_HEIGHT, DRM_CAP_CURSOR_WIDTH, DRM_CAP_DUMB_BUFFER,
    DRM_CLIENT_CAP_ATOMIC, DRM_CLIENT_CAP_UNIVERSAL_PLANES, DRM_EVENT_FLIP_COMPLETE,
    DRM_MODE_ATOMIC_ALLOW_MODESET, DRM_MODE_ATOMIC_NONBLOCK, DRM_MODE_ATOMIC_TEST_ONLY,
    DRM_MODE_CONNECTOR_HDMIA, DRM_MODE_CONNECTOR_WRITEBACK,
    DRM_MODE_PAGE_FLIP_EVENT, DRM_MODE_TYPE_PREFERRED, drm_mode_modeinfo,
};

#[derive(Debug, Error)]
pub enum DrmError {
    #[error("Could not open the drm device {0}")]
    Open(BString, #[source] OsError),
    #[error("Could not perform drm property ioctl")]
    GetProperty(#[source] OsError),
    #[error("Could not perform drm getencoder ioctl")]
    GetEncoder(#[source] OsError),
    #[error("Could not perform drm getresources ioctl")]
    GetResources(#[source] OsError),
    #[error("Could not perform drm getplaneresources ioctl")]
    GetPlaneResources(#[source] OsError),
    #[error("Could not perform drm getplane ioctl")]
    GetPlane(#[source] OsError),
    #[error("Could not perform drm getcrtc ioctl")]
    GetCrtc(#[source] OsError),
    #[error("Could not perform drm setcrtc ioctl")]
    SetCrtc(#[source] OsError),
    #[error("Could not create a blob")]
    CreateBlob(#[source] OsError),
    #[error("Could not destroy a blob")]
    DestroyBlob(#[source] OsError),
    #[error("Could not perform drm getconnector ioctl")]
    GetConnector(#[source] OsError),
    #[error("Could not perform drm getpropblob ioctl")]
    GetPropBlob(#[source] OsError),
    #[error("Property has a size that is not a multiple of the vector type")]
    UnalignedPropSize,
    #[error("Could not perform drm properties ioctl")]
    GetProperties(#[source] OsError),
    #[error("Could not perform drm atomic ioctl")]
    Atomic(#[source] OsError),
    #[error("Drm property has an unknown type {0}")]
    UnknownPropertyType(u32),
    #[error("Range property does not have exactly two values")]
    RangeValues,
    #[error("Object property does not have exactly one value")]
    ObjectValues,
    #[error("Could not create a dumb buffer")]
    CreateDumb(#[source] OsError),
    #[error("Could not map a dumb buffer")]
    MapDumb(#[source] OsError),
    #[error("Could not destroy a dumb buffer")]
    DestroyDumb(#[source] OsError),
    #[error("Could not create a framebuffer")]
    AddFb(#[source] OsError),
    #[error("Could not remove a framebuffer")]
    RmFb(#[source] OsError),
    #[error("Could not poll the drm fd")]
    Poll(#[source] OsError),
    #[error("Could not read events from the drm fd")]
    ReadEvents(#[source] OsError),
    #[error("Read invalid data from drm device")]
    InvalidRead,
}

/// The operations the display pipeline needs from a kernel display device.
pub trait DrmInterface {
    fn raw(&self) -> c::c_int;

    fn set_client_cap(&self, cap: u64, value: u64) -> Result<(), OsError>;

    fn get_cap(&self, cap: u64) -> Result<u64, OsError>;

    fn get_resources(&self) -> Result<DrmCardResources, DrmError>;

    fn get_planes(&self) -> Result<Vec<DrmPlane>, DrmError>;

    fn get_plane_info(&self, plane: DrmPlane) -> Result<DrmPlaneInfo, DrmError>;

    fn get_encoder_info(&self, encoder: DrmEncoder) -> Result<DrmEncoderInfo, DrmError>;

    fn get_connector_info(&self, connector: DrmConnector) -> Result<DrmConnectorInfo, DrmError>;

    /// Reads the legacy (non-atomic) configuration of a CRTC.
    fn get_crtc_info(&self, crtc: DrmCrtc) -> Result<DrmCrtcInfo, DrmError>;

    /// Applies a legacy (non-atomic) configuration to a CRTC.
    fn set_crtc(&self, info: &DrmCrtcInfo, connectors: &[DrmConnector]) -> Result<(), DrmError>;

    fn get_object_properties(
        &self,
        obj_id: u32,
        obj_type: u32,
    ) -> Result<Vec<DrmPropertyValue>, DrmError>;

    fn get_property(&self, prop: DrmProperty) -> Result<DrmPropertyDefinition, DrmError>;

    fn create_blob(&self, data: &[u8]) -> Result<DrmBlob, DrmError>;

    fn destroy_blob(&self, blob: DrmBlob) -> Result<(), DrmError>;

    fn get_blob(&self, blob: DrmBlob) -> Result<Vec<u8>, DrmError>;

    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: u32,
        user_data: u64,
    ) -> Result<(), DrmError>;

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DrmDumbBuffer, DrmError>;

    /// Returns the offset at which the dumb buffer can be mapped through the device fd.
    fn map_dumb(&self, handle: u32) -> Result<u64, DrmError>;

    fn destroy_dumb(&self, handle: u32) -> Result<(), DrmError>;

    fn add_fb(
        &self,
        width: u32,
        height: u32,
        format: u32,
        handle: u32,
        pitch: u32,
    ) -> Result<DrmFb, DrmError>;

    fn rm_fb(&self, fb: DrmFb) -> Result<(), DrmError>;

    /// Waits until events can be read. `None` blocks indefinitely.
    fn wait_events(&self, timeout: Option<Duration>) -> Result<bool, DrmError>;

    fn read_events(&self) -> Result<Vec<DrmEvent>, DrmError>;
}

impl<'a> dyn DrmInterface + 'a {
    pub fn get_properties<T: DrmObject>(&self, t: T) -> Result<Vec<DrmPropertyValue>, DrmError> {
        self.get_object_properties(t.id(), T::TYPE)
    }

    pub fn get_cursor_size(&self) -> Result<(u64, u64), OsError> {
        let width = self.get_cap(DRM_CAP_CURSOR_WIDTH)?;
        let height = self.get_cap(DRM_CAP_CURSOR_HEIGHT)?;
        Ok((width, height))
    }

    pub fn get_blob_vec<T: uapi::Pod>(&self, blob: DrmBlob) -> Result<Vec<T>, DrmError> {
        let bytes = self.get_blob(blob)?;
        if bytes.len() % size_of::<T>() != 0 {
            return Err(DrmError::UnalignedPropSize);
        }
        match uapi::pod_iter::<T, _>(&bytes[..]) {
            Ok(iter) => Ok(iter.collect()),
            Err(_) => Err(DrmError::UnalignedPropSize),
        }
    }
}

/// A DRM device node opened as the display master.
pub struct DrmMaster {
    fd: OwnedFd,
    path: BString,
}

impl Debug for DrmMaster {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.path, self.fd.raw())
    }
}

impl DrmMaster {
    pub fn open(path: &str) -> Result<Self, DrmError> {
        match uapi::open(path, c::O_RDWR | c::O_NONBLOCK | c::O_CLOEXEC, 0) {
            Ok(fd) => Ok(Self {
                fd,
                path: path.into(),
            }),
            Err(e) => Err(DrmError::Open(path.into(), e.into())),
        }
    }
}

impl DrmInterface for DrmMaster {
    fn raw(&self) -> c::c_int {
        self.fd.raw()
    }

    fn set_client_cap(&self, cap: u64, value: u64) -> Result<(), OsError> {
        set_client_cap(self.raw(), cap, value)
    }

    fn get_cap(&self, cap: u64) -> Result<u64, OsError> {
        get_cap(self.raw(), cap)
    }

    fn get_resources(&self) -> Result<DrmCardResources, DrmError> {
        mode_get_resources(self.raw())
    }

    fn get_planes(&self) -> Result<Vec<DrmPlane>, DrmError> {
        mode_getplaneresources(self.raw())
    }

    fn get_plane_info(&self, plane: DrmPlane) -> Result<DrmPlaneInfo, DrmError> {
        mode_getplane(self.raw(), plane.0)
    }

    fn get_encoder_info(&self, encoder: DrmEncoder) -> Result<DrmEncoderInfo, DrmError> {
        mode_getencoder(self.raw(), encoder.0)
    }

    fn get_connector_info(&self, connector: DrmConnector) -> Result<DrmConnectorInfo, DrmError> {
        mode_getconnector(self.raw(), connector.0)
    }

    fn get_crtc_info(&self, crtc: DrmCrtc) -> Result<DrmCrtcInfo, DrmError> {
        mode_getcrtc(self.raw(), crtc)
    }

    fn set_crtc(&self, info: &DrmCrtcInfo, connectors: &[DrmConnector]) -> Result<(), DrmError> {
        mode_setcrtc(self.raw(), info, connectors)
    }

    fn get_object_properties(
        &self,
        obj_id: u32,
        obj_type: u32,
    ) -> Result<Vec<DrmPropertyValue>, DrmError> {
        mode_obj_getproperties(self.raw(), obj_id, obj_type)
    }

    fn get_property(&self, prop: DrmProperty) -> Result<DrmPropertyDefinition, DrmError> {
        mode_getproperty(self.raw(), prop)
    }

    fn create_blob(&self, data: &[u8]) -> Result<DrmBlob, DrmError> {
        mode_create_blob(self.raw(), data).map_err(DrmError::CreateBlob)
    }

    fn destroy_blob(&self, blob: DrmBlob) -> Result<(), DrmError> {
        mode_destroy_blob(self.raw(), blob).map_err(DrmError::DestroyBlob)
    }

    fn get_blob(&self, blob: DrmBlob) -> Result<Vec<u8>, DrmError> {
        let mut buf = vec![];
        loop {
            match mode_getpropblob(self.raw(), blob.0, &mut buf) {
                Err(e) => return Err(DrmError::GetPropBlob(e)),
                Ok(n) if n <= buf.len() => {
                    buf.truncate(n);
                    return Ok(buf);
                }
                Ok(n) => buf.resize(n, 0),
            }
        }
    }

    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: u32,
        user_data: u64,
    ) -> Result<(), DrmError> {
        mode_atomic(
            self.raw(),
            flags,
            &request.objects,
            &request.object_lengths,
            &request.props,
            &request.values,
            user_data,
        )
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DrmDumbBuffer, DrmError> {
        mode_create_dumb(self.raw(), width, height, bpp).map_err(DrmError::CreateDumb)
    }

    fn map_dumb(&self, handle: u32) -> Result<u64, DrmError> {
        mode_map_dumb(self.raw(), handle).map_err(DrmError::MapDumb)
    }

    fn destroy_dumb(&self, handle: u32) -> Result<(), DrmError> {
        mode_destroy_dumb(self.raw(), handle).map_err(DrmError::DestroyDumb)
    }

    fn add_fb(
        &self,
        width: u32,
        height: u32,
        format: u32,
        handle: u32,
        pitch: u32,
    ) -> Result<DrmFb, DrmError> {
        mode_addfb2(self.raw(), width, height, format, handle, pitch).map_err(DrmError::AddFb)
    }

    fn rm_fb(&self, fb: DrmFb) -> Result<(), DrmError> {
        mode_rmfb(self.raw(), fb).map_err(DrmError::RmFb)
    }

    fn wait_events(&self, timeout: Option<Duration>) -> Result<bool, DrmError> {
        poll_readable(self.raw(), timeout).map_err(DrmError::Poll)
    }

    fn read_events(&self) -> Result<Vec<DrmEvent>, DrmError> {
        let mut buf = [0u8; 1024];
        match uapi::read(self.raw(), &mut buf[..]) {
            Ok(buf) => parse_events(buf),
            Err(uapi::Errno(c::EAGAIN)) => Ok(vec![]),
            Err(e) => Err(DrmError::ReadEvents(e.into())),
        }
    }
}

/// Polls `fd` for readability. Returns `false` if the timeout expired.
pub fn poll_readable(fd: c::c_int, timeout: Option<Duration>) -> Result<bool, OsError> {
    let timeout = match timeout {
        Some(t) => t.as_millis().min(c::c_int::MAX as u128) as c::c_int,
        None => -1,
    };
    let mut pollfd = [c::pollfd {
        fd,
        events: c::POLLIN,
        revents: 0,
    }];
    loop {
        match uapi::poll(&mut pollfd, timeout) {
            Ok(n) => return Ok(n > 0),
            Err(uapi::Errno(c::EINTR)) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Decodes the events contained in a buffer read from the device fd.
pub fn parse_events(mut buf: &[u8]) -> Result<Vec<DrmEvent>, DrmError> {
    let mut events = vec![];
    while buf.len() > 0 {
        let header: drm_event = match uapi::pod_read_init(buf) {
            Ok(e) => e,
            _ => return Err(DrmError::InvalidRead),
        };
        let len = header.length as usize;
        if len < size_of::<drm_event>() || len > buf.len() {
            return Err(DrmError::InvalidRead);
        }
        if header.ty == DRM_EVENT_FLIP_COMPLETE {
            let event: drm_event_vblank = match uapi::pod_read_init(buf) {
                Ok(e) => e,
                _ => return Err(DrmError::InvalidRead),
            };
            events.push(DrmEvent::FlipComplete {
                user_data: event.user_data,
                tv_sec: event.tv_sec,
                tv_usec: event.tv_usec,
                sequence: event.sequence,
                crtc_id: DrmCrtc(event.crtc_id),
            });
        }
        buf = &buf[len..];
    }
    Ok(events)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DrmEvent {
    FlipComplete {
        user_data: u64,
        tv_sec: u32,
        tv_usec: u32,
        sequence: u32,
        crtc_id: DrmCrtc,
    },
}

#[derive(Debug)]
pub struct DrmPropertyDefinition {
    pub id: DrmProperty,
    pub name: BString,
    pub immutable: bool,
    pub atomic: bool,
    pub ty: DrmPropertyType,
}

#[derive(Debug, Clone)]
pub enum DrmPropertyType {
    Range {
        min: u64,
        max: u64,
    },
    SignedRange {
        min: i64,
        max: i64,
    },
    Object {
        ty: u32,
    },
    Blob,
    Enum {
        values: Vec<DrmPropertyEnumValue>,
        bitmask: bool,
    },
}

impl DrmPropertyType {
    /// Looks up the name of an enum value.
    pub fn enum_name(&self, value: u64) -> Option<&BString> {
        match self {
            DrmPropertyType::Enum {
                values,
                bitmask: false,
            } => values.iter().find(|v| v.value == value).map(|v| &v.name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrmPropertyEnumValue {
    pub value: u64,
    pub name: BString,
}

#[derive(Debug, Copy, Clone)]
pub struct DrmPropertyValue {
    pub id: DrmProperty,
    pub value: u64,
}

pub trait DrmObject: Copy + Debug {
    const TYPE: u32;
    const NONE: Self;
    fn id(&self) -> u32;
    fn is_some(&self) -> bool;
    fn is_none(&self) -> bool;
}

macro_rules! drm_obj {
    ($name:ident, $ty:expr) => {
        #[repr(transparent)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
        pub struct $name(pub u32);

        impl DrmObject for $name {
            const TYPE: u32 = $ty;
            const NONE: Self = Self(0);

            fn id(&self) -> u32 {
                self.0
            }

            fn is_some(&self) -> bool {
                self.0 != 0
            }

            fn is_none(&self) -> bool {
                self.0 == 0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }
    };
}
drm_obj!(DrmCrtc, DRM_MODE_OBJECT_CRTC);
drm_obj!(DrmConnector, DRM_MODE_OBJECT_CONNECTOR);
drm_obj!(DrmEncoder, DRM_MODE_OBJECT_ENCODER);
drm_obj!(DrmMode, DRM_MODE_OBJECT_MODE);
drm_obj!(DrmProperty, DRM_MODE_OBJECT_PROPERTY);
drm_obj!(DrmFb, DRM_MODE_OBJECT_FB);
drm_obj!(DrmBlob, DRM_MODE_OBJECT_BLOB);
drm_obj!(DrmPlane, DRM_MODE_OBJECT_PLANE);

#[derive(Debug, Clone, Default)]
pub struct DrmCardResources {
    pub crtcs: Vec<DrmCrtc>,
    pub connectors: Vec<DrmConnector>,
    pub encoders: Vec<DrmEncoder>,
}

#[derive(Debug, Clone, Default)]
pub struct DrmPlaneInfo {
    pub possible_crtcs: u32,
    pub format_types: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct DrmEncoderInfo {
    pub possible_crtcs: u32,
}

/// The legacy configuration of a CRTC as reported by GETCRTC.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DrmCrtcInfo {
    pub crtc_id: DrmCrtc,
    pub fb_id: DrmFb,
    pub x: u32,
    pub y: u32,
    pub mode: Option<DrmModeInfo>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrmDumbBuffer {
    pub handle: u32,
    pub pitch: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct DrmModeInfo {
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,

    pub vrefresh: u32,

    pub flags: u32,
    pub ty: u32,
    pub name: BString,
}

impl DrmModeInfo {
    pub fn to_raw(&self) -> drm_mode_modeinfo {
        let mut name = [0u8; DRM_DISPLAY_MODE_LEN];
        let len = name.len().min(self.name.len());
        name[..len].copy_from_slice(&self.name.as_bytes()[..len]);
        drm_mode_modeinfo {
            clock: self.clock,
            hdisplay: self.hdisplay,
            hsync_start: self.hsync_start,
            hsync_end: self.hsync_end,
            htotal: self.htotal,
            hskew: self.hskew,
            vdisplay: self.vdisplay,
            vsync_start: self.vsync_start,
            vsync_end: self.vsync_end,
            vtotal: self.vtotal,
            vscan: self.vscan,
            vrefresh: self.vrefresh,
            flags: self.flags,
            ty: self.ty,
            name,
        }
    }

    /// Decodes a mode from the contents of a MODE_ID blob.
    pub fn from_blob(data: &[u8]) -> Option<Self> {
        if data.len() != size_of::<drm_mode_modeinfo>() {
            return None;
        }
        let raw: drm_mode_modeinfo = uapi::pod_read_init(data).ok()?;
        Some(raw.into())
    }

    pub fn is_preferred(&self) -> bool {
        self.ty & DRM_MODE_TYPE_PREFERRED != 0
    }

    pub fn refresh_rate_millihz(&self) -> u32 {
        let clock_millihz = self.clock as u64 * 1_000_000;
        let htotal = self.htotal as u64;
        let vtotal = self.vtotal as u64;
        if htotal == 0 || vtotal == 0 {
            return 0;
        }
        (((clock_millihz / htotal) + (vtotal / 2)) / vtotal) as u32
    }
}

impl Display for DrmModeInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mhz = self.refresh_rate_millihz();
        write!(
            f,
            "{}x{}@{}.{:03}",
            self.hdisplay,
            self.vdisplay,
            mhz / 1000,
            mhz % 1000
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DrmConnectorInfo {
    pub encoders: Vec<DrmEncoder>,
    pub modes: Vec<DrmModeInfo>,

    pub connector_type: u32,
    pub connector_type_id: u32,

    pub connection: u32,
    pub mm_width: u32,
    pub mm_height: u32,
}

/// A list of (object, property, value) writes submitted in one atomic commit.
#[derive(Default, Debug)]
pub struct AtomicRequest {
    objects: Vec<u32>,
    object_lengths: Vec<u32>,
    props: Vec<u32>,
    values: Vec<u64>,
}

/// A position in an [`AtomicRequest`] that the request can be truncated back to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AtomicCursor {
    objects: usize,
    props: usize,
    last_length: Option<u32>,
}

pub struct ObjectChange<'a> {
    obj: u32,
    change: &'a mut AtomicRequest,
}

impl AtomicRequest {
    pub fn cursor(&self) -> AtomicCursor {
        AtomicCursor {
            objects: self.objects.len(),
            props: self.props.len(),
            last_length: self.object_lengths.last().copied(),
        }
    }

    pub fn set_cursor(&mut self, cursor: AtomicCursor) {
        self.objects.truncate(cursor.objects);
        self.object_lengths.truncate(cursor.objects);
        self.props.truncate(cursor.props);
        self.values.truncate(cursor.props);
        if let (Some(len), Some(last)) = (cursor.last_length, self.object_lengths.last_mut()) {
            *last = len;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn change_object<T, F>(&mut self, obj: T, f: F)
    where
        T: DrmObject,
        F: FnOnce(&mut ObjectChange),
    {
        let old_len = self.props.len();
        let mut oc = ObjectChange {
            obj: obj.id(),
            change: self,
        };
        f(&mut oc);
        if self.props.len() > old_len {
            let new = (self.props.len() - old_len) as u32;
            match (self.objects.last(), self.object_lengths.last_mut()) {
                (Some(&last), Some(len)) if last == obj.id() => *len += new,
                _ => {
                    self.objects.push(obj.id());
                    self.object_lengths.push(new);
                }
            }
        }
    }

    /// Iterates over the (object, property, value) writes in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, DrmProperty, u64)> + '_ {
        let mut props = self.props.iter().zip(self.values.iter());
        self.objects
            .iter()
            .zip(self.object_lengths.iter())
            .flat_map(move |(&obj, &len)| {
                props
                    .by_ref()
                    .take(len as usize)
                    .map(move |(&p, &v)| (obj, DrmProperty(p), v))
                    .collect::<Vec<_>>()
            })
    }
}

impl<'a> ObjectChange<'a> {
    pub fn change(&mut self, property_id: DrmProperty, value: u64) {
        log::trace!("object {}: property {} = {}", self.obj, property_id, value);
        self.change.props.push(property_id.0);
        self.change.values.push(value);
    }
}

#[expect(non_camel_case_types)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConnectorType {
    Unknown(u32),
    VGA,
    DVII,
    DVID,
    DVIA,
    Composite,
    SVIDEO,
    LVDS,
    Component,
    _9PinDIN,
    DisplayPort,
    HDMIA,
    HDMIB,
    TV,
    eDP,
    VIRTUAL,
    DSI,
    DPI,
    WRITEBACK,
    SPI,
    USB,
}

impl ConnectorType {
    pub fn from_drm(v: u32) -> Self {
        match v {
            sys::DRM_MODE_CONNECTOR_VGA => Self::VGA,
            sys::DRM_MODE_CONNECTOR_DVII => Self::DVII,
            sys::DRM_MODE_CONNECTOR_DVID => Self::DVID,
            sys::DRM_MODE_CONNECTOR_DVIA => Self::DVIA,
            sys::DRM_MODE_CONNECTOR_Composite => Self::Composite,
            sys::DRM_MODE_CONNECTOR_SVIDEO => Self::SVIDEO,
            sys::DRM_MODE_CONNECTOR_LVDS => Self::LVDS,
            sys::DRM_MODE_CONNECTOR_Component => Self::Component,
            sys::DRM_MODE_CONNECTOR_9PinDIN => Self::_9PinDIN,
            sys::DRM_MODE_CONNECTOR_DisplayPort => Self::DisplayPort,
            sys::DRM_MODE_CONNECTOR_HDMIA => Self::HDMIA,
            sys::DRM_MODE_CONNECTOR_HDMIB => Self::HDMIB,
            sys::DRM_MODE_CONNECTOR_TV => Self::TV,
            sys::DRM_MODE_CONNECTOR_eDP => Self::eDP,
            sys::DRM_MODE_CONNECTOR_VIRTUAL => Self::VIRTUAL,
            sys::DRM_MODE_CONNECTOR_DSI => Self::DSI,
            sys::DRM_MODE_CONNECTOR_DPI => Self::DPI,
            sys::DRM_MODE_CONNECTOR_WRITEBACK => Self::WRITEBACK,
            sys::DRM_MODE_CONNECTOR_SPI => Self::SPI,
            sys::DRM_MODE_CONNECTOR_USB => Self::USB,
            _ => Self::Unknown(v),
        }
    }
}

impl Display for ConnectorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown(n) => return write!(f, "Unknown({})", n),
            Self::VGA => "VGA",
            Self::DVII => "DVI-I",
            Self::DVID => "DVI-D",
            Self::DVIA => "DVI-A",
            Self::Composite => "Composite",
            Self::SVIDEO => "SVIDEO",
            Self::LVDS => "LVDS",
            Self::Component => "Component",
            Self::_9PinDIN => "DIN",
            Self::DisplayPort => "DP",
            Self::HDMIA => "HDMI-A",
            Self::HDMIB => "HDMI-B",
            Self::TV => "TV",
            Self::eDP => "eDP",
            Self::VIRTUAL => "Virtual",
            Self::DSI => "DSI",
            Self::DPI => "DPI",
            Self::WRITEBACK => "Writeback",
            Self::SPI => "SPI",
            Self::USB => "USB",
        };
        f.write_str(s)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConnectorStatus {
    Connected,
    Disconnected,
    Unknown,
    Other(u32),
}

impl ConnectorStatus {
    pub fn from_drm(v: u32) -> Self {
        match v {
            sys::CONNECTOR_STATUS_CONNECTED => Self::Connected,
            sys::CONNECTOR_STATUS_DISCONNECTED => Self::Disconnected,
            sys::CONNECTOR_STATUS_UNKNOWN => Self::Unknown,
            _ => Self::Other(v),
        }
    }
}

/// A property blob created by this process. Destroyed on drop.
pub struct PropBlob {
    drm: Rc<dyn DrmInterface>,
    id: DrmBlob,
}

impl Debug for PropBlob {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropBlob").field("id", &self.id).finish()
    }
}

impl PropBlob {
    pub fn new(drm: &Rc<dyn DrmInterface>, data: &[u8]) -> Result<Self, DrmError> {
        let id = drm.create_blob(data)?;
        Ok(Self {
            drm: drm.clone(),
            id,
        })
    }

    pub fn id(&self) -> DrmBlob {
        self.id
    }
}

impl Drop for PropBlob {
    fn drop(&mut self) {
        if let Err(e) = self.drm.destroy_blob(self.id) {
            log::error!("Could not destroy blob: {}", ErrorFmt(e));
        }
    }
}

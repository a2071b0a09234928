use {
    crate::{
        utils::oserror::OsError,
        video::drm::{
            AtomicRequest, DRM_CAP_DUMB_BUFFER, DRM_MODE_ATOMIC_TEST_ONLY,
            DRM_MODE_PAGE_FLIP_EVENT, DrmBlob, DrmCardResources, DrmConnector, DrmConnectorInfo,
            DrmCrtc, DrmCrtcInfo, DrmDumbBuffer, DrmEncoder, DrmEncoderInfo, DrmError, DrmEvent,
            DrmFb, DrmInterface, DrmObject, DrmPlane, DrmPlaneInfo, DrmProperty,
            DrmPropertyDefinition, DrmPropertyEnumValue, DrmPropertyType, DrmPropertyValue,
        },
    },
    ahash::AHashMap,
    bstr::BString,
    std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        rc::Rc,
        time::Duration,
    },
    uapi::c,
};

pub const PLANE_TYPE_OVERLAY: u64 = 0;
pub const PLANE_TYPE_PRIMARY: u64 = 1;
pub const PLANE_TYPE_CURSOR: u64 = 2;

#[derive(Clone, Debug)]
pub struct Commit {
    pub flags: u32,
    pub user_data: u64,
    pub writes: Vec<(u32, DrmProperty, u64)>,
}

impl Commit {
    pub fn value(&self, obj: impl DrmObject, name: &str, kernel: &TestKernel) -> Option<u64> {
        let prop = kernel.prop_id(name);
        self.writes
            .iter()
            .find(|w| w.0 == obj.id() && w.1 == prop)
            .map(|w| w.2)
    }

    pub fn objects(&self) -> Vec<u32> {
        let mut objects: Vec<_> = self.writes.iter().map(|w| w.0).collect();
        objects.dedup();
        objects
    }
}

/// An in-memory display device.
#[derive(Default)]
pub struct TestKernel {
    next_id: Cell<u32>,
    pub resources: RefCell<DrmCardResources>,
    pub planes: RefCell<Vec<(DrmPlane, DrmPlaneInfo)>>,
    pub encoders: RefCell<AHashMap<DrmEncoder, DrmEncoderInfo>>,
    pub connectors: RefCell<AHashMap<DrmConnector, DrmConnectorInfo>>,
    pub legacy_crtcs: RefCell<AHashMap<DrmCrtc, DrmCrtcInfo>>,
    pub caps: RefCell<AHashMap<u64, u64>>,
    pub refuse_client_caps: Cell<bool>,
    prop_names: RefCell<AHashMap<BString, DrmProperty>>,
    prop_types: RefCell<AHashMap<DrmProperty, DrmPropertyType>>,
    object_props: RefCell<AHashMap<u32, Vec<DrmPropertyValue>>>,
    pub blobs: RefCell<AHashMap<DrmBlob, Vec<u8>>>,
    pub blobs_created: Cell<usize>,
    pub blobs_destroyed: RefCell<Vec<DrmBlob>>,
    pub commits: RefCell<Vec<Commit>>,
    pub reject_next_commit: Cell<bool>,
    pub legacy_restores: RefCell<Vec<(DrmCrtcInfo, Vec<DrmConnector>)>>,
    pub events: RefCell<VecDeque<DrmEvent>>,
    pub dumb_buffers: RefCell<Vec<u32>>,
    pub fbs: RefCell<Vec<DrmFb>>,
    /// Runs at the end of every accepted commit that is not test-only.
    pub commit_hook: RefCell<Option<Box<dyn FnMut()>>>,
}

impl TestKernel {
    pub fn new() -> Rc<Self> {
        let kernel = Self {
            next_id: Cell::new(100),
            ..Default::default()
        };
        kernel.caps.borrow_mut().insert(DRM_CAP_DUMB_BUFFER, 1);
        kernel.define_enum(
            "type",
            &[
                (PLANE_TYPE_OVERLAY, "Overlay"),
                (PLANE_TYPE_PRIMARY, "Primary"),
                (PLANE_TYPE_CURSOR, "Cursor"),
            ],
        );
        Rc::new(kernel)
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Returns the id of the property called `name`, defining it as a range property if necessary.
    pub fn prop_id(&self, name: &str) -> DrmProperty {
        if let Some(id) = self.prop_names.borrow().get(&BString::from(name)) {
            return *id;
        }
        let id = DrmProperty(self.next_id());
        self.prop_names.borrow_mut().insert(name.into(), id);
        self.prop_types.borrow_mut().insert(
            id,
            DrmPropertyType::Range {
                min: 0,
                max: u64::MAX,
            },
        );
        id
    }

    pub fn define_enum(&self, name: &str, values: &[(u64, &str)]) {
        let id = self.prop_id(name);
        let values = values
            .iter()
            .map(|&(value, name)| DrmPropertyEnumValue {
                value,
                name: name.into(),
            })
            .collect();
        self.prop_types.borrow_mut().insert(
            id,
            DrmPropertyType::Enum {
                values,
                bitmask: false,
            },
        );
    }

    pub fn set_prop(&self, obj: impl DrmObject, name: &str, value: u64) {
        let id = self.prop_id(name);
        let mut props = self.object_props.borrow_mut();
        let props = props.entry(obj.id()).or_default();
        match props.iter_mut().find(|p| p.id == id) {
            Some(p) => p.value = value,
            None => props.push(DrmPropertyValue { id, value }),
        }
    }

    pub fn add_crtc(&self) -> DrmCrtc {
        let crtc = DrmCrtc(self.next_id());
        self.resources.borrow_mut().crtcs.push(crtc);
        self.set_prop(crtc, "ACTIVE", 0);
        self.set_prop(crtc, "MODE_ID", 0);
        crtc
    }

    pub fn add_encoder(&self, possible_crtcs: u32) -> DrmEncoder {
        let encoder = DrmEncoder(self.next_id());
        self.resources.borrow_mut().encoders.push(encoder);
        self.encoders
            .borrow_mut()
            .insert(encoder, DrmEncoderInfo { possible_crtcs });
        encoder
    }

    pub fn add_connector(&self, info: DrmConnectorInfo) -> DrmConnector {
        let connector = DrmConnector(self.next_id());
        self.resources.borrow_mut().connectors.push(connector);
        self.connectors.borrow_mut().insert(connector, info);
        self.set_prop(connector, "CRTC_ID", 0);
        connector
    }

    /// Adds the writeback properties to a connector and advertises `formats`.
    pub fn make_writeback(&self, connector: DrmConnector, formats: &[u32]) {
        let mut data = vec![];
        for format in formats {
            data.extend_from_slice(&format.to_ne_bytes());
        }
        let blob = self.insert_blob(data);
        self.set_prop(connector, "WRITEBACK_FB_ID", 0);
        self.set_prop(connector, "WRITEBACK_OUT_FENCE_PTR", 0);
        self.set_prop(connector, "WRITEBACK_PIXEL_FORMATS", blob.0 as u64);
    }

    pub fn add_plane(&self, ty: u64, possible_crtcs: u32) -> DrmPlane {
        let plane = DrmPlane(self.next_id());
        self.planes.borrow_mut().push((
            plane,
            DrmPlaneInfo {
                possible_crtcs,
                format_types: vec![crate::format::XRGB8888.drm],
            },
        ));
        self.set_prop(plane, "type", ty);
        for name in [
            "FB_ID", "CRTC_ID", "CRTC_X", "CRTC_Y", "CRTC_W", "CRTC_H", "SRC_X", "SRC_Y", "SRC_W",
            "SRC_H",
        ] {
            self.set_prop(plane, name, 0);
        }
        plane
    }

    /// Stores a blob that was created by someone else.
    pub fn insert_blob(&self, data: Vec<u8>) -> DrmBlob {
        let blob = DrmBlob(self.next_id());
        self.blobs.borrow_mut().insert(blob, data);
        blob
    }

    pub fn last_commit(&self) -> Option<Commit> {
        self.commits.borrow().last().cloned()
    }

    pub fn live_blobs(&self) -> usize {
        self.blobs.borrow().len()
    }
}

impl DrmInterface for TestKernel {
    fn raw(&self) -> c::c_int {
        -1
    }

    fn set_client_cap(&self, _cap: u64, _value: u64) -> Result<(), OsError> {
        match self.refuse_client_caps.get() {
            true => Err(OsError(c::EOPNOTSUPP)),
            false => Ok(()),
        }
    }

    fn get_cap(&self, cap: u64) -> Result<u64, OsError> {
        match self.caps.borrow().get(&cap) {
            Some(v) => Ok(*v),
            None => Err(OsError(c::EINVAL)),
        }
    }

    fn get_resources(&self) -> Result<DrmCardResources, DrmError> {
        Ok(self.resources.borrow().clone())
    }

    fn get_planes(&self) -> Result<Vec<DrmPlane>, DrmError> {
        Ok(self.planes.borrow().iter().map(|p| p.0).collect())
    }

    fn get_plane_info(&self, plane: DrmPlane) -> Result<DrmPlaneInfo, DrmError> {
        match self.planes.borrow().iter().find(|p| p.0 == plane) {
            Some(p) => Ok(p.1.clone()),
            None => Err(DrmError::GetPlane(OsError(c::ENOENT))),
        }
    }

    fn get_encoder_info(&self, encoder: DrmEncoder) -> Result<DrmEncoderInfo, DrmError> {
        match self.encoders.borrow().get(&encoder) {
            Some(e) => Ok(e.clone()),
            None => Err(DrmError::GetEncoder(OsError(c::ENOENT))),
        }
    }

    fn get_connector_info(&self, connector: DrmConnector) -> Result<DrmConnectorInfo, DrmError> {
        match self.connectors.borrow().get(&connector) {
            Some(c) => Ok(c.clone()),
            None => Err(DrmError::GetConnector(OsError(c::ENOENT))),
        }
    }

    fn get_crtc_info(&self, crtc: DrmCrtc) -> Result<DrmCrtcInfo, DrmError> {
        match self.legacy_crtcs.borrow().get(&crtc) {
            Some(c) => Ok(c.clone()),
            None => Ok(DrmCrtcInfo {
                crtc_id: crtc,
                ..Default::default()
            }),
        }
    }

    fn set_crtc(&self, info: &DrmCrtcInfo, connectors: &[DrmConnector]) -> Result<(), DrmError> {
        self.legacy_restores
            .borrow_mut()
            .push((info.clone(), connectors.to_vec()));
        Ok(())
    }

    fn get_object_properties(
        &self,
        obj_id: u32,
        _obj_type: u32,
    ) -> Result<Vec<DrmPropertyValue>, DrmError> {
        Ok(self
            .object_props
            .borrow()
            .get(&obj_id)
            .cloned()
            .unwrap_or_default())
    }

    fn get_property(&self, prop: DrmProperty) -> Result<DrmPropertyDefinition, DrmError> {
        let names = self.prop_names.borrow();
        let Some((name, _)) = names.iter().find(|(_, id)| **id == prop) else {
            return Err(DrmError::GetProperty(OsError(c::ENOENT)));
        };
        Ok(DrmPropertyDefinition {
            id: prop,
            name: name.clone(),
            immutable: false,
            atomic: true,
            ty: self.prop_types.borrow()[&prop].clone(),
        })
    }

    fn create_blob(&self, data: &[u8]) -> Result<DrmBlob, DrmError> {
        self.blobs_created.set(self.blobs_created.get() + 1);
        Ok(self.insert_blob(data.to_vec()))
    }

    fn destroy_blob(&self, blob: DrmBlob) -> Result<(), DrmError> {
        if self.blobs.borrow_mut().remove(&blob).is_none() {
            return Err(DrmError::DestroyBlob(OsError(c::ENOENT)));
        }
        self.blobs_destroyed.borrow_mut().push(blob);
        Ok(())
    }

    fn get_blob(&self, blob: DrmBlob) -> Result<Vec<u8>, DrmError> {
        match self.blobs.borrow().get(&blob) {
            Some(b) => Ok(b.clone()),
            None => Err(DrmError::GetPropBlob(OsError(c::ENOENT))),
        }
    }

    fn atomic_commit(
        &self,
        request: &AtomicRequest,
        flags: u32,
        user_data: u64,
    ) -> Result<(), DrmError> {
        let writes: Vec<_> = request.iter().collect();
        if self.reject_next_commit.replace(false) {
            return Err(DrmError::Atomic(OsError(c::EINVAL)));
        }
        self.commits.borrow_mut().push(Commit {
            flags,
            user_data,
            writes: writes.clone(),
        });
        if flags & DRM_MODE_ATOMIC_TEST_ONLY != 0 {
            return Ok(());
        }
        let fence_ptr = self.prop_id("WRITEBACK_OUT_FENCE_PTR");
        for &(obj, prop, value) in &writes {
            if prop == fence_ptr && value != 0 {
                let fd = match uapi::eventfd(1, c::EFD_CLOEXEC) {
                    Ok(fd) => fd,
                    Err(e) => return Err(DrmError::Atomic(e.into())),
                };
                unsafe {
                    *(value as usize as *mut c::c_int) = fd.unwrap();
                }
            }
            if let Some(props) = self.object_props.borrow_mut().get_mut(&obj)
                && let Some(p) = props.iter_mut().find(|p| p.id == prop)
            {
                p.value = value;
            }
        }
        if let Some(hook) = self.commit_hook.borrow_mut().as_mut() {
            hook();
        }
        if flags & DRM_MODE_PAGE_FLIP_EVENT != 0 {
            let crtc_id = self.prop_id("ACTIVE");
            let crtc = writes
                .iter()
                .find(|w| w.1 == crtc_id)
                .map(|w| DrmCrtc(w.0))
                .unwrap_or_default();
            self.events.borrow_mut().push_back(DrmEvent::FlipComplete {
                user_data,
                tv_sec: 1,
                tv_usec: 0,
                sequence: self.commits.borrow().len() as u32,
                crtc_id: crtc,
            });
        }
        Ok(())
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<DrmDumbBuffer, DrmError> {
        let handle = self.next_id();
        self.dumb_buffers.borrow_mut().push(handle);
        let pitch = width * bpp / 8;
        Ok(DrmDumbBuffer {
            handle,
            pitch,
            size: pitch as u64 * height as u64,
        })
    }

    fn map_dumb(&self, _handle: u32) -> Result<u64, DrmError> {
        Err(DrmError::MapDumb(OsError(c::ENOSYS)))
    }

    fn destroy_dumb(&self, handle: u32) -> Result<(), DrmError> {
        self.dumb_buffers.borrow_mut().retain(|h| *h != handle);
        Ok(())
    }

    fn add_fb(
        &self,
        _width: u32,
        _height: u32,
        _format: u32,
        _handle: u32,
        _pitch: u32,
    ) -> Result<DrmFb, DrmError> {
        let fb = DrmFb(self.next_id());
        self.fbs.borrow_mut().push(fb);
        Ok(fb)
    }

    fn rm_fb(&self, fb: DrmFb) -> Result<(), DrmError> {
        self.fbs.borrow_mut().retain(|f| *f != fb);
        Ok(())
    }

    fn wait_events(&self, _timeout: Option<Duration>) -> Result<bool, DrmError> {
        Ok(!self.events.borrow().is_empty())
    }

    fn read_events(&self) -> Result<Vec<DrmEvent>, DrmError> {
        Ok(self.events.borrow_mut().drain(..).collect())
    }
}

use {
    crate::{
        kms::{KmsError, connector::KmsConnector, crtc::KmsCrtc, plane::KmsPlane},
        utils::errorfmt::ErrorFmt,
        video::drm::{
            AtomicRequest, DRM_CAP_DUMB_BUFFER, DRM_CLIENT_CAP_ATOMIC,
            DRM_CLIENT_CAP_UNIVERSAL_PLANES, DRM_MODE_ATOMIC_TEST_ONLY, DrmCrtc, DrmInterface,
            DrmMaster,
        },
    },
    ahash::AHashMap,
    std::{cell::RefCell, rc::Rc},
};

const DEFAULT_CURSOR_SIZE: u64 = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Caps {
    pub dumb_buffers: bool,
    pub cursor_width: u32,
    pub cursor_height: u32,
}

/// A display device and the objects discovered on it.
pub struct Device {
    drm: Rc<dyn DrmInterface>,
    caps: Caps,
    crtcs: Vec<Rc<KmsCrtc>>,
    connectors: Vec<Rc<KmsConnector>>,
    planes: Vec<Rc<KmsPlane>>,
    request: RefCell<AtomicRequest>,
}

struct CommitSet<'a> {
    connectors: Vec<&'a Rc<KmsConnector>>,
    crtcs: Vec<&'a Rc<KmsCrtc>>,
    planes: Vec<&'a Rc<KmsPlane>>,
}

impl Device {
    pub fn open(path: &str) -> Result<Self, KmsError> {
        let master = DrmMaster::open(path)?;
        log::info!("opened {:?}", master);
        Self::new(Rc::new(master))
    }

    pub fn new(drm: Rc<dyn DrmInterface>) -> Result<Self, KmsError> {
        if let Err(e) = drm.set_client_cap(DRM_CLIENT_CAP_ATOMIC, 1) {
            return Err(KmsError::Atomic(e));
        }
        if let Err(e) = drm.set_client_cap(DRM_CLIENT_CAP_UNIVERSAL_PLANES, 1) {
            return Err(KmsError::UniversalPlanes(e));
        }
        let dumb_buffers = match drm.get_cap(DRM_CAP_DUMB_BUFFER) {
            Ok(v) => v != 0,
            Err(e) => {
                log::debug!("Could not query the dumb buffer capability: {}", ErrorFmt(e));
                false
            }
        };
        let (cursor_width, cursor_height) = match drm.get_cursor_size() {
            Ok(s) => s,
            Err(e) => {
                log::debug!("Could not query the cursor size: {}", ErrorFmt(e));
                (DEFAULT_CURSOR_SIZE, DEFAULT_CURSOR_SIZE)
            }
        };
        let caps = Caps {
            dumb_buffers,
            cursor_width: cursor_width as u32,
            cursor_height: cursor_height as u32,
        };
        log::debug!("{:?}", caps);
        let resources = drm.get_resources()?;
        let mut encoders = AHashMap::new();
        for &encoder in &resources.encoders {
            encoders.insert(encoder, drm.get_encoder_info(encoder)?);
        }
        let mut crtcs = vec![];
        for (idx, &crtc) in resources.crtcs.iter().enumerate() {
            crtcs.push(Rc::new(KmsCrtc::new(&drm, crtc, idx)?));
        }
        let mut connectors = vec![];
        for &connector in &resources.connectors {
            let connector = KmsConnector::new(&drm, connector, &encoders, &crtcs)?;
            connectors.push(Rc::new(connector));
        }
        let mut planes = vec![];
        for plane in drm.get_planes()? {
            let cursor_size = (caps.cursor_width, caps.cursor_height);
            planes.push(Rc::new(KmsPlane::new(&*drm, plane, &crtcs, cursor_size)?));
        }
        log::info!(
            "device has {} crtcs, {} connectors, {} planes",
            crtcs.len(),
            connectors.len(),
            planes.len()
        );
        Ok(Self {
            drm,
            caps,
            crtcs,
            connectors,
            planes,
            request: Default::default(),
        })
    }

    pub fn drm(&self) -> &Rc<dyn DrmInterface> {
        &self.drm
    }

    pub fn caps(&self) -> Caps {
        self.caps
    }

    pub fn crtcs(&self) -> &[Rc<KmsCrtc>] {
        &self.crtcs
    }

    pub fn connectors(&self) -> &[Rc<KmsConnector>] {
        &self.connectors
    }

    pub fn planes(&self) -> &[Rc<KmsPlane>] {
        &self.planes
    }

    pub fn find_crtc(&self, id: DrmCrtc) -> Option<&Rc<KmsCrtc>> {
        if id.0 == 0 {
            return None;
        }
        self.crtcs.iter().find(|c| c.id == id)
    }

    /// Commits the pending state of every object.
    pub fn commit(&self, flags: u32, user_data: u64) -> Result<(), KmsError> {
        let set = self.full_set();
        self.submit(&set, flags, user_data)?;
        if flags & DRM_MODE_ATOMIC_TEST_ONLY == 0 {
            set.apply();
        }
        Ok(())
    }

    /// Checks whether the kernel would accept the pending state of every object.
    pub fn test_commit(&self, flags: u32) -> Result<(), KmsError> {
        self.submit(&self.full_set(), flags | DRM_MODE_ATOMIC_TEST_ONLY, 0)
    }

    /// Commits the pending state of a CRTC and of the objects attached to it.
    ///
    /// An object is attached if either its pending or its current state uses the CRTC.
    pub fn crtc_commit(
        &self,
        crtc: &Rc<KmsCrtc>,
        flags: u32,
        user_data: u64,
    ) -> Result<(), KmsError> {
        let id = crtc.id;
        let set = CommitSet {
            connectors: self
                .connectors
                .iter()
                .filter(|c| c.pending().crtc_id() == id || c.current().crtc_id() == id)
                .collect(),
            crtcs: vec![crtc],
            planes: self
                .planes
                .iter()
                .filter(|p| p.pending().crtc_id() == id || p.current().crtc_id() == id)
                .collect(),
        };
        self.submit(&set, flags, user_data)?;
        if flags & DRM_MODE_ATOMIC_TEST_ONLY == 0 {
            set.apply();
        }
        Ok(())
    }

    /// Resets the pending state of every object to its current state.
    pub fn discard_pending(&self) {
        for connector in &self.connectors {
            connector.revert();
        }
        for crtc in &self.crtcs {
            crtc.revert();
        }
        for plane in &self.planes {
            plane.revert();
        }
    }

    fn full_set(&self) -> CommitSet<'_> {
        CommitSet {
            connectors: self.connectors.iter().collect(),
            crtcs: self.crtcs.iter().collect(),
            planes: self.planes.iter().collect(),
        }
    }

    fn submit(&self, set: &CommitSet<'_>, flags: u32, user_data: u64) -> Result<(), KmsError> {
        let test_only = flags & DRM_MODE_ATOMIC_TEST_ONLY != 0;
        let mut req = self.request.borrow_mut();
        let cursor = req.cursor();
        // The kernel writes into these until the commit returns.
        let mut fences = vec![];
        for connector in &set.connectors {
            fences.extend(connector.serialize_pending(&mut req, test_only));
        }
        for crtc in &set.crtcs {
            crtc.serialize_pending(&mut req);
        }
        for plane in &set.planes {
            plane.serialize_pending(&mut req);
        }
        log::debug!(
            "submitting {} property writes (flags {:#x})",
            req.len(),
            flags
        );
        let res = self.drm.atomic_commit(&req, flags, user_data);
        req.set_cursor(cursor);
        drop(fences);
        res.map_err(KmsError::Commit)
    }
}

impl CommitSet<'_> {
    fn apply(&self) {
        for connector in &self.connectors {
            connector.apply();
        }
        for crtc in &self.crtcs {
            crtc.apply();
        }
        for plane in &self.planes {
            plane.apply();
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.planes.clear();
        self.crtcs.clear();
        for connector in &self.connectors {
            connector.finish();
        }
        self.connectors.clear();
    }
}

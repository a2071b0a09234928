use {
    crate::{
        kms::{
            KmsError,
            crtc::KmsCrtc,
            framebuffer::FbRef,
            props::{ConnectorProp, Properties},
        },
        utils::{dual::Dual, errorfmt::ErrorFmt},
        video::drm::{
            AtomicRequest, ConnectorStatus, ConnectorType, DrmBlob, DrmConnector, DrmCrtc,
            DrmCrtcInfo, DrmEncoder, DrmEncoderInfo, DrmInterface, DrmModeInfo, DrmObject,
            poll_readable,
        },
    },
    ahash::AHashMap,
    std::{
        cell::{Cell, RefCell},
        fmt::{Debug, Formatter},
        rc::Rc,
        time::Duration,
    },
    uapi::{OwnedFd, c},
};

/// The slot the kernel writes a writeback fence into.
///
/// The address of the slot is passed as `WRITEBACK_OUT_FENCE_PTR` and must stay valid until
/// the commit returns.
pub struct OutFence {
    fd: Cell<c::c_int>,
}

impl Debug for OutFence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OutFence").field(&self.fd.get()).finish()
    }
}

impl OutFence {
    pub fn new() -> Rc<Self> {
        Rc::new(Self { fd: Cell::new(-1) })
    }

    fn ptr(&self) -> u64 {
        self.fd.as_ptr() as usize as u64
    }

    /// Takes ownership of the fence fd filled in by the kernel.
    pub fn take(&self) -> Option<OwnedFd> {
        let fd = self.fd.replace(-1);
        if fd < 0 {
            return None;
        }
        Some(OwnedFd::new(fd))
    }

    /// Waits until the writeback into the framebuffer has completed.
    pub fn wait(&self, timeout: Duration) -> Result<(), KmsError> {
        let fd = self.fd.get();
        if fd < 0 {
            return Err(KmsError::NoFence);
        }
        match poll_readable(fd, Some(timeout)) {
            Ok(true) => Ok(()),
            Ok(false) => Err(KmsError::FenceTimeout(timeout)),
            Err(e) => Err(KmsError::FenceWait(e)),
        }
    }
}

impl Drop for OutFence {
    fn drop(&mut self) {
        self.take();
    }
}

#[derive(Clone, Default, Debug)]
pub struct ConnectorState {
    pub crtc: Option<Rc<KmsCrtc>>,
}

impl ConnectorState {
    pub fn crtc_id(&self) -> DrmCrtc {
        match &self.crtc {
            Some(c) => c.id,
            None => DrmCrtc::NONE,
        }
    }
}

struct WritebackRequest {
    fb: FbRef,
    fence: Rc<OutFence>,
}

pub struct KmsConnector {
    pub id: DrmConnector,
    drm: Rc<dyn DrmInterface>,
    props: Properties<ConnectorProp>,
    pub connector_type: ConnectorType,
    pub connector_type_id: u32,
    pub status: ConnectorStatus,
    pub mm_width: u32,
    pub mm_height: u32,
    pub modes: Vec<DrmModeInfo>,
    pub possible_crtcs: u32,
    writeback_formats: Vec<u32>,
    legacy: Option<DrmCrtcInfo>,
    state: Dual<ConnectorState>,
    writeback: RefCell<Option<WritebackRequest>>,
}

impl Debug for KmsConnector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsConnector")
            .field("id", &self.id)
            .field("name", &format_args!("{}", self.name()))
            .finish_non_exhaustive()
    }
}

impl KmsConnector {
    pub fn new(
        drm: &Rc<dyn DrmInterface>,
        id: DrmConnector,
        encoders: &AHashMap<DrmEncoder, DrmEncoderInfo>,
        crtcs: &[Rc<KmsCrtc>],
    ) -> Result<Self, KmsError> {
        let info = drm.get_connector_info(id)?;
        let props = Properties::<ConnectorProp>::resolve(&**drm, id)?;
        let mut possible_crtcs = match info.encoders.is_empty() {
            true => 0,
            false => !0,
        };
        for encoder in &info.encoders {
            match encoders.get(encoder) {
                Some(e) => possible_crtcs &= e.possible_crtcs,
                None => {
                    return Err(KmsError::UnknownEncoder {
                        connector: id,
                        encoder: *encoder,
                    });
                }
            }
        }
        let mut writeback_formats = vec![];
        let formats_blob = DrmBlob(props.value(ConnectorProp::WritebackPixelFormats) as u32);
        if formats_blob.0 != 0 {
            writeback_formats = drm.get_blob_vec::<u32>(formats_blob)?;
        }
        let crtc_id = DrmCrtc(props.value(ConnectorProp::CrtcId) as u32);
        let mut legacy = None;
        if crtc_id.0 != 0 {
            match drm.get_crtc_info(crtc_id) {
                Ok(info) => legacy = Some(info),
                Err(e) => log::warn!(
                    "Could not snapshot crtc {} of connector {}: {}",
                    crtc_id,
                    id,
                    ErrorFmt(e)
                ),
            }
        }
        let crtc = crtcs.iter().find(|c| c.id == crtc_id).cloned();
        let connector = Self {
            id,
            drm: drm.clone(),
            props,
            connector_type: ConnectorType::from_drm(info.connector_type),
            connector_type_id: info.connector_type_id,
            status: ConnectorStatus::from_drm(info.connection),
            mm_width: info.mm_width,
            mm_height: info.mm_height,
            modes: info.modes,
            possible_crtcs,
            writeback_formats,
            legacy,
            state: Dual::new(ConnectorState { crtc }),
            writeback: Default::default(),
        };
        log::info!(
            "found connector {} ({}, {:?}, {} modes, crtc mask {:#b})",
            connector.id,
            connector.name(),
            connector.status,
            connector.modes.len(),
            connector.possible_crtcs,
        );
        Ok(connector)
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.connector_type, self.connector_type_id)
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectorStatus::Connected
    }

    pub fn is_writeback(&self) -> bool {
        self.props.has(ConnectorProp::WritebackFbId)
            && self.props.has(ConnectorProp::WritebackOutFencePtr)
    }

    pub fn writeback_formats(&self) -> &[u32] {
        &self.writeback_formats
    }

    /// The mode the display prefers, falling back to the first mode.
    pub fn preferred_mode(&self) -> Option<&DrmModeInfo> {
        self.modes
            .iter()
            .find(|m| m.is_preferred())
            .or(self.modes.first())
    }

    pub fn current(&self) -> ConnectorState {
        self.state.current().clone()
    }

    pub fn pending(&self) -> ConnectorState {
        self.state.pending().clone()
    }

    pub fn can_use(&self, crtc: &KmsCrtc) -> bool {
        self.possible_crtcs & crtc.mask_bit() != 0
    }

    /// Assigns a CRTC to the pending state.
    ///
    /// Returns false if the connector cannot be driven by the CRTC. The pending state is
    /// unchanged in that case.
    pub fn set_crtc(&self, crtc: Option<&Rc<KmsCrtc>>) -> bool {
        let mut pending = self.state.pending_mut();
        if let Some(crtc) = crtc {
            if pending.crtc_id() == crtc.id {
                return true;
            }
            if !self.can_use(crtc) {
                log::warn!(
                    "connector {} cannot be driven by crtc {} (mask {:#b}, index {})",
                    self.id,
                    crtc.id,
                    self.possible_crtcs,
                    crtc.idx,
                );
                return false;
            }
        }
        log::debug!(
            "connector {}: crtc {} -> {}",
            self.id,
            pending.crtc_id(),
            crtc.map(|c| c.id).unwrap_or_default(),
        );
        pending.crtc = crtc.cloned();
        true
    }

    /// Requests a one-shot writeback of the next commit into `fb`.
    pub fn set_writeback(&self, fb: FbRef, fence: &Rc<OutFence>) {
        *self.writeback.borrow_mut() = Some(WritebackRequest {
            fb,
            fence: fence.clone(),
        });
    }

    /// Adds the pending state to `req`.
    ///
    /// Unless `test_only` is set, this consumes the writeback request and returns its fence.
    /// The caller must keep the fence alive until the commit has returned. Test-only commits
    /// check the writeback framebuffer without a fence and leave the request in place.
    pub fn serialize_pending(
        &self,
        req: &mut AtomicRequest,
        test_only: bool,
    ) -> Option<Rc<OutFence>> {
        let pending = self.state.pending();
        let (fb, fence) = match test_only {
            true => (self.writeback.borrow().as_ref().map(|wb| wb.fb), None),
            false => match self.writeback.borrow_mut().take() {
                Some(wb) => (Some(wb.fb), Some(wb.fence)),
                None => (None, None),
            },
        };
        req.change_object(self.id, |c| {
            self.props
                .write(c, ConnectorProp::CrtcId, pending.crtc_id().0 as u64);
            if self.is_writeback() {
                let fb = fb.map(|fb| fb.id.0 as u64).unwrap_or(0);
                let ptr = fence.as_ref().map(|f| f.ptr()).unwrap_or(0);
                self.props.write(c, ConnectorProp::WritebackFbId, fb);
                self.props
                    .write(c, ConnectorProp::WritebackOutFencePtr, ptr);
            }
        });
        fence
    }

    pub(super) fn apply(&self) {
        let old = self.state.apply();
        let new = self.state.current().crtc_id();
        if old.crtc_id() != new {
            log::debug!("connector {}: crtc {} -> {}", self.id, old.crtc_id(), new);
        }
    }

    pub(super) fn revert(&self) {
        self.state.revert();
    }

    /// Restores the configuration that was active before this program took over.
    pub fn finish(&self) {
        let Some(legacy) = &self.legacy else {
            return;
        };
        if let Err(e) = self.drm.set_crtc(legacy, &[self.id]) {
            log::error!(
                "Could not restore crtc {} on connector {}: {}",
                legacy.crtc_id,
                self.id,
                ErrorFmt(e)
            );
        }
    }
}

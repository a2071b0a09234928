use {
    crate::{
        kms::{
            KmsError,
            props::{CrtcProp, Properties},
        },
        utils::dual::Dual,
        video::drm::{
            AtomicRequest, DrmBlob, DrmCrtc, DrmInterface, DrmModeInfo, DrmObject, PropBlob,
        },
    },
    std::{
        fmt::{Debug, Formatter},
        rc::Rc,
    },
};

/// A display mode together with the MODE_ID blob that carries it.
pub struct CrtcMode {
    pub info: DrmModeInfo,
    blob_id: DrmBlob,
    // None if the blob was created by a previous DRM master.
    blob: Option<PropBlob>,
}

impl CrtcMode {
    pub fn blob_id(&self) -> DrmBlob {
        self.blob_id
    }

    pub fn owns_blob(&self) -> bool {
        self.blob.is_some()
    }
}

impl Debug for CrtcMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrtcMode")
            .field("mode", &format_args!("{}", self.info))
            .field("blob", &self.blob_id)
            .finish()
    }
}

#[derive(Clone, Default, Debug)]
pub struct CrtcState {
    pub active: bool,
    pub mode: Option<Rc<CrtcMode>>,
}

impl CrtcState {
    pub fn mode_blob(&self) -> DrmBlob {
        match &self.mode {
            Some(m) => m.blob_id,
            None => DrmBlob::NONE,
        }
    }

    /// Whether the kernel should drive this CRTC.
    pub fn enabled(&self) -> bool {
        self.active && self.mode.is_some()
    }
}

pub struct KmsCrtc {
    pub id: DrmCrtc,
    /// The position of this CRTC in the device's CRTC list. Possible-CRTC masks refer to
    /// this index.
    pub idx: usize,
    drm: Rc<dyn DrmInterface>,
    props: Properties<CrtcProp>,
    state: Dual<CrtcState>,
}

impl Debug for KmsCrtc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsCrtc")
            .field("id", &self.id)
            .field("idx", &self.idx)
            .finish_non_exhaustive()
    }
}

impl KmsCrtc {
    pub fn new(drm: &Rc<dyn DrmInterface>, id: DrmCrtc, idx: usize) -> Result<Self, KmsError> {
        let props = Properties::<CrtcProp>::resolve(&**drm, id)?;
        let mode_id = DrmBlob(props.value(CrtcProp::ModeId) as u32);
        let mut mode = None;
        if mode_id.0 != 0 {
            let blob = drm.get_blob(mode_id)?;
            let Some(info) = DrmModeInfo::from_blob(&blob) else {
                return Err(KmsError::InvalidModeBlob(id));
            };
            log::info!("crtc {} is using mode {}", id, info);
            mode = Some(Rc::new(CrtcMode {
                info,
                blob_id: mode_id,
                blob: None,
            }));
        }
        let state = CrtcState {
            active: props.value(CrtcProp::Active) != 0,
            mode,
        };
        Ok(Self {
            id,
            idx,
            drm: drm.clone(),
            props,
            state: Dual::new(state),
        })
    }

    /// The bit that represents this CRTC in possible-CRTC masks.
    pub fn mask_bit(&self) -> u32 {
        1u32.checked_shl(self.idx as u32).unwrap_or(0)
    }

    pub fn current(&self) -> CrtcState {
        self.state.current().clone()
    }

    pub fn pending(&self) -> CrtcState {
        self.state.pending().clone()
    }

    pub fn pending_mode(&self) -> Option<DrmModeInfo> {
        self.state.pending().mode.as_ref().map(|m| m.info.clone())
    }

    pub fn current_mode(&self) -> Option<DrmModeInfo> {
        self.state.current().mode.as_ref().map(|m| m.info.clone())
    }

    /// Sets the pending mode.
    ///
    /// `None` deactivates the CRTC. A mode equal to the pending mode only
    /// reactivates the CRTC and does not create a new blob.
    pub fn set_mode(&self, mode: Option<&DrmModeInfo>) -> Result<(), KmsError> {
        let mut pending = self.state.pending_mut();
        let Some(mode) = mode else {
            if pending.mode.is_some() {
                log::info!("disabling crtc {}", self.id);
            }
            pending.active = false;
            pending.mode = None;
            return Ok(());
        };
        pending.active = true;
        if let Some(old) = &pending.mode
            && old.info == *mode
        {
            return Ok(());
        }
        let blob = match PropBlob::new(&self.drm, mode.to_raw().as_bytes()) {
            Ok(b) => b,
            Err(e) => return Err(KmsError::CreateModeBlob(e)),
        };
        log::info!(
            "setting mode {} on crtc {} (blob {})",
            mode,
            self.id,
            blob.id()
        );
        // The previous blob is released when the last state referencing it is dropped.
        pending.mode = Some(Rc::new(CrtcMode {
            info: mode.clone(),
            blob_id: blob.id(),
            blob: Some(blob),
        }));
        Ok(())
    }

    /// Changes the pending active flag without touching the mode.
    pub fn set_active(&self, active: bool) {
        self.state.pending_mut().active = active;
    }

    pub fn serialize_pending(&self, req: &mut AtomicRequest) {
        let pending = self.state.pending();
        req.change_object(self.id, |c| {
            self.props
                .write(c, CrtcProp::ModeId, pending.mode_blob().0 as u64);
            self.props
                .write(c, CrtcProp::Active, pending.enabled() as u64);
        });
    }

    pub(super) fn apply(&self) {
        let old = self.state.apply();
        let new = self.state.current();
        if old.mode_blob() != new.mode_blob() || old.active != new.active {
            log::debug!(
                "crtc {}: active {} -> {}, mode blob {} -> {}",
                self.id,
                old.active,
                new.active,
                old.mode_blob(),
                new.mode_blob(),
            );
        }
    }

    pub(super) fn revert(&self) {
        self.state.revert();
    }
}

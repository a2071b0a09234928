use {
    crate::{
        kms::{
            KmsError,
            crtc::KmsCrtc,
            framebuffer::FbRef,
            props::{PlaneProp, Properties},
        },
        utils::dual::Dual,
        video::drm::{AtomicRequest, DrmCrtc, DrmInterface, DrmObject, DrmPlane},
    },
    std::{
        fmt::{Debug, Display, Formatter},
        rc::Rc,
    },
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlaneType {
    Primary,
    Overlay,
    Cursor,
}

impl Display for PlaneType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PlaneType::Primary => "primary",
            PlaneType::Overlay => "overlay",
            PlaneType::Cursor => "cursor",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct PlaneState {
    pub crtc: Option<Rc<KmsCrtc>>,
    pub fb: Option<FbRef>,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub alpha: f32,
}

impl Default for PlaneState {
    fn default() -> Self {
        Self {
            crtc: None,
            fb: None,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            alpha: 1.0,
        }
    }
}

impl PlaneState {
    pub fn crtc_id(&self) -> DrmCrtc {
        match &self.crtc {
            Some(c) => c.id,
            None => DrmCrtc::NONE,
        }
    }
}

pub struct KmsPlane {
    pub id: DrmPlane,
    pub ty: PlaneType,
    props: Properties<PlaneProp>,
    pub possible_crtcs: u32,
    formats: Vec<u32>,
    cursor_size: (u32, u32),
    state: Dual<PlaneState>,
}

impl Debug for KmsPlane {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsPlane")
            .field("id", &self.id)
            .field("ty", &self.ty)
            .finish_non_exhaustive()
    }
}

impl KmsPlane {
    pub fn new(
        drm: &dyn DrmInterface,
        id: DrmPlane,
        crtcs: &[Rc<KmsCrtc>],
        cursor_size: (u32, u32),
    ) -> Result<Self, KmsError> {
        let info = drm.get_plane_info(id)?;
        let props = Properties::<PlaneProp>::resolve(drm, id)?;
        let ty = match props.get(PlaneProp::Type) {
            Some(ty) => match ty.ty.enum_name(ty.value) {
                Some(name) => match name.as_slice() {
                    b"Primary" => PlaneType::Primary,
                    b"Overlay" => PlaneType::Overlay,
                    b"Cursor" => PlaneType::Cursor,
                    _ => return Err(KmsError::UnknownPlaneType(id, name.clone())),
                },
                None => return Err(KmsError::InvalidPlaneType(id, ty.value)),
            },
            None => return Err(KmsError::InvalidPlaneType(id, 0)),
        };
        let crtc_id = DrmCrtc(props.value(PlaneProp::CrtcId) as u32);
        let state = PlaneState {
            crtc: crtcs.iter().find(|c| c.id == crtc_id).cloned(),
            ..Default::default()
        };
        log::info!(
            "found {} plane {} (crtc mask {:#b}, {} formats)",
            ty,
            id,
            info.possible_crtcs,
            info.format_types.len(),
        );
        Ok(Self {
            id,
            ty,
            props,
            possible_crtcs: info.possible_crtcs,
            formats: info.format_types,
            cursor_size,
            state: Dual::new(state),
        })
    }

    pub fn formats(&self) -> &[u32] {
        &self.formats
    }

    pub fn supports_alpha(&self) -> bool {
        self.props.has(PlaneProp::Alpha)
    }

    pub fn current(&self) -> PlaneState {
        self.state.current().clone()
    }

    pub fn pending(&self) -> PlaneState {
        self.state.pending().clone()
    }

    pub fn can_use(&self, crtc: &KmsCrtc) -> bool {
        self.possible_crtcs & crtc.mask_bit() != 0
    }

    /// Assigns a CRTC to the pending state.
    ///
    /// Returns false if the plane cannot be used with the CRTC. On success primary planes
    /// are sized to the CRTC's pending mode and cursor planes to the cursor size of the
    /// device.
    pub fn set_crtc(&self, crtc: Option<&Rc<KmsCrtc>>) -> bool {
        let mut pending = self.state.pending_mut();
        let Some(crtc) = crtc else {
            pending.crtc = None;
            return true;
        };
        if pending.crtc_id() == crtc.id {
            return true;
        }
        if !self.can_use(crtc) {
            log::warn!(
                "plane {} cannot be used with crtc {} (mask {:#b}, index {})",
                self.id,
                crtc.id,
                self.possible_crtcs,
                crtc.idx,
            );
            return false;
        }
        match self.ty {
            PlaneType::Primary => {
                let (width, height) = match crtc.pending_mode() {
                    Some(m) => (m.hdisplay as u32, m.vdisplay as u32),
                    None => (0, 0),
                };
                pending.x = 0;
                pending.y = 0;
                pending.width = width;
                pending.height = height;
            }
            PlaneType::Cursor => {
                (pending.width, pending.height) = self.cursor_size;
            }
            PlaneType::Overlay => {}
        }
        log::debug!(
            "plane {}: crtc {} -> {} ({}x{})",
            self.id,
            pending.crtc_id(),
            crtc.id,
            pending.width,
            pending.height
        );
        pending.crtc = Some(crtc.clone());
        true
    }

    pub fn set_framebuffer(&self, fb: Option<FbRef>) {
        self.state.pending_mut().fb = fb;
    }

    pub fn set_position(&self, x: i32, y: i32) {
        let mut pending = self.state.pending_mut();
        pending.x = x;
        pending.y = y;
    }

    pub fn set_size(&self, width: u32, height: u32) {
        let mut pending = self.state.pending_mut();
        pending.width = width;
        pending.height = height;
    }

    pub fn set_alpha(&self, alpha: f32) {
        self.state.pending_mut().alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn serialize_pending(&self, req: &mut AtomicRequest) {
        let pending = self.state.pending();
        req.change_object(self.id, |c| {
            let (Some(crtc), Some(fb)) = (&pending.crtc, &pending.fb) else {
                self.props.write(c, PlaneProp::CrtcId, 0);
                self.props.write(c, PlaneProp::FbId, 0);
                return;
            };
            self.props.write(c, PlaneProp::CrtcId, crtc.id.0 as u64);
            self.props.write(c, PlaneProp::FbId, fb.id.0 as u64);
            self.props.write(c, PlaneProp::CrtcX, pending.x as i64 as u64);
            self.props.write(c, PlaneProp::CrtcY, pending.y as i64 as u64);
            self.props.write(c, PlaneProp::CrtcW, pending.width as u64);
            self.props.write(c, PlaneProp::CrtcH, pending.height as u64);
            self.props.write(c, PlaneProp::SrcX, 0);
            self.props.write(c, PlaneProp::SrcY, 0);
            self.props.write(c, PlaneProp::SrcW, (fb.width as u64) << 16);
            self.props.write(c, PlaneProp::SrcH, (fb.height as u64) << 16);
            let alpha = (pending.alpha.clamp(0.0, 1.0) * 0xffff as f32) as u64;
            self.props.write(c, PlaneProp::Alpha, alpha);
        });
    }

    pub(super) fn apply(&self) {
        let old = self.state.apply();
        let new = self.state.current();
        if old.crtc_id() != new.crtc_id() || old.fb != new.fb {
            log::debug!(
                "plane {}: crtc {} -> {}, fb {:?} -> {:?}",
                self.id,
                old.crtc_id(),
                new.crtc_id(),
                old.fb.map(|f| f.id),
                new.fb.map(|f| f.id),
            );
        }
    }

    pub(super) fn revert(&self) {
        self.state.revert();
    }
}

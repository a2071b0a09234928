use {
    crate::{
        cli::{CliError, GlobalArgs, ModesetArgs, open_device},
        format::{ARGB8888, XRGB8888, pick_format},
        kms::{Device, DumbFramebuffer, KmsConnector, KmsCrtc, KmsPlane, PlaneType},
        video::drm::{DRM_MODE_ATOMIC_ALLOW_MODESET, DrmModeInfo},
    },
    std::{rc::Rc, thread},
};

const OVERLAY_SIZE: u32 = 100;

// Blue, green and red at half opacity.
const COLORS: [u32; 3] = [0x800000ff, 0x8000ff00, 0x80ff0000];

pub fn main(global: &GlobalArgs, args: ModesetArgs) -> Result<(), CliError> {
    let dev = open_device(global)?;
    let output = Output::first_display(&dev)?;
    log::info!(
        "showing {} planes on {} for {}",
        output.planes.len(),
        output.connector.name(),
        humantime::format_duration(args.duration)
    );
    thread::sleep(args.duration);
    Ok(())
}

/// A connector driven by a CRTC with test patterns on the CRTC's planes.
pub struct Output {
    pub connector: Rc<KmsConnector>,
    pub crtc: Rc<KmsCrtc>,
    pub mode: DrmModeInfo,
    pub planes: Vec<(Rc<KmsPlane>, DumbFramebuffer)>,
}

impl Output {
    /// Drives the first connected display and disables everything else.
    pub fn first_display(dev: &Device) -> Result<Self, CliError> {
        let connector = dev
            .connectors()
            .iter()
            .find(|c| c.is_connected() && !c.is_writeback());
        match connector {
            Some(c) => Self::drive(dev, c),
            None => Err(CliError::NoConnectedConnector),
        }
    }

    pub fn drive(dev: &Device, connector: &Rc<KmsConnector>) -> Result<Self, CliError> {
        for other in dev.connectors() {
            if other.id != connector.id {
                other.set_crtc(None);
            }
        }
        let Some(crtc) = pick_crtc(dev, connector) else {
            return Err(CliError::NoUsableCrtc(connector.id));
        };
        let Some(mode) = connector.preferred_mode().cloned() else {
            return Err(CliError::NoMode(connector.id));
        };
        for other in dev.crtcs() {
            if other.id != crtc.id {
                other.set_mode(None)?;
            }
        }
        crtc.set_mode(Some(&mode))?;
        connector.set_crtc(Some(&crtc));
        log::info!(
            "setting mode {} on connector {} using crtc {}",
            mode,
            connector.name(),
            crtc.id
        );
        dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0)?;
        let planes = attach_planes(dev, &crtc)?;
        if planes.is_empty() {
            return Err(CliError::NoPlanes);
        }
        dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0)?;
        Ok(Self {
            connector: connector.clone(),
            crtc,
            mode,
            planes,
        })
    }
}

/// Picks the CRTC usable by the connector that the most planes can be attached to.
fn pick_crtc(dev: &Device, connector: &KmsConnector) -> Option<Rc<KmsCrtc>> {
    let mut best: Option<(&Rc<KmsCrtc>, usize)> = None;
    for crtc in dev.crtcs() {
        if !connector.can_use(crtc) {
            continue;
        }
        let planes = dev.planes().iter().filter(|p| p.can_use(crtc)).count();
        if best.is_none_or(|(_, n)| planes > n) {
            best = Some((crtc, planes));
        }
    }
    best.map(|(crtc, _)| crtc.clone())
}

fn attach_planes(
    dev: &Device,
    crtc: &Rc<KmsCrtc>,
) -> Result<Vec<(Rc<KmsPlane>, DumbFramebuffer)>, CliError> {
    let mut planes = vec![];
    let mut x = 0;
    for (i, plane) in dev.planes().iter().enumerate() {
        let format = pick_format(plane.formats(), &[ARGB8888, XRGB8888]);
        // Detach first so that a plane already on the CRTC is resized.
        plane.set_crtc(None);
        let Some(format) = format else {
            continue;
        };
        if !plane.set_crtc(Some(crtc)) {
            continue;
        }
        if plane.ty == PlaneType::Overlay {
            plane.set_size(OVERLAY_SIZE, OVERLAY_SIZE);
        }
        let pending = plane.pending();
        if pending.width == 0 || pending.height == 0 {
            plane.set_crtc(None);
            continue;
        }
        let fb = DumbFramebuffer::new(dev, format, pending.width, pending.height)?;
        fb.fill(COLORS[i % COLORS.len()])?;
        plane.set_framebuffer(Some(fb.fb_ref()));
        if plane.ty != PlaneType::Primary {
            x += 10;
            plane.set_position(x, 2 * x);
        }
        plane.set_alpha(0.5);
        log::debug!(
            "attached {} plane {} with a {}x{} {:?} framebuffer",
            plane.ty,
            plane.id,
            pending.width,
            pending.height,
            format
        );
        planes.push((plane.clone(), fb));
    }
    Ok(planes)
}

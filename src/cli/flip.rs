use {
    crate::{
        cli::{CliError, FlipArgs, GlobalArgs, modeset::Output, open_device},
        kms::{EventDispatcher, LoopAction, PlaneType},
        video::drm::{DRM_MODE_ATOMIC_NONBLOCK, DRM_MODE_PAGE_FLIP_EVENT},
    },
};

const FLAGS: u32 = DRM_MODE_PAGE_FLIP_EVENT | DRM_MODE_ATOMIC_NONBLOCK;

pub fn main(global: &GlobalArgs, args: FlipArgs) -> Result<(), CliError> {
    let dev = open_device(global)?;
    let output = Output::first_display(&dev)?;
    let mut frames = 0u32;
    let mut delta = 1;
    let mut error = None;
    dev.crtc_commit(&output.crtc, FLAGS, 0)?;
    EventDispatcher::run(&dev, |flip| {
        if flip.crtc != output.crtc.id {
            return LoopAction::Continue;
        }
        frames += 1;
        let frame = frames;
        if frame >= args.frames {
            return LoopAction::Stop;
        }
        if args.period > 0 && frame % args.period == 0 {
            delta = -delta;
        }
        for (plane, _) in &output.planes {
            if plane.ty == PlaneType::Primary {
                continue;
            }
            let pending = plane.pending();
            plane.set_position(pending.x + delta, pending.y + delta);
        }
        match dev.crtc_commit(&output.crtc, FLAGS, frame as u64) {
            Ok(_) => LoopAction::Continue,
            Err(e) => {
                error = Some(e);
                LoopAction::Stop
            }
        }
    })?;
    if let Some(e) = error {
        return Err(e.into());
    }
    log::info!("presented {} frames", frames);
    Ok(())
}

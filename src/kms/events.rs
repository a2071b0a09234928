use {
    crate::{
        kms::{KmsError, device::Device},
        video::drm::{DrmCrtc, DrmEvent},
    },
    std::time::Duration,
};

/// Whether an event loop should keep running.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// A completed page flip.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageFlip {
    pub crtc: DrmCrtc,
    pub user_data: u64,
    pub sequence: u32,
    pub tv_sec: u32,
    pub tv_usec: u32,
}

/// The result of one [`EventDispatcher::dispatch`] call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Dispatch {
    pub events: usize,
    pub action: LoopAction,
}

pub struct EventDispatcher;

impl EventDispatcher {
    /// Waits up to `timeout` for events and passes them to `handler`.
    ///
    /// Events that arrive after the handler returned [`LoopAction::Stop`] are dropped.
    pub fn dispatch<F>(
        device: &Device,
        timeout: Option<Duration>,
        mut handler: F,
    ) -> Result<Dispatch, KmsError>
    where
        F: FnMut(&PageFlip) -> LoopAction,
    {
        let mut dispatch = Dispatch {
            events: 0,
            action: LoopAction::Continue,
        };
        let drm = device.drm();
        if !drm.wait_events(timeout)? {
            return Ok(dispatch);
        }
        for event in drm.read_events()? {
            let flip = match event {
                DrmEvent::FlipComplete {
                    user_data,
                    tv_sec,
                    tv_usec,
                    sequence,
                    crtc_id,
                } => PageFlip {
                    crtc: crtc_id,
                    user_data,
                    sequence,
                    tv_sec,
                    tv_usec,
                },
            };
            log::trace!("page flip on crtc {} ({})", flip.crtc, flip.sequence);
            dispatch.events += 1;
            if handler(&flip) == LoopAction::Stop {
                dispatch.action = LoopAction::Stop;
                break;
            }
        }
        Ok(dispatch)
    }

    /// Dispatches events until the handler returns [`LoopAction::Stop`].
    pub fn run<F>(device: &Device, mut handler: F) -> Result<(), KmsError>
    where
        F: FnMut(&PageFlip) -> LoopAction,
    {
        loop {
            let dispatch = Self::dispatch(device, None, &mut handler)?;
            if dispatch.action == LoopAction::Stop {
                return Ok(());
            }
        }
    }
}

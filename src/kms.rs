pub mod connector;
pub mod crtc;
pub mod device;
pub mod events;
pub mod framebuffer;
pub mod plane;
pub mod props;

#[cfg(test)]
mod test_kernel;
#[cfg(test)]
mod tests;

use {
    crate::{
        utils::oserror::OsError,
        video::drm::{DrmConnector, DrmCrtc, DrmEncoder, DrmError, DrmPlane},
    },
    bstr::BString,
    std::time::Duration,
    thiserror::Error,
};

pub use {
    connector::{ConnectorState, KmsConnector, OutFence},
    crtc::{CrtcMode, CrtcState, KmsCrtc},
    device::{Caps, Device},
    events::{Dispatch, EventDispatcher, LoopAction, PageFlip},
    framebuffer::{DumbFramebuffer, FbRef},
    plane::{KmsPlane, PlaneState, PlaneType},
};

#[derive(Debug, Error)]
pub enum KmsError {
    #[error(transparent)]
    Drm(#[from] DrmError),
    #[error("The device does not support atomic modesetting")]
    Atomic(#[source] OsError),
    #[error("The device does not support universal planes")]
    UniversalPlanes(#[source] OsError),
    #[error("The {object} {id} does not have the required property {name}")]
    MissingProperty {
        object: &'static str,
        id: u32,
        name: &'static str,
    },
    #[error("Connector {connector} references unknown encoder {encoder}")]
    UnknownEncoder {
        connector: DrmConnector,
        encoder: DrmEncoder,
    },
    #[error("Plane {0} has an unknown type {1}")]
    UnknownPlaneType(DrmPlane, BString),
    #[error("Plane {0} has an invalid type {1}")]
    InvalidPlaneType(DrmPlane, u64),
    #[error("The MODE_ID blob of crtc {0} does not contain a mode")]
    InvalidModeBlob(DrmCrtc),
    #[error("Could not create a mode blob")]
    CreateModeBlob(#[source] DrmError),
    #[error("The atomic commit was rejected")]
    Commit(#[source] DrmError),
    #[error("The device does not support dumb buffers")]
    NoDumbBuffers,
    #[error("Format {0} cannot be used for dumb buffers")]
    UnsupportedDumbFormat(String),
    #[error("Could not map a dumb buffer")]
    MapDumb(#[source] OsError),
    #[error("The writeback fence was not signaled within {0:?}")]
    FenceTimeout(Duration),
    #[error("Could not wait for the writeback fence")]
    FenceWait(#[source] OsError),
    #[error("The writeback fence was not filled in by the kernel")]
    NoFence,
}

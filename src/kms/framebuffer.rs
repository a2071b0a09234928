use {
    crate::{
        format::{Format, dumb_format},
        kms::{KmsError, device::Device},
        utils::{
            errorfmt::ErrorFmt,
            mmap::{Mmapped, mmap},
        },
        video::drm::{DrmDumbBuffer, DrmFb, DrmInterface},
    },
    run_on_drop::on_drop,
    std::rc::Rc,
    uapi::c,
};

/// A framebuffer as seen by planes and writeback connectors.
///
/// This does not keep the framebuffer alive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FbRef {
    pub id: DrmFb,
    pub width: u32,
    pub height: u32,
}

/// A CPU-accessible framebuffer backed by a dumb buffer.
pub struct DumbFramebuffer {
    drm: Rc<dyn DrmInterface>,
    fb: FbRef,
    format: &'static Format,
    buffer: DrmDumbBuffer,
}

impl DumbFramebuffer {
    pub fn new(
        device: &Device,
        format: &'static Format,
        width: u32,
        height: u32,
    ) -> Result<Self, KmsError> {
        if !device.caps().dumb_buffers {
            return Err(KmsError::NoDumbBuffers);
        }
        if dumb_format(format.drm).is_none() {
            return Err(KmsError::UnsupportedDumbFormat(format.name.to_string()));
        }
        let drm = device.drm().clone();
        let buffer = drm.create_dumb(width, height, format.bpp)?;
        let destroy_dumb = on_drop(|| {
            if let Err(e) = drm.destroy_dumb(buffer.handle) {
                log::error!("Could not destroy dumb buffer: {}", ErrorFmt(e));
            }
        });
        let fb = drm.add_fb(width, height, format.drm, buffer.handle, buffer.pitch)?;
        destroy_dumb.forget();
        log::debug!(
            "created {}x{} {:?} framebuffer {} (pitch {})",
            width,
            height,
            format,
            fb,
            buffer.pitch
        );
        Ok(Self {
            drm,
            fb: FbRef {
                id: fb,
                width,
                height,
            },
            format,
            buffer,
        })
    }

    pub fn fb_ref(&self) -> FbRef {
        self.fb
    }

    pub fn format(&self) -> &'static Format {
        self.format
    }

    pub fn pitch(&self) -> u32 {
        self.buffer.pitch
    }

    /// Maps the buffer into memory.
    pub fn map(&self) -> Result<Mmapped, KmsError> {
        let offset = self.drm.map_dumb(self.buffer.handle)?;
        let res = mmap(
            self.buffer.size as usize,
            c::PROT_READ | c::PROT_WRITE,
            c::MAP_SHARED,
            self.drm.raw(),
            offset as c::off_t,
        );
        res.map_err(KmsError::MapDumb)
    }

    /// Fills the buffer with a single opaque color.
    pub fn fill(&self, argb: u32) -> Result<(), KmsError> {
        let mut map = self.map()?;
        let pitch = self.buffer.pitch as usize;
        let width = self.fb.width as usize;
        let bytes = argb.to_le_bytes();
        for row in map.as_mut_slice().chunks_exact_mut(pitch) {
            for pixel in row[..width * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&bytes);
            }
        }
        Ok(())
    }
}

impl Drop for DumbFramebuffer {
    fn drop(&mut self) {
        if let Err(e) = self.drm.rm_fb(self.fb.id) {
            log::error!("Could not remove framebuffer {}: {}", self.fb.id, ErrorFmt(e));
        }
        if let Err(e) = self.drm.destroy_dumb(self.buffer.handle) {
            log::error!("Could not destroy dumb buffer: {}", ErrorFmt(e));
        }
    }
}

use {
    crate::{
        cli::{CliError, GlobalArgs, WritebackArgs, modeset::Output, open_device},
        format::{ARGB8888, XRGB8888, pick_format},
        kms::{DumbFramebuffer, OutFence},
        video::drm::DRM_MODE_ATOMIC_ALLOW_MODESET,
    },
    std::time::Instant,
};

pub fn main(global: &GlobalArgs, args: WritebackArgs) -> Result<(), CliError> {
    let dev = open_device(global)?;
    let Some(connector) = dev.connectors().iter().find(|c| c.is_writeback()) else {
        return Err(CliError::NoWriteback);
    };
    let format = pick_format(connector.writeback_formats(), &[XRGB8888, ARGB8888]);
    let Some(format) = format else {
        return Err(CliError::NoWritebackFormat(connector.id));
    };
    let output = Output::drive(&dev, connector)?;
    let target = DumbFramebuffer::new(
        &dev,
        format,
        output.mode.hdisplay as u32,
        output.mode.vdisplay as u32,
    )?;
    target.fill(0)?;
    let fence = OutFence::new();
    connector.set_writeback(target.fb_ref(), &fence);
    let start = Instant::now();
    dev.commit(DRM_MODE_ATOMIC_ALLOW_MODESET, 0)?;
    fence.wait(args.timeout)?;
    log::info!(
        "captured a {}x{} {:?} frame from {} in {:?}",
        output.mode.hdisplay,
        output.mode.vdisplay,
        format,
        connector.name(),
        start.elapsed()
    );
    let map = target.map()?;
    if let Some(pixel) = map.as_slice().first_chunk::<4>() {
        log::info!("first pixel: {:#010x}", u32::from_le_bytes(*pixel));
    }
    drop(fence.take());
    Ok(())
}

use {
    crate::{
        cli::{CliError, GlobalArgs, InfoArgs},
        format::fourcc_name,
        kms::{Device, KmsConnector, KmsCrtc, KmsPlane},
    },
    isnt::std_1::primitive::IsntSliceExt,
};

pub fn main(global: &GlobalArgs, args: InfoArgs) -> Result<(), CliError> {
    let dev = Device::open(&global.device)?;
    let caps = dev.caps();
    println!("{}:", global.device);
    println!("  dumb buffers: {}", caps.dumb_buffers);
    println!(
        "  cursor size: {} x {}",
        caps.cursor_width, caps.cursor_height
    );
    if dev.connectors().is_not_empty() {
        println!("  connectors:");
    }
    for connector in dev.connectors() {
        print_connector(connector, args.modes);
    }
    if dev.crtcs().is_not_empty() {
        println!("  crtcs:");
    }
    for crtc in dev.crtcs() {
        print_crtc(crtc);
    }
    if dev.planes().is_not_empty() {
        println!("  planes:");
    }
    for plane in dev.planes() {
        print_plane(plane, args.formats);
    }
    Ok(())
}

fn print_connector(connector: &KmsConnector, modes: bool) {
    println!("    {} ({}):", connector.name(), connector.id);
    println!("      status: {:?}", connector.status);
    if connector.mm_width != 0 || connector.mm_height != 0 {
        println!(
            "      physical size: {}mm x {}mm",
            connector.mm_width, connector.mm_height
        );
    }
    println!("      possible crtcs: {:#b}", connector.possible_crtcs);
    let crtc = connector.current().crtc_id();
    if crtc.0 != 0 {
        println!("      crtc: {}", crtc);
    }
    if connector.is_writeback() {
        println!("      writeback formats:");
        for &format in connector.writeback_formats() {
            println!("        {}", fourcc_name(format));
        }
    }
    if modes && connector.modes.is_not_empty() {
        println!("      modes:");
        for mode in &connector.modes {
            let preferred = match mode.is_preferred() {
                true => " (preferred)",
                false => "",
            };
            println!("        {}{}", mode, preferred);
        }
    }
}

fn print_crtc(crtc: &KmsCrtc) {
    let state = crtc.current();
    println!("    {} (index {}):", crtc.id, crtc.idx);
    println!("      active: {}", state.active);
    if let Some(mode) = &state.mode {
        println!("      mode: {}", mode.info);
    }
}

fn print_plane(plane: &KmsPlane, formats: bool) {
    let state = plane.current();
    println!("    {} ({}):", plane.id, plane.ty);
    println!("      possible crtcs: {:#b}", plane.possible_crtcs);
    if state.crtc.is_some() {
        println!("      crtc: {}", state.crtc_id());
    }
    println!("      alpha: {}", plane.supports_alpha());
    if formats && plane.formats().is_not_empty() {
        println!("      formats:");
        for &format in plane.formats() {
            println!("        {}", fourcc_name(format));
        }
    }
}

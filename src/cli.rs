mod flip;
mod info;
mod modeset;
mod writeback;

use {
    crate::{
        kms::{Device, KmsError},
        logger::Logger,
        utils::errorfmt::ErrorFmt,
        video::drm::DrmConnector,
    },
    ::log::Level,
    clap::{Args, Parser, Subcommand, ValueEnum},
    std::time::Duration,
    thiserror::Error,
};

/// Drives a display through the atomic KMS API.
#[derive(Parser, Debug)]
struct Dpipe {
    #[clap(flatten)]
    global: GlobalArgs,
    #[clap(subcommand)]
    command: Cmd,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// The DRM device to open.
    #[clap(long, env = "DPIPE_DEVICE", default_value = "/dev/dri/card0")]
    pub device: String,
    /// The log level.
    #[clap(value_enum, long, default_value_t)]
    pub log_level: CliLogLevel,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print the connectors, CRTCs and planes of the device.
    Info(InfoArgs),
    /// Light up the first connected display and show a test pattern.
    Modeset(ModesetArgs),
    /// Like modeset, but move the non-primary planes around with page flips.
    Flip(FlipArgs),
    /// Capture one frame through a writeback connector.
    Writeback(WritebackArgs),
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Print the modes of each connector.
    #[clap(long)]
    pub modes: bool,
    /// Print the formats of each plane.
    #[clap(long)]
    pub formats: bool,
}

#[derive(Args, Debug)]
pub struct ModesetArgs {
    /// How long to show the test pattern, e.g. `5s` or `1min`.
    #[clap(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub duration: Duration,
}

#[derive(Args, Debug)]
pub struct FlipArgs {
    /// The number of page flips after which to stop.
    #[clap(long, default_value_t = 300)]
    pub frames: u32,
    /// The number of frames after which the planes change direction.
    #[clap(long, default_value_t = 60)]
    pub period: u32,
}

#[derive(Args, Debug)]
pub struct WritebackArgs {
    /// How long to wait for the captured frame.
    #[clap(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[derive(ValueEnum, Debug, Copy, Clone, Hash, Default)]
pub enum CliLogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<CliLogLevel> for Level {
    fn from(v: CliLogLevel) -> Self {
        match v {
            CliLogLevel::Trace => Level::Trace,
            CliLogLevel::Debug => Level::Debug,
            CliLogLevel::Info => Level::Info,
            CliLogLevel::Warn => Level::Warn,
            CliLogLevel::Error => Level::Error,
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Kms(#[from] KmsError),
    #[error("The device has no connectors")]
    NoConnectors,
    #[error("The device has no CRTCs")]
    NoCrtcs,
    #[error("No display is connected")]
    NoConnectedConnector,
    #[error("No CRTC can drive connector {0}")]
    NoUsableCrtc(DrmConnector),
    #[error("Connector {0} has no modes")]
    NoMode(DrmConnector),
    #[error("No plane could be attached to the CRTC")]
    NoPlanes,
    #[error("The device has no writeback connector")]
    NoWriteback,
    #[error("Connector {0} cannot write back into a dumb buffer")]
    NoWritebackFormat(DrmConnector),
}

pub fn main() {
    let cli = Dpipe::parse();
    Logger::install_stderr(cli.global.log_level.into());
    let res = match cli.command {
        Cmd::Info(a) => info::main(&cli.global, a),
        Cmd::Modeset(a) => modeset::main(&cli.global, a),
        Cmd::Flip(a) => flip::main(&cli.global, a),
        Cmd::Writeback(a) => writeback::main(&cli.global, a),
    };
    if let Err(e) = res {
        fatal!("Error: {}", ErrorFmt(e));
    }
}

fn open_device(global: &GlobalArgs) -> Result<Device, CliError> {
    let dev = Device::open(&global.device)?;
    if dev.connectors().is_empty() {
        return Err(CliError::NoConnectors);
    }
    if dev.crtcs().is_empty() {
        return Err(CliError::NoCrtcs);
    }
    Ok(dev)
}

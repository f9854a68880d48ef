//! Thin CLI driver over the `apogee_rcs` library: loads configuration,
//! opens the two serial links and the launch-detect GPIO (or their
//! simulated stand-ins under `--dry-run`), then runs the mission
//! sequencer to completion.

use apogee_rcs::config::Config;
use apogee_rcs::gpio::SimLaunchDetect;
use apogee_rcs::sequencer::{Mission, StdinIo};
use apogee_rcs::sim::{SimActuatorLink, SimImuLink};
use apogee_rcs::transport;
use clap::Parser;

const IMU_BAUD: u32 = 57_600;
const ACTUATOR_BAUD: u32 = 115_200;

/// Onboard GNC for a cold-gas reaction control system.
#[derive(Parser, Debug)]
#[command(name = "apogee-rcs", about, version)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "apogee-rcs.yaml")]
    config: String,

    /// Override the attitude-sensor serial device from the config file.
    #[arg(long)]
    imu_port: Option<String>,

    /// Override the actuator-controller serial device from the config file.
    #[arg(long)]
    actuator_port: Option<String>,

    /// Run against a simulated IMU/actuator backend instead of real
    /// hardware, for rehearsal without anything attached.
    #[arg(long)]
    dry_run: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        log::error!("apogee-rcs: fatal: {e}");
        eprintln!("fatal: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> apogee_rcs::Result<()> {
    let mut cfg = Config::load(&cli.config)?;
    if let Some(port) = cli.imu_port {
        cfg.raw.imu_port = port;
    }
    if let Some(port) = cli.actuator_port {
        cfg.raw.actuator_port = port;
    }

    let mission = if cli.dry_run {
        log::info!("apogee-rcs: dry-run, using simulated IMU/actuator/GPIO backends");
        let imu_link: Box<dyn apogee_rcs::transport::Transport> =
            Box::new(SimImuLink::constant(0.0, 0.0, 0.0));
        let (actuator_link, _handle) = SimActuatorLink::new();
        Mission {
            cfg,
            imu_link,
            actuator_link: Box::new(actuator_link),
            launch_detect: Box::new(SimLaunchDetect::new()),
        }
    } else {
        let imu_link = transport::open_real(&cfg.raw.imu_port, IMU_BAUD)?;
        let actuator_link = transport::open_real(&cfg.raw.actuator_port, ACTUATOR_BAUD)?;
        let launch_detect = open_launch_detect(cfg.raw.launch_detect_gpio_pin)?;
        Mission {
            cfg,
            imu_link,
            actuator_link,
            launch_detect,
        }
    };

    let mut io = StdinIo;
    apogee_rcs::sequencer::run(mission, &mut io)
}

#[cfg(feature = "gpio")]
fn open_launch_detect(
    pin: u8,
) -> apogee_rcs::Result<Box<dyn apogee_rcs::gpio::LaunchDetect>> {
    Ok(Box::new(apogee_rcs::gpio::RppalLaunchDetect::open(pin)?))
}

#[cfg(not(feature = "gpio"))]
fn open_launch_detect(
    _pin: u8,
) -> apogee_rcs::Result<Box<dyn apogee_rcs::gpio::LaunchDetect>> {
    Err(apogee_rcs::GncError::Gpio(
        "built without the 'gpio' feature; rebuild with --features gpio or pass --dry-run".into(),
    ))
}

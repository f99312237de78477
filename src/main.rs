use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;

use eq_platform_adapter::adapter::{Adapter, AdapterOptions};
use eq_platform_adapter::config::{Config, ConfigError};
use eq_platform_adapter::devices::{Devices, SimulatedGuidePort, SimulatedMotor, SimulatedMount};
use eq_platform_adapter::guide::{GuideDirection, GuideGeometry, GuidePulseTransform, GuideRequest};
use eq_platform_adapter::platform::{PlatformConfig, SystemClock};
use eq_platform_adapter::settings::FileSettings;
use eq_platform_adapter::web;

#[derive(Parser)]
#[command(name = "eq-platform-adapter")]
#[command(about = "Drive an alt-az mount on an equatorial platform as one equatorial mount")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file
    Validate { config: String },
    /// Run the control service
    Serve { config: String },
    /// Translate one guide pulse offline
    Transform(TransformArgs),
}

#[derive(Args)]
struct TransformArgs {
    #[arg(long, allow_hyphen_values = true)]
    latitude: f64,
    /// Local sidereal time, hours
    #[arg(long)]
    lst: f64,
    /// Hours
    #[arg(long)]
    ra: f64,
    #[arg(long, allow_hyphen_values = true)]
    dec: f64,
    /// Seconds of tracking so far
    #[arg(long, default_value_t = 0.0)]
    elapsed: f64,
    #[arg(long, default_value_t = 22.0)]
    stroke: f64,
    #[arg(long, value_parser = parse_direction)]
    direction: GuideDirection,
    #[arg(long)]
    duration: u32,
    #[arg(long, default_value_t = 2500)]
    max_pulse: u32,
    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

fn parse_direction(s: &str) -> Result<GuideDirection, String> {
    match s.to_ascii_lowercase().as_str() {
        "n" | "north" => Ok(GuideDirection::North),
        "s" | "south" => Ok(GuideDirection::South),
        "e" | "east" => Ok(GuideDirection::East),
        "w" | "west" => Ok(GuideDirection::West),
        _ => Err(format!("unknown direction '{}'", s)),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => validate(&config),
        Commands::Serve { config } => serve(&config),
        Commands::Transform(args) => transform(&args),
    }
}

fn validate(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Config is valid");
    println!(
        "  stroke: {:.2} deg (settings in {})",
        config.platform.stroke_degrees,
        config.platform.settings_file.display()
    );
    println!(
        "  guide: max pulse {} ms, timeout margin {}",
        config.guide.max_pulse_ms,
        humantime::format_duration(config.guide.timeout_margin)
    );
    match &config.simulator {
        Some(sim) => println!(
            "  simulator: lat {:.4} lon {:.4}",
            sim.latitude_deg, sim.longitude_deg
        ),
        None => println!("  simulator: not configured"),
    }
    println!("  web: {} ({} API keys)", config.web.bind, config.api_keys.len());
    ExitCode::SUCCESS
}

fn build_adapter(config: &Config) -> Result<Adapter, ConfigError> {
    let sim = config.simulator()?;
    let clock = Arc::new(SystemClock::new());

    let mount = SimulatedMount::new(sim.site(), sim.ra_hours, sim.dec_deg);
    let port = SimulatedGuidePort::new(clock.clone());
    let mut devices = Devices::new(Box::new(mount), Box::new(port));
    if sim.motor {
        devices = devices.with_motor(Box::new(SimulatedMotor::new()));
    }

    let settings = Arc::new(FileSettings::new(config.platform.settings_file.clone()));
    let options = AdapterOptions {
        default_stroke_degrees: config.platform.stroke_degrees,
        max_pulse_ms: config.guide.max_pulse_ms,
        dispatch: config.guide.dispatch_settings(),
    };
    Ok(Adapter::new(devices, settings, clock, options))
}

fn serve(path: &str) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let adapter = match build_adapter(&config) {
        Ok(a) => Arc::new(a),
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(web::run_server(config, adapter)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn transform(args: &TransformArgs) -> ExitCode {
    let config = match PlatformConfig::new(args.stroke) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let tilt_deg = args.elapsed * eq_platform_adapter::geometry::SIDEREAL_DEGREES_PER_SECOND
        - config.stroke_degrees() / 2.0;
    let geometry = GuideGeometry {
        latitude_deg: args.latitude,
        lst_hours: args.lst,
        ra_hours: args.ra,
        dec_deg: args.dec,
        tilt_deg,
    };

    let transform = GuidePulseTransform::new(args.max_pulse);
    let factors = transform.factors(&geometry);
    let correction = transform.transform(
        GuideRequest::from_direction(args.direction, args.duration),
        &geometry,
    );

    if args.json {
        let output = serde_json::json!({
            "sky": geometry.sky_position(),
            "tilt_deg": tilt_deg,
            "factors": factors,
            "correction": correction,
            "pulses": correction.pulses().into_iter().flatten().collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Serialization error: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let sky = geometry.sky_position();
    println!(
        "Target alt {:.3} az {:.3}, hour angle {:.3} deg, tilt {:.3} deg",
        sky.altitude_deg, sky.azimuth_deg, sky.hour_angle_deg, tilt_deg
    );
    println!(
        "Factors k_rr {:.4} k_rd {:.4} k_dr {:.4} k_dd {:.4}{}",
        factors.k_rr,
        factors.k_rd,
        factors.k_dr,
        factors.k_dd,
        if factors.singular { " (singular)" } else { "" }
    );
    let pulses: Vec<_> = correction.pulses().into_iter().flatten().collect();
    if pulses.is_empty() {
        println!("No physical pulse");
    }
    for pulse in pulses {
        println!("  {} {} ms", pulse.direction, pulse.duration_ms);
    }
    ExitCode::SUCCESS
}

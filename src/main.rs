use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use scqbuds::bluetooth::backend::{BleBackend, MacAddr};
use scqbuds::bluetooth::bluez::BluezBackend;
use scqbuds::bluetooth::demo::{DemoBackend, DemoConfig};
use scqbuds::bluetooth::{scanner, ConnectionManager};
use scqbuds::config::presets::{ProfileStore, QuickPreset, TomlProfileStore};
use scqbuds::config::{AppConfig, SessionConfig};
use scqbuds::device::equalizer::{
    EqualizerConfiguration, PresetEqualizerProfile, VolumeAdjustments,
};
use scqbuds::device::models::DeviceFeatureFlags;
use scqbuds::device::session::DeviceSession;
use scqbuds::device::slot::SessionSlot;
use scqbuds::device::sound_modes::{
    AmbientSoundMode, CustomNoiseCanceling, NoiseCancelingMode, SoundModes, TransparencyMode,
};

#[derive(Parser)]
#[command(name = "scqbuds", about = "Control Soundcore headphones over Bluetooth LE")]
struct Cli {
    /// Device address, e.g. AC:12:2F:6A:D2:07. Defaults to the configured or first known device.
    #[arg(long, global = true)]
    address: Option<MacAddr>,

    /// Talk to a simulated device instead of BlueZ
    #[arg(long, global = true)]
    demo: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List bonded devices
    List {
        /// Include devices that do not look like Soundcore headphones
        #[arg(long)]
        all: bool,
    },
    /// Print the device state as JSON
    Get,
    /// Change sound modes and equalizer
    Set(SetArgs),
    /// Manage quick presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// Print a JSON line for every meaningful state change
    Watch,
}

#[derive(clap::Args)]
struct SetArgs {
    #[arg(long, value_parser = parse_ambient)]
    ambient_sound_mode: Option<AmbientSoundMode>,
    #[arg(long, value_parser = parse_noise_canceling)]
    noise_canceling_mode: Option<NoiseCancelingMode>,
    #[arg(long, value_parser = parse_transparency)]
    transparency_mode: Option<TransparencyMode>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=10))]
    custom_noise_canceling: Option<u8>,
    #[arg(long, value_parser = parse_equalizer_preset, conflicts_with = "equalizer_bands")]
    equalizer_preset: Option<PresetEqualizerProfile>,
    /// Comma separated band values in tenths of a dB, e.g. -60,0,0,20,40,0,0,0
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    equalizer_bands: Option<Vec<i16>>,
}

#[derive(Subcommand)]
enum PresetAction {
    /// Apply a saved preset
    Apply { name: String },
    /// Save the current sound modes and equalizer under a name
    Save { name: String },
    /// List saved presets for the device
    List,
}

fn parse_ambient(s: &str) -> Result<AmbientSoundMode, String> {
    AmbientSoundMode::from_str(s).ok_or_else(|| format!("unknown ambient sound mode '{}'", s))
}

fn parse_noise_canceling(s: &str) -> Result<NoiseCancelingMode, String> {
    NoiseCancelingMode::from_str(s).ok_or_else(|| format!("unknown noise canceling mode '{}'", s))
}

fn parse_transparency(s: &str) -> Result<TransparencyMode, String> {
    TransparencyMode::from_str(s).ok_or_else(|| format!("unknown transparency mode '{}'", s))
}

fn parse_equalizer_preset(s: &str) -> Result<PresetEqualizerProfile, String> {
    PresetEqualizerProfile::from_str(s).ok_or_else(|| format!("unknown equalizer preset '{}'", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("scqbuds=debug".parse()?)
        .add_directive("bluer=info".parse()?);

    if let Some(path) = &cli.log_file {
        let log_file = std::fs::File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(log_file)
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("scqbuds starting");

    let config = AppConfig::load();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, mut config: AppConfig) -> Result<()> {
    let backend: Arc<dyn BleBackend> = if cli.demo {
        info!("Using simulated device");
        Arc::new(DemoBackend::new(DemoConfig::default()))
    } else {
        Arc::new(BluezBackend::new().await?)
    };

    if let Command::List { all } = cli.command {
        let devices = scanner::list_bonded_devices(backend.as_ref(), !all).await?;
        print_json(&devices)?;
        return Ok(());
    }

    let address = match find_device(cli.address, &config, backend.as_ref()).await? {
        Some(address) => address,
        None => bail!("No supported device found. Pair one or pass --address."),
    };

    let manager = ConnectionManager::new(backend, config.session.clone());
    let slot = SessionSlot::new();
    let session = slot.replace(manager.connect(address)).await?;

    if !cli.demo {
        remember_device(&mut config, &session);
    }

    let result = run_command(cli.command, &session, &config.session).await;
    slot.clear().await;
    result
}

async fn run_command(
    command: Command,
    session: &DeviceSession,
    session_config: &SessionConfig,
) -> Result<()> {
    match command {
        // Answered without a connection in `run`.
        Command::List { .. } => Ok(()),
        Command::Get => print_json(&session.current_state()),
        Command::Set(args) => {
            set(session, args, session_config).await?;
            print_json(&session.current_state())
        }
        Command::Preset { action } => preset(session, action).await,
        Command::Watch => watch(session).await,
    }
}

async fn set(session: &DeviceSession, args: SetArgs, session_config: &SessionConfig) -> Result<()> {
    let current = session.current_state().sound_modes;
    let desired = SoundModes {
        ambient_sound_mode: args.ambient_sound_mode.unwrap_or(current.ambient_sound_mode),
        noise_canceling_mode: args
            .noise_canceling_mode
            .unwrap_or(current.noise_canceling_mode),
        transparency_mode: args.transparency_mode.unwrap_or(current.transparency_mode),
        custom_noise_canceling: args
            .custom_noise_canceling
            .map(CustomNoiseCanceling::new)
            .unwrap_or(current.custom_noise_canceling),
    };
    let applied = session.request_sound_modes(desired).await?;
    if applied != desired {
        warn!("Device does not support {}, applied {}", desired, applied);
    }

    let channels = session.profile().equalizer_channels;
    let equalizer = match (args.equalizer_preset, args.equalizer_bands) {
        (Some(preset), _) => Some(EqualizerConfiguration::from_preset(preset, channels)),
        (None, Some(bands)) => Some(EqualizerConfiguration::custom(vec![
            VolumeAdjustments::new(bands);
            channels
        ])),
        (None, None) => None,
    };
    if let Some(equalizer) = equalizer {
        if !session.profile().has(DeviceFeatureFlags::EQUALIZER) {
            bail!("{} has no equalizer", session.profile().name);
        }
        let debouncer = session.equalizer_debouncer(session_config);
        debouncer.submit(equalizer);
        debouncer.finish().await;
    }

    session.flush().await?;
    Ok(())
}

async fn preset(session: &DeviceSession, action: PresetAction) -> Result<()> {
    let store = TomlProfileStore::new(TomlProfileStore::default_path());
    let device = session.descriptor().mac_address;
    match action {
        PresetAction::Apply { name } => {
            let Some(preset) = store.get(device, &name)? else {
                bail!("No preset named '{}' for {}", name, device);
            };
            session.apply_quick_preset(&preset).await?;
            session.flush().await?;
            print_json(&session.current_state())
        }
        PresetAction::Save { name } => {
            let state = session.current_state();
            let modes = state.sound_modes;
            let preset = QuickPreset {
                name,
                ambient_sound_mode: Some(modes.ambient_sound_mode),
                noise_canceling_mode: Some(modes.noise_canceling_mode),
                transparency_mode: Some(modes.transparency_mode),
                custom_noise_canceling: Some(modes.custom_noise_canceling),
                equalizer: Some(state.equalizer),
            };
            store.put(device, preset.clone())?;
            print_json(&preset)
        }
        PresetAction::List => print_json(&store.list(device)?),
    }
}

async fn watch(session: &DeviceSession) -> Result<()> {
    let mut changes = session.state_changes();
    loop {
        tokio::select! {
            change = changes.next() => match change {
                Some(state) => print_json(&state)?,
                None => {
                    info!("Session ended");
                    return Ok(());
                }
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

async fn find_device(
    requested: Option<MacAddr>,
    config: &AppConfig,
    backend: &dyn BleBackend,
) -> Result<Option<MacAddr>> {
    if let Some(address) = requested {
        return Ok(Some(address));
    }

    // Try configured device first
    if let Some(addr_str) = &config.device_address {
        match addr_str.parse::<MacAddr>() {
            Ok(address) => return Ok(Some(address)),
            Err(e) => warn!("Ignoring configured device address: {}", e),
        }
    }

    let devices = scanner::list_bonded_devices(backend, true).await?;
    Ok(devices.first().map(|d| d.address))
}

fn remember_device(config: &mut AppConfig, session: &DeviceSession) {
    let descriptor = session.descriptor();
    let address = descriptor.mac_address.to_string();
    if config.device_address.as_deref() == Some(address.as_str()) {
        return;
    }
    config.device_address = Some(address);
    config.device_name = Some(descriptor.name.clone());
    if let Err(e) = config.save() {
        warn!("Failed to save config: {}", e);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

use anyhow::{Context, Result};
use defmt_decoder::{DecodeError, StreamDecoder, Table};
use postcard::accumulator::{CobsAccumulator, FeedResult};
use probe_rs::Permissions;
use probe_rs::probe::list::Lister;
use probe_rs::rtt::{Rtt, ScanRegion};
use std::fs;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use oxistep_protocol::{MotorCommand, UpFrame};

mod config;
use config::HostConfig;

fn init_tracing() {
    // Default INFO; allow override via RUST_LOG
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .compact()
        .try_init();
}

/// Map a line of user input to a motor command.
///
/// `u`/`up` speed up, `d`/`down` slow down, `s`/`stop` stop,
/// `m<width>` manual duty target.
fn parse_command(line: &str) -> Option<MotorCommand> {
    let line = line.trim();
    match line {
        "u" | "up" => Some(MotorCommand::SpeedUp),
        "d" | "down" => Some(MotorCommand::SpeedDown),
        "s" | "stop" => Some(MotorCommand::Stop),
        _ => line
            .strip_prefix('m')
            .and_then(|w| w.trim().parse().ok())
            .map(|width| MotorCommand::SetDuty { width }),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load config file
    let cfg = HostConfig::load_default().unwrap_or_default();
    let probe_sel = cfg.probe.clone();
    let chip = cfg.chip.clone();
    let elf_from_cfg = cfg.elf.clone();

    info!("oxistep host - RTT (chip={:?}, probe={:?})", chip, probe_sel);
    info!("Commands: u=speed up, d=slow down, s=stop, m<width>=manual duty");

    // Get list of available probes
    let lister = Lister::new();
    let probes = lister.list_all();

    if probes.is_empty() {
        error!("No debug probes found! Make sure ST-Link is connected.");
        return Err(anyhow::anyhow!("No probes found"));
    }

    info!("Found {} probe(s)", probes.len());

    // Open specific probe if configured, otherwise first
    let probe = if let Some(sel) = probe_sel {
        let mut parts = sel.split(':');
        let vid = parts.next();
        let pid = parts.next();
        let serial = parts.next();
        let chosen = probes
            .iter()
            .find(|p| {
                let ok_vid = vid
                    .and_then(|v| u16::from_str_radix(v, 16).ok())
                    .map(|v| p.vendor_id == v)
                    .unwrap_or(true);
                let ok_pid = pid
                    .and_then(|v| u16::from_str_radix(v, 16).ok())
                    .map(|v| p.product_id == v)
                    .unwrap_or(true);
                let ok_ser = serial
                    .map(|s| p.serial_number.as_deref() == Some(s))
                    .unwrap_or(true);
                ok_vid && ok_pid && ok_ser
            })
            .ok_or_else(|| anyhow::anyhow!("Configured probe not found: {}", sel))?;
        chosen.open().context("Failed to open selected probe")?
    } else {
        probes[0].open().context("Failed to open probe")?
    };

    // Attach to the target (auto-detect by default, or explicit chip from config)
    let ts = match chip {
        Some(name) => probe_rs::config::TargetSelector::from(name),
        None => probe_rs::config::TargetSelector::Auto,
    };
    let mut session = probe
        .attach(ts, Permissions::default())
        .context("Failed to attach to target")?;

    info!("Successfully attached to target");

    // Get the core
    let mut core = session.core(0)?;

    // Set up RTT - scan entire RAM
    let mut rtt =
        Rtt::attach_region(&mut core, &ScanRegion::Ram).context("Failed to attach RTT")?;

    info!("RTT attached successfully");
    for (idx, channel) in rtt.up_channels().iter().enumerate() {
        info!("  up{}: {}", idx, channel.name().unwrap_or("unnamed"));
    }
    for (idx, channel) in rtt.down_channels().iter().enumerate() {
        info!("  down{}: {}", idx, channel.name().unwrap_or("unnamed"));
    }

    // Find well-known channels by name
    let mut find_up = |name: &str| -> Option<usize> {
        rtt.up_channels().iter().enumerate().find_map(|(i, ch)| {
            if ch.name().map(|n| n == name).unwrap_or(false) {
                Some(i)
            } else {
                None
            }
        })
    };
    let data_up_idx = if cfg.stream_data() { find_up("data").or(Some(1)) } else { None };
    let defmt_up_idx = if cfg.stream_defmt() { find_up("defmt").or(Some(0)) } else { None };
    let cmd_down_idx = {
        let found = rtt.down_channels().iter().enumerate().find_map(|(i, ch)| {
            if ch.name().map(|n| n == "cmd").unwrap_or(false) {
                Some(i)
            } else {
                None
            }
        });
        found.or(Some(0))
    };
    info!(
        "Using channels: data={:?}, defmt={:?}, cmd={:?}",
        data_up_idx, defmt_up_idx, cmd_down_idx
    );

    // Prepare defmt decoder (ELF path)
    let default_elf = {
        let p = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../device/target/thumbv7em-none-eabihf/release/oxistep");
        p.to_string_lossy().into_owned()
    };
    let defmt_table: Option<Table> = if defmt_up_idx.is_some() {
        let elf_path = elf_from_cfg.unwrap_or(default_elf);
        let elf_bytes = fs::read(&elf_path)
            .with_context(|| format!("Failed to read ELF at {}", elf_path))?;
        Some(
            Table::parse(&elf_bytes)
                .context("Parsing defmt table from ELF failed")?
                .ok_or_else(|| anyhow::anyhow!("No .defmt section in ELF; build device with defmt"))?,
        )
    } else {
        None
    };
    let mut defmt_stream: Option<Box<dyn StreamDecoder + Send + Sync + '_>> =
        defmt_table.as_ref().map(|t| t.new_stream_decoder());

    // Read commands from stdin in the background
    let (cmd_tx, mut cmd_rx) = tokio::sync::mpsc::unbounded_channel::<MotorCommand>();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_command(&line) {
                Some(cmd) => {
                    let _ = cmd_tx.send(cmd);
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unrecognized command: {:?}", line.trim()),
            }
        }
    });

    // Main pump loop: defmt and status frames up, commands down
    let mut buf = vec![0u8; 4096];
    let mut defbuf = vec![0u8; 2048];
    let mut cobs_acc: CobsAccumulator<512> = CobsAccumulator::new();
    loop {
        // Read DATA channel (COBS-framed postcard status frames)
        if let Some(up_idx) = data_up_idx
            && let Some(channel) = rtt.up_channels().get_mut(up_idx)
        {
            let count = channel.read(&mut core, &mut buf)?;
            if count > 0 {
                let mut window = &buf[..count];
                while !window.is_empty() {
                    window = match cobs_acc.feed::<UpFrame>(window) {
                        FeedResult::Consumed => break,
                        FeedResult::OverFull(rest) => rest,
                        FeedResult::DeserError(rest) => rest,
                        FeedResult::Success { data, remaining } => {
                            match data {
                                UpFrame::Hello(dev) => {
                                    info!(
                                        "Device connected: hw='{}' sw='{}'",
                                        dev.hw.as_str(),
                                        dev.sw.as_str()
                                    );
                                }
                                UpFrame::Status(st) => {
                                    info!(
                                        "Motor: {:?} sector={} period={} duty={}",
                                        st.state, st.sector, st.period, st.duty
                                    );
                                }
                            }
                            remaining
                        }
                    };
                }
            }
        }

        // Read DEFMT channel and decode
        if let (Some(up_idx), Some(stream)) = (defmt_up_idx, defmt_stream.as_mut())
            && let Some(channel) = rtt.up_channels().get_mut(up_idx)
        {
            let count = channel.read(&mut core, &mut defbuf)?;
            if count > 0 {
                stream.received(&defbuf[..count]);
                loop {
                    match stream.decode() {
                        Ok(frame) => {
                            println!("{}", frame.display(true));
                        }
                        Err(DecodeError::UnexpectedEof) => break,
                        Err(DecodeError::Malformed) => {
                            error!("Malformed defmt frame");
                            break;
                        }
                    }
                }
            }
        }

        // Flush pending commands to the RTT down channel
        while let Ok(cmd) = cmd_rx.try_recv() {
            if let Some(di) = cmd_down_idx
                && let Some(channel) = rtt.down_channels().get_mut(di)
            {
                let frame = postcard::to_stdvec_cobs(&cmd)
                    .context("Failed to encode motor command")?;
                let _ = channel.write(&mut core, &frame)?;
                info!("Sent {:?}", cmd);
            }
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

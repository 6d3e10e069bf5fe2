mod cli;

use std::net::{TcpListener, TcpStream};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dap_transport::ProbeSession;
use rsp_engine::Session;
use swd_adiv5::{walk_rom_table, ArmDebugInterface, DiscoveredComponent};
use target_core::{Adiv5Target, ProbeOnlyTarget, Target};
use tracing::{error, info, warn};

use cli::Cli;

/// Bit 0 of AP_BASE: set when the AP actually has a debug entry point.
/// ADIv5 calls this "Format"/"Present"; bits [11:0] below it are status,
/// the table base address lives in bits [31:12].
const AP_BASE_PRESENT: u32 = 0x1;
const AP_BASE_ADDRESS_MASK: u32 = !0xFFF;

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "rsp_bridge=info,rsp_engine=info",
        1 => "rsp_bridge=debug,rsp_engine=debug,target_core=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .init();
}

/// Enumerate access ports, walk the ROM table of the first one that
/// looks like a system-memory AP, and build a [`Target`] around the
/// first System Control Space found. Falls back to a probe-only target
/// (no core register/memory access) when no SCS turns up, rather than
/// failing the whole connection.
fn discover_target(mut engine: ArmDebugInterface) -> Result<Target> {
    let aps = engine.enumerate_aps().context("enumerating access ports")?;
    if aps.is_empty() {
        warn!("no access ports found on this target; running probe-only");
        return Ok(Target::ProbeOnly(ProbeOnlyTarget::new(engine)));
    }

    for ap_sel in aps {
        match engine.read_ap_idr(ap_sel) {
            Ok(idr) if idr.is_mem_ap() => {}
            Ok(_) => {
                warn!(ap_sel, "AP is not a MEM-AP, skipping");
                continue;
            }
            Err(err) => {
                warn!(ap_sel, %err, "failed to read AP_IDR, skipping");
                continue;
            }
        }

        let base = match engine.read_ap_base(ap_sel) {
            Ok(base) => base,
            Err(err) => {
                warn!(ap_sel, %err, "failed to read AP_BASE, skipping");
                continue;
            }
        };
        if base & AP_BASE_PRESENT == 0 {
            continue;
        }
        if let Ok(cfg) = engine.read_ap_cfg(ap_sel) {
            tracing::debug!(ap_sel, cfg = format!("{cfg:#010x}"), "read MEM-AP CFG");
        }
        let table_base = base & AP_BASE_ADDRESS_MASK;

        let mut components: Vec<DiscoveredComponent> = Vec::new();
        if let Err(err) = walk_rom_table(&mut engine, ap_sel, table_base, 0, &mut components) {
            warn!(ap_sel, %err, "ROM table walk failed, skipping this AP");
            continue;
        }

        if let Some(scs) = components.iter().find(|c| c.peripheral_id.known_part.is_scs()) {
            info!(ap_sel, base = scs.base_address, "found System Control Space");
            return Ok(Target::Adiv5(Adiv5Target::new(engine, ap_sel)));
        }
    }

    warn!("no System Control Space found on any access port; running probe-only");
    Ok(Target::ProbeOnly(ProbeOnlyTarget::new(engine)))
}

fn run(cli: Cli) -> Result<()> {
    let probe = ProbeSession::open(cli.probe).context("opening CMSIS-DAP probe")?;
    info!(
        vendor = probe.vendor(),
        product = probe.product(),
        firmware = probe.firmware_version(),
        "probe connected"
    );

    let probe_idcode = probe.idcode();
    let mut engine = ArmDebugInterface::new(probe, probe_idcode);
    engine
        .probe_mut()
        .set_speed(cli.speed_khz.saturating_mul(1000))
        .context("negotiating SWD clock speed")?;
    let idcode = engine
        .idcode()
        .context("probe did not report a DP IDCODE during bring-up")?;
    info!(idcode = format!("{idcode:#010x}"), "SWD link up");

    let mut target = discover_target(engine)?;

    let listener = TcpListener::bind(&cli.listen)
        .with_context(|| format!("binding GDB listen address {}", cli.listen))?;
    info!(addr = %cli.listen, "waiting for a GDB connection");

    loop {
        let (stream, peer) = listener.accept().context("accepting GDB connection")?;
        info!(%peer, "GDB connected");
        if let Err(err) = serve_connection(stream, &mut target) {
            error!(%peer, %err, "session ended with an error");
        } else {
            info!(%peer, "GDB disconnected");
        }
    }
}

fn serve_connection(stream: TcpStream, target: &mut Target) -> Result<()> {
    let reader = stream.try_clone().context("cloning GDB socket for reading")?;
    let mut session = Session::new(reader, stream);
    session.run(target).map_err(|e| anyhow!(e.to_string()))
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

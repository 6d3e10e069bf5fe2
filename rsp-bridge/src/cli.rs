//! Command-line surface, translated from the original probe/chip option
//! set onto this bridge's narrower scope (one probe, one MEM-AP target,
//! no chip database).

use clap::Parser;

fn parse_vid_pid(s: &str) -> Result<(u16, u16), String> {
    let (vid, pid) = s
        .split_once(':')
        .ok_or_else(|| "expected VID:PID in hex, e.g. 0d28:0204".to_string())?;
    let vid = u16::from_str_radix(vid, 16).map_err(|e| e.to_string())?;
    let pid = u16::from_str_radix(pid, 16).map_err(|e| e.to_string())?;
    Ok((vid, pid))
}

#[derive(Debug, Parser)]
#[command(name = "rsp-bridge", about = "GDB Remote Serial Protocol bridge for CMSIS-DAP/SWD")]
pub struct Cli {
    /// Address and port GDB should connect to.
    #[arg(long = "listen", default_value = "127.0.0.1:1337")]
    pub listen: String,

    /// Restrict probe discovery to a specific VID:PID (hex), e.g. 0d28:0204.
    #[arg(long = "probe", value_parser = parse_vid_pid)]
    pub probe: Option<(u16, u16)>,

    /// SWD clock, in kHz. Clamped to the probe's 10 MHz ceiling.
    #[arg(long = "speed-khz", default_value_t = 100)]
    pub speed_khz: u32,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_vid_pid_accepts_hex_pair() {
        assert_eq!(parse_vid_pid("0d28:0204"), Ok((0x0d28, 0x0204)));
    }

    #[test]
    fn parse_vid_pid_rejects_missing_colon() {
        assert!(parse_vid_pid("0d280204").is_err());
    }
}

mod devices;
mod flight;
mod session;

use std::env;
use std::io;
use std::process;

use collector_core::config::{ControllerConfig, parse_assignments};

use session::{Session, TranscriptProfile};

const USAGE: &str =
    "Usage: collector-emulator [--profile <nominal|dropout|servo-fault|float>] [key=value ...]";

fn main() -> io::Result<()> {
    let (profile, config) = parse_args(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let summary = Session::new(profile, config)?.fly()?;
    if summary.final_state.is_some_and(|state| state.is_open()) {
        eprintln!("door left open at touchdown");
        process::exit(1);
    }
    Ok(())
}

fn parse_args(
    args: impl IntoIterator<Item = String>,
) -> Result<(TranscriptProfile, ControllerConfig), String> {
    let mut args = args.into_iter();
    let mut profile = None;
    let mut assignments = Vec::new();

    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            profile = Some(TranscriptProfile::from_tag(value)?);
        } else if arg == "--profile" {
            let value = args
                .next()
                .ok_or_else(|| "Expected value after --profile".to_string())?;
            profile = Some(TranscriptProfile::from_tag(&value)?);
        } else if arg.contains('=') {
            assignments.push(arg);
        } else {
            profile = Some(TranscriptProfile::from_tag(&arg)?);
        }
    }

    let line = assignments.join(" ");
    let config = parse_assignments(&line, ControllerConfig::default())
        .map_err(|err| format!("Invalid configuration: {err}"))?;

    Ok((
        profile.unwrap_or(TranscriptProfile(flight::FlightProfile::Nominal)),
        config,
    ))
}

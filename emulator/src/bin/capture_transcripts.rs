use std::io;

#[allow(dead_code)]
#[path = "../devices.rs"]
mod devices;
#[allow(dead_code)]
#[path = "../flight.rs"]
mod flight;
#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use collector_core::config::ControllerConfig;

use flight::FlightProfile;
use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    for profile in FlightProfile::ALL {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: FlightProfile) -> io::Result<()> {
    let session = Session::new(TranscriptProfile(profile), ControllerConfig::default())?;
    let summary = session.fly()?;
    println!(
        "{}: {} cycles, {} openings, {} faults",
        profile.tag(),
        summary.cycles,
        summary.openings,
        summary.faults
    );
    Ok(())
}

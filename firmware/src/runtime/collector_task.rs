use embassy_futures::select::{Either, select};
use embassy_time::Timer;

use super::{DisarmSignal, FlightController};
use crate::telemetry::{FirmwareInstant, LoggingRecorder, to_embassy};

/// Runs control cycles until disarmed, then closes the door and parks.
///
/// Disarm is only acted on between cycles. A pause in progress is cut short,
/// but a device call is never interrupted.
#[embassy_executor::task]
pub async fn run(
    mut controller: FlightController,
    mut telemetry: LoggingRecorder,
    disarm: &'static DisarmSignal,
) -> ! {
    let mut cycles: u32 = 0;

    'flight: loop {
        let report = controller.run_cycle(FirmwareInstant::now(), &mut telemetry);
        cycles = cycles.wrapping_add(1);

        for pause in report.pauses {
            if let Either::Second(()) = select(Timer::after(to_embassy(pause)), disarm.wait()).await {
                break 'flight;
            }
        }
    }

    defmt::info!("collector: disarmed after {} cycles", cycles);
    match controller.close_for_shutdown(FirmwareInstant::now(), &mut telemetry) {
        Ok(()) => defmt::info!("collector: door closed, parking"),
        Err(error) => defmt::error!(
            "collector: shutdown close failed: {}",
            defmt::Display2Format(&error)
        ),
    }

    loop {
        Timer::after_secs(3_600).await;
    }
}

use embassy_stm32::exti::ExtiInput;
use embassy_time::Timer;

use super::DisarmSignal;

const DEBOUNCE_MS: u64 = 50;

#[embassy_executor::task]
pub async fn run(mut button: ExtiInput<'static>, disarm: &'static DisarmSignal) -> ! {
    loop {
        button.wait_for_falling_edge().await;
        Timer::after_millis(DEBOUNCE_MS).await;
        if button.is_low() {
            defmt::info!("disarm: button held, requesting shutdown");
            disarm.signal(());
        }
        button.wait_for_high().await;
    }
}

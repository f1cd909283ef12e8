use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{OutputType, Pull};
use embassy_stm32::i2c::{self, I2c};
use embassy_stm32::time::hz;
use embassy_stm32::timer::low_level::CountingMode;
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::signal::Signal;

use collector_core::collector::ThresholdActuatorController;
use collector_core::config::ControllerConfig;
use collector_core::sensors::bme280::{self, Bme280};
use collector_core::sensors::STANDARD_SEA_LEVEL_HPA;
use collector_core::servo::ServoCalibration;

use crate::hw::{I2cRegisterBus, ServoActuator};
use crate::telemetry::{FirmwareInstant, LoggingRecorder};

mod collector_task;
mod disarm_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Sea-level reference for the barometric altitude conversion.
const SEA_LEVEL_HPA: f32 = STANDARD_SEA_LEVEL_HPA;

/// Servo frame rate.
const SERVO_FRAME_HZ: u32 = 50;

pub(super) type DisarmSignal = Signal<ThreadModeRawMutex, ()>;

pub(super) type FlightController =
    ThresholdActuatorController<Bme280<I2cRegisterBus>, ServoActuator, FirmwareInstant>;

/// Raised once the recovery crew presses the disarm button.
pub(super) static DISARM: DisarmSignal = Signal::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        I2C1,
        PB6,
        PB7,
        TIM3,
        PA6,
        PA0,
        EXTI0,
        ..
    } = hal::init(config);

    let i2c = I2c::new_blocking(I2C1, PB6, PB7, i2c::Config::default());
    let altimeter = Bme280::new(I2cRegisterBus::new(i2c, bme280::DEFAULT_ADDRESS))
        .with_sea_level_hpa(SEA_LEVEL_HPA);

    let pwm = SimplePwm::new(
        TIM3,
        Some(PwmPin::new(PA6, OutputType::PushPull)),
        None,
        None,
        None,
        hz(SERVO_FRAME_HZ),
        CountingMode::EdgeAlignedUp,
    );
    let servo = ServoActuator::new(pwm, ServoCalibration::default());

    let controller = ThresholdActuatorController::new(ControllerConfig::default(), altimeter, servo);
    let disarm_button = ExtiInput::new(PA0, EXTI0, Pull::Up);

    spawner
        .spawn(collector_task::run(controller, LoggingRecorder::new(), &DISARM))
        .expect("failed to spawn collector task");

    spawner
        .spawn(disarm_task::run(disarm_button, &DISARM))
        .expect("failed to spawn disarm task");

    core::future::pending::<()>().await;
}

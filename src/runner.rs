//! Command loop wrapping the motor operations, for firmware that drives the
//! motor from a queue: commands arrive on a channel and each one is raced
//! against a stop signal. This is the cancellation contract for unbounded
//! spins: signalling stop drops the in-flight operation at its next step
//! boundary, leaving the position estimate consistent.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use embassy_time::Duration;

use crate::hardware::PhaseDriver;
use crate::motor::StepperMotor;
use crate::{Direction, MotorError};

const COMMAND_BUFFER_CAPACITY: usize = 16;

pub type CommandChannel =
    Channel<CriticalSectionRawMutex, MotorCommand, COMMAND_BUFFER_CAPACITY>;

pub type CommandReceiver<'a> =
    Receiver<'a, CriticalSectionRawMutex, MotorCommand, COMMAND_BUFFER_CAPACITY>;

pub type CommandSender<'a> =
    Sender<'a, CriticalSectionRawMutex, MotorCommand, COMMAND_BUFFER_CAPACITY>;

pub type StopSignal = Signal<CriticalSectionRawMutex, ()>;

#[derive(Debug, Copy, Clone)]
pub enum MotorCommand {
    SetAngle {
        target: f32,
        direction: Direction,
        delay: Duration,
    },
    Spin {
        revolutions: f32,
        rpm: f32,
        direction: Direction,
    },
    Align {
        direction: Direction,
    },
}

/// Consume commands until a driver or configuration fault occurs. Rejected
/// arguments are logged and skipped; a stop signal cancels only the command
/// in flight.
pub async fn run<D: PhaseDriver>(
    motor: &mut StepperMotor<D>,
    commands: CommandReceiver<'_>,
    stop: &StopSignal,
) -> Result<(), MotorError<D::Error>> {
    loop {
        let command = commands.receive().await;
        match select(execute(motor, command), stop.wait()).await {
            Either::First(Ok(())) => {
                log::info!("motion done");
            }
            Either::First(Err(MotorError::InvalidArgument(reason))) => {
                log::warn!("command rejected: {}", reason);
            }
            Either::First(Err(err)) => {
                log::error!("motor fault: {}", err);
                return Err(err);
            }
            Either::Second(()) => {
                log::info!("motion stopped");
            }
        }
    }
}

async fn execute<D: PhaseDriver>(
    motor: &mut StepperMotor<D>,
    command: MotorCommand,
) -> Result<(), MotorError<D::Error>> {
    match command {
        MotorCommand::SetAngle {
            target,
            direction,
            delay,
        } => motor.set_rotor(target, direction, delay).await,
        MotorCommand::Spin {
            revolutions,
            rpm,
            direction,
        } => motor.spin_rotor(revolutions, rpm, direction).await,
        MotorCommand::Align { direction } => motor.align_rotor(direction).await,
    }
}

//! Example: Configuration-driven printing moves.
//!
//! This example demonstrates how to:
//! - Parse and validate a machine description from TOML
//! - Dispatch decoded G-code commands through the planner queue
//! - Run the step generator against mock pins until the queue drains
//!
//! Run with: `cargo run --example config_driven --features std`

use motion_core::{
    parse_config, BlockMode, Command, CommandDispatcher, MachineState, Planner, SharedQueue,
    StepGenerator, StepTimer, Words,
};
use motion_core::error::Result;
use motion_core::stepper::{EndstopBank, PinBank};

/// Mock STEP pin counting rising edges.
#[derive(Default)]
struct MockStepPin {
    high: bool,
    edges: u32,
}

impl embedded_hal::digital::ErrorType for MockStepPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for MockStepPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        if !self.high {
            self.edges += 1;
        }
        self.high = true;
        Ok(())
    }
}

/// Mock DIR / ENABLE pin.
#[derive(Default)]
struct MockPin;

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

/// Mock endstop that never triggers.
struct OpenSwitch;

impl embedded_hal::digital::ErrorType for OpenSwitch {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::InputPin for OpenSwitch {
    fn is_high(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(false)
    }

    fn is_low(&mut self) -> core::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Mock timer: adds every armed period to a simulated clock.
#[derive(Default)]
struct SimulatedTimer {
    ticks: u64,
    pending: u32,
}

impl StepTimer for SimulatedTimer {
    fn arm(&mut self, ticks: u32) {
        self.pending = ticks;
    }
}

impl SimulatedTimer {
    fn expire(&mut self) {
        self.ticks += u64::from(self.pending);
    }
}

/// Mock delay for demonstration.
struct MockDelay;

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, _ns: u32) {
        // In real code, this would actually delay
    }
}

fn main() -> Result<()> {
    println!("=== Configuration-Driven Motion Example ===\n");

    let toml_content = r#"
[timing]
timer_hz = 1000000
step_rate_hz = 20000

[planner]
default_feedrate = 30.0
limit_policy = "clamp"

[[axes]]
name = "X"
min_limit = 0.0
max_limit = 200.0

[[axes]]
name = "Y"
min_limit = 0.0
max_limit = 200.0

[[joints]]
name = "x"
stepper_id = 0
min_endstop_id = 0
min_limit = 0.0
max_limit = 200.0
max_velocity = 150.0
max_acceleration = 2000.0
scale = 80.0

[[joints]]
name = "y"
stepper_id = 1
min_endstop_id = 1
min_limit = 0.0
max_limit = 200.0
max_velocity = 150.0
max_acceleration = 2000.0
scale = 80.0

[[extruders]]
name = "e0"
stepper_id = 2
max_velocity = 40.0
max_acceleration = 3000.0
scale = 415.0
"#;

    let config = parse_config(toml_content)?;

    println!("Machine Configuration:");
    println!("  Step rate: {} steps/s", config.timing.step_rate_hz);
    for joint in config.joints.iter() {
        println!(
            "  Joint {}: {} steps/unit, max {} units/s",
            joint.name,
            joint.scale,
            joint.max_velocity.value()
        );
    }
    for extruder in config.extruders.iter() {
        println!("  Extruder {}: {} steps/unit", extruder.name, extruder.scale);
    }
    println!();

    let queue: SharedQueue<16> = SharedQueue::new();
    let state = MachineState::new();

    let pins = PinBank::new(
        [MockStepPin::default(), MockStepPin::default(), MockStepPin::default()],
        [MockPin, MockPin, MockPin],
        MockPin,
    );
    let endstops = EndstopBank::new([OpenSwitch, OpenSwitch]);
    let mut stepper = StepGenerator::new(
        &config,
        &queue,
        &state,
        pins,
        SimulatedTimer::default(),
        endstops,
    );
    stepper.start();

    let mut dispatcher = CommandDispatcher::new(Planner::new(&config, &queue, &state), MockDelay);

    // A square with extrusion, the last corner out of range and clamped
    let program = [
        Command::Move {
            words: Words::default().axis(0, 20.0).axis(1, 20.0),
            feedrate: Some(6000.0),
        },
        Command::RelativeExtrusion,
        Command::Move {
            words: Words::default().axis(0, 60.0).extruder(0, 2.0),
            feedrate: Some(1800.0),
        },
        Command::Move {
            words: Words::default().axis(1, 60.0).extruder(0, 2.0),
            feedrate: None,
        },
        Command::Move {
            words: Words::default().axis(0, 250.0).extruder(0, 2.0),
            feedrate: None,
        },
        Command::Move {
            words: Words::default().axis(0, 20.0).axis(1, 20.0),
            feedrate: Some(6000.0),
        },
    ];

    println!("Dispatching {} commands", program.len());
    for command in program {
        dispatcher.dispatch(command)?;
    }
    println!("  Queued blocks: {}", queue.len());
    let position = dispatcher.position();
    println!(
        "  Planned end: X{} Y{} E{}",
        position.axes[0], position.axes[1], position.extruders[0]
    );
    println!();

    // Stand-in for the timer interrupt
    loop {
        stepper.on_timer();
        if let Some(reason) = state.estop() {
            println!("Emergency stop: {}", reason);
            break;
        }
        if queue.is_empty() && stepper.current_mode() == BlockMode::Idle {
            break;
        }
        stepper.timer_mut().expire();
    }

    let elapsed = stepper.timer().ticks as f32 / config.timing.timer_hz as f32;
    let extruded = stepper.extruder_steps(0).unwrap_or(0);
    let (pins, _, _) = stepper.release();
    let (step_pins, _, _) = pins.release();

    println!("Step Output:");
    for (joint, pin) in config.joints.iter().zip(step_pins.iter()) {
        println!("  {}: {} steps", joint.name, pin.edges);
    }
    println!("  e0: {} steps", extruded);
    println!("  Simulated time: {:.3}s", elapsed);
    println!();

    println!("Joint State:");
    for (joint, js) in config.joints.iter().zip(state.joints().iter()) {
        println!(
            "  {}: pos {:.3} ({} steps), stopped: {}",
            joint.name, js.pos, js.step_pos, js.stopped
        );
    }

    println!("\n=== Example Complete ===");

    Ok(())
}

//! Homing against a simulated machine.

use motion_core::{
    parse_config, EstopReason, Error, HomeStage, Homing, MachineState, Planner, SharedQueue,
    StepGenerator,
};

use super::sim::{SimDelay, SimEndstops, SimPins, SimTimer, SimWorld, Switch, QUEUE};

/// z homes first toward its max switch with a latch release; x releases its
/// min switch; y backs off and latches onto its min switch again.
const GANTRY: &str = r#"
[timing]
timer_hz = 1000000
step_rate_hz = 10000
idle_ticks = 1000

[[axes]]
name = "X"
min_limit = 0.0
max_limit = 20.0

[[axes]]
name = "Y"
min_limit = 0.0
max_limit = 20.0

[[axes]]
name = "Z"
min_limit = 0.0
max_limit = 10.0

[[joints]]
name = "x"
stepper_id = 0
min_endstop_id = 0
min_limit = 0.0
max_limit = 20.0
max_velocity = 50.0
max_acceleration = 1000.0
scale = 10.0
home_search_vel = -20.0
home_latch_vel = 2.0
home_sequence = 1

[[joints]]
name = "y"
stepper_id = 1
min_endstop_id = 1
min_limit = 0.0
max_limit = 20.0
max_velocity = 50.0
max_acceleration = 1000.0
scale = 10.0
home_search_vel = -20.0
home_latch_vel = -2.0
home_sequence = 1

[[joints]]
name = "z"
stepper_id = 2
max_endstop_id = 2
min_limit = 0.0
max_limit = 10.0
max_velocity = 20.0
max_acceleration = 500.0
scale = 10.0
home_search_vel = 10.0
home_latch_vel = -1.0
home_sequence = 0
"#;

fn wired() -> Vec<Switch> {
    vec![
        Switch::min(0, 0, -50),
        Switch::min(1, 1, -80),
        Switch::max(2, 2, 30),
    ]
}

#[test]
fn test_groups_home_in_sequence_order() {
    let config = parse_config(GANTRY).unwrap();
    let queue: SharedQueue<QUEUE> = SharedQueue::new();
    let state = MachineState::new();
    let world = SimWorld::new(wired());

    let mut generator = StepGenerator::new(
        &config,
        &queue,
        &state,
        SimPins::new(&world),
        SimTimer::default(),
        SimEndstops::new(&world),
    );
    let mut delay = SimDelay::new(&mut generator, &state, config.timing.timer_hz);
    let mut planner = Planner::new(&config, &queue, &state);
    let mut homing = Homing::new();

    homing.run(&mut planner, &mut delay, 0b111).unwrap();

    for j in 0..3 {
        assert_eq!(homing.stage(j), HomeStage::Final);
        assert!(state.joint(j).unwrap().homed);
    }
    assert!(!state.is_estopped());

    // Switch positions became the configured home positions
    let position = planner.current_position();
    assert!(position.axes[0].abs() < 1e-3);
    assert!(position.axes[1].abs() < 1e-3);
    assert!((position.axes[2] - 10.0).abs() < 1e-3);

    // x and y stay put until z is homed
    let first_xy_motion = delay
        .history
        .iter()
        .position(|joints| joints[0].step_pos != 0 || joints[1].step_pos != 0)
        .expect("x/y never moved");
    assert!(first_xy_motion > 0);
    for joints in &delay.history[first_xy_motion..] {
        assert!(joints[2].homed);
    }
    for joints in &delay.history[..first_xy_motion] {
        assert!(!joints[0].homed && !joints[1].homed);
    }

    // Physically the axes ended at their switches
    assert_eq!(world.steps(0), -49);
    assert_eq!(world.steps(1), -80);
    assert_eq!(world.steps(2), 29);
}

#[test]
fn test_selected_joints_only() {
    let config = parse_config(GANTRY).unwrap();
    let queue: SharedQueue<QUEUE> = SharedQueue::new();
    let state = MachineState::new();
    let world = SimWorld::new(wired());

    let mut generator = StepGenerator::new(
        &config,
        &queue,
        &state,
        SimPins::new(&world),
        SimTimer::default(),
        SimEndstops::new(&world),
    );
    let mut delay = SimDelay::new(&mut generator, &state, config.timing.timer_hz);
    let mut planner = Planner::new(&config, &queue, &state);
    let mut homing = Homing::new();

    homing.run(&mut planner, &mut delay, 0b100).unwrap();

    assert_eq!(homing.stage(0), HomeStage::None);
    assert_eq!(homing.stage(2), HomeStage::Final);
    assert!(!state.joint(0).unwrap().homed);
    assert!(state.joint(2).unwrap().homed);
    assert_eq!(world.steps(0), 0);
    assert_eq!(world.steps(1), 0);
}

#[test]
fn test_missing_switch_trips_travel_limit() {
    let config = parse_config(GANTRY).unwrap();
    let queue: SharedQueue<QUEUE> = SharedQueue::new();
    let state = MachineState::new();
    // x's switch is never reached
    let world = SimWorld::new(vec![Switch::min(1, 1, -80), Switch::max(2, 2, 30)]);

    let mut generator = StepGenerator::new(
        &config,
        &queue,
        &state,
        SimPins::new(&world),
        SimTimer::default(),
        SimEndstops::new(&world),
    );
    let mut delay = SimDelay::new(&mut generator, &state, config.timing.timer_hz);
    let mut planner = Planner::new(&config, &queue, &state);
    let mut homing = Homing::new();

    let result = homing.run(&mut planner, &mut delay, 0b001);
    let reason = EstopReason::TravelLimit { joint: 0 };
    assert_eq!(result, Err(Error::Estop(reason)));
    assert_eq!(state.estop(), Some(reason));
    assert!(!state.joint(0).unwrap().homed);

    // Search travel is bounded by 1.5x the 20 unit range
    let travelled = -world.steps(0);
    assert!(travelled > 300, "stopped early at {travelled}");
    assert!(travelled < 2 * 200, "ran away to {travelled}");

    // The estop block stops the joint
    embedded_hal::delay::DelayNs::delay_ms(&mut delay, 100);
    let stopped_at = world.steps(0);
    embedded_hal::delay::DelayNs::delay_ms(&mut delay, 500);
    assert_eq!(world.steps(0), stopped_at);
    assert!(delay.generator().is_estopped());
    assert!(!delay.generator().pins().enabled);
}

#[test]
fn test_wrong_switch_trips_incorrect_limit() {
    let config = parse_config(GANTRY).unwrap();
    let queue: SharedQueue<QUEUE> = SharedQueue::new();
    let state = MachineState::new();
    // z searches toward max but the switch that closes is wired as min
    let mut patched = config.clone();
    patched.joints[2].min_endstop_id = Some(3);
    patched.joints[2].max_endstop_id = Some(2);
    let world = SimWorld::new(vec![Switch::min(3, 2, 0), Switch::max(2, 2, 1000)]);

    let mut generator = StepGenerator::new(
        &patched,
        &queue,
        &state,
        SimPins::new(&world),
        SimTimer::default(),
        SimEndstops::new(&world),
    );
    let mut delay = SimDelay::new(&mut generator, &state, patched.timing.timer_hz);
    let mut planner = Planner::new(&patched, &queue, &state);
    let mut homing = Homing::new();

    let result = homing.run(&mut planner, &mut delay, 0b100);
    assert_eq!(
        result,
        Err(Error::Estop(EstopReason::IncorrectLimitHit { joint: 2 }))
    );
}

#[test]
fn test_homing_refused_while_estopped() {
    let config = parse_config(GANTRY).unwrap();
    let queue: SharedQueue<QUEUE> = SharedQueue::new();
    let state = MachineState::new();
    let world = SimWorld::new(wired());

    let mut generator = StepGenerator::new(
        &config,
        &queue,
        &state,
        SimPins::new(&world),
        SimTimer::default(),
        SimEndstops::new(&world),
    );
    let mut delay = SimDelay::new(&mut generator, &state, config.timing.timer_hz);
    let mut planner = Planner::new(&config, &queue, &state);
    planner.estop(EstopReason::Requested);

    let result = Homing::new().run(&mut planner, &mut delay, 0b111);
    assert_eq!(result, Err(Error::Estop(EstopReason::Requested)));
    assert!(delay.history.is_empty());
}

//! Command dispatcher behaviour.

use embedded_hal_mock::eh1::delay::NoopDelay;
use motion_core::error::MotionError;
use motion_core::planner::BlockMode;
use motion_core::{
    parse_config, Block, BlockKind, Command, CommandDispatcher, Error, MachineConfig,
    MachineState, Planner, SharedQueue, Wait, Words,
};

const PRINTER: &str = r#"
[planner]
default_feedrate = 20.0

[[axes]]
name = "X"
min_limit = 0.0
max_limit = 100.0

[[joints]]
name = "x"
stepper_id = 0
min_limit = 0.0
max_limit = 100.0
max_velocity = 80.0
max_acceleration = 1000.0
scale = 10.0

[[extruders]]
name = "e0"
stepper_id = 1
max_velocity = 50.0
max_acceleration = 1000.0
scale = 100.0
"#;

type Dispatcher<'a> = CommandDispatcher<'a, NoopDelay, 16>;

fn dispatcher<'a>(
    config: &'a MachineConfig,
    queue: &'a SharedQueue<16>,
    state: &'a MachineState,
) -> Dispatcher<'a> {
    CommandDispatcher::new(Planner::new(config, queue, state), NoopDelay::new())
}

fn move_x(x: f32, feedrate: Option<f32>) -> Command {
    Command::Move {
        words: Words::default().axis(0, x),
        feedrate,
    }
}

fn block(queue: &SharedQueue<16>, offset: usize) -> Option<Block> {
    queue.with(|q| q.peek(offset).copied())
}

fn nominal(queue: &SharedQueue<16>, offset: usize) -> f32 {
    block(queue, offset)
        .and_then(|b| b.positional().map(|p| p.nominal_speed))
        .expect("no positional block")
}

#[test]
fn test_feedrate_is_modal_and_per_minute() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    assert_eq!(d.feedrate(), 20.0);
    d.dispatch(move_x(10.0, None)).unwrap();
    d.dispatch(move_x(20.0, Some(600.0))).unwrap();
    d.dispatch(move_x(30.0, None)).unwrap();

    assert_eq!(nominal(&queue, 0), 20.0);
    assert_eq!(nominal(&queue, 1), 10.0);
    assert_eq!(nominal(&queue, 2), 10.0);
    assert_eq!(d.feedrate(), 10.0);
}

#[test]
fn test_feedrate_capped_by_joint_speed() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(move_x(50.0, Some(60_000.0))).unwrap();
    assert_eq!(nominal(&queue, 0), 80.0);
}

#[test]
fn test_relative_positioning() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(move_x(10.0, None)).unwrap();
    d.dispatch(Command::RelativePositioning).unwrap();
    d.dispatch(move_x(5.0, None)).unwrap();
    d.dispatch(move_x(5.0, None)).unwrap();
    assert_eq!(d.position().axes[0], 20.0);

    d.dispatch(Command::AbsolutePositioning).unwrap();
    d.dispatch(move_x(5.0, None)).unwrap();
    assert_eq!(d.position().axes[0], 5.0);
    assert_eq!(queue.len(), 4);
}

#[test]
fn test_relative_extrusion_leaves_axes_absolute() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(Command::RelativeExtrusion).unwrap();
    let words = Words::default().axis(0, 10.0).extruder(0, 1.0);
    d.dispatch(Command::Move { words, feedrate: None }).unwrap();
    d.dispatch(Command::Move { words, feedrate: None }).unwrap();

    let position = d.position();
    assert_eq!(position.axes[0], 10.0);
    assert_eq!(position.extruders[0], 2.0);

    // Second move only extrudes
    let p = block(&queue, 1).unwrap();
    let p = p.positional().unwrap();
    assert_eq!(p.steps[0], 0);
    assert_eq!(p.steps[1], 100);
}

#[test]
fn test_out_of_limits_move_keeps_position() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(move_x(10.0, None)).unwrap();
    let result = d.dispatch(move_x(150.0, None));
    assert!(matches!(
        result,
        Err(Error::Motion(MotionError::OutOfLimits { axis: 0, .. }))
    ));
    assert_eq!(d.position().axes[0], 10.0);
    assert_eq!(queue.len(), 1);
}

#[test]
fn test_invalid_feedrate_rejected() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    assert_eq!(
        d.dispatch(move_x(10.0, Some(0.0))),
        Err(Error::Motion(MotionError::InvalidFeedrate(0.0)))
    );
    assert_eq!(d.feedrate(), 20.0);
    assert!(queue.is_empty());
}

#[test]
fn test_dwell_blocks_until_elapsed() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(Command::Dwell { ms: 100 }).unwrap();
    assert_eq!(d.wait_state(), Wait::Dwell(100));
    assert_eq!(
        d.dispatch(move_x(10.0, None)),
        Err(Error::Motion(MotionError::Busy))
    );

    assert!(!d.poll(60));
    assert_eq!(d.wait_state(), Wait::Dwell(40));
    assert!(d.poll(50));
    d.dispatch(move_x(10.0, None)).unwrap();
}

#[test]
fn test_wait_for_moves_until_queue_drains() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(move_x(10.0, None)).unwrap();
    d.dispatch(Command::WaitForMoves).unwrap();
    assert!(!d.poll(10));

    // Consumer picks the move up and finishes it
    queue.fetch_block_i(BlockMode::Idle).unwrap();
    assert!(d.poll(10));
    assert_eq!(d.wait_state(), Wait::Ready);
}

#[test]
fn test_estop_accepted_while_waiting() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(move_x(10.0, None)).unwrap();
    d.dispatch(move_x(20.0, None)).unwrap();
    d.dispatch(Command::Dwell { ms: 1000 }).unwrap();
    d.dispatch(Command::Estop).unwrap();

    assert!(state.is_estopped());
    assert_eq!(d.wait_state(), Wait::Ready);
    assert_eq!(queue.len(), 1);
    assert!(matches!(block(&queue, 0).map(|b| b.kind), Some(BlockKind::Estop(_))));

    assert_eq!(
        d.dispatch(move_x(30.0, None)),
        Err(Error::Motion(MotionError::Estopped))
    );

    d.dispatch(Command::EstopClear).unwrap();
    assert!(!state.is_estopped());
    // Nothing moved, so the working position is back at the joints
    assert_eq!(d.position().axes[0], 0.0);
    d.dispatch(move_x(30.0, None)).unwrap();
}

#[test]
fn test_set_position_queues_reset() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(Command::SetPosition(Words::default().axis(0, 50.0).extruder(0, 3.0)))
        .unwrap();
    assert_eq!(d.position().axes[0], 50.0);

    let reset = block(&queue, 0).unwrap();
    match reset.kind {
        BlockKind::Reset(steps) => {
            assert_eq!(steps[0], 500);
            assert_eq!(steps[1], 300);
        }
        other => panic!("unexpected block {other:?}"),
    }

    // Moves are planned from the new origin
    d.dispatch(move_x(51.0, None)).unwrap();
    let p = block(&queue, 1).unwrap();
    assert_eq!(p.positional().unwrap().steps[0], 10);
}

#[test]
fn test_home_without_homed_joints_is_immediate() {
    let config = parse_config(PRINTER).unwrap();
    let queue = SharedQueue::new();
    let state = MachineState::new();
    let mut d = dispatcher(&config, &queue, &state);

    d.dispatch(Command::Home { joint_mask: 0 }).unwrap();
    assert_eq!(d.position().axes[0], 0.0);
}

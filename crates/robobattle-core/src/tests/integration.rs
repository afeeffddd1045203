//! Full battles through the driver: scheduler, resolvers, scoring, loader
//! and control surface working together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use glam::DVec2;

use crate::battle::Battle;
use crate::bridge::BattleControl;
use crate::command::{DebugMark, RobotCommand};
use crate::entity::{BulletState, RobotConsole, RobotId, RobotState};
use crate::error::LoadError;
use crate::observer::{BattleObserver, RecordingObserver};
use crate::program::{
    InputEvent, ProgramFactory, RobotEvent, RobotFactory, RobotProgram, RobotSpec, RobotView,
};
use crate::snapshot::TurnSnapshot;

use super::helpers::{
    arena_config, factory, robot_at, run_recorded, runner, sitting_duck, AbortAt, KillAt,
};

/// Fires a single power-3 bullet as soon as the gun is cold.
fn one_shot_gunner(name: &str) -> Arc<dyn RobotFactory> {
    factory(name, || {
        let mut fired = false;
        move |view: &RobotView, _: &RobotConsole| {
            if !fired && view.status.gun_heat == 0.0 {
                fired = true;
                RobotCommand::new().fire(3.0)
            } else {
                RobotCommand::new()
            }
        }
    })
}

// =============================================================================
// Combat
// =============================================================================

#[test]
fn power_three_bullet_hits_stationary_target() {
    let builder = Battle::builder(arena_config(Some("(100,200,90),(200,200,0)")));
    let control = builder.control();
    let builder = builder
        .robot(one_shot_gunner("test.Gunner"))
        .robot(sitting_duck("test.Target"))
        .observer(AbortAt::boxed(control, 80));
    let (_battle, recording) = run_recorded(builder);
    let snapshots = &recording.snapshots;

    assert_eq!(robot_at(&snapshots[0], 0).position, DVec2::new(100.0, 200.0));
    assert_eq!(robot_at(&snapshots[0], 1).position, DVec2::new(200.0, 200.0));

    let fired = snapshots
        .iter()
        .position(|s| !s.bullets.is_empty())
        .expect("gunner fired");
    assert_eq!(snapshots[fired].bullets[0].state, BulletState::Fired);
    assert_eq!(robot_at(&snapshots[fired], 0).energy, 97.0);

    let hit = snapshots
        .iter()
        .position(|s| s.bullets.iter().any(|b| b.state == BulletState::HitVictim))
        .expect("bullet hit");
    // 100 units at 11 units per tick, against a 36-unit box.
    assert_eq!(hit - fired, 8);
    assert_eq!(snapshots[hit].bullets[0].victim, Some(RobotId::new(1)));
    assert_eq!(robot_at(&snapshots[hit], 1).energy, 84.0);
    assert_eq!(robot_at(&snapshots[hit], 0).energy, 106.0);
    assert!(robot_at(&snapshots[hit], 1)
        .events
        .iter()
        .any(|e| matches!(e, RobotEvent::HitByBullet { power, .. } if *power == 3.0)));
    assert!(robot_at(&snapshots[hit], 0)
        .events
        .iter()
        .any(|e| matches!(
            e,
            RobotEvent::BulletHit { victim_energy, .. } if *victim_energy == 84.0
        )));

    assert!(snapshots[hit + 1].bullets.is_empty());
    assert_eq!(robot_at(snapshots.last().unwrap(), 1).energy, 84.0);
}

#[test]
fn robot_drained_to_zero_energy_dies_and_is_no_longer_woken() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let spender = factory("test.Spender", move || {
        let counter = Arc::clone(&counter);
        move |_: &RobotView, _: &RobotConsole| {
            counter.fetch_add(1, Ordering::SeqCst);
            RobotCommand::new().fire(3.0)
        }
    });

    let builder = Battle::builder(arena_config(Some("(100,100,180),(300,300,0),(300,100,0)")));
    let control = builder.control();
    let builder = builder
        .robot(spender)
        .robot(sitting_duck("test.B"))
        .robot(sitting_duck("test.C"))
        .observer(AbortAt::boxed(control, 700));
    let (_battle, recording) = run_recorded(builder);
    let snapshots = &recording.snapshots;

    let death = snapshots
        .iter()
        .position(|s| robot_at(s, 0).state == RobotState::Dead)
        .expect("spender died");
    assert_eq!(robot_at(&snapshots[death - 1], 0).energy, 1.0);
    assert_eq!(robot_at(&snapshots[death], 0).energy, 0.0);
    assert!(snapshots.len() > death + 10, "battle kept going");

    let death_time = usize::try_from(snapshots[death].time).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), death_time + 1);
    assert!(snapshots[death..].iter().all(|s| robot_at(s, 1).state == RobotState::Active));
}

// =============================================================================
// Scheduling
// =============================================================================

#[test]
fn slow_turn_is_skipped_without_affecting_the_opponent() {
    let sleeper = factory("test.Sleeper", || {
        |view: &RobotView, _: &RobotConsole| {
            if view.status.time == 5 {
                thread::sleep(Duration::from_millis(150));
            }
            RobotCommand::new().ahead(8.0)
        }
    });
    let mut config = arena_config(Some("(100,100,0),(300,100,0)"));
    config.budget.turn_timeout = Duration::from_millis(100);

    let builder = Battle::builder(config);
    let control = builder.control();
    let builder = builder
        .robot(sleeper)
        .robot(runner("test.Runner"))
        .observer(AbortAt::boxed(control, 10));
    let (_battle, recording) = run_recorded(builder);
    let (before, during) = (&recording.snapshots[4], &recording.snapshots[5]);

    assert_eq!(robot_at(before, 0).skipped_turns, 0);
    assert_eq!(robot_at(during, 0).skipped_turns, 1);
    assert_eq!(robot_at(during, 0).position, robot_at(before, 0).position);
    assert!(robot_at(during, 0)
        .events
        .contains(&RobotEvent::SkippedTurn { time: 5 }));

    assert!(robot_at(during, 1).position.y > robot_at(before, 1).position.y);
    assert!(recording
        .snapshots
        .iter()
        .all(|s| robot_at(s, 1).skipped_turns == 0));
}

/// Injects a key press through the control surface once tick `at` ends.
struct PressKeyAt {
    control: BattleControl,
    at: u64,
}

impl BattleObserver for PressKeyAt {
    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        if snapshot.time == self.at {
            self.control.inject_event(InputEvent::KeyPressed(13));
        }
    }
}

#[test]
fn events_queued_while_busy_arrive_once_the_robot_recovers() {
    let sleeper = factory("test.Sleeper", || {
        |view: &RobotView, console: &RobotConsole| {
            if view.status.time == 1 {
                thread::sleep(Duration::from_millis(320));
            }
            let key = RobotEvent::Interactive(InputEvent::KeyPressed(13));
            if view.events.contains(&key) {
                console.println(format!("enter seen at {}", view.status.time));
            }
            RobotCommand::new()
        }
    });
    let mut config = arena_config(Some("(100,100,0),(300,100,0)"));
    config.budget.turn_timeout = Duration::from_millis(100);

    let builder = Battle::builder(config);
    let control = builder.control();
    let builder = builder
        .robot(sleeper)
        .robot(sitting_duck("test.Duck"))
        .observer(Box::new(PressKeyAt {
            control: control.clone(),
            at: 1,
        }))
        .observer(AbortAt::boxed(control, 12));
    let (_battle, recording) = run_recorded(builder);

    let last = recording.snapshots.last().expect("snapshots");
    assert!(robot_at(last, 0).skipped_turns >= 2);
    let seen: Vec<&String> = recording
        .snapshots
        .iter()
        .flat_map(|s| robot_at(s, 0).console.iter())
        .filter(|line| line.starts_with("enter seen"))
        .collect();
    assert_eq!(seen.len(), 1, "console: {seen:?}");
}

#[test]
fn panicking_robot_keeps_playing() {
    let crasher = factory("test.Crasher", || {
        |_: &RobotView, _: &RobotConsole| -> RobotCommand { panic!("robot bug") }
    });
    let builder = Battle::builder(arena_config(None));
    let control = builder.control();
    let builder = builder
        .robot(crasher)
        .robot(runner("test.Runner"))
        .observer(AbortAt::boxed(control, 5));
    let (battle, recording) = run_recorded(builder);

    let last = recording.snapshots.last().unwrap();
    assert_eq!(robot_at(last, 0).state, RobotState::Active);
    assert!(recording
        .snapshots
        .iter()
        .flat_map(|s| robot_at(s, 0).console.iter())
        .any(|line| line.contains("robot bug")));
    assert!(battle.was_aborted());
    assert_eq!(recording.ended, Some(true));
}

// =============================================================================
// Loading
// =============================================================================

#[test]
fn load_failure_disables_only_that_robot() {
    let spec = RobotSpec::new("bad.Broken");
    let broken: Arc<dyn RobotFactory> = Arc::new(ProgramFactory::new(spec, || {
        Err(LoadError::Construction {
            name: "bad.Broken".into(),
            reason: "missing dependency".into(),
        })
    }));
    let builder = Battle::builder(arena_config(None));
    let control = builder.control();
    let builder = builder
        .robot(broken)
        .robot(sitting_duck("test.A"))
        .robot(sitting_duck("test.B"))
        .observer(AbortAt::boxed(control, 5));
    let (_battle, recording) = run_recorded(builder);
    let first = &recording.snapshots[0];

    assert_eq!(robot_at(first, 0).state, RobotState::Dead);
    assert!(robot_at(first, 0)
        .console
        .iter()
        .any(|l| l == "SYSTEM: unable to instantiate bad.Broken: missing dependency"));
    assert!(robot_at(first, 0).console.iter().any(|l| l == "Round 1 of 1"));
    assert_eq!(robot_at(first, 1).state, RobotState::Active);
    assert_eq!(robot_at(first, 2).state, RobotState::Active);
    assert_eq!(recording.snapshots.len(), 6);
}

/// Kills one robot on the first tick of every round.
struct KillOnFirstTick {
    control: BattleControl,
    robot: RobotId,
}

impl BattleObserver for KillOnFirstTick {
    fn on_turn_ended(&mut self, snapshot: &TurnSnapshot) {
        if snapshot.time == 0 {
            self.control.kill_robot(self.robot);
        }
    }
}

#[test]
fn every_round_gets_a_fresh_program() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&built);
    let spec = RobotSpec::new("test.Counted");
    let counted: Arc<dyn RobotFactory> = Arc::new(ProgramFactory::new(spec, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(|_: &RobotView, _: &RobotConsole| RobotCommand::new()) as Box<dyn RobotProgram>)
    }));

    let mut config = arena_config(None);
    config.rules.rounds = 3;
    let builder = Battle::builder(config)
        .robot(counted)
        .robot(sitting_duck("test.Victim"));
    let control = builder.control();
    let (battle, recording) = run_recorded(builder.observer(Box::new(KillOnFirstTick {
        control,
        robot: RobotId::new(1),
    })));

    assert_eq!(built.load(Ordering::SeqCst), 3);
    // Killed after the first tick, decided on the second, then two grace ticks.
    assert_eq!(recording.rounds, vec![(0, 4), (1, 4), (2, 4)]);
    let starts: Vec<_> = recording.snapshots.iter().filter(|s| s.time == 0).collect();
    assert_eq!(starts.len(), 3);
    for start in starts {
        assert_eq!(robot_at(start, 0).energy, 100.0);
        assert_eq!(robot_at(start, 0).state, RobotState::Active);
    }

    let results = battle.results().unwrap();
    assert_eq!(results[0].name, "test.Counted");
    assert_eq!(results[0].score.firsts, 3);
}

// =============================================================================
// Teams and scoring
// =============================================================================

#[test]
fn team_wins_when_solo_robot_dies() {
    let builder = Battle::builder(arena_config(Some("(100,100,0),(300,100,0),(200,300,0)")))
        .team(
            "Blue",
            vec![sitting_duck("team.Leader"), sitting_duck("team.Member")],
        )
        .robot(sitting_duck("solo.Target"));
    let control = builder.control();
    let killer = KillAt::boxed(control, RobotId::new(2), 3);
    let (battle, recording) = run_recorded(builder.observer(killer));

    assert!(!battle.was_aborted());
    assert_eq!(recording.rounds.len(), 1);
    let last = recording.snapshots.last().unwrap();
    assert_eq!(robot_at(last, 2).state, RobotState::Dead);
    assert_eq!(robot_at(last, 0).state, RobotState::Active);
    assert_eq!(robot_at(last, 1).state, RobotState::Active);
    assert!(recording
        .snapshots
        .iter()
        .any(|s| robot_at(s, 1).events.contains(&RobotEvent::Win)));

    let results = battle.results().unwrap();
    assert_eq!(results[0].name, "Blue");
    assert_eq!(results[0].members, vec!["team.Leader", "team.Member"]);
    // 50 survival + 10 last-survivor bonus per member.
    assert_eq!(results[0].total_score(), 120.0);
    assert_eq!(results[0].score.firsts, 1);
    assert_eq!(results[1].name, "solo.Target");
    assert_eq!(results[1].score.seconds, 1);
    assert_eq!(results[1].total_score(), 0.0);
    assert_eq!(recording.results.as_deref(), Some(results));
}

// =============================================================================
// Control surface
// =============================================================================

#[test]
fn paint_flag_controls_debug_marks() {
    let painter = || {
        factory("test.Painter", || {
            |view: &RobotView, _: &RobotConsole| {
                RobotCommand::new().mark(DebugMark::Text {
                    at: view.status.position,
                    text: "here".into(),
                })
            }
        })
    };
    let builder = Battle::builder(arena_config(None))
        .robot(painter())
        .robot(painter());
    let control = builder.control();
    control.set_paint_enabled(RobotId::new(0), true);
    let (_battle, recording) = run_recorded(builder.observer(AbortAt::boxed(control, 3)));

    let later = &recording.snapshots[2];
    assert_eq!(robot_at(later, 0).debug_marks.len(), 1);
    assert!(robot_at(later, 1).debug_marks.is_empty());
}

#[test]
fn injected_events_reach_live_robots() {
    let listener = |name: &str| {
        factory(name, || {
            |view: &RobotView, console: &RobotConsole| {
                if view
                    .events
                    .contains(&RobotEvent::Interactive(InputEvent::KeyPressed(32)))
                {
                    console.println("space pressed");
                }
                RobotCommand::new()
            }
        })
    };
    let builder = Battle::builder(arena_config(None))
        .robot(listener("test.A"))
        .robot(listener("test.B"));
    let control = builder.control();
    control.inject_event(InputEvent::KeyPressed(32));
    let (_battle, recording) = run_recorded(builder.observer(AbortAt::boxed(control, 3)));

    for id in 0..2 {
        let heard = recording
            .snapshots
            .iter()
            .flat_map(|s| robot_at(s, id).console.iter())
            .filter(|line| *line == "space pressed")
            .count();
        assert_eq!(heard, 1);
    }
}

#[test]
fn pause_and_step_advance_one_tick_at_a_time() {
    let builder = Battle::builder(arena_config(None))
        .robot(runner("test.A"))
        .robot(runner("test.B"));
    let control = builder.control();
    control.pause();
    let recorder = RecordingObserver::new();
    let mut battle = builder.observer(Box::new(recorder.clone())).build().unwrap();
    let driver = thread::spawn(move || battle.run().map(|results| results.len()));

    let wait_for = |count: usize| {
        let deadline = Instant::now() + Duration::from_secs(10);
        while recorder.recording().snapshots.len() < count && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        recorder.recording().snapshots.len()
    };

    thread::sleep(Duration::from_millis(100));
    assert!(recorder.recording().snapshots.is_empty());

    control.step();
    assert_eq!(wait_for(1), 1);
    control.step();
    assert_eq!(wait_for(2), 2);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.recording().snapshots.len(), 2);

    control.abort();
    assert_eq!(driver.join().unwrap().unwrap(), 2);
    assert_eq!(recorder.recording().ended, Some(true));
}

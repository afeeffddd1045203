//! Built-in sample robots.
//!
//! Robots in a battle file are looked up by their short class name, so
//! `"sample.Tracker"` and `"mine.Tracker"` both get the tracker program.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use robobattle_core::geometry::{bearing, normal_relative_angle};
use robobattle_core::prelude::*;

/// Short class names with a built-in program.
pub const SAMPLE_NAMES: [&str; 5] = ["SittingDuck", "Spinner", "Tracker", "Crasher", "Sleeper"];

/// Every tenth tick the sleeper overruns its budget by this factor.
const SLEEPER_OVERRUN: u32 = 3;

/// Builds the factory for a robot named `class_name`.
///
/// Returns `None` when the short class name has no sample program.
pub fn lookup(class_name: &str, budget: Duration) -> Option<Arc<dyn RobotFactory>> {
    let spec = RobotSpec::new(class_name);
    let short = spec.short_class_name().to_string();
    let factory: Arc<dyn RobotFactory> = match short.as_str() {
        "SittingDuck" => Arc::new(ProgramFactory::new(spec, || Ok(boxed(sitting_duck)))),
        "Spinner" => Arc::new(ProgramFactory::new(spec, || Ok(boxed(spinner)))),
        "Tracker" => Arc::new(ProgramFactory::new(spec, || Ok(boxed(tracker)))),
        "Crasher" => Arc::new(ProgramFactory::new(spec, || Ok(boxed(crasher)))),
        "Sleeper" => Arc::new(ProgramFactory::new(spec, move || {
            Ok(boxed(move |view: &RobotView, console: &RobotConsole| {
                sleeper(view, console, budget)
            }))
        })),
        _ => return None,
    };
    Some(factory)
}

fn boxed<P: RobotProgram + 'static>(program: P) -> Box<dyn RobotProgram> {
    Box::new(program)
}

fn sitting_duck(_view: &RobotView, _console: &RobotConsole) -> RobotCommand {
    RobotCommand::new()
}

/// Circles slowly with the radar spinning, firing whatever it faces.
fn spinner(view: &RobotView, _console: &RobotConsole) -> RobotCommand {
    let command = RobotCommand::new()
        .ahead(5.0)
        .turn(10f64.to_radians())
        .turn_radar(45f64.to_radians());
    if view.status.gun_heat == 0.0 && view.status.energy > 20.0 {
        command.fire(1.0)
    } else {
        command
    }
}

/// Aims at the nearest enemy and fires harder the closer it is.
fn tracker(view: &RobotView, console: &RobotConsole) -> RobotCommand {
    let Some(enemy) = view.nearest_enemy() else {
        return RobotCommand::new();
    };
    let aim = bearing(view.status.position, enemy.position);
    let distance = view.status.position.distance(enemy.position);
    let turn = normal_relative_angle(aim - view.status.gun_heading);
    let mut command = RobotCommand::new()
        .turn(normal_relative_angle(aim + std::f64::consts::FRAC_PI_2 - view.status.heading))
        .ahead(4.0)
        .turn_gun(turn)
        .mark(DebugMark::Line {
            from: view.status.position,
            to: enemy.position,
        });
    if turn.abs() < 5f64.to_radians() && view.status.gun_heat == 0.0 {
        let power = (400.0 / distance).clamp(0.1, 3.0);
        console.println(format!("firing at {} with power {power:.1}", enemy.name));
        command = command.fire(power);
    }
    command
}

fn crasher(view: &RobotView, _console: &RobotConsole) -> RobotCommand {
    if view.status.time >= 20 {
        panic!("crasher gave up at tick {}", view.status.time);
    }
    RobotCommand::new().ahead(2.0)
}

fn sleeper(view: &RobotView, console: &RobotConsole, budget: Duration) -> RobotCommand {
    if view.status.time > 0 && view.status.time % 10 == 0 {
        console.println("zzz");
        thread::sleep(budget * SLEEPER_OVERRUN);
    }
    RobotCommand::new().ahead(3.0).turn(0.05)
}

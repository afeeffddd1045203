//! Background robot loader.
//!
//! Program construction can be slow, so it runs on a dedicated thread that
//! prepares round N+1 while round N is still being played. The driver and the
//! loader meet through three channels:
//!
//! 1. [`RobotLoader::request`]: the driver posts a round number; the loader
//!    picks it up once parked
//! 2. [`RobotLoader::wait_loaded`]: the driver blocks only when it actually
//!    needs the round
//! 3. [`RobotLoader::release`]: a rendezvous that returns once the loader has
//!    gone back to waiting for the next request
//!
//! A robot whose program fails to construct, or panics while doing so, gets
//! a [`LoadError`] in its slot; the remaining robots load normally.

use std::f64::consts::TAU;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::{BattleRules, InitialPosition};
use crate::entity::robot::{ROBOT_HEIGHT, ROBOT_WIDTH};
use crate::error::{panic_message, BattleError, LoadError};
use crate::geometry::Rect;
use crate::program::{RobotFactory, RobotProgram};
use crate::registry::playable_area;
use crate::scheduler::join_with_timeout;

/// Random placement tries per robot before an overlap is accepted.
pub const MAX_PLACEMENT_ATTEMPTS: usize = 1000;

/// How long the loader gets to stop at shutdown before it is abandoned.
pub const LOADER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Mixed into the battle seed so placement draws are independent of the
/// wake order stream.
const PLACEMENT_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

// =============================================================================
// Placement
// =============================================================================

fn is_free(position: DVec2, placed: &[(DVec2, f64)]) -> bool {
    let candidate = Rect::centered(position, ROBOT_WIDTH, ROBOT_HEIGHT);
    placed
        .iter()
        .all(|(other, _)| !candidate.intersects(&Rect::centered(*other, ROBOT_WIDTH, ROBOT_HEIGHT)))
}

fn random_spot<R: Rng + ?Sized>(min: DVec2, max: DVec2, rng: &mut R) -> (DVec2, f64) {
    let position = DVec2::new(rng.gen_range(min.x..=max.x), rng.gen_range(min.y..=max.y));
    (position, rng.gen_range(0.0..TAU))
}

/// Chooses round-start positions and headings for `count` robots.
///
/// A configured initial position is used when it lies inside the playable
/// area and does not overlap a robot placed before it; its `None`
/// components are drawn at random. Otherwise up to
/// [`MAX_PLACEMENT_ATTEMPTS`] random spots are tried, and the last one is
/// accepted even if it overlaps.
pub fn place_robots<R: Rng + ?Sized>(
    count: usize,
    initial: &[InitialPosition],
    rules: &BattleRules,
    rng: &mut R,
) -> Vec<(DVec2, f64)> {
    let (min, max) = playable_area(rules);
    let mut placed: Vec<(DVec2, f64)> = Vec::with_capacity(count);

    for index in 0..count {
        let requested = initial.get(index).map(|spot| {
            let (random_position, random_heading) = random_spot(min, max, rng);
            (
                DVec2::new(
                    spot.x.unwrap_or(random_position.x),
                    spot.y.unwrap_or(random_position.y),
                ),
                spot.heading.unwrap_or(random_heading),
            )
        });
        let valid = requested.filter(|(position, _)| {
            position.cmpge(min).all() && position.cmple(max).all() && is_free(*position, &placed)
        });
        if requested.is_some() && valid.is_none() {
            warn!(robot = index, "initial position unusable; placing at random");
        }

        let spot = valid.unwrap_or_else(|| {
            let mut spot = random_spot(min, max, rng);
            for _ in 1..MAX_PLACEMENT_ATTEMPTS {
                if is_free(spot.0, &placed) {
                    return spot;
                }
                spot = random_spot(min, max, rng);
            }
            if !is_free(spot.0, &placed) {
                warn!(robot = index, "no free spot found; accepting overlapping placement");
            }
            spot
        });
        placed.push(spot);
    }
    placed
}

// =============================================================================
// Loaded Round
// =============================================================================

/// Programs and start positions prepared for one round.
pub struct LoadedRound {
    /// Zero-based round number
    pub round: u32,
    /// One slot per robot, in robot ID order
    pub programs: Vec<Result<Box<dyn RobotProgram>, LoadError>>,
    /// Start position and heading per robot
    pub placements: Vec<(DVec2, f64)>,
}

impl std::fmt::Debug for LoadedRound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let failed = self.programs.iter().filter(|p| p.is_err()).count();
        f.debug_struct("LoadedRound")
            .field("round", &self.round)
            .field("programs", &self.programs.len())
            .field("failed", &failed)
            .field("placements", &self.placements)
            .finish()
    }
}

/// Instantiates one program, containing errors and panics.
fn instantiate(factory: &dyn RobotFactory, name: &str) -> Result<Box<dyn RobotProgram>, LoadError> {
    match catch_unwind(AssertUnwindSafe(|| factory.instantiate())) {
        Ok(result) => result,
        Err(payload) => Err(LoadError::Panicked {
            name: name.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

struct LoadJob {
    factories: Vec<Arc<dyn RobotFactory>>,
    names: Vec<String>,
    rules: BattleRules,
    initial: Vec<InitialPosition>,
    rng: ChaCha8Rng,
}

impl LoadJob {
    fn load(&mut self, round: u32) -> LoadedRound {
        let programs = self
            .factories
            .iter()
            .zip(&self.names)
            .map(|(factory, name)| {
                let program = instantiate(factory.as_ref(), name);
                if let Err(err) = &program {
                    warn!(robot = %name, round, error = %err, "robot failed to load");
                }
                program
            })
            .collect();
        let placements = place_robots(self.names.len(), &self.initial, &self.rules, &mut self.rng);
        debug!(round, robots = self.names.len(), "round loaded");
        LoadedRound {
            round,
            programs,
            placements,
        }
    }
}

// =============================================================================
// Handshake
// =============================================================================

fn loader_loop(
    job: &mut LoadJob,
    requests: &Receiver<u32>,
    deliveries: &Sender<LoadedRound>,
    releases: &Receiver<()>,
) {
    for round in requests {
        if deliveries.send(job.load(round)).is_err() || releases.recv().is_err() {
            break;
        }
    }
    debug!("robot loader exiting");
}

/// Handle to the background loader thread.
pub struct RobotLoader {
    requests: Option<Sender<u32>>,
    deliveries: Receiver<LoadedRound>,
    releases: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RobotLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobotLoader")
            .field("running", &self.handle.is_some())
            .field("delivered", &self.deliveries.len())
            .finish()
    }
}

impl RobotLoader {
    /// Starts the loader thread.
    ///
    /// `names` are the registry names of the robots, in ID order, parallel
    /// to `factories`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        factories: Vec<Arc<dyn RobotFactory>>,
        names: Vec<String>,
        rules: BattleRules,
        initial: Vec<InitialPosition>,
        seed: u64,
    ) -> Result<Self, BattleError> {
        let mut job = LoadJob {
            factories,
            names,
            rules,
            initial,
            rng: ChaCha8Rng::seed_from_u64(seed ^ PLACEMENT_SEED_SALT),
        };
        let (request_tx, request_rx) = bounded::<u32>(1);
        let (delivery_tx, delivery_rx) = bounded::<LoadedRound>(1);
        let (release_tx, release_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("robot-loader".to_string())
            .spawn(move || loader_loop(&mut job, &request_rx, &delivery_tx, &release_rx))
            .map_err(|source| BattleError::Spawn {
                what: "loader",
                source,
            })?;
        Ok(Self {
            requests: Some(request_tx),
            deliveries: delivery_rx,
            releases: Some(release_tx),
            handle: Some(handle),
        })
    }

    /// Asks the loader to prepare `round`.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::LoaderGone`] if the loader has stopped.
    pub fn request(&self, round: u32) -> Result<(), BattleError> {
        let requests = self.requests.as_ref().ok_or(BattleError::LoaderGone(round))?;
        debug!(round, "requesting round load");
        requests
            .send(round)
            .map_err(|_| BattleError::LoaderGone(round))
    }

    /// Blocks until `round` is loaded and hands it over.
    ///
    /// # Errors
    ///
    /// Returns [`BattleError::LoaderGone`] if the loader stops first or
    /// delivers a different round.
    pub fn wait_loaded(&self, round: u32) -> Result<LoadedRound, BattleError> {
        match self.deliveries.recv() {
            Ok(loaded) if loaded.round == round => Ok(loaded),
            Ok(loaded) => {
                warn!(expected = round, got = loaded.round, "loader delivered the wrong round");
                Err(BattleError::LoaderGone(round))
            }
            Err(_) => Err(BattleError::LoaderGone(round)),
        }
    }

    /// Acknowledges the loaded round and waits until the loader has parked.
    pub fn release(&self) {
        if let Some(releases) = &self.releases {
            if releases.send(()).is_err() {
                debug!("release after the loader stopped");
            }
        }
    }

    /// Stops the loader, abandoning it if it does not exit in time.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.requests = None;
        self.releases = None;
        let handles = vec![("robot-loader".to_string(), handle)];
        if join_with_timeout(handles, LOADER_JOIN_TIMEOUT) == 0 {
            info!("robot loader stopped");
        }
    }
}

impl Drop for RobotLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

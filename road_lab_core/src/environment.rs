use log::{debug, info, warn};
use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    EntityId, Position,
    agent::{Agent, SetupWarning},
    knowledge::{KnowledgeStore, Mode, Sharing},
    layout::{GenerationError, Layout},
    map::Grid,
    metrics::Metrics,
    params::LabConfig,
    planner::Planner,
};

/// Errors from run control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Cannot change the layout while a run is in progress")]
    RunInProgress,
    #[error("Layout places agent {agent} outside the {width}x{height} field")]
    OutOfBounds {
        agent: EntityId,
        width: usize,
        height: usize,
    },
}

/// Represents the outcome of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickResult {
    /// No run is active; nothing moved.
    Idle,
    /// At least one agent is still on its way.
    Running,
    /// Every agent is at its goal.
    Complete,
}

/// How a cell looks to an observer who can see the whole field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellView {
    Open,
    /// A wall no agent has bumped into yet (under the current mode).
    Hidden,
    Discovered,
}

/// Represents the outcome of one move attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MoveOutcome {
    Moved,
    Bumped,
}

/// One obstacle-discovery lab: a field, its agents, and the knowledge they
/// have gathered.
///
/// The host drives it: [`Lab::start_run`], then [`Lab::tick`] once per
/// frame, reading state back through the accessors between ticks.
pub struct Lab {
    config: LabConfig,
    rng: StdRng,
    mode: Mode,
    running: bool,
    grid: Grid<bool>,
    planner: Planner,
    agents: Vec<Agent>,
    knowledge: KnowledgeStore,
    metrics: Metrics,
    ticks: u64,
    default_layout: Option<Layout>,
    locked_layout: Option<Layout>,
    warnings: Vec<SetupWarning>,
}

impl Lab {
    /// Creates a lab seeded from OS entropy, showing the fixed layout.
    pub fn new(config: LabConfig) -> Self {
        Self::with_rng(config, StdRng::from_os_rng())
    }

    /// Creates a lab whose randomized layouts are reproducible from `seed`.
    pub fn with_seed(config: LabConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: LabConfig, rng: StdRng) -> Self {
        let mut lab = Lab {
            grid: Grid::square(config.grid_size),
            planner: Planner::new(config.grid_size, config.grid_size),
            config,
            rng,
            mode: Mode::default(),
            running: false,
            agents: Vec::new(),
            knowledge: KnowledgeStore::new(),
            metrics: Metrics::default(),
            ticks: 0,
            default_layout: None,
            locked_layout: None,
            warnings: Vec::new(),
        };
        let layout = lab.default_layout().clone();
        lab.install(layout);
        lab
    }

    /// The fixed layout, built on first use.
    fn default_layout(&mut self) -> &Layout {
        let config = &self.config;
        self.default_layout
            .get_or_insert_with(|| Layout::fixed(config))
    }

    /// Replaces field, agents, knowledge and counters with a fresh copy of
    /// `layout`. Starts and goals on walls are relocated first.
    fn install(&mut self, mut layout: Layout) {
        self.warnings = layout.settle();
        for warning in &self.warnings {
            warn!("{warning}");
        }

        self.planner = Planner::for_grid(&layout.grid);
        self.agents = layout
            .agents
            .iter()
            .enumerate()
            .map(|(id, spec)| Agent::new(id, *spec))
            .collect();
        self.grid = layout.grid;
        self.knowledge.clear();
        self.metrics = Metrics::default();
        self.ticks = 0;
    }

    /// Resets field, agents, knowledge and metrics, then begins ticking.
    ///
    /// A locked layout always wins. Otherwise `random` picks between a
    /// freshly randomized layout and the fixed one.
    pub fn start_run(&mut self, random: bool, mode: Mode) -> Result<(), LabError> {
        let layout = if let Some(locked) = &self.locked_layout {
            locked.clone()
        } else if random {
            Layout::random(&mut self.rng, &self.config)?
        } else {
            self.default_layout().clone()
        };

        self.mode = mode;
        self.install(layout);
        self.metrics = Metrics::started();
        self.running = true;

        info!(
            "Started {} run with {} agents on a {}x{} field ({} walls)",
            self.mode,
            self.agents.len(),
            self.grid.width(),
            self.grid.height(),
            self.grid.wall_count()
        );
        Ok(())
    }

    /// Halts ticking and rolls back to the locked layout, or the fixed one.
    pub fn stop_run(&mut self) {
        if self.running {
            info!(
                "Stopped {} run after {} ticks ({} steps, {} discoveries)",
                self.mode, self.ticks, self.metrics.total_steps, self.metrics.discoveries
            );
        }
        self.running = false;
        let layout = if let Some(locked) = &self.locked_layout {
            locked.clone()
        } else {
            self.default_layout().clone()
        };
        self.install(layout);
    }

    /// Regenerates a random layout without starting a run. When the layout
    /// is locked, the new one becomes the locked layout.
    pub fn randomize_layout(&mut self) -> Result<(), LabError> {
        if self.running {
            return Err(LabError::RunInProgress);
        }
        let layout = Layout::random(&mut self.rng, &self.config)?;
        self.install(layout);
        if self.locked_layout.is_some() {
            self.locked_layout = Some(self.layout());
        }
        Ok(())
    }

    /// Freezes the current field and start/goal pairs for later runs.
    pub fn lock_layout(&mut self) {
        self.locked_layout = Some(self.layout());
    }

    /// Locks an externally built layout, e.g. one shared with another lab.
    /// Shown immediately unless a run is in progress.
    pub fn lock_with(&mut self, layout: Layout) -> Result<(), LabError> {
        if let Some(agent) = layout.first_out_of_bounds() {
            return Err(LabError::OutOfBounds {
                agent,
                width: layout.grid.width(),
                height: layout.grid.height(),
            });
        }
        if !self.running {
            self.install(layout.clone());
        }
        self.locked_layout = Some(layout);
        Ok(())
    }

    pub fn unlock_layout(&mut self) {
        self.locked_layout = None;
    }

    pub fn is_locked(&self) -> bool {
        self.locked_layout.is_some()
    }

    /// Advances every agent by one tick, in id order.
    pub fn tick(&mut self) -> TickResult {
        if !self.running {
            return TickResult::Idle;
        }

        self.ticks += 1;
        for idx in 0..self.agents.len() {
            self.step_agent(idx);
        }

        if self.all_at_goal() {
            if self.metrics.finish(self.ticks) {
                info!(
                    "{} run complete after {} ticks: {} steps, {} discoveries ({} redundant)",
                    self.mode,
                    self.ticks,
                    self.metrics.total_steps,
                    self.metrics.discoveries,
                    self.metrics.redundant_discoveries
                );
            }
            TickResult::Complete
        } else {
            TickResult::Running
        }
    }

    /// Ticks until every agent is home or `max_ticks` ticks have passed in
    /// this call. Returns the finishing tick, if reached.
    pub fn run_until_complete(&mut self, max_ticks: u64) -> Option<u64> {
        for _ in 0..max_ticks {
            match self.tick() {
                TickResult::Running => {}
                TickResult::Complete | TickResult::Idle => break,
            }
        }
        self.metrics.finished_tick
    }

    fn step_agent(&mut self, idx: usize) {
        let agent = &mut self.agents[idx];
        if agent.at_goal() {
            return;
        }
        if agent.pause > 0 {
            agent.pause -= 1;
            return;
        }
        if agent.cooldown > 0 {
            agent.cooldown -= 1;
            return;
        }

        if self.agents[idx].path.is_empty() {
            let agent = &self.agents[idx];
            let known = self.knowledge.known_for(self.mode, agent);
            let path = self.planner.plan(agent.position, agent.goal, known);
            self.agents[idx].set_path(path);

            if self.agents[idx].path.is_empty() {
                self.explore_locally(idx);
                self.agents[idx].cooldown = self.config.move_cooldown;
                return;
            }
        }

        if let Some(next) = self.agents[idx].path.pop_front() {
            self.attempt_move(idx, next);
        }
        self.agents[idx].cooldown = self.config.move_cooldown;
    }

    /// With no known route, probe the first neighbor not known to be a wall.
    fn explore_locally(&mut self, idx: usize) {
        let agent = &self.agents[idx];
        let target = self
            .planner
            .neighbors_toward(agent.position, agent.goal)
            .into_iter()
            .find(|pos| !self.knowledge.is_known_blocked(self.mode, agent, *pos));

        if let Some(target) = target {
            let id = agent.id;
            let outcome = self.attempt_move(idx, target);
            debug!("Agent {id} has no route, probed {target:?}: {outcome:?}");
        }
    }

    fn attempt_move(&mut self, idx: usize, target: Position) -> MoveOutcome {
        if !self.grid.is_blocked(target) {
            self.agents[idx].move_to(target, self.config.trail_length);
            self.metrics.record_step();
            return MoveOutcome::Moved;
        }

        self.agents[idx].known.insert(target);
        self.metrics.record_discovery();

        if self.mode == Mode::Coordinated {
            match self.knowledge.share(target) {
                Sharing::Fresh => {
                    for (other, agent) in self.agents.iter_mut().enumerate() {
                        if other != idx {
                            agent.path.clear();
                        }
                    }
                }
                Sharing::Redundant => self.metrics.record_redundant(),
            }
        }

        let agent = &mut self.agents[idx];
        agent.path.clear();
        agent.pause = self.config.discovery_pause;
        debug!("Agent {} discovered wall at {:?}", agent.id, target);
        MoveOutcome::Bumped
    }

    fn all_at_goal(&self) -> bool {
        self.agents.iter().all(Agent::at_goal)
    }

    /// The current field and start/goal pairs.
    pub fn layout(&self) -> Layout {
        Layout {
            grid: self.grid.clone(),
            agents: self.agents.iter().map(Agent::spec).collect(),
        }
    }

    /// How `pos` should be drawn: open ground, an undiscovered wall, or a
    /// wall discovered under the current mode.
    pub fn cell_view(&self, pos: Position) -> CellView {
        if !self.grid.is_blocked(pos) {
            CellView::Open
        } else if self.knowledge.is_discovered(self.mode, &self.agents, pos) {
            CellView::Discovered
        } else {
            CellView::Hidden
        }
    }

    pub fn grid(&self) -> &Grid<bool> {
        &self.grid
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent(&self, id: EntityId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn agents_at_goal(&self) -> usize {
        self.agents.iter().filter(|agent| agent.at_goal()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.all_at_goal()
    }

    /// Problems left over from the last layout install.
    pub fn warnings(&self) -> &[SetupWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentSpec;

    fn corridor_layout(rows: &str, specs: &[((usize, usize), (usize, usize))]) -> Layout {
        Layout {
            grid: Grid::from_ascii(rows).unwrap(),
            agents: specs
                .iter()
                .map(|&(start, goal)| AgentSpec {
                    start: start.into(),
                    goal: goal.into(),
                })
                .collect(),
        }
    }

    fn quiet_config() -> LabConfig {
        LabConfig {
            move_cooldown: 0,
            discovery_pause: 0,
            ..LabConfig::default()
        }
    }

    #[test]
    fn idle_until_started() {
        let mut lab = Lab::with_seed(LabConfig::default(), 1);
        assert!(!lab.is_running());
        assert_eq!(lab.tick(), TickResult::Idle);
        assert_eq!(lab.ticks(), 0);
        assert_eq!(lab.agents().len(), 10);
    }

    #[test]
    fn open_corridor_walk_counts_steps() {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        lab.lock_with(corridor_layout(". . . .", &[((0, 0), (3, 0))]))
            .unwrap();
        lab.start_run(false, Mode::Uncoordinated).unwrap();

        assert_eq!(lab.tick(), TickResult::Running);
        assert_eq!(lab.tick(), TickResult::Running);
        assert_eq!(lab.tick(), TickResult::Complete);
        assert_eq!(lab.metrics().total_steps, 3);
        assert_eq!(lab.metrics().finished_tick, Some(3));
        assert_eq!(lab.agents()[0].trail.len(), 4);
    }

    #[test]
    fn cooldown_and_pause_stall_the_agent() {
        let config = LabConfig {
            move_cooldown: 1,
            discovery_pause: 2,
            ..LabConfig::default()
        };
        let mut lab = Lab::with_seed(config, 1);
        lab.lock_with(corridor_layout(
            "
            . # .
            . . .
            ",
            &[((0, 0), (2, 0))],
        ))
        .unwrap();
        lab.start_run(false, Mode::Uncoordinated).unwrap();

        // Tick 1: plans straight through (1, 0) and bumps into it.
        lab.tick();
        let agent = &lab.agents()[0];
        assert_eq!(agent.position, Position::new(0, 0));
        assert_eq!(agent.pause, 2);
        assert_eq!(agent.cooldown, 1);
        assert!(agent.known.contains(&Position::new(1, 0)));
        assert_eq!(lab.metrics().discoveries, 1);

        // Ticks 2-4: pause twice, then cool down once.
        for _ in 0..3 {
            lab.tick();
            assert_eq!(lab.agents()[0].position, Position::new(0, 0));
        }
        // Tick 5: replans around the wall and moves.
        lab.tick();
        assert_eq!(lab.agents()[0].position, Position::new(0, 1));
        assert_eq!(lab.metrics().total_steps, 1);
    }

    fn two_agent_lab(mode: Mode) -> Lab {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        lab.lock_with(corridor_layout(
            "
            . # . .
            . . . .
            . . . .
            ",
            &[((0, 0), (2, 0)), ((3, 2), (0, 2))],
        ))
        .unwrap();
        lab.start_run(false, mode).unwrap();
        // Agent 1 holds a stale detour it would follow if nobody told it otherwise.
        lab.agents[1].set_path([Position::new(3, 1), Position::new(3, 0)]);
        lab
    }

    #[test]
    fn coordinated_discovery_invalidates_other_plans() {
        let mut lab = two_agent_lab(Mode::Coordinated);
        lab.tick();

        assert_eq!(lab.metrics().discoveries, 1);
        assert!(lab.knowledge().shared().contains(&Position::new(1, 0)));
        assert_eq!(lab.cell_view(Position::new(1, 0)), CellView::Discovered);
        assert_eq!(lab.cell_view(Position::new(0, 0)), CellView::Open);
        assert!(lab.agents()[0].path.is_empty());
        // The detour was dropped; agent 1 replanned toward its goal.
        assert_eq!(lab.agents()[1].position, Position::new(2, 2));
    }

    #[test]
    fn uncoordinated_discovery_stays_private() {
        let mut lab = two_agent_lab(Mode::Uncoordinated);
        lab.tick();

        assert_eq!(lab.metrics().discoveries, 1);
        assert!(lab.knowledge().shared().is_empty());
        assert_eq!(lab.cell_view(Position::new(1, 0)), CellView::Discovered);
        assert!(!lab.agents()[1].known.contains(&Position::new(1, 0)));
        assert_eq!(lab.agents()[1].position, Position::new(3, 1));
    }

    #[test]
    fn shared_knowledge_spares_the_second_agent() {
        let layout = corridor_layout(
            "
            . # .
            . . .
            ",
            &[((0, 0), (2, 0)), ((0, 0), (2, 0))],
        );

        let mut coordinated = Lab::with_seed(quiet_config(), 1);
        coordinated.lock_with(layout.clone()).unwrap();
        coordinated.start_run(false, Mode::Coordinated).unwrap();
        coordinated.run_until_complete(50).unwrap();

        let mut uncoordinated = Lab::with_seed(quiet_config(), 1);
        uncoordinated.lock_with(layout).unwrap();
        uncoordinated.start_run(false, Mode::Uncoordinated).unwrap();
        uncoordinated.run_until_complete(50).unwrap();

        assert_eq!(coordinated.metrics().discoveries, 1);
        assert_eq!(coordinated.metrics().redundant_discoveries, 0);
        assert_eq!(uncoordinated.metrics().discoveries, 2);
        assert_eq!(uncoordinated.metrics().redundant_discoveries, 0);
        assert_eq!(
            coordinated.metrics().total_steps,
            uncoordinated.metrics().total_steps
        );
    }

    #[test]
    fn redundant_discovery_is_counted_separately() {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        lab.lock_with(corridor_layout(". # .", &[((0, 0), (2, 0)), ((0, 0), (2, 0))]))
            .unwrap();
        lab.start_run(false, Mode::Coordinated).unwrap();

        // Both agents plan the same straight line before either bumps.
        lab.agents[0].set_path([Position::new(1, 0), Position::new(2, 0)]);
        lab.agents[1].set_path([Position::new(1, 0), Position::new(2, 0)]);
        lab.tick();

        // Agent 0's discovery cleared agent 1's stale plan, so agent 1
        // replanned, found no route, and probed nothing new.
        assert_eq!(lab.metrics().discoveries, 1);
        assert_eq!(lab.metrics().redundant_discoveries, 0);

        // Force the stale plan back and bump again.
        lab.agents[1].set_path([Position::new(1, 0)]);
        lab.tick();
        assert_eq!(lab.metrics().discoveries, 2);
        assert_eq!(lab.metrics().redundant_discoveries, 1);
        assert_eq!(lab.knowledge().shared().len(), 1);
        assert!((lab.metrics().efficiency() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn walled_in_agent_probes_locally() {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        lab.lock_with(corridor_layout(
            "
            . # .
            # # .
            . . .
            ",
            &[((0, 0), (2, 2))],
        ))
        .unwrap();
        lab.start_run(false, Mode::Uncoordinated).unwrap();

        for _ in 0..10 {
            lab.tick();
        }
        let agent = &lab.agents()[0];
        assert_eq!(agent.position, Position::new(0, 0));
        assert!(agent.known.contains(&Position::new(1, 0)));
        assert!(agent.known.contains(&Position::new(0, 1)));
        // Two probes discovered the two walls; afterwards nothing is left to try.
        assert_eq!(lab.metrics().discoveries, 2);
        assert!(!lab.is_complete());
    }

    #[test]
    fn completion_is_recorded_once() {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        lab.lock_with(corridor_layout(". .", &[((0, 0), (1, 0))])).unwrap();
        lab.start_run(false, Mode::Coordinated).unwrap();

        assert_eq!(lab.tick(), TickResult::Complete);
        let finished = lab.metrics().finished_tick;
        let finished_at = lab.metrics().finished_at;
        assert_eq!(lab.tick(), TickResult::Complete);
        assert_eq!(lab.tick(), TickResult::Complete);
        assert_eq!(lab.metrics().finished_tick, finished);
        assert_eq!(lab.metrics().finished_at, finished_at);
        assert!(lab.metrics().duration().is_some());
    }

    #[test]
    fn stop_rolls_back_to_the_locked_layout() {
        let mut lab = Lab::with_seed(quiet_config(), 1);
        let layout = corridor_layout(". . . .", &[((0, 0), (3, 0))]);
        lab.lock_with(layout.clone()).unwrap();
        lab.start_run(false, Mode::Uncoordinated).unwrap();
        lab.tick();
        assert_eq!(lab.agents()[0].position, Position::new(1, 0));

        lab.stop_run();
        assert!(!lab.is_running());
        assert_eq!(lab.layout(), layout);
        assert_eq!(lab.agents()[0].position, Position::new(0, 0));
        assert_eq!(lab.metrics().total_steps, 0);
        assert!(lab.metrics().started_at.is_none());
        assert_eq!(lab.tick(), TickResult::Idle);
    }

    #[test]
    fn stop_without_lock_restores_the_fixed_layout() {
        let mut lab = Lab::with_seed(LabConfig::default(), 5);
        let fixed = lab.layout();
        lab.start_run(true, Mode::Coordinated).unwrap();
        assert_ne!(lab.layout(), fixed);
        lab.stop_run();
        assert_eq!(lab.layout(), fixed);
    }

    #[test]
    fn randomize_is_rejected_mid_run() {
        let mut lab = Lab::with_seed(LabConfig::default(), 5);
        lab.start_run(false, Mode::Uncoordinated).unwrap();
        assert_eq!(lab.randomize_layout(), Err(LabError::RunInProgress));
        lab.stop_run();
        assert!(lab.randomize_layout().is_ok());
    }

    #[test]
    fn randomize_relocks_a_locked_lab() {
        let mut lab = Lab::with_seed(LabConfig::default(), 9);
        lab.lock_layout();
        lab.randomize_layout().unwrap();
        let randomized = lab.layout();
        lab.start_run(false, Mode::Uncoordinated).unwrap();
        assert_eq!(lab.layout(), randomized);
        lab.unlock_layout();
        assert!(!lab.is_locked());
    }

    #[test]
    fn lock_with_rejects_out_of_bounds_agents() {
        let mut lab = Lab::with_seed(LabConfig::default(), 1);
        let layout = corridor_layout(". .", &[((0, 0), (5, 0))]);
        assert_eq!(
            lab.lock_with(layout),
            Err(LabError::OutOfBounds {
                agent: 0,
                width: 2,
                height: 1
            })
        );
        assert!(!lab.is_locked());
    }

    #[test]
    fn generation_failure_aborts_the_run() {
        let config = LabConfig {
            grid_size: 3,
            ..LabConfig::default()
        };
        let mut lab = Lab::with_seed(config, 1);
        assert!(matches!(
            lab.start_run(true, Mode::Uncoordinated),
            Err(LabError::Generation(GenerationError::InsufficientSpace { .. }))
        ));
        assert!(!lab.is_running());
    }

    #[test]
    fn fixed_layout_agents_start_on_open_ground() {
        let lab = Lab::with_seed(LabConfig::default(), 1);
        assert!(lab.warnings().is_empty());
        for agent in lab.agents() {
            assert!(!lab.grid()[agent.position]);
            assert!(!lab.grid()[agent.goal]);
        }
    }
}

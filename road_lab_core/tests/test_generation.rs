use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use road_lab_core::{
    LabConfig, Layout, Position,
    layout::{PlacedShape, random_grid},
    planner::Planner,
};

fn touches(a: &PlacedShape, b: &PlacedShape) -> bool {
    a.cells.iter().any(|p: &Position| {
        b.cells
            .iter()
            .any(|q| p.x.abs_diff(q.x) <= 1 && p.y.abs_diff(q.y) <= 1)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn placed_shapes_are_isolated(seed in any::<u64>(), size in 20usize..60) {
        let mut rng = StdRng::seed_from_u64(seed);
        let (grid, shapes) = random_grid(&mut rng, size, 50);

        for (i, a) in shapes.iter().enumerate() {
            for b in &shapes[i + 1..] {
                prop_assert!(!touches(a, b), "{:?} touches {:?}", a.kind, b.kind);
            }
            for cell in &a.cells {
                prop_assert!(grid[*cell]);
            }
        }
        prop_assert!(shapes.len() <= 18);
    }

    #[test]
    fn random_layouts_start_agents_on_open_ground(seed in any::<u64>()) {
        let config = LabConfig::default();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut layout = Layout::random(&mut rng, &config).unwrap();
        let warnings = layout.settle();

        prop_assert!(warnings.is_empty());
        prop_assert_eq!(layout.agents.len(), config.agent_count);
        for spec in &layout.agents {
            prop_assert!(!layout.grid[spec.start]);
            prop_assert!(!layout.grid[spec.goal]);
            prop_assert!(spec.start.manhattan(&spec.goal) >= config.min_separation);
        }
    }

    #[test]
    fn random_layouts_leave_every_goal_reachable(seed in any::<u64>()) {
        let config = LabConfig::default();
        let layout = Layout::random(&mut StdRng::seed_from_u64(seed), &config).unwrap();
        let planner = Planner::for_grid(&layout.grid);
        let walls = layout.grid.walls();
        for spec in &layout.agents {
            prop_assert!(planner.reachable(spec.start, spec.goal, &walls));
        }
    }

    #[test]
    fn random_layouts_replay_from_the_seed(seed in any::<u64>()) {
        let config = LabConfig::default();
        let a = Layout::random(&mut StdRng::seed_from_u64(seed), &config).unwrap();
        let b = Layout::random(&mut StdRng::seed_from_u64(seed), &config).unwrap();
        prop_assert_eq!(a, b);
    }
}

#[test]
fn fixed_layout_settles_without_warnings() {
    let mut layout = Layout::fixed(&LabConfig::default());
    assert!(layout.settle().is_empty());
    assert_eq!(layout.agents.len(), 10);
    for spec in &layout.agents {
        assert!(!layout.grid[spec.start]);
        assert!(!layout.grid[spec.goal]);
    }
}

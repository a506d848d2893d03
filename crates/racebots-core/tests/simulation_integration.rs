use racebots_core::course::is_simple_loop;
use racebots_core::evolution::GenerationPlan;
use racebots_core::{
    Car, Course, CourseConfig, Generation, Lineage, RacebotsConfig, Simulation, SimulationError,
    Tick, Vec2,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn seeded(seed: u64, population: usize) -> RacebotsConfig {
    let mut config = RacebotsConfig {
        rng_seed: Some(seed),
        ..RacebotsConfig::default()
    };
    config.evolution.population_size = population;
    config.evolution.max_generation_ticks = 300;
    config
}

#[test]
fn seeded_runs_are_reproducible() {
    let mut first = Simulation::new(seeded(0x5EED, 30)).expect("simulation");
    let mut second = Simulation::new(seeded(0x5EED, 30)).expect("simulation");
    assert_eq!(first.course(), second.course());

    for _ in 0..700 {
        let a = first.step();
        let b = second.step();
        assert_eq!(a, b);
    }
    assert_eq!(first.genomes(), second.genomes());
    assert_eq!(first.generation(), second.generation());
    assert!(first.generation() >= Generation(2));
    let positions = |sim: &Simulation| -> Vec<Vec2> { sim.agent_views().map(|v| v.position).collect() };
    assert_eq!(positions(&first), positions(&second));
    assert_eq!(
        first.history().cloned().collect::<Vec<_>>(),
        second.history().cloned().collect::<Vec<_>>()
    );
}

#[test]
fn generated_corridors_are_closed_and_simple() {
    let config = CourseConfig {
        point_count: 12,
        ..CourseConfig::default()
    };
    for seed in 0..8 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let course = Course::generate(&config, &mut rng).expect("course");
        let n = course.len();
        assert!(n >= 3);

        let mids: Vec<Vec2> = course.sections().iter().map(|s| s.mid).collect();
        let longest_inner = (0..n - 1)
            .map(|i| mids[i].distance(mids[i + 1]))
            .fold(0.0_f64, f64::max);
        assert!(
            mids[n - 1].distance(mids[0]) <= 2.0 * longest_inner,
            "seed {seed}: loop does not close"
        );
        assert!(is_simple_loop(&mids), "seed {seed}: centre line crosses itself");

        for section in course.sections() {
            assert!((section.width() - 2.0 * config.half_width).abs() < 1e-6);
        }
        for index in 0..config.obstacle_clearance {
            assert!(course.obstacle(index).is_none());
        }
    }
}

#[test]
fn evolution_keeps_population_and_copies_elites() {
    let config = seeded(42, 40);
    let mut sim = Simulation::new(config.clone()).expect("simulation");
    for _ in 0..25 {
        sim.step();
    }
    assert_eq!(sim.generation(), Generation(0));
    sim.kill_all();
    assert_eq!(sim.alive_count(), 0);

    let fitness: Vec<f64> = sim.agents().cars().iter().map(Car::fitness).collect();
    let before = sim.genomes();
    let summary = sim.evolve().expect("evolve");

    assert_eq!(summary.generation, Generation(0));
    assert_eq!(sim.generation(), Generation(1));
    assert_eq!(sim.population_size(), 40);
    assert_eq!(sim.alive_count(), 40);
    let best = fitness.iter().copied().fold(0.0_f64, f64::max);
    assert_eq!(summary.best_fitness, best);
    assert_eq!(sim.best_fitness(), best);

    let mut ranked: Vec<usize> = (0..fitness.len()).collect();
    ranked.sort_by(|a, b| fitness[*b].total_cmp(&fitness[*a]));
    let plan = GenerationPlan::new(40, &config.evolution);
    assert_eq!(plan.elites, 3);

    let after = sim.genomes();
    assert_eq!(after.len(), before.len());
    for (slot, parent) in ranked.iter().take(plan.elites).enumerate() {
        assert_eq!(after[slot], before[*parent], "elite slot {slot}");
    }
    let lineages: Vec<Lineage> = sim.agent_views().map(|v| v.lineage).collect();
    assert!(lineages[..plan.elites].iter().all(|l| *l == Lineage::Elite));
    assert!(
        lineages[plan.elites..plan.elites + plan.randoms]
            .iter()
            .all(|l| *l == Lineage::Random)
    );
}

#[test]
fn malformed_imports_leave_state_untouched() {
    let mut sim = Simulation::new(seeded(11, 10)).expect("simulation");
    for _ in 0..5 {
        sim.step();
    }
    let genomes = sim.genomes();
    let course = sim.course().clone();
    let tick = sim.tick();
    let alive = sim.alive_count();
    let genome_len = genomes[0].len();

    let mut bad_token = vec!["0.5"; genome_len];
    bad_token[3] = "abc";
    let batch = format!("{}\n{}", sim.export_genomes(), bad_token.join(" "));
    assert!(matches!(
        sim.import_genomes(&batch),
        Err(SimulationError::Brain(_))
    ));

    let short_line = vec!["1.0"; genome_len - 1].join(" ");
    assert!(matches!(
        sim.import_genomes(&short_line),
        Err(SimulationError::Brain(_))
    ));

    assert!(matches!(
        sim.import_course(r#"[{"left": {"x": 0}}]"#),
        Err(SimulationError::MalformedImport(_))
    ));
    assert!(matches!(
        sim.import_course("[]"),
        Err(SimulationError::MalformedImport(_))
    ));

    assert_eq!(sim.genomes(), genomes);
    assert_eq!(sim.course(), &course);
    assert_eq!(sim.tick(), tick);
    assert_eq!(sim.alive_count(), alive);
}

#[test]
fn course_round_trips_between_simulations() {
    let source = Simulation::new(seeded(21, 5)).expect("simulation");
    let text = source.export_course().expect("export");

    let mut target = Simulation::new(seeded(22, 5)).expect("simulation");
    for _ in 0..10 {
        target.step();
    }
    target.import_course(&text).expect("import");
    assert_eq!(target.course().sections(), source.course().sections());
    assert_eq!(target.course().obstacles().count(), 0);
    assert_eq!(target.tick(), Tick::zero());
    assert_eq!(target.alive_count(), 5);

    let (start, _) = target.course().start_pose();
    assert!(target.agent_views().all(|v| v.position == start && v.alive));
}

#[test]
fn tick_events_report_deaths_and_rollover() {
    let mut sim = Simulation::new(seeded(99, 20)).expect("simulation");
    let mut rolled = false;
    for _ in 0..300 {
        let events = sim.step();
        if events.deaths > 0 {
            assert!(events.alive_changed);
        }
        if let Some(summary) = events.generation_rolled {
            assert_eq!(summary.generation, Generation(0));
            assert_eq!(events.generation, Generation(1));
            assert_eq!(events.alive, 20);
            rolled = true;
            break;
        }
        assert_eq!(events.generation, Generation(0));
    }
    assert!(rolled, "generation should roll within the tick cap");
}

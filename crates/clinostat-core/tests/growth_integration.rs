use clinostat_core::{
    Attachment, EARTH_GRAVITY, Environment, ExperimentConfig, ExperimentDriver, LightDirection,
    Plant, RunPhase, Species,
};
use std::f32::consts::{FRAC_PI_2, PI};

const SAFETY_TICK_CAP: u32 = 100_000;

fn wrap(mut angle: f32) -> f32 {
    while angle <= -PI {
        angle += 2.0 * PI;
    }
    while angle > PI {
        angle -= 2.0 * PI;
    }
    angle
}

fn delta(target: f32, current: f32) -> f32 {
    wrap(target - current)
}

fn grow_to_maturity(species: Species, env: &Environment, seed: u64) -> Plant {
    let mut plant = Plant::new(species, env, seed);
    for _ in 0..SAFETY_TICK_CAP {
        if plant.is_fully_grown() {
            return plant;
        }
        plant.update(env);
    }
    panic!("plant never matured within the safety cap");
}

#[test]
fn microgravity_growth_has_no_directional_bias() {
    let env = Environment {
        gravity: 0.0,
        light: LightDirection::None,
    };
    let plant = grow_to_maturity(Species::Cress, &env, 0xA11CE);

    // Without gravity or light every continuation offset is pure random
    // perturbation, so no offset can exceed the wobble amplitude. Branch
    // offshoots instead stay inside the configured spread band.
    let profile = Species::Cress.profile();
    for (tree, wobble) in [(plant.shoot(), 0.22_f32), (plant.root(), 0.16_f32)] {
        for (_, segment) in tree.segments() {
            match segment.attachment() {
                Attachment::Seed => {}
                Attachment::Continuation => {
                    assert!(
                        segment.angle_offset().abs() <= wobble + 1e-4,
                        "directional bias leaked into a drifting continuation",
                    );
                }
                Attachment::Offshoot => {
                    let spread = segment.angle_offset().abs();
                    assert!(spread >= profile.branch_spread.0 - 1e-4);
                    assert!(spread <= profile.branch_spread.1 + 1e-4);
                }
            }
        }
    }
}

#[test]
fn earth_gravity_orients_shoot_up_and_root_down() {
    let env = Environment {
        gravity: EARTH_GRAVITY,
        light: LightDirection::None,
    };
    let plant = grow_to_maturity(Species::Bean, &env, 0xBEA4);

    let shoot_error = delta(FRAC_PI_2, plant.shoot().tip_angle()).abs();
    let root_error = delta(-FRAC_PI_2, plant.root().tip_angle()).abs();
    assert!(
        shoot_error < 0.35,
        "shoot tip should converge toward up, off by {shoot_error}",
    );
    assert!(
        root_error < 0.30,
        "root tip should converge toward down, off by {root_error}",
    );
}

#[test]
fn lit_shoot_leans_lightward_past_a_gravity_only_control() {
    let lit = Environment {
        gravity: EARTH_GRAVITY,
        light: LightDirection::Left,
    };
    let dark = Environment {
        gravity: EARTH_GRAVITY,
        light: LightDirection::None,
    };
    let treatment = grow_to_maturity(Species::Bean, &lit, 0x5EED);
    let control = grow_to_maturity(Species::Bean, &dark, 0x5EED);

    let lightward = PI;
    let treatment_error = delta(lightward, treatment.shoot().tip_angle()).abs();
    let control_error = delta(lightward, control.shoot().tip_angle()).abs();
    assert!(
        treatment_error < control_error,
        "lit shoot ({treatment_error}) should sit closer to the light than the dark control ({control_error})",
    );
}

#[test]
fn maturity_halts_the_run_and_seals_both_series() {
    let mut driver = ExperimentDriver::new();
    driver
        .start(ExperimentConfig {
            species: Species::Cress,
            gravity: 0.0,
            light: LightDirection::Top,
            comparison: true,
            rng_seed: Some(99),
            sample_interval_ticks: 40,
            minutes_per_tick: 1.0,
        })
        .expect("start");

    let mut completion_tick = None;
    for _ in 0..SAFETY_TICK_CAP {
        let events = driver.tick();
        if events.completed {
            completion_tick = Some(events.tick);
            break;
        }
    }
    let completion_tick = completion_tick.expect("run completed within the safety cap");
    assert_eq!(driver.phase(), RunPhase::Complete);

    let final_sample = driver.treatment_series().last().expect("final sample");
    assert_eq!(
        final_sample.time_minutes,
        completion_tick.0 as f64,
        "maturity forces a final sample even off cadence",
    );
    assert_eq!(driver.treatment_series().len(), driver.control_series().len());

    // Erroneously delivered ticks after completion must not extend the series.
    let treatment_len = driver.treatment_series().len();
    let control_len = driver.control_series().len();
    for _ in 0..200 {
        let events = driver.tick();
        assert!(!events.sampled);
        assert!(!events.completed);
    }
    assert_eq!(driver.treatment_series().len(), treatment_len);
    assert_eq!(driver.control_series().len(), control_len);
    assert!(driver.treatment().expect("plant").is_fully_grown());
}

#[test]
fn matured_plants_never_resume() {
    let env = Environment {
        gravity: EARTH_GRAVITY,
        light: LightDirection::None,
    };
    let mut plant = grow_to_maturity(Species::Radish, &env, 0x7AD15);
    let segment_count = plant.shoot().len() + plant.root().len();
    let shoot_total = plant.shoot().total_length();
    let root_total = plant.root().total_length();
    for _ in 0..500 {
        plant.update(&env);
        assert!(plant.is_fully_grown());
    }
    assert_eq!(segment_count, plant.shoot().len() + plant.root().len());
    assert_eq!(shoot_total, plant.shoot().total_length());
    assert_eq!(root_total, plant.root().total_length());
}

#[test]
fn seeded_runs_are_reproducible_end_to_end() {
    let config = ExperimentConfig {
        species: Species::Bean,
        gravity: 0.0,
        light: LightDirection::Right,
        comparison: true,
        rng_seed: Some(0xD1CE),
        sample_interval_ticks: 25,
        minutes_per_tick: 0.5,
    };
    let run = |config: &ExperimentConfig| {
        let mut driver = ExperimentDriver::new();
        driver.start(config.clone()).expect("start");
        for _ in 0..SAFETY_TICK_CAP {
            if driver.tick().completed {
                break;
            }
        }
        assert_eq!(driver.phase(), RunPhase::Complete);
        (
            driver.treatment_series().to_vec(),
            driver.control_series().to_vec(),
        )
    };
    let (treatment_a, control_a) = run(&config);
    let (treatment_b, control_b) = run(&config);
    assert_eq!(treatment_a, treatment_b);
    assert_eq!(control_a, control_b);
    assert!(!control_a.is_empty());
}

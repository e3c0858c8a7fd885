//! Exchanges between patches co-located on a single rank.

mod util;

use patch_exchange::prelude::*;
use util::*;

#[test]
fn particle_crossing_into_next_patch_1d() {
    let params = params_1d(4, 10, 10, false);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(
        0,
        vec![
            Particle::at(1, [9.5, 0.0, 0.0]),
            Particle::at(2, [3.0, 0.0, 0.0]),
            Particle::at(3, [15.0, 0.0, 0.0]),
        ],
    )
    .unwrap();
    let before: Vec<usize> = (0..4).map(|h| vp.patch(h).unwrap().species[0].len()).collect();

    let departed = push(&mut vp, 0, |p| {
        if p.id == 1 {
            p.position[0] += 1.2;
        }
    });
    assert_eq!(departed, 1);
    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report, ExchangeReport { sent: 1, received: 1, lost: 0 });

    let after: Vec<usize> = (0..4).map(|h| vp.patch(h).unwrap().species[0].len()).collect();
    assert_eq!(after[0], before[0] - 1);
    assert_eq!(after[1], before[1] + 1);
    let bin = vp.patch(1).unwrap().species[0].store.bin_slice(0).unwrap();
    let moved = bin.iter().find(|p| p.id == 1).unwrap();
    assert_eq!(moved.position[0], 9.5 + 1.2);
    vp.check_binning(0).unwrap();
}

#[test]
fn periodic_low_exit_wraps_to_last_patch() {
    let params = params_1d(4, 10, 5, true);
    let mut vp = VectorPatch::new(params, 1, 0, &["ion"]).unwrap();
    vp.load_particles(0, vec![Particle::at(7, [0.5, 0.0, 0.0])])
        .unwrap();
    push(&mut vp, 0, |p| p.position[0] -= 1.0);
    let left = 0.5 - 1.0;
    vp.exchange_particles(0, &NoComm).unwrap();

    let last = &vp.patch(3).unwrap().species[0];
    assert_eq!(last.len(), 1);
    let p = last.store.get(0).unwrap();
    assert_eq!(p.position[0], 40.0 + left);
    assert!(vp.patch(3).unwrap().bounds.contains(&p.position));
    assert_eq!(vp.patch(0).unwrap().species[0].len(), 0);
    vp.check_binning(0).unwrap();
}

#[test]
fn periodic_high_exit_wraps_to_first_patch() {
    let params = params_1d(4, 10, 5, true);
    let mut vp = VectorPatch::new(params, 1, 0, &["ion"]).unwrap();
    vp.load_particles(0, vec![Particle::at(7, [39.8, 0.0, 0.0])])
        .unwrap();
    push(&mut vp, 0, |p| p.position[0] += 0.5);
    vp.exchange_particles(0, &NoComm).unwrap();

    let first = &vp.patch(0).unwrap().species[0];
    assert_eq!(first.len(), 1);
    assert_eq!(first.store.get(0).unwrap().position[0], (39.8 + 0.5) - 40.0);
    vp.check_binning(0).unwrap();
}

#[test]
fn diagonal_crossing_reaches_corner_neighbor() {
    // 3x3 patches of 10x10; patch 4 is the center [10,20)x[10,20).
    let params = params_2d([3, 3], [10, 10], [false, false]);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(
        0,
        vec![
            Particle::at(1, [19.5, 10.5, 0.0]),
            Particle::at(2, [25.0, 15.0, 0.0]),
            Particle::at(3, [21.0, 5.0, 0.0]),
        ],
    )
    .unwrap();
    push(&mut vp, 0, |p| {
        if p.id == 1 {
            p.position[0] = 20.3;
            p.position[1] = 9.8;
        }
    });
    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(report.lost, 0);

    let corner = &vp.patch(2).unwrap().species[0];
    assert_eq!(sorted_ids(corner.store.as_slice()), vec![1, 3]);
    let axis0_only = &vp.patch(5).unwrap().species[0];
    assert_eq!(sorted_ids(axis0_only.store.as_slice()), vec![2]);
    assert_eq!(vp.patch(4).unwrap().species[0].len(), 0);
    vp.check_binning(0).unwrap();
}

#[test]
fn boundary_loss_is_counted_once() {
    let params = params_2d([2, 2], [8, 8], [false, false]);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(
        0,
        vec![
            Particle::at(1, [0.5, 3.0, 0.0]),
            // Crosses into patch 1 along axis 0, then leaves the box along axis 1.
            Particle::at(2, [7.5, 0.4, 0.0]),
            Particle::at(3, [12.0, 12.0, 0.0]),
        ],
    )
    .unwrap();
    push(&mut vp, 0, |p| match p.id {
        1 => p.position[0] = -0.5,
        2 => {
            p.position[0] = 8.5;
            p.position[1] = -0.2;
        }
        _ => {}
    });
    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report.lost, 2);
    assert_eq!(vp.losses().get(0), 2);
    assert_eq!(sorted_ids(&all_particles(&vp, 0)), vec![3]);
    vp.check_binning(0).unwrap();

    // Nothing left to leave: a second call loses nothing more.
    vp.collect_departed(0).unwrap();
    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report.lost, 0);
    assert_eq!(vp.losses().total(), 2);
}

#[test]
fn conservation_in_periodic_box() {
    let params = params_2d([3, 2], [6, 4], [true, true]);
    let mut rng = seeded(42);
    let mut vp = VectorPatch::new(params.clone(), 1, 0, &["electron", "ion"]).unwrap();
    let parts = random_particles(&mut rng, &params, 600);
    let ids = sorted_ids(&parts);
    vp.load_particles(0, parts).unwrap();

    for _ in 0..8 {
        random_push(&mut rng, &mut vp, 0);
        let report = vp.exchange_particles(0, &NoComm).unwrap();
        assert_eq!(report.lost, 0);
        assert_eq!(vp.total_particles(0), 600);
        vp.check_binning(0).unwrap();
    }
    assert_eq!(sorted_ids(&all_particles(&vp, 0)), ids);
    assert_eq!(vp.total_particles(1), 0);
}

#[test]
fn empty_departed_list_changes_nothing() {
    let params = params_2d([2, 2], [8, 8], [true, true]);
    let mut rng = seeded(7);
    let mut vp = VectorPatch::new(params.clone(), 1, 0, &["electron"]).unwrap();
    vp.load_particles(0, random_particles(&mut rng, &params, 100))
        .unwrap();
    let snapshot: Vec<ParticleStore> = vp
        .patches()
        .iter()
        .map(|p| p.species[0].store.clone())
        .collect();

    let comm = CountingComm::new(NoComm);
    let report = vp.exchange_particles(0, &comm).unwrap();
    assert_eq!(report, ExchangeReport::default());
    assert_eq!(comm.sends(), 0);
    for (patch, before) in vp.patches().iter().zip(&snapshot) {
        assert_eq!(&patch.species[0].store, before);
    }
}

#[test]
fn unknown_species_is_rejected() {
    let mut vp = VectorPatch::new(params_1d(2, 4, 2, true), 1, 0, &["electron"]).unwrap();
    assert_eq!(
        vp.exchange_particles(3, &NoComm).unwrap_err(),
        ExchangeError::UnknownSpecies(3)
    );
}

#[test]
fn stray_departed_index_is_out_of_range() {
    let mut vp = VectorPatch::new(params_1d(2, 4, 2, true), 1, 0, &["electron"]).unwrap();
    vp.patch_mut(0)
        .unwrap()
        .species_mut(0)
        .unwrap()
        .departed
        .push(5);
    let err = vp.exchange_particles(0, &NoComm).unwrap_err();
    assert!(matches!(err, ExchangeError::IndexOutOfRange { index: 5, .. }));
    assert!(err.is_fatal());
}

#[test]
fn tiny_low_exit_stays_inside_last_patch() {
    let params = params_1d(4, 10, 5, true);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(0, vec![Particle::at(1, [0.0, 0.0, 0.0])])
        .unwrap();
    push(&mut vp, 0, |p| p.position[0] = -1e-18);
    vp.exchange_particles(0, &NoComm).unwrap();

    let last = &vp.patch(3).unwrap().species[0];
    assert_eq!(last.len(), 1);
    let x = last.store.get(0).unwrap().position[0];
    assert!(x < 40.0, "wrapped onto the upper edge: {x}");
    assert_eq!(last.store.bin(1).unwrap().len(), 1);
    vp.check_binning(0).unwrap();
}

#[test]
fn single_periodic_patch_is_its_own_neighbor() {
    let params = params_1d(1, 10, 5, true);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(
        0,
        vec![
            Particle::at(1, [9.5, 0.0, 0.0]),
            Particle::at(2, [0.1, 0.0, 0.0]),
            Particle::at(3, [4.0, 0.0, 0.0]),
        ],
    )
    .unwrap();
    push(&mut vp, 0, |p| match p.id {
        1 => p.position[0] = 10.3,
        2 => p.position[0] = -0.2,
        _ => {}
    });
    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report, ExchangeReport { sent: 2, received: 2, lost: 0 });

    let store = &vp.patch(0).unwrap().species[0].store;
    let low: Vec<(u64, f64)> = store
        .bin_slice(0)
        .unwrap()
        .iter()
        .map(|p| (p.id, p.position[0]))
        .collect();
    assert_eq!(sorted_ids(store.bin_slice(0).unwrap()), vec![1, 3]);
    assert!(low.iter().any(|&(id, x)| id == 1 && (x - 0.3).abs() < 1e-12));
    let high = store.bin_slice(1).unwrap();
    assert_eq!(high.len(), 1);
    assert_eq!(high[0].id, 2);
    assert!((high[0].position[0] - 9.8).abs() < 1e-12);
    vp.check_binning(0).unwrap();
}

#[test]
fn departed_indices_handed_over_by_the_push() {
    let params = params_1d(2, 10, 5, false);
    let mut vp = VectorPatch::new(params, 1, 0, &["electron"]).unwrap();
    vp.load_particles(
        0,
        vec![
            Particle::at(1, [2.0, 0.0, 0.0]),
            Particle::at(2, [9.9, 0.0, 0.0]),
        ],
    )
    .unwrap();
    let sp = vp.patch_mut(0).unwrap().species_mut(0).unwrap();
    let idx = sp.store.as_slice().iter().position(|p| p.id == 2).unwrap();
    sp.store.get_mut(idx).unwrap().position[0] = 10.4;
    assert!(matches!(
        sp.mark_departed([idx, 9]),
        Err(ExchangeError::IndexOutOfRange { index: 9, len: 2 })
    ));
    sp.departed.clear();
    sp.mark_departed([idx]).unwrap();

    let report = vp.exchange_particles(0, &NoComm).unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(sorted_ids(vp.patch(1).unwrap().species[0].store.as_slice()), vec![2]);
    vp.check_binning(0).unwrap();
}

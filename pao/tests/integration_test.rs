//! End-to-end checks of the PAO pipeline: symmetry of the predictions,
//! file round trips and model persistence.

use std::path::PathBuf;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};
    use pao::assemble::assemble;
    use pao::dataset::{samples_from_pao, AtomEnvironment, Neighbour, SpeciesEncoder};
    use pao::io::{format_pao, parse_pao_file, parse_pao_str};
    use pao::loss::ortho_projector_loss;
    use pao::predict::{predict_pao_file, prediction_losses};
    use pao::{AtomicKind, Hyperparameters, KindRecord, PaoModel};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    /// Helper function to get the path to example files
    fn example_path(filename: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("example")
            .join(filename)
    }

    fn record(name: &str, z: u32, prim: usize, pao: usize) -> KindRecord {
        KindRecord {
            name: name.to_string(),
            atomic_number: z,
            nparams: 0,
            prim_basis_name: "DZVP-MOLOPT-GTH".to_string(),
            prim_basis_size: prim,
            pao_basis_size: pao,
        }
    }

    fn oxygen() -> AtomicKind {
        AtomicKind::from_spec_str(&record("O", 8, 13, 4), "2x0e + 2x1o + 1x2e").unwrap()
    }

    fn hydrogen() -> AtomicKind {
        AtomicKind::from_spec_str(&record("H", 1, 5, 1), "2x0e + 1x1o").unwrap()
    }

    fn hyper(seed: u64) -> Hyperparameters {
        Hyperparameters {
            radial_basis: 8,
            hidden_layers: vec![12],
            mid_multiplicity: 3,
            seed,
            ..Hyperparameters::default()
        }
    }

    fn species() -> SpeciesEncoder {
        SpeciesEncoder::new(["H", "O"])
    }

    /// Oxygen centre with four neighbours in a general position.
    fn oxygen_environment() -> AtomEnvironment {
        let species = species();
        let neighbour = |x: f64, y: f64, z: f64, kind: &str| Neighbour {
            position: Vector3::new(x, y, z),
            species: species.one_hot(kind).unwrap(),
        };
        AtomEnvironment {
            kind: "O".into(),
            center: Vector3::new(0.3, -0.2, 0.15),
            neighbours: vec![
                neighbour(1.1, 0.4, -0.3, "H"),
                neighbour(-0.5, 0.9, 0.6, "H"),
                neighbour(0.2, -1.6, 1.3, "O"),
                neighbour(-1.8, -0.7, -1.1, "H"),
            ],
        }
    }

    fn random_rotation(rng: &mut StdRng) -> Matrix3<f64> {
        let axis = Vector3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
        Rotation3::from_scaled_axis(axis.normalize() * rng.gen_range(0.1..3.0)).into_inner()
    }

    fn projector(basis: &DMatrix<f64>) -> DMatrix<f64> {
        basis.tr_mul(basis)
    }

    #[test]
    fn test_two_atom_scenario() {
        // H centre with one O neighbour, primitive basis s + p
        let record = record("H", 1, 4, 2);
        let kind = AtomicKind::from_spec_str(&record, "1x0e + 1x1o").unwrap();
        let species = species();
        let model = PaoModel::new(kind, species.clone(), hyper(3)).unwrap();
        let env = AtomEnvironment {
            kind: "H".into(),
            center: Vector3::new(0.0, 0.0, 0.0),
            neighbours: vec![Neighbour {
                position: Vector3::new(0.0, 0.0, 0.96),
                species: species.one_hot("O").unwrap(),
            }],
        };

        let matrix = model.auxiliary_matrix(&env).unwrap();
        assert_eq!(matrix.shape(), (4, 4));
        assert_eq!(matrix, matrix.transpose());

        // the environment is axially symmetric, so only the basis itself is checked
        let prediction = model.forward(&env).unwrap();
        assert_eq!(prediction.basis.shape(), (2, 4));
        let gram = &prediction.basis * prediction.basis.transpose();
        assert!((gram - DMatrix::identity(2, 2)).amax() < 1e-10);
        assert_eq!(prediction.eigenvalues.len(), 4);
    }

    #[test]
    fn test_auxiliary_matrix_is_equivariant() {
        let model = PaoModel::new(oxygen(), species(), hyper(11)).unwrap();
        let env = oxygen_environment();
        let matrix = model.auxiliary_matrix(&env).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..3 {
            let rotation = random_rotation(&mut rng);
            let d = model.basis_representation(&rotation);
            let rotated = model.auxiliary_matrix(&env.rotated(&rotation)).unwrap();
            let expected = &d * &matrix * d.transpose();
            let scale = matrix.amax().max(1.0);
            assert!((rotated - expected).amax() < 1e-9 * scale);
        }
    }

    #[test]
    fn test_predicted_subspace_is_equivariant() {
        let model = PaoModel::new(oxygen(), species(), hyper(5)).unwrap();
        let env = oxygen_environment();
        let basis = model.predict(&env).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..3 {
            let rotation = random_rotation(&mut rng);
            let d = model.basis_representation(&rotation);
            let rotated = model.predict(&env.rotated(&rotation)).unwrap();
            let expected = &d * projector(&basis) * d.transpose();
            assert!((projector(&rotated) - expected).amax() < 1e-6);
            // rows agree up to sign
            let mapped = &basis * d.transpose();
            for i in 0..basis.nrows() {
                let overlap = rotated.row(i).dot(&mapped.row(i)).abs();
                assert!((overlap - 1.0).abs() < 1e-6, "row {i}: overlap {overlap}");
            }
        }
    }

    #[test]
    fn test_permutation_and_translation_invariance() {
        let model = PaoModel::new(oxygen(), species(), hyper(2)).unwrap();
        let env = oxygen_environment();
        let matrix = model.auxiliary_matrix(&env).unwrap();

        let mut permuted = env.clone();
        permuted.neighbours.reverse();
        permuted.neighbours.swap(0, 2);
        let other = model.auxiliary_matrix(&permuted).unwrap();
        assert!((&other - &matrix).amax() < 1e-12 * matrix.amax().max(1.0));

        let shifted = env.translated(&Vector3::new(4.0, -2.5, 1.0));
        let other = model.auxiliary_matrix(&shifted).unwrap();
        assert!((&other - &matrix).amax() < 1e-10 * matrix.amax().max(1.0));
    }

    #[test]
    fn test_orthonormal_rows_and_exact_symmetry() {
        let model = PaoModel::new(oxygen(), species(), hyper(9)).unwrap();
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..5 {
            let mut env = oxygen_environment();
            for n in &mut env.neighbours {
                n.position += Vector3::new(rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3), rng.gen_range(-0.3..0.3));
            }
            let matrix = model.auxiliary_matrix(&env).unwrap();
            for i in 0..13 {
                for j in 0..13 {
                    assert_eq!(matrix[(i, j)].to_bits(), matrix[(j, i)].to_bits());
                }
            }
            let basis = model.predict(&env).unwrap();
            assert_eq!(basis.shape(), (4, 13));
            assert!((&basis * basis.transpose() - DMatrix::identity(4, 4)).amax() < 1e-10);
        }
    }

    #[test]
    fn test_assembly_is_bitwise_symmetric_for_any_vector() {
        let model = PaoModel::new(oxygen(), species(), hyper(0)).unwrap();
        let table = model.coupling();
        let vector = nalgebra::DVector::from_fn(table.vector_dim(), |i, _| ((i * 37) % 23) as f64 * 0.173 - 1.9);
        let matrix = assemble(table, &vector);
        assert_eq!(matrix, matrix.transpose());
    }

    #[test]
    fn test_position_gradient_matches_finite_differences() {
        let model = PaoModel::new(oxygen(), species(), hyper(21)).unwrap();
        let env = oxygen_environment();
        let prediction = model.forward(&env).unwrap();
        let h = 1e-6;
        for axis in 0..3 {
            let mut plus = env.clone();
            let mut minus = env.clone();
            plus.center[axis] += h;
            minus.center[axis] -= h;
            let fd = (model.predict(&plus).unwrap().sum() - model.predict(&minus).unwrap().sum()) / (2.0 * h);
            let analytic = prediction.position_gradient[axis];
            assert!((fd - analytic).abs() < 1e-5 * (1.0 + fd.abs()), "axis {axis}: {fd} vs {analytic}");
        }

        // arbitrary seed through the vector-Jacobian product
        let seed = DMatrix::from_fn(4, 13, |i, j| ((3 * i + j) % 5) as f64 - 2.0);
        let vjp = model.position_gradient(&env, &seed).unwrap();
        let mut plus = env.clone();
        let mut minus = env.clone();
        plus.center.y += h;
        minus.center.y -= h;
        let objective = |e: &AtomEnvironment| model.predict(e).unwrap().component_mul(&seed).sum();
        let fd = (objective(&plus) - objective(&minus)) / (2.0 * h);
        assert!((fd - vjp.y).abs() < 1e-5 * (1.0 + fd.abs()));
    }

    #[test]
    fn test_loss_zero_point_and_rotation_invariance() {
        let model = PaoModel::new(oxygen(), species(), hyper(4)).unwrap();
        let basis = model.predict(&oxygen_environment()).unwrap();
        assert_eq!(ortho_projector_loss(&basis, &basis).unwrap(), 0.0);

        let mut rng = StdRng::seed_from_u64(1);
        let mixing = DMatrix::from_fn(4, 4, |_, _| rng.gen_range(-1.0..1.0));
        let q = mixing.qr().q();
        let rotated = &q * &basis;
        assert!(ortho_projector_loss(&basis, &rotated).unwrap() < 1e-28);
    }

    #[test]
    fn test_water_file_round_trip_with_predictions() {
        let path = example_path("water.pao");
        let file = parse_pao_file(&path).unwrap();
        assert_eq!(file.atoms.len(), 3);

        let mut models = BTreeMap::new();
        models.insert("O".to_string(), PaoModel::new(oxygen(), species(), hyper(1)).unwrap());
        models.insert("H".to_string(), PaoModel::new(hydrogen(), species(), hyper(1)).unwrap());

        let predicted = predict_pao_file(&file, &models).unwrap();
        assert_eq!(predicted.xblocks[0].shape(), (4, 13));
        assert_eq!(predicted.xblocks[1].shape(), (1, 5));

        let reparsed = parse_pao_str(&format_pao(&predicted), &path).unwrap();
        assert_eq!(reparsed, predicted);

        let losses = prediction_losses(&predicted, &file).unwrap();
        assert_eq!(losses.len(), 2);
        assert!(losses.values().all(|l| l.is_finite() && *l >= 0.0));
        let self_losses = prediction_losses(&predicted, &predicted).unwrap();
        assert!(self_losses.values().all(|l| *l < 1e-24));
    }

    #[test]
    fn test_training_gradient_on_water_samples() {
        let path = example_path("water.pao");
        let file = parse_pao_file(&path).unwrap();
        let samples = samples_from_pao(&file, &path, &species()).unwrap();
        let hydrogens: Vec<_> = samples.iter().filter(|s| s.environment.kind == "H").collect();
        assert_eq!(hydrogens.len(), 2);
        for s in &hydrogens {
            assert!((&s.label * s.label.transpose() - DMatrix::identity(1, 1)).amax() < 1e-12);
        }

        let model = PaoModel::new(hydrogen(), species(), hyper(8)).unwrap();
        let step = model.loss_gradient(&hydrogens).unwrap();
        assert_eq!(step.evaluated, 2);
        assert_eq!(step.failed, 0);
        assert_eq!(step.gradient.len(), model.num_params());
        assert!((step.loss - model.loss(&hydrogens).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_model_save_and_load() {
        let dir = std::env::temp_dir().join(format!("pao_model_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pao_model_O.json");

        let model = PaoModel::new(oxygen(), species(), hyper(17)).unwrap();
        model.save(&path).unwrap();
        let loaded = PaoModel::load(&path).unwrap();
        assert_eq!(loaded.params(), model.params());
        assert_eq!(loaded.hyperparameters(), model.hyperparameters());

        let env = oxygen_environment();
        assert_eq!(loaded.predict(&env).unwrap(), model.predict(&env).unwrap());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

//! Per-kind PAO model: encoder, aggregator, assembler and extractor chained
//! into one forward pass, with the matching reverse pass.

use crate::assemble::{assemble, assemble_adjoint};
use crate::coupling::CouplingTable;
use crate::dataset::{AtomEnvironment, PaoSample, SpeciesEncoder};
use crate::error::{PaoError, Result};
use crate::extract::{eigenbasis_adjoint, extract_basis, Eigenbasis};
use crate::kind::AtomicKind;
use crate::loss::{ortho_projector_loss, ortho_projector_loss_gradient};
use crate::network::{coordinate_change, AggregateTape, Aggregator, EdgeFeatures, GeometricEncoder};
use angular::Irreps;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub max_radius: f64,
    /// Normalisation of the neighbour sum, not a neighbour limit.
    pub num_neighbours: f64,
    pub radial_basis: usize,
    pub hidden_layers: Vec<usize>,
    pub mid_multiplicity: usize,
    pub seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            max_radius: 4.0,
            num_neighbours: 5.0,
            radial_basis: 10,
            hidden_layers: vec![32],
            mid_multiplicity: 5,
            seed: 0,
        }
    }
}

impl Hyperparameters {
    pub fn validate(&self) -> Result<()> {
        let check = |ok: bool, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(PaoError::Config(message.to_string()))
            }
        };
        check(self.max_radius > 0.0 && self.max_radius.is_finite(), "max_radius must be positive")?;
        check(self.num_neighbours > 0.0 && self.num_neighbours.is_finite(), "num_neighbours must be positive")?;
        check(self.radial_basis > 0, "radial_basis must be positive")?;
        check(self.mid_multiplicity > 0, "mid_multiplicity must be positive")?;
        check(self.hidden_layers.iter().all(|&h| h > 0), "hidden layers must not be empty")
    }
}

/// Predicted basis of one atom.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// `pao_basis_size` orthonormal rows.
    pub basis: DMatrix<f64>,
    /// Auxiliary-matrix eigenvalues, descending.
    pub eigenvalues: DVector<f64>,
    /// Gradient of the sum of all basis entries with respect to the centre position.
    pub position_gradient: Vector3<f64>,
}

/// Mean loss and parameter gradient over the samples of a batch that could be evaluated.
#[derive(Debug, Clone)]
pub struct BatchGradient {
    pub loss: f64,
    pub gradient: DVector<f64>,
    pub evaluated: usize,
    pub failed: usize,
}

/// Recorded intermediates of one forward pass.
struct Pass {
    edges: EdgeFeatures,
    tape: AggregateTape,
    eigen: Eigenbasis,
}

#[derive(Serialize, Deserialize)]
struct ModelCheckpoint {
    kind: AtomicKind,
    species: Vec<String>,
    hyperparameters: Hyperparameters,
    params: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct PaoModel {
    kind: AtomicKind,
    species: SpeciesEncoder,
    hyper: Hyperparameters,
    coupling: Arc<CouplingTable>,
    encoder: GeometricEncoder,
    aggregator: Aggregator,
    // [radial network | shared tensor-product weights]
    radial: Range<usize>,
    shared: Range<usize>,
    params: DVector<f64>,
}

impl PaoModel {
    pub fn new(kind: AtomicKind, species: SpeciesEncoder, hyper: Hyperparameters) -> Result<Self> {
        hyper.validate()?;
        if species.is_empty() {
            return Err(PaoError::Config("species list is empty".into()));
        }
        species.index(&kind.name)?;

        let coupling = Arc::new(CouplingTable::build(&kind.prim_basis_spec)?);
        let lmax = kind.prim_basis_spec.lmax();
        let irreps_sh = Irreps::spherical_harmonics(lmax);
        let irreps_mid = Irreps::uniform(hyper.mid_multiplicity, lmax);
        let aggregator = Aggregator::new(
            &Irreps::scalars(species.len()),
            &irreps_sh,
            &irreps_mid,
            &coupling.output_irreps(),
            hyper.num_neighbours,
        );
        if aggregator.output_dim() != coupling.vector_dim() {
            return Err(PaoError::DimensionMismatch(format!(
                "network output {} vs coupling table {}",
                aggregator.output_dim(),
                coupling.vector_dim()
            )));
        }
        let encoder = GeometricEncoder::new(
            lmax,
            hyper.max_radius,
            hyper.radial_basis,
            &hyper.hidden_layers,
            aggregator.edge_weight_numel(),
        );

        let n_radial = encoder.num_params();
        let n_shared = aggregator.shared_weight_numel();
        let mut rng = StdRng::seed_from_u64(hyper.seed);
        let params: DVector<f64> = DVector::from_fn(n_radial + n_shared, |_, _| rng.sample(StandardNormal));
        info!(
            "Model for kind {}: basis {} -> {}, {} parameters ({} radial, {} shared)",
            kind.name,
            kind.prim_basis_size,
            kind.pao_basis_size,
            params.len(),
            n_radial,
            n_shared
        );

        Ok(PaoModel {
            kind,
            species,
            hyper,
            coupling,
            encoder,
            aggregator,
            radial: 0..n_radial,
            shared: n_radial..n_radial + n_shared,
            params,
        })
    }

    pub fn kind(&self) -> &AtomicKind {
        &self.kind
    }

    pub fn species(&self) -> &SpeciesEncoder {
        &self.species
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyper
    }

    pub fn coupling(&self) -> &CouplingTable {
        &self.coupling
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &DVector<f64> {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut DVector<f64> {
        &mut self.params
    }

    pub fn set_params(&mut self, params: DVector<f64>) -> Result<()> {
        if params.len() != self.params.len() {
            return Err(PaoError::DimensionMismatch(format!(
                "{} parameters for a model with {}",
                params.len(),
                self.params.len()
            )));
        }
        self.params = params;
        Ok(())
    }

    fn radial_params(&self) -> &[f64] {
        &self.params.as_slice()[self.radial.clone()]
    }

    fn shared_params(&self) -> &[f64] {
        &self.params.as_slice()[self.shared.clone()]
    }

    fn check_environment(&self, env: &AtomEnvironment) -> Result<()> {
        if env.kind != self.kind.name {
            return Err(PaoError::UnknownKind(format!(
                "{} (model is for {})",
                env.kind, self.kind.name
            )));
        }
        if let Some(bad) = env.neighbours.iter().find(|n| n.species.len() != self.species.len()) {
            return Err(PaoError::DimensionMismatch(format!(
                "species vector of length {} for {} species",
                bad.species.len(),
                self.species.len()
            )));
        }
        Ok(())
    }

    /// Network output vector, the input of the assembler.
    fn output_vector(&self, env: &AtomEnvironment) -> Result<(DVector<f64>, EdgeFeatures, AggregateTape)> {
        self.check_environment(env)?;
        let edges = self.encoder.encode(env, self.radial_params())?;
        let (vector, tape) = self.aggregator.forward(env, &edges, self.shared_params());
        Ok((vector, edges, tape))
    }

    pub fn auxiliary_matrix(&self, env: &AtomEnvironment) -> Result<DMatrix<f64>> {
        let (vector, _, _) = self.output_vector(env)?;
        Ok(assemble(&self.coupling, &vector))
    }

    fn run(&self, env: &AtomEnvironment) -> Result<Pass> {
        let (vector, edges, tape) = self.output_vector(env)?;
        let matrix = assemble(&self.coupling, &vector);
        let eigen = extract_basis(&matrix, self.kind.pao_basis_size)?;
        Ok(Pass { edges, tape, eigen })
    }

    /// Parameter gradient and centre-position gradient for a seed on the basis.
    fn backward(&self, env: &AtomEnvironment, pass: &Pass, grad_basis: &DMatrix<f64>) -> (DVector<f64>, Vector3<f64>) {
        let grad_matrix = eigenbasis_adjoint(&pass.eigen, grad_basis);
        let grad_vector = assemble_adjoint(&self.coupling, &grad_matrix);
        let agg = self
            .aggregator
            .backward(env, &pass.edges, &pass.tape, self.shared_params(), &grad_vector);
        let (grad_radial, edge_grads) =
            self.encoder
                .backward(&pass.edges, self.radial_params(), &agg.harmonics, &agg.edge_weights);

        let mut grad = DVector::zeros(self.params.len());
        grad.rows_mut(self.radial.start, self.radial.len())
            .copy_from_slice(&grad_radial);
        grad.rows_mut(self.shared.start, self.shared.len())
            .copy_from(&agg.shared_weights);
        // every edge vector is neighbour - centre
        let centre = -edge_grads.iter().fold(Vector3::zeros(), |acc, g| acc + g);
        (grad, centre)
    }

    pub fn predict(&self, env: &AtomEnvironment) -> Result<DMatrix<f64>> {
        Ok(self.run(env)?.eigen.basis())
    }

    pub fn forward(&self, env: &AtomEnvironment) -> Result<Prediction> {
        let pass = self.run(env)?;
        let basis = pass.eigen.basis();
        let seed = DMatrix::from_element(basis.nrows(), basis.ncols(), 1.0);
        let (_, position_gradient) = self.backward(env, &pass, &seed);
        Ok(Prediction {
            basis,
            eigenvalues: pass.eigen.eigenvalues.clone(),
            position_gradient,
        })
    }

    /// Independent forward passes, one result per environment.
    pub fn forward_batch(&self, envs: &[&AtomEnvironment]) -> Vec<Result<Prediction>> {
        envs.par_iter().map(|env| self.forward(env)).collect()
    }

    /// Vector-Jacobian product of the basis with respect to the centre position.
    pub fn position_gradient(&self, env: &AtomEnvironment, seed: &DMatrix<f64>) -> Result<Vector3<f64>> {
        let pass = self.run(env)?;
        let m = self.kind.pao_basis_size;
        if seed.shape() != (m, self.kind.prim_basis_size) {
            return Err(PaoError::DimensionMismatch(format!(
                "seed {:?} for a {}x{} basis",
                seed.shape(),
                m,
                self.kind.prim_basis_size
            )));
        }
        Ok(self.backward(env, &pass, seed).1)
    }

    fn sample_loss_gradient(&self, sample: &PaoSample) -> Result<(f64, DVector<f64>)> {
        let pass = self.run(&sample.environment)?;
        let basis = pass.eigen.basis();
        let loss = ortho_projector_loss(&basis, &sample.label)?;
        let grad_basis = ortho_projector_loss_gradient(&basis, &sample.label)?;
        let (grad, _) = self.backward(&sample.environment, &pass, &grad_basis);
        if !loss.is_finite() || grad.iter().any(|g| !g.is_finite()) {
            return Err(PaoError::NonFiniteLoss);
        }
        Ok((loss, grad))
    }

    fn sample_loss(&self, sample: &PaoSample) -> Result<f64> {
        let loss = ortho_projector_loss(&self.predict(&sample.environment)?, &sample.label)?;
        if !loss.is_finite() {
            return Err(PaoError::NonFiniteLoss);
        }
        Ok(loss)
    }

    /// Mean projector loss over `batch` and its gradient with respect to all
    /// parameters. Samples that fail are logged and left out of the mean.
    pub fn loss_gradient(&self, batch: &[&PaoSample]) -> Result<BatchGradient> {
        let results: Vec<Result<(f64, DVector<f64>)>> =
            batch.par_iter().map(|s| self.sample_loss_gradient(s)).collect();

        let mut loss = 0.0;
        let mut gradient = DVector::zeros(self.params.len());
        let mut evaluated = 0;
        let mut first_error = None;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok((l, g)) => {
                    loss += l;
                    gradient += g;
                    evaluated += 1;
                }
                Err(e) => {
                    warn!("kind {}: skipping sample {} of batch: {}", self.kind.name, i, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if evaluated == 0 {
            return Err(first_error
                .unwrap_or_else(|| PaoError::DimensionMismatch("empty batch".into())));
        }
        let scale = 1.0 / evaluated as f64;
        Ok(BatchGradient {
            loss: loss * scale,
            gradient: gradient * scale,
            evaluated,
            failed: batch.len() - evaluated,
        })
    }

    /// Mean projector loss over the samples that can be evaluated.
    pub fn loss(&self, batch: &[&PaoSample]) -> Result<f64> {
        let results: Vec<Result<f64>> = batch
            .par_iter()
            .map(|s| self.sample_loss(s))
            .collect();
        let mut total = 0.0;
        let mut evaluated = 0;
        let mut first_error = None;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(l) => {
                    total += l;
                    evaluated += 1;
                }
                Err(e) => {
                    warn!("kind {}: skipping sample {} in evaluation: {}", self.kind.name, i, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        if evaluated == 0 {
            return Err(first_error
                .unwrap_or_else(|| PaoError::DimensionMismatch("empty batch".into())));
        }
        Ok(total / evaluated as f64)
    }

    /// Representation of a Cartesian rotation on the primitive basis:
    /// rotating the structure by `rotation` maps a predicted basis `P` to
    /// `P Dᵀ` up to row signs.
    pub fn basis_representation(&self, rotation: &Matrix3<f64>) -> DMatrix<f64> {
        let c = coordinate_change();
        self.kind
            .prim_basis_spec
            .d_from_matrix(&(c.transpose() * rotation * c))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let checkpoint = ModelCheckpoint {
            kind: self.kind.clone(),
            species: self.species.names().to_vec(),
            hyperparameters: self.hyper.clone(),
            params: self.params.as_slice().to_vec(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &checkpoint)?;
        info!("Saved model for kind {} to {}", self.kind.name, path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let checkpoint: ModelCheckpoint = serde_json::from_reader(reader)?;
        let mut model = PaoModel::new(
            checkpoint.kind,
            SpeciesEncoder::new(checkpoint.species),
            checkpoint.hyperparameters,
        )?;
        model.set_params(DVector::from_vec(checkpoint.params))?;
        debug!("Loaded model for kind {} from {}", model.kind.name, path.display());
        Ok(model)
    }
}

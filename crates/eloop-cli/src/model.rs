use eloop::core::domain::SweepPoint;
use eloop::core::series::{ResultValue, SeriesTag};
use eloop::engine::config::SweepConfig;
use eloop::engine::error::SolverError;
use eloop::engine::solver::Solver;

/// Parameters of a single resonant level coupled symmetrically to two leads.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Energy of the resonant level, `ε₀`.
    pub level: f64,
    /// Level broadening `Γ`; must be positive.
    pub broadening: f64,
    /// Thermal energy `kT` of both leads. Zero gives step-function occupations.
    pub temperature: f64,
    /// Bias voltages; `CURRENT{b}` uses the entry at index `b`.
    pub biases: Vec<f64>,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            level: 0.0,
            broadening: 0.05,
            temperature: 0.0259,
            biases: vec![0.1],
        }
    }
}

/// The per-point state: the Lorentzian transmission at one energy.
#[derive(Debug, Clone, Copy)]
pub struct LevelPoint {
    energy: f64,
    transmission: f64,
}

/// Analytic stand-in for a transport solver.
///
/// `TRANSMISSION` with parameter `n > 1` yields `n` mode-resolved values `T(E)·(k+1)/n`;
/// `CURRENT{b}` yields `T(E)·(f_L(E) − f_R(E))` at bias `biases[b]`.
#[derive(Debug, Clone)]
pub struct ResonantLevelModel {
    params: ModelParams,
}

impl ResonantLevelModel {
    pub fn new(params: ModelParams) -> Result<Self, SolverError> {
        if !(params.broadening.is_finite() && params.broadening > 0.0) {
            return Err(SolverError::new(format!(
                "level broadening must be positive, got {}",
                params.broadening
            )));
        }
        if !(params.temperature.is_finite() && params.temperature >= 0.0) {
            return Err(SolverError::new(format!(
                "temperature must be non-negative, got {}",
                params.temperature
            )));
        }
        Ok(Self { params })
    }

    fn transmission(&self, energy: f64) -> f64 {
        let gamma2 = self.params.broadening * self.params.broadening;
        let detuning = energy - self.params.level;
        gamma2 / (detuning * detuning + gamma2)
    }

    fn fermi(&self, energy: f64, chemical_potential: f64) -> f64 {
        let kt = self.params.temperature;
        if kt == 0.0 {
            return match energy.partial_cmp(&chemical_potential) {
                Some(std::cmp::Ordering::Less) => 1.0,
                Some(std::cmp::Ordering::Greater) => 0.0,
                _ => 0.5,
            };
        }
        1.0 / (((energy - chemical_potential) / kt).exp() + 1.0)
    }
}

impl Solver for ResonantLevelModel {
    type Handle = LevelPoint;

    fn construct(&self, point: SweepPoint, _: &SweepConfig) -> Result<LevelPoint, SolverError> {
        let transmission = self.transmission(point.coordinate);
        if !transmission.is_finite() {
            return Err(SolverError::new(format!(
                "transmission is not finite at E = {}",
                point.coordinate
            )));
        }
        Ok(LevelPoint {
            energy: point.coordinate,
            transmission,
        })
    }

    fn extract(
        &self,
        handle: &mut LevelPoint,
        tag: &SeriesTag,
        parameter: u32,
    ) -> Result<ResultValue, SolverError> {
        if tag.is_transmission() {
            if parameter <= 1 {
                return Ok(ResultValue::Scalar(handle.transmission));
            }
            let modes = parameter as f64;
            let values = (0..parameter)
                .map(|k| handle.transmission * (k + 1) as f64 / modes)
                .collect();
            return Ok(ResultValue::Vector(values));
        }

        if let Some(block) = tag.current_block() {
            let bias = self.params.biases.get(block as usize).copied().ok_or_else(|| {
                SolverError::new(format!(
                    "no bias configured for '{tag}' ({} bias value(s) available)",
                    self.params.biases.len()
                ))
            })?;
            let window = self.fermi(handle.energy, bias / 2.0) - self.fermi(handle.energy, -bias / 2.0);
            return Ok(ResultValue::Scalar(handle.transmission * window));
        }

        Err(SolverError::new(format!(
            "the resonant-level model cannot compute series '{tag}'"
        )))
    }
}

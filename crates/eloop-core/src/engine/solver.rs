use super::config::SweepConfig;
use super::error::SolverError;
use crate::core::domain::SweepPoint;
use crate::core::series::{ResultValue, SeriesTag};

/// The external per-point solver collaborator.
///
/// A handle is built for exactly one sweep point, queried once per enabled series, and
/// destroyed before the next point is touched, so a rank never holds more than one live
/// handle. The solver is shared by every rank of a sweep and must therefore be `Sync`;
/// handles never leave the rank that created them.
pub trait Solver: Sync {
    type Handle;

    /// Builds the per-point resource for `point`.
    ///
    /// # Errors
    ///
    /// Returns an error if the solver cannot be set up at this point. The sweep is aborted
    /// without retrying.
    fn construct(&self, point: SweepPoint, config: &SweepConfig)
    -> Result<Self::Handle, SolverError>;

    /// Computes the value of the series `tag` from a live handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be produced. The sweep is aborted without
    /// retrying.
    fn extract(
        &self,
        handle: &mut Self::Handle,
        tag: &SeriesTag,
        parameter: u32,
    ) -> Result<ResultValue, SolverError>;

    /// Releases a handle. The default simply drops it.
    fn destroy(&self, handle: Self::Handle) {
        drop(handle);
    }
}

/// Owns one solver handle and hands it back to [`Solver::destroy`] on every exit path.
pub struct ScopedHandle<'s, S: Solver + ?Sized> {
    solver: &'s S,
    handle: Option<S::Handle>,
}

impl<'s, S: Solver + ?Sized> ScopedHandle<'s, S> {
    pub fn acquire(
        solver: &'s S,
        point: SweepPoint,
        config: &SweepConfig,
    ) -> Result<Self, SolverError> {
        let handle = solver.construct(point, config)?;
        Ok(Self {
            solver,
            handle: Some(handle),
        })
    }

    pub fn extract(&mut self, tag: &SeriesTag, parameter: u32) -> Result<ResultValue, SolverError> {
        match self.handle.as_mut() {
            Some(handle) => self.solver.extract(handle, tag, parameter),
            None => Err(SolverError::new("solver handle was already released")),
        }
    }

    /// Destroys the handle now instead of at the end of the scope.
    pub fn release(mut self) {
        self.destroy_now();
    }

    fn destroy_now(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.solver.destroy(handle);
        }
    }
}

impl<S: Solver + ?Sized> Drop for ScopedHandle<'_, S> {
    fn drop(&mut self) {
        self.destroy_now();
    }
}

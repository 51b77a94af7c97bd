//! Application state for one dashboard user.
//!
//! Holds the selected region, its fetched data, the chosen simulation
//! parameters and the latest projection. Selecting a new region discards
//! everything derived from the previous one.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{
    projection::{
        self, InitialConditions, ParameterError, ProjectionSummary, SimulationParameters,
        SimulationSnapshot,
    },
    region::Region,
    upstream::RegionData,
};

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("no region selected")]
    NoRegion,
    #[error("region data has not been fetched")]
    NoRegionData,
    #[error("simulation parameters have not been set")]
    NoParameters,
    #[error("region {0} is no longer selected")]
    StaleRegion(String),
    #[error(transparent)]
    Parameters(#[from] ParameterError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectionRun {
    pub method: String,
    pub initial: InitialConditions,
    pub snapshots: Vec<SimulationSnapshot>,
    pub summary: Option<ProjectionSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Session {
    region: Option<Region>,
    data: Option<RegionData>,
    parameters: Option<SimulationParameters>,
    projection: Option<ProjectionRun>,
    loading: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn data(&self) -> Option<&RegionData> {
        self.data.as_ref()
    }

    pub fn parameters(&self) -> Option<&SimulationParameters> {
        self.parameters.as_ref()
    }

    pub fn projection(&self) -> Option<&ProjectionRun> {
        self.projection.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Replace the selection and mark a fetch as in flight.
    pub fn select_region(&mut self, region: Region) {
        info!(region = %region.id, kind = region.geometry.kind(), "region selected");
        self.region = Some(region);
        self.data = None;
        self.projection = None;
        self.loading = true;
    }

    pub fn clear_region(&mut self) {
        self.region = None;
        self.data = None;
        self.projection = None;
        self.loading = false;
    }

    /// Store fetched data if `region_id` is still the current selection.
    pub fn apply_region_data(&mut self, region_id: &str, data: RegionData) -> Result<(), SessionError> {
        match &self.region {
            Some(region) if region.id == region_id => {
                self.data = Some(data);
                self.loading = false;
                Ok(())
            }
            _ => Err(SessionError::StaleRegion(region_id.to_string())),
        }
    }

    /// A failed fetch leaves the region selected but without data.
    pub fn fetch_failed(&mut self, region_id: &str) {
        if self.region.as_ref().map(|r| r.id.as_str()) == Some(region_id) {
            self.data = None;
            self.loading = false;
        }
    }

    pub fn set_parameters(&mut self, parameters: SimulationParameters) -> Result<(), SessionError> {
        parameters.validate()?;
        self.parameters = Some(parameters);
        Ok(())
    }

    pub fn initial_conditions(&self) -> Result<InitialConditions, SessionError> {
        self.region.as_ref().ok_or(SessionError::NoRegion)?;
        let data = self.data.as_ref().ok_or(SessionError::NoRegionData)?;
        Ok(InitialConditions {
            forest_coverage: data.land.composition.forest,
            temperature: data.climate.temperature.average,
            rainfall: data.climate.rainfall.annual,
        })
    }

    /// Project the current parameters from the current region's conditions.
    pub fn run_simulation(&mut self) -> Result<&ProjectionRun, SessionError> {
        let initial = self.initial_conditions()?;
        let parameters = self.parameters.as_ref().ok_or(SessionError::NoParameters)?;
        let snapshots = projection::project(parameters, &initial);
        let summary = projection::summarize(&snapshots, None);
        info!(
            method = %parameters.method,
            timeline = parameters.timeline,
            intensity = parameters.intensity,
            steps = snapshots.len(),
            "projection complete"
        );
        Ok(self.projection.insert(ProjectionRun {
            method: parameters.method.to_string(),
            initial,
            snapshots,
            summary,
        }))
    }
}

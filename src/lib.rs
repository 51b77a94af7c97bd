pub mod climate;
pub mod land;
pub mod logging;
pub mod projection;
pub mod region;
pub mod rng;
pub mod scenario;
pub mod session;
pub mod upstream;
pub mod web;

pub use land::normalize;
pub use projection::{project, summarize, SimulationParameters, SimulationSnapshot};
pub use region::{Geometry, Region};
pub use session::Session;
pub use upstream::{fetch_region, DataSource, RegionData};

pub mod error;
pub mod hourly_aggregate_repository;
pub mod models;
pub mod raw_observation_repository;

pub use error::DbError;
pub use hourly_aggregate_repository::HourlyAggregateRepository;
pub use models::*;
pub use raw_observation_repository::RawObservationRepository;

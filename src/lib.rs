pub mod crm;
pub mod errors;
pub mod prospector_config;
pub mod telemetry;

// src/ingest/providers/mod.rs
pub mod bulletin;
pub mod open_meteo;
pub mod qweather;
pub mod synthetic;

pub use bulletin::BulletinProvider;
pub use open_meteo::OpenMeteoProvider;
pub use qweather::QWeatherProvider;
pub use synthetic::SyntheticProvider;

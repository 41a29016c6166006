pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod container;
pub mod crop;
pub mod error;
pub mod granule;
pub mod integrity;
pub mod locator;
pub mod merge;
pub mod pipeline;
pub mod schema;
pub mod utils;

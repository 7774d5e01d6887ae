// Library for the binary and tests to access modules

pub mod backfill;
pub mod config;
pub mod convert;
pub mod error;
pub mod forecast;
pub mod inspect;
pub mod models;
pub mod routes;
pub mod store;
pub mod version;

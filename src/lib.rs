pub mod catalogue;
pub mod config;
pub mod domain;
pub mod error;
pub mod lims;
pub mod linkback;
pub mod locator;
pub mod mapper;
pub mod output;
pub mod reconcile;
pub mod register;
pub mod resource;
pub mod sample_types;
pub mod sync;
pub mod transfer;
pub mod translate;

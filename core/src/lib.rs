pub mod calendar;
pub mod db;
pub mod local;
pub mod models;
pub mod reconcile;
pub mod record;
pub mod remote;
pub mod service;
pub mod store;

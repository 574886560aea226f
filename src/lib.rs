pub mod config;
pub mod db;
pub mod gateway;
pub mod model;
pub mod router;
pub mod routes;
pub mod shortener;

pub mod clock;
pub mod config;
pub mod error;
pub mod feed;
pub mod identity;
pub mod service;
pub mod store;
pub mod voting;
pub mod web;

#[macro_use] extern crate rocket;
#[macro_use] extern crate serde_derive;

pub mod commands;
pub mod common;
pub mod config;
pub mod connection;
pub mod netif;
pub mod presence;
pub mod record;
pub mod registrator;
pub mod reply;
pub mod rest_api;
pub mod scheduler;

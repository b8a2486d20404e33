pub mod base;
pub mod config;
pub mod controller;
pub mod error;
pub mod evaluate;
pub mod objective;
pub mod order;
pub mod pathing;
pub mod rules;
pub mod sandbox;
pub mod world;

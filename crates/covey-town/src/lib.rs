//! Town state for the Covey server.
//!
//! A town is a shared 2D space where players walk around, gather in
//! conversation areas, and ride vehicles together. This crate holds all
//! of that state and the rules for changing it; it knows nothing about
//! sockets or wire formats.
//!
//! # Key types
//!
//! - [`TownController`]: one town's players, sessions, areas, and vehicles
//! - [`TownListener`] / [`Listeners`]: fan-out of every state change
//! - [`TownRegistry`]: creates, lists, updates, and deletes towns
//! - [`VideoClient`]: issues the video token a joining player needs

mod config;
mod controller;
mod error;
mod listener;
mod player;
mod registry;
mod session;
mod vehicle;
mod video;

pub use config::{DEFAULT_TOWN_CAPACITY, RegistryConfig};
pub use controller::TownController;
pub use error::TownError;
pub use listener::{ListenerId, Listeners, TownListener};
pub use player::Player;
pub use registry::{SharedTown, TownRegistry};
pub use session::PlayerSession;
pub use vehicle::{Passenger, Vehicle};
pub use video::{DevVideoClient, VideoClient};

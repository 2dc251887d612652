//! Mercado Libre post-sale messaging adapter (API-style).
//!
//! Talks to the official seller messaging REST API with an access token and
//! polls unread packs on a fixed interval.

pub mod adapter;
pub mod api;
pub mod config;

pub use {adapter::MercadoLibreAdapter, config::MeliCredentials};

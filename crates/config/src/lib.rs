//! Configuration loading and env substitution.
//!
//! Config files: `botline.toml` or `botline.json`, searched in `./` then
//! `~/.config/botline/`. Supports `${ENV_VAR}` substitution in all string
//! values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;

pub use {
    loader::{config_dir, discover_and_load, load_config},
    schema::{
        BotlineConfig, BrowserSection, ChannelsSection, ResilienceSection, SessionsSection,
    },
};

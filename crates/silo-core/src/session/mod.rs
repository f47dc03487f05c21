//! Session domain module.
//!
//! This module contains the session domain model, display attribute
//! validation, and the registry that owns session records.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `Tier`, `SessionStatus`)
//! - `name`: Display name and color validation
//! - `registry`: Session lifecycle management (`SessionRegistry`)

mod model;
mod name;
mod registry;

// Re-export public API
pub use model::{SESSION_KEY_PREFIX, Session, SessionStatus, Tier, session_key};
pub use name::{
    MAX_NAME_GRAPHEMES, name_comparison_key, normalize_display_name, validate_display_color,
};
pub use registry::SessionRegistry;

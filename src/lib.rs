//! Deforestation risk toolkit: stratified sampling of forest change, class rate derivation and
//! allocation of jurisdictional deforestation to project areas.

pub use forestrisk;
pub use geo;
pub use inf;

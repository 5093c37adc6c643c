//! Wire message types shared between the client and the agent
//!
//! Organized by area:
//! - `descriptor` - type descriptor dumps and type references
//! - `value` - the tagged remote value union
//! - `callback` - reverse channel invocations and correlation tokens
//! - `object` - object snapshots, heap candidates and module listings
//! - `params` - per-operation request parameter structs

pub mod callback;
pub mod descriptor;
pub mod object;
pub mod params;
pub mod value;

pub use callback::*;
pub use descriptor::*;
pub use object::*;
pub use params::*;
pub use value::*;

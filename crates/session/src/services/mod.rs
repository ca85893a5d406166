//! State machines for every replicated primitive
//!
//! | Service | Primitive |
//! |---------|-----------|
//! | `CounterService` | atomic counter |
//! | `MapService` | consistent map (with transactions) |
//! | `DocumentTreeService` | document tree (with transactions) |
//! | `LeaderElectorService` | leader elector |

mod counter;
mod elector;
mod map;
mod tree;

pub use counter::CounterService;
pub use elector::LeaderElectorService;
pub use map::MapService;
pub use tree::DocumentTreeService;

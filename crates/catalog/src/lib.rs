mod descriptor;
mod store;

pub use descriptor::*;
pub use store::*;

use ahash::RandomState;
use hashbrown::HashMap;

/// Hash map alias used throughout the catalog and the DDL engine.
pub type Map<K, V> = HashMap<K, V, RandomState>;

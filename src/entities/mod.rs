// Entity registries
// Named things the user curates (categories), kept apart from the engines
// that read them.

pub mod category;

pub use category::{Category, CategoryRegistry, CategoryUsage, PredefinedSet, Usage};

pub mod catalog;
pub mod dataset;
pub mod models;

pub use catalog::{Catalog, ProfileStore};
pub use dataset::{Dataset, load_dataset, sample_dataset};
pub use models::{Item, Profile, RankedList};

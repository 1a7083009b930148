pub mod group;
pub mod item;
pub mod report;
pub mod state;

pub use group::GroupInfo;
pub use item::{Author, Item, Reply};
pub use report::HarvestReport;
pub use state::{CollectionState, Phase, RunStateSnapshot};

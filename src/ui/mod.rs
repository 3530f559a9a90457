pub mod filter_panel;

pub use filter_panel::{DrawerState, FilterPanel, PriceMessage, ScrollPosition};

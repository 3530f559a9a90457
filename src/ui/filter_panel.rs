//! Filter panel controller: draft vs applied criteria and the drawer's
//! open/close policy.
//!
//! The drawer starts in an automatic regime where scroll position opens and
//! closes it. The first manual toggle, a successful apply, or arriving with
//! filters already applied switches to the manual regime for good.

use crate::catalog::{Category, FilterCriteria, Region, Store};
use crate::error::ValidationError;

/// Distance from the top of the page (px) that still counts as "at the top".
pub const TOP_THRESHOLD: f64 = 4.0;
/// Distance from the bottom of the page (px) that still counts as "at the bottom".
pub const BOTTOM_THRESHOLD: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawerState {
    Closed,
    /// Opened by the scroll heuristic.
    OpenAuto,
    /// Opened by the user; never auto-closed.
    OpenManual,
}

impl DrawerState {
    pub fn is_open(self) -> bool {
        !matches!(self, DrawerState::Closed)
    }
}

/// Scroll geometry sampled from the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollPosition {
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollPosition {
    fn max_scroll(&self) -> f64 {
        (self.document_height - self.viewport_height).max(0.0)
    }

    pub fn near_top(&self) -> bool {
        self.scroll_y <= TOP_THRESHOLD
    }

    /// Also true when the page barely scrolls at all.
    pub fn near_bottom(&self) -> bool {
        self.max_scroll() - self.scroll_y <= BOTTOM_THRESHOLD
    }
}

/// Which message the price inputs show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceMessage {
    WholeNumber,
    Range,
}

#[derive(Debug, Clone)]
pub struct FilterPanel {
    applied: FilterCriteria,
    draft: FilterCriteria,
    drawer: DrawerState,
    manual: bool,
}

impl FilterPanel {
    pub fn new(applied: FilterCriteria) -> Self {
        let active = applied.has_active_filters();
        Self {
            draft: applied.clone(),
            applied,
            drawer: if active {
                DrawerState::Closed
            } else {
                DrawerState::OpenAuto
            },
            manual: active,
        }
    }

    pub fn drawer(&self) -> DrawerState {
        self.drawer
    }

    pub fn is_open(&self) -> bool {
        self.drawer.is_open()
    }

    /// Whether scroll events still drive the drawer.
    pub fn is_auto(&self) -> bool {
        !self.manual
    }

    pub fn applied(&self) -> &FilterCriteria {
        &self.applied
    }

    pub fn draft(&self) -> &FilterCriteria {
        &self.draft
    }

    pub fn on_scroll(&mut self, position: ScrollPosition) {
        if self.manual {
            return;
        }
        self.drawer = if position.near_top() || position.near_bottom() {
            DrawerState::OpenAuto
        } else {
            DrawerState::Closed
        };
    }

    /// User clicked the show/hide button.
    pub fn toggle(&mut self) {
        self.manual = true;
        self.drawer = if self.drawer.is_open() {
            DrawerState::Closed
        } else {
            DrawerState::OpenManual
        };
    }

    pub fn set_search(&mut self, search: impl Into<String>) {
        self.draft.search = Some(search.into());
    }

    pub fn set_include_soon(&mut self, include: bool) {
        self.draft.include_soon = Some(include);
    }

    pub fn set_min_price(&mut self, price: Option<f64>) {
        self.draft.min_price = price;
    }

    pub fn set_max_price(&mut self, price: Option<f64>) {
        self.draft.max_price = price;
    }

    pub fn toggle_store(&mut self, store: Store) {
        toggle_value(&mut self.draft.stores, store);
    }

    pub fn toggle_category(&mut self, category: Category) {
        toggle_value(&mut self.draft.categories, category);
    }

    pub fn toggle_region(&mut self, region: Region) {
        toggle_value(&mut self.draft.regions, region);
    }

    /// Clear the draft, keeping the applied page size.
    pub fn reset_draft(&mut self) {
        self.draft = FilterCriteria {
            limit: self.applied.limit,
            ..FilterCriteria::default()
        };
    }

    pub fn can_submit(&self) -> bool {
        self.draft.is_valid()
    }

    pub fn price_message(&self) -> Option<PriceMessage> {
        self.draft.validate().err().map(|err| {
            if err.is_integer_error() {
                PriceMessage::WholeNumber
            } else {
                PriceMessage::Range
            }
        })
    }

    pub fn active_filter_count(&self) -> usize {
        self.draft.active_filter_count()
    }

    /// Commit the draft. An invalid draft is rejected and nothing changes.
    /// On success the drawer closes and stays under manual control; the
    /// returned criteria are what the caller writes to the URL.
    pub fn submit(&mut self) -> Result<FilterCriteria, ValidationError> {
        self.draft.validate()?;
        self.applied = self.draft.normalized();
        self.draft = self.applied.clone();
        self.drawer = DrawerState::Closed;
        self.manual = true;
        Ok(self.applied.clone())
    }

    /// Applied filters changed outside the panel (back/forward navigation).
    /// Uncommitted draft edits are discarded.
    pub fn sync_applied(&mut self, applied: FilterCriteria) {
        if applied.has_active_filters() {
            self.drawer = DrawerState::Closed;
            self.manual = true;
        }
        self.draft = applied.clone();
        self.applied = applied;
    }
}

fn toggle_value<T: PartialEq>(list: &mut Option<Vec<T>>, value: T) {
    let values = list.get_or_insert_with(Vec::new);
    if let Some(pos) = values.iter().position(|v| *v == value) {
        values.remove(pos);
    } else {
        values.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(scroll_y: f64) -> ScrollPosition {
        ScrollPosition {
            scroll_y,
            viewport_height: 800.0,
            document_height: 4000.0,
        }
    }

    fn lawson_only() -> FilterCriteria {
        FilterCriteria {
            stores: Some(vec![Store::Lawson]),
            ..FilterCriteria::with_default_limit()
        }
    }

    #[test]
    fn starts_open_without_filters_and_closed_with_them() {
        let empty = FilterPanel::new(FilterCriteria::with_default_limit());
        assert_eq!(empty.drawer(), DrawerState::OpenAuto);
        assert!(empty.is_auto());

        let filtered = FilterPanel::new(lawson_only());
        assert_eq!(filtered.drawer(), DrawerState::Closed);
        assert!(!filtered.is_auto());
    }

    #[test]
    fn scroll_opens_near_edges_and_closes_in_between() {
        let mut panel = FilterPanel::new(FilterCriteria::default());
        panel.on_scroll(at(600.0));
        assert_eq!(panel.drawer(), DrawerState::Closed);
        panel.on_scroll(at(3190.0));
        assert_eq!(panel.drawer(), DrawerState::OpenAuto);
        panel.on_scroll(at(2.0));
        assert_eq!(panel.drawer(), DrawerState::OpenAuto);
    }

    #[test]
    fn short_pages_keep_the_drawer_open() {
        let mut panel = FilterPanel::new(FilterCriteria::default());
        panel.on_scroll(ScrollPosition {
            scroll_y: 20.0,
            viewport_height: 800.0,
            document_height: 830.0,
        });
        assert_eq!(panel.drawer(), DrawerState::OpenAuto);
    }

    #[test]
    fn manual_toggle_latches_off_auto_behaviour() {
        let mut panel = FilterPanel::new(FilterCriteria::default());
        panel.on_scroll(at(600.0));
        panel.toggle();
        assert_eq!(panel.drawer(), DrawerState::OpenManual);

        panel.on_scroll(at(600.0));
        assert_eq!(panel.drawer(), DrawerState::OpenManual);

        panel.toggle();
        panel.on_scroll(at(0.0));
        assert_eq!(panel.drawer(), DrawerState::Closed);
    }

    #[test]
    fn invalid_price_blocks_submission() {
        let mut panel = FilterPanel::new(FilterCriteria::default());
        panel.set_min_price(Some(500.0));
        panel.set_max_price(Some(100.0));
        assert!(!panel.can_submit());
        assert_eq!(panel.price_message(), Some(PriceMessage::Range));

        let before = panel.clone();
        assert!(panel.submit().is_err());
        assert_eq!(panel.applied(), before.applied());
        assert_eq!(panel.drawer(), before.drawer());
        assert!(panel.is_auto());

        panel.set_max_price(Some(10.5));
        assert_eq!(panel.price_message(), Some(PriceMessage::WholeNumber));
    }

    #[test]
    fn successful_apply_commits_closes_and_latches() {
        let mut panel = FilterPanel::new(FilterCriteria::with_default_limit());
        panel.set_search("  onigiri ");
        panel.toggle_store(Store::SevenEleven);
        panel.toggle_store(Store::Lawson);
        panel.toggle_store(Store::SevenEleven);

        let applied = panel.submit().unwrap();
        assert_eq!(applied.search.as_deref(), Some("onigiri"));
        assert_eq!(applied.stores, Some(vec![Store::Lawson]));
        assert_eq!(applied.limit, Some(20));
        assert_eq!(panel.drawer(), DrawerState::Closed);

        panel.on_scroll(at(0.0));
        assert_eq!(panel.drawer(), DrawerState::Closed);
    }

    #[test]
    fn external_change_reseeds_the_draft() {
        let mut panel = FilterPanel::new(FilterCriteria::default());
        panel.set_search("draft only");
        panel.toggle_region(Region::Okinawa);

        panel.sync_applied(lawson_only());
        assert_eq!(panel.draft(), &lawson_only());
        assert_eq!(panel.drawer(), DrawerState::Closed);
        assert!(!panel.is_auto());
    }

    #[test]
    fn reset_keeps_only_the_page_size() {
        let mut panel = FilterPanel::new(lawson_only());
        panel.toggle_category(Category::Oden);
        panel.set_include_soon(true);
        panel.reset_draft();
        assert_eq!(panel.draft(), &FilterCriteria::with_default_limit());
        assert_eq!(panel.active_filter_count(), 0);
    }
}

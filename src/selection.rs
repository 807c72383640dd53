//! Selection Set
//!
//! Which candidate sites the user has picked. Ids are only meaningful against
//! the polygon list they were picked from, so the set is pruned whenever that
//! list is replaced.

use std::collections::HashSet;

use crate::api::SuitabilityPolygon;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    ids: HashSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` if absent, remove it if present.
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop ids with no polygon in `polygons`. Returns how many were dropped.
    pub fn prune_to(&mut self, polygons: &[SuitabilityPolygon]) -> usize {
        let present: HashSet<&str> = polygons.iter().map(|p| p.id.as_str()).collect();
        let before = self.ids.len();
        self.ids.retain(|id| present.contains(id.as_str()));
        before - self.ids.len()
    }

    /// Selected polygons, in list (rank) order.
    pub fn selected<'a>(&'a self, polygons: &'a [SuitabilityPolygon]) -> impl Iterator<Item = &'a SuitabilityPolygon> {
        polygons.iter().filter(move |p| self.ids.contains(&p.id))
    }

    /// Selected ids present in `polygons`, in list order.
    pub fn ids_in_order(&self, polygons: &[SuitabilityPolygon]) -> Vec<String> {
        self.selected(polygons).map(|p| p.id.clone()).collect()
    }

    /// Sum of mid credit estimates over selected polygons present in `polygons`.
    pub fn total_mid_credits(&self, polygons: &[SuitabilityPolygon]) -> f64 {
        self.selected(polygons).fold(0.0, |total, p| total + p.est_credits_mid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::polygon;

    #[test]
    fn test_toggle_is_its_own_inverse() {
        let mut selection = SelectionSet::new();
        selection.toggle("a");
        let before = selection.clone();

        selection.toggle("b");
        selection.toggle("b");
        assert_eq!(selection, before);

        selection.toggle("a");
        assert!(selection.is_empty());
    }

    #[test]
    fn test_sum_over_selected() {
        let polygons = vec![polygon("p1", 1000.0), polygon("p2", 2000.0), polygon("p3", 3000.0)];
        let mut selection = SelectionSet::new();
        assert_eq!(selection.total_mid_credits(&polygons), 0.0);

        selection.toggle("p1");
        selection.toggle("p3");
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.total_mid_credits(&polygons), 4000.0);
        assert_eq!(selection.ids_in_order(&polygons), vec!["p1", "p3"]);
    }

    #[test]
    fn test_missing_ids_contribute_nothing() {
        let mut selection = SelectionSet::new();
        selection.toggle("gone");
        selection.toggle("p2");
        let polygons = vec![polygon("p2", 2000.0)];
        assert_eq!(selection.total_mid_credits(&polygons), 2000.0);
    }

    #[test]
    fn test_prune_to_replacement_list() {
        let mut selection = SelectionSet::new();
        selection.toggle("p1");
        selection.toggle("p2");

        let replacement = vec![polygon("p2", 10.0), polygon("p9", 20.0)];
        assert_eq!(selection.prune_to(&replacement), 1);
        assert!(!selection.contains("p1"));
        assert!(selection.contains("p2"));
    }

    #[test]
    fn test_empty_total_is_positive_zero() {
        let mut selection = SelectionSet::new();
        selection.toggle("gone");
        let total = selection.total_mid_credits(&[polygon("p1", 10.0)]);
        assert_eq!(total, 0.0);
        assert!(total.is_sign_positive());
        assert_eq!(format!("{:.0}", total), "0");
    }

    #[test]
    fn test_clear() {
        let mut selection = SelectionSet::new();
        selection.toggle("p1");
        selection.clear();
        assert_eq!(selection.len(), 0);
    }
}

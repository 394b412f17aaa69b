// ABOUTME: Table selection and row skip policy
// ABOUTME: Applies whitelist/blacklist to discovered tables and required-field checks to rows

use crate::config::MigrationOptions;
use crate::row::{RowRecord, TableDescriptor};

/// Whitelist/blacklist rules over table names.
///
/// Both lists match on exact name equality. An empty whitelist means no
/// restriction and an empty blacklist removes nothing.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl TableFilter {
    pub fn new(whitelist: Vec<String>, blacklist: Vec<String>) -> Self {
        Self {
            whitelist,
            blacklist,
        }
    }

    pub fn from_options(options: &MigrationOptions) -> Self {
        Self::new(options.whitelist.clone(), options.blacklist.clone())
    }

    /// Creates an empty filter (migrate everything)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty() && self.blacklist.is_empty()
    }

    /// Determines if a table should be migrated
    pub fn should_migrate_table(&self, table_name: &str) -> bool {
        if !self.whitelist.is_empty() && !self.whitelist.iter().any(|t| t == table_name) {
            return false;
        }

        if self.blacklist.iter().any(|t| t == table_name) {
            return false;
        }

        true
    }

    /// Keep the tables that pass both lists, preserving listing order.
    pub fn apply(&self, tables: Vec<TableDescriptor>) -> Vec<TableDescriptor> {
        tables
            .into_iter()
            .filter(|table| self.should_migrate_table(&table.name))
            .collect()
    }
}

/// First required field that is absent or null in `row`, if any.
pub fn missing_required_field<'a>(row: &RowRecord, required: &'a [String]) -> Option<&'a str> {
    required
        .iter()
        .find(|field| row.get(field.as_str()).map_or(true, |v| v.is_null()))
        .map(|field| field.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::FieldValue;

    fn tables(names: &[&str]) -> Vec<TableDescriptor> {
        names
            .iter()
            .map(|n| TableDescriptor::new(*n, "id"))
            .collect()
    }

    fn names(tables: &[TableDescriptor]) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_whitelist_then_blacklist() {
        let filter = TableFilter::new(
            vec!["A".to_string(), "B".to_string()],
            vec!["B".to_string()],
        );
        let kept = filter.apply(tables(&["A", "B", "C"]));
        assert_eq!(names(&kept), vec!["A"]);
    }

    #[test]
    fn test_empty_filter_migrates_everything() {
        let filter = TableFilter::empty();
        assert!(filter.is_empty());
        let kept = filter.apply(tables(&["users", "posts"]));
        assert_eq!(names(&kept), vec!["users", "posts"]);
    }

    #[test]
    fn test_blacklist_only() {
        let filter = TableFilter::new(vec![], vec!["audit_logs".to_string()]);
        assert!(filter.should_migrate_table("users"));
        assert!(!filter.should_migrate_table("audit_logs"));
    }

    #[test]
    fn test_whitelist_is_exact_match_not_pattern() {
        let filter = TableFilter::new(vec!["user".to_string()], vec![]);
        assert!(filter.should_migrate_table("user"));
        assert!(!filter.should_migrate_table("users"));
        assert!(!filter.should_migrate_table("user*"));
    }

    #[test]
    fn test_apply_preserves_listing_order() {
        let filter = TableFilter::new(
            vec!["c".to_string(), "a".to_string()],
            vec![],
        );
        let kept = filter.apply(tables(&["a", "b", "c"]));
        assert_eq!(names(&kept), vec!["a", "c"]);
    }

    #[test]
    fn test_missing_required_field() {
        let mut row = RowRecord::new();
        row.insert("id".to_string(), FieldValue::from("u1"));
        row.insert("email".to_string(), FieldValue::Null);

        let required = vec!["id".to_string()];
        assert_eq!(missing_required_field(&row, &required), None);

        let required = vec!["id".to_string(), "email".to_string()];
        assert_eq!(missing_required_field(&row, &required), Some("email"));

        let required = vec!["name".to_string()];
        assert_eq!(missing_required_field(&row, &required), Some("name"));

        assert_eq!(missing_required_field(&row, &[]), None);
    }
}

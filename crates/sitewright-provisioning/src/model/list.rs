//! List instances and their bulk data rows.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::security::ObjectSecurity;

/// How a keyed row that already exists on the target is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateBehavior {
    /// Overwrite the existing record's fields.
    #[default]
    Update,
    /// Leave the existing record untouched.
    Skip,
}

/// A list the template writes rows into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListInstance {
    pub title: String,
    pub data_rows: DataRows,
}

impl ListInstance {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Rows to upsert into a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataRows {
    /// Column used to find an existing record for a row.
    pub key_column: Option<String>,
    pub update_behavior: UpdateBehavior,
    pub rows: Vec<DataRow>,
}

impl DataRows {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Column values of one record, with optional item-level security.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataRow {
    pub values: BTreeMap<String, String>,
    pub security: Option<ObjectSecurity>,
}

impl DataRow {
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            security: None,
        }
    }

    #[must_use]
    pub fn with_security(mut self, security: ObjectSecurity) -> Self {
        self.security = Some(security);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_rows_json_shape() {
        let json = r#"{
            "title": "Products",
            "dataRows": {
                "keyColumn": "SKU",
                "updateBehavior": "Skip",
                "rows": [{"values": {"SKU": "ABC-1", "Price": "9.99"}}]
            }
        }"#;
        let list: ListInstance = serde_json::from_str(json).unwrap();
        assert_eq!(list.data_rows.key_column.as_deref(), Some("SKU"));
        assert_eq!(list.data_rows.update_behavior, UpdateBehavior::Skip);
        assert_eq!(list.data_rows.rows[0].values["Price"], "9.99");
        assert!(list.data_rows.rows[0].security.is_none());
    }

    #[test]
    fn test_update_behavior_defaults_to_update() {
        let rows: DataRows = serde_json::from_str("{}").unwrap();
        assert_eq!(rows.update_behavior, UpdateBehavior::Update);
        assert!(rows.is_empty());
    }
}

//! The fixed allow-list of source tables that participate in a run.

use stageflow_utils::{Error, FlowResult};

use crate::source::SourceSystem;

/// The dimension tables behind the product model.
pub const DIM_TABLES: [&str; 3] = [
    "DimProduct",
    "DimProductSubcategory",
    "DimProductCategory",
];

#[derive(Debug, Clone)]
pub struct TableCatalog {
    allow_list: Vec<String>,
}

impl TableCatalog {
    pub fn new(allow_list: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allow_list: allow_list.into_iter().map(Into::into).collect(),
        }
    }

    /// The canonical three-table product dimension catalog.
    pub fn product_dims() -> Self {
        Self::new(DIM_TABLES)
    }

    pub fn allow_list(&self) -> &[String] {
        &self.allow_list
    }

    /// Resolve which allow-listed tables actually exist in the source system.
    /// Order follows the allow-list and is therefore stable within a run.
    pub fn list_tables(&self, source: &SourceSystem) -> FlowResult<Vec<String>> {
        let tables = source
            .table_names(&self.allow_list)
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;
        if tables.is_empty() {
            return Err(Error::CatalogUnavailable(format!(
                "none of the catalog tables {:?} exist in the source",
                self.allow_list
            )));
        }
        Ok(tables)
    }
}

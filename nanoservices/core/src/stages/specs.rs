//! The concrete normalization rule tables for the three product dimensions.
//!
//! These column lists, fill values, and renames are the contract of the
//! pipeline: numeric columns fill nulls with "0", descriptive columns with
//! "NA", and the English-prefixed names are renamed to their plain forms.

use crate::stages::normalize::NormalizeSpec;

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

pub fn product_spec() -> NormalizeSpec {
    NormalizeSpec {
        raw_table: "src_DimProduct".to_string(),
        staged_table: "stg_DimProduct".to_string(),
        columns: [
            "ProductKey",
            "ProductAlternateKey",
            "ProductSubcategoryKey",
            "WeightUnitMeasureCode",
            "SizeUnitMeasureCode",
            "EnglishProductName",
            "StandardCost",
            "FinishedGoodsFlag",
            "Color",
            "SafetyStockLevel",
            "ReorderPoint",
            "ListPrice",
            "Size",
            "SizeRange",
            "Weight",
            "DaysToManufacture",
            "ProductLine",
            "DealerPrice",
            "Class",
            "Style",
            "ModelName",
            "EnglishDescription",
            "StartDate",
            "EndDate",
            "Status",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        fills: pairs(&[
            ("WeightUnitMeasureCode", "0"),
            ("ProductSubcategoryKey", "0"),
            ("SizeUnitMeasureCode", "0"),
            ("StandardCost", "0"),
            ("ListPrice", "0"),
            ("ProductLine", "NA"),
            ("Class", "NA"),
            ("Style", "NA"),
            ("Size", "NA"),
            ("ModelName", "NA"),
            ("EnglishDescription", "NA"),
            ("DealerPrice", "0"),
            ("Weight", "0"),
        ]),
        renames: pairs(&[
            ("EnglishDescription", "Description"),
            ("EnglishProductName", "ProductName"),
        ]),
    }
}

pub fn subcategory_spec() -> NormalizeSpec {
    NormalizeSpec {
        raw_table: "src_DimProductSubcategory".to_string(),
        staged_table: "stg_DimProductSubcategory".to_string(),
        columns: [
            "ProductSubcategoryKey",
            "EnglishProductSubcategoryName",
            "ProductSubcategoryAlternateKey",
            "ProductCategoryKey",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        fills: Vec::new(),
        renames: pairs(&[(
            "EnglishProductSubcategoryName",
            "ProductSubcategoryName",
        )]),
    }
}

pub fn category_spec() -> NormalizeSpec {
    NormalizeSpec {
        raw_table: "src_DimProductCategory".to_string(),
        staged_table: "stg_DimProductCategory".to_string(),
        columns: [
            "ProductCategoryKey",
            "ProductCategoryAlternateKey",
            "EnglishProductCategoryName",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        fills: Vec::new(),
        renames: pairs(&[(
            "EnglishProductCategoryName",
            "ProductCategoryName",
        )]),
    }
}

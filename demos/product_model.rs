//! Runs the product-model pipeline end to end against a freshly seeded
//! source database, then prints the run history and metrics.
//!
//!     cargo run --example product_model

use rusqlite::Connection;
use stageflow::core::config::types::{FlowConfig, TriggerConfig};
use stageflow::core::store::db::RunLog;
use stageflow::{product_model_pipeline, FlowEngine};

fn seed_source(cfg: &FlowConfig) -> rusqlite::Result<()> {
    let conn = Connection::open(&cfg.source_db)?;
    conn.execute_batch(
        "DROP TABLE IF EXISTS DimProduct;
         DROP TABLE IF EXISTS DimProductSubcategory;
         DROP TABLE IF EXISTS DimProductCategory;

         CREATE TABLE DimProductCategory (
             ProductCategoryKey INTEGER,
             ProductCategoryAlternateKey INTEGER,
             EnglishProductCategoryName TEXT
         );
         INSERT INTO DimProductCategory VALUES (1, 1, 'Bikes');

         CREATE TABLE DimProductSubcategory (
             ProductSubcategoryKey INTEGER,
             ProductSubcategoryAlternateKey INTEGER,
             EnglishProductSubcategoryName TEXT,
             ProductCategoryKey INTEGER
         );
         INSERT INTO DimProductSubcategory VALUES (2, 2, 'Road Bikes', 1);

         CREATE TABLE DimProduct (
             ProductKey INTEGER,
             ProductAlternateKey TEXT,
             ProductSubcategoryKey INTEGER,
             WeightUnitMeasureCode TEXT,
             SizeUnitMeasureCode TEXT,
             EnglishProductName TEXT,
             StandardCost REAL,
             FinishedGoodsFlag INTEGER,
             Color TEXT,
             SafetyStockLevel INTEGER,
             ReorderPoint INTEGER,
             ListPrice REAL,
             Size TEXT,
             SizeRange TEXT,
             Weight REAL,
             DaysToManufacture INTEGER,
             ProductLine TEXT,
             DealerPrice REAL,
             Class TEXT,
             Style TEXT,
             ModelName TEXT,
             EnglishDescription TEXT,
             StartDate TEXT,
             EndDate TEXT,
             Status TEXT
         );
         INSERT INTO DimProduct VALUES
             (100, 'BK-R93R-62', 2, 'LB', 'CM', 'Road-150 Red, 62',
              2171.29, 1, 'Red', 100, 75, 3578.27, '62', '60-64', 15.0, 4,
              'R', 2146.96, 'H', 'U', 'Road-150', 'Top of the line bike',
              '2017-07-01', NULL, 'Current'),
             (101, 'BK-R50R-44', 2, NULL, 'CM', 'Road-650 Red, 44',
              486.71, 1, 'Red', 500, 375, 782.99, '44', '42-46', NULL, 4,
              NULL, 469.79, NULL, NULL, 'Road-650', NULL,
              '2017-07-01', NULL, 'Current');",
    )?;
    Ok(())
}

#[tokio::main]
async fn main() -> stageflow::FlowResult<()> {
    stageflow::core::logging::init();

    let mut cfg = FlowConfig::example();
    // A short interval so the demo fires right away instead of waiting for
    // the daily schedule.
    cfg.trigger = TriggerConfig {
        trigger_type: "interval".to_string(),
        every: Some("2s".to_string()),
        at: None,
    };
    seed_source(&cfg)?;

    let (trigger, def) = product_model_pipeline(&cfg).expect("pipeline wiring is static");

    let engine = FlowEngine::new()
        .run_log(&cfg.run_log)
        .add_pipeline(trigger, def);

    // Let the trigger fire twice, then shut down.
    engine
        .run_with_shutdown(async {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        })
        .await?;

    let log = RunLog::open(&cfg.run_log)?;
    for run in log.recent_runs(5)? {
        println!(
            "run {} [{}] {} ({} ms)",
            run.id,
            run.pipeline,
            run.status,
            run.duration_ms.unwrap_or(0)
        );
        for stage in log.stage_runs_for(&run.id)? {
            println!(
                "  {:<32} {:<10} rows={}",
                stage.stage_name,
                stage.status,
                stage.rows.unwrap_or(0)
            );
        }
    }

    print!("{}", stageflow::core::metrics::gather_text());
    Ok(())
}

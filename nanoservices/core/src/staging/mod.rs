pub mod db;

pub use db::Staging;

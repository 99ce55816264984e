pub mod db;
pub mod recency;

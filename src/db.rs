pub mod entsoe;
pub mod lib_archive;
pub mod ote;
pub mod prod_db;

pub mod balancing_archive;
pub mod balancing_stats;
pub mod lib_entsoe;
pub mod ro_dam_archive;
